pub mod appointments;
pub mod draft;
pub mod workflow;

pub use self::appointments::{
    AppointmentList, CancelRequest, ConfirmedCancel, newest_first, sort_newest_first,
};
pub use self::draft::{BookingDraft, slot_time, validate_draft};
pub use self::workflow::{
    BookingPhase, BookingSnapshot, BookingWorkflow, PICK_ANOTHER_TIME, RejectReason, SlotButton,
    SubmitOutcome,
};

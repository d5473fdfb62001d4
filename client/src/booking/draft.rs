use chrono::{NaiveDate, NaiveDateTime};

use shared::types::{BookingRequest, Role};

use crate::error::{Field, FieldErrors};

/// What the booking form currently holds. Nothing here is persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingDraft {
    pub doctor_id: Option<String>,
    /// Only meaningful when staff book on behalf of a patient.
    pub patient_id: Option<String>,
    pub date: Option<NaiveDate>,
    pub hour: Option<u8>,
}

impl BookingDraft {
    pub fn doctor(&self) -> Option<&str> {
        self.doctor_id.as_deref().filter(|id| !id.trim().is_empty())
    }

    pub fn patient(&self) -> Option<&str> {
        self.patient_id.as_deref().filter(|id| !id.trim().is_empty())
    }

    /// Selected date at the selected hour, :00:00, local wall-clock.
    pub fn slot(&self) -> Option<NaiveDateTime> {
        slot_time(self.date?, self.hour?)
    }

    /// The wire request, once the draft validates for `role`.
    pub fn to_request(&self, role: Option<Role>) -> Result<BookingRequest, FieldErrors> {
        validate_draft(self, role)?;

        let (Some(doctor_id), Some(slot)) = (self.doctor(), self.slot()) else {
            return Err(FieldErrors::single(Field::Doctor, "Please select a doctor"));
        };

        let patient_id = match role {
            Some(r) if r.books_for_others() => self.patient().map(str::to_string),
            _ => None,
        };

        Ok(BookingRequest {
            doctor_id: doctor_id.to_string(),
            patient_id,
            slot,
        })
    }
}

/// Combine a date with an hour at minute and second zero. No time-zone
/// conversion is applied.
pub fn slot_time(date: NaiveDate, hour: u8) -> Option<NaiveDateTime> {
    date.and_hms_opt(u32::from(hour), 0, 0)
}

/// Check every required field and report all failures at once.
///
/// Doctor, date and hour are always required; a patient is required when
/// the acting role books on someone else's behalf.
pub fn validate_draft(draft: &BookingDraft, role: Option<Role>) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();

    if draft.doctor().is_none() {
        errors.insert(Field::Doctor, "Please select a doctor");
    }

    if draft.date.is_none() {
        errors.insert(Field::Date, "Please select a date");
    }

    match draft.hour {
        None => errors.insert(Field::Hour, "Please select a time"),
        Some(h) if h > 23 => errors.insert(Field::Hour, "Hour must be between 0 and 23"),
        Some(_) => {}
    }

    if role.is_some_and(|r| r.books_for_others()) && draft.patient().is_none() {
        errors.insert(Field::Patient, "Please select a patient");
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

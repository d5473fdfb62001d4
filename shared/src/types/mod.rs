pub mod appointment;
pub mod claims;
pub mod client_config;
pub mod json_error;
pub mod login;
pub mod records;
pub mod role;
pub mod users;

pub use self::appointment::{
    Appointment, AppointmentStatus, AvailabilityQuery, BookingRequest, DirectoryEntry, PartyRef,
    UserSummary,
};
pub use self::claims::TokenClaims;
pub use self::client_config::{ClientConfig, ConfigError};
pub use self::json_error::ErrorResponse;
pub use self::login::{LoginData, LoginError, LoginResponse, LoginUser};
pub use self::records::{MedicalRecord, NewRecord, RecordFile, sort_records_newest_first};
pub use self::role::{Role, RoleSet, UnknownRole};
pub use self::users::{
    ActiveState, DashboardStats, MonthCount, TypeCount, UserAccount, UserUpdate,
};

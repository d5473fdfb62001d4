use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::session::store::StoreError;

/// A form field that failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Doctor,
    Patient,
    Date,
    Hour,
    Appointment,
    Email,
    Password,
    Title,
    Name,
}

impl Field {
    /// Form field name, matching the wire names where one exists.
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Doctor => "doctorId",
            Field::Patient => "patientId",
            Field::Date => "date",
            Field::Hour => "hour",
            Field::Appointment => "appointment",
            Field::Email => "email",
            Field::Password => "password",
            Field::Title => "title",
            Field::Name => "name",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every failing field with its human-readable reason.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<Field, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: Field, reason: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.insert(field, reason);
        errors
    }

    pub fn insert(&mut self, field: Field, reason: impl Into<String>) {
        self.0.insert(field, reason.into());
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    pub fn contains(&self, field: Field) -> bool {
        self.0.contains_key(&field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &str)> {
        self.0.iter().map(|(f, r)| (*f, r.as_str()))
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, reason) in self.iter() {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", field, reason)?;
            first = false;
        }
        Ok(())
    }
}

/// Everything the core can report to the presentation layer. Transport
/// failures are folded into these kinds at the gateway and never surface raw.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No token, or the stored token is malformed or expired.
    #[error("Not signed in")]
    AuthExpired,

    /// The server answered 401; the session has already been cleared.
    #[error("You were signed out. Please sign in again.")]
    AuthRejected,

    /// 401 on `/auth/login` itself.
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Client-side validation; nothing was sent.
    #[error("Please fix the highlighted fields: {0}")]
    Validation(FieldErrors),

    /// The slot (or the appointment state) changed under us.
    #[error("{0}")]
    Conflict(String),

    /// A 4xx answer other than 401/409: validation or not-found on the server.
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Network failure, timeout, 5xx or an unreadable body.
    #[error("Something went wrong, please try again ({0})")]
    Transient(String),

    #[error("Session storage error: {0}")]
    Storage(#[from] StoreError),
}

impl ClientError {
    pub fn to_code(&self) -> &'static str {
        match self {
            Self::AuthExpired => "AUTH_EXPIRED",
            Self::AuthRejected => "AUTH_REJECTED",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Conflict(_) => "CONFLICT",
            Self::Rejected { .. } => "REJECTED",
            Self::Transient(_) => "TRANSIENT_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// Whether a retry prompt makes sense for this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::Transient(_))
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Lifecycle of a booked slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Booked,
    #[serde(alias = "canceled")]
    Cancelled,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Booked => f.write_str("booked"),
            AppointmentStatus::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// A doctor or patient as it appears inside an appointment record: either a
/// bare id or a populated document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PartyRef {
    Id(String),
    Record(DirectoryEntry),
}

impl PartyRef {
    pub fn id(&self) -> Option<&str> {
        match self {
            PartyRef::Id(id) => Some(id),
            PartyRef::Record(entry) => Some(entry.id.as_str()).filter(|id| !id.is_empty()),
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            PartyRef::Id(_) => None,
            PartyRef::Record(entry) => entry.name(),
        }
    }
}

/// One entry of `GET /doctors` or `GET /patients`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    #[serde(rename = "_id", alias = "id", default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialization: Option<String>,
    /// Patients only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl DirectoryEntry {
    pub fn name(&self) -> Option<&str> {
        self.user
            .as_ref()
            .map(|u| u.name.as_str())
            .filter(|n| !n.is_empty())
    }
}

impl fmt::Display for DirectoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name().unwrap_or("Unknown");
        match &self.specialization {
            Some(specialty) => write!(f, "{} ({})", name, specialty),
            None => write!(f, "{}", name),
        }
    }
}

/// An appointment record as returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub doctor: PartyRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient: Option<PartyRef>,
    #[serde(with = "wall_clock")]
    pub slot: NaiveDateTime,
    pub status: AppointmentStatus,
}

impl Appointment {
    pub fn is_cancelled(&self) -> bool {
        self.status == AppointmentStatus::Cancelled
    }
}

impl fmt::Display for Appointment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - Dr. {} [{}]",
            self.slot.format("%Y-%m-%d %H:%M"),
            self.doctor.name().unwrap_or("Unknown"),
            self.status
        )
    }
}

/// Body of `POST /appointments/book`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    #[serde(rename = "doctorId")]
    pub doctor_id: String,
    #[serde(rename = "patientId", default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(with = "wall_clock")]
    pub slot: NaiveDateTime,
}

/// Query of `GET /appointments/available`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityQuery {
    pub doctor_id: String,
    pub date: NaiveDate,
}

impl AvailabilityQuery {
    /// `(name, value)` pairs in wire order.
    pub fn pairs(&self) -> [(&'static str, String); 2] {
        [
            ("doctorId", self.doctor_id.clone()),
            ("date", self.date.format("%Y-%m-%d").to_string()),
        ]
    }
}

/// Slot timestamps travel as local wall-clock time without an offset
/// (`2024-06-01T10:00:00`). Incoming values that do carry an offset keep
/// their wall-clock part; nothing is shifted between zones.
pub mod wall_clock {
    use chrono::{DateTime, NaiveDateTime};
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub const FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

    pub fn serialize<S: Serializer>(slot: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&slot.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid slot timestamp: {}", raw)))
    }

    pub fn parse(raw: &str) -> Option<NaiveDateTime> {
        let raw = raw.trim();
        raw.parse::<NaiveDateTime>()
            .ok()
            .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_local()))
    }
}

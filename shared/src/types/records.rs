use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::appointment::PartyRef;

/// A medical record as returned by `GET /records` and
/// `GET /records/patient/:id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicalRecord {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient: Option<PartyRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doctor: Option<PartyRef>,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl MedicalRecord {
    fn party(party: &Option<PartyRef>) -> &str {
        party.as_ref().and_then(PartyRef::name).unwrap_or("Unknown")
    }
}

impl fmt::Display for MedicalRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.created_at {
            Some(at) => write!(f, "{} - {}", self.title, at.format("%Y-%m-%d"))?,
            None => f.write_str(&self.title)?,
        }
        write!(
            f,
            " | Patient: {} | Doctor: {}",
            Self::party(&self.patient),
            Self::party(&self.doctor)
        )
    }
}

/// Newest record first; records without a creation time sort last.
pub fn sort_records_newest_first(records: &mut [MedicalRecord]) {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// An attachment of a new record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFile {
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Form of `POST /records`, sent as `multipart/form-data`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewRecord {
    pub patient_id: String,
    pub title: String,
    pub description: String,
    pub files: Vec<RecordFile>,
}

impl NewRecord {
    /// Text fields in wire order.
    pub fn fields(&self) -> [(&'static str, &str); 3] {
        [
            ("patientId", self.patient_id.as_str()),
            ("title", self.title.as_str()),
            ("description", self.description.as_str()),
        ]
    }
}

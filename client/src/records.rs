use tracing::{info, warn};

use shared::types::{
    DirectoryEntry, MedicalRecord, NewRecord, UserAccount, UserUpdate, sort_records_newest_first,
};

use crate::error::{ClientError, ClientResult, Field, FieldErrors};
use crate::gateway::ApiClient;

/// Every missing field of a new record, so a form can flag them together.
pub fn validate_record(record: &NewRecord) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();
    if record.patient_id.trim().is_empty() {
        errors.insert(Field::Patient, "Please select a patient");
    }
    if record.title.trim().is_empty() {
        errors.insert(Field::Title, "Please enter a title");
    }
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Validate, then upload. Nothing is sent for an incomplete record.
pub async fn upload_record(api: &ApiClient, record: &NewRecord) -> ClientResult<MedicalRecord> {
    if let Err(errors) = validate_record(record) {
        warn!("Record upload refused: {}", errors);
        return Err(ClientError::Validation(errors));
    }
    let created = api.create_record(record).await?;
    info!("Created record {} for patient {}", created.id, record.patient_id);
    Ok(created)
}

/// The caller's visible records, newest first.
pub async fn list_records(api: &ApiClient) -> ClientResult<Vec<MedicalRecord>> {
    let mut records = api.records().await?;
    sort_records_newest_first(&mut records);
    Ok(records)
}

/// One patient with their records, as the patient view shows them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientChart {
    pub patient: DirectoryEntry,
    pub records: Vec<MedicalRecord>,
}

/// Both reads go out together; either failing fails the chart.
pub async fn patient_chart(api: &ApiClient, patient_id: &str) -> ClientResult<PatientChart> {
    let (patient, mut records) =
        tokio::try_join!(api.patient(patient_id), api.patient_records(patient_id))?;
    sort_records_newest_first(&mut records);
    Ok(PatientChart { patient, records })
}

pub fn validate_user_update(update: &UserUpdate) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();
    if update.name.trim().is_empty() {
        errors.insert(Field::Name, "Name cannot be empty");
    }
    if !update.email.contains('@') {
        errors.insert(Field::Email, "Please enter a valid email");
    }
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Save an edited account (admin).
pub async fn save_user(
    api: &ApiClient,
    user_id: &str,
    update: &UserUpdate,
) -> ClientResult<UserAccount> {
    validate_user_update(update).map_err(ClientError::Validation)?;
    let saved = api.update_user(user_id, update).await?;
    info!("Updated user {}", saved.id);
    Ok(saved)
}

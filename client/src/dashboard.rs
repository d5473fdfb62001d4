use chrono::NaiveDateTime;
use tracing::debug;

use shared::types::{Appointment, DashboardStats, MedicalRecord, Role};

use crate::error::{ClientError, ClientResult};
use crate::gateway::ApiClient;
use crate::records::list_records;

/// How many records the personal dashboard lists.
pub const RECENT_RECORDS: usize = 5;

/// What the landing view shows: system figures for admins, the caller's own
/// upcoming appointments and latest records for everyone else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Overview {
    System(DashboardStats),
    Personal {
        upcoming: Vec<Appointment>,
        recent_records: Vec<MedicalRecord>,
    },
}

/// Booked appointments after `now`, soonest first.
pub fn upcoming(appointments: &[Appointment], now: NaiveDateTime) -> Vec<Appointment> {
    let mut upcoming: Vec<Appointment> = appointments
        .iter()
        .filter(|a| a.slot > now && !a.is_cancelled())
        .cloned()
        .collect();
    upcoming.sort_by(|a, b| a.slot.cmp(&b.slot));
    upcoming
}

/// Load the overview for the signed-in role. `now` is local wall-clock time,
/// the same frame slots are in.
pub async fn load_overview(api: &ApiClient, now: NaiveDateTime) -> ClientResult<Overview> {
    let role = api.session().require_session()?;
    debug!("Loading overview for {:?}", role);

    if role == Some(Role::Admin) {
        return Ok(Overview::System(api.dashboard().await?));
    }

    let (appointments, mut records) = tokio::try_join!(api.my_appointments(), list_records(api))?;
    records.truncate(RECENT_RECORDS);

    Ok(Overview::Personal {
        upcoming: upcoming(&appointments, now),
        recent_records: records,
    })
}

/// Admin-only figures. Other roles are refused without a request.
pub async fn system_stats(api: &ApiClient) -> ClientResult<DashboardStats> {
    match api.session().require_session()? {
        Some(Role::Admin) => api.dashboard().await,
        _ => Err(ClientError::Rejected {
            status: 403,
            message: "The system dashboard is for administrators".to_string(),
        }),
    }
}

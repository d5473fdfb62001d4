use std::cmp::Ordering;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use shared::types::Appointment;

use crate::error::{ClientError, ClientResult, Field, FieldErrors};
use crate::gateway::ApiClient;

/// Newest slot first; equal slots fall back to id, also descending.
pub fn newest_first(a: &Appointment, b: &Appointment) -> Ordering {
    b.slot.cmp(&a.slot).then_with(|| b.id.cmp(&a.id))
}

pub fn sort_newest_first(list: &mut [Appointment]) {
    list.sort_by(newest_first);
}

// ---------------------------------------------------------------------------
// Two-phase cancellation
// ---------------------------------------------------------------------------

/// First phase of a cancellation: the user asked, nothing was sent yet.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a cancellation request does nothing until confirmed or dismissed"]
pub struct CancelRequest {
    appointment: Appointment,
}

impl CancelRequest {
    /// The appointment the prompt is about.
    pub fn appointment(&self) -> &Appointment {
        &self.appointment
    }

    /// The user confirmed. Only a [`ConfirmedCancel`] can reach the network.
    pub fn confirm(self) -> ConfirmedCancel {
        ConfirmedCancel {
            id: self.appointment.id,
        }
    }

    /// The user backed out.
    pub fn dismiss(self) {}
}

/// Proof that a confirmation step happened; has no public constructor.
#[derive(Debug, PartialEq, Eq)]
pub struct ConfirmedCancel {
    id: String,
}

impl ConfirmedCancel {
    pub fn id(&self) -> &str {
        &self.id
    }
}

// ---------------------------------------------------------------------------
// AppointmentList
// ---------------------------------------------------------------------------

/// The caller's own appointments, kept newest first.
#[derive(Debug, Clone)]
pub struct AppointmentList {
    api: ApiClient,
    items: Arc<Mutex<Vec<Appointment>>>,
}

impl AppointmentList {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            items: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn snapshot(&self) -> Vec<Appointment> {
        self.items.lock().await.clone()
    }

    /// Re-fetch `GET /appointments/my` and replace the cached list.
    pub async fn refresh(&self) -> ClientResult<Vec<Appointment>> {
        let mut fresh = self.api.my_appointments().await?;
        sort_newest_first(&mut fresh);
        info!("Loaded {} appointments", fresh.len());

        *self.items.lock().await = fresh.clone();
        Ok(fresh)
    }

    /// Bring the list up to date after `changed` was created or updated.
    /// Falls back to patching the cached copy when the refresh fails.
    pub(crate) async fn reconcile(&self, changed: &Appointment) {
        if let Err(e) = self.refresh().await {
            warn!("Appointment refresh failed, patching locally: {}", e);
            let mut items = self.items.lock().await;
            match items.iter_mut().find(|a| a.id == changed.id) {
                Some(existing) => *existing = changed.clone(),
                None => items.push(changed.clone()),
            }
            sort_newest_first(&mut items);
        }
    }

    /// Phase one: ask to cancel `id`. Fails for unknown or already
    /// cancelled appointments; sends nothing.
    pub async fn request_cancel(&self, id: &str) -> ClientResult<CancelRequest> {
        let items = self.items.lock().await;
        let Some(appointment) = items.iter().find(|a| a.id == id) else {
            return Err(ClientError::Validation(FieldErrors::single(
                Field::Appointment,
                "Appointment not found",
            )));
        };

        if appointment.is_cancelled() {
            return Err(ClientError::Validation(FieldErrors::single(
                Field::Appointment,
                "Appointment is already cancelled",
            )));
        }

        Ok(CancelRequest {
            appointment: appointment.clone(),
        })
    }

    /// Phase two: issue the cancellation and refresh the list.
    pub async fn cancel(&self, confirmed: ConfirmedCancel) -> ClientResult<Appointment> {
        info!("Cancelling appointment {}", confirmed.id);
        let updated = self.api.cancel(&confirmed.id).await?;
        self.reconcile(&updated).await;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use shared::types::{AppointmentStatus, PartyRef};

    fn appt(id: &str, day: u32, hour: u32) -> Appointment {
        Appointment {
            id: id.to_string(),
            doctor: PartyRef::Id("d1".into()),
            patient: None,
            slot: NaiveDate::from_ymd_opt(2024, 6, day)
                .unwrap()
                .and_hms_opt(hour, 0, 0)
                .unwrap(),
            status: AppointmentStatus::Booked,
        }
    }

    #[test]
    fn sorts_by_slot_descending() {
        let mut list = vec![appt("a", 1, 9), appt("b", 3, 9), appt("c", 1, 15)];
        sort_newest_first(&mut list);
        let ids: Vec<&str> = list.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["b", "c", "a"]);
    }

    #[test]
    fn equal_slots_break_ties_by_id() {
        let mut list = vec![appt("a", 1, 9), appt("c", 1, 9), appt("b", 1, 9)];
        sort_newest_first(&mut list);
        let ids: Vec<&str> = list.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["c", "b", "a"]);
    }

    #[test]
    fn confirm_carries_the_id() {
        let request = CancelRequest {
            appointment: appt("x1", 1, 9),
        };
        assert_eq!(request.appointment().id, "x1");
        assert_eq!(request.confirm().id(), "x1");
    }

    #[test]
    fn requests_for_the_same_appointment_compare_equal() {
        fn total_eq<T: Eq>(a: &T, b: &T) -> bool {
            a == b
        }
        let a = CancelRequest {
            appointment: appt("x1", 1, 9),
        };
        let b = CancelRequest {
            appointment: appt("x1", 1, 9),
        };
        assert!(total_eq(&a, &b));
        assert_ne!(a, CancelRequest { appointment: appt("x2", 1, 9) });
    }
}

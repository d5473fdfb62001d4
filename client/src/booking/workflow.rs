use std::collections::BTreeSet;
use std::ops::RangeInclusive;
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use shared::types::Appointment;
use shared::types::client_config::BookingConfig;

use super::appointments::AppointmentList;
use super::draft::BookingDraft;
use crate::error::{ClientError, ClientResult, Field, FieldErrors};
use crate::gateway::ApiClient;

pub const PICK_ANOTHER_TIME: &str =
    "That time is no longer available. Please pick another time.";

/// Why the last attempt did not book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    SlotUnavailable,
    Validation,
    ServerError,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BookingPhase {
    Idle,
    FetchingAvailability,
    SlotsReady,
    DraftComplete,
    Submitting,
    Booked(Appointment),
    Rejected(RejectReason),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Booked(Appointment),
    /// A submission for this workflow is already in flight; nothing was sent.
    AlreadySubmitting,
}

/// One hour button of the slot grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotButton {
    pub hour: u8,
    pub enabled: bool,
    pub selected: bool,
}

impl SlotButton {
    pub fn label(&self) -> String {
        format!("{:02}:00", self.hour)
    }
}

/// Copy of the workflow state for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingSnapshot {
    pub phase: BookingPhase,
    pub draft: BookingDraft,
    pub available: Option<BTreeSet<u8>>,
    pub errors: FieldErrors,
    pub message: Option<String>,
}

struct BookingState {
    phase: BookingPhase,
    draft: BookingDraft,
    available: Option<BTreeSet<u8>>,
    errors: FieldErrors,
    message: Option<String>,
    /// Bumped whenever doctor or date changes; results fetched for an older
    /// generation are dropped.
    generation: u64,
}

impl BookingState {
    fn new() -> Self {
        Self {
            phase: BookingPhase::Idle,
            draft: BookingDraft::default(),
            available: None,
            errors: FieldErrors::new(),
            message: None,
            generation: 0,
        }
    }

    /// Doctor or date changed: the fetched slots and the hour were scoped to
    /// the old pair.
    fn invalidate(&mut self) -> u64 {
        self.generation += 1;
        self.available = None;
        self.draft.hour = None;
        self.errors = FieldErrors::new();
        self.message = None;
        self.phase = if self.query().is_some() {
            BookingPhase::FetchingAvailability
        } else {
            BookingPhase::Idle
        };
        self.generation
    }

    fn query(&self) -> Option<(String, NaiveDate)> {
        Some((self.draft.doctor()?.to_string(), self.draft.date?))
    }

    fn apply_hours(&mut self, hours: BTreeSet<u8>) {
        if self.draft.hour.is_some_and(|h| !hours.contains(&h)) {
            self.draft.hour = None;
        }
        self.phase = if self.draft.hour.is_some() {
            BookingPhase::DraftComplete
        } else {
            BookingPhase::SlotsReady
        };
        self.available = Some(hours);
    }

    fn apply_failure(&mut self, error: &ClientError) {
        match error {
            ClientError::AuthExpired | ClientError::AuthRejected => {
                self.phase = BookingPhase::Idle;
                self.draft = BookingDraft::default();
                self.available = None;
            }
            ClientError::Conflict(_) => {
                self.phase = BookingPhase::Rejected(RejectReason::SlotUnavailable);
            }
            ClientError::Validation(_) | ClientError::Rejected { .. } => {
                self.phase = BookingPhase::Rejected(RejectReason::Validation);
            }
            _ => {
                self.phase = BookingPhase::Rejected(RejectReason::ServerError);
            }
        }
        self.message = Some(error.to_string());
    }

    /// A submission of `generation` went away without an answer.
    fn abandon_submit(&mut self, generation: u64) {
        if self.generation == generation && self.phase == BookingPhase::Submitting {
            self.phase = if self.draft.hour.is_some() {
                BookingPhase::DraftComplete
            } else {
                BookingPhase::SlotsReady
            };
        }
    }
}

/// Held by a running [`BookingWorkflow::submit`]. If the future is dropped
/// while still `Submitting`, the phase goes back to where the user can retry.
struct SubmitGuard {
    state: Arc<Mutex<BookingState>>,
    generation: u64,
    armed: bool,
}

impl SubmitGuard {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for SubmitGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let generation = self.generation;
        debug!("Submission for generation {} dropped", generation);

        match self.state.try_lock() {
            Ok(mut st) => st.abandon_submit(generation),
            Err(_) => match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let state = Arc::clone(&self.state);
                    handle.spawn(async move {
                        state.lock().await.abandon_submit(generation);
                    });
                }
                Err(_) => warn!("Dropped submission left the form locked"),
            },
        }
    }
}

/// Availability and booking state machine for one booking form.
///
/// Cloning shares the state, so every handle sees the same draft and the
/// same in-flight submission. The state lock is never held across a
/// network call.
#[derive(Clone)]
pub struct BookingWorkflow {
    api: ApiClient,
    appointments: AppointmentList,
    hours: RangeInclusive<u8>,
    state: Arc<Mutex<BookingState>>,
}

impl std::fmt::Debug for BookingWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookingWorkflow")
            .field("hours", &self.hours)
            .finish_non_exhaustive()
    }
}

impl BookingWorkflow {
    pub fn new(api: ApiClient, appointments: AppointmentList, config: &BookingConfig) -> Self {
        Self {
            api,
            appointments,
            hours: config.hours(),
            state: Arc::new(Mutex::new(BookingState::new())),
        }
    }

    pub fn appointments(&self) -> &AppointmentList {
        &self.appointments
    }

    pub async fn snapshot(&self) -> BookingSnapshot {
        let st = self.state.lock().await;
        BookingSnapshot {
            phase: st.phase.clone(),
            draft: st.draft.clone(),
            available: st.available.clone(),
            errors: st.errors.clone(),
            message: st.message.clone(),
        }
    }

    pub async fn phase(&self) -> BookingPhase {
        self.state.lock().await.phase.clone()
    }

    /// The hour buttons: enabled iff the hour is in the fetched set and no
    /// fetch or submission is running.
    pub async fn slot_grid(&self) -> Vec<SlotButton> {
        let st = self.state.lock().await;
        let interactive = !matches!(
            st.phase,
            BookingPhase::FetchingAvailability | BookingPhase::Submitting
        );

        self.hours
            .clone()
            .map(|hour| SlotButton {
                hour,
                enabled: interactive && st.available.as_ref().is_some_and(|a| a.contains(&hour)),
                selected: st.draft.hour == Some(hour),
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Draft edits
    // -----------------------------------------------------------------------

    pub async fn select_doctor(&self, doctor_id: impl Into<String>) -> ClientResult<BookingPhase> {
        let generation = {
            let mut st = self.state.lock().await;
            st.draft.doctor_id = Some(doctor_id.into());
            st.invalidate()
        };
        self.fetch_for(generation).await
    }

    pub async fn select_date(&self, date: NaiveDate) -> ClientResult<BookingPhase> {
        let generation = {
            let mut st = self.state.lock().await;
            st.draft.date = Some(date);
            st.invalidate()
        };
        self.fetch_for(generation).await
    }

    /// Staff only; ignored in the request when a patient books.
    pub async fn select_patient(&self, patient_id: Option<String>) {
        let mut st = self.state.lock().await;
        st.draft.patient_id = patient_id;
        st.errors = FieldErrors::new();
    }

    /// Pick an hour. Hours outside the fetched set are refused, so they can
    /// never reach submission.
    pub async fn select_hour(&self, hour: u8) -> ClientResult<()> {
        let mut st = self.state.lock().await;

        if st.phase == BookingPhase::Submitting {
            return Err(ClientError::Validation(FieldErrors::single(
                Field::Hour,
                "A booking is already being submitted",
            )));
        }

        if !st.available.as_ref().is_some_and(|a| a.contains(&hour)) {
            debug!("Refusing unavailable hour {}", hour);
            return Err(ClientError::Validation(FieldErrors::single(
                Field::Hour,
                "That time is not available",
            )));
        }

        st.draft.hour = Some(hour);
        st.errors = FieldErrors::new();
        st.message = None;
        st.phase = BookingPhase::DraftComplete;
        Ok(())
    }

    /// Leave the form: drop the draft and everything fetched for it.
    pub async fn reset(&self) {
        let mut st = self.state.lock().await;
        let generation = st.generation + 1;
        *st = BookingState::new();
        st.generation = generation;
    }

    // -----------------------------------------------------------------------
    // Availability
    // -----------------------------------------------------------------------

    /// Re-query free hours for the current doctor and date.
    pub async fn fetch_available_hours(&self) -> ClientResult<BTreeSet<u8>> {
        let generation = {
            let mut st = self.state.lock().await;
            if st.query().is_none() {
                let mut errors = FieldErrors::new();
                if st.draft.doctor().is_none() {
                    errors.insert(Field::Doctor, "Please select a doctor");
                }
                if st.draft.date.is_none() {
                    errors.insert(Field::Date, "Please select a date");
                }
                return Err(ClientError::Validation(errors));
            }
            if st.phase == BookingPhase::Submitting {
                // The submission does its own re-fetch.
                return Ok(st.available.clone().unwrap_or_default());
            }
            st.phase = BookingPhase::FetchingAvailability;
            st.generation
        };

        self.fetch_for(generation).await?;
        Ok(self
            .state
            .lock()
            .await
            .available
            .clone()
            .unwrap_or_default())
    }

    async fn fetch_for(&self, generation: u64) -> ClientResult<BookingPhase> {
        let Some((doctor, date)) = self.state.lock().await.query() else {
            return Ok(BookingPhase::Idle);
        };

        let result = self.api.available_hours(&doctor, date).await;

        let mut st = self.state.lock().await;
        if st.generation != generation {
            debug!("Dropping availability for superseded {} / {}", doctor, date);
            return Ok(st.phase.clone());
        }

        match result {
            Ok(hours) => {
                debug!("{} / {}: {} free hours", doctor, date, hours.len());
                st.apply_hours(hours);
                Ok(st.phase.clone())
            }
            Err(e) => {
                warn!("Availability for {} / {} failed: {}", doctor, date, e);
                st.available = None;
                st.apply_failure(&e);
                Err(e)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------------

    /// Validate, re-check the slot against fresh availability, then book.
    ///
    /// A second call while one is in flight returns
    /// [`SubmitOutcome::AlreadySubmitting`] without touching the network.
    pub async fn submit(&self) -> ClientResult<SubmitOutcome> {
        let role = match self.api.session().require_session() {
            Ok(role) => role,
            Err(e) => {
                self.state.lock().await.apply_failure(&e);
                return Err(e);
            }
        };

        let (request, hour, date, generation) = {
            let mut st = self.state.lock().await;

            if st.phase == BookingPhase::Submitting {
                debug!("Submit ignored: already submitting");
                return Ok(SubmitOutcome::AlreadySubmitting);
            }

            let request = match st.draft.to_request(role) {
                Ok(request) => request,
                Err(errors) => {
                    st.errors = errors.clone();
                    return Err(ClientError::Validation(errors));
                }
            };

            let (Some(hour), Some(date)) = (st.draft.hour, st.draft.date) else {
                return Err(ClientError::Validation(FieldErrors::single(
                    Field::Hour,
                    "Please select a time",
                )));
            };

            st.phase = BookingPhase::Submitting;
            st.errors = FieldErrors::new();
            st.message = None;
            (request, hour, date, st.generation)
        };

        // Disarmed once the outcome is written to the state.
        let mut guard = SubmitGuard {
            state: Arc::clone(&self.state),
            generation,
            armed: true,
        };

        // Last-moment revalidation against the server's view.
        let fresh = match self.api.available_hours(&request.doctor_id, date).await {
            Ok(fresh) => fresh,
            Err(e) => {
                let e = self.fail(generation, e).await;
                guard.disarm();
                return Err(e);
            }
        };

        if !fresh.contains(&hour) {
            info!("Hour {} was taken before submission", hour);
            let mut st = self.state.lock().await;
            if st.generation == generation {
                st.apply_hours(fresh);
                st.message = Some(PICK_ANOTHER_TIME.to_string());
            }
            guard.disarm();
            return Err(ClientError::Conflict(PICK_ANOTHER_TIME.to_string()));
        }

        match self.api.book(&request).await {
            Ok(appointment) => {
                info!("Booked appointment {} at {}", appointment.id, appointment.slot);
                {
                    let mut st = self.state.lock().await;
                    if st.generation == generation {
                        st.generation += 1;
                        st.draft = BookingDraft::default();
                        st.available = None;
                        st.phase = BookingPhase::Booked(appointment.clone());
                    }
                }
                guard.disarm();
                self.appointments.reconcile(&appointment).await;
                Ok(SubmitOutcome::Booked(appointment))
            }
            Err(ClientError::Conflict(server_message)) => {
                info!("Server refused hour {}: {}", hour, server_message);
                {
                    let mut st = self.state.lock().await;
                    if st.generation != generation {
                        return Err(ClientError::Conflict(PICK_ANOTHER_TIME.to_string()));
                    }
                    st.phase = BookingPhase::FetchingAvailability;
                }
                guard.disarm();
                // The user's picture of what is free is stale: refresh it.
                if let Err(e) = self.fetch_for(generation).await {
                    warn!("Refresh after conflict failed: {}", e);
                }
                let mut st = self.state.lock().await;
                if st.generation == generation {
                    st.message = Some(PICK_ANOTHER_TIME.to_string());
                }
                Err(ClientError::Conflict(PICK_ANOTHER_TIME.to_string()))
            }
            Err(e) => {
                let e = self.fail(generation, e).await;
                guard.disarm();
                Err(e)
            }
        }
    }

    async fn fail(&self, generation: u64, error: ClientError) -> ClientError {
        warn!("Booking failed: {}", error);
        let mut st = self.state.lock().await;
        if st.generation == generation {
            st.apply_failure(&error);
        }
        error
    }
}

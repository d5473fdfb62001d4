use std::sync::Arc;

use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, info, warn};

use shared::types::ClientConfig;

use crate::booking::{AppointmentList, BookingWorkflow};
use crate::gateway::{ApiClient, AuthEvent, Transport};
use crate::routes::{Navigation, Navigator};
use crate::session::{FileStore, SessionGuard, SessionStore};

/// Everything one signed-in client needs, wired together.
///
/// The gateway, the appointment list and the booking workflow all share one
/// [`SessionGuard`], so a 401 seen anywhere is visible everywhere.
#[derive(Debug)]
pub struct App {
    api: ApiClient,
    navigator: Navigator,
    appointments: AppointmentList,
    booking: BookingWorkflow,
    events: broadcast::Receiver<AuthEvent>,
}

impl App {
    /// Real HTTP transport, session persisted to the configured file.
    pub fn from_config(config: &ClientConfig) -> Self {
        let store: Arc<dyn SessionStore> = Arc::new(FileStore::new(&config.session.store_path));
        let guard = SessionGuard::new(store);
        let api = ApiClient::from_config(&config.api, guard);
        Self::assemble(api, config)
    }

    /// Same wiring over a caller-supplied transport and guard.
    pub fn with_transport(
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
        guard: SessionGuard,
    ) -> Self {
        let api = ApiClient::with_transport(
            config.api.resolved_base_url(),
            config.api.timeout(),
            transport,
            guard,
        );
        Self::assemble(api, config)
    }

    fn assemble(api: ApiClient, config: &ClientConfig) -> Self {
        let events = api.subscribe_auth_events();
        let navigator = Navigator::new(api.session().clone());
        let appointments = AppointmentList::new(api.clone());
        let booking = BookingWorkflow::new(api.clone(), appointments.clone(), &config.booking);
        info!(
            "Client assembled, hours {}..={}",
            config.booking.first_hour, config.booking.last_hour
        );

        Self {
            api,
            navigator,
            appointments,
            booking,
            events,
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn session(&self) -> &SessionGuard {
        self.api.session()
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    pub fn appointments(&self) -> &AppointmentList {
        &self.appointments
    }

    pub fn booking(&self) -> &BookingWorkflow {
        &self.booking
    }

    /// Apply queued gateway events, then open `path`.
    pub fn navigate(&mut self, path: &str) -> Navigation {
        self.drain_auth_events();
        self.navigator.navigate(path)
    }

    /// Feed every queued [`AuthEvent`] to the navigator. Returns how many
    /// were applied.
    pub fn drain_auth_events(&mut self) -> usize {
        let mut applied = 0;
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    self.navigator.handle_auth_event(event);
                    applied += 1;
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    // Every event means "signed out", so one is as good as many.
                    warn!("Missed {} auth events", skipped);
                    self.navigator.handle_auth_event(AuthEvent::SessionRejected);
                    applied += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        if applied > 0 {
            debug!("Applied {} auth events", applied);
        }
        applied
    }
}

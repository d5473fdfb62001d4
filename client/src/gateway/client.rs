use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::NaiveDate;
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use http::{Method, Request, StatusCode};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use shared::types::client_config::ApiConfig;
use shared::types::{
    ActiveState, Appointment, AvailabilityQuery, BookingRequest, DashboardStats, DirectoryEntry,
    ErrorResponse, LoginData, LoginResponse, MedicalRecord, NewRecord, UserAccount, UserUpdate,
};

use super::multipart;
use super::pending::PendingCounter;
use super::transport::{HyperTransport, Transport};
use crate::error::{ClientError, ClientResult};
use crate::session::SessionGuard;

/// Characters escaped inside one path segment (`/` included).
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

fn segment(raw: &str) -> String {
    utf8_percent_encode(raw, SEGMENT).to_string()
}

/// Session-level notifications from the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    /// A request came back 401. The session is already cleared; whoever
    /// owns navigation should land on the login view.
    SessionRejected,
}

/// Thin wrapper over the REST API.
///
/// Every request carries the stored bearer token, holds a slot in the
/// shared [`PendingCounter`] until it finishes, and is bounded by the
/// configured timeout. Any 401 clears the session and broadcasts
/// [`AuthEvent::SessionRejected`]. Failures are mapped onto [`ClientError`]
/// here, so raw transport errors never reach callers.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiInner>,
}

struct ApiInner {
    base_url: String,
    timeout: Duration,
    transport: Arc<dyn Transport>,
    session: SessionGuard,
    pending: PendingCounter,
    events: broadcast::Sender<AuthEvent>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.base_url)
            .field("timeout", &self.inner.timeout)
            .field("pending", &self.inner.pending.count())
            .finish()
    }
}

impl ApiClient {
    /// Gateway over the real HTTP transport.
    pub fn from_config(config: &ApiConfig, session: SessionGuard) -> Self {
        Self::with_transport(
            config.resolved_base_url(),
            config.timeout(),
            Arc::new(HyperTransport::new()),
            session,
        )
    }

    pub fn with_transport(
        base_url: impl Into<String>,
        timeout: Duration,
        transport: Arc<dyn Transport>,
        session: SessionGuard,
    ) -> Self {
        let (events, _) = broadcast::channel(16);
        let base_url = base_url.into().trim_end_matches('/').to_string();
        info!("API gateway ready for {}", base_url);

        Self {
            inner: Arc::new(ApiInner {
                base_url,
                timeout,
                transport,
                session,
                pending: PendingCounter::new(),
                events,
            }),
        }
    }

    pub fn session(&self) -> &SessionGuard {
        &self.inner.session
    }

    pub fn pending(&self) -> &PendingCounter {
        &self.inner.pending
    }

    pub fn subscribe_auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }

    // -----------------------------------------------------------------------
    // Endpoints
    // -----------------------------------------------------------------------

    /// `POST /auth/login`. A 401 here means bad credentials.
    pub async fn login(&self, data: &LoginData) -> ClientResult<LoginResponse> {
        match self.post_json("/auth/login", data).await {
            Err(ClientError::AuthRejected) => Err(ClientError::InvalidCredentials),
            other => other,
        }
    }

    /// `GET /appointments/available?doctorId&date`, as an ordered set.
    pub async fn available_hours(
        &self,
        doctor_id: &str,
        date: NaiveDate,
    ) -> ClientResult<BTreeSet<u8>> {
        let query = AvailabilityQuery {
            doctor_id: doctor_id.to_string(),
            date,
        };
        let encoded = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(query.pairs())
            .finish();

        let raw: Vec<i64> = self
            .get_json(&format!("/appointments/available?{}", encoded))
            .await?;

        Ok(raw
            .into_iter()
            .filter_map(|hour| match u8::try_from(hour) {
                Ok(h) if h <= 23 => Some(h),
                _ => {
                    warn!("Ignoring out-of-range hour {} from availability", hour);
                    None
                }
            })
            .collect())
    }

    /// `GET /appointments/my`, in the order the server sent it.
    pub async fn my_appointments(&self) -> ClientResult<Vec<Appointment>> {
        self.get_json("/appointments/my").await
    }

    /// `POST /appointments/book`. A 400 that says the slot is gone is a
    /// conflict like a 409.
    pub async fn book(&self, request: &BookingRequest) -> ClientResult<Appointment> {
        match self.post_json("/appointments/book", request).await {
            Err(ClientError::Rejected {
                status: 400,
                message,
            }) if says_slot_taken(&message) => Err(ClientError::Conflict(message)),
            other => other,
        }
    }

    /// `POST /appointments/:id/cancel`.
    pub async fn cancel(&self, appointment_id: &str) -> ClientResult<Appointment> {
        let path = format!("/appointments/{}/cancel", segment(appointment_id));
        let body = self.execute(Method::POST, &path).await?;
        decode(&body)
    }

    /// `GET /doctors`.
    pub async fn doctors(&self) -> ClientResult<Vec<DirectoryEntry>> {
        self.get_json("/doctors").await
    }

    /// `GET /patients`.
    pub async fn patients(&self) -> ClientResult<Vec<DirectoryEntry>> {
        self.get_json("/patients").await
    }

    /// `GET /patients/:id`.
    pub async fn patient(&self, patient_id: &str) -> ClientResult<DirectoryEntry> {
        self.get_json(&format!("/patients/{}", segment(patient_id)))
            .await
    }

    /// `GET /records`: whatever the caller's role may see.
    pub async fn records(&self) -> ClientResult<Vec<MedicalRecord>> {
        self.get_json("/records").await
    }

    /// `GET /records/patient/:id`.
    pub async fn patient_records(&self, patient_id: &str) -> ClientResult<Vec<MedicalRecord>> {
        self.get_json(&format!("/records/patient/{}", segment(patient_id)))
            .await
    }

    /// `POST /records` as `multipart/form-data`.
    pub async fn create_record(&self, record: &NewRecord) -> ClientResult<MedicalRecord> {
        let form = multipart::encode_record(record);
        debug!(
            "Uploading record {:?} with {} file(s)",
            record.title,
            record.files.len()
        );
        let body = self
            .execute_with(
                Method::POST,
                "/records",
                Some((form.body.clone(), form.content_type())),
            )
            .await?;
        decode(&body)
    }

    /// `GET /dashboard` (admin).
    pub async fn dashboard(&self) -> ClientResult<DashboardStats> {
        self.get_json("/dashboard").await
    }

    /// `GET /users/:id` (admin).
    pub async fn user(&self, user_id: &str) -> ClientResult<UserAccount> {
        self.get_json(&format!("/users/{}", segment(user_id))).await
    }

    /// `PUT /users/:id` (admin).
    pub async fn update_user(&self, user_id: &str, update: &UserUpdate) -> ClientResult<UserAccount> {
        self.send_json(Method::PUT, &format!("/users/{}", segment(user_id)), update)
            .await
    }

    /// `PATCH /users/:id/toggle-active` (admin). Returns the new state.
    pub async fn toggle_user_active(&self, user_id: &str) -> ClientResult<bool> {
        let path = format!("/users/{}/toggle-active", segment(user_id));
        let body = self.execute(Method::PATCH, &path).await?;
        let state: ActiveState = decode(&body)?;
        info!(
            "User {} is now {}",
            user_id,
            if state.active { "active" } else { "inactive" }
        );
        Ok(state.active)
    }

    // -----------------------------------------------------------------------
    // Plumbing
    // -----------------------------------------------------------------------

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let body = self.execute(Method::GET, path).await?;
        decode(&body)
    }

    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        payload: &B,
    ) -> ClientResult<T> {
        self.send_json(Method::POST, path, payload).await
    }

    async fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        payload: &B,
    ) -> ClientResult<T> {
        let json = serde_json::to_vec(payload).map_err(|e| {
            error!("Failed to serialize request body for {}: {}", path, e);
            ClientError::Transient("could not encode request".to_string())
        })?;
        let body = self
            .execute_with(
                method,
                path,
                Some((json.into(), "application/json".to_string())),
            )
            .await?;
        decode(&body)
    }

    async fn execute(&self, method: Method, path: &str) -> ClientResult<Bytes> {
        self.execute_with(method, path, None).await
    }

    /// `body` carries its content type.
    async fn execute_with(
        &self,
        method: Method,
        path: &str,
        body: Option<(Bytes, String)>,
    ) -> ClientResult<Bytes> {
        let inner = &self.inner;
        let request = self.build_request(method.clone(), path, body)?;

        let _pending = inner.pending.begin();
        debug!("{} {} (in flight: {})", method, path, inner.pending.count());

        let response = match tokio::time::timeout(inner.timeout, inner.transport.send(request)).await
        {
            Err(_) => {
                warn!("{} {} timed out after {:?}", method, path, inner.timeout);
                return Err(ClientError::Transient("request timed out".to_string()));
            }
            Ok(Err(e)) => {
                warn!("{} {} failed: {}", method, path, e);
                return Err(ClientError::Transient(e.to_string()));
            }
            Ok(Ok(response)) => response,
        };

        let status = response.status();
        let body = response.into_body();
        debug!("{} {} -> {}", method, path, status);

        if status.is_success() {
            return Ok(body);
        }

        if status == StatusCode::UNAUTHORIZED {
            self.reject_session();
            return Err(ClientError::AuthRejected);
        }

        let message = ErrorResponse::text_from(&body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        });

        Err(map_status(status, message))
    }

    fn build_request(
        &self,
        method: Method,
        path: &str,
        body: Option<(Bytes, String)>,
    ) -> ClientResult<Request<Bytes>> {
        let uri = format!("{}{}", self.inner.base_url, path);
        let mut builder = Request::builder()
            .method(method)
            .uri(&uri)
            .header(ACCEPT, "application/json");

        if let Some(token) = self.inner.session.token() {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let body = match body {
            Some((bytes, content_type)) => {
                builder = builder.header(CONTENT_TYPE, content_type);
                bytes
            }
            None => Bytes::new(),
        };

        builder.body(body).map_err(|e| {
            error!("Failed to build request for {}: {}", uri, e);
            ClientError::Transient(format!("invalid request: {}", e))
        })
    }

    fn reject_session(&self) {
        warn!("Server rejected the session; signing out");
        if let Err(e) = self.inner.session.clear_session() {
            error!("Failed to clear rejected session: {}", e);
        }
        // No subscribers is fine: nobody is navigating.
        let _ = self.inner.events.send(AuthEvent::SessionRejected);
    }
}

fn map_status(status: StatusCode, message: String) -> ClientError {
    match status {
        StatusCode::CONFLICT => ClientError::Conflict(message),
        s if s.is_client_error() => ClientError::Rejected {
            status: s.as_u16(),
            message,
        },
        _ => ClientError::Transient(message),
    }
}

/// Whether a 400 from booking reports the slot as gone rather than a bad
/// request.
fn says_slot_taken(message: &str) -> bool {
    let message = message.to_lowercase();
    ["already booked", "not available", "unavailable", "slot taken", "already taken"]
        .iter()
        .any(|phrase| message.contains(phrase))
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> ClientResult<T> {
    serde_json::from_slice(body).map_err(|e| {
        error!("Malformed response body: {}", e);
        ClientError::Transient("malformed response".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_maps_to_conflict() {
        assert!(matches!(
            map_status(StatusCode::CONFLICT, "taken".into()),
            ClientError::Conflict(m) if m == "taken"
        ));
    }

    #[test]
    fn other_client_errors_are_rejections() {
        assert!(matches!(
            map_status(StatusCode::NOT_FOUND, "no doctor".into()),
            ClientError::Rejected { status: 404, .. }
        ));
        assert!(matches!(
            map_status(StatusCode::BAD_REQUEST, "bad".into()),
            ClientError::Rejected { status: 400, .. }
        ));
    }

    #[test]
    fn server_errors_are_transient() {
        assert!(matches!(
            map_status(StatusCode::BAD_GATEWAY, "down".into()),
            ClientError::Transient(_)
        ));
    }

    #[test]
    fn slot_taken_wording_is_recognised() {
        assert!(says_slot_taken("Slot already booked"));
        assert!(says_slot_taken("This time is not available"));
        assert!(says_slot_taken("Slot taken"));
        assert!(!says_slot_taken("doctorId is required"));
        assert!(!says_slot_taken("Invalid role for booking"));
    }

    #[test]
    fn path_segments_are_percent_encoded() {
        assert_eq!(segment("64f1c2"), "64f1c2");
        assert_eq!(segment("a b/c?d"), "a%20b%2Fc%3Fd");
        assert_eq!(segment("x+y"), "x+y");
    }

    #[test]
    fn undecodable_body_is_transient() {
        let r: ClientResult<Vec<Appointment>> = decode(b"<html>");
        assert!(matches!(r, Err(ClientError::Transient(_))));
    }
}

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{Method, Request, Response, StatusCode};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::Notify;

use client::App;
use client::gateway::{ApiClient, Transport, TransportFuture};
use client::session::{MemoryStore, SessionGuard};
use shared::types::{BookingRequest, ClientConfig};

pub const DOCTOR_ID: &str = "d1";
pub const PATIENT_ID: &str = "p1";
pub const USER_ID: &str = "u42";
const SECRET: &[u8] = b"test-secret";

#[derive(Serialize)]
struct Claims<'a> {
    sub: &'a str,
    role: &'a str,
    iat: i64,
    exp: i64,
}

/// A signed HS256 token expiring `ttl_secs` from now (negative for expired).
pub fn mint_token(sub: &str, role: &str, ttl_secs: i64) -> String {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub,
        role,
        iat: now,
        exp: now + ttl_secs,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET),
    )
    .unwrap()
}

/// Yield until at least `n` requests starting with `prefix` arrived.
pub async fn wait_for_calls(backend: &FakeBackend, prefix: &str, n: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while backend.count_calls(prefix) < n {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("request never arrived");
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn memory_guard() -> SessionGuard {
    SessionGuard::new(Arc::new(MemoryStore::new()))
}

/// Guard with a live session for `role`.
pub fn signed_in(role: &str) -> SessionGuard {
    let guard = memory_guard();
    guard
        .establish_session(&mint_token("u1", role, 3600), role, "Test User")
        .unwrap();
    guard
}

pub fn api(backend: &Arc<FakeBackend>, guard: SessionGuard) -> ApiClient {
    ApiClient::with_transport(
        "http://localhost:4001/api",
        Duration::from_secs(5),
        backend.clone(),
        guard,
    )
}

pub fn app(backend: &Arc<FakeBackend>, guard: SessionGuard) -> App {
    App::with_transport(&ClientConfig::default(), backend.clone(), guard)
}

// ---------------------------------------------------------------------------
// FakeBackend
// ---------------------------------------------------------------------------

struct Account {
    password: String,
    role: String,
    name: String,
}

struct Booked {
    id: String,
    doctor: String,
    patient: String,
    slot: NaiveDateTime,
    cancelled: bool,
}

#[derive(Default)]
struct BackendState {
    accounts: HashMap<String, Account>,
    /// Opening hours per doctor and day, before bookings are taken out.
    open: HashMap<(String, NaiveDate), BTreeSet<u8>>,
    booked: Vec<Booked>,
    /// `"METHOD /path?query"` of every request, in arrival order.
    calls: Vec<String>,
    /// Bearer token of every request, in arrival order.
    tokens: Vec<Option<String>>,
    /// Forced answers keyed by `"METHOD /path"`.
    forced: HashMap<String, (StatusCode, Value)>,
    /// Slots a concurrent booker grabs the moment our booking arrives.
    steal_on_book: Vec<(String, NaiveDateTime)>,
    records: Vec<Value>,
    users: HashMap<String, Value>,
    next_id: u32,
}

/// In-process stand-in for the REST backend. Requests are answered from
/// in-memory state; `/echo?delay_ms=N` sleeps before answering `{}`.
#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<BackendState>,
    book_gate: Mutex<Option<Arc<Notify>>>,
    held_doctors: Mutex<HashMap<String, Arc<Notify>>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        let backend = Self::default();
        {
            let mut st = backend.state.lock().unwrap();
            st.accounts.insert(
                "pat@example.com".to_string(),
                Account {
                    password: "secret".to_string(),
                    role: "patient".to_string(),
                    name: "Pat Patient".to_string(),
                },
            );
            st.accounts.insert(
                "doc@example.com".to_string(),
                Account {
                    password: "secret".to_string(),
                    role: "doctor".to_string(),
                    name: "Dr Doc".to_string(),
                },
            );
            st.records = vec![
                record_json("r1", "Checkup", PATIENT_ID, "2024-05-01T08:00:00Z"),
                record_json("r2", "X-ray", PATIENT_ID, "2024-06-02T09:30:00Z"),
                record_json("r3", "Allergy", "p2", "2024-05-20T12:00:00Z"),
            ];
            st.users.insert(
                USER_ID.to_string(),
                json!({
                    "_id": USER_ID,
                    "name": "Dana Doctor",
                    "email": "dana@example.com",
                    "role": "doctor",
                    "active": true
                }),
            );
        }
        Arc::new(backend)
    }

    pub fn open_hours(&self, doctor: &str, day: NaiveDate, hours: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .open
            .insert((doctor.to_string(), day), hours.iter().copied().collect());
    }

    /// Another client books `hour` directly.
    pub fn take_slot(&self, doctor: &str, day: NaiveDate, hour: u8) {
        let mut st = self.state.lock().unwrap();
        let slot = day.and_hms_opt(u32::from(hour), 0, 0).unwrap();
        st.insert_booking(doctor, "someone-else", slot);
    }

    pub fn steal_on_book(&self, doctor: &str, day: NaiveDate, hour: u8) {
        let slot = day.and_hms_opt(u32::from(hour), 0, 0).unwrap();
        self.state
            .lock()
            .unwrap()
            .steal_on_book
            .push((doctor.to_string(), slot));
    }

    pub fn force(&self, method: Method, path: &str, status: StatusCode, body: Value) {
        self.state
            .lock()
            .unwrap()
            .forced
            .insert(format!("{} {}", method, path), (status, body));
    }

    /// Hold every booking until the returned handle is notified.
    pub fn pause_bookings(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.book_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Hold availability answers for `doctor` until notified.
    pub fn hold_availability(&self, doctor: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.held_doctors
            .lock()
            .unwrap()
            .insert(doctor.to_string(), gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn tokens(&self) -> Vec<Option<String>> {
        self.state.lock().unwrap().tokens.clone()
    }

    async fn handle(&self, request: Request<Bytes>) -> Response<Bytes> {
        let method = request.method().clone();
        let path = request
            .uri()
            .path()
            .strip_prefix("/api")
            .unwrap_or(request.uri().path())
            .to_string();
        let query: HashMap<String, String> = request
            .uri()
            .query()
            .map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();
        let token = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::to_string);

        {
            let mut st = self.state.lock().unwrap();
            let line = match request.uri().query() {
                Some(q) => format!("{} {}?{}", method, path, q),
                None => format!("{} {}", method, path),
            };
            st.calls.push(line);
            st.tokens.push(token.clone());

            if let Some((status, body)) = st.forced.get(&format!("{} {}", method, path)) {
                return reply(*status, body);
            }
        }

        if path == "/echo" {
            let delay = query
                .get("delay_ms")
                .and_then(|d| d.parse().ok())
                .unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            return reply(StatusCode::OK, &json!({}));
        }

        if method == Method::POST && path == "/auth/login" {
            return self.login(request.body());
        }

        if token.is_none() {
            return reply(
                StatusCode::UNAUTHORIZED,
                &json!({ "message": "No token provided" }),
            );
        }

        if method == Method::POST && path == "/records" {
            return self.create_record(request).await;
        }

        if method == Method::POST && path == "/appointments/book" {
            let gate = self.book_gate.lock().unwrap().clone();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            return self.book(request.body());
        }

        if path == "/appointments/available" {
            let held = query
                .get("doctorId")
                .and_then(|d| self.held_doctors.lock().unwrap().get(d).cloned());
            if let Some(gate) = held {
                gate.notified().await;
            }
        }

        let mut st = self.state.lock().unwrap();
        match (method.as_str(), path.as_str()) {
            ("GET", "/appointments/available") => {
                let doctor = query.get("doctorId").cloned().unwrap_or_default();
                let Some(day) = query.get("date").and_then(|d| d.parse().ok()) else {
                    return reply(
                        StatusCode::BAD_REQUEST,
                        &json!({ "message": "date is required" }),
                    );
                };
                let free: Vec<u8> = st.free_hours(&doctor, day).into_iter().collect();
                reply(StatusCode::OK, &json!(free))
            }
            ("GET", "/appointments/my") => {
                let list: Vec<Value> = st.booked.iter().map(Booked::to_json).collect();
                reply(StatusCode::OK, &json!(list))
            }
            ("GET", "/doctors") => reply(
                StatusCode::OK,
                &json!([
                    { "_id": DOCTOR_ID, "user": { "name": "Dr Doc" }, "specialization": "Cardiology" },
                    { "_id": "d2", "user": { "name": "Dr Two" } }
                ]),
            ),
            ("GET", "/patients") => reply(
                StatusCode::OK,
                &json!([{ "_id": PATIENT_ID, "user": { "name": "Pat Patient" } }]),
            ),
            ("GET", p) if p == format!("/patients/{}", PATIENT_ID) => reply(
                StatusCode::OK,
                &json!({
                    "_id": PATIENT_ID,
                    "user": { "name": "Pat Patient", "email": "pat@example.com" },
                    "contact": "555-0100"
                }),
            ),
            ("GET", "/records") => reply(StatusCode::OK, &json!(st.records)),
            ("GET", p) if p.starts_with("/records/patient/") => {
                let id = p.trim_start_matches("/records/patient/");
                let mine: Vec<&Value> = st
                    .records
                    .iter()
                    .filter(|r| r["patient"]["_id"] == id)
                    .collect();
                reply(StatusCode::OK, &json!(mine))
            }
            ("GET", "/dashboard") => reply(
                StatusCode::OK,
                &json!({
                    "doctors": 2,
                    "patients": 1,
                    "records": st.records.len(),
                    "appointments": st.booked.len(),
                    "appointmentsPerMonth": [
                        { "month": "May", "value": 3 },
                        { "month": "Jun", "value": 5 }
                    ],
                    "recordsByType": [
                        { "id": 0, "value": 2, "label": "Lab" },
                        { "id": 1, "value": 1, "label": "Imaging" }
                    ]
                }),
            ),
            ("PATCH", p) if p.starts_with("/users/") && p.ends_with("/toggle-active") => {
                let id = p
                    .trim_start_matches("/users/")
                    .trim_end_matches("/toggle-active");
                match st.users.get_mut(id) {
                    Some(user) => {
                        let active = !user["active"].as_bool().unwrap_or(true);
                        user["active"] = json!(active);
                        reply(StatusCode::OK, &json!({ "active": active }))
                    }
                    None => reply(StatusCode::NOT_FOUND, &json!({ "error": "User not found" })),
                }
            }
            ("GET", p) if p.starts_with("/users/") => {
                match st.users.get(p.trim_start_matches("/users/")) {
                    Some(user) => reply(StatusCode::OK, user),
                    None => reply(StatusCode::NOT_FOUND, &json!({ "error": "User not found" })),
                }
            }
            ("PUT", p) if p.starts_with("/users/") => {
                let id = p.trim_start_matches("/users/").to_string();
                let Ok(update) = serde_json::from_slice::<Value>(request.body()) else {
                    return reply(StatusCode::BAD_REQUEST, &json!({ "error": "Bad body" }));
                };
                match st.users.get_mut(&id) {
                    Some(user) => {
                        for key in ["name", "email", "role", "active"] {
                            user[key] = update[key].clone();
                        }
                        reply(StatusCode::OK, user)
                    }
                    None => reply(StatusCode::NOT_FOUND, &json!({ "error": "User not found" })),
                }
            }
            ("POST", p) if p.starts_with("/appointments/") && p.ends_with("/cancel") => {
                let id = p
                    .trim_start_matches("/appointments/")
                    .trim_end_matches("/cancel");
                match st.booked.iter_mut().find(|b| b.id == id) {
                    Some(b) if b.cancelled => reply(
                        StatusCode::CONFLICT,
                        &json!({ "message": "Appointment already cancelled" }),
                    ),
                    Some(b) => {
                        b.cancelled = true;
                        reply(StatusCode::OK, &b.to_json())
                    }
                    None => reply(
                        StatusCode::NOT_FOUND,
                        &json!({ "message": "Appointment not found" }),
                    ),
                }
            }
            _ => reply(StatusCode::NOT_FOUND, &json!({ "message": "Not found" })),
        }
    }

    /// `POST /records`: parse the multipart form the way the server does.
    async fn create_record(&self, request: Request<Bytes>) -> Response<Bytes> {
        let boundary = request
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|ct| multer::parse_boundary(ct).ok());
        let Some(boundary) = boundary else {
            return reply(StatusCode::BAD_REQUEST, &json!({ "error": "Expected multipart" }));
        };

        let body = request.into_body();
        let stream = futures_util::stream::once(async move { Ok::<Bytes, Infallible>(body) });
        let mut form = multer::Multipart::new(stream, boundary);

        let mut fields: HashMap<String, String> = HashMap::new();
        let mut files: Vec<Value> = Vec::new();
        while let Some(field) = form.next_field().await.unwrap() {
            let name = field.name().unwrap_or_default().to_string();
            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let content_type = field.content_type().map(|m| m.to_string());
                    let data = field.bytes().await.unwrap();
                    files.push(json!({
                        "field": name,
                        "name": file_name,
                        "type": content_type,
                        "size": data.len(),
                    }));
                }
                None => {
                    fields.insert(name, field.text().await.unwrap());
                }
            }
        }

        let title = fields.get("title").cloned().unwrap_or_default();
        if title.is_empty() {
            return reply(StatusCode::BAD_REQUEST, &json!({ "error": "Title is required" }));
        }
        let patient = fields.get("patientId").cloned().unwrap_or_default();

        let mut st = self.state.lock().unwrap();
        st.next_id += 1;
        let mut record = record_json(
            &format!("r{}", 100 + st.next_id),
            &title,
            &patient,
            "2024-07-01T10:00:00Z",
        );
        record["description"] = json!(fields.get("description").cloned().unwrap_or_default());
        record["files"] = json!(files);
        st.records.push(record.clone());
        reply(StatusCode::CREATED, &record)
    }

    /// Records stored so far, as the server would list them.
    pub fn stored_records(&self) -> Vec<Value> {
        self.state.lock().unwrap().records.clone()
    }

    fn login(&self, body: &Bytes) -> Response<Bytes> {
        let Ok(data) = serde_json::from_slice::<Value>(body) else {
            return reply(StatusCode::BAD_REQUEST, &json!({ "message": "Bad body" }));
        };
        let email = data["email"].as_str().unwrap_or_default();
        let password = data["password"].as_str().unwrap_or_default();

        let st = self.state.lock().unwrap();
        match st.accounts.get(email) {
            Some(account) if account.password == password => reply(
                StatusCode::OK,
                &json!({
                    "token": mint_token(email, &account.role, 3600),
                    "user": { "role": account.role, "name": account.name }
                }),
            ),
            _ => reply(
                StatusCode::UNAUTHORIZED,
                &json!({ "message": "Invalid credentials" }),
            ),
        }
    }

    fn book(&self, body: &Bytes) -> Response<Bytes> {
        let Ok(request) = serde_json::from_slice::<BookingRequest>(body) else {
            return reply(StatusCode::BAD_REQUEST, &json!({ "message": "Bad body" }));
        };

        let mut st = self.state.lock().unwrap();
        let stolen = st
            .steal_on_book
            .iter()
            .position(|(d, s)| *d == request.doctor_id && *s == request.slot);
        if let Some(i) = stolen {
            let (doctor, slot) = st.steal_on_book.remove(i);
            st.insert_booking(&doctor, "someone-else", slot);
        }

        let hour = u8::try_from(chrono::Timelike::hour(&request.slot)).unwrap_or(99);
        if !st
            .free_hours(&request.doctor_id, request.slot.date())
            .contains(&hour)
        {
            return reply(
                StatusCode::CONFLICT,
                &json!({ "message": "Slot already booked" }),
            );
        }

        let patient = request.patient_id.as_deref().unwrap_or(PATIENT_ID);
        let booked = st.insert_booking(&request.doctor_id, patient, request.slot);
        reply(StatusCode::CREATED, &booked)
    }
}

impl BackendState {
    fn free_hours(&self, doctor: &str, day: NaiveDate) -> BTreeSet<u8> {
        let mut hours = self
            .open
            .get(&(doctor.to_string(), day))
            .cloned()
            .unwrap_or_default();
        for b in &self.booked {
            if b.doctor == doctor && b.slot.date() == day && !b.cancelled {
                hours.remove(&(chrono::Timelike::hour(&b.slot) as u8));
            }
        }
        hours
    }

    fn insert_booking(&mut self, doctor: &str, patient: &str, slot: NaiveDateTime) -> Value {
        self.next_id += 1;
        let booked = Booked {
            id: format!("a{}", self.next_id),
            doctor: doctor.to_string(),
            patient: patient.to_string(),
            slot,
            cancelled: false,
        };
        let json = booked.to_json();
        self.booked.push(booked);
        json
    }
}

impl Booked {
    fn to_json(&self) -> Value {
        json!({
            "_id": self.id,
            "doctor": { "_id": self.doctor, "user": { "name": "Dr Doc" } },
            "patient": self.patient,
            "slot": self.slot.format("%Y-%m-%dT%H:%M:%S").to_string(),
            "status": if self.cancelled { "cancelled" } else { "booked" },
        })
    }
}

fn record_json(id: &str, title: &str, patient: &str, created_at: &str) -> Value {
    json!({
        "_id": id,
        "title": title,
        "description": format!("{} notes", title),
        "patient": { "_id": patient, "user": { "name": "Pat Patient" } },
        "doctor": { "_id": DOCTOR_ID, "user": { "name": "Dr Doc" } },
        "createdAt": created_at,
    })
}

fn reply(status: StatusCode, body: &Value) -> Response<Bytes> {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Bytes::from(body.to_string()))
        .unwrap()
}

impl Transport for FakeBackend {
    fn send(&self, request: Request<Bytes>) -> TransportFuture<'_> {
        Box::pin(async move { Ok(self.handle(request).await) })
    }
}

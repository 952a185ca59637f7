// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures: unsigned JWTs and an axum mock of the API plus its
//! renewal endpoint.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::Mutex;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;

use crate::coordinator::RefreshCoordinator;
use crate::credential::persist::MemoryVault;
use crate::credential::store::CredentialStore;
use crate::credential::{epoch_secs, AccessCredential, CredentialPair, RenewalCredential};
use crate::events::NotificationChannel;
use crate::gateway::RequestGateway;
use crate::renewal::RenewalClient;
use crate::scheduler::{ExpiryScheduler, RenewalSignal};

/// Unsigned JWT whose payload carries `exp`.
pub fn jwt_with_exp(exp: u64, subject: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(json!({ "sub": subject, "exp": exp }).to_string());
    format!("{header}.{payload}.sig")
}

/// Unsigned JWT expiring `secs` from now (negative for already expired).
pub fn jwt_expiring_in(secs: i64, subject: &str) -> String {
    let exp = if secs >= 0 {
        epoch_secs() + secs as u64
    } else {
        epoch_secs().saturating_sub(secs.unsigned_abs())
    };
    jwt_with_exp(exp, subject)
}

pub fn pair(access: &str, renewal: Option<&str>) -> CredentialPair {
    CredentialPair::new(AccessCredential::new(access), renewal.map(RenewalCredential::new))
}

/// What the mock renewal endpoint answers.
#[derive(Debug, Clone)]
pub enum RenewalBehavior {
    /// 200 with this access token and refresh token; the token becomes valid.
    Issue { token: String, refresh_token: String },
    /// This status with an error body.
    Reject(u16),
    /// 200 with a body missing the expected fields.
    Garbage,
}

#[derive(Clone)]
struct MockState {
    renewals: Arc<AtomicU32>,
    api_calls: Arc<AtomicU32>,
    valid_token: Arc<Mutex<Option<String>>>,
    seen_bearers: Arc<Mutex<Vec<Option<String>>>>,
    renewal_bearers: Arc<Mutex<Vec<Option<String>>>>,
    behavior: Arc<Mutex<RenewalBehavior>>,
    renewal_gate: Arc<Semaphore>,
    gated: bool,
}

/// A running mock server on `127.0.0.1:0`.
pub struct MockApi {
    pub addr: SocketAddr,
    state: MockState,
}

impl MockApi {
    /// Serve with `valid_token` accepted on `/api/data` and renewals answered
    /// per `behavior`. A gated server holds every renewal until
    /// [`release_renewals`](Self::release_renewals).
    pub async fn start(
        valid_token: Option<&str>,
        behavior: RenewalBehavior,
        gated: bool,
    ) -> anyhow::Result<Self> {
        let state = MockState {
            renewals: Arc::new(AtomicU32::new(0)),
            api_calls: Arc::new(AtomicU32::new(0)),
            valid_token: Arc::new(Mutex::new(valid_token.map(str::to_owned))),
            seen_bearers: Arc::new(Mutex::new(Vec::new())),
            renewal_bearers: Arc::new(Mutex::new(Vec::new())),
            behavior: Arc::new(Mutex::new(behavior)),
            renewal_gate: Arc::new(Semaphore::new(0)),
            gated,
        };

        let app = Router::new()
            .route("/auth/token", post(renew))
            .route("/api/data", get(data))
            .route("/api/always-401", get(always_unauthorized))
            .route("/api/boom", get(boom))
            .route("/api/missing", get(missing))
            .route("/api/forbidden", get(forbidden))
            .route("/api/empty", get(empty))
            .route("/api/text", get(text))
            .route("/api/echo", post(echo))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Ok(Self { addr, state })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn renewal_url(&self) -> String {
        format!("http://{}/auth/token", self.addr)
    }

    pub fn renewals(&self) -> u32 {
        self.state.renewals.load(Ordering::SeqCst)
    }

    pub fn api_calls(&self) -> u32 {
        self.state.api_calls.load(Ordering::SeqCst)
    }

    /// Bearer tokens seen by the API routes, in arrival order.
    pub fn seen_bearers(&self) -> Vec<Option<String>> {
        self.state.seen_bearers.lock().clone()
    }

    /// Bearer tokens presented to the renewal endpoint.
    pub fn renewal_bearers(&self) -> Vec<Option<String>> {
        self.state.renewal_bearers.lock().clone()
    }

    pub fn release_renewals(&self, n: usize) {
        self.state.renewal_gate.add_permits(n);
    }
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_owned)
}

fn record(s: &MockState, headers: &HeaderMap) -> Option<String> {
    s.api_calls.fetch_add(1, Ordering::SeqCst);
    let token = bearer(headers);
    s.seen_bearers.lock().push(token.clone());
    token
}

async fn renew(State(s): State<MockState>, headers: HeaderMap) -> (StatusCode, Json<serde_json::Value>) {
    s.renewals.fetch_add(1, Ordering::SeqCst);
    s.renewal_bearers.lock().push(bearer(&headers));
    if s.gated {
        if let Ok(permit) = s.renewal_gate.acquire().await {
            permit.forget();
        }
    }

    let behavior = s.behavior.lock().clone();
    match behavior {
        RenewalBehavior::Issue { token, refresh_token } => {
            *s.valid_token.lock() = Some(token.clone());
            (StatusCode::OK, Json(json!({ "token": token, "refreshToken": refresh_token })))
        }
        RenewalBehavior::Reject(status) => (
            StatusCode::from_u16(status).unwrap_or(StatusCode::UNAUTHORIZED),
            Json(json!({ "message": "refresh token revoked" })),
        ),
        RenewalBehavior::Garbage => (StatusCode::OK, Json(json!({ "unexpected": true }))),
    }
}

async fn data(State(s): State<MockState>, headers: HeaderMap) -> (StatusCode, Json<serde_json::Value>) {
    let token = record(&s, &headers);
    let valid = s.valid_token.lock().clone();
    if token.is_some() && token == valid {
        (StatusCode::OK, Json(json!({ "ok": true })))
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({ "message": "token expired" })))
    }
}

async fn always_unauthorized(
    State(s): State<MockState>,
    headers: HeaderMap,
) -> (StatusCode, Json<serde_json::Value>) {
    record(&s, &headers);
    (StatusCode::UNAUTHORIZED, Json(json!({ "message": "account suspended" })))
}

async fn boom(State(s): State<MockState>, headers: HeaderMap) -> (StatusCode, Json<serde_json::Value>) {
    record(&s, &headers);
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "message": "database unavailable" })))
}

async fn missing(State(s): State<MockState>, headers: HeaderMap) -> (StatusCode, Json<serde_json::Value>) {
    record(&s, &headers);
    (StatusCode::NOT_FOUND, Json(json!({ "error": "goal not found" })))
}

async fn forbidden(State(s): State<MockState>, headers: HeaderMap) -> StatusCode {
    record(&s, &headers);
    StatusCode::FORBIDDEN
}

async fn empty(State(s): State<MockState>, headers: HeaderMap) -> StatusCode {
    record(&s, &headers);
    StatusCode::NO_CONTENT
}

async fn text(State(s): State<MockState>, headers: HeaderMap) -> (StatusCode, &'static str) {
    record(&s, &headers);
    (StatusCode::OK, "pong")
}

async fn echo(
    State(s): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> (StatusCode, Json<serde_json::Value>) {
    record(&s, &headers);
    (StatusCode::CREATED, Json(json!({ "received": body })))
}

/// Everything below the session, wired against a mock server.
pub struct Harness {
    pub store: Arc<CredentialStore>,
    pub vault: Arc<MemoryVault>,
    pub scheduler: Arc<ExpiryScheduler>,
    pub signals: tokio::sync::mpsc::Receiver<RenewalSignal>,
    pub coordinator: Arc<RefreshCoordinator>,
    pub gateway: RequestGateway,
    pub events: NotificationChannel,
}

impl Harness {
    pub fn new(base_url: &str, renewal_url: &str, initial: Option<CredentialPair>) -> anyhow::Result<Self> {
        let http = crate::http_client(Duration::from_secs(5))?;
        let vault = Arc::new(MemoryVault::new());
        let store = Arc::new(CredentialStore::new(vault.clone()));
        if let Some(pair) = initial {
            store.set(pair);
        }
        let events = NotificationChannel::new(16);
        let (scheduler, signals) = ExpiryScheduler::new(Arc::clone(&store), Duration::from_secs(60));
        let scheduler = Arc::new(scheduler);
        let coordinator = RefreshCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&scheduler),
            RenewalClient::new(http.clone(), renewal_url),
            events.clone(),
        );
        let gateway = RequestGateway::new(
            http,
            base_url,
            Arc::clone(&store),
            Arc::clone(&coordinator),
            events.clone(),
        );
        Ok(Self { store, vault, scheduler, signals, coordinator, gateway, events })
    }

    pub fn against(mock: &MockApi, initial: Option<CredentialPair>) -> anyhow::Result<Self> {
        Self::new(&mock.base_url(), &mock.renewal_url(), initial)
    }
}

/// Poll `cond` until it holds, failing after two seconds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !cond() {
        if tokio::time::Instant::now() >= deadline {
            anyhow::bail!("condition not reached in time");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    Ok(())
}

/// An address nothing listens on.
pub async fn closed_addr() -> anyhow::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(addr)
}

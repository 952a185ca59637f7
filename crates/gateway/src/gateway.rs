// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The entry point for authenticated calls.
//!
//! Each call is a [`CallAttempt`]: sent with the current credential, and on a
//! first 401 renewed through the coordinator and resent exactly once. The
//! resent response is final whatever its status.

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::coordinator::RefreshCoordinator;
use crate::credential::store::CredentialStore;
use crate::credential::AccessCredential;
use crate::error::CallError;
use crate::events::{GatewayEvent, NotificationChannel};

/// A caller-issued request, relative to the gateway's base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), query: Vec::new(), body: None }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::PUT, path).with_body(body)
    }

    pub fn patch(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::PATCH, path).with_body(body)
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

/// Successful response with its body normalized to JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    /// `Null` for an empty body, a JSON string for a non-JSON body.
    pub data: serde_json::Value,
}

/// How a response status is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    Success,
    Unauthorized,
    Failure,
}

impl ResponseClass {
    pub fn of(status: StatusCode) -> Self {
        if status == StatusCode::UNAUTHORIZED {
            Self::Unauthorized
        } else if status.is_client_error() || status.is_server_error() {
            Self::Failure
        } else {
            Self::Success
        }
    }
}

/// Where a call attempt is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Sent,
    Refreshing,
    Resent,
}

/// One call and its single permitted retry.
#[derive(Debug)]
struct CallAttempt {
    id: Uuid,
    request: ApiRequest,
    bearer: Option<String>,
    retried: bool,
    state: AttemptState,
}

impl CallAttempt {
    fn new(request: ApiRequest, bearer: Option<String>) -> Self {
        Self { id: Uuid::new_v4(), request, bearer, retried: false, state: AttemptState::Sent }
    }

    fn may_refresh(&self) -> bool {
        !self.retried
    }

    fn begin_refresh(&mut self) {
        self.state = AttemptState::Refreshing;
    }

    fn resend_with(&mut self, credential: &AccessCredential) {
        self.bearer = Some(credential.token().to_owned());
        self.retried = true;
        self.state = AttemptState::Resent;
    }
}

struct RawResponse {
    status: StatusCode,
    data: serde_json::Value,
}

/// Issues authenticated calls against one API base URL.
pub struct RequestGateway {
    http: reqwest::Client,
    base_url: String,
    store: Arc<CredentialStore>,
    coordinator: Arc<RefreshCoordinator>,
    events: NotificationChannel,
}

impl RequestGateway {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        store: Arc<CredentialStore>,
        coordinator: Arc<RefreshCoordinator>,
        events: NotificationChannel,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self { http, base_url, store, coordinator, events }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue `request` with the current credential.
    pub async fn call(&self, request: ApiRequest) -> Result<ApiResponse, CallError> {
        let mut attempt = CallAttempt::new(request, self.store.access_token());

        loop {
            let raw = self.send(&attempt).await?;
            match ResponseClass::of(raw.status) {
                ResponseClass::Success => {
                    return Ok(ApiResponse { status: raw.status.as_u16(), data: raw.data });
                }
                ResponseClass::Unauthorized if attempt.may_refresh() => {
                    attempt.begin_refresh();
                    tracing::debug!(attempt = %attempt.id, path = %attempt.request.path, "unauthorized, renewing");
                    // The coordinator has already published `session-ended` on failure.
                    let credential = self.coordinator.refresh().await?;
                    attempt.resend_with(&credential);
                }
                ResponseClass::Unauthorized => {
                    let message = server_message(&raw.data, raw.status);
                    tracing::warn!(attempt = %attempt.id, path = %attempt.request.path, "unauthorized after renewal");
                    return Err(CallError::Unauthorized { message });
                }
                ResponseClass::Failure => {
                    let status = raw.status.as_u16();
                    let message = server_message(&raw.data, raw.status);
                    tracing::debug!(attempt = %attempt.id, status, %message, "api error");
                    self.events.publish(GatewayEvent::ApiError { status, message: message.clone() });
                    return Err(CallError::Api { status, message, body: raw.data });
                }
            }
        }
    }

    /// [`call`](Self::call) and decode a successful body into `T`.
    pub async fn call_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, CallError> {
        let resp = self.call(request).await?;
        serde_json::from_value(resp.data).map_err(|e| CallError::Decode(e.to_string()))
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse, CallError> {
        self.call(ApiRequest::get(path)).await
    }

    pub async fn post(&self, path: &str, body: serde_json::Value) -> Result<ApiResponse, CallError> {
        self.call(ApiRequest::post(path, body)).await
    }

    pub async fn put(&self, path: &str, body: serde_json::Value) -> Result<ApiResponse, CallError> {
        self.call(ApiRequest::put(path, body)).await
    }

    pub async fn patch(&self, path: &str, body: serde_json::Value) -> Result<ApiResponse, CallError> {
        self.call(ApiRequest::patch(path, body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse, CallError> {
        self.call(ApiRequest::delete(path)).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, attempt: &CallAttempt) -> Result<RawResponse, CallError> {
        let request = &attempt.request;
        let mut url = reqwest::Url::parse(&self.url(&request.path))
            .map_err(|e| CallError::Transport(format!("invalid url: {e}")))?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }
        let mut req = self.http.request(request.method.clone(), url);
        if let Some(ref body) = request.body {
            req = req.json(body);
        }
        if let Some(ref token) = attempt.bearer {
            req = req.bearer_auth(token);
        }

        tracing::trace!(attempt = %attempt.id, state = ?attempt.state, method = %request.method, path = %request.path, "sending");
        let resp = req.send().await.map_err(|e| CallError::Transport(e.to_string()))?;
        let status = resp.status();
        let bytes = resp.bytes().await.map_err(|e| CallError::Transport(e.to_string()))?;
        Ok(RawResponse { status, data: normalize_body(&bytes) })
    }
}

/// One body shape for every branch: JSON as-is, empty as `Null`, anything
/// else as a JSON string.
pub fn normalize_body(bytes: &[u8]) -> serde_json::Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return serde_json::Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

/// The server's message: `message`, then `error`, then a plain string body,
/// then the status reason.
pub fn server_message(body: &serde_json::Value, status: StatusCode) -> String {
    let from_body = match body {
        serde_json::Value::Object(map) => ["message", "error"]
            .iter()
            .find_map(|key| map.get(*key).and_then(|v| v.as_str()))
            .map(str::to_owned),
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        _ => None,
    };
    from_body.unwrap_or_else(|| match status.canonical_reason() {
        Some(reason) => reason.to_owned(),
        None => format!("HTTP {}", status.as_u16()),
    })
}

#[cfg(test)]
#[path = "gateway_tests.rs"]
mod tests;

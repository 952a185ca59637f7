// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Renewal endpoint client: exchanges the renewal credential for a new pair.

use serde::Deserialize;

use crate::credential::{AccessCredential, CredentialPair, RenewalCredential};
use crate::error::RenewalError;
use crate::gateway::{normalize_body, server_message};

/// Longest server message kept in a [`RenewalError::Rejected`].
const MAX_MESSAGE_LEN: usize = 512;

/// Success body of the renewal endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewalResponse {
    pub token: String,
    pub refresh_token: String,
}

/// Performs the renewal round trip. One request per call, no retries: a
/// failed renewal ends the session.
#[derive(Debug, Clone)]
pub struct RenewalClient {
    http: reqwest::Client,
    url: String,
}

impl RenewalClient {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self { http, url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn renew(&self, renewal: &RenewalCredential) -> Result<CredentialPair, RenewalError> {
        let resp = self
            .http
            .post(&self.url)
            .bearer_auth(renewal.as_str())
            .send()
            .await
            .map_err(|e| RenewalError::Unreachable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.bytes().await.unwrap_or_default();
            let mut message = server_message(&normalize_body(&body), status);
            if message.len() > MAX_MESSAGE_LEN {
                let mut end = MAX_MESSAGE_LEN;
                while !message.is_char_boundary(end) {
                    end -= 1;
                }
                message.truncate(end);
            }
            return Err(RenewalError::Rejected { status: status.as_u16(), message });
        }

        let body: RenewalResponse =
            resp.json().await.map_err(|e| RenewalError::Malformed(e.to_string()))?;
        Ok(CredentialPair::new(
            AccessCredential::new(body.token),
            Some(RenewalCredential::new(body.refresh_token)),
        ))
    }
}

#[cfg(test)]
#[path = "renewal_tests.rs"]
mod tests;

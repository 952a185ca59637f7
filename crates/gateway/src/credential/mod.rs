// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential types: the bearer access credential, the renewal credential that
//! exchanges for a new one, and the pair the store owns.
//!
//! Access credentials are JWTs. Only the `exp` claim of the payload is read;
//! signatures are the server's business.

pub mod persist;
pub mod store;

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::credential::persist::PersistedCredentials;

/// Short-lived bearer token plus its decoded expiry.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessCredential {
    token: String,
    /// Epoch seconds. `None` when the token carries no decodable `exp` claim.
    expires_at: Option<u64>,
}

impl AccessCredential {
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        let expires_at = decode_expiry(&token);
        Self { token, expires_at }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> Option<u64> {
        self.expires_at
    }

    /// Seconds until expiry, zero once expired. `None` without an expiry claim.
    pub fn expires_in(&self) -> Option<u64> {
        self.expires_at.map(|exp| exp.saturating_sub(epoch_secs()))
    }
}

impl fmt::Debug for AccessCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessCredential")
            .field("token", &format_args!("<{} bytes>", self.token.len()))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Longer-lived secret used only against the renewal endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct RenewalCredential(String);

impl RenewalCredential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RenewalCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RenewalCredential(<redacted>)")
    }
}

/// The access/renewal pair. Replaced as a whole on login and renewal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialPair {
    pub access: AccessCredential,
    pub renewal: Option<RenewalCredential>,
}

impl CredentialPair {
    pub fn new(access: AccessCredential, renewal: Option<RenewalCredential>) -> Self {
        Self { access, renewal }
    }

    pub(crate) fn to_persisted(&self) -> PersistedCredentials {
        PersistedCredentials {
            access_token: self.access.token().to_owned(),
            refresh_token: self.renewal.as_ref().map(|r| r.as_str().to_owned()),
        }
    }

    pub(crate) fn from_persisted(persisted: PersistedCredentials) -> Self {
        Self {
            access: AccessCredential::new(persisted.access_token),
            renewal: persisted.refresh_token.map(RenewalCredential::new),
        }
    }
}

/// Decode the `exp` claim (epoch seconds) from a JWT's payload segment.
///
/// Returns `None` for anything that is not a three-segment token with a
/// base64url JSON payload holding a non-negative numeric `exp`.
pub fn decode_expiry(token: &str) -> Option<u64> {
    let mut segments = token.split('.');
    let (_header, payload, _signature) = (segments.next()?, segments.next()?, segments.next()?);
    if segments.next().is_some() {
        return None;
    }

    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.get("exp")?;
    exp.as_u64().or_else(|| exp.as_f64().filter(|v| v.is_finite() && *v >= 0.0).map(|v| v as u64))
}

/// Current wall-clock time in epoch seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

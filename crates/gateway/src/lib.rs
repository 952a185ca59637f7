// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authgate: authenticated request gateway with single-flight credential
//! renewal and proactive expiry scheduling.

pub mod config;
pub mod coordinator;
pub mod credential;
pub mod error;
pub mod events;
pub mod gateway;
pub mod renewal;
pub mod scheduler;
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Once;
use std::time::Duration;

pub use crate::config::GatewayConfig;
pub use crate::credential::{AccessCredential, CredentialPair, RenewalCredential};
pub use crate::error::{CallError, RenewalError};
pub use crate::events::GatewayEvent;
pub use crate::gateway::{ApiRequest, ApiResponse};
pub use crate::session::AuthSession;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls. Only the first call
/// has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// HTTP client shared by API calls and renewals.
pub fn http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    ensure_crypto();
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for an authenticated gateway session.
#[derive(Debug, Clone, clap::Args)]
pub struct GatewayConfig {
    /// Base URL of the API that calls and renewals are sent to.
    #[arg(long, default_value = "http://127.0.0.1:8080", env = "AUTHGATE_BASE_URL")]
    pub base_url: String,

    /// Path of the renewal endpoint, relative to the base URL.
    #[arg(long, default_value = "/auth/token", env = "AUTHGATE_RENEWAL_PATH")]
    pub renewal_path: String,

    /// Renew this many seconds before the access credential expires.
    #[arg(long, default_value_t = 60, env = "AUTHGATE_SAFETY_MARGIN_SECS")]
    pub safety_margin_secs: u64,

    /// Timeout for API calls and renewals, in milliseconds.
    #[arg(long, default_value_t = 30000, env = "AUTHGATE_REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: u64,

    /// Directory holding persisted credentials.
    #[arg(long, env = "AUTHGATE_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Buffered notifications per subscriber before it starts lagging.
    #[arg(long, default_value_t = 64, env = "AUTHGATE_EVENT_CAPACITY")]
    pub event_capacity: usize,
}

impl GatewayConfig {
    pub fn safety_margin(&self) -> Duration {
        Duration::from_secs(self.safety_margin_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn renewal_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.renewal_path)
    }

    /// Resolve the state directory.
    ///
    /// Uses `--state-dir`/`AUTHGATE_STATE_DIR`, then `$XDG_STATE_HOME/authgate`,
    /// then `$HOME/.local/state/authgate`.
    pub fn state_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.state_dir {
            return dir.clone();
        }
        if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
            return PathBuf::from(xdg).join("authgate");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".local/state/authgate");
        }
        PathBuf::from(".authgate")
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_owned(),
            renewal_path: "/auth/token".to_owned(),
            safety_margin_secs: 60,
            request_timeout_ms: 30000,
            state_dir: None,
            event_capacity: 64,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

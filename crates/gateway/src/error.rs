// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

/// Why a credential renewal failed. Every waiter of one renewal cycle gets
/// the same value, hence `Clone`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewalError {
    /// The store holds no renewal credential to exchange.
    MissingCredential,
    /// The renewal endpoint answered with a non-2xx status.
    Rejected { status: u16, message: String },
    /// No response: connect failure, timeout, reset.
    Unreachable(String),
    /// 2xx with a body that is not `{ token, refreshToken }`.
    Malformed(String),
    /// The renewal task ended without reporting an outcome.
    Interrupted,
}

impl RenewalError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingCredential => "MISSING_CREDENTIAL",
            Self::Rejected { .. } => "RENEWAL_REJECTED",
            Self::Unreachable(_) => "RENEWAL_UNREACHABLE",
            Self::Malformed(_) => "RENEWAL_MALFORMED",
            Self::Interrupted => "RENEWAL_INTERRUPTED",
        }
    }
}

impl fmt::Display for RenewalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCredential => f.write_str("no renewal credential available"),
            Self::Rejected { status, message } => {
                write!(f, "renewal rejected ({status}): {message}")
            }
            Self::Unreachable(e) => write!(f, "renewal endpoint unreachable: {e}"),
            Self::Malformed(e) => write!(f, "malformed renewal response: {e}"),
            Self::Interrupted => f.write_str("renewal interrupted"),
        }
    }
}

impl std::error::Error for RenewalError {}

/// Terminal failure of a gateway call.
#[derive(Debug, Clone)]
pub enum CallError {
    /// No response was received.
    Transport(String),
    /// 401 on an attempt that was already retried with a renewed credential.
    Unauthorized { message: String },
    /// The 401-triggered renewal failed; the session has ended.
    Renewal(RenewalError),
    /// Any other 4xx/5xx, with the normalized body.
    Api { status: u16, message: String, body: serde_json::Value },
    /// A 2xx body did not match the type the caller asked for.
    Decode(String),
}

impl CallError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transport(_) => "TRANSPORT",
            Self::Unauthorized { .. } => "UNAUTHORIZED",
            Self::Renewal(e) => e.as_str(),
            Self::Api { .. } => "API_ERROR",
            Self::Decode(_) => "DECODE",
        }
    }

    /// HTTP status the server answered with, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { .. } => Some(401),
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the caller should treat the session as not authorized.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Unauthorized { .. } | Self::Renewal(_))
    }
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport error: {e}"),
            Self::Unauthorized { message } => write!(f, "unauthorized: {message}"),
            Self::Renewal(e) => write!(f, "unauthorized: {e}"),
            Self::Api { status, message, .. } => write!(f, "api error ({status}): {message}"),
            Self::Decode(e) => write!(f, "unexpected response body: {e}"),
        }
    }
}

impl std::error::Error for CallError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Renewal(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RenewalError> for CallError {
    fn from(e: RenewalError) -> Self {
        Self::Renewal(e)
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session notifications for the rest of the application.
//!
//! The gateway publishes; UI layers subscribe. Delivery is best-effort: a
//! publish with no subscribers is dropped, and a slow subscriber sees
//! `RecvError::Lagged` rather than blocking the publisher.

use std::fmt;

use tokio::sync::broadcast;

use crate::credential::AccessCredential;

/// Events published by the gateway core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    /// A renewal succeeded and this credential is now current.
    Renewed { credential: AccessCredential },
    /// Renewal failed; credentials were cleared and the user must log in again.
    SessionEnded { reason: String },
    /// A call failed with a server-reported error other than 401.
    ApiError { status: u16, message: String },
}

impl GatewayEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Renewed { .. } => "renewed",
            Self::SessionEnded { .. } => "session-ended",
            Self::ApiError { .. } => "api-error",
        }
    }
}

impl fmt::Display for GatewayEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Renewed { credential } => match credential.expires_at() {
                Some(exp) => write!(f, "renewed (expires_at={exp})"),
                None => f.write_str("renewed"),
            },
            Self::SessionEnded { reason } => write!(f, "session-ended: {reason}"),
            Self::ApiError { status, message } => write!(f, "api-error ({status}): {message}"),
        }
    }
}

/// Publish/subscribe seam between the gateway and its consumers.
#[derive(Debug, Clone)]
pub struct NotificationChannel {
    tx: broadcast::Sender<GatewayEvent>,
}

impl NotificationChannel {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to future events. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: GatewayEvent) {
        tracing::debug!(event = event.name(), "publishing");
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for NotificationChannel {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;

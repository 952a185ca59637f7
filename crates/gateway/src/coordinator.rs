// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-flight credential renewal.
//!
//! However many callers ask for a refresh at once, one renewal round trip is
//! made and every caller receives its outcome. The first caller moves the
//! state from `Idle` to `InFlight` and spawns the round trip; later callers
//! queue behind it. The check and the transition happen under one lock with
//! no suspension point in between.

use std::sync::Arc;

use parking_lot::Mutex;

use tokio::sync::oneshot;

use crate::credential::store::CredentialStore;
use crate::credential::AccessCredential;
use crate::error::RenewalError;
use crate::events::{GatewayEvent, NotificationChannel};
use crate::renewal::RenewalClient;
use crate::scheduler::ExpiryScheduler;

pub type RenewalOutcome = Result<AccessCredential, RenewalError>;

type Waiter = oneshot::Sender<RenewalOutcome>;

enum RefreshState {
    Idle,
    /// Waiters in enqueue order. The initiating caller is the first entry.
    InFlight(Vec<Waiter>),
}

/// Owns the refresh state; the only writer of the store besides logout.
pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
    store: Arc<CredentialStore>,
    scheduler: Arc<ExpiryScheduler>,
    renewal: RenewalClient,
    events: NotificationChannel,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<CredentialStore>,
        scheduler: Arc<ExpiryScheduler>,
        renewal: RenewalClient,
        events: NotificationChannel,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(RefreshState::Idle),
            store,
            scheduler,
            renewal,
            events,
        })
    }

    /// Renew the access credential, joining a renewal already in flight.
    ///
    /// Waiters resume in the order they called. Dropping the returned future
    /// does not cancel the renewal for the others.
    pub async fn refresh(self: &Arc<Self>) -> RenewalOutcome {
        let (tx, rx) = oneshot::channel();
        let initiate = {
            let mut state = self.state.lock();
            match &mut *state {
                RefreshState::Idle => {
                    *state = RefreshState::InFlight(vec![tx]);
                    true
                }
                RefreshState::InFlight(waiters) => {
                    waiters.push(tx);
                    tracing::debug!(waiters = waiters.len(), "joined in-flight renewal");
                    false
                }
            }
        };

        if initiate {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.run_renewal().await });
        }

        rx.await.unwrap_or(Err(RenewalError::Interrupted))
    }

    /// Wait for the in-flight renewal, if any, without starting one.
    pub async fn settled(&self) -> Option<RenewalOutcome> {
        let rx = match &mut *self.state.lock() {
            RefreshState::Idle => return None,
            RefreshState::InFlight(waiters) => {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                rx
            }
        };
        Some(rx.await.unwrap_or(Err(RenewalError::Interrupted)))
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(*self.state.lock(), RefreshState::InFlight(_))
    }

    /// Callers awaiting the in-flight renewal, the initiator included.
    pub fn waiter_count(&self) -> usize {
        match &*self.state.lock() {
            RefreshState::Idle => 0,
            RefreshState::InFlight(waiters) => waiters.len(),
        }
    }

    async fn run_renewal(&self) {
        // Releases the waiters (as `Interrupted`) if the round trip unwinds.
        let mut guard = SettleGuard { coordinator: self, armed: true };

        tracing::debug!(url = self.renewal.url(), "renewing credentials");
        let used = self.store.renewal_credential();
        let outcome = match used {
            Some(ref renewal) => self.renewal.renew(renewal).await,
            None => Err(RenewalError::MissingCredential),
        };

        if self.store.renewal_credential() != used {
            // Logout (and possibly a new login) happened while the round trip
            // was in flight; the outcome belongs to a session that is gone.
            guard.armed = false;
            let waiters = self.settle();
            tracing::info!(waiters = waiters.len(), "renewal outcome discarded, session changed");
            for waiter in waiters {
                let _ = waiter.send(Err(RenewalError::Interrupted));
            }
            return;
        }

        match outcome {
            Ok(pair) => {
                let access = pair.access.clone();
                self.store.set(pair);
                self.scheduler.schedule_renewed(&access);

                guard.armed = false;
                let waiters = self.settle();
                tracing::info!(
                    waiters = waiters.len(),
                    expires_at = ?access.expires_at(),
                    "credentials renewed"
                );
                for waiter in waiters {
                    let _ = waiter.send(Ok(access.clone()));
                }
                self.events.publish(GatewayEvent::Renewed { credential: access });
            }
            Err(e) => {
                self.store.clear();
                self.scheduler.cancel();

                guard.armed = false;
                let waiters = self.settle();
                tracing::warn!(waiters = waiters.len(), err = %e, "credential renewal failed");
                for waiter in waiters {
                    let _ = waiter.send(Err(e.clone()));
                }
                self.events.publish(GatewayEvent::SessionEnded { reason: e.to_string() });
            }
        }
    }

    /// Return to `Idle`, handing back the drained waiter queue.
    fn settle(&self) -> Vec<Waiter> {
        match std::mem::replace(&mut *self.state.lock(), RefreshState::Idle) {
            RefreshState::InFlight(waiters) => waiters,
            RefreshState::Idle => Vec::new(),
        }
    }
}

struct SettleGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    armed: bool,
}

impl Drop for SettleGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            // Dropped senders resolve every waiter with `Interrupted`.
            drop(self.coordinator.settle());
        }
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Proactive renewal: one cancellable timer per session, armed to fire a
//! safety margin before the access credential expires.
//!
//! The scheduler never renews by itself. When a timer fires (or a credential
//! is already due) it sends a [`RenewalSignal`]; the session's renewal driver
//! turns that into a coordinator refresh.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::credential::store::CredentialStore;
use crate::credential::{epoch_secs, AccessCredential, CredentialPair};

/// Why a renewal was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalSignal {
    /// The armed timer fired, or the credential was already inside the margin.
    Expiring,
    /// Re-validation after the process came back to the foreground found the
    /// credential due.
    Resumed,
}

/// Shortest wait before renewing a credential the renewal endpoint has just
/// issued.
pub const MIN_RENEWAL_DELAY: Duration = Duration::from_secs(10);

/// Seconds to wait before renewing, or `None` if renewal is already due.
pub fn renewal_delay(expires_at: u64, now: u64, margin: Duration) -> Option<Duration> {
    expires_at
        .checked_sub(now)?
        .checked_sub(margin.as_secs())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

/// Handle to one armed timer. Cancelled on [`cancel`](Self::cancel) or drop.
pub struct ScheduledTimer {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    deadline: Instant,
}

impl ScheduledTimer {
    fn start(
        delay: Duration,
        mut store_rx: watch::Receiver<Option<CredentialPair>>,
        signal_tx: mpsc::Sender<RenewalSignal>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let deadline = Instant::now() + delay;
        let handle = tokio::spawn(async move {
            let fired = tokio::select! {
                _ = token.cancelled() => false,
                _ = store_rx.wait_for(Option::is_none) => {
                    tracing::debug!("credentials cleared, renewal timer dropped");
                    false
                }
                _ = tokio::time::sleep_until(deadline) => true,
            };
            if fired && store_rx.borrow().is_some() {
                send_signal(&signal_tx, RenewalSignal::Expiring);
            }
        });
        Self { cancel, handle, deadline }
    }

    pub fn cancel(self) {
        drop(self);
    }

    pub fn is_live(&self) -> bool {
        !self.cancel.is_cancelled() && !self.handle.is_finished()
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

impl Drop for ScheduledTimer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn send_signal(tx: &mpsc::Sender<RenewalSignal>, signal: RenewalSignal) {
    match tx.try_send(signal) {
        Ok(()) => tracing::debug!(?signal, "renewal requested"),
        // A renewal request is already queued; one is enough.
        Err(mpsc::error::TrySendError::Full(_)) => {}
        Err(mpsc::error::TrySendError::Closed(_)) => {
            tracing::warn!(?signal, "renewal driver gone, request dropped");
        }
    }
}

/// Arms and re-arms the renewal timer for the current access credential.
pub struct ExpiryScheduler {
    store: Arc<CredentialStore>,
    margin: Duration,
    signal_tx: mpsc::Sender<RenewalSignal>,
    timer: Mutex<Option<ScheduledTimer>>,
}

impl ExpiryScheduler {
    /// Returns the scheduler and the receiving end of its renewal signals.
    pub fn new(
        store: Arc<CredentialStore>,
        margin: Duration,
    ) -> (Self, mpsc::Receiver<RenewalSignal>) {
        let (signal_tx, signal_rx) = mpsc::channel(1);
        let scheduler = Self { store, margin, signal_tx, timer: Mutex::new(None) };
        (scheduler, signal_rx)
    }

    pub fn margin(&self) -> Duration {
        self.margin
    }

    /// Arm the timer for `credential`, replacing any armed timer.
    ///
    /// A credential already inside the safety margin is signalled right away
    /// and no timer is armed. A credential without a readable expiry leaves no
    /// timer armed; the 401 path still renews it.
    pub fn schedule(&self, credential: &AccessCredential) {
        self.arm(credential, RenewalSignal::Expiring);
    }

    /// Arm the timer for a credential the renewal endpoint just issued.
    ///
    /// A credential that is already inside the margin when it arrives would
    /// otherwise signal the next renewal at once, forever; it waits
    /// [`MIN_RENEWAL_DELAY`] instead.
    pub fn schedule_renewed(&self, credential: &AccessCredential) {
        let due = credential
            .expires_at()
            .is_some_and(|exp| renewal_delay(exp, epoch_secs(), self.margin).is_none());
        if due {
            tracing::warn!(
                expires_at = ?credential.expires_at(),
                margin_secs = self.margin.as_secs(),
                "renewed credential expires inside the safety margin"
            );
            self.start_timer(MIN_RENEWAL_DELAY);
        } else {
            self.schedule(credential);
        }
    }

    /// Whether the stored credential is inside the safety margin.
    pub fn is_due(&self) -> bool {
        self.store
            .get()
            .and_then(|pair| pair.access.expires_at())
            .is_some_and(|exp| renewal_delay(exp, epoch_secs(), self.margin).is_none())
    }

    /// Re-validate the stored credential after the process resumes. Timers do
    /// not advance while the host is suspended, so the deadline is recomputed
    /// from the wall clock.
    pub fn on_resume(&self) {
        self.arm_stored(RenewalSignal::Resumed);
    }

    /// Arm the timer for whatever credential is stored now; cancel if none.
    pub fn rearm(&self) {
        self.arm_stored(RenewalSignal::Expiring);
    }

    fn arm_stored(&self, due_signal: RenewalSignal) {
        match self.store.get() {
            Some(pair) => self.arm(&pair.access, due_signal),
            None => self.cancel(),
        }
    }

    /// Drop any armed timer.
    pub fn cancel(&self) {
        if self.timer.lock().take().is_some() {
            tracing::debug!("renewal timer cancelled");
        }
    }

    pub fn is_armed(&self) -> bool {
        self.timer.lock().as_ref().is_some_and(ScheduledTimer::is_live)
    }

    /// Time left on the armed timer.
    pub fn next_renewal_in(&self) -> Option<Duration> {
        self.timer.lock().as_ref().filter(|t| t.is_live()).map(ScheduledTimer::remaining)
    }

    fn arm(&self, credential: &AccessCredential, due_signal: RenewalSignal) {
        let Some(expires_at) = credential.expires_at() else {
            tracing::warn!("access credential has no readable expiry, renewal not scheduled");
            self.cancel();
            return;
        };

        match renewal_delay(expires_at, epoch_secs(), self.margin) {
            None => {
                self.cancel();
                tracing::info!(expires_at, "credential due for renewal");
                send_signal(&self.signal_tx, due_signal);
            }
            Some(delay) => self.start_timer(delay),
        }
    }

    fn start_timer(&self, delay: Duration) {
        let timer = ScheduledTimer::start(delay, self.store.subscribe(), self.signal_tx.clone());
        // The replaced timer is cancelled when dropped here.
        let _previous = self.timer.lock().replace(timer);
        tracing::debug!(delay_secs = delay.as_secs(), "renewal timer armed");
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;

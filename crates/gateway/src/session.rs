// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wires the store, scheduler, coordinator and gateway into one session and
//! runs the renewal driver that serves the scheduler's signals.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::GatewayConfig;
use crate::coordinator::RefreshCoordinator;
use crate::credential::persist::CredentialVault;
use crate::credential::store::CredentialStore;
use crate::credential::CredentialPair;
use crate::events::{GatewayEvent, NotificationChannel};
use crate::gateway::RequestGateway;
use crate::renewal::RenewalClient;
use crate::scheduler::{ExpiryScheduler, RenewalSignal};

/// One authenticated session. Built once per process and shared by reference.
pub struct AuthSession {
    store: Arc<CredentialStore>,
    scheduler: Arc<ExpiryScheduler>,
    coordinator: Arc<RefreshCoordinator>,
    gateway: RequestGateway,
    events: NotificationChannel,
    shutdown: CancellationToken,
}

impl AuthSession {
    /// Build the session from `config`, rehydrating credentials from `vault`.
    ///
    /// Spawns the renewal driver, so this must run inside a Tokio runtime.
    pub fn start(config: &GatewayConfig, vault: Arc<dyn CredentialVault>) -> anyhow::Result<Self> {
        let session = Self::build(config, vault)?;
        if let Some(pair) = session.store.get() {
            session.scheduler.schedule(&pair.access);
        }
        Ok(session)
    }

    /// Like [`start`](Self::start), but the rehydrated credential is not
    /// scheduled. For processes that make a few calls and exit: a proactive
    /// renewal cut short by exit would leave a rotated-out renewal credential
    /// persisted. Calls still renew on 401.
    pub fn start_one_shot(
        config: &GatewayConfig,
        vault: Arc<dyn CredentialVault>,
    ) -> anyhow::Result<Self> {
        Self::build(config, vault)
    }

    fn build(config: &GatewayConfig, vault: Arc<dyn CredentialVault>) -> anyhow::Result<Self> {
        let http = crate::http_client(config.request_timeout())?;
        let store = Arc::new(CredentialStore::rehydrate(vault));
        let events = NotificationChannel::new(config.event_capacity);

        let (scheduler, signals) = ExpiryScheduler::new(Arc::clone(&store), config.safety_margin());
        let scheduler = Arc::new(scheduler);

        let renewal = RenewalClient::new(http.clone(), config.renewal_url());
        let coordinator = RefreshCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&scheduler),
            renewal,
            events.clone(),
        );
        let gateway = RequestGateway::new(
            http,
            config.base_url.clone(),
            Arc::clone(&store),
            Arc::clone(&coordinator),
            events.clone(),
        );

        let shutdown = CancellationToken::new();
        spawn_renewal_driver(
            Arc::clone(&coordinator),
            Arc::clone(&scheduler),
            signals,
            shutdown.clone(),
        );

        Ok(Self { store, scheduler, coordinator, gateway, events, shutdown })
    }

    /// Install a freshly obtained pair (login success) and arm renewal.
    pub fn establish(&self, pair: CredentialPair) {
        let access = pair.access.clone();
        self.store.set(pair);
        self.scheduler.schedule(&access);
        tracing::info!(expires_at = ?access.expires_at(), "session established");
    }

    pub fn logout(&self) {
        self.store.clear();
        self.scheduler.cancel();
        tracing::info!("logged out");
    }

    /// Host hook: the process regained foreground execution.
    pub fn on_resume(&self) {
        self.scheduler.on_resume();
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.get().is_some()
    }

    pub fn gateway(&self) -> &RequestGateway {
        &self.gateway
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn scheduler(&self) -> &Arc<ExpiryScheduler> {
        &self.scheduler
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.events.subscribe()
    }

    /// Stop the renewal driver and drop any armed timer. Credentials stay
    /// persisted.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.scheduler.cancel();
    }
}

impl Drop for AuthSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Spawn the task that turns scheduler signals into coordinator refreshes.
///
/// Signals that queued up while a renewal was running are collapsed into one,
/// and a signal is dropped when the stored credential is no longer due.
pub fn spawn_renewal_driver(
    coordinator: Arc<RefreshCoordinator>,
    scheduler: Arc<ExpiryScheduler>,
    mut signals: mpsc::Receiver<RenewalSignal>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let mut signal = tokio::select! {
                _ = shutdown.cancelled() => break,
                signal = signals.recv() => match signal {
                    Some(s) => s,
                    None => break,
                },
            };
            while let Ok(next) = signals.try_recv() {
                signal = next;
            }

            if !scheduler.is_due() {
                tracing::debug!(?signal, "stale renewal signal, credential no longer due");
                scheduler.rearm();
                continue;
            }

            tracing::info!(?signal, "proactive renewal");
            match coordinator.refresh().await {
                Ok(credential) => {
                    tracing::debug!(expires_at = ?credential.expires_at(), "proactive renewal done");
                }
                Err(e) => tracing::warn!(err = %e, "proactive renewal failed"),
            }
        }
    })
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory holder of the current credential pair, mirrored to a vault.

use std::sync::Arc;

use tokio::sync::watch;

use crate::credential::persist::CredentialVault;
use crate::credential::{CredentialPair, RenewalCredential};

/// Owns the current [`CredentialPair`].
///
/// Reads never block: the value lives in a `watch` channel, which also lets
/// the expiry scheduler notice a cleared store and drop its timer.
pub struct CredentialStore {
    current: watch::Sender<Option<CredentialPair>>,
    vault: Arc<dyn CredentialVault>,
}

impl CredentialStore {
    /// Empty store backed by `vault`. Nothing is read from the vault.
    pub fn new(vault: Arc<dyn CredentialVault>) -> Self {
        let (current, _) = watch::channel(None);
        Self { current, vault }
    }

    /// Store seeded from whatever the vault holds.
    ///
    /// An unreadable vault starts the store empty; the caller is logged out
    /// rather than prevented from starting.
    pub fn rehydrate(vault: Arc<dyn CredentialVault>) -> Self {
        let store = Self::new(Arc::clone(&vault));
        match vault.load() {
            Ok(Some(persisted)) => {
                let pair = CredentialPair::from_persisted(persisted);
                tracing::debug!(expires_at = ?pair.access.expires_at(), "rehydrated credentials");
                store.current.send_replace(Some(pair));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(err = %e, "failed to load persisted credentials"),
        }
        store
    }

    pub fn get(&self) -> Option<CredentialPair> {
        self.current.borrow().clone()
    }

    /// Current bearer token, if any.
    pub fn access_token(&self) -> Option<String> {
        self.current.borrow().as_ref().map(|p| p.access.token().to_owned())
    }

    pub fn renewal_credential(&self) -> Option<RenewalCredential> {
        self.current.borrow().as_ref().and_then(|p| p.renewal.clone())
    }

    /// Replace the current pair and persist it. Setting an equal pair is a no-op.
    pub fn set(&self, pair: CredentialPair) {
        let changed = self.current.send_if_modified(|current| {
            if current.as_ref() == Some(&pair) {
                return false;
            }
            *current = Some(pair.clone());
            true
        });
        if changed {
            if let Err(e) = self.vault.save(&pair.to_persisted()) {
                tracing::warn!(err = %e, "failed to persist credentials");
            }
        }
    }

    /// Drop the pair from memory and from the vault.
    pub fn clear(&self) {
        self.current.send_replace(None);
        if let Err(e) = self.vault.clear() {
            tracing::warn!(err = %e, "failed to clear persisted credentials");
        }
    }

    /// Observe replacements and clears.
    pub fn subscribe(&self) -> watch::Receiver<Option<CredentialPair>> {
        self.current.subscribe()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;

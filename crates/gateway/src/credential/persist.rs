// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable credential slots: the current access token and renewal token.
//!
//! [`FileVault`] keeps them in a JSON file with atomic writes; [`MemoryVault`]
//! keeps them in process for embedders that persist elsewhere.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// The two persisted string slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedCredentials {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// Durable storage behind the credential store.
pub trait CredentialVault: Send + Sync {
    /// Read the slots. `Ok(None)` when nothing has been stored.
    fn load(&self) -> anyhow::Result<Option<PersistedCredentials>>;
    fn save(&self, creds: &PersistedCredentials) -> anyhow::Result<()>;
    /// Remove both slots. Clearing an empty vault succeeds.
    fn clear(&self) -> anyhow::Result<()>;
}

/// JSON file vault.
#[derive(Debug, Clone)]
pub struct FileVault {
    path: PathBuf,
}

impl FileVault {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Vault at `<dir>/credentials.json`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join("credentials.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialVault for FileVault {
    fn load(&self) -> anyhow::Result<Option<PersistedCredentials>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&contents)?))
    }

    /// Write tmp + rename.
    ///
    /// The temp filename carries PID + counter so concurrent saves never share
    /// one `.tmp` file; a shorter write could otherwise leave trailing bytes of
    /// a longer one.
    fn save(&self, creds: &PersistedCredentials) -> anyhow::Result<()> {
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let json = serde_json::to_string_pretty(creds)?;
        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp_name = format!(
            "{}.{}.{}.tmp",
            self.path.file_name().unwrap_or_default().to_string_lossy(),
            std::process::id(),
            seq,
        );
        let tmp_path = self.path.with_file_name(tmp_name);
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> anyhow::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process vault. Counts saves so callers can observe write traffic.
#[derive(Debug, Default)]
pub struct MemoryVault {
    slots: Mutex<Option<PersistedCredentials>>,
    saves: AtomicU32,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(creds: PersistedCredentials) -> Self {
        Self { slots: Mutex::new(Some(creds)), saves: AtomicU32::new(0) }
    }

    /// Number of successful `save` calls.
    pub fn save_count(&self) -> u32 {
        self.saves.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> Option<PersistedCredentials> {
        self.slots.lock().clone()
    }
}

impl CredentialVault for MemoryVault {
    fn load(&self) -> anyhow::Result<Option<PersistedCredentials>> {
        Ok(self.snapshot())
    }

    fn save(&self, creds: &PersistedCredentials) -> anyhow::Result<()> {
        *self.slots.lock() = Some(creds.clone());
        self.saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn clear(&self) -> anyhow::Result<()> {
        *self.slots.lock() = None;
        Ok(())
    }
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;

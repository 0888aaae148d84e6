//! Backup-then-apply protocol around the destructive bulk overwrite.
//!
//! State machine: Idle → Snapshotted → Migrated → (awaiting confirmation)
//! → Applied | Aborted. The backup step cannot be skipped, and the single
//! bulk write is reachable only through [`MigrationGuard::apply`] after the
//! operator types the exact confirmation literal. Declining is not an
//! error: the run exits cleanly with zero remote mutations.

use crate::artifacts::{read_snapshot, ArtifactDirs};
use crate::{object_len, StoreClient, StoreError};
use epoch_core::Mode;
use serde_json::Value;
use std::collections::VecDeque;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Exact, case-sensitive literal required before any remote mutation.
pub const CONFIRM_LITERAL: &str = "YES";

/// Legacy per-namespace paths pruned by cleanup.
pub const LEGACY_PATHS: [&str; 3] = ["data", "_meta", "sessions"];

#[derive(Debug, Error)]
pub enum GuardError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("confirmation prompt failed: {0}")]
    Prompt(#[source] io::Error),
    #[error("no canonical metadata found in any namespace; migration not verified")]
    MigrationNotVerified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOutcome {
    /// Confirmed and written to the store.
    Applied,
    /// Operator declined; the store was not touched.
    Declined,
    /// Nothing to do (cleanup found no legacy paths).
    AlreadyClean,
}

/// Interactive confirmation collaborator, injected so tests can script it.
pub trait Confirm {
    fn confirm(&mut self, prompt: &str) -> io::Result<String>;
}

/// Blocking stdin prompt used by the CLI.
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&mut self, prompt: &str) -> io::Result<String> {
        print!("{prompt} ");
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        Ok(input.trim().to_string())
    }
}

/// Scripted confirmation double returning fixed responses.
#[derive(Debug, Default)]
pub struct ScriptedConfirm {
    responses: VecDeque<String>,
}

impl ScriptedConfirm {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: responses.into_iter().map(Into::into).collect(),
        }
    }
}

impl Confirm for ScriptedConfirm {
    fn confirm(&mut self, _prompt: &str) -> io::Result<String> {
        Ok(self.responses.pop_front().unwrap_or_default())
    }
}

pub struct MigrationGuard<'a, S: StoreClient> {
    store: &'a S,
    artifacts: &'a ArtifactDirs,
}

impl<'a, S: StoreClient> MigrationGuard<'a, S> {
    pub fn new(store: &'a S, artifacts: &'a ArtifactDirs) -> Self {
        Self { store, artifacts }
    }

    /// Idle → Snapshotted: fetch the full store and persist it, or reuse a
    /// previously taken backup artifact.
    pub fn snapshot(&self, existing: Option<&Path>) -> Result<(Value, PathBuf), GuardError> {
        if let Some(path) = existing {
            info!(path = %path.display(), "reusing existing backup artifact");
            return Ok((read_snapshot(path)?, path.to_path_buf()));
        }
        info!("reading full store");
        let snapshot = self.store.fetch_root()?;
        let path = self.artifacts.save_backup(&snapshot)?;
        Ok((snapshot, path))
    }

    /// Snapshotted → Migrated: persist the migrated result next to its
    /// backup.
    pub fn stage(&self, backup_path: &Path, migrated: &Value) -> Result<PathBuf, GuardError> {
        Ok(self.artifacts.save_migrated(backup_path, migrated)?)
    }

    /// Migrated → Applied | Aborted: the single gated bulk overwrite.
    pub fn apply(
        &self,
        confirm: &mut dyn Confirm,
        snapshot: &Value,
    ) -> Result<GuardOutcome, GuardError> {
        let answer = confirm
            .confirm(&format!("Update store? (type {CONFIRM_LITERAL})"))
            .map_err(GuardError::Prompt)?;
        if answer != CONFIRM_LITERAL {
            warn!("confirmation declined; store left untouched");
            return Ok(GuardOutcome::Declined);
        }
        self.store.replace_root(snapshot)?;
        info!("store updated");
        Ok(GuardOutcome::Applied)
    }

    /// Prune the legacy paths once canonical metadata is verified present.
    ///
    /// Refuses outright when no namespace carries canonical metadata, since
    /// that means the migration never actually completed.
    pub fn cleanup(&self, confirm: &mut dyn Confirm) -> Result<GuardOutcome, GuardError> {
        let mut legacy_total = 0;
        for mode in Mode::ALL {
            for path in LEGACY_PATHS {
                let value = self.store.fetch_path(&format!("{mode}/{path}"))?;
                let count = object_len(&value);
                if count > 0 {
                    info!(%mode, path, sessions = count, "legacy path present");
                }
                legacy_total += count;
            }
        }
        if legacy_total == 0 {
            info!("no legacy paths found; already cleaned up");
            return Ok(GuardOutcome::AlreadyClean);
        }

        let mut canonical_meta = 0;
        for mode in Mode::ALL {
            let value = self.store.fetch_path(&format!("{mode}/meta"))?;
            canonical_meta += object_len(&value);
        }
        if canonical_meta == 0 {
            return Err(GuardError::MigrationNotVerified);
        }

        // Destructive, so it gets its own backup too.
        let snapshot = self.store.fetch_root()?;
        self.artifacts.save_backup(&snapshot)?;

        let answer = confirm
            .confirm(&format!(
                "Permanently delete legacy paths? (type {CONFIRM_LITERAL})"
            ))
            .map_err(GuardError::Prompt)?;
        if answer != CONFIRM_LITERAL {
            warn!("confirmation declined; legacy paths kept");
            return Ok(GuardOutcome::Declined);
        }

        for mode in Mode::ALL {
            for path in LEGACY_PATHS {
                self.store.remove_path(&format!("{mode}/{path}"))?;
            }
        }
        info!("legacy paths removed");
        Ok(GuardOutcome::Applied)
    }
}

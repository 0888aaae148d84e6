//! Command implementations, kept separate from argument parsing so the
//! full flows run against scripted store and confirmation doubles.

use anyhow::Result;
use epoch_migrate::migrate_snapshot;
use epoch_store::artifacts::read_snapshot;
use epoch_store::{ArtifactDirs, Confirm, GuardOutcome, MigrationGuard, StoreClient};
use std::path::Path;
use tracing::info;

/// Backup (or reuse a backup), migrate in memory, stage the migrated
/// artifact, then apply behind the confirmation gate.
pub fn migrate(
    store: &impl StoreClient,
    artifacts: &ArtifactDirs,
    confirm: &mut dyn Confirm,
    backup: Option<&Path>,
) -> Result<GuardOutcome> {
    let guard = MigrationGuard::new(store, artifacts);
    let (snapshot, backup_path) = guard.snapshot(backup)?;
    let migrated = migrate_snapshot(&snapshot)?;
    let staged = guard.stage(&backup_path, &migrated)?;
    info!(path = %staged.display(), "migrated snapshot staged");
    Ok(guard.apply(confirm, &migrated)?)
}

/// Prune legacy paths once canonical metadata is verified present.
pub fn cleanup(
    store: &impl StoreClient,
    artifacts: &ArtifactDirs,
    confirm: &mut dyn Confirm,
) -> Result<GuardOutcome> {
    let guard = MigrationGuard::new(store, artifacts);
    Ok(guard.cleanup(confirm)?)
}

/// Push a previously saved snapshot artifact back to the store.
pub fn restore(
    store: &impl StoreClient,
    artifacts: &ArtifactDirs,
    confirm: &mut dyn Confirm,
    backup: &Path,
) -> Result<GuardOutcome> {
    let snapshot = read_snapshot(backup)?;
    let guard = MigrationGuard::new(store, artifacts);
    // Restoring is the same bulk overwrite as migrating, so the current
    // store gets its own backup before the gate.
    let (_, pre_restore) = guard.snapshot(None)?;
    info!(path = %pre_restore.display(), "current store backed up before restore");
    Ok(guard.apply(confirm, &snapshot)?)
}

//! Durable backup and migrated-snapshot artifacts.
//!
//! One backup JSON file per run under `<data>/backup/`, named by run
//! timestamp; the migrated result goes under the parallel
//! `<data>/migrated/` directory with the same file name, never colocated
//! with or overwriting a backup.

use crate::StoreError;
use chrono::Utc;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone)]
pub struct ArtifactDirs {
    data_dir: PathBuf,
}

impl ArtifactDirs {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.data_dir.join("backup")
    }

    pub fn migrated_dir(&self) -> PathBuf {
        self.data_dir.join("migrated")
    }

    /// Persist the pre-migration snapshot as an immutable, timestamped
    /// artifact.
    pub fn save_backup(&self, snapshot: &Value) -> Result<PathBuf, StoreError> {
        let dir = self.backup_dir();
        fs::create_dir_all(&dir)?;
        let stamp = Utc::now()
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
            .replace([':', '.'], "-");
        let path = dir.join(format!("{stamp}.json"));
        fs::write(&path, serde_json::to_vec_pretty(snapshot)?)?;
        info!(path = %path.display(), "backup saved");
        Ok(path)
    }

    /// Persist the migrated snapshot next to (never over) its backup.
    pub fn save_migrated(
        &self,
        backup_path: &Path,
        snapshot: &Value,
    ) -> Result<PathBuf, StoreError> {
        let name = backup_path
            .file_name()
            .ok_or_else(|| StoreError::ArtifactPath(backup_path.display().to_string()))?;
        let dir = self.migrated_dir();
        fs::create_dir_all(&dir)?;
        let path = dir.join(name);
        fs::write(&path, serde_json::to_vec_pretty(snapshot)?)?;
        info!(path = %path.display(), "migrated snapshot saved");
        Ok(path)
    }
}

/// Load a previously persisted snapshot artifact.
pub fn read_snapshot(path: &Path) -> Result<Value, StoreError> {
    Ok(serde_json::from_slice(&fs::read(path)?)?)
}

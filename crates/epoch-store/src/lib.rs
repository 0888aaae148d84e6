//! Access to the authoritative session log store.
//!
//! The store is a single JSON tree behind a Firebase-style REST surface.
//! Every component takes an explicit [`StoreClient`] handle; there is no
//! ambient connection state. A migration run performs exactly two remote
//! operations: one bulk read at the start and, only after confirmation, one
//! bulk write at the end.

use serde_json::{Map, Value};
use std::sync::Mutex;
use thiserror::Error;

pub mod artifacts;
pub mod guard;

pub use artifacts::ArtifactDirs;
pub use guard::{
    Confirm, GuardError, GuardOutcome, MigrationGuard, ScriptedConfirm, StdinConfirm,
    CONFIRM_LITERAL,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Transport(String),
    #[error("store returned invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("artifact io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid artifact path: {0}")]
    ArtifactPath(String),
}

/// Handle to the authoritative store, passed into every component that
/// reads or writes it.
pub trait StoreClient {
    /// Bulk read of the entire tree.
    fn fetch_root(&self) -> Result<Value, StoreError>;
    /// Bulk overwrite of the entire tree.
    fn replace_root(&self, value: &Value) -> Result<(), StoreError>;
    /// Read one subtree; missing paths read as JSON null.
    fn fetch_path(&self, path: &str) -> Result<Value, StoreError>;
    /// Delete one subtree; deleting a missing path is a no-op.
    fn remove_path(&self, path: &str) -> Result<(), StoreError>;
}

/// REST-backed store client (`GET/PUT/DELETE {base}/{path}.json`).
pub struct RestStore {
    base_url: String,
    agent: ureq::Agent,
}

impl RestStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            agent: ureq::Agent::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        let path = path.trim_matches('/');
        if path.is_empty() {
            format!("{}/.json", self.base_url)
        } else {
            format!("{}/{}.json", self.base_url, path)
        }
    }
}

impl StoreClient for RestStore {
    fn fetch_root(&self) -> Result<Value, StoreError> {
        self.fetch_path("")
    }

    fn replace_root(&self, value: &Value) -> Result<(), StoreError> {
        self.agent
            .put(&self.url(""))
            .send_json(value)
            .map_err(|err| StoreError::Transport(err.to_string()))?;
        Ok(())
    }

    fn fetch_path(&self, path: &str) -> Result<Value, StoreError> {
        let response = self
            .agent
            .get(&self.url(path))
            .call()
            .map_err(|err| StoreError::Transport(err.to_string()))?;
        Ok(response.into_json()?)
    }

    fn remove_path(&self, path: &str) -> Result<(), StoreError> {
        self.agent
            .delete(&self.url(path))
            .call()
            .map_err(|err| StoreError::Transport(err.to_string()))?;
        Ok(())
    }
}

/// In-memory store double with the same semantics as the REST surface.
#[derive(Debug, Default)]
pub struct MemoryStore {
    root: Mutex<Value>,
}

impl MemoryStore {
    pub fn new(root: Value) -> Self {
        Self {
            root: Mutex::new(root),
        }
    }

    /// Current state of the whole tree, for assertions.
    pub fn snapshot(&self) -> Value {
        self.root
            .lock()
            .map(|root| root.clone())
            .unwrap_or(Value::Null)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Value>, StoreError> {
        self.root
            .lock()
            .map_err(|_| StoreError::Transport("store lock poisoned".to_string()))
    }
}

impl StoreClient for MemoryStore {
    fn fetch_root(&self) -> Result<Value, StoreError> {
        Ok(self.lock()?.clone())
    }

    fn replace_root(&self, value: &Value) -> Result<(), StoreError> {
        *self.lock()? = value.clone();
        Ok(())
    }

    fn fetch_path(&self, path: &str) -> Result<Value, StoreError> {
        let root = self.lock()?;
        let path = path.trim_matches('/');
        if path.is_empty() {
            return Ok(root.clone());
        }
        let pointer = format!("/{path}");
        Ok(root.pointer(&pointer).cloned().unwrap_or(Value::Null))
    }

    fn remove_path(&self, path: &str) -> Result<(), StoreError> {
        let mut root = self.lock()?;
        let path = path.trim_matches('/');
        if path.is_empty() {
            *root = Value::Null;
            return Ok(());
        }
        let mut segments: Vec<&str> = path.split('/').collect();
        let leaf = match segments.pop() {
            Some(leaf) => leaf,
            None => return Ok(()),
        };
        let mut current: &mut Value = &mut root;
        for segment in segments {
            match current.get_mut(segment) {
                Some(next) => current = next,
                None => return Ok(()),
            }
        }
        if let Some(parent) = current.as_object_mut() {
            parent.remove(leaf);
        }
        Ok(())
    }
}

/// Count the entries of an object value; null and anything else count zero.
pub(crate) fn object_len(value: &Value) -> usize {
    value.as_object().map_or(0, Map::len)
}

//! Whole-collection record store.
//!
//! Records are plain JSON values grouped into named collections per
//! workspace. Callers read an entire collection, change it, and write the
//! entire collection back; nothing finer-grained is assumed of the medium.

use crate::error::{LoyaltyError, LoyaltyResult};
use dashmap::DashMap;
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub trait RecordStore: Send + Sync {
    /// Missing collections load as empty.
    fn load_collection(&self, workspace: &str, key: &str) -> LoyaltyResult<Vec<Value>>;

    fn save_collection(&self, workspace: &str, key: &str, records: Vec<Value>)
        -> LoyaltyResult<()>;
}

// ─── In-memory ──────────────────────────────────────────────────────────────

/// Thread-safe in-memory store backed by DashMap. Used in tests and demo mode.
#[derive(Default)]
pub struct InMemoryStore {
    collections: DashMap<(String, String), Vec<Value>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        info!("Record store initialized (in-memory)");
        Self::default()
    }

    pub fn collection_len(&self, workspace: &str, key: &str) -> usize {
        self.collections
            .get(&(workspace.to_string(), key.to_string()))
            .map(|r| r.value().len())
            .unwrap_or(0)
    }
}

impl RecordStore for InMemoryStore {
    fn load_collection(&self, workspace: &str, key: &str) -> LoyaltyResult<Vec<Value>> {
        Ok(self
            .collections
            .get(&(workspace.to_string(), key.to_string()))
            .map(|r| r.value().clone())
            .unwrap_or_default())
    }

    fn save_collection(
        &self,
        workspace: &str,
        key: &str,
        records: Vec<Value>,
    ) -> LoyaltyResult<()> {
        self.collections
            .insert((workspace.to_string(), key.to_string()), records);
        Ok(())
    }
}

// ─── JSON files ─────────────────────────────────────────────────────────────

/// One JSON array file per collection at `<root>/<workspace>/<key>.json`.
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> LoyaltyResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        info!(root = %root.display(), "Record store initialized (json files)");
        Ok(Self { root })
    }

    fn path_for(&self, workspace: &str, key: &str) -> LoyaltyResult<PathBuf> {
        validate_segment(workspace)?;
        validate_segment(key)?;
        Ok(self.root.join(workspace).join(format!("{key}.json")))
    }
}

fn validate_segment(segment: &str) -> LoyaltyResult<()> {
    let ok = !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(LoyaltyError::Store(format!(
            "invalid collection path segment: {segment:?}"
        )))
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> LoyaltyResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

impl RecordStore for JsonFileStore {
    fn load_collection(&self, workspace: &str, key: &str) -> LoyaltyResult<Vec<Value>> {
        let path = self.path_for(workspace, key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save_collection(
        &self,
        workspace: &str,
        key: &str,
        records: Vec<Value>,
    ) -> LoyaltyResult<()> {
        let path = self.path_for(workspace, key)?;
        let bytes = serde_json::to_vec_pretty(&records)?;
        write_atomically(&path, &bytes)?;
        debug!(path = %path.display(), records = records.len(), "Collection saved");
        Ok(())
    }
}

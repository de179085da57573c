//! Pluggable persistence backends for the origin ledger.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::OriginEntry;
use crate::error::AdapterError;
use crate::util::unix_now_secs;

/// Storage contract for origin entries. Keys are opaque lookup hashes;
/// writes overwrite whatever is under the key (last writer wins).
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn read_entry(&self, key: &str) -> Result<Option<OriginEntry>, AdapterError>;
    async fn write_entries(&self, entries: Vec<(String, OriginEntry)>)
        -> Result<(), AdapterError>;
}

/// In-process backend over a plain map. Used in tests and by embedders
/// that persist elsewhere.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, OriginEntry>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn read_entry(&self, key: &str) -> Result<Option<OriginEntry>, AdapterError> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn write_entries(
        &self,
        entries: Vec<(String, OriginEntry)>,
    ) -> Result<(), AdapterError> {
        let mut guard = self.entries.write();
        for (key, entry) in entries {
            guard.insert(key, entry);
        }
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(default)]
    entries: HashMap<String, OriginEntry>,
    #[serde(default)]
    updated_at: u64,
}

/// Single-writer JSON file backend. A tokio mutex serializes writers in
/// this process; writes go to a temp file and are renamed into place so a
/// crash never leaves a torn ledger.
pub struct LocalFileStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl LocalFileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<LedgerFile, AdapterError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|err| {
                AdapterError::Internal(format!(
                    "corrupt ledger file {}: {err}",
                    self.path.display()
                ))
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(LedgerFile::default()),
            Err(err) => Err(AdapterError::Internal(format!(
                "failed to read ledger file {}: {err}",
                self.path.display()
            ))),
        }
    }

    async fn persist(&self, file: &LedgerFile) -> Result<(), AdapterError> {
        if let Some(parent) = self.path.parent() {
            if parent != Path::new("") {
                tokio::fs::create_dir_all(parent).await.map_err(|err| {
                    AdapterError::Internal(format!(
                        "failed to create ledger dir {}: {err}",
                        parent.display()
                    ))
                })?;
            }
        }
        let json = serde_json::to_vec_pretty(file)
            .map_err(|err| AdapterError::Internal(format!("failed to encode ledger: {err}")))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json).await.map_err(|err| {
            AdapterError::Internal(format!("failed to write ledger temp file: {err}"))
        })?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|err| {
            AdapterError::Internal(format!("failed to replace ledger file: {err}"))
        })
    }
}

#[async_trait]
impl LedgerStore for LocalFileStore {
    async fn read_entry(&self, key: &str) -> Result<Option<OriginEntry>, AdapterError> {
        let file = self.load().await?;
        Ok(file.entries.get(key).cloned())
    }

    async fn write_entries(
        &self,
        entries: Vec<(String, OriginEntry)>,
    ) -> Result<(), AdapterError> {
        let _guard = self.write_lock.lock().await;
        let mut file = self.load().await?;
        for (key, entry) in entries {
            file.entries.insert(key, entry);
        }
        file.updated_at = unix_now_secs();
        self.persist(&file).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::SourceType;

    fn sample_entry(canonical: &str) -> OriginEntry {
        OriginEntry {
            source_type: SourceType::Generated,
            canonical_url: Some(canonical.to_string()),
            original_url: None,
            content_hash: None,
            asset_id: None,
            metadata: HashMap::new(),
            key_type: "url".to_string(),
            key_value: canonical.to_string(),
            updated_at: 0,
        }
    }

    #[tokio::test]
    async fn memory_store_overwrites_on_same_key() {
        let store = MemoryStore::new();
        store
            .write_entries(vec![("k1".into(), sample_entry("https://a/1"))])
            .await
            .unwrap();
        store
            .write_entries(vec![("k1".into(), sample_entry("https://a/2"))])
            .await
            .unwrap();
        let entry = store.read_entry("k1").await.unwrap().unwrap();
        assert_eq!(entry.canonical_url.as_deref(), Some("https://a/2"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn file_store_round_trips_and_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");

        let store = LocalFileStore::new(&path);
        store
            .write_entries(vec![
                ("k1".into(), sample_entry("https://a/1")),
                ("k2".into(), sample_entry("https://a/2")),
            ])
            .await
            .unwrap();

        let reopened = LocalFileStore::new(&path);
        let entry = reopened.read_entry("k2").await.unwrap().unwrap();
        assert_eq!(entry.canonical_url.as_deref(), Some("https://a/2"));
        assert!(reopened.read_entry("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_reports_missing_file_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path().join("never-written.json"));
        assert!(store.read_entry("k").await.unwrap().is_none());
    }
}

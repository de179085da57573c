//! Content-addressable provenance ledger for generated and uploaded images.
//!
//! An entry records where an image came from and every identifier it is
//! known by. Entries are indexed under each derivable key (canonical URL,
//! original URL, content hash, asset id) so later lookups succeed no
//! matter which identifier the caller still holds.

pub mod classify;
pub mod resolve;
pub mod store;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use classify::{
    inspect_image_reference, is_http_url, lookup_key, normalize_image_url,
    sha256_of_image_base64, ReferenceKind,
};
pub use resolve::{resolve_image_source, AssetUploader, ResolvedImageSource, UploadedAsset};
pub use store::{LedgerStore, LocalFileStore, MemoryStore};

use crate::util::unix_now_secs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Generated,
    Uploaded,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginEntry {
    pub source_type: SourceType,
    #[serde(default)]
    pub canonical_url: Option<String>,
    #[serde(default)]
    pub original_url: Option<String>,
    #[serde(default)]
    pub content_hash: Option<String>,
    #[serde(default)]
    pub asset_id: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Which key this copy of the entry was stored under.
    pub key_type: String,
    pub key_value: String,
    #[serde(default)]
    pub updated_at: u64,
}

/// What the caller knows about an image at upsert time. Keys are derived
/// from whichever identifiers are present.
#[derive(Debug, Default, Clone)]
pub struct OriginRecord {
    pub source_type: Option<SourceType>,
    pub canonical_url: Option<String>,
    pub original_url: Option<String>,
    pub content_hash: Option<String>,
    pub asset_id: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// Ledger service over a pluggable [`LedgerStore`].
///
/// Provenance tracking is a side concern: storage failures are logged and
/// degrade to a no-op write or a `None` lookup, never a caller error.
#[derive(Clone)]
pub struct ImageOriginLedger {
    store: Arc<dyn LedgerStore>,
}

impl ImageOriginLedger {
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Record what is known about an image, indexing the entry under every
    /// derivable key. A record with no derivable key is a no-op.
    pub async fn upsert(&self, record: OriginRecord) {
        let source_type = record.source_type.unwrap_or(SourceType::Unknown);
        let canonical_url = record
            .canonical_url
            .as_deref()
            .map(normalize_image_url)
            .filter(|u| !u.is_empty());
        let original_url = record
            .original_url
            .as_deref()
            .map(normalize_image_url)
            .filter(|u| !u.is_empty());

        let mut keys: Vec<(&str, String)> = Vec::with_capacity(4);
        if let Some(url) = &canonical_url {
            keys.push(("url", url.clone()));
        }
        if let Some(url) = &original_url {
            if Some(url) != canonical_url.as_ref() {
                keys.push(("url", url.clone()));
            }
        }
        if let Some(hash) = record.content_hash.as_deref().filter(|h| !h.is_empty()) {
            keys.push(("hash", hash.to_string()));
        }
        if let Some(asset) = record.asset_id.as_deref().filter(|a| !a.is_empty()) {
            keys.push(("asset", asset.to_string()));
        }
        if keys.is_empty() {
            return;
        }

        let now = unix_now_secs();
        let entries = keys
            .into_iter()
            .map(|(key_type, key_value)| {
                let entry = OriginEntry {
                    source_type,
                    canonical_url: canonical_url.clone(),
                    original_url: original_url.clone(),
                    content_hash: record.content_hash.clone(),
                    asset_id: record.asset_id.clone(),
                    metadata: record.metadata.clone(),
                    key_type: key_type.to_string(),
                    key_value: key_value.clone(),
                    updated_at: now,
                };
                (lookup_key(key_type, &key_value), entry)
            })
            .collect();

        if let Err(err) = self.store.write_entries(entries).await {
            tracing::warn!(error = %err, "origin ledger write failed; continuing without it");
        }
    }

    pub async fn find_by_url(&self, url: &str) -> Option<OriginEntry> {
        let normalized = normalize_image_url(url);
        self.read("url", &normalized).await
    }

    pub async fn find_by_hash(&self, content_hash: &str) -> Option<OriginEntry> {
        self.read("hash", content_hash).await
    }

    pub async fn find_by_asset_id(&self, asset_id: &str) -> Option<OriginEntry> {
        self.read("asset", asset_id).await
    }

    async fn read(&self, key_type: &str, key_value: &str) -> Option<OriginEntry> {
        if key_value.is_empty() {
            return None;
        }
        match self.store.read_entry(&lookup_key(key_type, key_value)).await {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(error = %err, "origin ledger read failed; treating as miss");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_ledger() -> ImageOriginLedger {
        ImageOriginLedger::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn upsert_indexes_under_every_key() {
        let ledger = memory_ledger();
        ledger
            .upsert(OriginRecord {
                source_type: Some(SourceType::Generated),
                canonical_url: Some("https://app.example/v1/files/image/abc.png".to_string()),
                original_url: Some(
                    "HTTPS://Assets.Grok.com/users/u/generated/g1/image.jpg?sig=1".to_string(),
                ),
                content_hash: Some("deadbeef".to_string()),
                asset_id: Some("asset-1".to_string()),
                metadata: HashMap::new(),
            })
            .await;

        let by_original = ledger
            .find_by_url("https://assets.grok.com/users/u/generated/g1/image.jpg")
            .await
            .expect("entry by original url");
        assert_eq!(by_original.source_type, SourceType::Generated);
        assert_eq!(by_original.asset_id.as_deref(), Some("asset-1"));

        assert!(ledger.find_by_hash("deadbeef").await.is_some());
        assert!(ledger.find_by_asset_id("asset-1").await.is_some());
        assert!(ledger
            .find_by_url("https://app.example/v1/files/image/abc.png")
            .await
            .is_some());
    }

    #[tokio::test]
    async fn later_writes_win() {
        let ledger = memory_ledger();
        let url = "https://assets.grok.com/users/u/generated/g1/image.jpg";
        for hash in ["h1", "h2"] {
            ledger
                .upsert(OriginRecord {
                    source_type: Some(SourceType::Generated),
                    canonical_url: Some(url.to_string()),
                    content_hash: Some(hash.to_string()),
                    ..OriginRecord::default()
                })
                .await;
        }
        let entry = ledger.find_by_url(url).await.unwrap();
        assert_eq!(entry.content_hash.as_deref(), Some("h2"));
    }

    #[tokio::test]
    async fn keyless_record_is_noop() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ImageOriginLedger::new(store.clone());
        ledger.upsert(OriginRecord::default()).await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn lookup_normalizes_url() {
        let ledger = memory_ledger();
        ledger
            .upsert(OriginRecord {
                source_type: Some(SourceType::Uploaded),
                canonical_url: Some("https://assets.grok.com/users/u/a1/content".to_string()),
                asset_id: Some("a1".to_string()),
                ..OriginRecord::default()
            })
            .await;
        let entry = ledger
            .find_by_url("HTTPS://ASSETS.GROK.COM/users/u/a1/content?cache=0")
            .await;
        assert!(entry.is_some());
    }
}

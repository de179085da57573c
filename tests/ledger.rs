use std::sync::Arc;

use async_trait::async_trait;
use grokbridge::config::UpstreamConfig;
use grokbridge::error::AdapterError;
use grokbridge::ledger::{
    resolve_image_source, AssetUploader, ImageOriginLedger, LocalFileStore, OriginRecord,
    SourceType, UploadedAsset,
};
use parking_lot::Mutex;

struct FakeUploader {
    calls: Mutex<Vec<String>>,
}

impl FakeUploader {
    fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl AssetUploader for FakeUploader {
    async fn upload_base64(&self, _image_b64: &str) -> Result<UploadedAsset, AdapterError> {
        self.calls.lock().push("base64".to_string());
        Ok(UploadedAsset {
            url: "https://assets.grok.com/users/u1/asset-b64/content".to_string(),
            asset_id: Some("asset-b64".to_string()),
        })
    }

    async fn upload_from_url(&self, url: &str) -> Result<UploadedAsset, AdapterError> {
        self.calls.lock().push(format!("url:{url}"));
        Ok(UploadedAsset {
            url: "https://assets.grok.com/users/u1/asset-url/content".to_string(),
            asset_id: Some("asset-url".to_string()),
        })
    }
}

fn file_ledger(path: &std::path::Path) -> ImageOriginLedger {
    ImageOriginLedger::new(Arc::new(LocalFileStore::new(path)))
}

// Entries written through one store instance must be visible through a
// fresh instance opened on the same file.
#[tokio::test]
async fn entries_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("origins.json");

    let ledger = file_ledger(&path);
    ledger
        .upsert(OriginRecord {
            source_type: Some(SourceType::Generated),
            canonical_url: Some("https://app.example/v1/files/image/users/u/g1/image.jpg".into()),
            original_url: Some("https://assets.grok.com/users/u/g1/generated/image.jpg".into()),
            ..OriginRecord::default()
        })
        .await;

    let reopened = file_ledger(&path);
    let entry = reopened
        .find_by_url("https://assets.grok.com/users/u/g1/generated/image.jpg")
        .await
        .expect("persisted entry");
    assert_eq!(entry.source_type, SourceType::Generated);
    assert!(entry
        .canonical_url
        .as_deref()
        .unwrap()
        .contains("/v1/files/image/"));
}

// Lookups normalize the same way writes do, so query-string noise on
// the incoming URL still hits.
#[tokio::test]
async fn lookup_ignores_query_noise() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = file_ledger(&dir.path().join("origins.json"));
    ledger
        .upsert(OriginRecord {
            source_type: Some(SourceType::Generated),
            original_url: Some("https://imagine-public.x.ai/images/ab12.png".into()),
            ..OriginRecord::default()
        })
        .await;

    let entry = ledger
        .find_by_url("HTTPS://imagine-public.x.ai/images/ab12.png?cache=1#frag")
        .await;
    assert!(entry.is_some());
}

#[tokio::test]
async fn proxied_generated_url_is_recovered_without_upload() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = file_ledger(&dir.path().join("origins.json"));
    let uploader = FakeUploader::new();
    let upstream = UpstreamConfig::default();

    let resolved = resolve_image_source(
        &ledger,
        &uploader,
        &upstream,
        "https://app.example/v1/files/image/users/u/g2/generated/image.jpg",
    )
    .await
    .unwrap();

    assert_eq!(resolved.source_type, SourceType::Generated);
    assert_eq!(
        resolved.url,
        "https://assets.grok.com/users/u/g2/generated/image.jpg"
    );
    assert!(uploader.calls.lock().is_empty());

    // Recovery is recorded, so the next resolution is a ledger hit.
    assert!(ledger.find_by_url(&resolved.url).await.is_some());
}

#[tokio::test]
async fn base64_reference_is_uploaded_and_remembered() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = file_ledger(&dir.path().join("origins.json"));
    let uploader = FakeUploader::new();
    let upstream = UpstreamConfig::default();

    let payload = format!("data:image/png;base64,{}", "QUJDREVG".repeat(32));
    let resolved = resolve_image_source(&ledger, &uploader, &upstream, &payload)
        .await
        .unwrap();

    assert_eq!(resolved.source_type, SourceType::Uploaded);
    assert_eq!(resolved.asset_id.as_deref(), Some("asset-b64"));
    assert_eq!(uploader.calls.lock().as_slice(), ["base64"]);
    assert!(ledger.find_by_asset_id("asset-b64").await.is_some());
}

#[tokio::test]
async fn foreign_url_is_mirrored_upstream() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = file_ledger(&dir.path().join("origins.json"));
    let uploader = FakeUploader::new();
    let upstream = UpstreamConfig::default();

    let resolved = resolve_image_source(
        &ledger,
        &uploader,
        &upstream,
        "https://pictures.example.net/cat.png",
    )
    .await
    .unwrap();

    assert_eq!(resolved.source_type, SourceType::Uploaded);
    assert_eq!(
        uploader.calls.lock().as_slice(),
        ["url:https://pictures.example.net/cat.png"]
    );
}

#[tokio::test]
async fn unusable_reference_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = file_ledger(&dir.path().join("origins.json"));
    let uploader = FakeUploader::new();
    let upstream = UpstreamConfig::default();

    let result = resolve_image_source(&ledger, &uploader, &upstream, "not a url or payload").await;
    assert!(matches!(result, Err(AdapterError::Protocol(_))));
}

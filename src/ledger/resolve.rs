//! Resolution of caller-supplied image references into upstream-usable
//! URLs, used when a video generation starts from an existing image.

use async_trait::async_trait;

use super::{
    inspect_image_reference, is_http_url, sha256_of_image_base64, ImageOriginLedger, OriginRecord,
    ReferenceKind, SourceType,
};
use crate::config::UpstreamConfig;
use crate::error::AdapterError;

const LOCAL_IMAGE_PROXY_MARKER: &str = "/v1/files/image/";
const IMAGINE_PUBLIC_PREFIX: &str = "imagine-public/";

/// Capability for pushing image bytes into the upstream asset store.
/// Implemented by the embedding service.
#[async_trait]
pub trait AssetUploader: Send + Sync {
    async fn upload_base64(&self, image_b64: &str) -> Result<UploadedAsset, AdapterError>;
    async fn upload_from_url(&self, url: &str) -> Result<UploadedAsset, AdapterError>;
}

#[derive(Debug, Clone)]
pub struct UploadedAsset {
    pub url: String,
    pub asset_id: Option<String>,
}

/// Outcome of [`resolve_image_source`]: a URL the upstream video endpoint
/// accepts, plus provenance details for the request payload.
#[derive(Debug, Clone)]
pub struct ResolvedImageSource {
    pub url: String,
    pub source_type: SourceType,
    pub asset_id: Option<String>,
}

/// Recover the upstream URL hidden behind an app-proxied image path.
fn recover_generated_url_from_proxy(upstream: &UpstreamConfig, url: &str) -> Option<String> {
    let (_, tail) = url.split_once(LOCAL_IMAGE_PROXY_MARKER)?;
    if tail.is_empty() {
        return None;
    }
    let base = if tail.starts_with(IMAGINE_PUBLIC_PREFIX) {
        upstream.imagine_public_base_url.trim_end_matches('/')
    } else {
        upstream.assets_base_url.trim_end_matches('/')
    };
    Some(format!("{base}/{tail}"))
}

fn authoritative_url(original: Option<&str>, canonical: Option<&str>) -> Option<String> {
    original
        .filter(|u| is_http_url(u))
        .or_else(|| canonical.filter(|u| is_http_url(u)))
        .map(str::to_string)
}

/// Turn whatever reference the caller supplied (generated URL, proxied
/// path, uploaded URL, base64 payload, foreign URL) into a URL the
/// upstream accepts, consulting and updating the origin ledger on the way.
pub async fn resolve_image_source(
    ledger: &ImageOriginLedger,
    uploader: &dyn AssetUploader,
    upstream: &UpstreamConfig,
    reference: &str,
) -> Result<ResolvedImageSource, AdapterError> {
    match inspect_image_reference(reference) {
        ReferenceKind::GeneratedUrl { normalized } => {
            if let Some(entry) = ledger.find_by_url(&normalized).await {
                if let Some(url) = authoritative_url(
                    entry.original_url.as_deref(),
                    entry.canonical_url.as_deref(),
                ) {
                    return Ok(ResolvedImageSource {
                        url,
                        source_type: SourceType::Generated,
                        asset_id: entry.asset_id,
                    });
                }
            }
            if let Some(recovered) = recover_generated_url_from_proxy(upstream, &normalized) {
                ledger
                    .upsert(OriginRecord {
                        source_type: Some(SourceType::Generated),
                        canonical_url: Some(normalized),
                        original_url: Some(recovered.clone()),
                        ..OriginRecord::default()
                    })
                    .await;
                return Ok(ResolvedImageSource {
                    url: recovered,
                    source_type: SourceType::Generated,
                    asset_id: None,
                });
            }
            if is_http_url(&normalized) {
                ledger
                    .upsert(OriginRecord {
                        source_type: Some(SourceType::Generated),
                        canonical_url: Some(normalized.clone()),
                        ..OriginRecord::default()
                    })
                    .await;
                return Ok(ResolvedImageSource {
                    url: normalized,
                    source_type: SourceType::Generated,
                    asset_id: None,
                });
            }
            Err(AdapterError::Protocol(format!(
                "generated image reference has no recoverable upstream URL: {normalized}"
            )))
        }
        ReferenceKind::UploadedUrl {
            normalized,
            asset_id,
        } => {
            ledger
                .upsert(OriginRecord {
                    source_type: Some(SourceType::Uploaded),
                    canonical_url: Some(normalized.clone()),
                    asset_id: asset_id.clone(),
                    ..OriginRecord::default()
                })
                .await;
            Ok(ResolvedImageSource {
                url: normalized,
                source_type: SourceType::Uploaded,
                asset_id,
            })
        }
        ReferenceKind::Base64 => {
            let content_hash = sha256_of_image_base64(reference).ok_or_else(|| {
                AdapterError::Protocol("image payload is not decodable base64".to_string())
            })?;
            if let Some(entry) = ledger.find_by_hash(&content_hash).await {
                if entry.source_type == SourceType::Generated {
                    if let Some(url) = authoritative_url(
                        entry.original_url.as_deref(),
                        entry.canonical_url.as_deref(),
                    ) {
                        return Ok(ResolvedImageSource {
                            url,
                            source_type: SourceType::Generated,
                            asset_id: entry.asset_id,
                        });
                    }
                }
            }
            let uploaded = uploader.upload_base64(reference).await?;
            ledger
                .upsert(OriginRecord {
                    source_type: Some(SourceType::Uploaded),
                    canonical_url: Some(uploaded.url.clone()),
                    content_hash: Some(content_hash),
                    asset_id: uploaded.asset_id.clone(),
                    ..OriginRecord::default()
                })
                .await;
            Ok(ResolvedImageSource {
                url: uploaded.url,
                source_type: SourceType::Uploaded,
                asset_id: uploaded.asset_id,
            })
        }
        ReferenceKind::UnknownUrl { normalized } => {
            if !is_http_url(&normalized) {
                return Err(AdapterError::Protocol(format!(
                    "unrecognized image reference: {normalized}"
                )));
            }
            let uploaded = uploader.upload_from_url(&normalized).await?;
            ledger
                .upsert(OriginRecord {
                    source_type: Some(SourceType::Uploaded),
                    canonical_url: Some(uploaded.url.clone()),
                    original_url: Some(normalized),
                    asset_id: uploaded.asset_id.clone(),
                    ..OriginRecord::default()
                })
                .await;
            Ok(ResolvedImageSource {
                url: uploaded.url,
                source_type: SourceType::Uploaded,
                asset_id: uploaded.asset_id,
            })
        }
    }
}

//! Outbound media side-calls: asset proxying, base64 inlining, and the
//! best-effort video upscale.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use tokio::sync::Semaphore;

use crate::config::AppConfig;
use crate::error::AdapterError;

const UPSCALE_ENDPOINT: &str = "/rest/media/video/upscale";
const MEDIA_CALL_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    #[must_use]
    pub fn path_segment(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

/// Reduce an asset URL or path to its bare path, with a leading slash.
#[must_use]
pub fn asset_path(path_or_url: &str) -> String {
    let path = if path_or_url.starts_with("http") {
        url::Url::parse(path_or_url)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| path_or_url.to_string())
    } else {
        path_or_url.to_string()
    };
    if path.starts_with('/') {
        path
    } else {
        format!("/{path}")
    }
}

/// App-proxied URL for an asset path: `{app_url}/v1/files/{kind}{path}`.
#[must_use]
pub fn proxied_asset_url(app_url: &str, kind: MediaKind, path: &str) -> String {
    format!(
        "{}/v1/files/{}{}",
        app_url.trim_end_matches('/'),
        kind.path_segment(),
        path
    )
}

/// Capability for outbound media calls made during translation. All
/// methods are best-effort from the translator's point of view: failures
/// are logged by the implementation and reported as fallback values, not
/// stream errors.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Rewrite an upstream asset path to a client-facing URL, warming any
    /// caches the implementation keeps. Returns the upstream URL directly
    /// when no app URL is configured.
    async fn resolve_url(&self, path_or_url: &str, kind: MediaKind, credential: &str) -> String;

    /// Download an asset and return it as a base64 data URI.
    async fn to_base64(
        &self,
        path_or_url: &str,
        kind: MediaKind,
        credential: &str,
    ) -> Option<String>;

    /// Swap a generated video URL for its HD variant. Returns the input
    /// URL whenever the upscale cannot be performed.
    async fn upscale_video_url(&self, video_url: &str, credential: &str) -> String;
}

/// Extract the generated-video id from an asset URL.
#[must_use]
pub fn extract_video_id(video_url: &str) -> Option<String> {
    static PATTERNS: OnceLock<[regex_lite::Regex; 2]> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        [
            regex_lite::Regex::new(r"/generated/([0-9a-fA-F-]{32,36})/").expect("fixed pattern"),
            regex_lite::Regex::new(r"/([0-9a-fA-F-]{32,36})/generated_video")
                .expect("fixed pattern"),
        ]
    });
    patterns
        .iter()
        .find_map(|re| re.captures(video_url).map(|caps| caps[1].to_string()))
}

/// Default [`MediaFetcher`] over reqwest, with per-kind semaphores
/// bounding concurrent upstream calls.
pub struct HttpMediaFetcher {
    client: reqwest::Client,
    app_url: String,
    base_url: String,
    assets_base_url: String,
    enable_upscale: bool,
    image_permits: Arc<Semaphore>,
    video_permits: Arc<Semaphore>,
}

impl HttpMediaFetcher {
    pub fn new(config: &AppConfig) -> Result<Self, AdapterError> {
        let client = reqwest::Client::builder()
            .timeout(MEDIA_CALL_TIMEOUT)
            .build()
            .map_err(|err| AdapterError::Config(format!("failed to build media client: {err}")))?;
        Ok(Self {
            client,
            app_url: config.app_url.trim_end_matches('/').to_string(),
            base_url: config.upstream.base_url.trim_end_matches('/').to_string(),
            assets_base_url: config
                .upstream
                .assets_base_url
                .trim_end_matches('/')
                .to_string(),
            enable_upscale: config.media.enable_video_upscale,
            image_permits: Arc::new(Semaphore::new(config.media.image_concurrency)),
            video_permits: Arc::new(Semaphore::new(config.media.video_concurrency)),
        })
    }

    fn permits(&self, kind: MediaKind) -> &Arc<Semaphore> {
        match kind {
            MediaKind::Image => &self.image_permits,
            MediaKind::Video => &self.video_permits,
        }
    }

    async fn fetch_asset(
        &self,
        path: &str,
        kind: MediaKind,
        credential: &str,
    ) -> Result<(Vec<u8>, String), AdapterError> {
        let _permit = self
            .permits(kind)
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AdapterError::Internal("media semaphore closed".to_string()))?;

        let url = format!("{}{}", self.assets_base_url, path);
        let response = self
            .client
            .get(&url)
            .header("Cookie", format!("sso={credential}; sso-rw={credential}"))
            .send()
            .await?
            .error_for_status()?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(match kind {
                MediaKind::Image => "image/jpeg",
                MediaKind::Video => "video/mp4",
            })
            .to_string();
        let bytes = response.bytes().await?;
        Ok((bytes.to_vec(), content_type))
    }
}

#[async_trait]
impl MediaFetcher for HttpMediaFetcher {
    async fn resolve_url(&self, path_or_url: &str, kind: MediaKind, credential: &str) -> String {
        let path = asset_path(path_or_url);
        if self.app_url.is_empty() {
            return format!("{}{}", self.assets_base_url, path);
        }
        // Warm the asset so the proxied URL serves immediately.
        if let Err(err) = self.fetch_asset(&path, kind, credential).await {
            tracing::warn!(error = %err, path = %path, "asset warm fetch failed");
        }
        proxied_asset_url(&self.app_url, kind, &path)
    }

    async fn to_base64(
        &self,
        path_or_url: &str,
        kind: MediaKind,
        credential: &str,
    ) -> Option<String> {
        let path = asset_path(path_or_url);
        match self.fetch_asset(&path, kind, credential).await {
            Ok((bytes, content_type)) => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
                Some(format!("data:{content_type};base64,{encoded}"))
            }
            Err(err) => {
                tracing::warn!(error = %err, path = %path, "base64 asset fetch failed");
                None
            }
        }
    }

    async fn upscale_video_url(&self, video_url: &str, credential: &str) -> String {
        if !self.enable_upscale {
            return video_url.to_string();
        }
        let Some(video_id) = extract_video_id(video_url) else {
            tracing::warn!("video upscale skipped: unable to extract video id");
            return video_url.to_string();
        };

        let result: Result<Option<String>, AdapterError> = async {
            let _permit = self
                .permits(MediaKind::Video)
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| AdapterError::Internal("media semaphore closed".to_string()))?;
            let response = self
                .client
                .post(format!("{}{}", self.base_url, UPSCALE_ENDPOINT))
                .header("Cookie", format!("sso={credential}; sso-rw={credential}"))
                .json(&serde_json::json!({ "videoId": video_id }))
                .send()
                .await?
                .error_for_status()?;
            let payload: serde_json::Value = response.json().await?;
            Ok(payload
                .get("hdMediaUrl")
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string))
        }
        .await;

        match result {
            Ok(Some(hd_url)) => {
                tracing::info!(url = %hd_url, "video upscale completed");
                hd_url
            }
            Ok(None) => video_url.to_string(),
            Err(err) => {
                tracing::warn!(error = %err, "video upscale failed");
                video_url.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_path_strips_scheme_and_host() {
        assert_eq!(
            asset_path("https://assets.grok.com/users/u/g/image.jpg"),
            "/users/u/g/image.jpg"
        );
        assert_eq!(asset_path("users/u/g/image.jpg"), "/users/u/g/image.jpg");
        assert_eq!(asset_path("/already/rooted.png"), "/already/rooted.png");
    }

    #[test]
    fn proxied_url_shape() {
        assert_eq!(
            proxied_asset_url("https://app.example/", MediaKind::Image, "/users/u/i.jpg"),
            "https://app.example/v1/files/image/users/u/i.jpg"
        );
        assert_eq!(
            proxied_asset_url("https://app.example", MediaKind::Video, "/v.mp4"),
            "https://app.example/v1/files/video/v.mp4"
        );
    }

    #[test]
    fn video_id_extraction() {
        assert_eq!(
            extract_video_id(
                "https://assets.grok.com/users/u/generated/0123456789abcdef0123456789abcdef/video.mp4"
            )
            .as_deref(),
            Some("0123456789abcdef0123456789abcdef")
        );
        assert_eq!(
            extract_video_id(
                "https://assets.grok.com/aaaabbbb-cccc-dddd-eeee-ffff00001111/generated_video.mp4"
            )
            .as_deref(),
            Some("aaaabbbb-cccc-dddd-eeee-ffff00001111")
        );
        assert!(extract_video_id("https://assets.grok.com/plain.mp4").is_none());
    }
}

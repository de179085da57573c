//! WebSocket generation sessions and the credential retry loop around
//! them.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;

use super::progress::{
    scroll_budget, GenerationProgress, ImageFrame, ImageStage, ProgressUpdate,
};
use super::wire::{extract_image_id, GenerationRequest, RequestKind, ServerMessage};
use crate::config::{AppConfig, ImagineConfig};
use crate::credentials::{Credential, CredentialOutcome, CredentialPool};
use crate::error::{AdapterError, UpstreamErrorCode};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
const ORIGIN: &str = "https://grok.com";

/// One image generation request.
#[derive(Debug, Clone)]
pub struct ImagineRequest {
    pub prompt: String,
    pub count: usize,
    /// Overrides the configured default when set.
    pub aspect_ratio: Option<String>,
    pub enable_nsfw: Option<bool>,
}

impl ImagineRequest {
    #[must_use]
    pub fn new(prompt: impl Into<String>, count: usize) -> Self {
        Self {
            prompt: prompt.into(),
            count,
            aspect_ratio: None,
            enable_nsfw: None,
        }
    }
}

/// Successful generation result.
#[derive(Debug, Clone)]
pub struct ImagineOutcome {
    /// Base64 payloads, largest rendering first.
    pub images: Vec<String>,
    /// Number of candidates withheld by the server-side content filter.
    pub filtered: usize,
}

/// Client for the progressive image generation endpoint.
pub struct ImagineClient {
    ws_url: String,
    config: ImagineConfig,
    pool: Arc<dyn CredentialPool>,
}

impl ImagineClient {
    #[must_use]
    pub fn new(config: &AppConfig, pool: Arc<dyn CredentialPool>) -> Self {
        Self {
            ws_url: config.upstream.imagine_ws_url.clone(),
            config: config.imagine.clone(),
            pool,
        }
    }

    /// Generate images, rotating credentials on retryable failures.
    ///
    /// When `pinned_token` is set that credential is used for every
    /// attempt and the first failure is returned as-is.
    pub async fn generate(
        &self,
        request: &ImagineRequest,
        pinned_token: Option<&str>,
    ) -> Result<ImagineOutcome, AdapterError> {
        self.generate_with_updates(request, pinned_token, None).await
    }

    /// Like [`generate`](Self::generate), forwarding per-frame progress
    /// over `progress_tx` as it arrives.
    pub async fn generate_with_updates(
        &self,
        request: &ImagineRequest,
        pinned_token: Option<&str>,
        progress_tx: Option<mpsc::Sender<ProgressUpdate>>,
    ) -> Result<ImagineOutcome, AdapterError> {
        let mut last_error: Option<AdapterError> = None;
        let mut blocked_retries = 0u32;

        for attempt in 0..self.config.max_attempts {
            let credential = match pinned_token {
                Some(token) => Credential::pinned(token),
                None => self.pool.acquire().await?,
            };

            match self
                .run_session(&credential.token, request, progress_tx.as_ref())
                .await
            {
                Ok(outcome) => {
                    self.pool
                        .report(&credential, CredentialOutcome::Success)
                        .await;
                    return Ok(outcome);
                }
                Err(err) => match err.upstream_code() {
                    Some(UpstreamErrorCode::Blocked) => {
                        blocked_retries += 1;
                        tracing::warn!(
                            attempt = attempt + 1,
                            blocked_retries,
                            "generation blocked upstream"
                        );
                        self.pool
                            .report(&credential, CredentialOutcome::Blocked)
                            .await;
                        if blocked_retries >= self.config.max_blocked_retries {
                            return Err(AdapterError::upstream(
                                UpstreamErrorCode::Blocked,
                                format!("blocked {blocked_retries} times in a row"),
                            ));
                        }
                        if credential.pinned {
                            return Err(err);
                        }
                        last_error = Some(err);
                    }
                    Some(UpstreamErrorCode::RateLimitExceeded) => {
                        self.pool
                            .report(&credential, CredentialOutcome::RateLimited)
                            .await;
                        if credential.pinned {
                            return Err(err);
                        }
                        tracing::info!(
                            attempt = attempt + 1,
                            max_attempts = self.config.max_attempts,
                            "rate limited; rotating credential"
                        );
                        last_error = Some(err);
                    }
                    Some(UpstreamErrorCode::Unauthorized) => {
                        self.pool
                            .report(&credential, CredentialOutcome::Unauthorized)
                            .await;
                        if credential.pinned {
                            return Err(err);
                        }
                        last_error = Some(err);
                    }
                    Some(_) => return Err(err),
                    None => match err {
                        AdapterError::Transport(_) | AdapterError::IdleTimeout { .. } => {
                            tracing::error!(error = %err, "generation attempt failed");
                            self.pool
                                .report(&credential, CredentialOutcome::TransportFailure)
                                .await;
                            if credential.pinned {
                                return Err(err);
                            }
                            last_error = Some(err);
                        }
                        other => return Err(other),
                    },
                },
            }
        }

        Err(last_error
            .unwrap_or_else(|| AdapterError::Internal("all generation attempts failed".into())))
    }

    fn handshake_request(
        &self,
        token: &str,
    ) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request, AdapterError> {
        let mut request = self.ws_url.as_str().into_client_request()?;
        let headers = request.headers_mut();
        let cookie = HeaderValue::from_str(&format!("sso={token}; sso-rw={token}"))
            .map_err(|e| AdapterError::Internal(format!("invalid cookie header: {e}")))?;
        headers.insert("Cookie", cookie);
        headers.insert("Origin", HeaderValue::from_static(ORIGIN));
        headers.insert("User-Agent", HeaderValue::from_static(USER_AGENT));
        headers.insert(
            "Accept-Language",
            HeaderValue::from_static("en-US,en;q=0.9"),
        );
        headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
        headers.insert("Pragma", HeaderValue::from_static("no-cache"));
        Ok(request)
    }

    async fn run_session(
        &self,
        token: &str,
        request: &ImagineRequest,
        progress_tx: Option<&mpsc::Sender<ProgressUpdate>>,
    ) -> Result<ImagineOutcome, AdapterError> {
        let aspect_ratio = request
            .aspect_ratio
            .as_deref()
            .unwrap_or(&self.config.aspect_ratio);
        let enable_nsfw = request.enable_nsfw.unwrap_or(self.config.enable_nsfw);
        let count = request.count.max(1);

        let handshake = self.handshake_request(token)?;
        let (mut ws, _) = tokio_tungstenite::connect_async(handshake).await?;

        let initial = GenerationRequest::new(
            uuid::Uuid::new_v4().to_string(),
            &request.prompt,
            RequestKind::InputText,
            aspect_ratio,
            enable_nsfw,
        );
        let body = serde_json::to_string(&initial)
            .map_err(|e| AdapterError::Internal(e.to_string()))?;
        ws.send(Message::text(body)).await?;
        tracing::info!(count, aspect_ratio, "generation request sent");

        let read_timeout = Duration::from_secs(self.config.read_timeout_secs);
        let stall = Duration::from_secs(self.config.stall_secs);
        let deadline = Instant::now() + Duration::from_secs(self.config.session_timeout_secs);
        let max_scroll = scroll_budget(count);

        let mut progress = GenerationProgress::new(count);
        let mut error_info: Option<(UpstreamErrorCode, String)> = None;
        let mut filtered = 0usize;
        let mut translated_prompt: Option<String> = None;
        let mut scroll_count = 0usize;
        let mut last_activity = Instant::now();

        while Instant::now() < deadline {
            let message = match tokio::time::timeout(read_timeout, ws.next()).await {
                Ok(Some(Ok(message))) => message,
                Ok(Some(Err(err))) => {
                    tracing::warn!(error = %err, "websocket read error");
                    break;
                }
                Ok(None) => {
                    tracing::warn!("websocket closed by server");
                    break;
                }
                Err(_) => {
                    // No traffic lately. Either the current batch is done
                    // and we should ask for more, or the session is over.
                    if progress.completed() > 0 && last_activity.elapsed() > stall {
                        if progress.completed() < count
                            && translated_prompt.is_some()
                            && scroll_count < max_scroll
                        {
                            scroll_count += 1;
                            let prompt = translated_prompt.as_deref().unwrap_or_default();
                            let scroll = GenerationRequest::new(
                                uuid::Uuid::new_v4().to_string(),
                                prompt,
                                RequestKind::InputScroll,
                                aspect_ratio,
                                enable_nsfw,
                            );
                            let body = serde_json::to_string(&scroll)
                                .map_err(|e| AdapterError::Internal(e.to_string()))?;
                            ws.send(Message::text(body)).await?;
                            tracing::info!(scroll_count, max_scroll, "scroll request sent");
                            last_activity = Instant::now();
                            continue;
                        }
                        tracing::info!(
                            completed = progress.completed(),
                            "session idle; finishing with what we have"
                        );
                        break;
                    }
                    continue;
                }
            };

            let Message::Text(text) = message else {
                continue;
            };
            last_activity = Instant::now();

            let parsed: ServerMessage = match serde_json::from_str(text.as_str()) {
                Ok(parsed) => parsed,
                Err(err) => {
                    tracing::debug!(error = %err, "unparseable frame skipped");
                    continue;
                }
            };

            match parsed {
                ServerMessage::Json {
                    prompt,
                    percentage_complete,
                    r_rated,
                } => {
                    if let Some(prompt) = prompt {
                        translated_prompt = Some(prompt);
                    }
                    if percentage_complete == Some(100) && r_rated {
                        filtered += 1;
                        tracing::warn!(filtered, "image withheld by content filter");
                    }
                }
                ServerMessage::Image {
                    blob,
                    url,
                    percentage_complete,
                } => {
                    if blob.is_empty() || url.is_empty() {
                        continue;
                    }
                    let Some(image_id) = extract_image_id(&url) else {
                        continue;
                    };
                    let stage = if percentage_complete == Some(100) {
                        ImageStage::Final
                    } else {
                        ImageStage::Preview
                    };
                    let frame = ImageFrame::new(image_id, stage, blob, url);
                    if progress.record(frame.clone()) {
                        tracing::debug!(
                            image_id = %frame.image_id,
                            stage = frame.stage.as_str(),
                            size = frame.payload_size,
                            completed = progress.completed(),
                            total = count,
                            "image frame recorded"
                        );
                        if let Some(tx) = progress_tx {
                            if tx.send(progress.update_for(&frame)).await.is_err() {
                                tracing::debug!("progress consumer gone");
                            }
                        }
                    }
                }
                ServerMessage::Error { err_code, err_msg } => {
                    tracing::warn!(code = %err_code, message = %err_msg, "upstream error frame");
                    let code = UpstreamErrorCode::from_wire(&err_code);
                    if code == UpstreamErrorCode::RateLimitExceeded {
                        return Err(AdapterError::upstream(code, err_msg));
                    }
                    error_info = Some((code, err_msg));
                }
                ServerMessage::Other => {}
            }

            if progress.completed() >= count {
                tracing::info!(completed = progress.completed(), "all images collected");
                break;
            }
        }

        let images = progress.collect_final_images(count);
        if !images.is_empty() {
            return Ok(ImagineOutcome { images, filtered });
        }
        if let Some((code, message)) = error_info {
            return Err(AdapterError::upstream(code, message));
        }
        if filtered > 0 {
            return Err(AdapterError::upstream(
                UpstreamErrorCode::Blocked,
                format!("all {filtered} images were withheld by the content filter"),
            ));
        }
        Err(AdapterError::Protocol("no image data received".into()))
    }
}

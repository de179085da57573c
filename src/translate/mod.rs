//! Translators from upstream record streams to OpenAI-compatible output.
//!
//! Each modality (chat, image, video) has a streaming translator yielding
//! SSE frames and a batch translator collecting a single response object.
//! All of them share [`StreamState`], which owns chunk identity and the
//! reasoning-block bookkeeping.

pub mod chat;
pub mod image;
pub mod video;

use std::sync::Arc;

use crate::config::{AppConfig, ImageFormat, TranslateConfig};
use crate::error::AdapterError;
use crate::ledger::{ImageOriginLedger, OriginRecord, SourceType};
use crate::media::{asset_path, MediaFetcher, MediaKind};
use crate::protocol::openai::{ChatCompletionChunk, ChunkDelta};
use crate::protocol::upstream::RecordMeta;
use crate::util::{next_completion_id, unix_now_secs};

pub(crate) const THINK_OPEN: &str = "<think>\n";
pub(crate) const THINK_CLOSE: &str = "</think>\n";
const LEGACY_OPEN_MARKER: &str = "<think>";
const LEGACY_CLOSE_MARKER: &str = "</think>";

/// Per-request translation options.
#[derive(Debug, Clone)]
pub struct TranslateOptions {
    pub model: String,
    pub show_thinking: bool,
    pub image_format: ImageFormat,
    pub filter_tags: Vec<String>,
    /// Client product name, when the embedding service knows it. Some
    /// clients need alternative media markup.
    pub client_type: Option<String>,
}

impl TranslateOptions {
    #[must_use]
    pub fn from_config(config: &TranslateConfig, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            show_thinking: config.show_thinking,
            image_format: config.image_format,
            filter_tags: config.filter_tags.clone(),
            client_type: None,
        }
    }

    #[must_use]
    pub fn with_thinking(mut self, show: bool) -> Self {
        self.show_thinking = show;
        self
    }

    #[must_use]
    pub fn with_client_type(mut self, client_type: impl Into<String>) -> Self {
        self.client_type = Some(client_type.into());
        self
    }
}

/// Shared collaborators a translator needs for media side-calls and
/// provenance recording.
#[derive(Clone)]
pub struct TranslatorContext {
    pub media: Arc<dyn MediaFetcher>,
    pub ledger: ImageOriginLedger,
    pub assets_base_url: String,
    /// Credential of the upstream session, reused for asset fetches.
    pub credential: String,
}

impl TranslatorContext {
    #[must_use]
    pub fn new(
        config: &AppConfig,
        media: Arc<dyn MediaFetcher>,
        ledger: ImageOriginLedger,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            media,
            ledger,
            assets_base_url: config.upstream.assets_base_url.trim_end_matches('/').to_string(),
            credential: credential.into(),
        }
    }

    /// Markdown image line for a generated asset, honoring the configured
    /// delivery format. Base64 failures fall back to the proxied URL.
    pub(crate) async fn image_markdown(&self, raw_url: &str, format: ImageFormat) -> String {
        let img_id = image_id_from_url(raw_url);
        if format == ImageFormat::Base64 {
            if let Some(data_uri) = self
                .media
                .to_base64(raw_url, MediaKind::Image, &self.credential)
                .await
            {
                return format!("![{img_id}]({data_uri})\n");
            }
        }
        let final_url = self.resolve_image_url(raw_url).await;
        format!("![{img_id}]({final_url})\n")
    }

    /// Client-facing URL for a generated image, with provenance recorded
    /// when the URL was rewritten to the app proxy.
    pub(crate) async fn resolve_image_url(&self, raw_url: &str) -> String {
        let path = asset_path(raw_url);
        let final_url = self
            .media
            .resolve_url(raw_url, MediaKind::Image, &self.credential)
            .await;
        let original_url = format!("{}{}", self.assets_base_url, path);
        if final_url != original_url {
            self.ledger
                .upsert(OriginRecord {
                    source_type: Some(SourceType::Generated),
                    canonical_url: Some(final_url.clone()),
                    original_url: Some(original_url),
                    ..OriginRecord::default()
                })
                .await;
        }
        final_url
    }

    pub(crate) async fn resolve_video_url(&self, raw_url: &str) -> String {
        self.media
            .resolve_url(raw_url, MediaKind::Video, &self.credential)
            .await
    }
}

fn image_id_from_url(url: &str) -> &str {
    let mut parts = url.rsplit('/');
    let _file = parts.next();
    parts.next().filter(|p| !p.is_empty()).unwrap_or("image")
}

/// Per-stream translation state: chunk identity, role announcement and
/// reasoning-block balance.
pub(crate) struct StreamState {
    model: String,
    created: u64,
    fallback_id: String,
    response_id: Option<String>,
    fingerprint: Option<String>,
    role_announced: bool,
    thinking_open: bool,
    in_legacy_think: bool,
    pub(crate) content_filtered: bool,
    show_thinking: bool,
    filter_tags: Vec<String>,
}

impl StreamState {
    pub(crate) fn new(options: &TranslateOptions) -> Self {
        Self {
            model: options.model.clone(),
            created: unix_now_secs(),
            fallback_id: next_completion_id(),
            response_id: None,
            fingerprint: None,
            role_announced: false,
            thinking_open: false,
            in_legacy_think: false,
            content_filtered: false,
            show_thinking: options.show_thinking,
            filter_tags: options.filter_tags.clone(),
        }
    }

    pub(crate) fn created(&self) -> u64 {
        self.created
    }

    pub(crate) fn absorb_meta(&mut self, meta: &RecordMeta) {
        if let Some(response_id) = &meta.response_id {
            self.response_id = Some(response_id.clone());
        }
        if self.fingerprint.is_none() {
            self.fingerprint.clone_from(&meta.model_hash);
        }
    }

    pub(crate) fn set_fingerprint(&mut self, fingerprint: &str) {
        self.fingerprint = Some(fingerprint.to_string());
    }

    pub(crate) fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    pub(crate) fn chunk_id(&self) -> &str {
        self.response_id.as_deref().unwrap_or(&self.fallback_id)
    }

    fn chunk(&self) -> ChatCompletionChunk {
        ChatCompletionChunk::new(
            self.chunk_id(),
            self.created,
            &self.model,
            self.fingerprint.as_deref(),
        )
    }

    /// Role announcement frame; emitted once, before any content.
    pub(crate) fn role_frame(&mut self) -> Option<String> {
        if self.role_announced {
            return None;
        }
        self.role_announced = true;
        Some(
            self.chunk()
                .with_delta(ChunkDelta {
                    role: Some("assistant"),
                    content: Some(String::new()),
                })
                .into_frame(),
        )
    }

    pub(crate) fn role_announced(&self) -> bool {
        self.role_announced
    }

    pub(crate) fn content_frame(&self, text: impl Into<String>) -> String {
        self.chunk()
            .with_delta(ChunkDelta {
                role: None,
                content: Some(text.into()),
            })
            .into_frame()
    }

    /// Open the reasoning block, if display is enabled and it is not
    /// already open. Returns the frame carrying the open marker.
    pub(crate) fn open_think(&mut self) -> Option<String> {
        if !self.show_thinking || self.thinking_open {
            return None;
        }
        self.thinking_open = true;
        Some(self.content_frame(THINK_OPEN))
    }

    fn close_think(&mut self) -> Option<String> {
        if !self.thinking_open {
            return None;
        }
        self.thinking_open = false;
        Some(self.content_frame(THINK_CLOSE))
    }

    pub(crate) fn show_thinking(&self) -> bool {
        self.show_thinking
    }

    fn is_filtered(&self, token: &str) -> bool {
        self.filter_tags.iter().any(|tag| token.contains(tag))
    }

    fn push_text(&self, frames: &mut Vec<String>, segment: &str) {
        if !segment.is_empty() && !self.is_filtered(segment) {
            frames.push(self.content_frame(segment));
        }
    }

    /// Translate one upstream token into zero or more frames, maintaining
    /// the reasoning-block balance.
    ///
    /// Tokens flagged `thinking` are wrapped in an open/close marker pair
    /// when display is enabled and consumed silently otherwise. Legacy
    /// inline markers inside plain tokens are stripped and normalized to
    /// the same wrapping.
    pub(crate) fn token_frames(&mut self, text: &str, thinking: bool) -> Vec<String> {
        let mut frames = Vec::new();

        if thinking {
            if !self.show_thinking {
                return frames;
            }
            if let Some(frame) = self.open_think() {
                frames.push(frame);
            }
            self.push_text(&mut frames, text);
            return frames;
        }

        // A plain token ends any block opened by thinking-flagged tokens.
        if self.thinking_open && !self.in_legacy_think {
            if let Some(frame) = self.close_think() {
                frames.push(frame);
            }
        }

        let mut remaining = text;
        loop {
            if self.in_legacy_think {
                match remaining.find(LEGACY_CLOSE_MARKER) {
                    Some(pos) => {
                        if self.show_thinking {
                            self.push_text(&mut frames, &remaining[..pos]);
                            if let Some(frame) = self.close_think() {
                                frames.push(frame);
                            }
                        }
                        self.in_legacy_think = false;
                        remaining = strip_leading_newline(&remaining[pos + LEGACY_CLOSE_MARKER.len()..]);
                    }
                    None => {
                        if self.show_thinking {
                            self.push_text(&mut frames, remaining);
                        }
                        break;
                    }
                }
            } else {
                match remaining.find(LEGACY_OPEN_MARKER) {
                    Some(pos) => {
                        self.push_text(&mut frames, &remaining[..pos]);
                        self.in_legacy_think = true;
                        if let Some(frame) = self.open_think() {
                            frames.push(frame);
                        }
                        remaining = strip_leading_newline(&remaining[pos + LEGACY_OPEN_MARKER.len()..]);
                    }
                    None => {
                        self.push_text(&mut frames, remaining);
                        break;
                    }
                }
            }
            if remaining.is_empty() {
                break;
            }
        }

        frames
    }

    /// Frames that flush an open reasoning block before terminal content.
    pub(crate) fn flush_think(&mut self, message: Option<&str>) -> Vec<String> {
        let mut frames = Vec::new();
        if self.thinking_open {
            if let Some(message) = message.filter(|m| !m.is_empty()) {
                frames.push(self.content_frame(format!("{message}\n")));
            }
            if let Some(frame) = self.close_think() {
                frames.push(frame);
            }
        }
        self.in_legacy_think = false;
        frames
    }

    /// Terminal frames: close any open reasoning block, emit the finish
    /// chunk, then the `[DONE]` sentinel.
    pub(crate) fn finish_frames(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        if let Some(frame) = self.close_think() {
            frames.push(frame);
        }
        let reason = if self.content_filtered {
            "content_filter"
        } else {
            "stop"
        };
        frames.push(self.chunk().with_finish(reason).into_frame());
        frames.push(crate::protocol::openai::DONE_FRAME.to_string());
        frames
    }
}

/// Result alias used by the streaming translators.
pub type FrameResult = Result<String, AdapterError>;

fn strip_leading_newline(text: &str) -> &str {
    text.strip_prefix('\n').unwrap_or(text)
}

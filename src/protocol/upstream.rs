//! Serde model of the upstream streaming record envelope.
//!
//! Every line of an upstream response body is a JSON object of the shape
//! `{"result": {"response": {...}}}`. The inner response is a loose union:
//! a token delta, a terminal model response, or a media progress update,
//! always with optional identity metadata alongside.

use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct UpstreamEnvelope {
    #[serde(default)]
    pub result: Option<UpstreamResult>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpstreamResult {
    #[serde(default)]
    pub response: Option<UpstreamResponse>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamResponse {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub is_thinking: bool,
    #[serde(default)]
    pub response_id: Option<String>,
    #[serde(default)]
    pub llm_info: Option<LlmInfo>,
    #[serde(default)]
    pub model_response: Option<ModelResponse>,
    #[serde(default)]
    pub streaming_image_generation_response: Option<ImageProgress>,
    #[serde(default)]
    pub streaming_video_generation_response: Option<VideoProgress>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmInfo {
    #[serde(default)]
    pub model_hash: Option<String>,
}

/// Terminal response object carried by the final record of a generation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelResponse {
    #[serde(default)]
    pub response_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub generated_image_urls: Vec<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub generated_video_urls: Vec<String>,
    #[serde(default)]
    pub thumbnail_image_url: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub metadata: Option<ModelResponseMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelResponseMetadata {
    #[serde(default)]
    pub llm_info: Option<LlmInfo>,
}

impl ModelResponse {
    /// Model fingerprint buried in response metadata, when present.
    #[must_use]
    pub fn metadata_model_hash(&self) -> Option<&str> {
        self.metadata
            .as_ref()?
            .llm_info
            .as_ref()?
            .model_hash
            .as_deref()
    }

    /// Best available video URL, in upstream preference order.
    #[must_use]
    pub fn video_url_candidate(&self) -> Option<&str> {
        self.generated_video_urls
            .first()
            .map(String::as_str)
            .filter(|u| !u.is_empty())
            .or(non_empty(self.video_url.as_deref()))
            .or(non_empty(self.media_url.as_deref()))
            .or(non_empty(self.url.as_deref()))
    }

    #[must_use]
    pub fn thumbnail_candidate(&self) -> Option<&str> {
        non_empty(self.thumbnail_image_url.as_deref()).or(non_empty(self.thumbnail_url.as_deref()))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageProgress {
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub image_index: Option<usize>,
    #[serde(default)]
    pub progress: Option<ProgressValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoProgress {
    #[serde(default)]
    pub progress: Option<ProgressValue>,
    #[serde(default)]
    pub moderated: bool,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub generated_video_urls: Vec<String>,
    #[serde(default)]
    pub thumbnail_image_url: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub video_id: Option<String>,
    #[serde(default)]
    pub video_post_id: Option<String>,
}

impl VideoProgress {
    /// Whether this update marks the generation as done. Progress values
    /// arrive as numbers or numeric strings.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.progress
            .as_ref()
            .and_then(ProgressValue::as_percent)
            .is_some_and(|p| p >= 100.0)
    }

    #[must_use]
    pub fn percent(&self) -> f64 {
        self.progress
            .as_ref()
            .and_then(ProgressValue::as_percent)
            .unwrap_or(0.0)
    }

    #[must_use]
    pub fn video_url_candidate(&self) -> Option<&str> {
        non_empty(self.video_url.as_deref())
            .or(non_empty(self.url.as_deref()))
            .or(non_empty(self.media_url.as_deref()))
            .or_else(|| {
                self.generated_video_urls
                    .first()
                    .map(String::as_str)
                    .filter(|u| !u.is_empty())
            })
    }

    #[must_use]
    pub fn thumbnail_candidate(&self) -> Option<&str> {
        non_empty(self.thumbnail_image_url.as_deref()).or(non_empty(self.thumbnail_url.as_deref()))
    }
}

/// Progress values arrive either as numbers or numeric strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ProgressValue {
    Number(f64),
    Text(String),
}

impl ProgressValue {
    /// Percent completed, if the value parses as a number.
    #[must_use]
    pub fn as_percent(&self) -> Option<f64> {
        match self {
            ProgressValue::Number(n) => Some(*n),
            ProgressValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// Identity metadata that may ride along on any record.
#[derive(Debug, Default, Clone)]
pub struct RecordMeta {
    pub response_id: Option<String>,
    pub model_hash: Option<String>,
}

/// Closed record union the translators dispatch on. Unrecognized shapes
/// decode to [`UpstreamRecord::Unrecognized`] so new upstream fields never
/// break existing streams.
#[derive(Debug)]
pub enum UpstreamRecord {
    Token {
        text: String,
        thinking: bool,
    },
    ModelResponse(ModelResponse),
    ImageProgress(ImageProgress),
    /// Video progress update. The terminal update (100%) arrives with a
    /// sibling model response carrying fallback URLs and messages.
    VideoProgress {
        progress: VideoProgress,
        model_response: Option<ModelResponse>,
    },
    Unrecognized,
}

impl UpstreamEnvelope {
    /// Split an envelope into identity metadata and the record payload.
    #[must_use]
    pub fn into_record(self) -> (RecordMeta, UpstreamRecord) {
        let Some(response) = self.result.and_then(|r| r.response) else {
            return (RecordMeta::default(), UpstreamRecord::Unrecognized);
        };

        let meta = RecordMeta {
            response_id: response.response_id,
            model_hash: response.llm_info.and_then(|info| info.model_hash),
        };

        let record = if let Some(progress) = response.streaming_image_generation_response {
            UpstreamRecord::ImageProgress(progress)
        } else if let Some(progress) = response.streaming_video_generation_response {
            UpstreamRecord::VideoProgress {
                progress,
                model_response: response.model_response,
            }
        } else if let Some(model_response) = response.model_response {
            UpstreamRecord::ModelResponse(model_response)
        } else if let Some(text) = response.token {
            UpstreamRecord::Token {
                text,
                thinking: response.is_thinking,
            }
        } else {
            UpstreamRecord::Unrecognized
        };

        (meta, record)
    }
}

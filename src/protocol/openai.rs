//! OpenAI-compatible response objects and SSE frame assembly.

use serde::Serialize;

/// Terminal SSE sentinel.
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Wrap a JSON payload in a plain SSE data frame.
#[must_use]
pub fn sse_frame(json: &str) -> String {
    let mut out = String::with_capacity(8 + json.len());
    out.push_str("data: ");
    out.push_str(json);
    out.push_str("\n\n");
    out
}

/// Wrap a JSON payload in a named SSE event frame.
#[must_use]
pub fn sse_event_frame(event: &str, json: &str) -> String {
    let mut out = String::with_capacity(16 + event.len() + json.len());
    out.push_str("event: ");
    out.push_str(event);
    out.push_str("\ndata: ");
    out.push_str(json);
    out.push_str("\n\n");
    out
}

#[derive(Debug, Default, Serialize)]
pub struct ChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChunkDelta,
    pub logprobs: Option<serde_json::Value>,
    pub finish_reason: Option<&'static str>,
}

/// One `chat.completion.chunk` object.
#[derive(Debug, Serialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: &'static str,
    pub created: u64,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_fingerprint: Option<String>,
    pub choices: Vec<ChunkChoice>,
}

impl ChatCompletionChunk {
    #[must_use]
    pub fn new(id: &str, created: u64, model: &str, fingerprint: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            object: "chat.completion.chunk",
            created,
            model: model.to_string(),
            system_fingerprint: fingerprint.map(str::to_string),
            choices: Vec::with_capacity(1),
        }
    }

    #[must_use]
    pub fn with_delta(mut self, delta: ChunkDelta) -> Self {
        self.choices.push(ChunkChoice {
            index: 0,
            delta,
            logprobs: None,
            finish_reason: None,
        });
        self
    }

    #[must_use]
    pub fn with_finish(mut self, reason: &'static str) -> Self {
        self.choices.push(ChunkChoice {
            index: 0,
            delta: ChunkDelta::default(),
            logprobs: None,
            finish_reason: Some(reason),
        });
        self
    }

    /// Serialize into an SSE data frame.
    #[must_use]
    pub fn into_frame(self) -> String {
        match serde_json::to_string(&self) {
            Ok(json) => sse_frame(&json),
            Err(err) => {
                tracing::error!(error = %err, "failed to serialize completion chunk");
                String::new()
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PromptTokensDetails {
    pub cached_tokens: u32,
    pub text_tokens: u32,
    pub audio_tokens: u32,
    pub image_tokens: u32,
}

#[derive(Debug, Serialize)]
pub struct CompletionTokensDetails {
    pub text_tokens: u32,
    pub audio_tokens: u32,
    pub reasoning_tokens: u32,
}

/// Usage block on batch responses. Upstream does not report token counts
/// for these endpoints, so all fields stay zero.
#[derive(Debug, Serialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub prompt_tokens_details: PromptTokensDetails,
    pub completion_tokens_details: CompletionTokensDetails,
}

impl Usage {
    #[must_use]
    pub fn zeroed() -> Self {
        Self {
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
            prompt_tokens_details: PromptTokensDetails {
                cached_tokens: 0,
                text_tokens: 0,
                audio_tokens: 0,
                image_tokens: 0,
            },
            completion_tokens_details: CompletionTokensDetails {
                text_tokens: 0,
                audio_tokens: 0,
                reasoning_tokens: 0,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CompletionMessage {
    pub role: &'static str,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refusal: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CompletionChoice {
    pub index: u32,
    pub message: CompletionMessage,
    pub logprobs: Option<serde_json::Value>,
    pub finish_reason: &'static str,
}

/// Full batch `chat.completion` object.
#[derive(Debug, Serialize)]
pub struct ChatCompletion {
    pub id: String,
    pub object: &'static str,
    pub created: u64,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_fingerprint: Option<String>,
    pub choices: Vec<CompletionChoice>,
    pub usage: Usage,
}

impl ChatCompletion {
    #[must_use]
    pub fn single(
        id: &str,
        created: u64,
        model: &str,
        fingerprint: Option<&str>,
        content: String,
        refusal: Option<String>,
        finish_reason: &'static str,
    ) -> Self {
        Self {
            id: id.to_string(),
            object: "chat.completion",
            created,
            model: model.to_string(),
            system_fingerprint: fingerprint.map(str::to_string),
            choices: vec![CompletionChoice {
                index: 0,
                message: CompletionMessage {
                    role: "assistant",
                    content,
                    refusal,
                },
                logprobs: None,
                finish_reason,
            }],
            usage: Usage::zeroed(),
        }
    }
}

// ---------------------------------------------------------------------------
// Image generation events
// ---------------------------------------------------------------------------

pub const IMAGE_PARTIAL_EVENT: &str = "image_generation.partial_image";
pub const IMAGE_COMPLETED_EVENT: &str = "image_generation.completed";

#[derive(Debug, Serialize)]
pub struct ImageTokensDetails {
    pub text_tokens: u32,
    pub image_tokens: u32,
}

/// Synthetic usage attached to completed image events. The upstream image
/// pipeline reports no token accounting, so fixed nominal values stand in.
#[derive(Debug, Serialize)]
pub struct ImageUsage {
    pub total_tokens: u32,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub input_tokens_details: ImageTokensDetails,
}

impl ImageUsage {
    #[must_use]
    pub fn nominal() -> Self {
        Self {
            total_tokens: 50,
            input_tokens: 25,
            output_tokens: 25,
            input_tokens_details: ImageTokensDetails {
                text_tokens: 5,
                image_tokens: 20,
            },
        }
    }
}

/// Partial progress event. No pixels are available mid-generation, so
/// `b64_json` stays empty until completion.
#[derive(Debug, Serialize)]
pub struct ImagePartialEvent {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub b64_json: String,
    pub index: usize,
    pub progress: f64,
}

impl ImagePartialEvent {
    #[must_use]
    pub fn new(index: usize, progress: f64) -> Self {
        Self {
            kind: IMAGE_PARTIAL_EVENT,
            b64_json: String::new(),
            index,
            progress,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ImageCompletedEvent {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub b64_json: String,
    pub index: usize,
    pub usage: ImageUsage,
}

impl ImageCompletedEvent {
    #[must_use]
    pub fn new(b64_json: String, index: usize) -> Self {
        Self {
            kind: IMAGE_COMPLETED_EVENT,
            b64_json,
            index,
            usage: ImageUsage::nominal(),
        }
    }
}

/// Serialize an image event into a named SSE frame.
pub fn image_event_frame<T: Serialize>(event: &str, payload: &T) -> String {
    match serde_json::to_string(payload) {
        Ok(json) => sse_event_frame(event, &json),
        Err(err) => {
            tracing::error!(error = %err, "failed to serialize image event");
            String::new()
        }
    }
}

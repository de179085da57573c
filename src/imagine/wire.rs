//! Wire types for the imagine WebSocket endpoint.
//!
//! Outbound frames are `conversation.item.create` envelopes carrying a
//! single content item; inbound frames are tagged by `type`.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::util::unix_now_millis;

/// What the content item asks the server to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Start generating from a prompt.
    InputText,
    /// Ask for another batch using the server-translated prompt.
    InputScroll,
}

impl RequestKind {
    #[must_use]
    pub fn as_wire(self) -> &'static str {
        match self {
            RequestKind::InputText => "input_text",
            RequestKind::InputScroll => "input_scroll",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestProperties {
    pub section_count: u32,
    pub is_kids_mode: bool,
    pub enable_nsfw: bool,
    pub skip_upsampler: bool,
    pub is_initial: bool,
    pub aspect_ratio: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestContent {
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub properties: RequestProperties,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: Vec<RequestContent>,
}

/// Outbound generation request frame.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: u64,
    pub item: RequestItem,
}

impl GenerationRequest {
    #[must_use]
    pub fn new(
        request_id: String,
        text: &str,
        kind: RequestKind,
        aspect_ratio: &str,
        enable_nsfw: bool,
    ) -> Self {
        Self {
            kind: "conversation.item.create".to_string(),
            timestamp: unix_now_millis(),
            item: RequestItem {
                kind: "message".to_string(),
                content: vec![RequestContent {
                    request_id,
                    text: text.to_string(),
                    kind: kind.as_wire().to_string(),
                    properties: RequestProperties {
                        section_count: 0,
                        is_kids_mode: false,
                        enable_nsfw,
                        skip_upsampler: false,
                        is_initial: false,
                        aspect_ratio: aspect_ratio.to_string(),
                    },
                }],
            },
        }
    }
}

/// Inbound frames, tagged by `type`. Unknown types deserialize to
/// [`ServerMessage::Other`] and are ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Json {
        /// Server-translated prompt, reused verbatim for scroll requests.
        #[serde(default)]
        prompt: Option<String>,
        #[serde(default)]
        percentage_complete: Option<u32>,
        #[serde(default)]
        r_rated: bool,
    },
    Image {
        #[serde(default)]
        blob: String,
        #[serde(default)]
        url: String,
        #[serde(default)]
        percentage_complete: Option<u32>,
    },
    Error {
        #[serde(default)]
        err_code: String,
        #[serde(default)]
        err_msg: String,
    },
    #[serde(other)]
    Other,
}

/// Pull the image id out of an asset URL like
/// `.../images/0a1b2c3d-....png`.
#[must_use]
pub fn extract_image_id(url: &str) -> Option<String> {
    static PATTERN: OnceLock<regex_lite::Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        regex_lite::Regex::new(r"/images/([a-f0-9-]+)\.(png|jpg)").expect("fixed pattern")
    });
    re.captures(url).map(|caps| caps[1].to_string())
}

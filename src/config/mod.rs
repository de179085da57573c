pub mod validation;

use serde::{Deserialize, Serialize};
use std::fmt;

use self::validation::validate_config;

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// How generated images are delivered inside chat responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// Rewrite upstream asset URLs to app-hosted proxy URLs.
    #[default]
    Url,
    /// Download and inline the image as a base64 data URI.
    Base64,
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageFormat::Url => write!(f, "url"),
            ImageFormat::Base64 => write!(f, "base64"),
        }
    }
}

/// Upstream endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_assets_base_url")]
    pub assets_base_url: String,
    #[serde(default = "default_imagine_public_base_url")]
    pub imagine_public_base_url: String,
    #[serde(default = "default_imagine_ws_url")]
    pub imagine_ws_url: String,
}

fn default_base_url() -> String {
    "https://grok.com".to_string()
}
fn default_assets_base_url() -> String {
    "https://assets.grok.com".to_string()
}
fn default_imagine_public_base_url() -> String {
    "https://imagine-public.x.ai".to_string()
}
fn default_imagine_ws_url() -> String {
    "wss://grok.com/ws/imagine/listen".to_string()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            assets_base_url: default_assets_base_url(),
            imagine_public_base_url: default_imagine_public_base_url(),
            imagine_ws_url: default_imagine_ws_url(),
        }
    }
}

/// Stream translation settings shared by the chat, image and video
/// translators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslateConfig {
    #[serde(default = "default_true")]
    pub show_thinking: bool,
    #[serde(default)]
    pub image_format: ImageFormat,
    /// Tokens containing any of these substrings are dropped.
    #[serde(default)]
    pub filter_tags: Vec<String>,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}
fn default_idle_timeout_secs() -> u64 {
    300
}

impl Default for TranslateConfig {
    fn default() -> Self {
        Self {
            show_thinking: true,
            image_format: ImageFormat::default(),
            filter_tags: Vec::new(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

/// Outbound media call limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    #[serde(default = "default_image_concurrency")]
    pub image_concurrency: usize,
    #[serde(default = "default_video_concurrency")]
    pub video_concurrency: usize,
    #[serde(default = "default_true")]
    pub enable_video_upscale: bool,
}

fn default_image_concurrency() -> usize {
    8
}
fn default_video_concurrency() -> usize {
    4
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            image_concurrency: default_image_concurrency(),
            video_concurrency: default_video_concurrency(),
            enable_video_upscale: true,
        }
    }
}

/// Progressive image generation (imagine) session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagineConfig {
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,
    #[serde(default = "default_stall_secs")]
    pub stall_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_max_blocked_retries")]
    pub max_blocked_retries: u32,
    #[serde(default)]
    pub enable_nsfw: bool,
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,
}

fn default_read_timeout_secs() -> u64 {
    5
}
fn default_session_timeout_secs() -> u64 {
    120
}
fn default_stall_secs() -> u64 {
    10
}
fn default_max_attempts() -> u32 {
    5
}
fn default_max_blocked_retries() -> u32 {
    3
}
fn default_aspect_ratio() -> String {
    "2:3".to_string()
}

impl Default for ImagineConfig {
    fn default() -> Self {
        Self {
            read_timeout_secs: default_read_timeout_secs(),
            session_timeout_secs: default_session_timeout_secs(),
            stall_secs: default_stall_secs(),
            max_attempts: default_max_attempts(),
            max_blocked_retries: default_max_blocked_retries(),
            enable_nsfw: false,
            aspect_ratio: default_aspect_ratio(),
        }
    }
}

/// Image provenance ledger settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_path")]
    pub path: String,
}

fn default_ledger_path() -> String {
    "data/image_origin.json".to_string()
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Public base URL of the embedding app, used when rewriting
    /// upstream asset URLs to proxied ones.
    #[serde(default)]
    pub app_url: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub translate: TranslateConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub imagine: ImagineConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_url: String::new(),
            log_level: default_log_level(),
            upstream: UpstreamConfig::default(),
            translate: TranslateConfig::default(),
            media: MediaConfig::default(),
            imagine: ImagineConfig::default(),
            ledger: LedgerConfig::default(),
        }
    }
}

/// Load configuration from a YAML file and validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_yaml::from_str(&contents)?;
    validate_config(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.log_level, "INFO");
        assert_eq!(config.imagine.read_timeout_secs, 5);
        assert_eq!(config.imagine.session_timeout_secs, 120);
        assert_eq!(config.imagine.max_attempts, 5);
        assert_eq!(config.translate.image_format, ImageFormat::Url);
        assert!(config.translate.show_thinking);
    }

    #[test]
    fn test_parse_minimal_yaml() {
        let yaml = r#"
app_url: "https://bridge.example.com"
translate:
  image_format: base64
  filter_tags: ["<xaiArtifact"]
imagine:
  enable_nsfw: true
  aspect_ratio: "16:9"
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.app_url, "https://bridge.example.com");
        assert_eq!(config.translate.image_format, ImageFormat::Base64);
        assert_eq!(config.translate.filter_tags, vec!["<xaiArtifact"]);
        assert!(config.imagine.enable_nsfw);
        assert_eq!(config.imagine.aspect_ratio, "16:9");
        assert_eq!(config.upstream.imagine_ws_url, "wss://grok.com/ws/imagine/listen");
    }

    #[test]
    fn test_image_format_serde() {
        let json = serde_json::to_string(&ImageFormat::Base64).unwrap();
        assert_eq!(json, "\"base64\"");
        let format: ImageFormat = serde_json::from_str("\"url\"").unwrap();
        assert_eq!(format, ImageFormat::Url);
    }
}

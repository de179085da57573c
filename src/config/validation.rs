use super::{AppConfig, ConfigError};

/// Semantic validation beyond what serde enforces.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.imagine.read_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "imagine.read_timeout_secs must be positive".to_string(),
        ));
    }
    if config.imagine.session_timeout_secs < config.imagine.read_timeout_secs {
        return Err(ConfigError::Validation(
            "imagine.session_timeout_secs must not be below read_timeout_secs".to_string(),
        ));
    }
    if config.imagine.max_attempts == 0 {
        return Err(ConfigError::Validation(
            "imagine.max_attempts must be positive".to_string(),
        ));
    }
    if config.media.image_concurrency == 0 || config.media.video_concurrency == 0 {
        return Err(ConfigError::Validation(
            "media concurrency limits must be positive".to_string(),
        ));
    }
    for url in [
        &config.upstream.base_url,
        &config.upstream.assets_base_url,
        &config.upstream.imagine_public_base_url,
    ] {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "upstream URL must be http(s): {url}"
            )));
        }
    }
    if !config.upstream.imagine_ws_url.starts_with("ws://")
        && !config.upstream.imagine_ws_url.starts_with("wss://")
    {
        return Err(ConfigError::Validation(format!(
            "imagine_ws_url must be ws(s): {}",
            config.upstream.imagine_ws_url
        )));
    }
    Ok(())
}

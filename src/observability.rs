use tracing_subscriber::EnvFilter;

/// Translate a config log level into an `EnvFilter` directive. The
/// config vocabulary keeps the aliases the upstream service used
/// ("WARNING", "CRITICAL", "DISABLED"); everything else is handed to
/// the filter as-is, with `RUST_LOG` taking precedence when set.
fn filter_for(level: &str) -> Option<EnvFilter> {
    let directive = match level.to_uppercase().as_str() {
        "DISABLED" => return None,
        "WARNING" => "warn".to_string(),
        "CRITICAL" => "error".to_string(),
        other => other.to_ascii_lowercase(),
    };
    Some(
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&directive))
            .unwrap_or_else(|_| EnvFilter::new("info")),
    )
}

/// Install the global tracing subscriber for the configured level.
/// A "DISABLED" level installs nothing.
pub fn init_logging(log_level: &str) {
    let Some(filter) = filter_for(log_level) else {
        return;
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

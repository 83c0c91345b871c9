//! Log subscriber setup. The subscriber is returned rather than installed globally so the
//! caller can scope it with `tracing::subscriber::with_default`.

use tracing::Subscriber;
use tracing_subscriber::EnvFilter;

/// Filter directive from the command line flags, or from the config `log_level` when no
/// flag was given.
pub fn directive(quiet: bool, verbose: u8, config_level: Option<&str>) -> String {
    if quiet {
        return "error".to_string();
    }
    match verbose {
        0 => match config_level {
            Some(level) if !level.trim().is_empty() => level.trim().to_string(),
            _ => "ranobescrape=info,warn".to_string(),
        },
        1 => "ranobescrape=debug,info".to_string(),
        2 => "ranobescrape=trace,debug".to_string(),
        _ => "trace".to_string(),
    }
}

/// Parse a filter directive such as `debug` or `ranobescrape=trace,warn`.
pub fn filter(directive: &str) -> Result<EnvFilter, String> {
    EnvFilter::try_new(directive).map_err(|e| format!("Invalid log level '{}': {}", directive, e))
}

/// Plain stderr subscriber: no timestamps, no targets.
pub fn subscriber(filter: EnvFilter) -> impl Subscriber + Send + Sync {
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .without_time()
        .finish()
}

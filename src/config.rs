//! Optional config file loading. Search order: ./ranobescrape.toml, then
//! $XDG_CONFIG_HOME/ranobescrape/config.toml (or ~/.config/ranobescrape/config.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file contents. All fields optional; only present keys override defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    /// Default output directory when -o is not set. Paths are relative to CWD.
    pub output_dir: Option<PathBuf>,
    /// HTTP User-Agent header.
    pub user_agent: Option<String>,
    /// Delay in seconds between requests.
    pub request_delay_secs: Option<u64>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Attempts per request or page lookup (default 5).
    pub retry_count: Option<u32>,
    /// Pause in seconds between attempts (default 10).
    pub retry_backoff_secs: Option<u64>,
    /// API root, e.g. https://api.lib.social/api.
    pub api_base: Option<String>,
    /// Book language code (default "ru").
    pub language: Option<String>,
    /// WebDriver server used by --browser.
    pub webdriver_url: Option<String>,
    /// Log filter directive used when neither -q nor -v is given.
    pub log_level: Option<String>,
}

/// Search order: (1) ./ranobescrape.toml, (2) $XDG_CONFIG_HOME/ranobescrape/config.toml.
/// Missing file returns Ok(None). Invalid TOML or I/O error reading a present file returns Err.
pub fn load_config() -> Result<Option<Config>, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Cannot determine current directory: {}", e))?;
    let mut paths = vec![cwd.join("ranobescrape.toml")];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join("ranobescrape").join("config.toml"));
    }
    load_first(&paths)
}

fn load_first(paths: &[PathBuf]) -> Result<Option<Config>, String> {
    for path in paths {
        if path.exists() {
            return load_file(path).map(Some);
        }
    }
    Ok(None)
}

fn load_file(path: &Path) -> Result<Config, String> {
    let s = std::fs::read_to_string(path)
        .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
    toml::from_str(&s).map_err(|e| format!("Invalid config {}: {}", path.display(), e))
}

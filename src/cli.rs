//! CLI parsing and orchestration. Parses args, loads config, runs assembly -> EPUB.
//! Maps errors to exit codes.

use crate::assemble::{assemble, finalize, AssembleError, AssembleOptions, DEFAULT_LANGUAGE};
use crate::catalog::BookHandle;
use crate::config::{self, Config};
use crate::logging;
use crate::retry::{RetryPolicy, DEFAULT_BACKOFF, DEFAULT_RETRIES};
use crate::source::api::{LibApi, DEFAULT_API_BASE};
use crate::source::webdriver::DEFAULT_WEBDRIVER_URL;
use crate::source::{
    ApiSource, BrowserSource, ChapterSource, PoliteClient, SourceError, WebDriverSession,
};
use clap::{ArgAction, Parser};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_DELAY_SECS: u64 = 1;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const SITE_BOOK_URL: &str = "https://ranobelib.me/ru/book";

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Source(#[from] SourceError),

    #[error("{0}")]
    Assemble(#[from] AssembleError),
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) => 1,
            CliRunError::Source(_) | CliRunError::Assemble(AssembleError::Catalog(_)) => 2,
            CliRunError::Assemble(AssembleError::Package(_)) => 3,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "ranobescrape")]
#[command(about = "Download a RanobeLIB novel and write it as EPUB")]
#[command(
    after_help = "Config file keys (output_dir, user_agent, request_delay_secs, timeout_secs, retry_count, retry_backoff_secs, api_base, language, webdriver_url, log_level) are read from ./ranobescrape.toml or <config dir>/ranobescrape/config.toml. CLI flags override config."
)]
pub struct Args {
    /// Book URL (https://ranobelib.me/ru/book/12345--slug) or handle (12345--slug).
    pub url: String,

    /// Chapter to start from (1-based position in the chapter list).
    #[arg(short = 'f', long = "from")]
    pub from: Option<usize>,

    /// Number of chapters to include.
    #[arg(short = 'n', long = "num")]
    pub num: Option<usize>,

    /// Output path. Default: ./{sanitized-title}.epub
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Read the rendered reader pages through a WebDriver browser instead of the API.
    #[arg(long)]
    pub browser: bool,

    /// WebDriver server for --browser (overrides config; default http://localhost:9515).
    #[arg(long)]
    pub webdriver: Option<String>,

    /// HTTP User-Agent (overrides config).
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Delay between requests in seconds (overrides config; default 1).
    #[arg(long)]
    pub delay: Option<u64>,

    /// Request timeout in seconds (overrides config; default 30).
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Errors only.
    #[arg(short, long)]
    pub quiet: bool,

    /// More log output (-v debug, -vv trace). Also prints the error chain on failure.
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

/// Make a title safe to use as a file name. Letters of any script are kept.
fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| {
            !c.is_control()
                && !matches!(*c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|')
        })
        .collect();
    let s = cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| c == '.' || c == ' ')
        .to_string();
    if s.is_empty() {
        "book".to_string()
    } else {
        s
    }
}

/// Ensure output path parent exists.
fn validate_output_path(path: &Path) -> Result<(), CliRunError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(CliRunError::InvalidInput(format!(
                "Cannot write output: {}: parent directory does not exist.",
                path.display()
            )));
        }
    }
    Ok(())
}

/// Page the browser opens first: the given URL, or the book page for a bare handle.
fn browser_start_url(input: &str, handle: Option<&BookHandle>) -> String {
    let input = input.trim();
    match handle {
        Some(h) if !input.starts_with("http://") && !input.starts_with("https://") => {
            format!("{}/{}", SITE_BOOK_URL, h)
        }
        _ => input.to_string(),
    }
}

/// Settings after merging flags over config over defaults.
#[derive(Debug)]
struct Settings {
    output_dir: PathBuf,
    user_agent: Option<String>,
    delay_secs: u64,
    timeout_secs: u64,
    retry_count: u32,
    retry_backoff: Duration,
    api_base: String,
    language: String,
    webdriver_url: String,
}

impl Settings {
    fn merge(args: &Args, config: Option<&Config>) -> Self {
        Self {
            output_dir: config
                .and_then(|c| c.output_dir.clone())
                .unwrap_or_else(|| PathBuf::from(".")),
            user_agent: args
                .user_agent
                .clone()
                .or_else(|| config.and_then(|c| c.user_agent.clone())),
            delay_secs: args
                .delay
                .or_else(|| config.and_then(|c| c.request_delay_secs))
                .unwrap_or(DEFAULT_DELAY_SECS),
            timeout_secs: args
                .timeout
                .or_else(|| config.and_then(|c| c.timeout_secs))
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
            retry_count: config
                .and_then(|c| c.retry_count)
                .unwrap_or(DEFAULT_RETRIES)
                .max(1),
            retry_backoff: config
                .and_then(|c| c.retry_backoff_secs)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_BACKOFF),
            api_base: config
                .and_then(|c| c.api_base.clone())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            language: config
                .and_then(|c| c.language.clone())
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            webdriver_url: args
                .webdriver
                .clone()
                .or_else(|| config.and_then(|c| c.webdriver_url.clone()))
                .unwrap_or_else(|| DEFAULT_WEBDRIVER_URL.to_string()),
        }
    }
}

/// Entry point for the CLI. Returns Ok(()) on success; Err with exit code and message on failure.
pub fn run(args: &Args) -> Result<(), CliRunError> {
    let config = config::load_config().map_err(CliRunError::InvalidInput)?;
    let directive = logging::directive(
        args.quiet,
        args.verbose,
        config.as_ref().and_then(|c| c.log_level.as_deref()),
    );
    let filter = logging::filter(&directive).map_err(CliRunError::InvalidInput)?;
    tracing::subscriber::with_default(logging::subscriber(filter), || {
        run_with_config(args, config.as_ref())
    })
}

fn run_with_config(args: &Args, config: Option<&Config>) -> Result<(), CliRunError> {
    let settings = Settings::merge(args, config);
    let handle = BookHandle::parse(&args.url);

    let mut builder = PoliteClient::builder()
        .delay_secs(settings.delay_secs)
        .timeout_secs(settings.timeout_secs);
    if let Some(ua) = settings.user_agent.clone() {
        builder = builder.user_agent(ua);
    }
    let client = builder
        .build()
        .map_err(|e| CliRunError::InvalidInput(format!("Failed to create HTTP client: {}", e)))?;
    let retry = RetryPolicy::new(settings.retry_count, settings.retry_backoff);

    let mut source: Box<dyn ChapterSource> = if args.browser {
        let handle = handle.ok();
        let identifier = handle
            .as_ref()
            .map(|h| h.id().to_string())
            .unwrap_or_else(|| "default".to_string());
        let start_url = browser_start_url(&args.url, handle.as_ref());
        tracing::info!("Starting browser session at {}", settings.webdriver_url);
        let session = WebDriverSession::start(&settings.webdriver_url, settings.timeout_secs)?;
        Box::new(BrowserSource::new(session, client, retry, start_url, identifier))
    } else {
        let handle = handle.map_err(|e| CliRunError::InvalidInput(e.to_string()))?;
        Box::new(ApiSource::new(
            client,
            LibApi::new(&settings.api_base, handle),
            retry,
        ))
    };

    let progress_cb = |done: usize, total: usize| {
        if total > 0 {
            tracing::debug!("Progress: {}/{}", done, total);
        } else {
            tracing::debug!("Progress: {}", done);
        }
    };
    let progress: Option<&dyn Fn(usize, usize)> = if args.quiet {
        None
    } else {
        Some(&progress_cb)
    };
    let options = AssembleOptions {
        start_chapter: args.from,
        limit: args.num,
        language: settings.language.clone(),
        progress,
    };
    let draft = assemble(source.as_mut(), &options)?;

    let output_path = match &args.output {
        Some(p) => p.clone(),
        None => settings
            .output_dir
            .join(format!("{}.epub", sanitize_title(draft.title()))),
    };
    validate_output_path(&output_path)?;
    finalize(draft, &output_path)?;

    if !args.quiet {
        eprintln!("Wrote {}", output_path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epub::EpubError;

    #[test]
    fn sanitize_title_empty() {
        assert_eq!(sanitize_title(""), "book");
        assert_eq!(sanitize_title(" ?* "), "book");
    }

    #[test]
    fn sanitize_title_keeps_cyrillic() {
        assert_eq!(sanitize_title("Повелитель тайн"), "Повелитель тайн");
    }

    #[test]
    fn sanitize_title_removes_path_characters() {
        assert_eq!(sanitize_title("Re: Zero / Том 1?"), "Re Zero Том 1");
        assert_eq!(sanitize_title("..hidden.."), "hidden");
    }

    #[test]
    fn default_output_path_uses_output_dir_and_sanitized_title() {
        let output_dir = PathBuf::from("out");
        let path = output_dir.join(format!("{}.epub", sanitize_title("My Book")));
        assert_eq!(path, PathBuf::from("out/My Book.epub"));
    }

    #[test]
    fn parse_args_short_flags() {
        let args = Args::try_parse_from([
            "ranobescrape",
            "https://ranobelib.me/ru/book/1--a",
            "-f",
            "3",
            "-n",
            "10",
            "-vv",
        ])
        .unwrap();
        assert_eq!(args.from, Some(3));
        assert_eq!(args.num, Some(10));
        assert_eq!(args.verbose, 2);
        assert!(!args.browser);
    }

    #[test]
    fn parse_args_rejects_negative_count() {
        assert!(Args::try_parse_from(["ranobescrape", "1--a", "-n", "-1"]).is_err());
    }

    #[test]
    fn flags_override_config() {
        let args = Args::try_parse_from(["ranobescrape", "1--a", "--delay", "5"]).unwrap();
        let config = Config {
            request_delay_secs: Some(2),
            timeout_secs: Some(9),
            retry_count: Some(0),
            language: Some("en".to_string()),
            ..Config::default()
        };
        let settings = Settings::merge(&args, Some(&config));
        assert_eq!(settings.delay_secs, 5);
        assert_eq!(settings.timeout_secs, 9);
        assert_eq!(settings.retry_count, 1);
        assert_eq!(settings.retry_backoff, DEFAULT_BACKOFF);
        assert_eq!(settings.language, "en");
        assert_eq!(settings.api_base, DEFAULT_API_BASE);
        assert_eq!(settings.webdriver_url, DEFAULT_WEBDRIVER_URL);
    }

    #[test]
    fn defaults_without_config() {
        let args = Args::try_parse_from(["ranobescrape", "1--a"]).unwrap();
        let settings = Settings::merge(&args, None);
        assert_eq!(settings.delay_secs, DEFAULT_DELAY_SECS);
        assert_eq!(settings.retry_count, DEFAULT_RETRIES);
        assert_eq!(settings.language, "ru");
        assert_eq!(settings.output_dir, PathBuf::from("."));
    }

    #[test]
    fn browser_start_url_from_handle_or_url() {
        let handle = BookHandle::parse("12--slug").unwrap();
        assert_eq!(
            browser_start_url("12--slug", Some(&handle)),
            "https://ranobelib.me/ru/book/12--slug"
        );
        assert_eq!(
            browser_start_url("https://ranobelib.me/ru/book/12--slug?section=info", Some(&handle)),
            "https://ranobelib.me/ru/book/12--slug?section=info"
        );
    }

    #[test]
    fn validate_output_path_parent_exists() {
        let path = std::env::temp_dir().join("ranobescrape_cli_test_output.epub");
        assert!(validate_output_path(&path).is_ok());
    }

    #[test]
    fn validate_output_path_parent_missing() {
        let path = PathBuf::from("/nonexistent_dir_ranobescrape_xyz/output.epub");
        let result = validate_output_path(&path);
        assert!(result.is_err());
        if let Err(CliRunError::InvalidInput(msg)) = result {
            assert!(msg.contains("parent directory does not exist"));
        }
    }

    #[test]
    fn cli_run_error_exit_codes() {
        assert_eq!(CliRunError::InvalidInput("x".into()).exit_code(), 1);
        assert_eq!(
            CliRunError::Source(SourceError::ElementNotFound {
                locator: "//h1".into()
            })
            .exit_code(),
            2
        );
        assert_eq!(
            CliRunError::Assemble(AssembleError::Catalog(SourceError::CatalogUnavailable {
                handle: "1--a".into(),
                reason: "HTTP 500".into()
            }))
            .exit_code(),
            2
        );
        assert_eq!(
            CliRunError::Assemble(AssembleError::Package(EpubError::NoChapters)).exit_code(),
            3
        );
    }
}

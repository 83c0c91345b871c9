//! Shared error type for the API and browser sources.

use thiserror::Error;

/// Retrieval error. Only `CatalogUnavailable` ends a run; the rest cost one chapter at most.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Expected a book URL like https://ranobelib.me/ru/book/12345--slug or a handle like 12345--slug, got '{input}'")]
    InvalidHandle { input: String },

    // HTTP and network
    #[error("Network error: could not reach {url}: {source}")]
    Network { url: String, source: reqwest::Error },

    #[error("HTTP {status} when fetching: {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Invalid JSON from {url}: {source}")]
    Json {
        url: String,
        source: serde_json::Error,
    },

    #[error("Chapter list for '{handle}' is unavailable: {reason}")]
    CatalogUnavailable { handle: String, reason: String },

    // Browser automation
    #[error("WebDriver command '{command}' failed: {message}")]
    WebDriver { command: String, message: String },

    #[error("Page element not found: {locator}")]
    ElementNotFound { locator: String },

    #[error("Could not advance past {url}: the page did not change")]
    Navigation { url: String },
}

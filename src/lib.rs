//! ranobescrape: download RanobeLIB novels through the site's JSON API (or its rendered
//! reader pages) and write them as EPUB.

pub mod assemble;
pub mod book;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod content;
pub mod dedup;
pub mod epub;
pub mod logging;
pub mod model;
pub mod render;
pub mod retry;
pub mod source;

// Re-exports for CLI and consumers.
pub use assemble::{assemble, finalize, AssembleError, AssembleOptions};
pub use book::BookDraft;
pub use catalog::{select_range, BookHandle};
pub use epub::{write_epub, EpubError};
pub use retry::RetryPolicy;
pub use source::{
    ApiSource, BrowserSession, BrowserSource, ChapterSource, PoliteClient, PoliteClientBuilder,
    SourceError, Transport, WebDriverSession,
};

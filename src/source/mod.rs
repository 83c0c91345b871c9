//! Chapter sources: the JSON API and the legacy rendered pages driven through a browser.
//!
//! Both sit behind [ChapterSource] so the assembly loop does not care where chapters come
//! from. Network access goes through [Transport].

mod client;
mod error;

pub mod api;
pub mod browser;
pub mod webdriver;

pub use api::ApiSource;
pub use browser::{BrowserSession, BrowserSource, ElementHandle};
pub use client::{PoliteClient, PoliteClientBuilder};
pub use error::SourceError;
pub use webdriver::WebDriverSession;

use crate::model::{BookMeta, Chapter};

/// Status and body of one HTTP GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Blocking HTTP GET.
pub trait Transport {
    fn get(&mut self, url: &str) -> Result<HttpResponse, SourceError>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn get(&mut self, url: &str) -> Result<HttpResponse, SourceError> {
        (**self).get(url)
    }
}

/// Where chapters come from. Calls happen in order: `metadata`, `select`, then
/// `next_chapter` until it returns `None`; `close` is called on every exit path.
pub trait ChapterSource {
    /// Title, identifier and cover. Best effort: falls back instead of failing.
    fn metadata(&mut self) -> BookMeta;

    /// Prepare the working range. Returns the number of chapters when known.
    /// An error here is fatal for the run.
    fn select(
        &mut self,
        start_chapter: Option<usize>,
        limit: Option<usize>,
    ) -> Result<Option<usize>, SourceError>;

    /// Fetch and parse the next chapter; `None` once there are no further chapters.
    fn next_chapter(&mut self) -> Option<Result<Chapter, SourceError>>;

    /// Release held resources. Must be safe to call more than once.
    fn close(&mut self) {}
}

/// Download an image; `Ok(None)` for a non-success status or an empty body.
pub(crate) fn fetch_bytes<T: Transport>(
    transport: &mut T,
    url: &str,
) -> Result<Option<Vec<u8>>, SourceError> {
    let response = transport.get(url)?;
    if !response.is_success() {
        tracing::debug!("HTTP {} when fetching {}", response.status, url);
        return Ok(None);
    }
    Ok(Some(response.body).filter(|b| !b.is_empty()))
}

//! JSON API source: book metadata, the chapter catalog and chapter payloads.
//!
//! Every endpoint wraps its result as `{"data": ...}`. A non-success status or an empty
//! `data` counts as "no result" and is retried like a fault.

use super::{fetch_bytes, ChapterSource, SourceError, Transport};
use crate::catalog::{select_range, BookHandle};
use crate::model::{BookMeta, Chapter, ChapterInfo, ChapterPayload, Cover, Manga};
use crate::retry::{RetryPolicy, Sleeper, ThreadSleeper};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::VecDeque;

/// Default API root.
pub const DEFAULT_API_BASE: &str = "https://api.lib.social/api";

/// Endpoint URLs for one book.
#[derive(Debug, Clone)]
pub struct LibApi {
    base: String,
    handle: BookHandle,
}

impl LibApi {
    pub fn new(base: &str, handle: BookHandle) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            handle,
        }
    }

    pub fn handle(&self) -> &BookHandle {
        &self.handle
    }

    pub fn manga_url(&self) -> String {
        format!("{}/manga/{}", self.base, self.handle)
    }

    pub fn chapters_url(&self) -> String {
        format!("{}/chapters", self.manga_url())
    }

    pub fn chapter_url(&self, chapter: &ChapterInfo) -> String {
        let base = format!("{}/chapter", self.manga_url());
        match Url::parse(&base) {
            Ok(mut url) => {
                url.query_pairs_mut()
                    .append_pair("number", &chapter.number)
                    .append_pair("volume", &chapter.volume);
                url.to_string()
            }
            Err(_) => format!(
                "{}?number={}&volume={}",
                base, chapter.number, chapter.volume
            ),
        }
    }
}

/// GET `url` and decode its `data` field. `Ok(None)` for a non-success status, a missing
/// `data` field, or an empty/null one.
pub fn fetch_data<T, D>(transport: &mut T, url: &str) -> Result<Option<D>, SourceError>
where
    T: Transport,
    D: DeserializeOwned,
{
    let response = transport.get(url)?;
    if !response.is_success() {
        tracing::debug!("HTTP {} when fetching {}", response.status, url);
        return Ok(None);
    }
    let json = |source| SourceError::Json {
        url: url.to_string(),
        source,
    };
    let mut envelope: Value = serde_json::from_slice(&response.body).map_err(json)?;
    let data = match envelope.get_mut("data").map(Value::take) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Array(a)) if a.is_empty() => return Ok(None),
        Some(Value::Object(o)) if o.is_empty() => return Ok(None),
        Some(data) => data,
    };
    serde_json::from_value(data).map(Some).map_err(json)
}

/// Chapters from the JSON API, fetched one at a time in catalog order.
pub struct ApiSource<T, S = ThreadSleeper> {
    transport: T,
    api: LibApi,
    retry: RetryPolicy<S>,
    pending: VecDeque<ChapterInfo>,
}

impl<T: Transport, S: Sleeper> ApiSource<T, S> {
    pub fn new(transport: T, api: LibApi, retry: RetryPolicy<S>) -> Self {
        Self {
            transport,
            api,
            retry,
            pending: VecDeque::new(),
        }
    }

    /// Ordered chapter list. Unavailable after retries is an error.
    pub fn fetch_catalog(&mut self) -> Result<Vec<ChapterInfo>, SourceError> {
        let url = self.api.chapters_url();
        let transport = &mut self.transport;
        let result = self.retry.run("fetch catalog", || {
            fetch_data::<_, Vec<ChapterInfo>>(transport, &url)
        });
        let unavailable = |reason: String| SourceError::CatalogUnavailable {
            handle: self.api.handle().to_string(),
            reason,
        };
        match result {
            Ok(Some(catalog)) => Ok(catalog),
            Ok(None) => Err(unavailable("no chapters returned".to_string())),
            Err(e) => Err(unavailable(e.to_string())),
        }
    }

    pub fn fetch_manga(&mut self) -> Result<Option<Manga>, SourceError> {
        let url = self.api.manga_url();
        let transport = &mut self.transport;
        self.retry
            .run("fetch manga info", || fetch_data(transport, &url))
    }

    pub fn fetch_chapter(&mut self, info: &ChapterInfo) -> Result<Option<Chapter>, SourceError> {
        let url = self.api.chapter_url(info);
        let transport = &mut self.transport;
        let payload: Option<ChapterPayload> = self
            .retry
            .run("fetch chapter", || fetch_data(transport, &url))?;
        Ok(payload.map(Chapter::from))
    }

    fn fetch_cover(&mut self, url: &str) -> Option<Cover> {
        let transport = &mut self.transport;
        match self.retry.run("fetch cover", || fetch_bytes(transport, url)) {
            Ok(Some(data)) => Some(Cover::from_bytes(data)),
            Ok(None) => {
                tracing::warn!("Cover image could not be fetched: {}", url);
                None
            }
            Err(e) => {
                tracing::warn!("Cover image could not be fetched: {}", e);
                None
            }
        }
    }
}

impl<T: Transport, S: Sleeper> ChapterSource for ApiSource<T, S> {
    fn metadata(&mut self) -> BookMeta {
        let manga = match self.fetch_manga() {
            Ok(Some(manga)) => Some(manga),
            Ok(None) => {
                tracing::warn!("Book info unavailable for '{}'", self.api.handle());
                None
            }
            Err(e) => {
                tracing::warn!("Book info unavailable for '{}': {}", self.api.handle(), e);
                None
            }
        };
        let title = manga
            .as_ref()
            .and_then(Manga::title)
            .unwrap_or_else(|| self.api.handle().to_string());
        let cover_url = manga
            .as_ref()
            .and_then(|m| m.cover_url().map(String::from));
        let cover = cover_url.and_then(|url| self.fetch_cover(&url));
        BookMeta {
            title,
            identifier: self.api.handle().id().to_string(),
            cover,
        }
    }

    fn select(
        &mut self,
        start_chapter: Option<usize>,
        limit: Option<usize>,
    ) -> Result<Option<usize>, SourceError> {
        let catalog = self.fetch_catalog()?;
        tracing::info!("Catalog has {} chapters", catalog.len());
        self.pending = select_range(&catalog, start_chapter, limit).into();
        Ok(Some(self.pending.len()))
    }

    fn next_chapter(&mut self) -> Option<Result<Chapter, SourceError>> {
        let info = self.pending.pop_front()?;
        Some(match self.fetch_chapter(&info) {
            Ok(Some(chapter)) => Ok(chapter),
            Ok(None) => Err(SourceError::HttpStatus {
                status: 404,
                url: self.api.chapter_url(&info),
            }),
            Err(e) => Err(e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::tests::RecordingSleeper;
    use crate::source::tests::FakeTransport;
    use std::time::Duration;

    const BASE: &str = "https://api.test/api";

    fn api() -> LibApi {
        LibApi::new(BASE, BookHandle::parse("7--slug").unwrap())
    }

    fn source<'a>(
        transport: &'a mut FakeTransport,
        sleeper: &'a RecordingSleeper,
    ) -> ApiSource<&'a mut FakeTransport, &'a RecordingSleeper> {
        ApiSource::new(
            transport,
            api(),
            RetryPolicy::with_sleeper(3, Duration::from_secs(10), sleeper),
        )
    }

    fn info(volume: &str, number: &str) -> ChapterInfo {
        ChapterInfo {
            name: String::new(),
            volume: volume.to_string(),
            number: number.to_string(),
            branch_ids: Vec::new(),
        }
    }

    #[test]
    fn endpoint_urls() {
        let api = LibApi::new("https://api.test/api/", BookHandle::parse("7--slug").unwrap());
        assert_eq!(api.manga_url(), "https://api.test/api/manga/7--slug");
        assert_eq!(api.chapters_url(), "https://api.test/api/manga/7--slug/chapters");
        assert_eq!(
            api.chapter_url(&info("2", "10.5")),
            "https://api.test/api/manga/7--slug/chapter?number=10.5&volume=2"
        );
    }

    #[test]
    fn fetch_data_unwraps_envelope() -> Result<(), SourceError> {
        let mut transport = FakeTransport::default();
        transport.respond("https://x/a", 200, r#"{"data":[1,2]}"#);
        transport.respond("https://x/empty", 200, r#"{"data":[]}"#);
        transport.respond("https://x/none", 200, r#"{"meta":{}}"#);
        transport.respond("https://x/err", 503, "busy");
        assert_eq!(fetch_data::<_, Vec<u8>>(&mut transport, "https://x/a")?, Some(vec![1, 2]));
        assert_eq!(fetch_data::<_, Vec<u8>>(&mut transport, "https://x/empty")?, None);
        assert_eq!(fetch_data::<_, Vec<u8>>(&mut transport, "https://x/none")?, None);
        assert_eq!(fetch_data::<_, Vec<u8>>(&mut transport, "https://x/err")?, None);
        Ok(())
    }

    #[test]
    fn fetch_data_reports_bad_json() {
        let mut transport = FakeTransport::default();
        transport.respond("https://x/bad", 200, "<html>");
        let result = fetch_data::<_, Vec<u8>>(&mut transport, "https://x/bad");
        assert!(matches!(result, Err(SourceError::Json { .. })));
    }

    #[test]
    fn catalog_is_fetched_in_server_order() -> Result<(), SourceError> {
        let mut transport = FakeTransport::default();
        transport.respond(
            &api().chapters_url(),
            200,
            r#"{"data":[
                {"name":"Б","volume":"1","number":"2","branches":[]},
                {"name":"А","volume":"1","number":"1","branches":[{"branch_id":3}]}
            ]}"#,
        );
        let sleeper = RecordingSleeper::default();
        let catalog = source(&mut transport, &sleeper).fetch_catalog()?;
        let numbers: Vec<&str> = catalog.iter().map(|c| c.number.as_str()).collect();
        assert_eq!(numbers, ["2", "1"]);
        assert_eq!(catalog[1].branch_ids, vec![Some(3)]);
        Ok(())
    }

    #[test]
    fn catalog_unavailable_after_retries() {
        let mut transport = FakeTransport::default();
        transport.respond(&api().chapters_url(), 500, "");
        let sleeper = RecordingSleeper::default();
        let result = source(&mut transport, &sleeper).fetch_catalog();
        assert!(matches!(result, Err(SourceError::CatalogUnavailable { .. })));
        assert_eq!(transport.count(&api().chapters_url()), 3);
        assert_eq!(sleeper.sleeps.borrow().len(), 2);
    }

    #[test]
    fn chapter_is_retried_until_available() -> Result<(), SourceError> {
        let mut transport = FakeTransport::default();
        let url = api().chapter_url(&info("1", "1"));
        transport.respond(&url, 502, "");
        transport.respond(
            &url,
            200,
            r#"{"data":{"name":"Глава","volume":"1","number":"1","likes_count":3,
                "content":{"type":"doc","content":[{"type":"paragraph","content":[{"type":"text","text":"Текст"}]}]}}}"#,
        );
        let sleeper = RecordingSleeper::default();
        let chapter = source(&mut transport, &sleeper)
            .fetch_chapter(&info("1", "1"))?
            .expect("chapter");
        assert_eq!(chapter.name, "Глава");
        assert_eq!(chapter.content.len(), 1);
        assert_eq!(sleeper.sleeps.borrow().len(), 1);
        Ok(())
    }

    #[test]
    fn metadata_falls_back_to_handle() {
        let mut transport = FakeTransport::default();
        let sleeper = RecordingSleeper::default();
        let meta = source(&mut transport, &sleeper).metadata();
        assert_eq!(meta.title, "7--slug");
        assert_eq!(meta.identifier, "7");
        assert!(meta.cover.is_none());
    }

    #[test]
    fn metadata_uses_manga_title_and_cover() {
        let mut transport = FakeTransport::default();
        transport.respond(
            &api().manga_url(),
            200,
            r#"{"data":{"id":7,"name":"Orig","eng_name":"Eng","rus_name":"Рус","cover":{"default":"https://cover/7.png"}}}"#,
        );
        transport.respond("https://cover/7.png", 200, b"\x89PNG\r\n\x1a\n..".to_vec());
        let sleeper = RecordingSleeper::default();
        let meta = source(&mut transport, &sleeper).metadata();
        assert_eq!(meta.title, "Рус");
        assert_eq!(meta.cover.map(|c| c.ext), Some("png"));
    }
}

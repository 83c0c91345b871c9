//! Legacy mode: walk the rendered reader pages through a browser session.
//!
//! The title page gives the book title and cover, its "start reading" control leads to
//! the first chapter, and each chapter page links to the next one until the control
//! reads [END_MARKER].

use super::{fetch_bytes, ChapterSource, SourceError, Transport};
use crate::model::{BookMeta, Chapter, ContentElement, Cover};
use crate::retry::{RetryPolicy, Sleeper, ThreadSleeper};

pub const TITLE_XPATH: &str = "//h1[@class='no_nq']/span";
pub const COVER_XPATH: &str = "//div[@class='cover']/div/img";
pub const START_READING_XPATH: &str = "//div[@class='gq_bq']/a[contains(@class, 'btn')]";
pub const HEADER_XPATH: &str = "//div[@class='jp_m']/h1";
pub const CONTENT_XPATH: &str = "//main[@class='jp_bm']/div[@class='text-content']";
pub const NEXT_XPATH: &str = "//div[@class='qq_ar']/a[last()]/span";
/// Every element inside the content container.
pub const CONTENT_CHILDREN_XPATH: &str = ".//*";
/// Text of the next-chapter control on the last chapter.
pub const END_MARKER: &str = "К Тайтлу";

/// Opaque id of an element in the current page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub String);

/// The browser operations the legacy source needs.
pub trait BrowserSession {
    fn goto(&mut self, url: &str) -> Result<(), SourceError>;

    /// Elements matching `xpath`, searched in the whole page or below `scope`.
    fn find_elements(
        &mut self,
        scope: Option<&ElementHandle>,
        xpath: &str,
    ) -> Result<Vec<ElementHandle>, SourceError>;

    fn click(&mut self, element: &ElementHandle) -> Result<(), SourceError>;

    fn current_url(&mut self) -> Result<String, SourceError>;

    /// Lower-case tag name.
    fn tag_name(&mut self, element: &ElementHandle) -> Result<String, SourceError>;

    /// DOM property `name`, falling back to the attribute of the same name.
    fn attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, SourceError>;

    fn quit(&mut self) -> Result<(), SourceError>;
}

impl<B: BrowserSession + ?Sized> BrowserSession for &mut B {
    fn goto(&mut self, url: &str) -> Result<(), SourceError> {
        (**self).goto(url)
    }

    fn find_elements(
        &mut self,
        scope: Option<&ElementHandle>,
        xpath: &str,
    ) -> Result<Vec<ElementHandle>, SourceError> {
        (**self).find_elements(scope, xpath)
    }

    fn click(&mut self, element: &ElementHandle) -> Result<(), SourceError> {
        (**self).click(element)
    }

    fn current_url(&mut self) -> Result<String, SourceError> {
        (**self).current_url()
    }

    fn tag_name(&mut self, element: &ElementHandle) -> Result<String, SourceError> {
        (**self).tag_name(element)
    }

    fn attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, SourceError> {
        (**self).attribute(element, name)
    }

    fn quit(&mut self) -> Result<(), SourceError> {
        (**self).quit()
    }
}

/// Chapters read from the rendered pages, in next-link order.
pub struct BrowserSource<B, T, S = ThreadSleeper> {
    session: B,
    transport: T,
    retry: RetryPolicy<S>,
    start_url: String,
    identifier: String,
    on_title_page: bool,
    chapters_read: usize,
    finished: bool,
    closed: bool,
}

impl<B: BrowserSession, T: Transport, S: Sleeper> BrowserSource<B, T, S> {
    /// `retry` doubles as the element poller: lookups are repeated until the element shows up.
    pub fn new(
        session: B,
        transport: T,
        retry: RetryPolicy<S>,
        start_url: impl Into<String>,
        identifier: impl Into<String>,
    ) -> Self {
        Self {
            session,
            transport,
            retry,
            start_url: start_url.into(),
            identifier: identifier.into(),
            on_title_page: false,
            chapters_read: 0,
            finished: false,
            closed: false,
        }
    }

    pub fn session(&self) -> &B {
        &self.session
    }

    fn open_title_page(&mut self) -> Result<(), SourceError> {
        if !self.on_title_page {
            self.session.goto(&self.start_url)?;
            self.on_title_page = true;
        }
        Ok(())
    }

    /// First element matching `xpath`, polled until present.
    fn wait_for(
        &mut self,
        scope: Option<&ElementHandle>,
        xpath: &str,
    ) -> Result<ElementHandle, SourceError> {
        let session = &mut self.session;
        let found = self.retry.run(xpath, || {
            session
                .find_elements(scope, xpath)
                .map(|elements| elements.into_iter().next())
        })?;
        found.ok_or_else(|| SourceError::ElementNotFound {
            locator: xpath.to_string(),
        })
    }

    fn inner_html(&mut self, element: &ElementHandle) -> Result<String, SourceError> {
        Ok(self
            .session
            .attribute(element, "innerHTML")?
            .unwrap_or_default())
    }

    fn text_content(&mut self, element: &ElementHandle) -> Result<String, SourceError> {
        Ok(self
            .session
            .attribute(element, "textContent")?
            .unwrap_or_default()
            .trim()
            .to_string())
    }

    fn read_title(&mut self) -> Result<String, SourceError> {
        let title = self.wait_for(None, TITLE_XPATH)?;
        self.text_content(&title)
    }

    fn read_cover(&mut self) -> Result<Option<Cover>, SourceError> {
        let image = self.wait_for(None, COVER_XPATH)?;
        let Some(src) = self.session.attribute(&image, "src")? else {
            return Ok(None);
        };
        let transport = &mut self.transport;
        let data = self.retry.run("fetch cover", || fetch_bytes(transport, &src))?;
        Ok(data.map(Cover::from_bytes))
    }

    fn read_chapter(&mut self) -> Result<Chapter, SourceError> {
        let header = self.wait_for(None, HEADER_XPATH)?;
        let name = self.text_content(&header)?;
        let container = self.wait_for(None, CONTENT_XPATH)?;
        let mut content = Vec::new();
        for element in self
            .session
            .find_elements(Some(&container), CONTENT_CHILDREN_XPATH)?
        {
            match self.session.tag_name(&element)?.to_ascii_lowercase().as_str() {
                "p" => content.push(ContentElement::markup(self.inner_html(&element)?)),
                "img" => match self.session.attribute(&element, "src")? {
                    Some(src) => content.push(ContentElement::image_link(src)),
                    None => tracing::debug!("Image without src in '{}'", name),
                },
                _ => {}
            }
        }
        self.chapters_read += 1;
        Ok(Chapter {
            name,
            volume: String::new(),
            number: self.chapters_read.to_string(),
            likes_count: 0,
            content,
        })
    }

    /// Follow the next-chapter control. `Ok(false)` on the last chapter.
    fn advance(&mut self) -> Result<bool, SourceError> {
        let next = self.wait_for(None, NEXT_XPATH)?;
        if self.inner_html(&next)?.trim() == END_MARKER {
            return Ok(false);
        }
        let before = self.session.current_url()?;
        let session = &mut self.session;
        let moved = self.retry.run("advance to next chapter", || -> Result<_, SourceError> {
            if session.current_url()? != before {
                return Ok(Some(()));
            }
            session.click(&next)?;
            let now = session.current_url()?;
            if now == before {
                tracing::warn!("Failed to advance page, retrying");
                Ok(None)
            } else {
                Ok(Some(()))
            }
        })?;
        moved
            .map(|_| true)
            .ok_or(SourceError::Navigation { url: before })
    }
}

impl<B: BrowserSession, T: Transport, S: Sleeper> ChapterSource for BrowserSource<B, T, S> {
    fn metadata(&mut self) -> BookMeta {
        let title = match self.open_title_page().and_then(|_| self.read_title()) {
            Ok(title) if !title.is_empty() => title,
            Ok(_) => self.start_url.clone(),
            Err(e) => {
                tracing::warn!("Book title unavailable: {}", e);
                self.start_url.clone()
            }
        };
        let cover = match self.read_cover() {
            Ok(cover) => cover,
            Err(e) => {
                tracing::warn!("Cover image could not be fetched: {}", e);
                None
            }
        };
        BookMeta {
            title,
            identifier: self.identifier.clone(),
            cover,
        }
    }

    /// Opens the first chapter. The reader can only start at the beginning, so a start
    /// chapter is ignored.
    fn select(
        &mut self,
        start_chapter: Option<usize>,
        _limit: Option<usize>,
    ) -> Result<Option<usize>, SourceError> {
        if start_chapter.is_some_and(|n| n > 1) {
            tracing::warn!("Browser mode always starts from the first chapter; --from is ignored");
        }
        self.open_title_page()?;
        let start = self.wait_for(None, START_READING_XPATH)?;
        self.session.click(&start)?;
        Ok(None)
    }

    fn next_chapter(&mut self) -> Option<Result<Chapter, SourceError>> {
        if self.finished {
            return None;
        }
        if self.chapters_read > 0 {
            match self.advance() {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!("Reached the last chapter");
                    self.finished = true;
                    return None;
                }
                Err(e) => {
                    tracing::error!("Stopping: {}", e);
                    self.finished = true;
                    return None;
                }
            }
        }
        let result = self.read_chapter();
        if result.is_err() && self.chapters_read == 0 {
            // Nothing to advance from.
            self.finished = true;
        }
        Some(result)
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.session.quit() {
            tracing::warn!("Failed to close the browser session: {}", e);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::retry::tests::RecordingSleeper;
    use crate::source::tests::FakeTransport;
    use std::collections::HashMap;
    use std::time::Duration;

    #[derive(Debug, Default, Clone)]
    pub(crate) struct FakeElement {
        tag: String,
        attrs: HashMap<String, String>,
        children: Vec<String>,
        navigates_to: Option<String>,
    }

    /// Static pages keyed by URL; each page maps XPath locators to element ids.
    #[derive(Debug, Default)]
    pub(crate) struct FakeBrowser {
        url: String,
        pages: HashMap<String, HashMap<String, Vec<String>>>,
        elements: HashMap<String, FakeElement>,
        pub(crate) quits: usize,
        next_id: usize,
    }

    impl FakeBrowser {
        fn element(&mut self, tag: &str, attrs: &[(&str, &str)]) -> String {
            self.next_id += 1;
            let id = format!("e{}", self.next_id);
            self.elements.insert(
                id.clone(),
                FakeElement {
                    tag: tag.to_string(),
                    attrs: attrs
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                    ..FakeElement::default()
                },
            );
            id
        }

        fn place(&mut self, url: &str, xpath: &str, id: String) {
            self.pages
                .entry(url.to_string())
                .or_default()
                .entry(xpath.to_string())
                .or_default()
                .push(id);
        }

        pub(crate) fn title_page(&mut self, url: &str, title: &str, first: &str) {
            let t = self.element("span", &[("innerHTML", title), ("textContent", title)]);
            self.place(url, TITLE_XPATH, t);
            let c = self.element("img", &[("src", "https://cover/c.jpg")]);
            self.place(url, COVER_XPATH, c);
            let s = self.element("a", &[]);
            if let Some(e) = self.elements.get_mut(&s) {
                e.navigates_to = Some(first.to_string());
            }
            self.place(url, START_READING_XPATH, s);
        }

        /// Chapter page with paragraphs; `next` is the following page or `None` for the last.
        pub(crate) fn chapter_page(
            &mut self,
            url: &str,
            header: &str,
            paragraphs: &[&str],
            next: Option<&str>,
        ) {
            let h = self.element("h1", &[("innerHTML", header), ("textContent", header)]);
            self.place(url, HEADER_XPATH, h);
            let container = self.element("div", &[]);
            let mut children = Vec::new();
            for p in paragraphs {
                children.push(self.element("p", &[("innerHTML", *p)]));
            }
            children.push(self.element("img", &[("src", "https://img/1.png")]));
            children.push(self.element("span", &[("innerHTML", "ad")]));
            if let Some(e) = self.elements.get_mut(&container) {
                e.children = children;
            }
            self.place(url, CONTENT_XPATH, container);
            let label = if next.is_some() { "Вперёд" } else { END_MARKER };
            let n = self.element("span", &[("innerHTML", label)]);
            if let Some(e) = self.elements.get_mut(&n) {
                e.navigates_to = next.map(String::from);
            }
            self.place(url, NEXT_XPATH, n);
        }
    }

    impl BrowserSession for FakeBrowser {
        fn goto(&mut self, url: &str) -> Result<(), SourceError> {
            self.url = url.to_string();
            Ok(())
        }

        fn find_elements(
            &mut self,
            scope: Option<&ElementHandle>,
            xpath: &str,
        ) -> Result<Vec<ElementHandle>, SourceError> {
            let ids = match scope {
                Some(ElementHandle(id)) => self
                    .elements
                    .get(id)
                    .map(|e| e.children.clone())
                    .unwrap_or_default(),
                None => self
                    .pages
                    .get(&self.url)
                    .and_then(|page| page.get(xpath))
                    .cloned()
                    .unwrap_or_default(),
            };
            Ok(ids.into_iter().map(ElementHandle).collect())
        }

        fn click(&mut self, element: &ElementHandle) -> Result<(), SourceError> {
            if let Some(target) = self
                .elements
                .get(&element.0)
                .and_then(|e| e.navigates_to.clone())
            {
                self.url = target;
            }
            Ok(())
        }

        fn current_url(&mut self) -> Result<String, SourceError> {
            Ok(self.url.clone())
        }

        fn tag_name(&mut self, element: &ElementHandle) -> Result<String, SourceError> {
            Ok(self
                .elements
                .get(&element.0)
                .map(|e| e.tag.clone())
                .unwrap_or_default())
        }

        fn attribute(
            &mut self,
            element: &ElementHandle,
            name: &str,
        ) -> Result<Option<String>, SourceError> {
            Ok(self
                .elements
                .get(&element.0)
                .and_then(|e| e.attrs.get(name).cloned()))
        }

        fn quit(&mut self) -> Result<(), SourceError> {
            self.quits += 1;
            Ok(())
        }
    }

    pub(crate) fn three_chapter_site() -> FakeBrowser {
        let mut browser = FakeBrowser::default();
        browser.title_page("https://site/book/1--a", "Книга", "https://site/read/1");
        browser.chapter_page("https://site/read/1", "Глава 1", &["Раз"], Some("https://site/read/2"));
        browser.chapter_page("https://site/read/2", "Глава 2", &["Два"], Some("https://site/read/3"));
        browser.chapter_page("https://site/read/3", "Глава 3", &["Три"], None);
        browser
    }

    fn source<'a>(
        browser: &'a mut FakeBrowser,
        transport: &'a mut FakeTransport,
        sleeper: &'a RecordingSleeper,
    ) -> BrowserSource<&'a mut FakeBrowser, &'a mut FakeTransport, &'a RecordingSleeper> {
        BrowserSource::new(
            browser,
            transport,
            RetryPolicy::with_sleeper(3, Duration::from_millis(100), sleeper),
            "https://site/book/1--a",
            "1",
        )
    }

    #[test]
    fn walks_chapters_until_end_marker() -> Result<(), SourceError> {
        let mut browser = three_chapter_site();
        let mut transport = FakeTransport::default();
        transport.respond("https://cover/c.jpg", 200, vec![0xFF, 0xD8, 0xFF]);
        let sleeper = RecordingSleeper::default();
        let mut src = source(&mut browser, &mut transport, &sleeper);

        let meta = src.metadata();
        assert_eq!(meta.title, "Книга");
        assert_eq!(meta.identifier, "1");
        assert_eq!(meta.cover.map(|c| c.ext), Some("jpg"));

        assert_eq!(src.select(None, None)?, None);
        let mut names = Vec::new();
        while let Some(chapter) = src.next_chapter() {
            let chapter = chapter?;
            assert_eq!(chapter.content.len(), 2);
            names.push(chapter.name);
        }
        assert_eq!(names, ["Глава 1", "Глава 2", "Глава 3"]);
        assert!(src.next_chapter().is_none());
        Ok(())
    }

    #[test]
    fn chapter_content_keeps_paragraphs_and_images_only() -> Result<(), SourceError> {
        let mut browser = three_chapter_site();
        let mut transport = FakeTransport::default();
        let sleeper = RecordingSleeper::default();
        let mut src = source(&mut browser, &mut transport, &sleeper);
        src.select(None, None)?;
        let chapter = src.next_chapter().expect("first chapter")?;
        assert_eq!(
            chapter.content,
            vec![
                ContentElement::markup("Раз"),
                ContentElement::image_link("https://img/1.png"),
            ]
        );
        assert_eq!(chapter.display_title(), "Глава 1");
        Ok(())
    }

    #[test]
    fn titles_use_text_not_markup() -> Result<(), SourceError> {
        let mut browser = three_chapter_site();
        for (url, xpath) in [
            ("https://site/book/1--a", TITLE_XPATH),
            ("https://site/read/1", HEADER_XPATH),
        ] {
            let id = browser.pages[url][xpath][0].clone();
            if let Some(e) = browser.elements.get_mut(&id) {
                e.attrs.insert("innerHTML".to_string(), "Tom &amp; <i>Jerry</i>".to_string());
                e.attrs.insert("textContent".to_string(), " Tom & Jerry ".to_string());
            }
        }
        let mut transport = FakeTransport::default();
        let sleeper = RecordingSleeper::default();
        let mut src = source(&mut browser, &mut transport, &sleeper);
        assert_eq!(src.metadata().title, "Tom & Jerry");
        src.select(None, None)?;
        let chapter = src.next_chapter().expect("first chapter")?;
        assert_eq!(chapter.name, "Tom & Jerry");
        Ok(())
    }

    #[test]
    fn advance_failure_ends_traversal() -> Result<(), SourceError> {
        let mut browser = three_chapter_site();
        let next = browser.pages["https://site/read/1"][NEXT_XPATH][0].clone();
        if let Some(e) = browser.elements.get_mut(&next) {
            e.navigates_to = None;
        }
        let mut transport = FakeTransport::default();
        let sleeper = RecordingSleeper::default();
        let mut src = source(&mut browser, &mut transport, &sleeper);
        src.select(None, None)?;
        assert!(src.next_chapter().is_some());
        assert!(src.next_chapter().is_none());
        assert!(src.next_chapter().is_none());
        assert_eq!(sleeper.sleeps.borrow().len(), 2);
        Ok(())
    }

    #[test]
    fn missing_title_page_falls_back_to_url() {
        let mut browser = FakeBrowser::default();
        let mut transport = FakeTransport::default();
        let sleeper = RecordingSleeper::default();
        let meta = source(&mut browser, &mut transport, &sleeper).metadata();
        assert_eq!(meta.title, "https://site/book/1--a");
        assert!(meta.cover.is_none());
    }

    #[test]
    fn close_quits_once() {
        let mut browser = FakeBrowser::default();
        let mut transport = FakeTransport::default();
        let sleeper = RecordingSleeper::default();
        {
            let mut src = source(&mut browser, &mut transport, &sleeper);
            src.close();
            src.close();
        }
        assert_eq!(browser.quits, 1);
    }
}

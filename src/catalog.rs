//! Book handles and chapter range selection over a server-ordered catalog.

use crate::model::ChapterInfo;
use crate::source::SourceError;
use reqwest::Url;

/// Limit used when none is given: every remaining chapter.
pub const UNLIMITED: usize = usize::MAX;

/// `<id>--<slug>` identifier of a book, as used in site URLs and API paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookHandle {
    handle: String,
}

impl BookHandle {
    /// Accept a book page URL (path containing `book/<id>--<slug>`, query ignored) or a
    /// bare `<id>--<slug>` handle.
    pub fn parse(input: &str) -> Result<Self, SourceError> {
        let input = input.trim();
        let candidate = match Url::parse(input) {
            Ok(url) => {
                let mut segments = url.path_segments().into_iter().flatten();
                segments
                    .find(|s| *s == "book")
                    .and_then(|_| segments.next())
                    .map(String::from)
            }
            Err(_) => Some(input.to_string()),
        };
        match candidate {
            Some(handle) if is_handle(&handle) => Ok(Self { handle }),
            _ => Err(SourceError::InvalidHandle {
                input: input.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.handle
    }

    /// Numeric book id: the digits before `--`.
    pub fn id(&self) -> &str {
        self.handle
            .split_once("--")
            .map(|(id, _)| id)
            .unwrap_or(&self.handle)
    }
}

impl std::fmt::Display for BookHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.handle)
    }
}

fn is_handle(s: &str) -> bool {
    match s.split_once("--") {
        Some((id, slug)) => {
            !id.is_empty()
                && id.chars().all(|c| c.is_ascii_digit())
                && !slug.is_empty()
                && slug.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-')
        }
        None => false,
    }
}

/// Working subrange of the catalog. `start_chapter` is 1-based; one past the end falls
/// back to the first chapter with a warning. Catalog order is kept as is.
pub fn select_range(
    catalog: &[ChapterInfo],
    start_chapter: Option<usize>,
    limit: Option<usize>,
) -> Vec<ChapterInfo> {
    let mut start = start_chapter.map(|n| n.saturating_sub(1)).unwrap_or(0);
    if start >= catalog.len() && start != 0 {
        tracing::warn!(
            "Start chapter {} is beyond the catalog ({} chapters), starting from the first one",
            start + 1,
            catalog.len()
        );
        start = 0;
    }
    catalog
        .iter()
        .skip(start)
        .take(limit.unwrap_or(UNLIMITED))
        .cloned()
        .collect()
}

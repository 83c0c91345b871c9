//! Book assembly: pull chapters from a [ChapterSource], drop empty and duplicate ones,
//! render the rest into a [BookDraft].

use crate::book::BookDraft;
use crate::dedup::Deduplicator;
use crate::epub::EpubError;
use crate::render::render_body;
use crate::source::{ChapterSource, SourceError};
use std::path::Path;
use thiserror::Error;

/// Default book language.
pub const DEFAULT_LANGUAGE: &str = "ru";

/// Options for an assembly run: range, language and progress callback.
pub struct AssembleOptions<'a> {
    /// 1-based catalog position to start from.
    pub start_chapter: Option<usize>,
    /// Maximum number of committed chapters.
    pub limit: Option<usize>,
    pub language: String,
    /// Called after each chapter with `(done, total)`; `total` is 0 when unknown.
    pub progress: Option<&'a dyn Fn(usize, usize)>,
}

impl Default for AssembleOptions<'_> {
    fn default() -> Self {
        Self {
            start_chapter: None,
            limit: None,
            language: DEFAULT_LANGUAGE.to_string(),
            progress: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum AssembleError {
    /// The chapter range could not be prepared; nothing was assembled.
    #[error("{0}")]
    Catalog(#[source] SourceError),

    /// The draft could not be written.
    #[error("{0}")]
    Package(#[from] EpubError),
}

/// Run the source to completion and return the draft. The source is closed on every path.
pub fn assemble<S: ChapterSource + ?Sized>(
    source: &mut S,
    options: &AssembleOptions<'_>,
) -> Result<BookDraft, AssembleError> {
    let result = assemble_open(source, options);
    source.close();
    result
}

fn assemble_open<S: ChapterSource + ?Sized>(
    source: &mut S,
    options: &AssembleOptions<'_>,
) -> Result<BookDraft, AssembleError> {
    let meta = source.metadata();
    tracing::info!("Assembling '{}'", meta.title);
    let mut draft = BookDraft::new(meta.title, meta.identifier, options.language.as_str());
    if let Some(cover) = meta.cover {
        draft.set_cover(cover);
    }

    let total = source
        .select(options.start_chapter, options.limit)
        .map_err(AssembleError::Catalog)?
        .unwrap_or(0);
    let limit = options.limit.unwrap_or(usize::MAX);

    let mut seen = Deduplicator::new();
    let mut done = 0usize;
    let mut committed = 0usize;
    while committed < limit {
        let Some(next) = source.next_chapter() else {
            break;
        };
        done += 1;
        match next {
            Ok(chapter) => {
                let title = chapter.display_title();
                let body = render_body(&chapter.content);
                if body.trim().is_empty() {
                    tracing::warn!("Dropped chapter '{}': no content", title);
                } else if !seen.register_body(&body) {
                    tracing::warn!("Dropped chapter '{}': duplicate content", title);
                } else {
                    let name = seen.register_name(&title);
                    draft.append_chapter(name, body);
                    committed += 1;
                    tracing::info!("Finished chapter '{}'", title);
                }
            }
            Err(e) => tracing::error!("Failed to fetch chapter {}: {}", done, e),
        }
        if let Some(progress) = options.progress {
            progress(done, total);
        }
    }

    tracing::info!(
        "Assembled {} of {} chapters",
        committed,
        if total > 0 { total } else { done }
    );
    Ok(draft)
}

/// Package the draft as an EPUB at `path`, consuming it.
pub fn finalize(draft: BookDraft, path: &Path) -> Result<(), AssembleError> {
    let chapters = draft.spine().len();
    draft.finish(path)?;
    tracing::info!("Wrote {} chapters to {}", chapters, path.display());
    Ok(())
}

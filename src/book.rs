//! In-memory book draft. Chapters are appended to the spine and the table of contents in
//! one step; the draft is consumed when it is written out.

use crate::epub::{write_epub, EpubError};
use crate::model::Cover;
use std::path::Path;

/// A chapter ready for packaging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedChapter {
    pub title: String,
    pub file_name: String,
    /// Body markup (no document wrapper).
    pub body: String,
}

/// Table of contents entry pointing at a spine chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    pub title: String,
    pub file_name: String,
}

#[derive(Debug, Clone)]
pub struct BookDraft {
    title: String,
    identifier: String,
    language: String,
    cover: Option<Cover>,
    spine: Vec<RenderedChapter>,
    toc: Vec<TocEntry>,
}

impl BookDraft {
    pub fn new(
        title: impl Into<String>,
        identifier: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            identifier: identifier.into(),
            language: language.into(),
            cover: None,
            spine: Vec::new(),
            toc: Vec::new(),
        }
    }

    pub fn set_cover(&mut self, cover: Cover) {
        self.cover = Some(cover);
    }

    /// Append a chapter to the end of the spine and the table of contents. The file name
    /// is assigned from its spine position.
    pub fn append_chapter(&mut self, title: String, body: String) -> &RenderedChapter {
        let file_name = format!("chapter-{}.xhtml", self.spine.len() + 1);
        self.toc.push(TocEntry {
            title: title.clone(),
            file_name: file_name.clone(),
        });
        self.spine.push(RenderedChapter {
            title,
            file_name,
            body,
        });
        &self.spine[self.spine.len() - 1]
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn cover(&self) -> Option<&Cover> {
        self.cover.as_ref()
    }

    pub fn spine(&self) -> &[RenderedChapter] {
        &self.spine
    }

    pub fn table_of_contents(&self) -> &[TocEntry] {
        &self.toc
    }

    /// Serialize to an EPUB file. Consumes the draft.
    pub fn finish(self, path: &Path) -> Result<(), EpubError> {
        write_epub(&self, path)
    }
}

//! Data model for catalog entries, chapters and their normalized content.
//!
//! The API payload shapes (`ChapterInfo`, `ChapterPayload`, `Manga`) deserialize directly
//! from the `data` field of the JSON endpoints. Chapter content is parsed into
//! [ContentElement]s when the [Chapter] is built, not lazily.

use crate::content::{self, ChapterContent};
use serde::Deserialize;

/// Kind of one normalized unit of chapter content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    /// Plain prose run.
    Text,
    /// Prose run given as inline XHTML markup (rendered reader pages).
    Markup,
    /// Image addressed by a resolvable URL.
    ImageLink,
    /// Image addressed by an opaque content id.
    ImageReference,
}

/// One normalized unit of chapter content. Produced by the document parser or the
/// browser source, consumed by chapter rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentElement {
    pub kind: ElementKind,
    pub payload: String,
}

impl ContentElement {
    pub fn text(payload: impl Into<String>) -> Self {
        Self {
            kind: ElementKind::Text,
            payload: payload.into(),
        }
    }

    pub fn markup(payload: impl Into<String>) -> Self {
        Self {
            kind: ElementKind::Markup,
            payload: payload.into(),
        }
    }

    pub fn image_link(url: impl Into<String>) -> Self {
        Self {
            kind: ElementKind::ImageLink,
            payload: url.into(),
        }
    }

    pub fn image_reference(id: impl Into<String>) -> Self {
        Self {
            kind: ElementKind::ImageReference,
            payload: id.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct Branch {
    #[serde(default)]
    branch_id: Option<i64>,
}

/// Catalog entry as the server lists it. Order is the server's; never re-sorted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawChapterInfo")]
pub struct ChapterInfo {
    pub name: String,
    pub volume: String,
    pub number: String,
    pub branch_ids: Vec<Option<i64>>,
}

#[derive(Deserialize)]
struct RawChapterInfo {
    #[serde(default)]
    name: Option<String>,
    volume: String,
    number: String,
    #[serde(default)]
    branches: Vec<Branch>,
}

impl From<RawChapterInfo> for ChapterInfo {
    fn from(raw: RawChapterInfo) -> Self {
        Self {
            name: raw.name.unwrap_or_default(),
            volume: raw.volume,
            number: raw.number,
            branch_ids: raw.branches.into_iter().map(|b| b.branch_id).collect(),
        }
    }
}

/// Shape of `data` returned by the chapter endpoint.
#[derive(Debug, Deserialize)]
pub struct ChapterPayload {
    #[serde(default)]
    pub name: Option<String>,
    pub volume: String,
    pub number: String,
    #[serde(default)]
    pub likes_count: u64,
    pub content: ChapterContent,
}

/// One retrieved chapter with its content already normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub name: String,
    pub volume: String,
    pub number: String,
    pub likes_count: u64,
    pub content: Vec<ContentElement>,
}

impl Chapter {
    /// Title used in the book: the chapter name, or its numbering when the name is blank.
    pub fn display_title(&self) -> String {
        let name = self.name.trim();
        if !name.is_empty() {
            name.to_string()
        } else if self.volume.is_empty() {
            format!("Chapter {}", self.number)
        } else {
            format!("Volume {} Chapter {}", self.volume, self.number)
        }
    }
}

impl From<ChapterPayload> for Chapter {
    fn from(payload: ChapterPayload) -> Self {
        Self {
            name: payload.name.unwrap_or_default(),
            volume: payload.volume,
            number: payload.number,
            likes_count: payload.likes_count,
            content: content::parse(&payload.content),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct CoverLinks {
    #[serde(default)]
    default: Option<String>,
}

/// Book metadata from the manga endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Manga {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub eng_name: Option<String>,
    #[serde(default)]
    pub rus_name: Option<String>,
    #[serde(default)]
    cover: Option<CoverLinks>,
}

impl Manga {
    /// Russian name first, then the original name, then the English one.
    pub fn title(&self) -> Option<String> {
        [self.rus_name.as_deref(), Some(self.name.as_str()), self.eng_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|s| !s.is_empty())
            .map(String::from)
    }

    pub fn cover_url(&self) -> Option<&str> {
        self.cover
            .as_ref()
            .and_then(|c| c.default.as_deref())
            .filter(|s| !s.is_empty())
    }
}

/// Cover image bytes and the file extension detected from them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cover {
    pub data: Vec<u8>,
    pub ext: &'static str,
}

impl Cover {
    /// Detect the image type from its signature. Unknown data is assumed to be JPEG.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let ext = if data.starts_with(b"\x89PNG\r\n\x1a\n") {
            "png"
        } else if data.starts_with(b"GIF8") {
            "gif"
        } else if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            "webp"
        } else {
            "jpg"
        };
        Self { data, ext }
    }

    pub fn media_type(&self) -> &'static str {
        match self.ext {
            "png" => "image/png",
            "gif" => "image/gif",
            "webp" => "image/webp",
            _ => "image/jpeg",
        }
    }
}

/// What a source knows about the book before any chapter is fetched.
#[derive(Debug, Clone)]
pub struct BookMeta {
    pub title: String,
    pub identifier: String,
    pub cover: Option<Cover>,
}

//! EPUB writer. Packages a [BookDraft](crate::book::BookDraft) as EPUB 3 (mimetype,
//! container, OPF, nav, NCX for older readers, optional cover, chapters).

use crate::book::BookDraft;
use crate::model::Cover;
use crate::render::{escape_attr, xml_escape};
use std::io::{Seek, Write};
use std::path::Path;
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const CONTAINER_XML: &[u8] = b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<container version=\"1.0\" xmlns=\"urn:oasis:names:tc:opendocument:xmlns:container\">\n  <rootfiles>\n    <rootfile full-path=\"OEBPS/content.opf\" media-type=\"application/oebps-package+xml\"/>\n  </rootfiles>\n</container>";

const MIMETYPE: &[u8] = b"application/epub+zip";
const OEBPS_PREFIX: &str = "OEBPS/";

/// Errors from the EPUB writer. Any of them means no usable file was produced.
#[derive(Debug, Error)]
pub enum EpubError {
    #[error("Cannot write EPUB: book title is empty.")]
    EmptyTitle,

    #[error("Cannot write EPUB: book has no chapters.")]
    NoChapters,

    #[error("Failed to create EPUB file: {path}: {source}")]
    CreateFile {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write EPUB archive: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl From<std::io::Error> for EpubError {
    fn from(e: std::io::Error) -> Self {
        EpubError::Zip(zip::result::ZipError::Io(e))
    }
}

/// Write the draft to `path`. A partially written file is removed on failure.
pub fn write_epub(book: &BookDraft, path: &Path) -> Result<(), EpubError> {
    validate_book(book)?;
    write_to_file(path, |zip| write_archive(book, zip))
}

fn write_to_file<F>(path: &Path, write: F) -> Result<(), EpubError>
where
    F: FnOnce(&mut ZipWriter<std::fs::File>) -> Result<(), EpubError>,
{
    let file = std::fs::File::create(path).map_err(|e| EpubError::CreateFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut zip = ZipWriter::new(file);
    let result = write(&mut zip).and_then(|()| {
        zip.finish()?;
        Ok(())
    });
    if let Err(e) = &result {
        tracing::debug!("Removing incomplete {}: {}", path.display(), e);
        if let Err(remove) = std::fs::remove_file(path) {
            tracing::warn!("Cannot remove incomplete {}: {}", path.display(), remove);
        }
    }
    result
}

fn write_archive<W: Write + Seek>(
    book: &BookDraft,
    zip: &mut ZipWriter<W>,
) -> Result<(), EpubError> {
    let options_stored = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .unix_permissions(0o644);
    let options_deflate = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    // Mimetype first, uncompressed
    zip.start_file("mimetype", options_stored)?;
    zip.write_all(MIMETYPE)?;

    zip.start_file("META-INF/container.xml", options_deflate)?;
    zip.write_all(CONTAINER_XML)?;

    write_opf(book, zip, options_deflate)?;
    write_nav_xhtml(book, zip, options_deflate)?;
    write_ncx(book, zip, options_deflate)?;
    if let Some(cover) = book.cover() {
        write_cover(cover, zip, options_deflate)?;
    }
    write_chapters(book, zip, options_deflate)?;
    Ok(())
}

fn validate_book(book: &BookDraft) -> Result<(), EpubError> {
    if book.title().trim().is_empty() {
        return Err(EpubError::EmptyTitle);
    }
    if book.spine().is_empty() {
        return Err(EpubError::NoChapters);
    }
    Ok(())
}

fn write_opf<W: Write + Seek>(
    book: &BookDraft,
    zip: &mut ZipWriter<W>,
    options: SimpleFileOptions,
) -> Result<(), EpubError> {
    let mut manifest = String::from(
        r#"    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
"#,
    );
    let mut spine = String::new();
    if let Some(cover) = book.cover() {
        manifest.push_str(&format!(
            r#"    <item id="cover-img" href="images/cover.{}" media-type="{}" properties="cover-image"/>
    <item id="cover" href="cover.xhtml" media-type="application/xhtml+xml"/>
"#,
            cover.ext,
            cover.media_type()
        ));
        spine.push_str("    <itemref idref=\"cover\"/>\n");
    }
    spine.push_str("    <itemref idref=\"nav\"/>\n");
    for (i, ch) in book.spine().iter().enumerate() {
        manifest.push_str(&format!(
            r#"    <item id="chapter-{}" href="{}" media-type="application/xhtml+xml"/>
"#,
            i + 1,
            escape_attr(&ch.file_name)
        ));
        spine.push_str(&format!("    <itemref idref=\"chapter-{}\"/>\n", i + 1));
    }
    let cover_meta = if book.cover().is_some() {
        "\n    <meta name=\"cover\" content=\"cover-img\"/>"
    } else {
        ""
    };

    let opf = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" unique-identifier="book-id" version="3.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="book-id">{id}</dc:identifier>
    <dc:title>{title}</dc:title>
    <dc:language>{language}</dc:language>{cover_meta}
  </metadata>
  <manifest>
{manifest}  </manifest>
  <spine toc="ncx">
{spine}  </spine>
</package>
"#,
        id = xml_escape(book.identifier()),
        title = xml_escape(book.title()),
        language = xml_escape(book.language()),
        cover_meta = cover_meta,
        manifest = manifest,
        spine = spine,
    );

    zip.start_file(format!("{}content.opf", OEBPS_PREFIX), options)?;
    zip.write_all(opf.as_bytes())?;
    Ok(())
}

fn write_nav_xhtml<W: Write + Seek>(
    book: &BookDraft,
    zip: &mut ZipWriter<W>,
    options: SimpleFileOptions,
) -> Result<(), EpubError> {
    let mut nav_links = String::new();
    for entry in book.table_of_contents() {
        nav_links.push_str(&format!(
            "      <li><a href=\"{}\">{}</a></li>\n",
            escape_attr(&entry.file_name),
            escape_attr(&entry.title)
        ));
    }
    let nav = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops" lang="{lang}" xml:lang="{lang}">
<head>
  <meta charset="UTF-8"/>
  <title>{title}</title>
</head>
<body>
  <nav epub:type="toc" id="toc">
    <h1>{title}</h1>
    <ol>
{links}    </ol>
  </nav>
</body>
</html>
"#,
        lang = escape_attr(book.language()),
        title = escape_attr(book.title()),
        links = nav_links
    );
    zip.start_file(format!("{}nav.xhtml", OEBPS_PREFIX), options)?;
    zip.write_all(nav.as_bytes())?;
    Ok(())
}

fn write_ncx<W: Write + Seek>(
    book: &BookDraft,
    zip: &mut ZipWriter<W>,
    options: SimpleFileOptions,
) -> Result<(), EpubError> {
    let mut nav_points = String::new();
    for (i, entry) in book.table_of_contents().iter().enumerate() {
        nav_points.push_str(&format!(
            r#"    <navPoint id="navpoint-{n}" playOrder="{n}">
      <navLabel><text>{label}</text></navLabel>
      <content src="{src}"/>
    </navPoint>
"#,
            n = i + 1,
            label = xml_escape(&entry.title),
            src = xml_escape(&entry.file_name)
        ));
    }
    let ncx = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head>
    <meta name="dtb:uid" content="{}"/>
  </head>
  <docTitle>
    <text>{}</text>
  </docTitle>
  <navMap>
{}  </navMap>
</ncx>
"#,
        xml_escape(book.identifier()),
        xml_escape(book.title()),
        nav_points
    );
    zip.start_file(format!("{}toc.ncx", OEBPS_PREFIX), options)?;
    zip.write_all(ncx.as_bytes())?;
    Ok(())
}

fn write_cover<W: Write + Seek>(
    cover: &Cover,
    zip: &mut ZipWriter<W>,
    options: SimpleFileOptions,
) -> Result<(), EpubError> {
    let cover_xhtml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
  <meta charset="UTF-8"/>
  <title>Cover</title>
</head>
<body>
  <div style="text-align: center;">
    <img src="images/cover.{}" alt="Cover" style="max-width: 100%; height: auto;"/>
  </div>
</body>
</html>
"#,
        cover.ext
    );
    zip.start_file(format!("{}cover.xhtml", OEBPS_PREFIX), options)?;
    zip.write_all(cover_xhtml.as_bytes())?;
    zip.start_file(format!("{}images/cover.{}", OEBPS_PREFIX, cover.ext), options)?;
    zip.write_all(&cover.data)?;
    Ok(())
}

fn write_chapters<W: Write + Seek>(
    book: &BookDraft,
    zip: &mut ZipWriter<W>,
    options: SimpleFileOptions,
) -> Result<(), EpubError> {
    for ch in book.spine() {
        let title = escape_attr(&ch.title);
        let html = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" lang="{lang}" xml:lang="{lang}">
<head>
  <meta charset="UTF-8"/>
  <title>{title}</title>
</head>
<body>
<h2>{title}</h2>
{body}</body>
</html>
"#,
            lang = escape_attr(book.language()),
            title = title,
            body = ch.body
        );
        zip.start_file(format!("{}{}", OEBPS_PREFIX, ch.file_name), options)?;
        zip.write_all(html.as_bytes())?;
    }
    Ok(())
}

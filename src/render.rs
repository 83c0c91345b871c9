//! Chapter markup: elements to the XHTML body stored in the book.

use crate::model::{ContentElement, ElementKind};

/// Body markup for a chapter's elements, one block per element. Image references are
/// omitted; they need an image-fetch step this crate does not perform.
pub fn render_body(elements: &[ContentElement]) -> String {
    let mut body = String::new();
    for element in elements {
        match element.kind {
            ElementKind::Text => {
                body.push_str("<p>");
                body.push_str(&escape_text(&element.payload));
                body.push_str("</p>\n");
            }
            ElementKind::Markup => {
                body.push_str("<p>");
                body.push_str(&escape_bare_ampersands(&element.payload));
                body.push_str("</p>\n");
            }
            ElementKind::ImageLink => {
                body.push_str(&format!(
                    "<p class=\"image\"><img src=\"{}\" alt=\"\"/></p>\n",
                    escape_attr(&element.payload)
                ));
            }
            ElementKind::ImageReference => {
                tracing::debug!("Image reference '{}' not embedded", element.payload);
            }
        }
    }
    body
}

/// Tags and entity references pass through; any other `&` is escaped.
fn escape_bare_ampersands(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for (i, c) in s.char_indices() {
        if c == '&' && !starts_entity(&s[i + 1..]) {
            out.push_str("&amp;");
        } else {
            out.push(c);
        }
    }
    out
}

fn starts_entity(rest: &str) -> bool {
    let Some(end) = rest.find(';') else {
        return false;
    };
    let name = &rest[..end];
    if let Some(num) = name.strip_prefix('#') {
        match num.strip_prefix(['x', 'X']) {
            Some(hex) => !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit()),
            None => !num.is_empty() && num.chars().all(|c| c.is_ascii_digit()),
        }
    } else {
        !name.is_empty() && name.len() <= 32 && name.chars().all(|c| c.is_ascii_alphanumeric())
    }
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub(crate) fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub(crate) fn xml_escape(s: &str) -> String {
    escape_attr(s).replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{parse, ChapterContent};
    use serde_json::json;

    #[test]
    fn text_and_links_render_in_order() {
        let body = render_body(&[
            ContentElement::text("Первый"),
            ContentElement::image_link("https://img/a.jpg?x=1&y=2"),
            ContentElement::image_reference("img-7"),
            ContentElement::text("Второй"),
        ]);
        assert_eq!(
            body,
            "<p>Первый</p>\n<p class=\"image\"><img src=\"https://img/a.jpg?x=1&amp;y=2\" alt=\"\"/></p>\n<p>Второй</p>\n"
        );
    }

    #[test]
    fn inline_markup_and_entities_pass_through() {
        let body = render_body(&[ContentElement::markup("<em>да</em> &amp; &#171;нет&#xBB;")]);
        assert_eq!(body, "<p><em>да</em> &amp; &#171;нет&#xBB;</p>\n");
    }

    #[test]
    fn bare_ampersand_is_escaped() {
        let body = render_body(&[ContentElement::markup("Tom & Jerry; R&D")]);
        assert_eq!(body, "<p>Tom &amp; Jerry; R&amp;D</p>\n");
    }

    #[test]
    fn plain_text_is_escaped() {
        let body = render_body(&[ContentElement::text("1 < 2 & <b> &amp;")]);
        assert_eq!(body, "<p>1 &lt; 2 &amp; &lt;b&gt; &amp;amp;</p>\n");
    }

    #[test]
    fn decoded_html_entities_are_escaped_again() {
        let content = ChapterContent::from(json!("<p>1 &lt; 2 и a &lt;b&gt; c</p>"));
        assert_eq!(
            render_body(&parse(&content)),
            "<p>1 &lt; 2 и a &lt;b&gt; c</p>\n"
        );
    }

    #[test]
    fn tree_text_with_angle_brackets_is_escaped() {
        let content = ChapterContent::from(json!({
            "type": "doc",
            "content": [{"type": "paragraph", "content": [{"type": "text", "text": "x <y> z"}]}]
        }));
        assert_eq!(render_body(&parse(&content)), "<p>x &lt;y&gt; z</p>\n");
    }

    #[test]
    fn empty_elements_render_empty_body() {
        assert!(render_body(&[]).is_empty());
    }
}

//! Document parser: turns either chapter content encoding into an ordered element stream.
//!
//! Chapters arrive as a legacy HTML fragment (a JSON string) or as a rich-text tree
//! (a JSON object of nested typed nodes). The encoding is decided once, from the payload
//! shape, when [ChapterContent] is built.

use crate::model::ContentElement;
use scraper::node::Node;
use scraper::{ElementRef, Html};
use serde::Deserialize;
use serde_json::Value;

/// Text emitted for a `<p>` that has no single string descendant.
pub const MISSING_STRING: &str = "None";

/// Chapter content payload in one of its two encodings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "Value")]
pub enum ChapterContent {
    /// Legacy inline markup fragment.
    Html(String),
    /// Rich-text document tree.
    Tree(Value),
}

impl From<Value> for ChapterContent {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => ChapterContent::Html(s),
            other => ChapterContent::Tree(other),
        }
    }
}

/// Normalize chapter content into elements, in source order. Unrecognized nodes are
/// logged and contribute nothing; this never fails.
pub fn parse(content: &ChapterContent) -> Vec<ContentElement> {
    match content {
        ChapterContent::Html(fragment) => parse_html(fragment),
        ChapterContent::Tree(root) => {
            let mut elements = Vec::new();
            walk_tree(root, &mut elements);
            elements
        }
    }
}

fn parse_html(fragment: &str) -> Vec<ContentElement> {
    let doc = Html::parse_fragment(fragment);
    let mut elements = Vec::new();
    for child in doc.root_element().children() {
        match child.value() {
            Node::Element(el) => match el.name() {
                "p" => {
                    let text = ElementRef::wrap(child)
                        .and_then(single_string)
                        .unwrap_or_else(|| MISSING_STRING.to_string());
                    elements.push(ContentElement::text(text));
                }
                "img" => match el.attr("src") {
                    Some(src) => elements.push(ContentElement::image_link(src)),
                    None => tracing::warn!("Found <img> without src, skipped"),
                },
                other => tracing::warn!("Found unknown element: '<{}>'", other),
            },
            Node::Text(text) if text.trim().is_empty() => {}
            Node::Text(text) => tracing::warn!("Found unknown element: '{}'", text.trim()),
            other => tracing::warn!("Found unknown element: {:?}", other),
        }
    }
    elements
}

/// The node's only string: its sole text child, or the sole string of its sole element
/// child. Anything else (no children, several children) has none.
fn single_string(element: ElementRef<'_>) -> Option<String> {
    let mut children = element.children();
    let only = children.next()?;
    if children.next().is_some() {
        return None;
    }
    match only.value() {
        Node::Text(text) => Some(String::from(&**text)),
        Node::Element(_) => ElementRef::wrap(only).and_then(single_string),
        _ => None,
    }
}

fn walk_tree(node: &Value, out: &mut Vec<ContentElement>) {
    match node.get("type").and_then(Value::as_str) {
        Some("doc" | "paragraph") => match node.get("content").and_then(Value::as_array) {
            Some(children) => {
                for child in children {
                    walk_tree(child, out);
                }
            }
            None => unparseable(node),
        },
        Some("text") => match node.get("text").and_then(Value::as_str) {
            Some(text) => out.push(ContentElement::text(text)),
            None => unparseable(node),
        },
        Some("image") => match node.get("attrs").and_then(Value::as_object) {
            Some(attrs) => {
                let images = attrs.get("images").and_then(Value::as_array);
                for image in images.into_iter().flatten() {
                    match image.get("image").and_then(image_id) {
                        Some(id) => out.push(ContentElement::image_reference(id)),
                        None => tracing::warn!("Image entry without id: '{}'", image),
                    }
                }
            }
            None => unparseable(node),
        },
        Some("hardBreak") => {}
        _ => unparseable(node),
    }
}

fn image_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn unparseable(node: &Value) {
    tracing::warn!("Failed to parse content: '{}'", node);
}

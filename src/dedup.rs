//! Duplicate suppression across one assembled book: chapter titles and chapter bodies.

use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Return `candidate` if unused, otherwise `"<candidate> (<n>)"` where `n` is one more than
/// the largest ` (<integer>)` suffix among all existing names (0 when there is none).
pub fn dedupe_name(existing: &[String], candidate: &str) -> String {
    if !existing.iter().any(|n| n == candidate) {
        return candidate.to_string();
    }
    let max = existing
        .iter()
        .filter_map(|n| numeric_suffix(n))
        .max()
        .unwrap_or(0);
    format!("{} ({})", candidate, max.saturating_add(1))
}

/// `n` from a trailing `" (n)"`.
fn numeric_suffix(name: &str) -> Option<u64> {
    let inner = name.strip_suffix(')')?;
    let open = inner.rfind(" (")?;
    let digits = &inner[open + 2..];
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// SHA-256 hex digest of a rendered chapter body.
pub fn content_hash(body: &str) -> String {
    hex::encode(Sha256::digest(body.as_bytes()))
}

/// Names and body hashes already committed to the book.
#[derive(Debug, Default)]
pub struct Deduplicator {
    names: Vec<String>,
    hashes: HashSet<String>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the body's hash. Returns false when an identical body was already seen.
    pub fn register_body(&mut self, body: &str) -> bool {
        self.hashes.insert(content_hash(body))
    }

    /// Pick a unique title and record it.
    pub fn register_name(&mut self, candidate: &str) -> String {
        let name = dedupe_name(&self.names, candidate);
        self.names.push(name.clone());
        name
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

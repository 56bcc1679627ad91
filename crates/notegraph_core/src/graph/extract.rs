//! Wikilink extraction from editor document trees.
//!
//! Only structurally tagged references count: a `wikilink` node or a text
//! node carrying a `wikilink` mark. Literal `[[...]]` in plain text is never
//! matched.

use crate::model::document::DocNode;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

const LEGACY_OPEN: &str = "[[";
const LEGACY_CLOSE: &str = "]]";

/// Extracts unique referenced titles in first-seen document order.
///
/// Traversal is iterative so pathological nesting cannot exhaust the call
/// stack. Malformed fragments are skipped individually; this never fails.
pub fn extract_linked_titles(root: Option<&Value>) -> Vec<String> {
    let Some(root) = root else {
        return Vec::new();
    };

    let mut collector = TitleCollector::default();
    let mut stack: Vec<&Value> = vec![root];

    while let Some(value) = stack.pop() {
        let Some(node) = DocNode::from_value(value) else {
            continue;
        };

        if let Some(raw) = node
            .link_reference()
            .and_then(|reference| reference.raw_title())
        {
            collector.push(raw);
        }

        // Reverse push keeps pre-order; link nodes are descended too.
        stack.extend(node.children().iter().rev());
    }

    collector.titles
}

/// Normalizes one raw title.
///
/// Trims, strips one legacy `[[...]]` wrapper, collapses whitespace runs to a
/// single space. Returns `None` when nothing remains.
pub fn normalize_title(raw: &str) -> Option<String> {
    let mut value = raw.trim();
    if value.len() >= LEGACY_OPEN.len() + LEGACY_CLOSE.len()
        && value.starts_with(LEGACY_OPEN)
        && value.ends_with(LEGACY_CLOSE)
    {
        value = &value[LEGACY_OPEN.len()..value.len() - LEGACY_CLOSE.len()];
    }

    let collapsed = WHITESPACE_RE.replace_all(value, " ");
    let trimmed = collapsed.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Case-folded lookup key for an already normalized title.
pub fn title_key(normalized: &str) -> String {
    normalized.to_lowercase()
}

#[derive(Default)]
struct TitleCollector {
    seen: HashSet<String>,
    titles: Vec<String>,
}

impl TitleCollector {
    fn push(&mut self, raw: &str) {
        let Some(title) = normalize_title(raw) else {
            return;
        };
        if self.seen.insert(title_key(&title)) {
            self.titles.push(title);
        }
    }
}

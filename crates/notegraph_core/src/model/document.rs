//! Typed view over editor document trees.
//!
//! The editor stores documents as JSON objects shaped like
//! `{ "type", "text", "attrs", "marks", "content" }`. This module borrows
//! from a parsed `serde_json::Value` instead of converting it, so arbitrarily
//! deep documents never need recursive conversion.
//!
//! # Invariants
//! - Every field is optional; a field with the wrong JSON type reads as absent.
//! - Only the reserved `wikilink` node type and mark type carry references.
//! - Parsing and teardown of stored documents do not recurse on the call
//!   stack, so nesting depth is bounded only by memory.

use serde::Deserialize;
use serde_json::{Map, Value};

/// Reserved node type and mark type for wikilinks.
pub const LINK_TYPE: &str = "wikilink";

const TITLE_ATTR: &str = "title";

/// One document node: type discriminator, optional text/attrs, marks, children.
#[derive(Debug, Clone, Copy)]
pub struct DocNode<'a> {
    kind: Option<&'a str>,
    text: Option<&'a str>,
    attrs: Option<&'a Map<String, Value>>,
    marks: &'a [Value],
    children: &'a [Value],
}

impl<'a> DocNode<'a> {
    /// Reads a node from JSON. Returns `None` when `value` is not an object.
    pub fn from_value(value: &'a Value) -> Option<Self> {
        let object = value.as_object()?;
        Some(Self {
            kind: object.get("type").and_then(Value::as_str),
            text: object.get("text").and_then(Value::as_str),
            attrs: object.get("attrs").and_then(Value::as_object),
            marks: array_field(object, "marks"),
            children: array_field(object, "content"),
        })
    }

    pub fn kind(&self) -> Option<&'a str> {
        self.kind
    }

    pub fn text(&self) -> Option<&'a str> {
        self.text
    }

    /// Child nodes in document order. Non-object entries are kept here and
    /// skipped by `DocNode::from_value` at visit time.
    pub fn children(&self) -> &'a [Value] {
        self.children
    }

    pub fn marks(&self) -> impl Iterator<Item = DocMark<'a>> + 'a {
        self.marks.iter().filter_map(DocMark::from_value)
    }

    pub fn is_link_node(&self) -> bool {
        self.kind == Some(LINK_TYPE)
    }

    /// Returns the wikilink this node carries, in node form or mark form.
    ///
    /// Mark form requires non-empty text; the first `wikilink` mark wins.
    pub fn link_reference(&self) -> Option<LinkReference<'a>> {
        if self.is_link_node() {
            return Some(LinkReference::Node {
                title: string_attr(self.attrs, TITLE_ATTR),
                text: self.text,
            });
        }

        let text = self.text.filter(|text| !text.is_empty())?;
        let mark = self.marks().find(DocMark::is_link_mark)?;
        Some(LinkReference::Mark {
            title: mark.title(),
            text,
        })
    }
}

/// Inline mark attached to a text node.
#[derive(Debug, Clone, Copy)]
pub struct DocMark<'a> {
    kind: Option<&'a str>,
    attrs: Option<&'a Map<String, Value>>,
}

impl<'a> DocMark<'a> {
    pub fn from_value(value: &'a Value) -> Option<Self> {
        let object = value.as_object()?;
        Some(Self {
            kind: object.get("type").and_then(Value::as_str),
            attrs: object.get("attrs").and_then(Value::as_object),
        })
    }

    pub fn kind(&self) -> Option<&'a str> {
        self.kind
    }

    pub fn is_link_mark(&self) -> bool {
        self.kind == Some(LINK_TYPE)
    }

    /// String `title` attribute, if present and a string.
    pub fn title(&self) -> Option<&'a str> {
        string_attr(self.attrs, TITLE_ATTR)
    }
}

/// Where a wikilink was found in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOrigin {
    Node,
    Mark,
}

/// A reference-bearing spot in a document, before normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkReference<'a> {
    /// `{ "type": "wikilink", "attrs": { "title": .. } }`
    Node {
        title: Option<&'a str>,
        text: Option<&'a str>,
    },
    /// Text node carrying a `wikilink` mark.
    Mark {
        title: Option<&'a str>,
        text: &'a str,
    },
}

impl<'a> LinkReference<'a> {
    pub fn origin(&self) -> LinkOrigin {
        match self {
            Self::Node { .. } => LinkOrigin::Node,
            Self::Mark { .. } => LinkOrigin::Mark,
        }
    }

    /// Title attribute, falling back to the node text.
    pub fn raw_title(&self) -> Option<&'a str> {
        match *self {
            Self::Node { title, text } => title.or(text),
            Self::Mark { title, text } => Some(title.unwrap_or(text)),
        }
    }
}

/// Parses stored document text with no nesting limit.
///
/// `serde_json` stops at 128 levels by default; editor documents spend two
/// levels per block (node object + `content` array).
pub fn parse_document(raw: &str) -> serde_json::Result<Value> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    deserializer.disable_recursion_limit();
    let value = Value::deserialize(serde_stacker::Deserializer::new(&mut deserializer))?;
    deserializer.end()?;
    Ok(value)
}

/// Drops a document iteratively. `Value`'s own `Drop` recurses per level.
pub fn release_document(root: Value) {
    let mut pending = vec![root];
    while let Some(value) = pending.pop() {
        match value {
            Value::Array(items) => pending.extend(items),
            Value::Object(fields) => pending.extend(fields.into_iter().map(|(_, child)| child)),
            _ => {}
        }
    }
}

fn array_field<'a>(object: &'a Map<String, Value>, key: &str) -> &'a [Value] {
    object
        .get(key)
        .and_then(Value::as_array)
        .map_or(&[], Vec::as_slice)
}

fn string_attr<'a>(attrs: Option<&'a Map<String, Value>>, key: &str) -> Option<&'a str> {
    attrs?.get(key).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::{parse_document, release_document, DocNode, LinkOrigin, LinkReference};
    use crate::graph::extract_linked_titles;
    use serde_json::json;

    fn nested_raw(depth: usize, leaf: &str) -> String {
        let open = r#"{"type":"blockquote","content":["#;
        let close = "]}";
        let mut raw = String::with_capacity(depth * (open.len() + close.len()) + leaf.len());
        for _ in 0..depth {
            raw.push_str(open);
        }
        raw.push_str(leaf);
        for _ in 0..depth {
            raw.push_str(close);
        }
        raw
    }

    #[test]
    fn node_form_prefers_title_attribute_over_text() {
        let value = json!({ "type": "wikilink", "text": "shown", "attrs": { "title": "Target" } });
        let node = DocNode::from_value(&value).unwrap();
        let reference = node.link_reference().unwrap();
        assert_eq!(reference.origin(), LinkOrigin::Node);
        assert_eq!(reference.raw_title(), Some("Target"));
    }

    #[test]
    fn non_string_title_falls_back_to_text() {
        let value = json!({ "type": "wikilink", "text": "Fallback", "attrs": { "title": 42 } });
        let node = DocNode::from_value(&value).unwrap();
        assert_eq!(node.link_reference().unwrap().raw_title(), Some("Fallback"));
    }

    #[test]
    fn mark_form_requires_non_empty_text() {
        let value = json!({
            "type": "text",
            "text": "",
            "marks": [{ "type": "wikilink", "attrs": { "title": "Target" } }]
        });
        let node = DocNode::from_value(&value).unwrap();
        assert!(node.link_reference().is_none());
    }

    #[test]
    fn mark_form_ignores_other_mark_types() {
        let value = json!({
            "type": "text",
            "text": "bold words",
            "marks": [{ "type": "bold" }, "garbage", { "type": "wikilink" }]
        });
        let node = DocNode::from_value(&value).unwrap();
        assert_eq!(
            node.link_reference(),
            Some(LinkReference::Mark {
                title: None,
                text: "bold words"
            })
        );
    }

    #[test]
    fn malformed_fields_read_as_absent() {
        let value = json!({ "type": 7, "text": ["x"], "marks": "nope", "content": {} });
        let node = DocNode::from_value(&value).unwrap();
        assert!(node.kind().is_none());
        assert!(node.text().is_none());
        assert!(node.children().is_empty());
        assert_eq!(node.marks().count(), 0);
        assert!(DocNode::from_value(&json!("text")).is_none());
    }

    #[test]
    fn parse_document_accepts_nesting_far_past_default_limit() {
        let raw = nested_raw(
            20_000,
            r#"{"type":"wikilink","attrs":{"title":"Bottom"}}"#,
        );
        let document = parse_document(&raw).unwrap();
        assert_eq!(extract_linked_titles(Some(&document)), vec!["Bottom"]);
        release_document(document);
    }

    #[test]
    fn parse_document_rejects_trailing_garbage() {
        assert!(parse_document(r#"{"type":"doc"} extra"#).is_err());
        assert!(parse_document("{not json").is_err());
    }
}

//! Normalized-title multimap for one scope, and edge computation on top of it.
//!
//! # Invariants
//! - Keys use the same normalization as extraction, then case-folding.
//! - A title shared by several notes resolves to all of them (fan-out).
//! - Computed edges never contain self-loops or duplicate pairs.

use crate::graph::extract::{extract_linked_titles, normalize_title, title_key};
use crate::model::note::{NoteId, NoteLink, NoteSource};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};

/// Transient title → note ids lookup for a single scope.
#[derive(Debug, Clone, Default)]
pub struct TitleIndex {
    by_key: HashMap<String, Vec<NoteId>>,
}

impl TitleIndex {
    /// Builds the index from `(id, title)` pairs. Blank titles are not indexed.
    pub fn build<'a>(notes: impl IntoIterator<Item = (NoteId, &'a str)>) -> Self {
        let mut by_key: HashMap<String, Vec<NoteId>> = HashMap::new();
        for (id, title) in notes {
            let Some(normalized) = normalize_title(title) else {
                continue;
            };
            by_key.entry(title_key(&normalized)).or_default().push(id);
        }
        Self { by_key }
    }

    pub fn from_sources(notes: &[NoteSource]) -> Self {
        Self::build(notes.iter().map(|note| (note.id, note.title.as_str())))
    }

    /// Returns every note id whose title matches the raw `title` after
    /// normalization.
    pub fn resolve(&self, title: &str) -> &[NoteId] {
        match normalize_title(title) {
            Some(normalized) => self.resolve_normalized(&normalized),
            None => &[],
        }
    }

    /// Looks up a title that is already normalized (extractor output).
    /// Normalizing again would strip a second `[[...]]` layer.
    pub fn resolve_normalized(&self, normalized: &str) -> &[NoteId] {
        self.by_key
            .get(&title_key(normalized))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of distinct normalized titles.
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Resolves one note's content into its outbound edges.
    pub fn outbound_links(&self, note: &NoteSource) -> Vec<NoteLink> {
        let titles = extract_linked_titles(note.content.as_ref());
        let mut seen = HashSet::new();
        let mut links = Vec::new();
        for title in &titles {
            for &target in self.resolve_normalized(title) {
                let link = NoteLink::new(note.id, target);
                if link.is_self_loop() || !seen.insert(target) {
                    continue;
                }
                links.push(link);
            }
        }
        links
    }
}

/// Computes outbound edges for every note in `sources`, resolving against
/// `index`. Extraction runs in parallel; output order follows `sources`.
pub fn compute_links<'a, I>(sources: I, index: &TitleIndex) -> Vec<NoteLink>
where
    I: IntoParallelIterator<Item = &'a NoteSource>,
{
    sources
        .into_par_iter()
        .flat_map_iter(|note| index.outbound_links(note))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{compute_links, TitleIndex};
    use crate::model::note::{NoteLink, NoteSource};
    use serde_json::{json, Value};
    use uuid::Uuid;

    fn note(title: &str, links: &[&str]) -> NoteSource {
        let content: Vec<Value> = links
            .iter()
            .map(|title| json!({ "type": "wikilink", "attrs": { "title": title } }))
            .collect();
        NoteSource {
            id: Uuid::new_v4(),
            subject_id: Uuid::nil(),
            title: title.to_string(),
            content: Some(json!({ "type": "doc", "content": content })),
        }
    }

    #[test]
    fn resolve_is_normalization_invariant() {
        let target = note("Physics 101", &[]);
        let index = TitleIndex::from_sources(std::slice::from_ref(&target));
        for query in ["Physics 101", "  physics 101  ", "PHYSICS 101", "physics   101"] {
            assert_eq!(index.resolve(query), &[target.id], "query `{query}`");
        }
        assert!(index.resolve("Physics").is_empty());
    }

    #[test]
    fn duplicate_titles_fan_out() {
        let a = note("Intro", &[]);
        let b = note("intro", &[]);
        let c = note("Reader", &["Intro"]);
        let notes = vec![a.clone(), b.clone(), c.clone()];
        let index = TitleIndex::from_sources(&notes);

        let mut links = compute_links(&notes, &index);
        links.sort();
        let mut expected = vec![NoteLink::new(c.id, a.id), NoteLink::new(c.id, b.id)];
        expected.sort();
        assert_eq!(links, expected);
    }

    #[test]
    fn self_references_are_dropped() {
        let a = note("Algebra", &["Algebra", "Calculus", "calculus"]);
        let b = note("Calculus", &[]);
        let notes = vec![a.clone(), b.clone()];
        let index = TitleIndex::from_sources(&notes);
        assert_eq!(compute_links(&notes, &index), vec![NoteLink::new(a.id, b.id)]);
    }

    #[test]
    fn bracket_wrapper_is_stripped_only_once() {
        let plain = note("X", &[]);
        let doubled = note("Doubled", &["[[[[X]]]]"]);
        let single = note("Single", &["[[X]]"]);
        let notes = vec![plain.clone(), doubled.clone(), single.clone()];
        let index = TitleIndex::from_sources(&notes);

        assert!(index.outbound_links(&doubled).is_empty());
        assert!(index.resolve_normalized("[[X]]").is_empty());
        assert_eq!(
            index.outbound_links(&single),
            vec![NoteLink::new(single.id, plain.id)]
        );
    }

    #[test]
    fn blank_titles_are_not_indexed() {
        let blank = note("   ", &[]);
        let index = TitleIndex::from_sources(std::slice::from_ref(&blank));
        assert!(index.is_empty());
        assert!(index.resolve("").is_empty());
    }

    #[test]
    fn unparseable_content_has_no_links() {
        let mut broken = note("Broken", &[]);
        broken.content = None;
        let target = note("Target", &[]);
        let notes = vec![broken, target];
        let index = TitleIndex::from_sources(&notes);
        assert!(compute_links(&notes, &index).is_empty());
    }
}

//! Note, scope, and edge read models.
//!
//! # Invariants
//! - A scope is the user owning a note's subject; titles never resolve across
//!   scopes.
//! - `NoteLink::from_note_id != NoteLink::to_note_id` for every persisted edge.

use crate::model::document::release_document;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Stable note identifier.
pub type NoteId = Uuid;

/// Stable subject identifier. Subjects group notes under one user.
pub type SubjectId = Uuid;

/// Ownership boundary for title resolution (the owning user id).
pub type ScopeId = Uuid;

/// Note projection consumed by extraction and title resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteSource {
    pub id: NoteId,
    pub subject_id: SubjectId,
    /// Free-text title; not unique within a scope.
    pub title: String,
    /// Parsed document tree. `None` when stored content is not valid JSON.
    pub content: Option<Value>,
}

impl Drop for NoteSource {
    fn drop(&mut self) {
        if let Some(content) = self.content.take() {
            release_document(content);
        }
    }
}

/// Directed edge: the source note's current content references the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NoteLink {
    pub from_note_id: NoteId,
    pub to_note_id: NoteId,
}

impl NoteLink {
    pub fn new(from_note_id: NoteId, to_note_id: NoteId) -> Self {
        Self {
            from_note_id,
            to_note_id,
        }
    }

    /// Returns whether the edge points back at its own source.
    pub fn is_self_loop(&self) -> bool {
        self.from_note_id == self.to_note_id
    }
}

/// Graph node payload (no content).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: NoteId,
    pub subject_id: SubjectId,
    pub title: String,
}

impl From<&NoteSource> for GraphNode {
    fn from(value: &NoteSource) -> Self {
        Self {
            id: value.id,
            subject_id: value.subject_id,
            title: value.title.clone(),
        }
    }
}

/// Backlink source summary returned to callers rendering "linked from".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedNote {
    pub id: NoteId,
    pub subject_id: SubjectId,
    pub title: String,
    /// Epoch milliseconds.
    pub updated_at: i64,
}

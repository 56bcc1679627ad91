//! Backlink and graph queries over naive or materialized edges.
//!
//! # Responsibility
//! - Serve scope graphs, outbound links, and backlinks in two modes:
//!   `Naive` recomputes from content, `Indexed` reads `note_links`.
//!
//! # Invariants
//! - For the same content at the same instant both modes return the same
//!   edge set (order may differ).
//! - Queries never take scope locks; indexed reads see the latest completed
//!   (or in-flight) rebuild.
//! - A subject filter narrows edge *sources*; titles still resolve across the
//!   whole scope.

use crate::graph::{compute_links, TitleIndex};
use crate::model::note::{GraphNode, LinkedNote, NoteId, NoteLink, ScopeId, SubjectId};
use crate::repo::link_repo::NoteLinkRepository;
use crate::repo::note_repo::NoteSourceRepository;
use crate::repo::{RepoError, RepoResult};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Read strategy for graph queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    /// Extract + resolve at read time. Cost grows with total content size.
    Naive,
    /// Read materialized edges. Cost grows with edge count only.
    Indexed,
}

/// Nodes and edges of one scope (optionally one subject).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<NoteLink>,
}

impl ScopeGraph {
    /// Edges sorted by `(from, to)`, for order-independent comparison.
    pub fn sorted_edges(&self) -> Vec<NoteLink> {
        let mut edges = self.edges.clone();
        edges.sort_unstable();
        edges
    }
}

#[derive(Debug)]
pub enum GraphQueryError {
    Repo(RepoError),
    NoteNotFound(NoteId),
}

impl Display for GraphQueryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "{err}"),
            Self::NoteNotFound(id) => write!(f, "note not found: {id}"),
        }
    }
}

impl Error for GraphQueryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::NoteNotFound(_) => None,
        }
    }
}

impl From<RepoError> for GraphQueryError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::NoteNotFound(id),
            other => Self::Repo(other),
        }
    }
}

pub type GraphQueryResult<T> = Result<T, GraphQueryError>;

/// Query facade over note and edge repositories.
pub struct GraphQueryService<N, L> {
    notes: N,
    links: L,
}

impl<N: NoteSourceRepository, L: NoteLinkRepository> GraphQueryService<N, L> {
    pub fn new(notes: N, links: L) -> Self {
        Self { notes, links }
    }

    /// Builds the graph of `scope`, optionally narrowed to one subject.
    ///
    /// An unknown scope yields an empty graph.
    pub fn scope_graph(
        &self,
        scope: ScopeId,
        subject: Option<SubjectId>,
        mode: QueryMode,
    ) -> GraphQueryResult<ScopeGraph> {
        match mode {
            QueryMode::Indexed => Ok(ScopeGraph {
                nodes: self.notes.list_scope_nodes(scope, subject)?,
                edges: self.links.list_scope_links(scope, subject)?,
            }),
            QueryMode::Naive => {
                let notes = self.notes.list_scope_notes(scope)?;
                let index = TitleIndex::from_sources(&notes);
                let sources: Vec<_> = notes
                    .iter()
                    .filter(|note| subject.map_or(true, |id| note.subject_id == id))
                    .collect();
                let edges = compute_links(sources.clone(), &index);
                Ok(ScopeGraph {
                    nodes: sources.into_iter().map(GraphNode::from).collect(),
                    edges,
                })
            }
        }
    }

    /// Edges whose source is `note_id`.
    pub fn outbound_links(
        &self,
        note_id: NoteId,
        mode: QueryMode,
    ) -> GraphQueryResult<Vec<NoteLink>> {
        let scope = self.require_scope(note_id)?;
        match mode {
            QueryMode::Indexed => Ok(self.links.list_outbound_links(note_id)?),
            QueryMode::Naive => {
                let notes = self.notes.list_scope_notes(scope)?;
                let index = TitleIndex::from_sources(&notes);
                let source = notes
                    .iter()
                    .find(|note| note.id == note_id)
                    .ok_or(GraphQueryError::NoteNotFound(note_id))?;
                Ok(index.outbound_links(source))
            }
        }
    }

    /// Edges whose target is `note_id`.
    pub fn backlinks(&self, note_id: NoteId, mode: QueryMode) -> GraphQueryResult<Vec<NoteLink>> {
        let scope = self.require_scope(note_id)?;
        match mode {
            QueryMode::Indexed => Ok(self.links.list_backlinks(note_id)?),
            QueryMode::Naive => {
                let notes = self.notes.list_scope_notes(scope)?;
                let index = TitleIndex::from_sources(&notes);
                Ok(compute_links(&notes, &index)
                    .into_iter()
                    .filter(|link| link.to_note_id == note_id)
                    .collect())
            }
        }
    }

    /// Source notes linking to `note_id`, newest first, from the index.
    pub fn backlink_notes(&self, note_id: NoteId) -> GraphQueryResult<Vec<LinkedNote>> {
        self.require_scope(note_id)?;
        Ok(self.links.list_backlink_notes(note_id)?)
    }

    fn require_scope(&self, note_id: NoteId) -> RepoResult<ScopeId> {
        self.notes
            .note_scope(note_id)?
            .ok_or(RepoError::NotFound(note_id))
    }
}

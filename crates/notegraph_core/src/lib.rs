//! Wikilink graph index for rich-text notes.
//!
//! Derives directed note-to-note edges from editor document trees, keeps the
//! materialized edge set consistent through idempotent rebuilds, and serves
//! backlink/outbound queries from either the index or on-demand recomputation.

pub mod bench;
pub mod db;
pub mod graph;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use bench::{run_benchmark, seed_synthetic_scope, BenchError, BenchmarkReport, SeedPlan};
pub use graph::{compute_links, extract_linked_titles, normalize_title, TitleIndex};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::document::{DocMark, DocNode, LinkOrigin, LinkReference, LINK_TYPE};
pub use model::note::{GraphNode, LinkedNote, NoteId, NoteLink, NoteSource, ScopeId, SubjectId};
pub use repo::link_repo::{NoteLinkRepository, SqliteLinkRepository};
pub use repo::note_repo::{NoteSourceRepository, SqliteNoteRepository};
pub use repo::{RepoError, RepoResult};
pub use service::backfill::{backfill_all_scopes, backfill_scopes, BackfillSummary, ScopeOutcome};
pub use service::graph_query::{
    GraphQueryError, GraphQueryResult, GraphQueryService, QueryMode, ScopeGraph,
};
pub use service::materializer::{
    CancelFlag, LinkMaterializer, MaterializeError, MaterializeOptions, MaterializeResult,
    RebuildReport, RebuildTarget, ScopeLocks,
};

/// Minimal health-check API.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

//! Graph materialization: derive edges from note content and replace the
//! stored edge set.
//!
//! # Responsibility
//! - Rebuild all edges of one scope, or the outbound edges of one note.
//! - Serialize rebuilds of the same scope; leave other scopes independent.
//!
//! # Invariants
//! - Delete-by-source always precedes insertion, so stale edges never survive
//!   a completed rebuild.
//! - Inserts are chunked and duplicate-tolerant; a rebuild interrupted at any
//!   point under-represents the graph and never stores a false edge.
//! - The title index is rebuilt from the note store on every run.
//!
//! Readers are not blocked: between the delete step and the last chunk they
//! can observe a partially rebuilt scope.

use crate::graph::{compute_links, TitleIndex};
use crate::model::note::{NoteId, NoteLink, ScopeId};
use crate::repo::link_repo::NoteLinkRepository;
use crate::repo::note_repo::NoteSourceRepository;
use crate::repo::RepoError;
use log::{error, info, warn};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// Default number of edges written per insert transaction.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Upper bound for one insert transaction.
pub const MAX_CHUNK_SIZE: usize = 10_000;

static GLOBAL_SCOPE_LOCKS: Lazy<ScopeLocks> = Lazy::new(ScopeLocks::default);

pub type MaterializeResult<T> = Result<T, MaterializeError>;

/// Materialization error.
#[derive(Debug)]
pub enum MaterializeError {
    /// Note or edge store failure. The scope may be under-represented until
    /// the rebuild is re-run.
    Repo(RepoError),
    /// Targeted rebuild for a note that does not exist.
    NoteNotFound(NoteId),
    /// Cancelled between chunks after `inserted` edges were written.
    Cancelled { scope: ScopeId, inserted: usize },
}

impl Display for MaterializeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "{err}"),
            Self::NoteNotFound(id) => write!(f, "note not found: {id}"),
            Self::Cancelled { scope, inserted } => write!(
                f,
                "rebuild for scope {scope} cancelled after {inserted} inserted edges"
            ),
        }
    }
}

impl Error for MaterializeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::NoteNotFound(_) | Self::Cancelled { .. } => None,
        }
    }
}

impl From<RepoError> for MaterializeError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::NoteNotFound(id),
            other => Self::Repo(other),
        }
    }
}

/// Tunables for materialization. Chunk size affects payload size only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterializeOptions {
    pub chunk_size: usize,
}

impl Default for MaterializeOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl MaterializeOptions {
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size: normalize_chunk_size(chunk_size),
        }
    }
}

/// Clamps chunk size into `1..=MAX_CHUNK_SIZE`; `0` means default.
pub fn normalize_chunk_size(chunk_size: usize) -> usize {
    match chunk_size {
        0 => DEFAULT_CHUNK_SIZE,
        value if value > MAX_CHUNK_SIZE => MAX_CHUNK_SIZE,
        value => value,
    }
}

/// Shared cancellation signal, checked between insert chunks.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-scope mutex registry. Clones share the same registry.
///
/// A slot lives only while some caller holds or waits on it; `run_exclusive`
/// prunes it afterwards, so the registry is bounded by in-flight scopes.
#[derive(Debug, Clone, Default)]
pub struct ScopeLocks {
    slots: Arc<Mutex<HashMap<ScopeId, Arc<Mutex<()>>>>>,
}

impl ScopeLocks {
    /// Process-wide registry used by `LinkMaterializer::new`.
    pub fn global() -> Self {
        GLOBAL_SCOPE_LOCKS.clone()
    }

    /// Returns the mutex guarding `scope`, creating it on first use.
    pub fn slot(&self, scope: ScopeId) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(scope).or_default())
    }

    /// Runs `work` while holding the lock for `scope`, then prunes the slot.
    pub fn run_exclusive<T>(&self, scope: ScopeId, work: impl FnOnce() -> T) -> T {
        let slot = self.slot(scope);
        let output = {
            let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
            work()
        };
        drop(slot);
        self.prune(scope);
        output
    }

    /// Removes the slot for `scope` unless another caller still holds it.
    pub fn prune(&self, scope: ScopeId) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots
            .get(&scope)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            slots.remove(&scope);
        }
    }

    /// Number of scopes with a live slot.
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What a rebuild covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildTarget {
    Scope(ScopeId),
    Note(NoteId),
}

/// Outcome of one successful rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildReport {
    pub scope: ScopeId,
    pub target: RebuildTarget,
    /// Number of source notes whose edges were replaced.
    pub sources: usize,
    pub edges_deleted: usize,
    pub edges_computed: usize,
    pub edges_inserted: usize,
    pub chunks: usize,
    pub duration_ms: u128,
}

/// Rebuilds materialized edges from note content.
pub struct LinkMaterializer<N, L> {
    notes: N,
    links: L,
    options: MaterializeOptions,
    locks: ScopeLocks,
    cancel: Option<CancelFlag>,
}

impl<N: NoteSourceRepository, L: NoteLinkRepository> LinkMaterializer<N, L> {
    /// Creates a materializer using default options and the global lock registry.
    pub fn new(notes: N, links: L) -> Self {
        Self {
            notes,
            links,
            options: MaterializeOptions::default(),
            locks: ScopeLocks::global(),
            cancel: None,
        }
    }

    pub fn with_options(mut self, options: MaterializeOptions) -> Self {
        self.options = MaterializeOptions::with_chunk_size(options.chunk_size);
        self
    }

    pub fn with_locks(mut self, locks: ScopeLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn note_repository(&self) -> &N {
        &self.notes
    }

    /// Dispatches to `rebuild_scope` or `rebuild_note`.
    pub fn rebuild(&self, target: RebuildTarget) -> MaterializeResult<RebuildReport> {
        match target {
            RebuildTarget::Scope(scope) => self.rebuild_scope(scope),
            RebuildTarget::Note(note_id) => self.rebuild_note(note_id),
        }
    }

    /// Replaces every edge sourced in `scope` with the freshly computed set.
    ///
    /// Idempotent; an empty or unknown scope yields an empty edge set.
    pub fn rebuild_scope(&self, scope: ScopeId) -> MaterializeResult<RebuildReport> {
        self.locks.run_exclusive(scope, || {
            let started_at = Instant::now();
            info!(
                "event=graph_rebuild module=materializer status=start target=scope scope={scope}"
            );

            let result = self.replace_scope_links(scope, started_at);

            log_outcome("scope", scope, started_at, &result);
            result
        })
    }

    /// Replaces the outbound edges of one note, resolving against its scope.
    pub fn rebuild_note(&self, note_id: NoteId) -> MaterializeResult<RebuildReport> {
        let scope = self
            .notes
            .note_scope(note_id)?
            .ok_or(MaterializeError::NoteNotFound(note_id))?;
        self.locks.run_exclusive(scope, || {
            let started_at = Instant::now();
            info!(
                "event=graph_rebuild module=materializer status=start target=note scope={scope} note_id={note_id}"
            );

            let result = self.replace_note_links(scope, note_id, started_at);

            log_outcome("note", scope, started_at, &result);
            result
        })
    }

    fn replace_scope_links(
        &self,
        scope: ScopeId,
        started_at: Instant,
    ) -> MaterializeResult<RebuildReport> {
        let notes = self.notes.list_scope_notes(scope)?;
        let index = TitleIndex::from_sources(&notes);
        let computed = compute_links(&notes, &index);

        let deleted = self.links.delete_links_from_scope(scope)?;
        let (inserted, chunks) = self.insert_chunked(scope, &computed)?;
        Ok(RebuildReport {
            scope,
            target: RebuildTarget::Scope(scope),
            sources: notes.len(),
            edges_deleted: deleted,
            edges_computed: computed.len(),
            edges_inserted: inserted,
            chunks,
            duration_ms: started_at.elapsed().as_millis(),
        })
    }

    fn replace_note_links(
        &self,
        scope: ScopeId,
        note_id: NoteId,
        started_at: Instant,
    ) -> MaterializeResult<RebuildReport> {
        let notes = self.notes.list_scope_notes(scope)?;
        let source = notes
            .iter()
            .find(|note| note.id == note_id)
            .ok_or(MaterializeError::NoteNotFound(note_id))?;
        let index = TitleIndex::from_sources(&notes);
        let computed = index.outbound_links(source);

        let deleted = self.links.delete_links_from_note(note_id)?;
        let (inserted, chunks) = self.insert_chunked(scope, &computed)?;
        Ok(RebuildReport {
            scope,
            target: RebuildTarget::Note(note_id),
            sources: 1,
            edges_deleted: deleted,
            edges_computed: computed.len(),
            edges_inserted: inserted,
            chunks,
            duration_ms: started_at.elapsed().as_millis(),
        })
    }

    fn insert_chunked(
        &self,
        scope: ScopeId,
        links: &[NoteLink],
    ) -> MaterializeResult<(usize, usize)> {
        let mut inserted = 0;
        let mut chunks = 0;
        for chunk in links.chunks(self.options.chunk_size) {
            if self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled) {
                return Err(MaterializeError::Cancelled { scope, inserted });
            }
            inserted += self.links.insert_links(chunk)?;
            chunks += 1;
        }
        Ok((inserted, chunks))
    }
}

fn log_outcome(
    target: &str,
    scope: ScopeId,
    started_at: Instant,
    result: &MaterializeResult<RebuildReport>,
) {
    let duration_ms = started_at.elapsed().as_millis();
    match result {
        Ok(report) => info!(
            "event=graph_rebuild module=materializer status=ok target={target} scope={scope} sources={} deleted={} computed={} inserted={} chunks={} duration_ms={duration_ms}",
            report.sources,
            report.edges_deleted,
            report.edges_computed,
            report.edges_inserted,
            report.chunks
        ),
        Err(MaterializeError::Cancelled { inserted, .. }) => warn!(
            "event=graph_rebuild module=materializer status=cancelled target={target} scope={scope} inserted={inserted} duration_ms={duration_ms}"
        ),
        Err(err) => error!(
            "event=graph_rebuild module=materializer status=error target={target} scope={scope} duration_ms={duration_ms} error={err}"
        ),
    }
}

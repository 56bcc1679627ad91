//! Naive-vs-indexed benchmark harness.
//!
//! # Responsibility
//! - Seed a synthetic scope whose notes reference each other through both
//!   wikilink representations.
//! - Materialize once, then time naive recomputation against indexed reads
//!   and report the speedup.
//!
//! # Invariants
//! - Seeding writes notes in bounded transactions.
//! - The report records whether both modes produced the same edge set; a
//!   mismatch is a data-integrity bug, not a benchmark result.

use crate::model::note::{ScopeId, SubjectId};
use crate::repo::link_repo::SqliteLinkRepository;
use crate::repo::note_repo::SqliteNoteRepository;
use crate::repo::RepoError;
use crate::service::graph_query::{GraphQueryError, GraphQueryService, QueryMode, ScopeGraph};
use crate::service::materializer::{LinkMaterializer, MaterializeError, MaterializeOptions};
use log::{error, info};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Notes written per seeding transaction.
const SEED_CHUNK: usize = 500;
/// Offset of the mark-form reference target.
const FAR_LINK_OFFSET: usize = 137;

pub type BenchResult<T> = Result<T, BenchError>;

#[derive(Debug)]
pub enum BenchError {
    Repo(RepoError),
    Materialize(MaterializeError),
    Query(GraphQueryError),
}

impl Display for BenchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "benchmark seeding failed: {err}"),
            Self::Materialize(err) => write!(f, "benchmark materialization failed: {err}"),
            Self::Query(err) => write!(f, "benchmark query failed: {err}"),
        }
    }
}

impl Error for BenchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Materialize(err) => Some(err),
            Self::Query(err) => Some(err),
        }
    }
}

impl From<RepoError> for BenchError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<rusqlite::Error> for BenchError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(value.into())
    }
}

impl From<MaterializeError> for BenchError {
    fn from(value: MaterializeError) -> Self {
        Self::Materialize(value)
    }
}

impl From<GraphQueryError> for BenchError {
    fn from(value: GraphQueryError) -> Self {
        Self::Query(value)
    }
}

/// Shape of the synthetic scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedPlan {
    pub email: String,
    pub notes: usize,
    /// Approximate total references; each note carries at most two.
    pub references: usize,
    /// Plain paragraphs added to every note to inflate content volume.
    pub filler_paragraphs: usize,
}

impl Default for SeedPlan {
    fn default() -> Self {
        Self {
            email: "bench@notegraph.local".to_string(),
            notes: 5_000,
            references: 10_000,
            filler_paragraphs: 0,
        }
    }
}

/// Identity and size of a seeded scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeededScope {
    pub scope: ScopeId,
    pub subject: SubjectId,
    pub notes: usize,
    pub references: usize,
}

/// Benchmark outcome, serialized as the harness output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub notes: usize,
    pub edges: usize,
    pub naive_ms: f64,
    pub indexed_ms: f64,
    pub speedup: f64,
    pub edge_sets_match: bool,
    pub timestamp_ms: u128,
}

/// Seeds one user + subject with `plan.notes` notes titled `Note 1..N`.
///
/// Note `i` links to `i+1` in node form and to `i+137` in mark form (both
/// wrapping) until `plan.references` references are placed.
pub fn seed_synthetic_scope(conn: &Connection, plan: &SeedPlan) -> BenchResult<SeededScope> {
    let started_at = Instant::now();
    let repo = SqliteNoteRepository::try_new(conn)?;
    let scope = repo.create_user(&plan.email)?;
    let subject = repo.create_subject(scope, "Benchmark Subject")?;

    let titles: Vec<String> = (1..=plan.notes).map(|n| format!("Note {n}")).collect();
    let mut placed = 0;
    for (chunk_index, chunk) in titles.chunks(SEED_CHUNK).enumerate() {
        let tx = conn.unchecked_transaction()?;
        for (offset, title) in chunk.iter().enumerate() {
            let index = chunk_index * SEED_CHUNK + offset;
            let mut targets = Vec::with_capacity(2);
            for step in [1, FAR_LINK_OFFSET] {
                if placed < plan.references {
                    targets.push(titles[(index + step) % titles.len()].as_str());
                    placed += 1;
                }
            }
            let content = synthetic_document(index + 1, &targets, plan.filler_paragraphs);
            repo.create_note(subject, title, &content)?;
        }
        tx.commit()?;
    }

    info!(
        "event=bench_seed module=bench status=ok notes={} references={placed} duration_ms={}",
        plan.notes,
        started_at.elapsed().as_millis()
    );
    Ok(SeededScope {
        scope,
        subject,
        notes: plan.notes,
        references: placed,
    })
}

/// Builds one synthetic document. The first target is embedded in node form,
/// the second in mark form.
pub fn synthetic_document(ordinal: usize, targets: &[&str], filler_paragraphs: usize) -> Value {
    let mut content = vec![paragraph(json!({
        "type": "text",
        "text": format!("Seeded note {ordinal}")
    }))];
    for (position, target) in targets.iter().enumerate() {
        if position % 2 == 0 {
            content.push(json!({ "type": "wikilink", "attrs": { "title": target } }));
        } else {
            content.push(paragraph(json!({
                "type": "text",
                "text": "More",
                "marks": [{ "type": "wikilink", "attrs": { "title": target } }]
            })));
        }
    }
    for line in 0..filler_paragraphs {
        content.push(paragraph(json!({
            "type": "text",
            "text": format!("Filler line {line} with [[Not a link]] text for note {ordinal}.")
        })));
    }
    json!({ "type": "doc", "content": content })
}

fn paragraph(child: Value) -> Value {
    json!({ "type": "paragraph", "content": [child] })
}

/// Materializes `scope` once, warms both paths, then times one naive and one
/// indexed scope-graph read.
pub fn run_benchmark(
    conn: &Connection,
    scope: ScopeId,
    options: MaterializeOptions,
    warmup_rounds: usize,
) -> BenchResult<BenchmarkReport> {
    let materializer = LinkMaterializer::new(
        SqliteNoteRepository::try_new(conn)?,
        SqliteLinkRepository::try_new(conn)?,
    )
    .with_options(options);
    let rebuild = materializer.rebuild_scope(scope)?;

    let queries = GraphQueryService::new(
        SqliteNoteRepository::try_new(conn)?,
        SqliteLinkRepository::try_new(conn)?,
    );
    for _ in 0..warmup_rounds {
        queries.scope_graph(scope, None, QueryMode::Naive)?;
        queries.scope_graph(scope, None, QueryMode::Indexed)?;
    }

    let (naive, naive_ms) = timed(|| queries.scope_graph(scope, None, QueryMode::Naive))?;
    let (indexed, indexed_ms) = timed(|| queries.scope_graph(scope, None, QueryMode::Indexed))?;

    let edge_sets_match = same_edges(&naive, &indexed);
    if !edge_sets_match {
        error!(
            "event=bench_compare module=bench status=error scope={scope} naive_edges={} indexed_edges={}",
            naive.edges.len(),
            indexed.edges.len()
        );
    }

    let report = BenchmarkReport {
        notes: rebuild.sources,
        edges: indexed.edges.len(),
        naive_ms,
        indexed_ms,
        speedup: naive_ms / indexed_ms.max(0.001),
        edge_sets_match,
        timestamp_ms: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_millis()),
    };
    info!(
        "event=bench_run module=bench status=ok scope={scope} edges={} naive_ms={:.3} indexed_ms={:.3} speedup={:.2}",
        report.edges, report.naive_ms, report.indexed_ms, report.speedup
    );
    Ok(report)
}

fn timed<T, E>(run: impl FnOnce() -> Result<T, E>) -> Result<(T, f64), E> {
    let started_at = Instant::now();
    let value = run()?;
    Ok((value, started_at.elapsed().as_secs_f64() * 1000.0))
}

fn same_edges(left: &ScopeGraph, right: &ScopeGraph) -> bool {
    left.sorted_edges() == right.sorted_edges()
}

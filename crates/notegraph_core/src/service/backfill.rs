//! Offline backfill driver: rebuild every scope in the store.
//!
//! # Invariants
//! - Each scope is rebuilt independently; a failing scope is recorded and the
//!   driver moves on.
//! - Re-running the driver converges every scope, including ones that failed
//!   or were cancelled previously.

use crate::model::note::ScopeId;
use crate::repo::link_repo::NoteLinkRepository;
use crate::repo::note_repo::NoteSourceRepository;
use crate::repo::RepoResult;
use crate::service::materializer::{LinkMaterializer, MaterializeError, RebuildReport};
use log::{info, warn};
use std::time::Instant;

/// Result of rebuilding one scope.
#[derive(Debug)]
pub struct ScopeOutcome {
    pub scope: ScopeId,
    pub result: Result<RebuildReport, MaterializeError>,
}

/// Per-scope outcomes of one backfill pass, in scope order.
#[derive(Debug, Default)]
pub struct BackfillSummary {
    pub outcomes: Vec<ScopeOutcome>,
}

impl BackfillSummary {
    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.result.is_ok())
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Total edges stored across successful scopes.
    pub fn edges_inserted(&self) -> usize {
        self.outcomes
            .iter()
            .filter_map(|outcome| outcome.result.as_ref().ok())
            .map(|report| report.edges_inserted)
            .sum()
    }

    pub fn failed_scopes(&self) -> Vec<ScopeId> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.result.is_err())
            .map(|outcome| outcome.scope)
            .collect()
    }
}

/// Rebuilds every scope known to the note store.
///
/// Only a failure to list scopes aborts the pass.
pub fn backfill_all_scopes<N, L>(
    materializer: &LinkMaterializer<N, L>,
) -> RepoResult<BackfillSummary>
where
    N: NoteSourceRepository,
    L: NoteLinkRepository,
{
    let scopes = materializer.note_repository().list_scopes()?;
    backfill_scopes(materializer, &scopes)
}

/// Rebuilds the given scopes one after another.
pub fn backfill_scopes<N, L>(
    materializer: &LinkMaterializer<N, L>,
    scopes: &[ScopeId],
) -> RepoResult<BackfillSummary>
where
    N: NoteSourceRepository,
    L: NoteLinkRepository,
{
    let started_at = Instant::now();
    info!(
        "event=backfill module=backfill status=start scopes={}",
        scopes.len()
    );

    let mut summary = BackfillSummary::default();
    for &scope in scopes {
        let result = materializer.rebuild_scope(scope);
        if let Err(err) = &result {
            warn!("event=backfill_scope module=backfill status=error scope={scope} error={err}");
        }
        summary.outcomes.push(ScopeOutcome { scope, result });
    }

    info!(
        "event=backfill module=backfill status=ok scopes={} succeeded={} failed={} edges={} duration_ms={}",
        scopes.len(),
        summary.succeeded(),
        summary.failed(),
        summary.edges_inserted(),
        started_at.elapsed().as_millis()
    );
    Ok(summary)
}

use notegraph_core::db::{open_db, open_db_in_memory};
use notegraph_core::{
    backfill_all_scopes, CancelFlag, GraphNode, LinkMaterializer, LinkedNote, MaterializeError,
    MaterializeOptions, NoteId, NoteLink, NoteLinkRepository, NoteSource, NoteSourceRepository,
    RepoError, RepoResult, ScopeId, ScopeLocks, SqliteLinkRepository, SqliteNoteRepository,
    SubjectId,
};
use rusqlite::Connection;
use serde_json::{json, Value};
use std::cell::Cell;
use std::collections::BTreeSet;
use std::thread;

/// Fails the `fail_on`-th insert chunk (1-based) and optionally cancels
/// after the first one.
struct FaultyLinks<'conn> {
    inner: SqliteLinkRepository<'conn>,
    fail_on: Option<usize>,
    cancel_after_first: Option<CancelFlag>,
    calls: Cell<usize>,
}

impl<'conn> FaultyLinks<'conn> {
    fn failing(conn: &'conn Connection, fail_on: usize) -> Self {
        Self {
            inner: SqliteLinkRepository::try_new(conn).unwrap(),
            fail_on: Some(fail_on),
            cancel_after_first: None,
            calls: Cell::new(0),
        }
    }

    fn cancelling(conn: &'conn Connection, flag: CancelFlag) -> Self {
        Self {
            inner: SqliteLinkRepository::try_new(conn).unwrap(),
            fail_on: None,
            cancel_after_first: Some(flag),
            calls: Cell::new(0),
        }
    }
}

impl NoteLinkRepository for FaultyLinks<'_> {
    fn delete_links_from_scope(&self, scope: ScopeId) -> RepoResult<usize> {
        self.inner.delete_links_from_scope(scope)
    }

    fn delete_links_from_note(&self, note_id: NoteId) -> RepoResult<usize> {
        self.inner.delete_links_from_note(note_id)
    }

    fn insert_links(&self, links: &[NoteLink]) -> RepoResult<usize> {
        let call = self.calls.get() + 1;
        self.calls.set(call);
        if self.fail_on == Some(call) {
            return Err(RepoError::InvalidData("injected insert failure".to_string()));
        }
        let inserted = self.inner.insert_links(links)?;
        if let Some(flag) = &self.cancel_after_first {
            flag.cancel();
        }
        Ok(inserted)
    }

    fn list_scope_links(
        &self,
        scope: ScopeId,
        subject: Option<SubjectId>,
    ) -> RepoResult<Vec<NoteLink>> {
        self.inner.list_scope_links(scope, subject)
    }

    fn list_outbound_links(&self, note_id: NoteId) -> RepoResult<Vec<NoteLink>> {
        self.inner.list_outbound_links(note_id)
    }

    fn list_backlinks(&self, note_id: NoteId) -> RepoResult<Vec<NoteLink>> {
        self.inner.list_backlinks(note_id)
    }

    fn list_backlink_notes(&self, note_id: NoteId) -> RepoResult<Vec<LinkedNote>> {
        self.inner.list_backlink_notes(note_id)
    }
}

/// Refuses to load notes for one scope.
struct BrokenScopeNotes<'conn> {
    inner: SqliteNoteRepository<'conn>,
    broken: ScopeId,
}

impl NoteSourceRepository for BrokenScopeNotes<'_> {
    fn list_scopes(&self) -> RepoResult<Vec<ScopeId>> {
        self.inner.list_scopes()
    }

    fn note_scope(&self, note_id: NoteId) -> RepoResult<Option<ScopeId>> {
        self.inner.note_scope(note_id)
    }

    fn list_scope_notes(&self, scope: ScopeId) -> RepoResult<Vec<NoteSource>> {
        if scope == self.broken {
            return Err(RepoError::InvalidData("injected read failure".to_string()));
        }
        self.inner.list_scope_notes(scope)
    }

    fn list_scope_nodes(
        &self,
        scope: ScopeId,
        subject: Option<SubjectId>,
    ) -> RepoResult<Vec<GraphNode>> {
        self.inner.list_scope_nodes(scope, subject)
    }
}

#[test]
fn failed_chunk_leaves_subset_and_rerun_converges() {
    let conn = open_db_in_memory().unwrap();
    let scope = seed_chain(&conn, "faulty@test.com", 8);
    let expected = rebuild_healthy(&conn, scope);
    assert_eq!(expected.len(), 7);

    let faulty = LinkMaterializer::new(
        SqliteNoteRepository::try_new(&conn).unwrap(),
        FaultyLinks::failing(&conn, 2),
    )
    .with_options(MaterializeOptions::with_chunk_size(3))
    .with_locks(ScopeLocks::default());
    let err = faulty.rebuild_scope(scope).unwrap_err();
    assert!(matches!(err, MaterializeError::Repo(_)));

    let partial = stored_edges(&conn);
    assert_eq!(partial.len(), 3);
    assert!(partial.is_subset(&expected));

    assert_eq!(rebuild_healthy(&conn, scope), expected);
}

#[test]
fn cancellation_between_chunks_under_represents_then_heals() {
    let conn = open_db_in_memory().unwrap();
    let scope = seed_chain(&conn, "cancel@test.com", 6);
    let expected = rebuild_healthy(&conn, scope);

    let flag = CancelFlag::new();
    let cancelling = LinkMaterializer::new(
        SqliteNoteRepository::try_new(&conn).unwrap(),
        FaultyLinks::cancelling(&conn, flag.clone()),
    )
    .with_options(MaterializeOptions::with_chunk_size(2))
    .with_locks(ScopeLocks::default())
    .with_cancel_flag(flag.clone());

    match cancelling.rebuild_scope(scope).unwrap_err() {
        MaterializeError::Cancelled {
            scope: cancelled,
            inserted,
        } => {
            assert_eq!(cancelled, scope);
            assert_eq!(inserted, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(flag.is_cancelled());
    let partial = stored_edges(&conn);
    assert_eq!(partial.len(), 2);
    assert!(partial.is_subset(&expected));

    assert_eq!(rebuild_healthy(&conn, scope), expected);
}

#[test]
fn pre_cancelled_rebuild_writes_nothing() {
    let conn = open_db_in_memory().unwrap();
    let scope = seed_chain(&conn, "precancel@test.com", 4);
    let flag = CancelFlag::new();
    flag.cancel();

    let err = LinkMaterializer::new(
        SqliteNoteRepository::try_new(&conn).unwrap(),
        SqliteLinkRepository::try_new(&conn).unwrap(),
    )
    .with_locks(ScopeLocks::default())
    .with_cancel_flag(flag)
    .rebuild_scope(scope)
    .unwrap_err();

    assert!(matches!(err, MaterializeError::Cancelled { inserted: 0, .. }));
    assert!(stored_edges(&conn).is_empty());
}

#[test]
fn concurrent_rebuilds_of_one_scope_converge() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("concurrent.db");
    let conn = open_db(&path).unwrap();
    let scope = seed_chain(&conn, "concurrent@test.com", 40);
    let expected = rebuild_healthy(&conn, scope);
    let locks = ScopeLocks::default();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let path = path.clone();
            let locks = locks.clone();
            thread::spawn(move || {
                let conn = open_db(&path).unwrap();
                let materializer = LinkMaterializer::new(
                    SqliteNoteRepository::try_new(&conn).unwrap(),
                    SqliteLinkRepository::try_new(&conn).unwrap(),
                )
                .with_options(MaterializeOptions::with_chunk_size(5))
                .with_locks(locks);
                for _ in 0..5 {
                    let report = materializer.rebuild_scope(scope).unwrap();
                    assert_eq!(report.edges_inserted, 39);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(stored_edges(&conn), expected);
    assert!(locks.is_empty());
}

#[test]
fn backfill_isolates_failing_scope_and_rerun_converges() {
    let conn = open_db_in_memory().unwrap();
    let healthy = seed_chain(&conn, "healthy@test.com", 5);
    let broken = seed_chain(&conn, "broken@test.com", 3);
    let empty = seed_chain(&conn, "empty@test.com", 0);

    let flaky = LinkMaterializer::new(
        BrokenScopeNotes {
            inner: SqliteNoteRepository::try_new(&conn).unwrap(),
            broken,
        },
        SqliteLinkRepository::try_new(&conn).unwrap(),
    )
    .with_locks(ScopeLocks::default());
    let summary = backfill_all_scopes(&flaky).unwrap();

    assert_eq!(summary.outcomes.len(), 3);
    assert_eq!(summary.succeeded(), 2);
    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.failed_scopes(), vec![broken]);
    assert_eq!(summary.edges_inserted(), 4);
    assert_eq!(stored_edges(&conn).len(), 4);

    let materializer = LinkMaterializer::new(
        SqliteNoteRepository::try_new(&conn).unwrap(),
        SqliteLinkRepository::try_new(&conn).unwrap(),
    )
    .with_locks(ScopeLocks::default());
    let rerun = backfill_all_scopes(&materializer).unwrap();

    assert_eq!(rerun.failed(), 0);
    assert_eq!(rerun.edges_inserted(), 6);
    assert_eq!(stored_edges(&conn).len(), 6);
    let scopes: BTreeSet<_> = rerun.outcomes.iter().map(|outcome| outcome.scope).collect();
    assert_eq!(scopes, BTreeSet::from([healthy, broken, empty]));
}

/// Seeds `Step 1 -> Step 2 -> ... -> Step n` in a fresh scope.
fn seed_chain(conn: &Connection, email: &str, notes: usize) -> ScopeId {
    let repo = SqliteNoteRepository::try_new(conn).unwrap();
    let scope = repo.create_user(email).unwrap();
    let subject = repo.create_subject(scope, "Chain").unwrap();
    for n in 1..=notes {
        let content = if n < notes {
            doc(vec![node_link(&format!("Step {}", n + 1))])
        } else {
            doc(vec![])
        };
        repo.create_note(subject, &format!("Step {n}"), &content)
            .unwrap();
    }
    scope
}

fn rebuild_healthy(conn: &Connection, scope: ScopeId) -> BTreeSet<NoteLink> {
    LinkMaterializer::new(
        SqliteNoteRepository::try_new(conn).unwrap(),
        SqliteLinkRepository::try_new(conn).unwrap(),
    )
    .with_locks(ScopeLocks::default())
    .rebuild_scope(scope)
    .unwrap();
    stored_edges(conn)
}

fn stored_edges(conn: &Connection) -> BTreeSet<NoteLink> {
    let mut stmt = conn
        .prepare("SELECT from_note_id, to_note_id FROM note_links;")
        .unwrap();
    let rows = stmt
        .query_map([], |row| {
            let from: String = row.get(0)?;
            let to: String = row.get(1)?;
            Ok((from, to))
        })
        .unwrap();
    rows.map(|row| {
        let (from, to) = row.unwrap();
        NoteLink::new(from.parse().unwrap(), to.parse().unwrap())
    })
    .collect()
}

fn doc(content: Vec<Value>) -> Value {
    json!({ "type": "doc", "content": content })
}

fn node_link(title: &str) -> Value {
    json!({ "type": "wikilink", "attrs": { "title": title } })
}

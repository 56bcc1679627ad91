//! Materialized edge store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Bulk delete edges by source scope or source note.
//! - Insert one bounded chunk of edges per transaction.
//! - Serve scope, outbound, and backlink queries from `note_links`.
//!
//! # Invariants
//! - Inserts use `INSERT OR IGNORE`; re-inserting an existing pair is a no-op.
//! - Deletes are bounded by source; they never touch another scope's edges.

use crate::model::note::{LinkedNote, NoteId, NoteLink, ScopeId, SubjectId};
use crate::repo::{ensure_connection_ready, parse_uuid, RepoResult};
use rusqlite::{params, Connection, Row};

/// Edge store contract consumed by materialization and indexed queries.
pub trait NoteLinkRepository {
    /// Deletes every edge whose source note belongs to `scope`.
    fn delete_links_from_scope(&self, scope: ScopeId) -> RepoResult<usize>;
    /// Deletes every edge whose source is `note_id`.
    fn delete_links_from_note(&self, note_id: NoteId) -> RepoResult<usize>;
    /// Inserts one chunk atomically, ignoring pairs that already exist.
    ///
    /// Returns the number of newly stored rows.
    fn insert_links(&self, links: &[NoteLink]) -> RepoResult<usize>;
    /// Lists edges whose source is in `scope`, optionally narrowed to sources
    /// in one subject.
    fn list_scope_links(
        &self,
        scope: ScopeId,
        subject: Option<SubjectId>,
    ) -> RepoResult<Vec<NoteLink>>;
    fn list_outbound_links(&self, note_id: NoteId) -> RepoResult<Vec<NoteLink>>;
    fn list_backlinks(&self, note_id: NoteId) -> RepoResult<Vec<NoteLink>>;
    /// Lists source notes linking to `note_id`, restricted to the same scope.
    fn list_backlink_notes(&self, note_id: NoteId) -> RepoResult<Vec<LinkedNote>>;
}

/// SQLite-backed edge store.
pub struct SqliteLinkRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteLinkRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, &["notes", "subjects", "note_links"])?;
        Ok(Self { conn })
    }

    /// Total edge rows across all scopes.
    pub fn count_links(&self) -> RepoResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM note_links;", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn query_links(&self, sql: &str, param: &str) -> RepoResult<Vec<NoteLink>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([param])?;
        let mut links = Vec::new();
        while let Some(row) = rows.next()? {
            links.push(parse_link_row(row)?);
        }
        Ok(links)
    }
}

impl NoteLinkRepository for SqliteLinkRepository<'_> {
    fn delete_links_from_scope(&self, scope: ScopeId) -> RepoResult<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM note_links
             WHERE from_note_id IN (
                SELECT n.id
                FROM notes n
                INNER JOIN subjects s ON s.id = n.subject_id
                WHERE s.user_id = ?1
             );",
            [scope.to_string()],
        )?;
        Ok(deleted)
    }

    fn delete_links_from_note(&self, note_id: NoteId) -> RepoResult<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM note_links WHERE from_note_id = ?1;",
            [note_id.to_string()],
        )?;
        Ok(deleted)
    }

    fn insert_links(&self, links: &[NoteLink]) -> RepoResult<usize> {
        if links.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.unchecked_transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO note_links (from_note_id, to_note_id)
                 VALUES (?1, ?2);",
            )?;
            for link in links {
                inserted += stmt.execute(params![
                    link.from_note_id.to_string(),
                    link.to_note_id.to_string()
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    fn list_scope_links(
        &self,
        scope: ScopeId,
        subject: Option<SubjectId>,
    ) -> RepoResult<Vec<NoteLink>> {
        let mut stmt = self.conn.prepare(
            "SELECT l.from_note_id, l.to_note_id
             FROM note_links l
             INNER JOIN notes n ON n.id = l.from_note_id
             INNER JOIN subjects s ON s.id = n.subject_id
             WHERE s.user_id = ?1
               AND (?2 IS NULL OR n.subject_id = ?2)
             ORDER BY l.from_note_id ASC, l.to_note_id ASC;",
        )?;
        let mut rows = stmt.query(params![
            scope.to_string(),
            subject.map(|id| id.to_string())
        ])?;
        let mut links = Vec::new();
        while let Some(row) = rows.next()? {
            links.push(parse_link_row(row)?);
        }
        Ok(links)
    }

    fn list_outbound_links(&self, note_id: NoteId) -> RepoResult<Vec<NoteLink>> {
        self.query_links(
            "SELECT from_note_id, to_note_id
             FROM note_links
             WHERE from_note_id = ?1
             ORDER BY to_note_id ASC;",
            &note_id.to_string(),
        )
    }

    fn list_backlinks(&self, note_id: NoteId) -> RepoResult<Vec<NoteLink>> {
        self.query_links(
            "SELECT from_note_id, to_note_id
             FROM note_links
             WHERE to_note_id = ?1
             ORDER BY from_note_id ASC;",
            &note_id.to_string(),
        )
    }

    fn list_backlink_notes(&self, note_id: NoteId) -> RepoResult<Vec<LinkedNote>> {
        let mut stmt = self.conn.prepare(
            "SELECT src.id, src.subject_id, src.title, src.updated_at
             FROM note_links l
             INNER JOIN notes src ON src.id = l.from_note_id
             INNER JOIN subjects src_subject ON src_subject.id = src.subject_id
             INNER JOIN notes dst ON dst.id = l.to_note_id
             INNER JOIN subjects dst_subject ON dst_subject.id = dst.subject_id
             WHERE l.to_note_id = ?1
               AND src_subject.user_id = dst_subject.user_id
             ORDER BY src.updated_at DESC, src.id ASC;",
        )?;
        let mut rows = stmt.query([note_id.to_string()])?;
        let mut notes = Vec::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get("id")?;
            let subject_id: String = row.get("subject_id")?;
            notes.push(LinkedNote {
                id: parse_uuid(&id, "notes.id")?,
                subject_id: parse_uuid(&subject_id, "notes.subject_id")?,
                title: row.get("title")?,
                updated_at: row.get("updated_at")?,
            });
        }
        Ok(notes)
    }
}

fn parse_link_row(row: &Row<'_>) -> RepoResult<NoteLink> {
    let from: String = row.get("from_note_id")?;
    let to: String = row.get("to_note_id")?;
    Ok(NoteLink::new(
        parse_uuid(&from, "note_links.from_note_id")?,
        parse_uuid(&to, "note_links.to_note_id")?,
    ))
}

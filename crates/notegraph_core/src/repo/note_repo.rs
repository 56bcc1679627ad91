//! Note source repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - List notes per scope (id, subject, title, parsed content) for graph
//!   derivation.
//! - Provide the user/subject/note write helpers that stand in for the
//!   external CRUD layer (seeding, tests, benchmarks).
//!
//! # Invariants
//! - Scope membership is always `notes -> subjects -> users`.
//! - Unparseable stored content is surfaced as `content = None`, never as an
//!   error, so one broken note cannot block a scope rebuild.

use crate::model::document::parse_document;
use crate::model::note::{GraphNode, NoteId, NoteSource, ScopeId, SubjectId};
use crate::repo::{ensure_connection_ready, parse_uuid, RepoError, RepoResult};
use log::warn;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use uuid::Uuid;

const NOTE_SOURCE_SELECT_SQL: &str = "SELECT
    n.id,
    n.subject_id,
    n.title,
    n.content
FROM notes n
INNER JOIN subjects s ON s.id = n.subject_id";

/// Note store contract consumed by materialization and naive queries.
pub trait NoteSourceRepository {
    /// Lists every scope (user) that owns at least one subject.
    fn list_scopes(&self) -> RepoResult<Vec<ScopeId>>;
    /// Resolves the owning scope of one note.
    fn note_scope(&self, note_id: NoteId) -> RepoResult<Option<ScopeId>>;
    /// Lists all notes in scope with parsed content, ordered by id.
    fn list_scope_notes(&self, scope: ScopeId) -> RepoResult<Vec<NoteSource>>;
    /// Lists graph nodes in scope, optionally narrowed to one subject.
    fn list_scope_nodes(
        &self,
        scope: ScopeId,
        subject: Option<SubjectId>,
    ) -> RepoResult<Vec<GraphNode>>;
}

/// SQLite-backed note source repository.
pub struct SqliteNoteRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteNoteRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, &["users", "subjects", "notes"])?;
        Ok(Self { conn })
    }

    /// Creates one user and returns its id (the scope id).
    pub fn create_user(&self, email: &str) -> RepoResult<ScopeId> {
        let id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO users (id, email) VALUES (?1, ?2);",
            params![id.to_string(), email],
        )?;
        Ok(id)
    }

    /// Creates one subject owned by `user_id`.
    pub fn create_subject(&self, user_id: ScopeId, name: &str) -> RepoResult<SubjectId> {
        let id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO subjects (id, user_id, name) VALUES (?1, ?2, ?3);",
            params![id.to_string(), user_id.to_string(), name],
        )?;
        Ok(id)
    }

    /// Creates one note with a JSON document body.
    pub fn create_note(
        &self,
        subject_id: SubjectId,
        title: &str,
        content: &Value,
    ) -> RepoResult<NoteId> {
        let id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO notes (id, subject_id, title, content) VALUES (?1, ?2, ?3, ?4);",
            params![
                id.to_string(),
                subject_id.to_string(),
                title,
                content.to_string()
            ],
        )?;
        Ok(id)
    }

    /// Stores raw content text as-is. Used to model corrupted rows.
    pub fn write_raw_content(&self, note_id: NoteId, raw: &str) -> RepoResult<()> {
        self.touch_note(
            note_id,
            "UPDATE notes SET content = ?2, updated_at = (strftime('%s', 'now') * 1000) WHERE id = ?1;",
            raw,
        )
    }

    /// Replaces note content. Outbound edges go stale until the next rebuild.
    pub fn update_note_content(&self, note_id: NoteId, content: &Value) -> RepoResult<()> {
        self.write_raw_content(note_id, &content.to_string())
    }

    /// Renames one note. Inbound edges go stale until the next rebuild.
    pub fn rename_note(&self, note_id: NoteId, title: &str) -> RepoResult<()> {
        self.touch_note(
            note_id,
            "UPDATE notes SET title = ?2, updated_at = (strftime('%s', 'now') * 1000) WHERE id = ?1;",
            title,
        )
    }

    /// Hard-deletes one note; its edges cascade in both directions.
    pub fn delete_note(&self, note_id: NoteId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM notes WHERE id = ?1;", [note_id.to_string()])?;
        if changed == 0 {
            return Err(RepoError::NotFound(note_id));
        }
        Ok(())
    }

    fn touch_note(&self, note_id: NoteId, sql: &str, value: &str) -> RepoResult<()> {
        let changed = self
            .conn
            .execute(sql, params![note_id.to_string(), value])?;
        if changed == 0 {
            return Err(RepoError::NotFound(note_id));
        }
        Ok(())
    }
}

impl NoteSourceRepository for SqliteNoteRepository<'_> {
    fn list_scopes(&self) -> RepoResult<Vec<ScopeId>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT user_id
             FROM subjects
             ORDER BY user_id ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut scopes = Vec::new();
        while let Some(row) = rows.next()? {
            let value: String = row.get(0)?;
            scopes.push(parse_uuid(&value, "subjects.user_id")?);
        }
        Ok(scopes)
    }

    fn note_scope(&self, note_id: NoteId) -> RepoResult<Option<ScopeId>> {
        let user_id: Option<String> = self
            .conn
            .query_row(
                "SELECT s.user_id
                 FROM notes n
                 INNER JOIN subjects s ON s.id = n.subject_id
                 WHERE n.id = ?1;",
                [note_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        user_id
            .map(|value| parse_uuid(&value, "subjects.user_id"))
            .transpose()
    }

    fn list_scope_notes(&self, scope: ScopeId) -> RepoResult<Vec<NoteSource>> {
        let mut stmt = self.conn.prepare(&format!(
            "{NOTE_SOURCE_SELECT_SQL}
             WHERE s.user_id = ?1
             ORDER BY n.id ASC;"
        ))?;
        let mut rows = stmt.query([scope.to_string()])?;
        let mut notes = Vec::new();
        while let Some(row) = rows.next()? {
            notes.push(parse_note_source_row(row)?);
        }
        Ok(notes)
    }

    fn list_scope_nodes(
        &self,
        scope: ScopeId,
        subject: Option<SubjectId>,
    ) -> RepoResult<Vec<GraphNode>> {
        let mut stmt = self.conn.prepare(
            "SELECT n.id, n.subject_id, n.title
             FROM notes n
             INNER JOIN subjects s ON s.id = n.subject_id
             WHERE s.user_id = ?1
               AND (?2 IS NULL OR n.subject_id = ?2)
             ORDER BY n.id ASC;",
        )?;
        let mut rows = stmt.query(params![
            scope.to_string(),
            subject.map(|id| id.to_string())
        ])?;
        let mut nodes = Vec::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get("id")?;
            let subject_id: String = row.get("subject_id")?;
            nodes.push(GraphNode {
                id: parse_uuid(&id, "notes.id")?,
                subject_id: parse_uuid(&subject_id, "notes.subject_id")?,
                title: row.get("title")?,
            });
        }
        Ok(nodes)
    }
}

fn parse_note_source_row(row: &Row<'_>) -> RepoResult<NoteSource> {
    let id_text: String = row.get("id")?;
    let id = parse_uuid(&id_text, "notes.id")?;
    let subject_text: String = row.get("subject_id")?;
    let raw_content: String = row.get("content")?;

    let content = match parse_document(&raw_content) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(
                "event=note_content_parse module=repo status=skipped note_id={id} error={err}"
            );
            None
        }
    };

    Ok(NoteSource {
        id,
        subject_id: parse_uuid(&subject_text, "notes.subject_id")?,
        title: row.get("title")?,
        content,
    })
}

//! Domain model for notes, their document trees, and derived link edges.
//!
//! # Responsibility
//! - Define read models exchanged between repositories and graph services.
//! - Provide a typed, lenient view over editor-produced document JSON.
//!
//! # Invariants
//! - Notes, subjects, and users are identified by stable UUIDs.
//! - `NoteLink` values are derived state and never authored by hand.

pub mod document;
pub mod note;

//! Pure graph derivation: wikilink extraction and title resolution.
//!
//! # Responsibility
//! - Turn one document tree into normalized referenced titles.
//! - Resolve titles against a per-scope title index into `NoteLink` edges.
//!
//! # Invariants
//! - Nothing here touches storage; every function is safe to run in parallel.
//! - The title index is rebuilt from the authoritative note list per run.

pub mod extract;
pub mod title_index;

pub use extract::{extract_linked_titles, normalize_title, title_key};
pub use title_index::{compute_links, TitleIndex};

//! Graph use-case services.
//!
//! # Responsibility
//! - Orchestrate extraction, title resolution, and repositories into
//!   rebuild and query operations.
//! - Keep callers (CLI, future HTTP layer) decoupled from storage details.

pub mod backfill;
pub mod graph_query;
pub mod materializer;

//! Corpus persistence: JSON snapshots and CSV export.

pub mod corpus;
pub mod csv;

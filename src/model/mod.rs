//! Core data model types: mailboxes, decoded part trees, and corpus records.

pub mod address;
pub mod part;
pub mod record;

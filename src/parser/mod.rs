//! Raw stage: MIME decoding, header and body extraction, per-file record assembly.

pub mod body;
pub mod eml;
pub mod header;
pub mod mime;

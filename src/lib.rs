//! `spamsift`: turn a directory of raw spam/phishing `.eml` files into a
//! schema-stable JSON corpus.
//!
//! The pipeline has two stages. The raw stage decodes every message file
//! into a [`model::record::RawEmailRecord`], tolerating malformed input
//! and never dropping a file. The normalized stage derives one
//! [`model::record::NormalizedEmailRecord`] per raw record, with validated
//! addresses and UTC timestamps.

pub mod config;
pub mod error;
pub mod export;
pub mod model;
pub mod normalize;
pub mod parser;
pub mod pipeline;
pub mod report;

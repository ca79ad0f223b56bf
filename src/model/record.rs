//! Raw and normalized corpus records.
//!
//! Both record types always serialize every field. Absence is encoded
//! two ways on purpose: subject and bodies use the empty string, while
//! sender (normalized), ip, date_utc and error use `null`.

use serde::{Deserialize, Serialize};

/// One decoded email, as produced by the record assembler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEmailRecord {
    /// File identifier: path relative to the corpus root, `/`-separated.
    pub file: String,

    /// First `From:` header, encoded-words decoded. Empty if absent.
    pub sender: String,

    /// One entry per `To:` header occurrence, in message order.
    pub receivers: Vec<String>,

    /// First `Subject:` header, encoded-words decoded.
    pub subject: String,

    /// First `Date:` header, verbatim.
    pub date: String,

    /// Originating IPv4 address inferred from the `Received:` chain.
    pub ip: Option<String>,

    /// First `text/plain` part.
    pub body_text: String,

    /// First `text/html` part.
    pub body_html: String,

    /// Attachment filenames.
    pub attachments: Vec<String>,

    /// Attachment content types, index-aligned with `attachments`.
    pub attachment_types: Vec<String>,

    /// Set only when the file could not be decoded at all.
    pub error: Option<String>,
}

impl RawEmailRecord {
    /// A record with every field at its default and `error` set.
    pub fn failed(file: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Whether this record carries a file-level failure.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// A validated, canonical record derived from exactly one [`RawEmailRecord`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedEmailRecord {
    pub file: String,
    /// Validated lowercase address, or `null`.
    pub sender: Option<String>,
    /// Validated lowercase addresses, sorted and unique.
    pub receivers: Vec<String>,
    pub subject: String,
    /// Raw date, trimmed.
    pub date: String,
    /// RFC 3339 UTC timestamp (`+00:00`), or `null` if the date was unparseable.
    pub date_utc: Option<String>,
    pub ip: Option<String>,
    pub body_text: String,
    pub body_html: String,
    pub attachments: Vec<String>,
    pub attachment_types: Vec<String>,
    pub error: Option<String>,
}

impl NormalizedEmailRecord {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Outcome of assembling one file: a record, or the reason it failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Parsed(RawEmailRecord),
    Failed { file: String, error: String },
}

impl FileOutcome {
    /// The file identifier this outcome belongs to.
    pub fn file(&self) -> &str {
        match self {
            Self::Parsed(record) => &record.file,
            Self::Failed { file, .. } => file,
        }
    }

    /// Collapse into the fixed-schema record written to the raw corpus.
    pub fn into_record(self) -> RawEmailRecord {
        match self {
            Self::Parsed(record) => record,
            Self::Failed { file, error } => RawEmailRecord::failed(file, error),
        }
    }
}

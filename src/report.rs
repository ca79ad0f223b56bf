//! Corpus statistics for the end-of-run summary and the `stats` command.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::record::{NormalizedEmailRecord, RawEmailRecord};

/// A file that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedFile {
    pub file: String,
    pub error: String,
}

/// Aggregate counts over one corpus.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub failed: Vec<FailedFile>,
    pub with_attachments: usize,
    pub with_ip: usize,
    /// Records whose sender survived validation (raw: non-empty sender).
    pub with_sender: usize,
    /// Records with a parseable date (raw corpora are not date-checked).
    pub with_date: usize,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
    /// Bytes read from message files; zero when summarizing a snapshot.
    pub bytes_read: u64,
    pub top_senders: Vec<(String, usize)>,
    pub top_attachment_types: Vec<(String, usize)>,
}

const TOP_N: usize = 10;

impl RunSummary {
    /// Summarize a normalized corpus.
    pub fn from_normalized(records: &[NormalizedEmailRecord]) -> Self {
        let dates: Vec<DateTime<Utc>> = records
            .iter()
            .filter_map(|r| r.date_utc.as_deref())
            .filter_map(|d| DateTime::parse_from_rfc3339(d).ok())
            .map(|d| d.with_timezone(&Utc))
            .collect();
        let (oldest, newest) = date_range(&dates).unzip();

        Self {
            total: records.len(),
            failed: records
                .iter()
                .filter_map(|r| {
                    r.error.as_ref().map(|error| FailedFile {
                        file: r.file.clone(),
                        error: error.clone(),
                    })
                })
                .collect(),
            with_attachments: records.iter().filter(|r| !r.attachments.is_empty()).count(),
            with_ip: records.iter().filter(|r| r.ip.is_some()).count(),
            with_sender: records.iter().filter(|r| r.sender.is_some()).count(),
            with_date: dates.len(),
            oldest,
            newest,
            bytes_read: 0,
            top_senders: top_counts(records.iter().filter_map(|r| r.sender.as_deref()), TOP_N),
            top_attachment_types: top_counts(
                records
                    .iter()
                    .flat_map(|r| r.attachment_types.iter().map(String::as_str)),
                TOP_N,
            ),
        }
    }

    /// Summarize a raw corpus.
    pub fn from_raw(records: &[RawEmailRecord]) -> Self {
        Self {
            total: records.len(),
            failed: records
                .iter()
                .filter_map(|r| {
                    r.error.as_ref().map(|error| FailedFile {
                        file: r.file.clone(),
                        error: error.clone(),
                    })
                })
                .collect(),
            with_attachments: records.iter().filter(|r| !r.attachments.is_empty()).count(),
            with_ip: records.iter().filter(|r| r.ip.is_some()).count(),
            with_sender: records.iter().filter(|r| !r.sender.is_empty()).count(),
            top_senders: top_counts(
                records
                    .iter()
                    .map(|r| r.sender.as_str())
                    .filter(|s| !s.is_empty()),
                TOP_N,
            ),
            top_attachment_types: top_counts(
                records
                    .iter()
                    .flat_map(|r| r.attachment_types.iter().map(String::as_str)),
                TOP_N,
            ),
            ..Self::default()
        }
    }

    pub fn with_bytes_read(mut self, bytes: u64) -> Self {
        self.bytes_read = bytes;
        self
    }

    pub fn parsed(&self) -> usize {
        self.total - self.failed.len()
    }
}

/// Return the range (oldest, newest) across the given dates.
fn date_range(dates: &[DateTime<Utc>]) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let min = dates.iter().min()?;
    let max = dates.iter().max()?;
    Some((*min, *max))
}

/// Most frequent values, highest count first, ties broken alphabetically.
fn top_counts<'a>(values: impl Iterator<Item = &'a str>, n: usize) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for value in values {
        *counts.entry(value).or_default() += 1;
    }
    let mut sorted: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(value, count)| (value.to_string(), count))
        .collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    sorted.truncate(n);
    sorted
}

//! Normalized stage: validate and canonicalize one raw record at a time.
//!
//! Every function here is total. Field-level failures resolve to `None`
//! (or to an omitted entry) and never touch the rest of the record.

use std::collections::BTreeSet;

use chrono::SecondsFormat;

use crate::model::address::Mailbox;
use crate::model::record::{NormalizedEmailRecord, RawEmailRecord};
use crate::parser::header::parse_date;

/// Derive the normalized record for `raw`.
pub fn normalize_record(raw: &RawEmailRecord) -> NormalizedEmailRecord {
    NormalizedEmailRecord {
        file: raw.file.clone(),
        sender: normalize_sender(&raw.sender),
        receivers: normalize_receivers(&raw.receivers),
        subject: raw.subject.trim().to_string(),
        date: raw.date.trim().to_string(),
        date_utc: normalize_date(&raw.date),
        ip: raw.ip.clone().filter(|ip| !ip.trim().is_empty()),
        body_text: raw.body_text.trim().to_string(),
        body_html: raw.body_html.trim().to_string(),
        attachments: raw.attachments.clone(),
        attachment_types: normalize_attachment_types(&raw.attachment_types),
        error: raw.error.clone(),
    }
}

/// Parse a `From:` value as one mailbox and keep its address if valid.
pub fn normalize_sender(raw: &str) -> Option<String> {
    Mailbox::parse(raw).normalized_address()
}

/// Parse every raw `To:` value as a mailbox list; keep valid addresses,
/// lowercased, deduplicated and sorted.
pub fn normalize_receivers<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    raw.iter()
        .flat_map(|entry| Mailbox::parse_list(entry.as_ref()))
        .filter_map(|mailbox| mailbox.normalized_address())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Canonical UTC timestamp, e.g. `"2023-01-02T15:00:00+00:00"`.
pub fn normalize_date(raw: &str) -> Option<String> {
    parse_date(raw).map(|dt| dt.to_rfc3339_opts(SecondsFormat::AutoSi, false))
}

/// Trim and lowercase each content type.
pub fn normalize_attachment_types(raw: &[String]) -> Vec<String> {
    raw.iter().map(|t| t.trim().to_lowercase()).collect()
}

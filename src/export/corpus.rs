//! JSON corpus snapshots: write once after collection, read back leniently.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{IngestError, Result};
use crate::model::record::{NormalizedEmailRecord, RawEmailRecord};

/// Write a complete corpus as a JSON array.
///
/// Parent directories are created as needed. The file is written through a
/// temporary sibling and renamed into place, so readers never see a
/// half-written corpus.
pub fn write_corpus<T: Serialize>(records: &[T], path: &Path, pretty: bool) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| IngestError::io(parent, e))?;
    }

    let tmp_path = path.with_extension("json.partial");
    let file = File::create(&tmp_path).map_err(|e| IngestError::io(&tmp_path, e))?;
    let mut writer = BufWriter::new(file);

    let written = if pretty {
        serde_json::to_writer_pretty(&mut writer, records)
    } else {
        serde_json::to_writer(&mut writer, records)
    };
    written.map_err(|e| IngestError::corpus(path, e))?;
    writer.write_all(b"\n").map_err(|e| IngestError::io(&tmp_path, e))?;
    writer.flush().map_err(|e| IngestError::io(&tmp_path, e))?;
    drop(writer);

    std::fs::rename(&tmp_path, path).map_err(|e| IngestError::io(path, e))?;
    info!(path = %path.display(), records = records.len(), "Wrote corpus");
    Ok(())
}

/// Read a normalized corpus written by [`write_corpus`].
pub fn read_normalized_corpus(path: &Path) -> Result<Vec<NormalizedEmailRecord>> {
    let file = File::open(path).map_err(|e| IngestError::io(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| IngestError::corpus(path, e))
}

/// Read a raw corpus, tolerating entries that do not match the schema.
///
/// Missing or mistyped fields fall back to their defaults, non-string
/// receivers become empty strings, and non-string attachment types are
/// dropped without touching `attachments`. Entries that are not JSON
/// objects are skipped.
pub fn read_raw_corpus(path: &Path) -> Result<Vec<RawEmailRecord>> {
    let file = File::open(path).map_err(|e| IngestError::io(path, e))?;
    let value: Value =
        serde_json::from_reader(BufReader::new(file)).map_err(|e| IngestError::corpus(path, e))?;

    let Value::Array(entries) = value else {
        return Err(IngestError::corpus(path, "expected a JSON array of records"));
    };

    let mut records = Vec::with_capacity(entries.len());
    for (position, entry) in entries.iter().enumerate() {
        match raw_record_from_value(entry) {
            Some(record) => records.push(record),
            None => warn!(position, "Skipping corpus entry that is not an object"),
        }
    }
    Ok(records)
}

/// Lenient conversion of one corpus entry.
pub fn raw_record_from_value(value: &Value) -> Option<RawEmailRecord> {
    let object = value.as_object()?;
    let text = |key: &str| {
        object
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let list = |key: &str| {
        object
            .get(key)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    };

    Some(RawEmailRecord {
        file: text("file"),
        sender: text("sender"),
        receivers: list("receivers")
            .iter()
            .map(|v| v.as_str().unwrap_or_default().to_string())
            .collect(),
        subject: text("subject"),
        date: text("date"),
        ip: object.get("ip").and_then(Value::as_str).map(str::to_string),
        body_text: text("body_text"),
        body_html: text("body_html"),
        attachments: list("attachments")
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        attachment_types: list("attachment_types")
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        error: match object.get("error") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        },
    })
}

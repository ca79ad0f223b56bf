//! Per-file record assembly for `.eml` samples.
//!
//! This is the failure boundary of the raw stage: whatever goes wrong while
//! reading or decoding one file ends up in that file's [`FileOutcome`].

use std::io::Read;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use tracing::warn;

use crate::error::{panic_message, IngestError, Result};
use crate::model::record::{FileOutcome, RawEmailRecord};
use crate::parser::{body, header, mime};

/// Decode one message and merge header and body fields into a raw record.
///
/// Never panics and never returns an error: structural failures, and any
/// panic raised while decoding, become [`FileOutcome::Failed`].
pub fn assemble(file_id: &str, raw: &[u8]) -> FileOutcome {
    let decoded = panic::catch_unwind(AssertUnwindSafe(|| build_record(file_id, raw)));

    match decoded {
        Ok(Ok(record)) => FileOutcome::Parsed(record),
        Ok(Err(e)) => {
            warn!(file = file_id, error = %e, "Failed to parse message");
            FileOutcome::Failed {
                file: file_id.to_string(),
                error: e.to_string(),
            }
        }
        Err(payload) => {
            let reason = panic_message(payload.as_ref());
            warn!(file = file_id, reason = %reason, "Decoder panicked");
            FileOutcome::Failed {
                file: file_id.to_string(),
                error: format!("decoder panicked: {reason}"),
            }
        }
    }
}

/// Read `path` (at most `max_size` bytes) and assemble its record.
///
/// `file_id` is the identifier recorded in the corpus, usually the path
/// relative to the corpus root.
pub fn assemble_file(file_id: &str, path: &Path, max_size: u64) -> (FileOutcome, u64) {
    match read_bounded(path, max_size) {
        Ok(data) => {
            let size = data.len() as u64;
            (assemble(file_id, &data), size)
        }
        Err(e) => {
            warn!(file = file_id, error = %e, "Failed to read message");
            (
                FileOutcome::Failed {
                    file: file_id.to_string(),
                    error: e.to_string(),
                },
                0,
            )
        }
    }
}

fn build_record(file_id: &str, raw: &[u8]) -> Result<RawEmailRecord> {
    let decoded = mime::decode_message(raw)?;
    let headers = header::extract_fields(&decoded.headers);
    let bodies = body::extract_bodies(&decoded.parts);

    Ok(RawEmailRecord {
        file: file_id.to_string(),
        sender: headers.sender,
        receivers: headers.receivers,
        subject: headers.subject,
        date: headers.date,
        ip: headers.ip,
        body_text: bodies.body_text,
        body_html: bodies.body_html,
        attachments: bodies.attachments,
        attachment_types: bodies.attachment_types,
        error: None,
    })
}

/// Read a whole file, refusing anything larger than `max_size`.
fn read_bounded(path: &Path, max_size: u64) -> Result<Vec<u8>> {
    let file = std::fs::File::open(path).map_err(|e| IngestError::io(path, e))?;
    let size = file
        .metadata()
        .map_err(|e| IngestError::io(path, e))?
        .len();
    if size > max_size {
        return Err(IngestError::MessageTooLarge {
            size,
            limit: max_size,
        });
    }

    // The file may grow between stat and read; never read past the limit.
    let mut data = Vec::with_capacity(size as usize);
    file.take(max_size + 1)
        .read_to_end(&mut data)
        .map_err(|e| IngestError::io(path, e))?;
    if data.len() as u64 > max_size {
        return Err(IngestError::MessageTooLarge {
            size: data.len() as u64,
            limit: max_size,
        });
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_simple_message() {
        let raw = b"Received: from relay by mx; [10.0.0.5]\n\
Received: from origin by relay; [203.0.113.9]\n\
From: John Doe <john@example.com>\n\
To: a@example.com\n\
Subject: Hello\n\
Date: Mon, 2 Jan 2023 10:00:00 -0500\n\
\n\
Body text\n";
        let record = assemble("inbox/hello.eml", raw).into_record();
        assert_eq!(record.file, "inbox/hello.eml");
        assert_eq!(record.sender, "John Doe <john@example.com>");
        assert_eq!(record.receivers, vec!["a@example.com"]);
        assert_eq!(record.subject, "Hello");
        assert_eq!(record.ip.as_deref(), Some("203.0.113.9"));
        assert!(record.body_text.contains("Body text"));
        assert_eq!(record.error, None);
    }

    #[test]
    fn test_assemble_garbage_yields_failed_outcome() {
        let outcome = assemble("junk.eml", b"\x00\x00\x00");
        assert!(matches!(outcome, FileOutcome::Failed { .. }));
        assert_eq!(outcome.file(), "junk.eml");

        let record = outcome.into_record();
        assert!(record.error.as_deref().unwrap().contains("Malformed message"));
        assert_eq!(record.sender, "");
        assert_eq!(record.ip, None);
    }

    #[test]
    fn test_assemble_file_too_large() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.eml");
        std::fs::write(&path, b"From: a@b.com\n\nxxxxxxxxxxxxxxxxxxxxxxxx\n").unwrap();

        let (outcome, bytes) = assemble_file("big.eml", &path, 16);
        assert_eq!(bytes, 0);
        let record = outcome.into_record();
        assert!(record.error.as_deref().unwrap().contains("too large"));
    }

    #[test]
    fn test_assemble_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let (outcome, _) = assemble_file("gone.eml", &dir.path().join("gone.eml"), 1024);
        assert!(matches!(outcome, FileOutcome::Failed { .. }));
    }
}

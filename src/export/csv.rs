//! Export the normalized corpus to CSV for spreadsheet tools.
//!
//! Output is UTF-8 with BOM for Excel compatibility. Bodies are left out;
//! multi-valued fields are joined with `"; "`.

use std::io::{BufWriter, Write};
use std::path::Path;

use crate::model::record::NormalizedEmailRecord;

/// Export normalized records to a CSV file.
///
/// Columns: File, Date_UTC, Sender, Receivers, Subject, IP, Attachments,
/// Attachment_Types, Error
pub fn export_csv(records: &[NormalizedEmailRecord], output_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = BufWriter::new(std::fs::File::create(output_path)?);

    // UTF-8 BOM for Excel
    file.write_all(&[0xEF, 0xBB, 0xBF])?;
    writeln!(
        file,
        "File,Date_UTC,Sender,Receivers,Subject,IP,Attachments,Attachment_Types,Error"
    )?;

    for record in records {
        let receivers = record.receivers.join("; ");
        let attachments = record.attachments.join("; ");
        let attachment_types = record.attachment_types.join("; ");
        let fields: [&str; 9] = [
            &record.file,
            record.date_utc.as_deref().unwrap_or(""),
            record.sender.as_deref().unwrap_or(""),
            &receivers,
            &record.subject,
            record.ip.as_deref().unwrap_or(""),
            &attachments,
            &attachment_types,
            record.error.as_deref().unwrap_or(""),
        ];
        let row = fields.map(csv_escape).join(",");
        writeln!(file, "{row}")?;
    }

    file.flush()?;
    Ok(())
}

/// Escape a value for CSV (RFC 4180).
///
/// Wraps in double quotes if the value contains commas, quotes, or newlines.
fn csv_escape(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_escape() {
        assert_eq!(csv_escape("hello"), "hello");
        assert_eq!(csv_escape("hello, world"), "\"hello, world\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_escape("line1\nline2"), "\"line1\nline2\"");
    }

    #[test]
    fn test_export_csv_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.csv");
        let records = vec![NormalizedEmailRecord {
            file: "a.eml".to_string(),
            sender: Some("spam@bad.example".to_string()),
            receivers: vec!["a@example.com".to_string(), "b@example.com".to_string()],
            subject: "Win, now".to_string(),
            date_utc: Some("2023-01-02T15:00:00+00:00".to_string()),
            ..NormalizedEmailRecord::default()
        }];

        export_csv(&records, &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.trim_start_matches('\u{feff}').lines();
        assert!(lines.next().unwrap().starts_with("File,Date_UTC,Sender"));
        assert_eq!(
            lines.next().unwrap(),
            "a.eml,2023-01-02T15:00:00+00:00,spam@bad.example,a@example.com; b@example.com,\"Win, now\",,,,"
        );
    }
}

//! Body and attachment extraction from a decoded part tree.

use crate::model::part::PartTree;

/// Bodies and attachment metadata of one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodyFields {
    pub body_text: String,
    pub body_html: String,
    pub attachments: Vec<String>,
    /// Content types as declared, index-aligned with `attachments`.
    pub attachment_types: Vec<String>,
}

/// Walk the part tree depth-first in document order.
///
/// The first non-empty `text/plain` part becomes `body_text` and the first
/// non-empty `text/html` part becomes `body_html`. Any other part with an
/// `attachment` disposition and a filename is listed as an attachment, so a
/// text part only counts as an attachment once that body slot is filled.
pub fn extract_bodies(parts: &PartTree) -> BodyFields {
    let mut fields = BodyFields::default();

    for part in parts.walk() {
        match part.content_type.as_str() {
            "text/plain" if fields.body_text.is_empty() => {
                fields.body_text = part.payload.to_text();
            }
            "text/html" if fields.body_html.is_empty() => {
                fields.body_html = part.payload.to_text();
            }
            _ if part.disposition.as_deref() == Some("attachment") => {
                if let Some(name) = part.filename.as_deref().filter(|n| !n.is_empty()) {
                    fields.attachments.push(name.to_string());
                    fields.attachment_types.push(part.content_type.clone());
                }
            }
            _ => {}
        }
    }

    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::part::{MimePart, Payload};

    fn part(content_type: &str, payload: &str) -> MimePart {
        MimePart {
            content_type: content_type.to_string(),
            disposition: None,
            filename: None,
            payload: if payload.is_empty() {
                Payload::Empty
            } else {
                Payload::Text(payload.to_string())
            },
            children: Vec::new(),
            depth: 0,
        }
    }

    fn attachment(content_type: &str, filename: &str) -> MimePart {
        MimePart {
            disposition: Some("attachment".to_string()),
            filename: Some(filename.to_string()),
            ..part(content_type, "")
        }
    }

    #[test]
    fn test_first_occurrence_wins() {
        let mut tree = PartTree::new();
        let root = tree.add(None, part("multipart/mixed", ""));
        tree.add(Some(root), part("text/plain", "first"));
        tree.add(Some(root), part("text/html", "<b>first</b>"));
        tree.add(Some(root), part("text/plain", "second"));
        tree.add(Some(root), part("text/html", "<b>second</b>"));

        let fields = extract_bodies(&tree);
        assert_eq!(fields.body_text, "first");
        assert_eq!(fields.body_html, "<b>first</b>");
        assert!(fields.attachments.is_empty());
    }

    #[test]
    fn test_empty_text_part_does_not_claim_body() {
        let mut tree = PartTree::new();
        let root = tree.add(None, part("multipart/mixed", ""));
        tree.add(Some(root), part("text/plain", ""));
        tree.add(Some(root), part("text/plain", "real body"));

        assert_eq!(extract_bodies(&tree).body_text, "real body");
    }

    #[test]
    fn test_attachments_stay_index_aligned() {
        let mut tree = PartTree::new();
        let root = tree.add(None, part("multipart/mixed", ""));
        tree.add(Some(root), part("text/plain", "see attached"));
        tree.add(Some(root), attachment("application/PDF", "invoice.pdf"));
        tree.add(Some(root), attachment("application/zip", ""));
        tree.add(Some(root), attachment("text/plain", "notes.txt"));
        tree.add(Some(root), attachment("image/png", "logo.png"));

        let fields = extract_bodies(&tree);
        assert_eq!(fields.attachments, vec!["invoice.pdf", "notes.txt", "logo.png"]);
        assert_eq!(
            fields.attachment_types,
            vec!["application/PDF", "text/plain", "image/png"]
        );
    }

    #[test]
    fn test_text_attachment_claims_empty_body_slot() {
        let mut tree = PartTree::new();
        let root = tree.add(None, part("multipart/mixed", ""));
        tree.add(
            Some(root),
            MimePart {
                payload: Payload::Text("attached text".to_string()),
                ..attachment("text/plain", "readme.txt")
            },
        );

        let fields = extract_bodies(&tree);
        assert_eq!(fields.body_text, "attached text");
        assert!(fields.attachments.is_empty());
    }

    #[test]
    fn test_empty_tree() {
        assert_eq!(extract_bodies(&PartTree::new()), BodyFields::default());
    }
}

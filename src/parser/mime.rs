//! MIME decoding: raw message bytes → header multimap + part tree.

use mail_parser::{Message, MessageParser, MimeHeaders, PartType};
use tracing::debug;

use crate::error::{IngestError, Result};
use crate::model::part::{HeaderMap, MimePart, PartTree, Payload};
use crate::parser::header;

/// Maximum nesting depth of the part tree (to bound work on adversarial input).
///
/// Containers at this depth are kept as leaves with an empty payload.
pub const MAX_PART_DEPTH: usize = 64;

/// A message decoded into its top-level headers and its part tree.
#[derive(Debug, Clone, Default)]
pub struct DecodedMessage {
    pub headers: HeaderMap,
    pub parts: PartTree,
}

/// Decode one raw message.
///
/// Fails only when the stream cannot be read as an email at all: empty
/// input, no header field, or a MIME structure `mail-parser` rejects.
/// Damage inside individual parts never fails the message.
pub fn decode_message(raw: &[u8]) -> Result<DecodedMessage> {
    let data = skip_envelope(raw);
    if data.iter().all(u8::is_ascii_whitespace) {
        return Err(IngestError::MalformedMessage("empty input".into()));
    }

    let header_end = find_header_end(data).unwrap_or(data.len());
    let headers = header::unfold_headers(&header::decode_header_bytes(&data[..header_end]));
    if headers.is_empty() {
        return Err(IngestError::MalformedMessage(
            "no header fields found".into(),
        ));
    }

    let message = MessageParser::default().parse(data).ok_or_else(|| {
        IngestError::MalformedMessage("MIME structure could not be parsed".into())
    })?;

    let parts = build_part_tree(&message);
    debug!(headers = headers.len(), parts = parts.len(), "Decoded message");

    Ok(DecodedMessage { headers, parts })
}

/// Flatten `mail-parser`'s part list (and any encapsulated messages) into a
/// [`PartTree`], using an explicit work stack instead of recursion.
fn build_part_tree(root: &Message<'_>) -> PartTree {
    let mut tree = PartTree::new();
    if root.parts.is_empty() {
        return tree;
    }

    // (message, part id within that message, parent node, depth)
    let mut stack = vec![(root, 0usize, None, 0usize)];

    while let Some((message, part_id, parent, depth)) = stack.pop() {
        let Some(part) = message.parts.get(part_id) else {
            debug!(part_id, "Dangling part reference");
            continue;
        };

        let content_type = content_type_of(part);
        let can_descend = depth < MAX_PART_DEPTH;
        let payload = if part.is_encoding_problem {
            debug!(content_type = %content_type, "Part failed to decode; keeping it empty");
            Payload::Empty
        } else {
            payload_of(&content_type, &part.body)
        };

        let index = tree.add(
            parent,
            MimePart {
                content_type,
                disposition: part
                    .content_disposition()
                    .map(|d| d.ctype().to_ascii_lowercase()),
                filename: part.attachment_name().map(str::to_string),
                payload,
                children: Vec::new(),
                depth,
            },
        );

        match &part.body {
            PartType::Multipart(ids) if can_descend => {
                for id in ids.iter().rev() {
                    stack.push((message, *id as usize, Some(index), depth + 1));
                }
            }
            PartType::Message(inner) if can_descend => {
                stack.push((inner, 0, Some(index), depth + 1));
            }
            PartType::Multipart(_) | PartType::Message(_) => {
                debug!(depth, "Part tree depth limit reached; truncating");
            }
            _ => {}
        }
    }

    tree
}

/// Lowercase `type/subtype`, defaulting to `text/plain`.
fn content_type_of(part: &mail_parser::MessagePart<'_>) -> String {
    part.content_type()
        .map(|ct| match ct.subtype() {
            Some(sub) => format!("{}/{}", ct.ctype(), sub),
            None => ct.ctype().to_string(),
        })
        .unwrap_or_else(|| "text/plain".to_string())
        .to_ascii_lowercase()
}

/// Decoded leaf content. A declared multipart without a usable boundary
/// comes through as a non-multipart body and is kept empty.
fn payload_of(content_type: &str, body: &PartType<'_>) -> Payload {
    match body {
        _ if content_type.starts_with("multipart/") => Payload::Empty,
        PartType::Text(text) | PartType::Html(text) => Payload::Text(text.to_string()),
        PartType::Binary(bytes) | PartType::InlineBinary(bytes) => Payload::Binary(bytes.to_vec()),
        PartType::Message(_) | PartType::Multipart(_) => Payload::Empty,
    }
}

/// Skip a leading UTF-8 BOM and an mbox `From ` envelope line.
fn skip_envelope(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data);

    if data.starts_with(b"From ") {
        if let Some(pos) = data.iter().position(|&b| b == b'\n') {
            return &data[pos + 1..];
        }
    }
    data
}

/// Byte offset of the blank line that ends the header block.
fn find_header_end(data: &[u8]) -> Option<usize> {
    let mut offset = 0;
    for line in data.split_inclusive(|&b| b == b'\n') {
        if line == b"\n" || line == b"\r\n" {
            return Some(offset);
        }
        offset += line.len();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULTIPART: &[u8] = b"From: Spammer <spam@bad.example>\r\n\
To: victim@example.com\r\n\
Subject: Invoice\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"outer\"\r\n\
\r\n\
--outer\r\n\
Content-Type: multipart/alternative; boundary=\"inner\"\r\n\
\r\n\
--inner\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Pay now.\r\n\
--inner\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>Pay now.</p>\r\n\
--inner--\r\n\
--outer\r\n\
Content-Type: application/pdf; name=\"invoice.pdf\"\r\n\
Content-Disposition: attachment; filename=\"invoice.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0xLjQK\r\n\
--outer--\r\n";

    #[test]
    fn test_decode_multipart_tree() {
        let decoded = decode_message(MULTIPART).unwrap();
        assert_eq!(decoded.headers.get("subject"), Some("Invoice"));

        let types: Vec<&str> = decoded
            .parts
            .walk()
            .map(|p| p.content_type.as_str())
            .collect();
        assert_eq!(
            types,
            vec![
                "multipart/mixed",
                "multipart/alternative",
                "text/plain",
                "text/html",
                "application/pdf"
            ]
        );

        let pdf = decoded.parts.walk().last().unwrap();
        assert_eq!(pdf.disposition.as_deref(), Some("attachment"));
        assert_eq!(pdf.filename.as_deref(), Some("invoice.pdf"));
        assert_eq!(pdf.payload, Payload::Binary(b"%PDF-1.4\n".to_vec()));
        assert_eq!(pdf.depth, 1);
    }

    #[test]
    fn test_corrupt_part_is_empty_and_siblings_survive() {
        let raw = b"From: a@b.com\n\
Subject: Broken attachment\n\
MIME-Version: 1.0\n\
Content-Type: multipart/mixed; boundary=\"sep\"\n\
\n\
--sep\n\
Content-Type: text/plain; charset=utf-8\n\
\n\
Still readable.\n\
--sep\n\
Content-Type: application/pdf; name=\"broken.pdf\"\n\
Content-Disposition: attachment; filename=\"broken.pdf\"\n\
Content-Transfer-Encoding: base64\n\
\n\
@@@@ not base64 ####\n\
--sep\n\
Content-Type: application/zip; name=\"good.zip\"\n\
Content-Disposition: attachment; filename=\"good.zip\"\n\
Content-Transfer-Encoding: base64\n\
\n\
UEsFBgAAAAAAAAAAAAAAAAAAAAAAAA==\n\
--sep--\n";

        let decoded = decode_message(raw).unwrap();
        let by_name = |name: &str| {
            decoded
                .parts
                .walk()
                .find(|p| p.filename.as_deref() == Some(name))
                .unwrap()
        };
        assert_eq!(by_name("broken.pdf").payload, Payload::Empty);
        assert!(matches!(by_name("good.zip").payload, Payload::Binary(ref b) if !b.is_empty()));

        let bodies = crate::parser::body::extract_bodies(&decoded.parts);
        assert!(bodies.body_text.contains("Still readable."));
        assert_eq!(bodies.attachments, vec!["broken.pdf", "good.zip"]);
        assert_eq!(
            bodies.attachment_types,
            vec!["application/pdf", "application/zip"]
        );
    }

    #[test]
    fn test_decode_single_part_defaults_to_text_plain() {
        let decoded = decode_message(b"From: a@b.com\nSubject: Hi\n\nHello\n").unwrap();
        let root = decoded.parts.root().unwrap();
        assert_eq!(root.content_type, "text/plain");
        assert!(root.payload.to_text().contains("Hello"));
    }

    #[test]
    fn test_decode_missing_boundary_is_empty_leaf() {
        let raw = b"From: a@b.com\nContent-Type: multipart/mixed\n\n--x\nbody\n--x--\n";
        let decoded = decode_message(raw).unwrap();
        let root = decoded.parts.root().unwrap();
        assert!(root.content_type.starts_with("multipart/"));
        assert!(root.children.is_empty());
        assert_eq!(root.payload, Payload::Empty);
    }

    #[test]
    fn test_decode_rejects_empty_and_headerless_input() {
        assert!(matches!(
            decode_message(b""),
            Err(IngestError::MalformedMessage(_))
        ));
        assert!(matches!(
            decode_message(b"  \r\n \n"),
            Err(IngestError::MalformedMessage(_))
        ));
        assert!(matches!(
            decode_message(b"\x00\x01\x02\xff\xfe binary junk"),
            Err(IngestError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_decode_deep_nesting_is_bounded() {
        let depth = MAX_PART_DEPTH + 20;
        let mut raw = String::from("From: a@b.com\nMIME-Version: 1.0\n");
        for level in 0..depth {
            raw.push_str(&format!(
                "Content-Type: multipart/mixed; boundary=\"b{level}\"\n\n--b{level}\n"
            ));
        }
        raw.push_str("Content-Type: text/plain\n\ndeep\n");
        for level in (0..depth).rev() {
            raw.push_str(&format!("--b{level}--\n"));
        }

        let decoded = decode_message(raw.as_bytes()).unwrap();
        assert!(decoded.parts.walk().all(|p| p.depth <= MAX_PART_DEPTH));
    }

    #[test]
    fn test_skip_envelope() {
        let data = b"\xEF\xBB\xBFFrom spam@bad.example Thu Jan 01 00:00:00 2024\nSubject: Test\n\nBody\n";
        assert!(skip_envelope(data).starts_with(b"Subject:"));
        let plain = b"Subject: Test\n\nBody\n";
        assert_eq!(skip_envelope(plain), plain);
    }

    #[test]
    fn test_find_header_end() {
        assert_eq!(find_header_end(b"From: a@b.com\nSubject: Hi\n\nBody\n"), Some(26));
        assert_eq!(find_header_end(b"From: a@b.com\r\n\r\nBody\r\n"), Some(15));
        assert_eq!(find_header_end(b"\nBody"), Some(0));
        assert_eq!(find_header_end(b"From: a@b.com"), None);
    }
}

//! RFC 5322 header handling: unfolding into a multimap, encoded-words
//! (RFC 2047), field extraction, originating-IP inference, and permissive
//! date parsing.

use std::sync::LazyLock;

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use tracing::debug;

use crate::model::part::HeaderMap;

/// Dotted-quad IPv4 candidate. Octet ranges are not checked.
static IPV4_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").expect("valid IPv4 regex")
});

/// Encoded-word payloads are frequently unpadded.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Header-derived fields of a raw record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderFields {
    pub sender: String,
    pub receivers: Vec<String>,
    pub subject: String,
    pub date: String,
    pub ip: Option<String>,
}

/// Pull sender, receivers, subject, date and originating IP out of a header map.
///
/// No semantic parsing happens here: addresses and dates are kept as found
/// (after RFC 2047 decoding for the address and subject fields).
pub fn extract_fields(headers: &HeaderMap) -> HeaderFields {
    let sender = headers
        .get("from")
        .map(decode_encoded_words)
        .unwrap_or_default();

    let receivers = headers.get_all("to").map(decode_encoded_words).collect();

    let subject = headers
        .get("subject")
        .map(decode_encoded_words)
        .unwrap_or_default();

    let date = headers.get("date").unwrap_or_default().to_string();

    let ip = infer_origin_ip(headers.get_all("received"));

    HeaderFields {
        sender,
        receivers,
        subject,
        date,
        ip,
    }
}

/// Infer the originating host from a `Received:` chain.
///
/// `received` yields header values in message order, i.e. newest hop first.
/// The chain is scanned oldest hop first and the first dotted-quad found is
/// returned; newer hops are never consulted once an older one matched.
pub fn infer_origin_ip<'a, I>(received: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
    I::IntoIter: DoubleEndedIterator,
{
    received
        .into_iter()
        .rev()
        .find_map(|value| IPV4_REGEX.find(value).map(|m| m.as_str().to_string()))
}

/// Decode raw header bytes to a string.
///
/// Tries UTF-8 first, then falls back to Windows-1252 (which accepts every byte).
pub(crate) fn decode_header_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Unfold a header block into a [`HeaderMap`].
///
/// Continuation lines (leading space or tab) are joined to the previous
/// field. Lines that are neither continuations nor `name: value` fields
/// with a valid field name are skipped.
pub fn unfold_headers(text: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let mut have_field = false;

    for line in text.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if have_field {
                headers.continue_last(line);
            }
        } else if let Some(colon_pos) = line.find(':') {
            let name = line[..colon_pos].trim_end();
            if is_field_name(name) {
                headers.push(name, line[colon_pos + 1..].trim());
                have_field = true;
            } else {
                have_field = false;
            }
        } else {
            have_field = false;
        }
    }

    headers
}

/// RFC 5322 field names: printable US-ASCII except colon, no whitespace.
fn is_field_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| (33..=126).contains(&b) && b != b':')
}

/// Decode RFC 2047 encoded-words in a header value.
///
/// Example: `"=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="` → `"Hola mundo"`
///
/// If decoding fails for any token, the original text is preserved.
pub fn decode_encoded_words(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut remaining = input;
    let mut last_was_encoded = false;

    while let Some(start) = remaining.find("=?") {
        let before = &remaining[..start];
        // Whitespace between two adjacent encoded-words is dropped (RFC 2047 §6.2)
        if !last_was_encoded || !before.trim().is_empty() {
            result.push_str(before);
        }

        let after_start = &remaining[start + 2..];
        match decode_one_word(after_start) {
            Some((text, consumed)) => {
                result.push_str(&text);
                remaining = &after_start[consumed..];
                last_was_encoded = true;
            }
            None => {
                result.push_str("=?");
                remaining = after_start;
                last_was_encoded = false;
            }
        }
    }

    result.push_str(remaining);
    result
}

/// Decode `charset?encoding?text?=` (the leading `=?` already consumed).
///
/// Returns the decoded text and the number of bytes consumed.
fn decode_one_word(s: &str) -> Option<(String, usize)> {
    let mut pieces = s.splitn(3, '?');
    let charset = pieces.next()?;
    let encoding = pieces.next()?;
    let rest = pieces.next()?;
    let end = rest.find("?=")?;
    let encoded_text = &rest[..end];

    if charset.is_empty() || charset.contains(char::is_whitespace) {
        return None;
    }

    let bytes = match encoding {
        "B" | "b" => LENIENT_BASE64.decode(encoded_text.trim()).ok()?,
        "Q" | "q" => decode_q_encoding(encoded_text),
        _ => return None,
    };

    let consumed = charset.len() + 1 + encoding.len() + 1 + end + 2;
    Some((decode_charset(charset, &bytes), consumed))
}

/// Decode Q-encoding (RFC 2047): underscores → spaces, `=XX` → byte.
fn decode_q_encoding(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => result.push(b' '),
            b'=' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        result.push(byte);
                        i += 3;
                        continue;
                    }
                    None => result.push(b'='),
                }
            }
            b => result.push(b),
        }
        i += 1;
    }
    result
}

/// Decode bytes using a named charset (RFC 2231 language suffix ignored).
fn decode_charset(charset: &str, bytes: &[u8]) -> String {
    let label = charset.split('*').next().unwrap_or(charset);
    match encoding_rs::Encoding::for_label(label.as_bytes()) {
        Some(encoding) => {
            let (decoded, _, _) = encoding.decode(bytes);
            decoded.into_owned()
        }
        None => {
            debug!(charset = label, "Unknown charset, falling back to UTF-8 lossy");
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

/// Parse an email date string in various common formats.
///
/// Supports RFC 2822 (with or without day name and trailing comments),
/// RFC 3339, named timezones, IMAP-style dates, slash layouts, long month
/// names with 12- or 24-hour clocks, and bare dates. Naive timestamps are
/// taken as UTC; bare dates as midnight UTC.
pub fn parse_date(date_str: &str) -> Option<DateTime<Utc>> {
    let trimmed = date_str.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    let uncommented = strip_trailing_comment(trimmed);
    if uncommented != trimmed {
        if let Ok(dt) = DateTime::parse_from_rfc2822(&uncommented) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    let no_dow = strip_day_of_week(&uncommented);
    let imap = normalize_imap_date(&no_dow);

    let formats = [
        "%d %b %Y %H:%M:%S %z",
        "%d %b %Y %H:%M %z",
        "%d %b %Y %H:%M:%S",
        "%b %d %H:%M:%S %Y",
        "%b %d %Y %H:%M:%S %z",
        "%Y-%m-%dT%H:%M:%S%z",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S %z",
        "%Y-%m-%d %H:%M:%S",
        "%d/%m/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
        "%B %d, %Y %I:%M %p",
        "%B %d, %Y %I:%M:%S %p",
        "%B %d, %Y %H:%M:%S",
        "%B %d, %Y %H:%M",
    ];
    // Date-only layouts are taken as midnight UTC.
    let date_formats = ["%Y-%m-%d", "%B %d, %Y", "%d %b %Y"];

    let candidates = [
        replace_named_tz(&no_dow),
        replace_named_tz(&imap),
        no_dow,
        imap,
    ];
    for candidate in &candidates {
        for fmt in &formats {
            if let Ok(dt) = DateTime::parse_from_str(candidate, fmt) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(ndt) = NaiveDateTime::parse_from_str(candidate, fmt) {
                return Some(Utc.from_utc_datetime(&ndt));
            }
        }
        for fmt in &date_formats {
            if let Some(ndt) = NaiveDate::parse_from_str(candidate, fmt)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
            {
                return Some(Utc.from_utc_datetime(&ndt));
            }
        }
    }

    if let Some(dt) = mail_parser_date(trimmed) {
        return Some(dt);
    }

    debug!(date = trimmed, "Could not parse date");
    None
}

/// Attempt to parse a date using `mail-parser`'s built-in grammar.
fn mail_parser_date(input: &str) -> Option<DateTime<Utc>> {
    use mail_parser::MessageParser;

    // Wrap input in a minimal RFC 5322 message so mail-parser can parse it
    let fake_msg = format!("Date: {input}\n\n");
    let parsed = MessageParser::default().parse(fake_msg.as_bytes())?;
    let date = parsed.date()?.to_rfc3339();
    match DateTime::parse_from_rfc3339(&date) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(e) => {
            debug!(date = input, error = %e, "mail-parser produced an unusable date");
            None
        }
    }
}

/// Drop a trailing `(comment)`, e.g. `"... -0800 (PST)"`.
fn strip_trailing_comment(s: &str) -> String {
    match (s.rfind('('), s.ends_with(')')) {
        (Some(open), true) => s[..open].trim_end().to_string(),
        _ => s.to_string(),
    }
}

/// Normalize IMAP-style dates: `"16-JUL-2025 03:01:03"` → `"16 Jul 2025 03:01:03"`.
fn normalize_imap_date(s: &str) -> String {
    if !s.contains('-') {
        return s.to_string();
    }

    let months = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];
    // ASCII-only lowercasing keeps byte offsets valid in `s`.
    let lower = s.to_ascii_lowercase();
    for month in months {
        let pattern = format!("-{}-", month.to_ascii_lowercase());
        if let Some(pos) = lower.find(&pattern) {
            let mut result = s.to_string();
            result.replace_range(pos..pos + pattern.len(), &format!(" {month} "));
            return result;
        }
    }
    s.to_string()
}

/// Strip a leading day-of-week prefix (`"Thu, "`, `"Thu "`, `"Thursday, "`).
fn strip_day_of_week(s: &str) -> String {
    let days = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];
    let Some(first) = s.split([',', ' ']).next() else {
        return s.to_string();
    };
    let is_day_name = first.len() >= 3
        && first.chars().all(|c| c.is_ascii_alphabetic())
        && days.contains(&first[..3].to_lowercase().as_str());
    if is_day_name {
        return s[first.len()..]
            .trim_start_matches(|c: char| c == ',' || c.is_whitespace())
            .to_string();
    }
    s.to_string()
}

/// Replace a trailing timezone abbreviation with its numeric offset.
fn replace_named_tz(s: &str) -> String {
    let tzs = [
        ("EST", "-0500"),
        ("EDT", "-0400"),
        ("CST", "-0600"),
        ("CDT", "-0500"),
        ("MST", "-0700"),
        ("MDT", "-0600"),
        ("PST", "-0800"),
        ("PDT", "-0700"),
        ("GMT", "+0000"),
        ("UTC", "+0000"),
        ("UT", "+0000"),
        ("CEST", "+0200"),
        ("CET", "+0100"),
        ("BST", "+0100"),
        ("JST", "+0900"),
        ("Z", "+0000"),
    ];
    for (name, offset) in tzs {
        if let Some(head) = s.strip_suffix(name) {
            if head.ends_with(' ') {
                return format!("{head}{offset}");
            }
        }
    }
    s.to_string()
}

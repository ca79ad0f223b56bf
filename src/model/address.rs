//! Mailbox parsing (RFC 5322 §3.4) and address validation.

use std::sync::LazyLock;

use regex::Regex;

/// Shape an address must have to survive normalization: `local@label.rest`.
static ADDRESS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9_.+-]+@[a-zA-Z0-9-]+\.[a-zA-Z0-9-.]+$").expect("valid address regex")
});

/// A mailbox token as found in `From`/`To` headers.
///
/// # Examples
/// - `"John Doe <john@example.com>"` → `display_name = "John Doe"`, `address = "john@example.com"`
/// - `"john@example.com (John Doe)"` → `display_name = "John Doe"`, `address = "john@example.com"`
/// - `"not-an-address"` → `display_name = ""`, `address = "not-an-address"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    /// Human-readable display name (may be empty).
    pub display_name: String,
    /// The address part, unvalidated.
    pub address: String,
}

impl Mailbox {
    /// Parse a single mailbox from a header value.
    ///
    /// Supported formats:
    /// - `"user@domain.com"`
    /// - `"<user@domain.com>"`
    /// - `"Display Name <user@domain.com>"`
    /// - `"\"Display, Name\" <user@domain.com>"`
    /// - `"user@domain.com (Display Name)"`
    ///
    /// Never fails: unparseable input is kept verbatim as `address` and
    /// rejected later by [`Mailbox::normalized_address`].
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::empty();
        }

        if let Some(angle_start) = trimmed.rfind('<') {
            if let Some(angle_end) = trimmed.rfind('>') {
                if angle_end > angle_start {
                    let address = trimmed[angle_start + 1..angle_end].trim().to_string();
                    let display_name = strip_quotes(&trimmed[..angle_start]);
                    return Self {
                        display_name,
                        address,
                    };
                }
            }
        }

        let (bare, comment) = split_comment(trimmed);
        Self {
            display_name: comment,
            address: strip_quotes(&bare).replace(char::is_whitespace, ""),
        }
    }

    /// Parse a mailbox list.
    ///
    /// Commas inside quotes or angle brackets do not split. Group syntax
    /// (`Team: a@b.com, c@d.com;`) contributes its members; the group name
    /// is dropped. Empty entries are skipped.
    pub fn parse_list(raw: &str) -> Vec<Self> {
        let mut results = Vec::new();
        let mut current = String::new();
        let mut in_quotes = false;
        let mut in_angle = false;

        let flush = |current: &mut String, results: &mut Vec<Self>| {
            let mailbox = Self::parse(current);
            if !mailbox.address.is_empty() {
                results.push(mailbox);
            }
            current.clear();
        };

        for ch in raw.chars() {
            match ch {
                '"' => {
                    in_quotes = !in_quotes;
                    current.push(ch);
                }
                '<' if !in_quotes => {
                    in_angle = true;
                    current.push(ch);
                }
                '>' if !in_quotes => {
                    in_angle = false;
                    current.push(ch);
                }
                ':' if !in_quotes && !in_angle => {
                    // Group display name
                    current.clear();
                }
                ',' | ';' if !in_quotes && !in_angle => flush(&mut current, &mut results),
                _ => current.push(ch),
            }
        }
        flush(&mut current, &mut results);

        results
    }

    /// The lowercased address, if it has a valid `local@domain` shape.
    pub fn normalized_address(&self) -> Option<String> {
        let candidate = self.address.trim().to_lowercase();
        is_valid_address(&candidate).then_some(candidate)
    }

    fn empty() -> Self {
        Self {
            display_name: String::new(),
            address: String::new(),
        }
    }
}

/// Check an address against the `local@domain` grammar used for normalization.
///
/// The domain must contain at least one dot; only hostname characters are
/// accepted in the domain and `[A-Za-z0-9_.+-]` in the local part.
pub fn is_valid_address(address: &str) -> bool {
    ADDRESS_REGEX.is_match(address)
}

/// Split a trailing or embedded `(comment)` off a bare address.
fn split_comment(s: &str) -> (String, String) {
    let mut bare = String::with_capacity(s.len());
    let mut comment = String::new();
    let mut depth = 0usize;
    let mut in_quotes = false;

    for ch in s.chars() {
        match ch {
            '"' if depth == 0 => {
                in_quotes = !in_quotes;
                bare.push(ch);
            }
            '(' if !in_quotes => {
                if depth > 0 {
                    comment.push(ch);
                }
                depth += 1;
            }
            ')' if !in_quotes && depth > 0 => {
                depth -= 1;
                if depth > 0 {
                    comment.push(ch);
                }
            }
            _ if depth > 0 => comment.push(ch),
            _ => bare.push(ch),
        }
    }

    (bare.trim().to_string(), comment.trim().to_string())
}

/// Strip surrounding double-quotes and trim whitespace.
fn strip_quotes(s: &str) -> String {
    let trimmed = s.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_address() {
        let mailbox = Mailbox::parse("user@example.com");
        assert_eq!(mailbox.address, "user@example.com");
        assert_eq!(mailbox.display_name, "");
    }

    #[test]
    fn test_parse_name_and_address() {
        let mailbox = Mailbox::parse("John Doe <john@example.com>");
        assert_eq!(mailbox.address, "john@example.com");
        assert_eq!(mailbox.display_name, "John Doe");
    }

    #[test]
    fn test_parse_quoted_name() {
        let mailbox = Mailbox::parse("\"Last, First\" <user@example.com>");
        assert_eq!(mailbox.address, "user@example.com");
        assert_eq!(mailbox.display_name, "Last, First");
    }

    #[test]
    fn test_parse_comment_form() {
        let mailbox = Mailbox::parse("john@example.com (John Doe)");
        assert_eq!(mailbox.address, "john@example.com");
        assert_eq!(mailbox.display_name, "John Doe");
    }

    #[test]
    fn test_parse_list_with_quoted_comma() {
        let list = Mailbox::parse_list("\"Last, First\" <a@b.com>, other@c.com");
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].display_name, "Last, First");
        assert_eq!(list[1].address, "other@c.com");
    }

    #[test]
    fn test_parse_list_group_syntax() {
        let list = Mailbox::parse_list("Victims: a@b.com, c@d.com;, e@f.com");
        let addresses: Vec<&str> = list.iter().map(|m| m.address.as_str()).collect();
        assert_eq!(addresses, vec!["a@b.com", "c@d.com", "e@f.com"]);
    }

    #[test]
    fn test_parse_list_undisclosed_recipients() {
        assert!(Mailbox::parse_list("undisclosed-recipients:;").is_empty());
    }

    #[test]
    fn test_normalized_address() {
        assert_eq!(
            Mailbox::parse("John Doe <John@Example.COM>").normalized_address(),
            Some("john@example.com".to_string())
        );
        assert_eq!(Mailbox::parse("not-an-address").normalized_address(), None);
        assert_eq!(Mailbox::parse("user@localhost").normalized_address(), None);
        assert_eq!(Mailbox::parse("").normalized_address(), None);
    }

    #[test]
    fn test_is_valid_address() {
        assert!(is_valid_address("first.last+tag@mail.example.org"));
        assert!(!is_valid_address("spaces in@example.com"));
        assert!(!is_valid_address("user@exa_mple.com"));
        assert!(!is_valid_address("@example.com"));
    }

    #[test]
    fn test_display() {
        let mailbox = Mailbox {
            display_name: "Alice".to_string(),
            address: "alice@example.com".to_string(),
        };
        assert_eq!(mailbox.to_string(), "Alice <alice@example.com>");
    }
}

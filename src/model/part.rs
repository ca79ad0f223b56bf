//! Decoded message structure: header multimap and MIME part tree.

/// Ordered multimap of header fields.
///
/// Names are stored lowercased so lookups are case-insensitive. Duplicate
/// fields are kept in message order, which matters for `Received:`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    fields: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field. The name is lowercased.
    pub fn push(&mut self, name: &str, value: impl Into<String>) {
        self.fields.push((name.trim().to_lowercase(), value.into()));
    }

    /// Append a continuation line to the last field.
    pub(crate) fn continue_last(&mut self, continuation: &str) {
        if let Some((_, value)) = self.fields.last_mut() {
            value.push(' ');
            value.push_str(continuation.trim());
        }
    }

    /// First value for `name`, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).next()
    }

    /// Every value for `name`, in message order.
    pub fn get_all<'a>(&'a self, name: &str) -> impl DoubleEndedIterator<Item = &'a str> + 'a {
        let name = name.to_lowercase();
        self.fields
            .iter()
            .filter(move |(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Decoded content of a single part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
    /// Containers, undecodable parts, and parts past the depth bound.
    Empty,
}

impl Payload {
    /// Payload as text; binary content is decoded lossily.
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Binary(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            Self::Empty => String::new(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
            Self::Empty => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One node of the part tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimePart {
    /// Lowercase `type/subtype`; `text/plain` when the header is absent.
    pub content_type: String,
    /// Lowercase disposition type (`attachment`, `inline`), if declared.
    pub disposition: Option<String>,
    /// Filename from `Content-Disposition` or the `Content-Type` name parameter.
    pub filename: Option<String>,
    pub payload: Payload,
    /// Indices of child parts in the owning [`PartTree`], in document order.
    pub children: Vec<usize>,
    /// Nesting depth; the root is 0.
    pub depth: usize,
}

/// Arena-backed part tree. Node 0 is the root when the tree is non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartTree {
    nodes: Vec<MimePart>,
}

impl PartTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, linking it under `parent` if given. Returns its index.
    pub fn add(&mut self, parent: Option<usize>, part: MimePart) -> usize {
        let index = self.nodes.len();
        self.nodes.push(part);
        if let Some(parent) = parent {
            if let Some(node) = self.nodes.get_mut(parent) {
                node.children.push(index);
            }
        }
        index
    }

    pub fn root(&self) -> Option<&MimePart> {
        self.nodes.first()
    }

    pub fn get(&self, index: usize) -> Option<&MimePart> {
        self.nodes.get(index)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Depth-first, document-order traversal from the root.
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            tree: self,
            stack: if self.nodes.is_empty() { Vec::new() } else { vec![0] },
        }
    }
}

/// Iterator returned by [`PartTree::walk`], driven by an explicit stack.
pub struct Walk<'a> {
    tree: &'a PartTree,
    stack: Vec<usize>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a MimePart;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let index = self.stack.pop()?;
            if let Some(part) = self.tree.nodes.get(index) {
                self.stack.extend(part.children.iter().rev());
                return Some(part);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(content_type: &str) -> MimePart {
        MimePart {
            content_type: content_type.to_string(),
            disposition: None,
            filename: None,
            payload: Payload::Empty,
            children: Vec::new(),
            depth: 0,
        }
    }

    #[test]
    fn test_header_map_case_insensitive_multimap() {
        let mut headers = HeaderMap::new();
        headers.push("Received", "from a by b");
        headers.push("Subject", "Hi");
        headers.push("RECEIVED", "from c by d");

        assert_eq!(headers.get("subject"), Some("Hi"));
        assert_eq!(headers.get("SUBJECT"), Some("Hi"));
        let received: Vec<&str> = headers.get_all("received").collect();
        assert_eq!(received, vec!["from a by b", "from c by d"]);
        assert_eq!(headers.get("to"), None);
    }

    #[test]
    fn test_walk_is_document_order() {
        let mut tree = PartTree::new();
        let root = tree.add(None, leaf("multipart/mixed"));
        let alt = tree.add(Some(root), leaf("multipart/alternative"));
        tree.add(Some(alt), leaf("text/plain"));
        tree.add(Some(alt), leaf("text/html"));
        tree.add(Some(root), leaf("application/pdf"));

        let order: Vec<&str> = tree.walk().map(|p| p.content_type.as_str()).collect();
        assert_eq!(
            order,
            vec![
                "multipart/mixed",
                "multipart/alternative",
                "text/plain",
                "text/html",
                "application/pdf"
            ]
        );
    }

    #[test]
    fn test_payload_to_text() {
        assert_eq!(Payload::Binary(b"abc".to_vec()).to_text(), "abc");
        assert_eq!(Payload::Empty.to_text(), "");
        assert!(Payload::Text(String::new()).is_empty());
    }
}

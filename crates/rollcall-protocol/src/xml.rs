//! Minimal XML support for terminal request and response bodies.
//!
//! Terminal documents are small and flat: a root element holding leaf values
//! and at most one level of nested sections. Reading is namespace-agnostic
//! (`<tt:statusCode>` and `<statusCode>` both match `statusCode`); writing
//! produces the root-with-children shape the firmware expects.
//!
//! # Examples
//!
//! ```
//! use rollcall_protocol::xml::{XmlDocument, XmlElement};
//!
//! let body = XmlElement::new("CaptureFaceDataCond")
//!     .child("captureInfrared", "false")
//!     .child("dataType", "url")
//!     .render();
//! assert!(body.starts_with("<?xml"));
//!
//! let doc = XmlDocument::new(
//!     "<ResponseStatus xmlns=\"urn:x\"><statusCode>1</statusCode></ResponseStatus>",
//! );
//! assert_eq!(doc.root_name().as_deref(), Some("ResponseStatus"));
//! assert_eq!(doc.value("statusCode").as_deref(), Some("1"));
//! ```

use std::fmt::Write as _;

/// Parsed view over an XML document body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    text: String,
}

/// One start tag found while scanning.
struct StartTag<'a> {
    /// Name as written, including any namespace prefix
    qualified: &'a str,
    /// Byte offset just past the closing `>` of the start tag
    content_start: usize,
    self_closing: bool,
}

impl XmlDocument {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Raw document text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Local name of the root element.
    pub fn root_name(&self) -> Option<String> {
        self.start_tags()
            .next()
            .map(|tag| local_name(tag.qualified).to_string())
    }

    /// Returns `true` if an element with this local name exists.
    pub fn contains(&self, tag: &str) -> bool {
        self.start_tags().any(|t| local_name(t.qualified) == tag)
    }

    /// Trimmed, unescaped text of the first element named `tag`.
    ///
    /// Returns `None` when the element is missing, self-closing or empty.
    pub fn value(&self, tag: &str) -> Option<String> {
        let inner = self.inner_text(tag)?;
        if inner.contains('<') {
            return None;
        }
        let value = unescape(inner.trim());
        (!value.is_empty()).then_some(value)
    }

    /// Sub-document holding the content of the first element named `tag`.
    pub fn section(&self, tag: &str) -> Option<XmlDocument> {
        self.inner_text(tag).map(XmlDocument::new)
    }

    fn inner_text(&self, tag: &str) -> Option<&str> {
        let start = self
            .start_tags()
            .find(|t| local_name(t.qualified) == tag && !t.self_closing)?;
        let close = format!("</{}>", start.qualified);
        let rest = &self.text[start.content_start..];
        let end = rest.find(&close)?;
        Some(&rest[..end])
    }

    fn start_tags(&self) -> impl Iterator<Item = StartTag<'_>> {
        let text = self.text.as_str();
        let mut cursor = 0;
        std::iter::from_fn(move || {
            while let Some(offset) = text[cursor..].find('<') {
                let open = cursor + offset;
                let close = open + text[open..].find('>')?;
                cursor = close + 1;

                let raw = &text[open + 1..close];
                // Skip declarations, comments, processing instructions and end tags
                if raw.starts_with(['?', '!', '/']) {
                    continue;
                }
                let self_closing = raw.ends_with('/');
                let qualified = raw
                    .split(|c: char| c.is_ascii_whitespace() || c == '/')
                    .next()
                    .unwrap_or_default();
                if qualified.is_empty() {
                    continue;
                }
                return Some(StartTag {
                    qualified,
                    content_start: cursor,
                    self_closing,
                });
            }
            None
        })
    }
}

fn local_name(qualified: &str) -> &str {
    qualified.rsplit(':').next().unwrap_or(qualified)
}

/// Escape text for use inside an XML element.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Reverse of [`escape`] for the five predefined entities.
pub fn unescape(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Builder for request documents: one root element with leaf children.
#[derive(Debug, Clone)]
pub struct XmlElement {
    name: String,
    namespace: Option<String>,
    children: Vec<(String, String)>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            children: Vec::new(),
        }
    }

    /// Set the default namespace declared on the root.
    pub fn namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = Some(ns.into());
        self
    }

    /// Append a leaf child. The value is escaped on render.
    pub fn child(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.children.push((name.into(), value.to_string()));
        self
    }

    /// Render with an XML declaration.
    pub fn render(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
        match &self.namespace {
            Some(ns) => {
                let _ = write!(out, "<{} version=\"2.0\" xmlns=\"{}\">", self.name, escape(ns));
            }
            None => {
                let _ = write!(out, "<{}>", self.name);
            }
        }
        for (name, value) in &self.children {
            let _ = write!(out, "<{name}>{}</{name}>", escape(value));
        }
        let _ = write!(out, "</{}>", self.name);
        out
    }
}

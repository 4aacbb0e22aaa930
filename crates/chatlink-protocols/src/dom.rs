//! Platform-neutral snapshot of rendered content.
//!
//! The core never touches a real DOM. Capability implementations hand it
//! [`Node`] trees; the pure functions here turn those trees into the text the
//! extractor and the reply correlator operate on.

/// A snapshot of one rendered content node.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// A text leaf.
    Text(String),

    /// An element with child nodes.
    Element {
        /// Tag name; compared case-insensitively.
        tag: String,
        /// Marked purely decorative by the platform (`aria-hidden`).
        aria_hidden: bool,
        children: Vec<Node>,
    },
}

impl Node {
    /// Create a text leaf.
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text(content.into())
    }

    /// Create a visible element.
    pub fn element(tag: impl Into<String>, children: Vec<Node>) -> Self {
        Self::Element {
            tag: tag.into(),
            aria_hidden: false,
            children,
        }
    }

    /// Create a decorative (`aria-hidden`) element.
    pub fn hidden(tag: impl Into<String>, children: Vec<Node>) -> Self {
        Self::Element {
            tag: tag.into(),
            aria_hidden: true,
            children,
        }
    }
}

/// Tags that open a new line in the source layout.
const BLOCK_TAGS: &[&str] = &[
    "p",
    "div",
    "br",
    "li",
    "tr",
    "pre",
    "blockquote",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
];

/// Known non-content UI subtrees skipped during scan extraction.
const SKIP_TAGS: &[&str] = &[
    "ms-thought-chunk",
    "mat-icon",
    "script",
    "style",
    "button",
    "mat-expansion-panel-header",
];

/// Non-content subtrees stripped from captured replies (controls, icons).
const REPLY_STRIP_TAGS: &[&str] = &["button", "svg", "mat-icon", "script", "style"];

fn tag_in(tag: &str, set: &[&str]) -> bool {
    set.iter().any(|t| tag.eq_ignore_ascii_case(t))
}

/// Whether a tag is block-level for text extraction purposes.
pub fn is_block_tag(tag: &str) -> bool {
    tag_in(tag, BLOCK_TAGS)
}

/// Extract scan text from a region tree.
///
/// Skips `aria-hidden` elements and known UI noise, and inserts a line break
/// before block-level elements so multi-line structure in the source survives
/// into the extracted text.
pub fn clean_text(node: &Node) -> String {
    let mut buf = String::new();
    collect(node, SKIP_TAGS, &mut buf);
    buf
}

/// Extract the visible text of a captured reply, with controls and icons
/// stripped, trimmed of surrounding whitespace.
pub fn reply_text(node: &Node) -> String {
    let mut buf = String::new();
    collect(node, REPLY_STRIP_TAGS, &mut buf);
    buf.trim().to_string()
}

fn collect(node: &Node, skip: &[&str], buf: &mut String) {
    match node {
        Node::Text(text) => buf.push_str(text),
        Node::Element {
            tag,
            aria_hidden,
            children,
        } => {
            if *aria_hidden || tag_in(tag, skip) {
                return;
            }
            if is_block_tag(tag) {
                buf.push('\n');
            }
            for child in children {
                collect(child, skip, buf);
            }
        }
    }
}

#[cfg(test)]
#[path = "dom_tests.rs"]
mod tests;

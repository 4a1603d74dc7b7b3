use ego_tree::NodeRef;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedContent {
    pub title: Option<String>,
    pub text: String,
}

/// The injected extraction capability: structured content from decoded HTML.
/// Implementations must be pure: the same input always yields the same
/// output.
pub trait Extractor: Send + Sync {
    fn extract(&self, html: &str) -> ExtractedContent;
}

// Subtrees that never contribute visible text. `head` covers `title` and
// document metadata, so the title cannot leak into the text field.
const SKIPPED_TAGS: &[&str] = &[
    "head", "title", "script", "style", "noscript", "template", "iframe",
];

// Elements that separate text runs with a line break instead of a space.
const BLOCK_TAGS: &[&str] = &[
    "address",
    "article",
    "blockquote",
    "br",
    "div",
    "figcaption",
    "figure",
    "footer",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "header",
    "hr",
    "li",
    "nav",
    "ol",
    "p",
    "section",
    "table",
    "tr",
    "ul",
];

/// Default extractor:
/// - pulls `<title>` text if present (trimmed; `None` when empty)
/// - walks the `<body>` subtree collecting visible text only
/// - skips scripting, styling, and document-meta subtrees entirely
/// - collapses whitespace runs and inserts newlines at block boundaries.
#[derive(Debug, Default)]
pub struct VisibleTextExtractor;

impl Extractor for VisibleTextExtractor {
    fn extract(&self, html: &str) -> ExtractedContent {
        let doc = Html::parse_document(html);

        let title = Selector::parse("title")
            .ok()
            .and_then(|sel| doc.select(&sel).next().map(|node| node.text().collect::<String>()))
            .map(|raw| raw.trim().to_string())
            .filter(|t| !t.is_empty());

        let mut builder = TextBuilder::new();
        let body = Selector::parse("body")
            .ok()
            .and_then(|sel| doc.select(&sel).next());
        match body {
            Some(element) => {
                for child in element.children() {
                    visit_node(child, &mut builder);
                }
            }
            // A fragment without a body element still yields its text.
            None => {
                for child in doc.root_element().children() {
                    visit_node(child, &mut builder);
                }
            }
        }

        ExtractedContent {
            title,
            text: builder.into_text(),
        }
    }
}

fn visit_node(node: NodeRef<'_, Node>, builder: &mut TextBuilder) {
    match node.value() {
        Node::Text(text) => builder.append_text(text),
        Node::Element(_) => {
            if let Some(element) = ElementRef::wrap(node) {
                visit_element(element, builder);
            }
        }
        _ => {}
    }
}

fn visit_element(element: ElementRef<'_>, builder: &mut TextBuilder) {
    let tag = element.value().name().to_ascii_lowercase();
    if SKIPPED_TAGS.contains(&tag.as_str()) {
        return;
    }
    let block = BLOCK_TAGS.contains(&tag.as_str());
    if block {
        builder.ensure_newline();
    }
    for child in element.children() {
        visit_node(child, builder);
    }
    if block {
        builder.ensure_newline();
    }
}

/// Accumulates text while collapsing whitespace runs to a single space and
/// deduplicating newlines.
struct TextBuilder {
    buf: String,
    last_char: Option<char>,
}

impl TextBuilder {
    fn new() -> Self {
        Self {
            buf: String::new(),
            last_char: None,
        }
    }

    fn append_text(&mut self, text: &str) {
        for ch in text.chars() {
            if ch.is_whitespace() {
                if self.last_char == Some(' ') || self.last_char == Some('\n') {
                    continue;
                }
                self.push_char(' ');
            } else {
                self.push_char(ch);
            }
        }
    }

    fn ensure_newline(&mut self) {
        if self.buf.is_empty() || self.last_char == Some('\n') {
            return;
        }
        // A trailing space before a block boundary is noise.
        if self.last_char == Some(' ') {
            self.buf.pop();
        }
        self.push_char('\n');
    }

    fn push_char(&mut self, ch: char) {
        self.buf.push(ch);
        self.last_char = Some(ch);
    }

    fn into_text(self) -> String {
        self.buf.trim().to_string()
    }
}

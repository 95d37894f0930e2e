//! Markdown text clean-up before parsing.
//!
//! [`MarkdownPreprocessor`] normalizes line endings and collapses runs of
//! blank lines. Fenced code blocks keep their content byte for byte.
//!
//! `==highlight==` syntax is not handled here: the parser's highlight
//! extension turns it into `<mark>`, so link destinations and code never see
//! it.

/// Maximum consecutive blank lines kept.
const MAX_BLANK_LINES: usize = 2;

/// Transforms Markdown text before conversion.
pub trait Preprocessor: Send + Sync {
    fn preprocess(&self, markdown: &str) -> String;
}

/// The standard preprocessor.
///
/// # Example
///
/// ```rust
/// use md2pdf::preprocess::{MarkdownPreprocessor, Preprocessor};
///
/// let out = MarkdownPreprocessor.preprocess("a ==b== c\r\n\n\n\n\nd");
/// assert_eq!(out, "a ==b== c\n\n\nd");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownPreprocessor;

impl Preprocessor for MarkdownPreprocessor {
    fn preprocess(&self, markdown: &str) -> String {
        let text = markdown.replace("\r\n", "\n").replace('\r', "\n");

        let mut lines: Vec<&str> = Vec::new();
        let mut fence: Option<Fence> = None;
        let mut blank_run = 0usize;

        for line in text.split('\n') {
            if let Some(open) = fence {
                if open.is_closed_by(line) {
                    fence = None;
                }
                lines.push(line);
                continue;
            }

            if let Some(open) = Fence::parse(line) {
                fence = Some(open);
                blank_run = 0;
                lines.push(line);
                continue;
            }

            if line.trim().is_empty() {
                blank_run += 1;
                if blank_run > MAX_BLANK_LINES {
                    continue;
                }
            } else {
                blank_run = 0;
            }
            lines.push(line);
        }

        lines.join("\n")
    }
}

#[derive(Debug, Clone, Copy)]
struct Fence {
    marker: char,
    len: usize,
}

impl Fence {
    fn parse(line: &str) -> Option<Self> {
        let indent = line.len() - line.trim_start_matches(' ').len();
        if indent > 3 {
            return None;
        }
        let rest = &line[indent..];
        let marker = rest.chars().next().filter(|c| *c == '`' || *c == '~')?;
        let len = rest.chars().take_while(|c| *c == marker).count();
        (len >= 3).then_some(Fence { marker, len })
    }

    fn is_closed_by(&self, line: &str) -> bool {
        let trimmed = line.trim();
        let len = trimmed.chars().take_while(|c| *c == self.marker).count();
        len >= self.len && trimmed.chars().all(|c| c == self.marker)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

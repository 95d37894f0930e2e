//! Markdown to HTML conversion.
//!
//! [`ComrakConverter`] parses CommonMark with the GitHub extensions (tables,
//! strikethrough, autolinks, task lists, footnotes) and skips YAML front
//! matter. Before rendering, the AST is rewritten:
//!
//! - raw HTML blocks and inline HTML become literal text, so untrusted
//!   Markdown never injects live markup or script
//! - fenced code blocks become syntect-highlighted HTML with `hl-` prefixed
//!   classes (colors come from the style sheet)
//!
//! `==text==` renders as `<mark>` through comrak's highlight extension, which
//! never applies inside code or link destinations. After rendering, headings
//! get unique `id` attributes derived from their text (`overview`,
//! `overview-2`, ...).
//!
//! The output is an HTML fragment; the pipeline wraps it into a document.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use comrak::nodes::{AstNode, NodeHtmlBlock, NodeValue};
use comrak::options::Options;
use comrak::{Arena, format_html, parse_document};
use lol_html::{RewriteStrSettings, element, rewrite_str};
use once_cell::sync::Lazy;
use syntect::html::{ClassStyle, ClassedHTMLGenerator};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::LinesWithEndings;

use crate::context::ConversionContext;
use crate::error::{Md2PdfError, Result};

static SYNTAX_SET: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);

const CLASS_STYLE: ClassStyle = ClassStyle::SpacedPrefixed { prefix: "hl-" };

/// Converts Markdown text into an HTML fragment.
pub trait HtmlConverter: Send + Sync {
    /// # Errors
    ///
    /// - [`Md2PdfError::HtmlConversion`] on parser, highlighter or rewriter failure
    /// - the context's error if it is cancelled
    fn to_html(&self, ctx: &ConversionContext, markdown: &str) -> Result<String>;
}

/// Comrak-based converter with syntect highlighting.
pub struct ComrakConverter {
    options: Options<'static>,
}

impl ComrakConverter {
    pub fn new() -> Self {
        let mut options = Options::default();

        let ext = &mut options.extension;
        ext.strikethrough = true;
        ext.highlight = true;
        ext.tagfilter = false;
        ext.table = true;
        ext.autolink = true;
        ext.tasklist = true;
        ext.footnotes = true;
        ext.front_matter_delimiter = Some("---".to_string());

        let render = &mut options.render;
        render.github_pre_lang = true;
        render.tasklist_classes = true;
        // Only our own highlighted blocks reach the output as HTML; user
        // HTML is turned into text before rendering.
        render.r#unsafe = true;

        Self { options }
    }
}

impl Default for ComrakConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ComrakConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComrakConverter").finish_non_exhaustive()
    }
}

impl HtmlConverter for ComrakConverter {
    fn to_html(&self, ctx: &ConversionContext, markdown: &str) -> Result<String> {
        ctx.check()?;

        let arena = Arena::new();
        let root = parse_document(&arena, markdown, &self.options);

        let mut walker = RewriteWalker::default();
        walker.visit(root)?;

        ctx.check()?;
        let mut html = String::new();
        format_html(root, &self.options, &mut html)
            .map_err(|e| Md2PdfError::HtmlConversion(e.to_string()))?;

        apply_heading_ids(&html, &walker.slugs)
    }
}

// ============================================================================
// AST rewrite
// ============================================================================

#[derive(Default)]
struct RewriteWalker {
    slugger: Slugger,
    slugs: Vec<String>,
}

impl RewriteWalker {
    fn visit<'a>(&mut self, node: &'a AstNode<'a>) -> Result<()> {
        let replacement = {
            let data = node.data.borrow();
            match &data.value {
                NodeValue::HtmlBlock(block) => Some(NodeValue::Text(block.literal.clone().into())),
                NodeValue::HtmlInline(raw) => Some(NodeValue::Text(raw.clone().into())),
                NodeValue::CodeBlock(block) => {
                    let html = highlight_code(block.info.trim(), &block.literal)?;
                    Some(NodeValue::HtmlBlock(NodeHtmlBlock {
                        block_type: 0,
                        literal: html,
                    }))
                }
                NodeValue::Heading(_) => {
                    let text = collect_inline_text(node);
                    self.slugs.push(self.slugger.anchor_for(&text));
                    None
                }
                _ => None,
            }
        };

        if let Some(value) = replacement {
            node.data.borrow_mut().value = value;
            return Ok(());
        }

        let mut child = node.first_child();
        while let Some(next) = child {
            self.visit(next)?;
            child = next.next_sibling();
        }
        Ok(())
    }
}

fn collect_inline_text<'a>(node: &'a AstNode<'a>) -> String {
    fn walk<'a>(node: &'a AstNode<'a>, buffer: &mut String) {
        {
            let data = node.data.borrow();
            match &data.value {
                NodeValue::Text(text) => buffer.push_str(text),
                NodeValue::Code(code) => buffer.push_str(&code.literal),
                NodeValue::LineBreak | NodeValue::SoftBreak => buffer.push(' '),
                _ => {}
            }
        }
        let mut child = node.first_child();
        while let Some(next) = child {
            walk(next, buffer);
            child = next.next_sibling();
        }
    }

    let mut text = String::new();
    walk(node, &mut text);
    text
}

/// Unique anchor generator: `overview`, `overview-2`, `overview-3`.
#[derive(Debug, Default)]
struct Slugger {
    occurrences: HashMap<String, usize>,
}

impl Slugger {
    fn anchor_for(&mut self, heading: &str) -> String {
        let mut base = slug::slugify(heading.trim());
        if base.is_empty() {
            base = "section".to_string();
        }

        let count = self.occurrences.entry(base.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            base
        } else {
            format!("{base}-{count}")
        }
    }
}

// ============================================================================
// Syntax highlighting
// ============================================================================

fn highlight_code(info: &str, code: &str) -> Result<String> {
    let lang_token: String = info
        .split_whitespace()
        .next()
        .unwrap_or("text")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '+' | '#' | '.'))
        .collect::<String>()
        .to_ascii_lowercase();
    let lang_token = if lang_token.is_empty() {
        "text".to_string()
    } else {
        lang_token
    };

    let syntax = find_syntax(&SYNTAX_SET, &lang_token)
        .unwrap_or_else(|| SYNTAX_SET.find_syntax_plain_text());

    let mut code_with_newline = code.to_string();
    if !code_with_newline.ends_with('\n') {
        code_with_newline.push('\n');
    }

    let mut generator = ClassedHTMLGenerator::new_with_class_style(syntax, &SYNTAX_SET, CLASS_STYLE);
    for line in LinesWithEndings::from(code_with_newline.as_str()) {
        generator
            .parse_html_for_line_which_includes_newline(line)
            .map_err(|e| {
                Md2PdfError::HtmlConversion(format!("highlighting {} failed: {}", lang_token, e))
            })?;
    }

    Ok(format!(
        "<pre class=\"highlight\" data-language=\"{lang}\"><code class=\"language-{lang}\">{}</code></pre>\n",
        generator.finalize(),
        lang = lang_token
    ))
}

fn find_syntax<'a>(syntax_set: &'a SyntaxSet, token: &str) -> Option<&'a SyntaxReference> {
    syntax_set
        .find_syntax_by_token(token)
        .or_else(|| syntax_set.find_syntax_by_name(token))
        .or_else(|| syntax_set.find_syntax_by_extension(token))
}

// ============================================================================
// Heading ids
// ============================================================================

fn apply_heading_ids(html: &str, slugs: &[String]) -> Result<String> {
    if slugs.is_empty() {
        return Ok(html.to_string());
    }

    let slugs = Rc::new(slugs.to_vec());
    let index = Rc::new(RefCell::new(0usize));

    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!("h1, h2, h3, h4, h5, h6", {
                let slugs = Rc::clone(&slugs);
                let index = Rc::clone(&index);
                move |el| {
                    let mut idx = index.borrow_mut();
                    if let Some(slug) = slugs.get(*idx) {
                        el.set_attribute("id", slug)?;
                    }
                    *idx += 1;
                    Ok(())
                }
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|e| Md2PdfError::HtmlConversion(e.to_string()))
}

// ============================================================================
// Unit Tests
// ============================================================================

//! HTML injection chain.
//!
//! Each injector takes the current document and an optional feature block
//! and returns the augmented document. `None` returns the input unchanged.
//!
//! # Insertion points
//!
//! | Content | First choice | Fallback | Last resort |
//! |---------|--------------|----------|-------------|
//! | CSS | before `</head>` | after `<body…>` | prepend |
//! | Cover | after `<body…>` | – | prepend |
//! | TOC | after the cover block | after `<body…>` | prepend |
//! | Signature | before `</body>` | – | append |
//!
//! Tag matching is case-insensitive, so the chain also works on fragments
//! and hand-written HTML.
//!
//! # Escaping
//!
//! User text goes through askama's HTML escaping in markup and through
//! [`escape_css_string`] inside CSS string literals. Custom CSS cannot close
//! its `<style>` block.

use std::path::Path;

use askama::Template;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::context::ConversionContext;
use crate::error::{Md2PdfError, Result};
use crate::toc::{TocEntry, extract_headings, number_headings};
use crate::types::{
    CoverOptions, FooterOptions, ImageSource, PageBreakOptions, SignatureLink, SignatureOptions,
    TocOptions, WatermarkOptions,
};

/// Comment placed right after the cover block.
pub const COVER_END_MARKER: &str = "<!-- md2pdf:cover-end -->";

static HEAD_CLOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</head\s*>").expect("valid head regex"));

static BODY_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<body(?:\s[^>]*)?>").expect("valid body regex"));

static BODY_CLOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</body\s*>").expect("valid body close regex"));

// ============================================================================
// Insertion helpers
// ============================================================================

fn insert_at(html: &str, index: usize, snippet: &str) -> String {
    let mut out = String::with_capacity(html.len() + snippet.len());
    out.push_str(&html[..index]);
    out.push_str(snippet);
    out.push_str(&html[index..]);
    out
}

/// Insert before `</head>`, else after `<body…>`, else prepend.
pub fn insert_into_head(html: &str, snippet: &str) -> String {
    if let Some(m) = HEAD_CLOSE.find(html) {
        return insert_at(html, m.start(), snippet);
    }
    insert_after_body_open(html, snippet)
}

/// Insert after `<body…>`, else prepend.
pub fn insert_after_body_open(html: &str, snippet: &str) -> String {
    match BODY_OPEN.find(html) {
        Some(m) => insert_at(html, m.end(), snippet),
        None => insert_at(html, 0, snippet),
    }
}

/// Insert before the last `</body>`, else append.
pub fn insert_before_body_close(html: &str, snippet: &str) -> String {
    match BODY_CLOSE.find_iter(html).last() {
        Some(m) => insert_at(html, m.start(), snippet),
        None => insert_at(html, html.len(), snippet),
    }
}

/// Insert right after the first occurrence of `marker`.
///
/// Returns `None` when the marker is absent.
pub fn insert_after_marker(html: &str, marker: &str, snippet: &str) -> Option<String> {
    html.find(marker)
        .map(|i| insert_at(html, i + marker.len(), snippet))
}

// ============================================================================
// Escaping
// ============================================================================

/// Escape text for a double-quoted CSS string literal.
///
/// Backslashes, quotes, line breaks and `<` become CSS escapes, so the
/// value can neither end the string nor the surrounding `<style>` block.
///
/// # Example
///
/// ```rust
/// use md2pdf::inject::escape_css_string;
///
/// assert_eq!(escape_css_string("a\"b\\c\n"), r#"a\22 b\5c c\a "#);
/// ```
pub fn escape_css_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\5c "),
            '"' => out.push_str("\\22 "),
            '\'' => out.push_str("\\27 "),
            '\n' => out.push_str("\\a "),
            '\r' => out.push_str("\\d "),
            '<' => out.push_str("\\3c "),
            '>' => out.push_str("\\3e "),
            c if c.is_control() => out.push_str(&format!("\\{:x} ", c as u32)),
            c => out.push(c),
        }
    }
    out
}

/// Make CSS text safe to embed inside `<style>`.
fn neutralize_style_close(css: &str) -> String {
    css.replace("</", "<\\/")
}

// ============================================================================
// CSS
// ============================================================================

/// Wrap `css` in a `<style>` block and insert it into the head.
///
/// # Example
///
/// ```rust
/// use md2pdf::ConversionContext;
/// use md2pdf::inject::inject_css;
///
/// let ctx = ConversionContext::new();
/// let html = inject_css(&ctx, "<html><head></head><body>Hi</body></html>", Some("a{}")).unwrap();
/// assert_eq!(html, "<html><head><style>\na{}\n</style>\n</head><body>Hi</body></html>");
/// ```
pub fn inject_css(ctx: &ConversionContext, html: &str, css: Option<&str>) -> Result<String> {
    let Some(css) = css.filter(|c| !c.trim().is_empty()) else {
        return Ok(html.to_string());
    };
    ctx.check()?;
    let block = format!("<style>\n{}\n</style>\n", neutralize_style_close(css));
    Ok(insert_into_head(html, &block))
}

/// Stage interface for CSS injection.
pub trait CssInjector: Send + Sync {
    fn inject(&self, ctx: &ConversionContext, html: &str, css: Option<&str>) -> Result<String>;
}

/// Injects CSS as a `<style>` block, see [`inject_css`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StyleTagInjector;

impl CssInjector for StyleTagInjector {
    fn inject(&self, ctx: &ConversionContext, html: &str, css: Option<&str>) -> Result<String> {
        inject_css(ctx, html, css)
    }
}

// ============================================================================
// Document shell
// ============================================================================

#[derive(Template)]
#[template(path = "document.html")]
struct DocumentTemplate<'a> {
    title: &'a str,
    base_href: Option<String>,
    content: &'a str,
}

/// Wrap an HTML fragment into a complete document.
///
/// `base_dir` becomes a `<base href>` so relative links and images resolve
/// against the source file's directory.
pub fn wrap_document(fragment: &str, title: &str, base_dir: Option<&Path>) -> Result<String> {
    let base_href = base_dir.and_then(|dir| {
        let dir = std::path::absolute(dir).unwrap_or_else(|_| dir.to_path_buf());
        url::Url::from_directory_path(&dir).ok().map(String::from)
    });

    DocumentTemplate {
        title,
        base_href,
        content: fragment,
    }
    .render()
    .map_err(|e| Md2PdfError::DocumentTemplate(e.to_string()))
}

// ============================================================================
// Cover
// ============================================================================

#[derive(Template)]
#[template(path = "cover.html")]
struct CoverTemplate<'a> {
    title: &'a str,
    subtitle: Option<&'a str>,
    logo_src: Option<String>,
    author: Option<&'a str>,
    author_title: Option<&'a str>,
    organization: Option<&'a str>,
    date: Option<&'a str>,
    version: Option<&'a str>,
}

/// Insert a cover page right after `<body…>`, followed by [`COVER_END_MARKER`].
pub fn inject_cover(
    ctx: &ConversionContext,
    html: &str,
    cover: Option<&CoverOptions>,
    base_dir: Option<&Path>,
) -> Result<String> {
    let Some(cover) = cover else {
        return Ok(html.to_string());
    };
    ctx.check()?;

    let rendered = CoverTemplate {
        title: &cover.title,
        subtitle: cover.subtitle.as_deref(),
        logo_src: cover
            .logo
            .as_deref()
            .map(|logo| ImageSource::resolve(logo, base_dir).to_src()),
        author: cover.author.as_deref(),
        author_title: cover.author_title.as_deref(),
        organization: cover.organization.as_deref(),
        date: cover.date.as_deref(),
        version: cover.version.as_deref(),
    }
    .render()
    .map_err(|e| Md2PdfError::CoverTemplate(e.to_string()))?;

    let block = format!("\n{}\n{}\n", rendered, COVER_END_MARKER);
    Ok(insert_after_body_open(html, &block))
}

// ============================================================================
// Table of contents
// ============================================================================

#[derive(Template)]
#[template(path = "toc.html")]
struct TocTemplate<'a> {
    title: &'a str,
    entries: &'a [TocEntry],
}

/// Build a numbered TOC from the document's headings and insert it after
/// the cover (or after `<body…>` when there is no cover).
///
/// A document without qualifying headings gets no TOC.
pub fn inject_toc(
    ctx: &ConversionContext,
    html: &str,
    toc: Option<&TocOptions>,
) -> Result<String> {
    let Some(toc) = toc else {
        return Ok(html.to_string());
    };
    ctx.check()?;

    let (min, max) = toc.depth_range();
    let headings = extract_headings(html, min, max);
    if headings.is_empty() {
        log::debug!("📑 No headings in h{}..h{}, skipping TOC", min, max);
        return Ok(html.to_string());
    }
    let entries = number_headings(&headings);

    let rendered = TocTemplate {
        title: toc.title_or_default(),
        entries: &entries,
    }
    .render()
    .map_err(|e| Md2PdfError::TocTemplate(e.to_string()))?;

    let block = format!("\n{}\n", rendered);
    Ok(insert_after_marker(html, COVER_END_MARKER, &block)
        .unwrap_or_else(|| insert_after_body_open(html, &block)))
}

// ============================================================================
// Signature
// ============================================================================

#[derive(Template)]
#[template(path = "signature.html")]
struct SignatureTemplate<'a> {
    name: &'a str,
    title: Option<&'a str>,
    email: Option<&'a str>,
    organization: Option<&'a str>,
    image_src: Option<String>,
    links: &'a [SignatureLink],
}

/// Insert a signature block before `</body>`.
pub fn inject_signature(
    ctx: &ConversionContext,
    html: &str,
    signature: Option<&SignatureOptions>,
    base_dir: Option<&Path>,
) -> Result<String> {
    let Some(sig) = signature else {
        return Ok(html.to_string());
    };
    ctx.check()?;

    let rendered = SignatureTemplate {
        name: &sig.name,
        title: sig.title.as_deref(),
        email: sig.email.as_deref(),
        organization: sig.organization.as_deref(),
        image_src: sig
            .image
            .as_deref()
            .map(|image| ImageSource::resolve(image, base_dir).to_src()),
        links: &sig.links,
    }
    .render()
    .map_err(|e| Md2PdfError::SignatureTemplate(e.to_string()))?;

    let block = format!("\n{}\n", rendered);
    Ok(insert_before_body_close(html, &block))
}

// ============================================================================
// Footer
// ============================================================================

#[derive(Template)]
#[template(path = "footer.html")]
struct FooterTemplate<'a> {
    align: &'static str,
    parts: Vec<&'a str>,
    page_number: bool,
}

/// Browser-native footer template.
///
/// The browser renders it in an isolated context, so it carries its own
/// inline styles. `None` yields an empty template.
pub fn footer_template(footer: Option<&FooterOptions>) -> Result<String> {
    let Some(footer) = footer else {
        return Ok(String::new());
    };

    let parts: Vec<&str> = [
        footer.status.as_deref(),
        footer.text.as_deref(),
        footer.date.as_deref(),
    ]
    .into_iter()
    .flatten()
    .filter(|s| !s.trim().is_empty())
    .collect();

    FooterTemplate {
        align: footer.position.as_css(),
        parts,
        page_number: footer.page_number,
    }
    .render()
    .map_err(|e| Md2PdfError::FooterTemplate(e.to_string()))
}

// ============================================================================
// Watermark, page breaks
// ============================================================================

/// CSS drawing the watermark on every page.
///
/// Every `.` in the text is replaced with U+2024 ONE DOT LEADER so PDF
/// viewers do not turn the watermark into a link.
pub fn watermark_css(watermark: Option<&WatermarkOptions>) -> Option<String> {
    let wm = watermark?;
    let text = escape_css_string(&wm.text.replace('.', "\u{2024}"));
    Some(format!(
        r#"body::before {{
  content: "{text}";
  position: fixed;
  top: 50%;
  left: 50%;
  transform: translate(-50%, -50%) rotate({angle}deg);
  font-size: 96px;
  font-weight: 700;
  color: {color};
  opacity: {opacity};
  white-space: nowrap;
  pointer-events: none;
  z-index: 1000;
}}
"#,
        angle = wm.angle,
        color = wm.color,
        opacity = wm.opacity,
    ))
}

/// CSS for page breaks and orphan/widow control.
pub fn page_break_css(page_breaks: Option<&PageBreakOptions>) -> Option<String> {
    let pb = page_breaks?;
    let mut css = String::new();

    let breaking: Vec<&str> = [
        (pb.before_h1, "h1"),
        (pb.before_h2, "h2"),
        (pb.before_h3, "h3"),
    ]
    .into_iter()
    .filter_map(|(on, tag)| on.then_some(tag))
    .collect();

    if !breaking.is_empty() {
        let selector = breaking.join(", ");
        css.push_str(&format!("{selector} {{ break-before: page; }}\n"));
    }

    css.push_str(&format!(
        "p, li, blockquote {{ orphans: {}; widows: {}; }}\n",
        pb.effective_orphans(),
        pb.effective_widows()
    ));
    css.push_str("h1, h2, h3, h4, h5, h6 { break-after: avoid; }\n");
    css.push_str("pre, table, figure, img, blockquote { break-inside: avoid; }\n");
    Some(css)
}

/// Join the optional CSS pieces produced by stage (8).
pub fn compose_css(parts: &[Option<String>]) -> Option<String> {
    let joined: Vec<&str> = parts.iter().flatten().map(String::as_str).collect();
    (!joined.is_empty()).then(|| joined.join("\n"))
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ConversionContext {
        ConversionContext::new()
    }

    const DOC: &str = "<html><head></head><body>Hi</body></html>";

    /// Verifies CSS lands immediately before </head>.
    #[test]
    fn test_inject_css_before_head_close() {
        let html = inject_css(&ctx(), DOC, Some("a{}")).unwrap();
        assert_eq!(
            html,
            "<html><head><style>\na{}\n</style>\n</head><body>Hi</body></html>"
        );
    }

    /// Verifies CSS lands right after <body…> when there is no head.
    #[test]
    fn test_inject_css_without_head() {
        let html = inject_css(&ctx(), "<html><BODY class=\"x\">Hi</BODY></html>", Some("a{}")).unwrap();
        assert_eq!(
            html,
            "<html><BODY class=\"x\"><style>\na{}\n</style>\nHi</BODY></html>"
        );
    }

    /// Verifies CSS is prepended to bare fragments.
    #[test]
    fn test_inject_css_fragment() {
        let html = inject_css(&ctx(), "<p>Hi</p>", Some("a{}")).unwrap();
        assert!(html.starts_with("<style>"));
        assert!(html.ends_with("<p>Hi</p>"));
    }

    /// Verifies </style> in CSS cannot close the style block.
    #[test]
    fn test_inject_css_escapes_style_close() {
        let css = "a{}</style><script>alert(1)</script><style>";
        let html = inject_css(&ctx(), DOC, Some(css)).unwrap();
        let lower = html.to_ascii_lowercase();
        assert_eq!(lower.matches("</style").count(), 1, "{html}");
        assert!(!lower.contains("</script"), "{html}");
    }

    /// Verifies None and blank CSS are no-ops.
    #[test]
    fn test_inject_css_none() {
        assert_eq!(inject_css(&ctx(), DOC, None).unwrap(), DOC);
        assert_eq!(inject_css(&ctx(), DOC, Some("  ")).unwrap(), DOC);
    }

    /// Verifies a cancelled context aborts injection.
    #[test]
    fn test_inject_checks_context() {
        let ctx = ctx();
        ctx.cancel();
        assert!(matches!(
            inject_css(&ctx, DOC, Some("a{}")),
            Err(Md2PdfError::Cancelled)
        ));
    }

    /// Verifies the cover goes after <body> with its end marker and escapes text.
    #[test]
    fn test_inject_cover() {
        let cover = CoverOptions {
            title: "Q3 <Report>".to_string(),
            author: Some("Jane & John".to_string()),
            ..Default::default()
        };
        let html = inject_cover(&ctx(), DOC, Some(&cover), None).unwrap();
        let body = html.find("<body>").unwrap();
        let section = html.find("<section class=\"cover-page\">").unwrap();
        let marker = html.find(COVER_END_MARKER).unwrap();
        assert!(body < section && section < marker);
        assert!(html.contains("Q3 &lt;Report&gt;"), "{html}");
        assert!(html.contains("Jane &amp; John"), "{html}");
        assert!(!html.contains("cover-subtitle"), "Absent fields render nothing");
    }

    /// Verifies the TOC follows the cover and lists numbered headings.
    #[test]
    fn test_inject_toc_after_cover() {
        let doc = "<html><head></head><body><h1 id=\"intro\">Intro</h1><h2 id=\"a\">A &amp; B</h2></body></html>";
        let cover = CoverOptions {
            title: "T".to_string(),
            ..Default::default()
        };
        let html = inject_cover(&ctx(), doc, Some(&cover), None).unwrap();
        let html = inject_toc(&ctx(), &html, Some(&TocOptions::default())).unwrap();

        let marker = html.find(COVER_END_MARKER).unwrap();
        let toc = html.find("<nav class=\"toc\">").unwrap();
        let first_heading = html.find("<h1 id=\"intro\">").unwrap();
        assert!(marker < toc && toc < first_heading);
        assert!(html.contains("href=\"#intro\""));
        assert!(html.contains("<span class=\"toc-number\">1.1.</span> A &amp; B"), "{html}");
        assert!(html.contains("toc-depth-2"));
    }

    /// Verifies the TOC goes after <body> when there is no cover and is skipped without headings.
    #[test]
    fn test_inject_toc_without_cover() {
        let doc = "<body><h2 id=\"x\">X</h2></body>";
        let html = inject_toc(&ctx(), doc, Some(&TocOptions::default())).unwrap();
        assert!(html.starts_with("<body>\n<nav class=\"toc\">"), "{html}");

        let plain = "<body><p>No headings</p></body>";
        assert_eq!(
            inject_toc(&ctx(), plain, Some(&TocOptions::default())).unwrap(),
            plain
        );
    }

    /// Verifies the signature goes before </body> and escapes every field.
    #[test]
    fn test_inject_signature() {
        let sig = SignatureOptions {
            name: "<b>Eve</b>".to_string(),
            email: Some("eve@example.com".to_string()),
            links: vec![SignatureLink {
                label: "Site".to_string(),
                url: "https://example.com/?a=1&b=2".to_string(),
            }],
            ..Default::default()
        };
        let html = inject_signature(&ctx(), DOC, Some(&sig), None).unwrap();
        let sig_pos = html.find("<section class=\"signature\">").unwrap();
        let close = html.find("</body>").unwrap();
        assert!(sig_pos < close);
        assert!(html.contains("&lt;b&gt;Eve&lt;/b&gt;"), "{html}");
        assert!(html.contains("mailto:eve@example.com"), "{html}");
        assert!(html.contains("a=1&amp;b=2"), "{html}");
    }

    /// Verifies the signature is appended when </body> is missing.
    #[test]
    fn test_inject_signature_fragment() {
        let sig = SignatureOptions {
            name: "Eve".to_string(),
            ..Default::default()
        };
        let html = inject_signature(&ctx(), "<p>x</p>", Some(&sig), None).unwrap();
        assert!(html.starts_with("<p>x</p>"));
        assert!(html.trim_end().ends_with("</section>"));
    }

    /// Verifies footer templates escape text and include page counters.
    #[test]
    fn test_footer_template() {
        assert_eq!(footer_template(None).unwrap(), "");

        let footer = FooterOptions {
            position: crate::types::FooterPosition::Right,
            status: Some("<DRAFT>".to_string()),
            ..Default::default()
        };
        let html = footer_template(Some(&footer)).unwrap();
        assert!(html.contains("text-align: right"));
        assert!(html.contains("&lt;DRAFT&gt;"), "{html}");
        assert!(html.contains("class=\"pageNumber\""));
        assert!(html.contains("class=\"totalPages\""));
    }

    /// Verifies watermark text is CSS-escaped and dots are replaced.
    #[test]
    fn test_watermark_css() {
        assert!(watermark_css(None).is_none());

        let wm = WatermarkOptions::new("v1.2 \"draft\"</style>");
        let css = watermark_css(Some(&wm)).unwrap();
        assert!(css.contains("v1\u{2024}2"), "{css}");
        assert!(css.contains("\\22 draft\\22 "), "{css}");
        assert!(!css.contains("</style>"), "{css}");
        assert!(css.contains("rotate(-45deg)"));
        assert!(css.contains("opacity: 0.1"));
    }

    /// Verifies page-break rules and orphan/widow defaults.
    #[test]
    fn test_page_break_css() {
        assert!(page_break_css(None).is_none());

        let css = page_break_css(Some(&PageBreakOptions {
            before_h1: true,
            before_h2: true,
            before_h3: false,
            orphans: 0,
            widows: 4,
        }))
        .unwrap();
        assert!(css.contains("h1, h2 { break-before: page; }"), "{css}");
        assert!(css.contains("orphans: 2; widows: 4;"), "{css}");
    }

    /// Verifies the document shell escapes the title and adds a base href.
    #[test]
    fn test_wrap_document() {
        let html = wrap_document("<p>x</p>", "A & B", Some(Path::new("/docs/guide"))).unwrap();
        assert!(html.contains("<title>A &amp; B</title>"), "{html}");
        assert!(html.contains("<base href=\"file:///docs/guide/\">"), "{html}");
        assert!(html.contains("<p>x</p>"));

        let html = wrap_document("<p>x</p>", "T", None).unwrap();
        assert!(!html.contains("<base"));
    }

    /// Verifies the composed CSS skips absent pieces.
    #[test]
    fn test_compose_css() {
        assert!(compose_css(&[None, None]).is_none());
        assert_eq!(
            compose_css(&[Some("a{}".into()), None, Some("b{}".into())]).as_deref(),
            Some("a{}\nb{}")
        );
    }
}

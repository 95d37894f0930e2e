//! Conversion input and its optional feature blocks.
//!
//! A [`ConversionInput`] is an immutable description of one document: the
//! Markdown text plus every optional feature block. All blocks are validated
//! together by [`ConversionInput::validate`] before the pipeline does any
//! work, so an invalid watermark never costs a browser launch.
//!
//! # Overview
//!
//! | Type | Purpose | Default when absent |
//! |------|---------|---------------------|
//! | [`PageGeometry`] | Paper size, orientation, margin | Letter, portrait, 0.5in |
//! | [`FooterOptions`] | Browser-native footer | No footer |
//! | [`CoverOptions`] | Cover page | No cover |
//! | [`TocOptions`] | Table of contents | No TOC |
//! | [`SignatureOptions`] | Signature block | No signature |
//! | [`WatermarkOptions`] | Rotated background text | No watermark |
//! | [`PageBreakOptions`] | Break and orphan/widow rules | No extra rules |
//!
//! Numeric fields where `0` is not meaningful (margin, orphans, widows, TOC
//! depth) treat `0` as "use the default". Any other out-of-range value is a
//! typed validation error, never silently clamped.
//!
//! Every block deserializes from YAML (see
//! [`DocumentConfig`](crate::config::DocumentConfig)); enum fields go through
//! the same [`FromStr`] parsing the CLI uses.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::error::{Md2PdfError, Result};

/// Margin used when [`PageGeometry::margin`] is `0`.
pub const DEFAULT_MARGIN_INCHES: f64 = 0.5;

/// Accepted margin range in inches.
pub const MARGIN_RANGE: std::ops::RangeInclusive<f64> = 0.25..=3.0;

/// Orphans/widows value used when the field is `0`.
pub const DEFAULT_ORPHANS_WIDOWS: u32 = 2;

/// Default shallowest heading level included in the TOC.
pub const DEFAULT_TOC_MIN_DEPTH: u8 = 1;

/// Default deepest heading level included in the TOC.
pub const DEFAULT_TOC_MAX_DEPTH: u8 = 3;

/// Default TOC heading.
pub const DEFAULT_TOC_TITLE: &str = "Table of Contents";

static HEX_COLOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^#(?:[0-9a-fA-F]{3}|[0-9a-fA-F]{6})$").expect("valid hex color regex")
});

// ============================================================================
// Page Geometry
// ============================================================================

/// Supported paper sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum PageSize {
    /// US Letter, 8.5 x 11 in.
    #[default]
    Letter,
    /// ISO A4, 8.27 x 11.69 in.
    A4,
    /// US Legal, 8.5 x 14 in.
    Legal,
}

impl PageSize {
    /// Portrait `(width, height)` in inches.
    pub fn dimensions(self) -> (f64, f64) {
        match self {
            PageSize::Letter => (8.5, 11.0),
            PageSize::A4 => (8.27, 11.69),
            PageSize::Legal => (8.5, 14.0),
        }
    }
}

impl FromStr for PageSize {
    type Err = Md2PdfError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "letter" => Ok(PageSize::Letter),
            "a4" => Ok(PageSize::A4),
            "legal" => Ok(PageSize::Legal),
            _ => Err(Md2PdfError::InvalidPageSize(s.to_string())),
        }
    }
}

impl TryFrom<String> for PageSize {
    type Error = Md2PdfError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PageSize::Letter => "letter",
            PageSize::A4 => "a4",
            PageSize::Legal => "legal",
        })
    }
}

/// Page orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

impl FromStr for Orientation {
    type Err = Md2PdfError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "portrait" => Ok(Orientation::Portrait),
            "landscape" => Ok(Orientation::Landscape),
            _ => Err(Md2PdfError::InvalidOrientation(s.to_string())),
        }
    }
}

impl TryFrom<String> for Orientation {
    type Error = Md2PdfError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// Paper size, orientation and uniform margin.
///
/// # Example
///
/// ```rust
/// use md2pdf::{Orientation, PageGeometry, PageSize};
///
/// let page = PageGeometry {
///     size: PageSize::A4,
///     orientation: Orientation::Landscape,
///     margin: 0.0,
/// };
///
/// assert!(page.validate().is_ok());
/// assert_eq!(page.paper_dimensions(), (11.69, 8.27));
/// assert_eq!(page.effective_margin(), 0.5);
/// ```
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PageGeometry {
    pub size: PageSize,
    pub orientation: Orientation,
    /// Margin in inches on all four sides; `0` means [`DEFAULT_MARGIN_INCHES`].
    pub margin: f64,
}

impl PageGeometry {
    /// # Errors
    ///
    /// [`Md2PdfError::InvalidMargin`] when the margin is neither `0` nor in
    /// [`MARGIN_RANGE`].
    pub fn validate(&self) -> Result<()> {
        if self.margin != 0.0 && !MARGIN_RANGE.contains(&self.margin) {
            return Err(Md2PdfError::InvalidMargin(self.margin));
        }
        Ok(())
    }

    /// Margin with the `0` sentinel resolved.
    pub fn effective_margin(&self) -> f64 {
        if self.margin == 0.0 {
            DEFAULT_MARGIN_INCHES
        } else {
            self.margin
        }
    }

    /// `(width, height)` in inches, swapped for landscape.
    pub fn paper_dimensions(&self) -> (f64, f64) {
        let (w, h) = self.size.dimensions();
        match self.orientation {
            Orientation::Portrait => (w, h),
            Orientation::Landscape => (h, w),
        }
    }
}

// ============================================================================
// Footer
// ============================================================================

/// Horizontal alignment of the footer line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum FooterPosition {
    Left,
    #[default]
    Center,
    Right,
}

impl FooterPosition {
    /// CSS `text-align` value.
    pub fn as_css(self) -> &'static str {
        match self {
            FooterPosition::Left => "left",
            FooterPosition::Center => "center",
            FooterPosition::Right => "right",
        }
    }
}

impl FromStr for FooterPosition {
    type Err = Md2PdfError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(FooterPosition::Left),
            "center" | "centre" => Ok(FooterPosition::Center),
            "right" => Ok(FooterPosition::Right),
            _ => Err(Md2PdfError::InvalidFooterPosition(s.to_string())),
        }
    }
}

impl TryFrom<String> for FooterPosition {
    type Error = Md2PdfError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// Footer rendered by the browser on every page.
///
/// Presence of a footer also reserves extra bottom margin, see
/// [`RenderOptions`](crate::RenderOptions).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FooterOptions {
    pub position: FooterPosition,
    /// Show "page / total".
    pub page_number: bool,
    pub date: Option<String>,
    /// Document status, e.g. `DRAFT`.
    pub status: Option<String>,
    /// Free text.
    pub text: Option<String>,
}

impl Default for FooterOptions {
    fn default() -> Self {
        Self {
            position: FooterPosition::Center,
            page_number: true,
            date: None,
            status: None,
            text: None,
        }
    }
}

// ============================================================================
// Cover, Signature
// ============================================================================

/// Cover page shown before the document body.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoverOptions {
    pub title: String,
    pub subtitle: Option<String>,
    /// Logo path (relative to the input's base directory) or URL.
    pub logo: Option<String>,
    pub author: Option<String>,
    pub author_title: Option<String>,
    pub organization: Option<String>,
    pub date: Option<String>,
    pub version: Option<String>,
}

/// A labelled link in the signature block.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignatureLink {
    pub label: String,
    pub url: String,
}

/// Signature block appended at the end of the body.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SignatureOptions {
    pub name: String,
    pub title: Option<String>,
    pub email: Option<String>,
    pub organization: Option<String>,
    /// Image path (relative to the input's base directory) or URL.
    pub image: Option<String>,
    pub links: Vec<SignatureLink>,
}

/// Where an image reference points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// `http:`, `https:`, `data:` or `file:` URL, used as-is.
    Url(String),
    /// Local file, absolute.
    File(PathBuf),
}

impl ImageSource {
    /// Classify `src` and resolve relative paths against `base_dir`.
    pub fn resolve(src: &str, base_dir: Option<&Path>) -> Self {
        let lower = src.to_ascii_lowercase();
        if ["http://", "https://", "data:", "file:"]
            .iter()
            .any(|p| lower.starts_with(p))
        {
            return ImageSource::Url(src.to_string());
        }
        let path = Path::new(src);
        let path = match base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        };
        ImageSource::File(std::path::absolute(&path).unwrap_or(path))
    }

    /// Value usable in an `src` attribute.
    pub fn to_src(&self) -> String {
        match self {
            ImageSource::Url(url) => url.clone(),
            ImageSource::File(path) => url::Url::from_file_path(path)
                .map(String::from)
                .unwrap_or_else(|_| path.display().to_string()),
        }
    }

    fn require(&self, what: &'static str) -> Result<()> {
        match self {
            ImageSource::File(path) if !path.is_file() => Err(Md2PdfError::MissingFile {
                what,
                path: path.clone(),
            }),
            _ => Ok(()),
        }
    }
}

// ============================================================================
// TOC, Watermark, Page Breaks
// ============================================================================

/// Table of contents built from the document headings.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TocOptions {
    /// Heading shown above the list; defaults to [`DEFAULT_TOC_TITLE`].
    pub title: Option<String>,
    /// Shallowest heading level, `0` means [`DEFAULT_TOC_MIN_DEPTH`].
    pub min_depth: u8,
    /// Deepest heading level, `0` means [`DEFAULT_TOC_MAX_DEPTH`].
    pub max_depth: u8,
}

impl TocOptions {
    /// `(min, max)` with sentinels resolved.
    pub fn depth_range(&self) -> (u8, u8) {
        let min = if self.min_depth == 0 {
            DEFAULT_TOC_MIN_DEPTH
        } else {
            self.min_depth
        };
        let max = if self.max_depth == 0 {
            DEFAULT_TOC_MAX_DEPTH.max(min)
        } else {
            self.max_depth
        };
        (min, max)
    }

    pub fn title_or_default(&self) -> &str {
        self.title.as_deref().unwrap_or(DEFAULT_TOC_TITLE)
    }

    /// # Errors
    ///
    /// [`Md2PdfError::InvalidTocDepth`] unless `1 <= min <= max <= 6`.
    pub fn validate(&self) -> Result<()> {
        let (min, max) = self.depth_range();
        if !(1..=6).contains(&min) || !(1..=6).contains(&max) || min > max {
            return Err(Md2PdfError::InvalidTocDepth { min, max });
        }
        Ok(())
    }
}

/// Large rotated text drawn over every page at low opacity.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatermarkOptions {
    pub text: String,
    /// `#rgb` or `#rrggbb`.
    pub color: String,
    /// `0.0` to `1.0`.
    pub opacity: f64,
    /// Degrees, `-90` to `90`.
    pub angle: f64,
}

impl Default for WatermarkOptions {
    fn default() -> Self {
        Self {
            text: String::new(),
            color: "#888888".to_string(),
            opacity: 0.1,
            angle: -45.0,
        }
    }
}

impl WatermarkOptions {
    /// Watermark with default styling.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(Md2PdfError::EmptyWatermarkText);
        }
        if !HEX_COLOR.is_match(&self.color) {
            return Err(Md2PdfError::InvalidWatermarkColor(self.color.clone()));
        }
        if !(0.0..=1.0).contains(&self.opacity) {
            return Err(Md2PdfError::InvalidWatermarkOpacity(self.opacity));
        }
        if !(-90.0..=90.0).contains(&self.angle) {
            return Err(Md2PdfError::InvalidWatermarkAngle(self.angle));
        }
        Ok(())
    }
}

/// Page-break and pagination rules.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PageBreakOptions {
    pub before_h1: bool,
    pub before_h2: bool,
    pub before_h3: bool,
    /// `0` means [`DEFAULT_ORPHANS_WIDOWS`].
    pub orphans: u32,
    /// `0` means [`DEFAULT_ORPHANS_WIDOWS`].
    pub widows: u32,
}

impl Default for PageBreakOptions {
    fn default() -> Self {
        Self {
            before_h1: true,
            before_h2: false,
            before_h3: false,
            orphans: 0,
            widows: 0,
        }
    }
}

impl PageBreakOptions {
    pub fn effective_orphans(&self) -> u32 {
        if self.orphans == 0 {
            DEFAULT_ORPHANS_WIDOWS
        } else {
            self.orphans
        }
    }

    pub fn effective_widows(&self) -> u32 {
        if self.widows == 0 {
            DEFAULT_ORPHANS_WIDOWS
        } else {
            self.widows
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=5).contains(&self.effective_orphans()) {
            return Err(Md2PdfError::InvalidOrphans(self.orphans));
        }
        if !(1..=5).contains(&self.effective_widows()) {
            return Err(Md2PdfError::InvalidWidows(self.widows));
        }
        Ok(())
    }
}

// ============================================================================
// Conversion Input
// ============================================================================

/// Everything needed to convert one document.
///
/// # Example
///
/// ```rust
/// use md2pdf::{ConversionInput, TocOptions, WatermarkOptions};
///
/// let input = ConversionInput::new("# Report\n\nBody text.")
///     .with_toc(TocOptions::default())
///     .with_watermark(WatermarkOptions::new("DRAFT"));
///
/// assert!(input.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConversionInput {
    pub markdown: String,
    /// Custom CSS replacing the default style.
    pub css: Option<String>,
    /// Directory relative links and images resolve against.
    pub base_dir: Option<PathBuf>,
    pub page: PageGeometry,
    pub footer: Option<FooterOptions>,
    pub cover: Option<CoverOptions>,
    pub toc: Option<TocOptions>,
    pub signature: Option<SignatureOptions>,
    pub watermark: Option<WatermarkOptions>,
    pub page_breaks: Option<PageBreakOptions>,
}

impl ConversionInput {
    pub fn new(markdown: impl Into<String>) -> Self {
        Self {
            markdown: markdown.into(),
            ..Default::default()
        }
    }

    /// Copy of this input's options with a different document body.
    ///
    /// Used by batch conversion, where one template applies to many files.
    pub fn for_document(&self, markdown: String, base_dir: Option<PathBuf>) -> Self {
        Self {
            markdown,
            base_dir,
            ..self.clone()
        }
    }

    pub fn with_css(mut self, css: impl Into<String>) -> Self {
        self.css = Some(css.into());
        self
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn with_page(mut self, page: PageGeometry) -> Self {
        self.page = page;
        self
    }

    pub fn with_footer(mut self, footer: FooterOptions) -> Self {
        self.footer = Some(footer);
        self
    }

    pub fn with_cover(mut self, cover: CoverOptions) -> Self {
        self.cover = Some(cover);
        self
    }

    pub fn with_toc(mut self, toc: TocOptions) -> Self {
        self.toc = Some(toc);
        self
    }

    pub fn with_signature(mut self, signature: SignatureOptions) -> Self {
        self.signature = Some(signature);
        self
    }

    pub fn with_watermark(mut self, watermark: WatermarkOptions) -> Self {
        self.watermark = Some(watermark);
        self
    }

    pub fn with_page_breaks(mut self, page_breaks: PageBreakOptions) -> Self {
        self.page_breaks = Some(page_breaks);
        self
    }

    /// Validate the layout blocks: page, TOC, page breaks and watermark.
    ///
    /// Batch conversion calls this once on its template before any file is
    /// read; image paths depend on each input's directory and are checked
    /// per document.
    pub fn validate_layout(&self) -> Result<()> {
        self.page.validate()?;
        if let Some(toc) = &self.toc {
            toc.validate()?;
        }
        if let Some(page_breaks) = &self.page_breaks {
            page_breaks.validate()?;
        }
        if let Some(watermark) = &self.watermark {
            watermark.validate()?;
        }
        Ok(())
    }

    /// Validate every feature block except the Markdown body.
    pub fn validate_options(&self) -> Result<()> {
        self.validate_layout()?;
        let base_dir = self.base_dir.as_deref();
        if let Some(logo) = self.cover.as_ref().and_then(|c| c.logo.as_deref()) {
            ImageSource::resolve(logo, base_dir).require("cover logo")?;
        }
        if let Some(image) = self.signature.as_ref().and_then(|s| s.image.as_deref()) {
            ImageSource::resolve(image, base_dir).require("signature image")?;
        }
        Ok(())
    }

    /// Validate the whole input.
    ///
    /// # Errors
    ///
    /// The first validation error found; see
    /// [`Md2PdfError::is_validation`].
    pub fn validate(&self) -> Result<()> {
        if self.markdown.trim().is_empty() {
            return Err(Md2PdfError::EmptyInput);
        }
        self.validate_options()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

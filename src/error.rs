//! Error types for Markdown to PDF conversion.
//!
//! This module provides [`Md2PdfError`], a unified error type for every
//! pipeline stage, the browser lifecycle and the pool, and a convenient
//! [`Result`] type alias.
//!
//! # Error Kinds
//!
//! | Kind | Variants | When |
//! |------|----------|------|
//! | Validation | `Invalid*`, `EmptyWatermarkText`, `MissingFile`, `EmptyInput`, `OutputConflict` | Before any work starts |
//! | Stage | `HtmlConversion`, `*Template`, `StyleNotFound`, `Asset`, `BrowserConnect`, `PageCreate`, `PageLoad`, `PdfGeneration`, `Io` | While a stage runs |
//! | Lifecycle | `BrowserLaunch`, `RendererClosed`, `Configuration` | Renderer/pool setup and teardown |
//! | Context | `Cancelled`, `DeadlineExceeded` | Returned as-is, never wrapped |
//!
//! Every stage failure has its own variant, so callers branch with `match`
//! instead of inspecting messages.
//!
//! # Example
//!
//! ```rust
//! use md2pdf::{Md2PdfError, Result};
//!
//! fn render() -> Result<Vec<u8>> {
//!     Err(Md2PdfError::Cancelled)
//! }
//!
//! match render() {
//!     Ok(pdf) => println!("Generated {} bytes", pdf.len()),
//!     Err(e) if e.is_cancellation() => println!("Conversion was cancelled"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::path::{Path, PathBuf};

/// Errors that can occur while converting Markdown to PDF.
///
/// Validation variants are produced by
/// [`ConversionInput::validate`](crate::ConversionInput::validate) before any
/// work starts. Stage variants identify the pipeline step that failed.
#[derive(Debug, thiserror::Error)]
pub enum Md2PdfError {
    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------
    /// Page size is not one of `letter`, `a4`, `legal`.
    #[error("Invalid page size '{0}' (expected letter, a4 or legal)")]
    InvalidPageSize(String),

    /// Orientation is not `portrait` or `landscape`.
    #[error("Invalid orientation '{0}' (expected portrait or landscape)")]
    InvalidOrientation(String),

    /// Margin outside `[0.25, 3.0]` inches.
    #[error("Invalid margin {0} (expected 0.25 to 3.0 inches, or 0 for the default)")]
    InvalidMargin(f64),

    /// Footer position is not `left`, `center` or `right`.
    #[error("Invalid footer position '{0}' (expected left, center or right)")]
    InvalidFooterPosition(String),

    /// TOC depth window outside `1..=6` or inverted.
    #[error("Invalid TOC depth range {min}..={max} (expected 1 <= min <= max <= 6)")]
    InvalidTocDepth {
        /// Requested shallowest level.
        min: u8,
        /// Requested deepest level.
        max: u8,
    },

    /// Orphans outside `1..=5`.
    #[error("Invalid orphans value {0} (expected 1 to 5, or 0 for the default)")]
    InvalidOrphans(u32),

    /// Widows outside `1..=5`.
    #[error("Invalid widows value {0} (expected 1 to 5, or 0 for the default)")]
    InvalidWidows(u32),

    /// Watermark color is not a `#rgb` or `#rrggbb` hex color.
    #[error("Invalid watermark color '{0}' (expected #rgb or #rrggbb)")]
    InvalidWatermarkColor(String),

    /// Watermark opacity outside `[0, 1]`.
    #[error("Invalid watermark opacity {0} (expected 0.0 to 1.0)")]
    InvalidWatermarkOpacity(f64),

    /// Watermark angle outside `[-90, 90]` degrees.
    #[error("Invalid watermark angle {0} (expected -90 to 90 degrees)")]
    InvalidWatermarkAngle(f64),

    /// Watermark block present with blank text.
    #[error("Watermark text must not be empty")]
    EmptyWatermarkText,

    /// A referenced image (cover logo, signature image) does not exist.
    #[error("{what} not found: {}", path.display())]
    MissingFile {
        /// What the file was for, e.g. `"cover logo"`.
        what: &'static str,
        /// Resolved path that was checked.
        path: PathBuf,
    },

    /// Markdown input contained nothing but whitespace.
    #[error("Markdown input is empty")]
    EmptyInput,

    /// Two batch inputs map to the same output file, e.g. `a.md` and
    /// `a.markdown`.
    #[error("{} is already produced from {}", output.display(), first.display())]
    OutputConflict {
        /// The contested output path.
        output: PathBuf,
        /// The input that claimed it first.
        first: PathBuf,
    },

    // ------------------------------------------------------------------
    // Stage
    // ------------------------------------------------------------------
    /// Markdown to HTML conversion failed.
    #[error("HTML conversion failed: {0}")]
    HtmlConversion(String),

    /// Cover page template rendering failed.
    #[error("Cover template rendering failed: {0}")]
    CoverTemplate(String),

    /// Table of contents template rendering failed.
    #[error("TOC template rendering failed: {0}")]
    TocTemplate(String),

    /// Signature block template rendering failed.
    #[error("Signature template rendering failed: {0}")]
    SignatureTemplate(String),

    /// Footer template rendering failed.
    #[error("Footer template rendering failed: {0}")]
    FooterTemplate(String),

    /// Document shell template rendering failed.
    #[error("Document template rendering failed: {0}")]
    DocumentTemplate(String),

    /// Named style does not exist in any asset source.
    #[error("Style '{0}' not found")]
    StyleNotFound(String),

    /// Asset source failed for a reason other than "not found".
    #[error("Asset loading failed: {0}")]
    Asset(String),

    /// Browser validation or DevTools connection failed.
    #[error("Browser connection failed: {0}")]
    BrowserConnect(String),

    /// Opening a new tab failed.
    #[error("Page creation failed: {0}")]
    PageCreate(String),

    /// Navigating to the document or waiting for load failed.
    #[error("Page load failed: {0}")]
    PageLoad(String),

    /// `Page.printToPDF` failed.
    #[error("PDF generation failed: {0}")]
    PdfGeneration(String),

    /// File system failure on a specific path.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Path being read or written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------
    /// Launching the browser process failed.
    ///
    /// # Common Causes
    ///
    /// - Chrome/Chromium binary not found and download disabled or offline
    /// - Invalid `CHROME_PATH`
    /// - Sandbox unavailable (containers without `--no-sandbox`)
    #[error("Failed to launch browser: {0}")]
    BrowserLaunch(String),

    /// Renderer was used after [`PdfRenderer::close`](crate::PdfRenderer::close).
    #[error("Renderer is closed")]
    RendererClosed,

    /// Invalid configuration provided.
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ------------------------------------------------------------------
    // Context
    // ------------------------------------------------------------------
    /// The conversion context was cancelled.
    #[error("Conversion cancelled")]
    Cancelled,

    /// The conversion context deadline passed.
    #[error("Conversion deadline exceeded")]
    DeadlineExceeded,
}

impl Md2PdfError {
    /// Check if this is an input validation error.
    ///
    /// Validation errors are raised before any stage runs.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidPageSize(_)
                | Self::InvalidOrientation(_)
                | Self::InvalidMargin(_)
                | Self::InvalidFooterPosition(_)
                | Self::InvalidTocDepth { .. }
                | Self::InvalidOrphans(_)
                | Self::InvalidWidows(_)
                | Self::InvalidWatermarkColor(_)
                | Self::InvalidWatermarkOpacity(_)
                | Self::InvalidWatermarkAngle(_)
                | Self::EmptyWatermarkText
                | Self::MissingFile { .. }
                | Self::EmptyInput
                | Self::OutputConflict { .. }
        )
    }

    /// Check if this error came from the conversion context.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }

    /// Check if retrying the conversion might succeed.
    ///
    /// Browser-side failures are transient (a crashed tab or process);
    /// validation and template errors will fail again with the same input.
    ///
    /// # Example
    ///
    /// ```rust
    /// use md2pdf::Md2PdfError;
    ///
    /// assert!(Md2PdfError::PageLoad("timeout".into()).is_retryable());
    /// assert!(!Md2PdfError::InvalidMargin(9.0).is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::BrowserLaunch(_)
                | Self::BrowserConnect(_)
                | Self::PageCreate(_)
                | Self::PageLoad(_)
                | Self::PdfGeneration(_)
        )
    }
}

/// Builds a closure that tags an [`std::io::Error`] with the path it concerns.
///
/// Used with `map_err` on file system calls.
pub(crate) fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> Md2PdfError + '_ {
    move |source| Md2PdfError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Convenience conversion from [`String`] to [`Md2PdfError::Configuration`].
///
/// Allows using the `?` operator with builder functions that return
/// `String` errors.
///
/// # Example
///
/// ```rust
/// use md2pdf::Md2PdfError;
///
/// let error: Md2PdfError = "invalid configuration".to_string().into();
/// assert!(matches!(error, Md2PdfError::Configuration(_)));
/// ```
impl From<String> for Md2PdfError {
    fn from(msg: String) -> Self {
        Md2PdfError::Configuration(msg)
    }
}

/// Convenience conversion from `&str` to [`Md2PdfError::Configuration`].
impl From<&str> for Md2PdfError {
    fn from(msg: &str) -> Self {
        Md2PdfError::Configuration(msg.to_string())
    }
}

/// Result type alias using [`Md2PdfError`].
pub type Result<T> = std::result::Result<T, Md2PdfError>;

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Verifies error type conversions from String and &str.
    #[test]
    fn test_error_conversion() {
        let error: Md2PdfError = "test error".into();
        match error {
            Md2PdfError::Configuration(msg) => {
                assert_eq!(msg, "test error", "Error message should be preserved");
            }
            _ => panic!("Expected Configuration error variant"),
        }

        let error: Md2PdfError = "another error".to_string().into();
        assert!(matches!(error, Md2PdfError::Configuration(ref m) if m == "another error"));
    }

    /// Verifies that stage errors carry a stage-identifying prefix.
    #[test]
    fn test_error_display() {
        let error = Md2PdfError::SignatureTemplate("missing field".to_string());
        assert_eq!(
            error.to_string(),
            "Signature template rendering failed: missing field"
        );

        let error = Md2PdfError::HtmlConversion("bad input".to_string());
        assert_eq!(error.to_string(), "HTML conversion failed: bad input");

        let error = Md2PdfError::MissingFile {
            what: "cover logo",
            path: PathBuf::from("/tmp/logo.png"),
        };
        assert_eq!(error.to_string(), "cover logo not found: /tmp/logo.png");
    }

    /// Verifies the kind helpers partition the variants.
    #[test]
    fn test_error_kinds() {
        assert!(Md2PdfError::InvalidWatermarkOpacity(2.0).is_validation());
        assert!(Md2PdfError::InvalidTocDepth { min: 4, max: 2 }.is_validation());
        assert!(!Md2PdfError::PageLoad("x".into()).is_validation());
        let conflict = Md2PdfError::OutputConflict {
            output: PathBuf::from("out/a.pdf"),
            first: PathBuf::from("docs/a.markdown"),
        };
        assert!(conflict.is_validation());
        assert_eq!(
            conflict.to_string(),
            "out/a.pdf is already produced from docs/a.markdown"
        );

        assert!(Md2PdfError::Cancelled.is_cancellation());
        assert!(Md2PdfError::DeadlineExceeded.is_cancellation());
        assert!(!Md2PdfError::RendererClosed.is_cancellation());

        assert!(Md2PdfError::PdfGeneration("x".into()).is_retryable());
        assert!(!Md2PdfError::Cancelled.is_retryable());
        assert!(!Md2PdfError::CoverTemplate("x".into()).is_retryable());
    }

    /// Verifies that io_error keeps both the path and the source error.
    #[test]
    fn test_io_error_helper() {
        let path = Path::new("/nonexistent/input.md");
        let error = io_error(path)(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no such file",
        ));

        match &error {
            Md2PdfError::Io { path, source } => {
                assert_eq!(path, Path::new("/nonexistent/input.md"));
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("Expected Io variant, got {:?}", other),
        }
        assert!(std::error::Error::source(&error).is_some());
    }
}

//! Conversion pipeline orchestration.
//!
//! A [`ConversionService`] turns one [`ConversionInput`] into PDF bytes. It
//! owns one renderer, so a service is used by a single caller at a time and
//! normally lives in a [`ServicePool`](crate::ServicePool).
//!
//! # Stages
//!
//! ```text
//! markdown ──▶ preprocess ──▶ to_html ──▶ wrap_document ──▶ css
//!                                                            │
//!   PDF ◀── render ◀── temp file ◀── watermark/breaks ◀── cover ▶ toc ▶ signature
//! ```
//!
//! | # | Stage | Failure |
//! |---|-------|---------|
//! | 0 | Validate every option block | validation variants |
//! | 1 | [`Preprocessor`] | infallible |
//! | 2 | [`HtmlConverter`] | [`Md2PdfError::HtmlConversion`] |
//! | 3 | Wrap in a full document | [`Md2PdfError::DocumentTemplate`] |
//! | 4 | Custom CSS or the default style | [`Md2PdfError::StyleNotFound`] / [`Md2PdfError::Asset`] |
//! | 5 | Cover after `<body>` | [`Md2PdfError::CoverTemplate`] |
//! | 6 | TOC after the cover | [`Md2PdfError::TocTemplate`] |
//! | 7 | Signature before `</body>` | [`Md2PdfError::SignatureTemplate`] |
//! | 8 | Watermark and page-break CSS | none |
//! | 9 | Temp file, then [`PdfRenderer`] | [`Md2PdfError::Io`] / renderer variants |
//!
//! The context is checked between stages; cancellation and deadline errors
//! come back as-is. A failed stage ends the conversion, nothing is retried.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::assets::{AssetLoader, asset_loader};
use crate::config::{ConverterConfig, DEFAULT_STYLE};
use crate::context::ConversionContext;
use crate::error::{Md2PdfError, Result};
use crate::inject::{self, CssInjector, StyleTagInjector};
use crate::markdown::{ComrakConverter, HtmlConverter};
use crate::preprocess::{MarkdownPreprocessor, Preprocessor};
use crate::renderer::{PdfRenderer, RenderOptions};
use crate::toc::extract_headings;
use crate::types::ConversionInput;

/// Title used when a document has neither a cover nor a heading.
const FALLBACK_TITLE: &str = "Document";

/// Settings shared by every service in a pool.
#[derive(Clone)]
pub struct ServiceOptions {
    pub assets: Arc<dyn AssetLoader>,
    /// Style used when an input carries no custom CSS.
    pub default_style: String,
}

impl ServiceOptions {
    pub fn from_config(config: &ConverterConfig) -> Self {
        Self {
            assets: asset_loader(config.style_dir.as_deref()),
            default_style: config.style.clone(),
        }
    }
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            assets: asset_loader(None),
            default_style: DEFAULT_STYLE.to_string(),
        }
    }
}

impl std::fmt::Debug for ServiceOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceOptions")
            .field("default_style", &self.default_style)
            .finish_non_exhaustive()
    }
}

/// The Markdown to PDF pipeline.
///
/// # Example
///
/// ```rust,ignore
/// use md2pdf::{ChromeRendererFactory, ConversionContext, ConversionInput, ConversionService};
/// use md2pdf::RendererFactory;
///
/// let renderer = ChromeRendererFactory::with_defaults().create()?;
/// let mut service = ConversionService::new(renderer, Default::default());
///
/// let pdf = service.convert(&ConversionContext::new(), &ConversionInput::new("# Hello"))?;
/// std::fs::write("hello.pdf", pdf)?;
/// ```
pub struct ConversionService {
    id: u64,
    preprocessor: Box<dyn Preprocessor>,
    converter: Box<dyn HtmlConverter>,
    css_injector: Box<dyn CssInjector>,
    renderer: Box<dyn PdfRenderer>,
    options: ServiceOptions,
}

impl ConversionService {
    /// Service with the standard stages around `renderer`.
    pub fn new(renderer: Box<dyn PdfRenderer>, options: ServiceOptions) -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(0);

        Self {
            id: NEXT_ID.fetch_add(1, Ordering::SeqCst),
            preprocessor: Box::new(MarkdownPreprocessor),
            converter: Box::new(ComrakConverter::new()),
            css_injector: Box::new(StyleTagInjector),
            renderer,
            options,
        }
    }

    pub fn with_preprocessor(mut self, preprocessor: impl Preprocessor + 'static) -> Self {
        self.preprocessor = Box::new(preprocessor);
        self
    }

    pub fn with_converter(mut self, converter: impl HtmlConverter + 'static) -> Self {
        self.converter = Box::new(converter);
        self
    }

    pub fn with_css_injector(mut self, injector: impl CssInjector + 'static) -> Self {
        self.css_injector = Box::new(injector);
        self
    }

    /// Unique id, stable for the service's lifetime.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Convert Markdown to PDF bytes.
    ///
    /// # Errors
    ///
    /// Validation errors before any work, then the first failing stage's
    /// error. See the module docs for the table.
    pub fn convert(&mut self, ctx: &ConversionContext, input: &ConversionInput) -> Result<Vec<u8>> {
        let html = self.convert_to_html(ctx, input)?;
        self.render_pdf(ctx, input, &html)
    }

    /// Run every stage except rendering and return the final HTML.
    pub fn convert_to_html(&self, ctx: &ConversionContext, input: &ConversionInput) -> Result<String> {
        input.validate()?;
        ctx.check()?;

        log::debug!(
            "📝 Service {} converting {} bytes of Markdown",
            self.id,
            input.markdown.len()
        );

        let markdown = self.preprocessor.preprocess(&input.markdown);

        ctx.check()?;
        let fragment = self.converter.to_html(ctx, &markdown)?;

        ctx.check()?;
        let title = document_title(input, &fragment);
        let base_dir = input.base_dir.as_deref();
        let html = inject::wrap_document(&fragment, &title, base_dir)?;

        ctx.check()?;
        let css = match &input.css {
            Some(css) => css.clone(),
            None => self.options.assets.load_style(&self.options.default_style)?,
        };
        let html = self.css_injector.inject(ctx, &html, Some(&css))?;

        let html = inject::inject_cover(ctx, &html, input.cover.as_ref(), base_dir)?;
        let html = inject::inject_toc(ctx, &html, input.toc.as_ref())?;
        let html = inject::inject_signature(ctx, &html, input.signature.as_ref(), base_dir)?;

        let extra = inject::compose_css(&[
            inject::watermark_css(input.watermark.as_ref()),
            inject::page_break_css(input.page_breaks.as_ref()),
        ]);
        let html = self.css_injector.inject(ctx, &html, extra.as_deref())?;

        ctx.check()?;
        Ok(html)
    }

    /// Render finished HTML through a temporary file.
    pub fn render_pdf(
        &mut self,
        ctx: &ConversionContext,
        input: &ConversionInput,
        html: &str,
    ) -> Result<Vec<u8>> {
        ctx.check()?;
        let options = RenderOptions::from_input(&input.page, input.footer.as_ref())?;

        let temp_dir = std::env::temp_dir();
        let mut file = tempfile::Builder::new()
            .prefix("md2pdf-")
            .suffix(".html")
            .tempfile()
            .map_err(crate::error::io_error(&temp_dir))?;
        file.write_all(html.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|source| Md2PdfError::Io {
                path: file.path().to_path_buf(),
                source,
            })?;

        let pdf = self.renderer.render_from_file(ctx, file.path(), &options)?;
        log::debug!("✅ Service {} produced {} bytes of PDF", self.id, pdf.len());
        Ok(pdf)
    }

    /// Close the renderer. Later conversions fail with
    /// [`Md2PdfError::RendererClosed`].
    pub fn close(&mut self) -> Result<()> {
        log::debug!("🛑 Closing service {}", self.id);
        self.renderer.close()
    }
}

impl std::fmt::Debug for ConversionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionService")
            .field("id", &self.id)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Cover title, else the first heading, else a fixed fallback.
fn document_title(input: &ConversionInput, fragment: &str) -> String {
    if let Some(cover) = &input.cover {
        if !cover.title.trim().is_empty() {
            return cover.title.clone();
        }
    }
    extract_headings(fragment, 1, 6)
        .into_iter()
        .map(|h| h.text)
        .find(|t| !t.is_empty())
        .unwrap_or_else(|| FALLBACK_TITLE.to_string())
}

// ============================================================================
// Unit Tests
// ============================================================================

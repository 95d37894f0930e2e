//! # md2pdf
//!
//! Markdown to PDF conversion through headless Chrome, with cover pages,
//! numbered tables of contents, signatures, footers and watermarks.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │ BatchConverter   discover ─▶ semaphore ─▶ spawn_blocking per file    │
//! └────────────────────────────────┬─────────────────────────────────────┘
//!                                  │ acquire / release (RAII)
//! ┌────────────────────────────────▼─────────────────────────────────────┐
//! │ ServicePool      bounded queue of lazily created services            │
//! └────────────────────────────────┬─────────────────────────────────────┘
//!                                  │
//! ┌────────────────────────────────▼─────────────────────────────────────┐
//! │ ConversionService                                                    │
//! │   preprocess ─▶ markdown ─▶ document ─▶ css ─▶ cover ─▶ toc ─▶       │
//! │   signature ─▶ watermark/page breaks ─▶ PdfRenderer                  │
//! └────────────────────────────────┬─────────────────────────────────────┘
//!                                  │ one browser process per service
//! ┌────────────────────────────────▼─────────────────────────────────────┐
//! │ BrowserRenderer  launch ─▶ tab ─▶ navigate ─▶ print ─▶ close + kill  │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use md2pdf::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ConverterConfigBuilder::new().workers(2).build()?;
//!     let pool = Arc::new(ServicePool::from_config(&config));
//!
//!     let template = ConversionInput::default()
//!         .with_toc(TocOptions::default())
//!         .with_footer(FooterOptions::default());
//!
//!     let report = BatchConverter::new(Arc::clone(&pool), template)
//!         .run(&ConversionContext::new(), "docs".as_ref(), Some("out".as_ref()))
//!         .await?;
//!
//!     pool.close()?;
//!     println!("{} converted, {} failed", report.succeeded(), report.failed);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `env-config` | ✅ | Load [`ConverterConfig`] from environment / `app.env` |
//! | `cli` | ✅ | The `md2pdf` binary |
//! | `test-utils` | | [`factory::mock`] for tests without Chrome |
//!
//! ## Cancellation
//!
//! Every stage takes a [`ConversionContext`]. Cancelling it, or passing its
//! deadline, stops the conversion at the next stage boundary with
//! [`Md2PdfError::Cancelled`] or [`Md2PdfError::DeadlineExceeded`].

#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// Modules
// ============================================================================

pub mod assets;
pub mod batch;
pub mod config;
pub mod context;
pub mod error;
pub mod factory;
pub mod handle;
pub mod inject;
pub mod markdown;
pub mod pool;
pub mod prelude;
pub mod preprocess;
pub mod renderer;
pub mod service;
pub mod stats;
pub mod toc;
pub mod types;

// ============================================================================
// Re-exports (Public API)
// ============================================================================

pub use assets::{AssetError, AssetLoader, DirectoryAssets, EmbeddedAssets};
pub use batch::{BatchConverter, BatchReport, ConversionResult};
pub use config::{ConverterConfig, ConverterConfigBuilder, DocumentConfig};
pub use context::ConversionContext;
pub use error::{Md2PdfError, Result};
pub use factory::{ChromeRendererFactory, RendererFactory, create_chrome_options};
pub use handle::ServiceHandle;
pub use inject::{CssInjector, StyleTagInjector};
pub use markdown::{ComrakConverter, HtmlConverter};
pub use pool::{ServicePool, ServicePoolBuilder};
pub use preprocess::{MarkdownPreprocessor, Preprocessor};
pub use renderer::{BrowserRenderer, PdfRenderer, RenderOptions};
pub use service::{ConversionService, ServiceOptions};
pub use stats::PoolStats;
pub use toc::{HeadingInfo, NumberingState, TocEntry};
pub use types::{
    ConversionInput, CoverOptions, FooterOptions, FooterPosition, Orientation, PageBreakOptions,
    PageGeometry, PageSize, SignatureLink, SignatureOptions, TocOptions, WatermarkOptions,
};

// Feature-gated re-exports
#[cfg(feature = "env-config")]
pub use config::env::{chrome_path_from_env, from_env};

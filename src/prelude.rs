//! Convenience imports.
//!
//! ```rust,ignore
//! use md2pdf::prelude::*;
//! ```

pub use crate::batch::{BatchConverter, BatchReport, ConversionResult};
pub use crate::config::{ConverterConfig, ConverterConfigBuilder, DocumentConfig};
pub use crate::context::ConversionContext;
pub use crate::error::{Md2PdfError, Result};
pub use crate::factory::{ChromeRendererFactory, RendererFactory};
pub use crate::handle::ServiceHandle;
pub use crate::pool::ServicePool;
pub use crate::renderer::PdfRenderer;
pub use crate::service::ConversionService;
pub use crate::types::{
    ConversionInput, CoverOptions, FooterOptions, PageBreakOptions, PageGeometry,
    SignatureOptions, TocOptions, WatermarkOptions,
};

#[cfg(feature = "env-config")]
pub use crate::config::env::from_env;

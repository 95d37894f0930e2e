//! Renderer factories.
//!
//! The pool never constructs renderers itself. It asks a [`RendererFactory`]
//! whenever an empty slot is first used, which keeps browser specifics out of
//! the pool and lets tests swap in [`mock::MockRendererFactory`].
//!
//! | Factory | Description |
//! |---------|-------------|
//! | [`ChromeRendererFactory`] | Lazily launched headless Chrome/Chromium |
//! | [`mock::MockRendererFactory`] | In-process fake (feature `test-utils`) |
//!
//! # Custom Factory
//!
//! ```rust,ignore
//! use md2pdf::{PdfRenderer, RendererFactory, Result};
//!
//! struct RemoteFactory { endpoint: String }
//!
//! impl RendererFactory for RemoteFactory {
//!     fn create(&self) -> Result<Box<dyn PdfRenderer>> {
//!         Ok(Box::new(RemoteRenderer::connect(&self.endpoint)?))
//!     }
//! }
//! ```

pub(crate) mod chrome;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use chrome::{ChromeRendererFactory, create_chrome_options};

use crate::error::Result;
use crate::renderer::PdfRenderer;

/// Creates renderers for pooled services.
pub trait RendererFactory: Send + Sync {
    /// Build a new renderer.
    ///
    /// Implementations may defer expensive start-up to the first render.
    fn create(&self) -> Result<Box<dyn PdfRenderer>>;
}

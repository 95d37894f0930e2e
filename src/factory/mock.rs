//! Mock renderer factory for testing.
//!
//! [`MockRendererFactory`] hands out [`MockRenderer`]s that "print" by
//! returning a tiny fake PDF, so pool, service and batch behavior can be
//! tested without Chrome installed.
//!
//! # Feature Flag
//!
//! Available when the `test-utils` feature is enabled or under `#[cfg(test)]`.
//!
//! # Example
//!
//! ```rust,ignore
//! use md2pdf::factory::mock::MockRendererFactory;
//!
//! // Renders fail for any HTML containing "FAIL-ME"
//! let factory = MockRendererFactory::new().fail_on("FAIL-ME");
//!
//! // Every renderer creation fails
//! let factory = MockRendererFactory::always_fails("Chrome not installed");
//! ```

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::RendererFactory;
use crate::context::ConversionContext;
use crate::error::{Md2PdfError, Result};
use crate::renderer::{PdfRenderer, RenderOptions};

/// Bytes returned by every successful mock render.
pub const MOCK_PDF: &[u8] = b"%PDF-1.4\n% md2pdf mock\n%%EOF\n";

/// Counters shared by a factory and every renderer it created.
#[derive(Debug, Default)]
pub struct MockCounters {
    created: AtomicUsize,
    closed: AtomicUsize,
    renders: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockCounters {
    /// Renderers created.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Renderers closed (first close only).
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Render calls that reached the fake browser.
    pub fn renders(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }

    /// Highest number of renders observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// Factory for [`MockRenderer`]s.
#[derive(Debug, Clone, Default)]
pub struct MockRendererFactory {
    fail_marker: Option<String>,
    launch_error: Option<String>,
    delay: Duration,
    counters: Arc<MockCounters>,
}

impl MockRendererFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory whose `create()` always fails with [`Md2PdfError::BrowserLaunch`].
    pub fn always_fails<S: Into<String>>(message: S) -> Self {
        Self {
            launch_error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Fail renders whose HTML contains `marker`.
    pub fn fail_on<S: Into<String>>(mut self, marker: S) -> Self {
        self.fail_marker = Some(marker.into());
        self
    }

    /// Sleep this long inside every render.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Shared counters.
    pub fn counters(&self) -> Arc<MockCounters> {
        Arc::clone(&self.counters)
    }
}

impl RendererFactory for MockRendererFactory {
    fn create(&self) -> Result<Box<dyn PdfRenderer>> {
        if let Some(message) = &self.launch_error {
            log::debug!("MockRendererFactory: Returning configured failure");
            return Err(Md2PdfError::BrowserLaunch(message.clone()));
        }

        let n = self.counters.created.fetch_add(1, Ordering::SeqCst);
        log::debug!("MockRendererFactory: Created renderer #{}", n + 1);
        Ok(Box::new(MockRenderer {
            fail_marker: self.fail_marker.clone(),
            delay: self.delay,
            counters: Arc::clone(&self.counters),
            closed: false,
        }))
    }
}

/// In-process [`PdfRenderer`] that never starts a browser.
#[derive(Debug)]
pub struct MockRenderer {
    fail_marker: Option<String>,
    delay: Duration,
    counters: Arc<MockCounters>,
    closed: bool,
}

impl PdfRenderer for MockRenderer {
    fn render_from_file(
        &mut self,
        ctx: &ConversionContext,
        path: &Path,
        _options: &RenderOptions,
    ) -> Result<Vec<u8>> {
        ctx.check()?;
        if self.closed {
            return Err(Md2PdfError::RendererClosed);
        }

        let html = std::fs::read_to_string(path).map_err(crate::error::io_error(path))?;

        let running = self.counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_in_flight.fetch_max(running, Ordering::SeqCst);
        self.counters.renders.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);

        ctx.check()?;
        if let Some(marker) = &self.fail_marker {
            if html.contains(marker.as_str()) {
                return Err(Md2PdfError::PdfGeneration(format!(
                    "mock failure on marker '{marker}'"
                )));
            }
        }
        Ok(MOCK_PDF.to_vec())
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn html_file(dir: &tempfile::TempDir, body: &str) -> std::path::PathBuf {
        let path = dir.path().join("doc.html");
        std::fs::write(&path, body).unwrap();
        path
    }

    /// Verifies always_fails returns BrowserLaunch and creates nothing.
    #[test]
    fn test_always_fails() {
        let factory = MockRendererFactory::always_fails("Test error");
        match factory.create() {
            Err(Md2PdfError::BrowserLaunch(msg)) => assert_eq!(msg, "Test error"),
            _ => panic!("Expected BrowserLaunch error"),
        }
        assert_eq!(factory.counters().created(), 0);
    }

    /// Verifies renders return the fake PDF and honor the failure marker.
    #[test]
    fn test_render_and_marker() {
        let dir = tempfile::tempdir().unwrap();
        let factory = MockRendererFactory::new().fail_on("BOOM");
        let mut renderer = factory.create().unwrap();
        let ctx = ConversionContext::new();

        let ok = html_file(&dir, "<p>fine</p>");
        assert_eq!(
            renderer.render_from_file(&ctx, &ok, &RenderOptions::default()).unwrap(),
            MOCK_PDF
        );

        let bad = html_file(&dir, "<p>BOOM</p>");
        assert!(matches!(
            renderer.render_from_file(&ctx, &bad, &RenderOptions::default()),
            Err(Md2PdfError::PdfGeneration(_))
        ));
        assert_eq!(factory.counters().renders(), 2);
    }

    /// Verifies close is counted once and blocks later renders.
    #[test]
    fn test_close_once() {
        let dir = tempfile::tempdir().unwrap();
        let factory = MockRendererFactory::new();
        let mut renderer = factory.create().unwrap();

        renderer.close().unwrap();
        renderer.close().unwrap();
        assert_eq!(factory.counters().closed(), 1);

        let path = html_file(&dir, "x");
        assert!(matches!(
            renderer.render_from_file(&ConversionContext::new(), &path, &RenderOptions::default()),
            Err(Md2PdfError::RendererClosed)
        ));
    }
}

//! Chrome/Chromium renderer factory.
//!
//! # Example
//!
//! ```rust,ignore
//! use md2pdf::ChromeRendererFactory;
//!
//! // Auto-detect Chrome (or download one with the `fetch` feature)
//! let factory = ChromeRendererFactory::with_defaults();
//!
//! // Or specify a binary
//! let factory = ChromeRendererFactory::with_path("/usr/bin/chromium");
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use headless_chrome::LaunchOptions;

use super::RendererFactory;
use crate::config::{ConverterConfig, DEFAULT_TIMEOUT};
use crate::error::{Md2PdfError, Result};
use crate::renderer::{BrowserRenderer, LaunchOptionsFn, PdfRenderer};

/// How long an idle pooled browser stays connected.
const IDLE_BROWSER_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Factory for [`BrowserRenderer`]s sharing one launch configuration.
pub struct ChromeRendererFactory {
    launch_options_fn: LaunchOptionsFn,
    timeout: Duration,
}

impl ChromeRendererFactory {
    /// Create a factory with custom launch options.
    ///
    /// The closure runs once per browser launch.
    pub fn new<F>(launch_options_fn: F, timeout: Duration) -> Self
    where
        F: Fn() -> Result<LaunchOptions<'static>> + Send + Sync + 'static,
    {
        Self {
            launch_options_fn: Arc::new(launch_options_fn),
            timeout,
        }
    }

    /// Auto-detected browser, sandbox enabled, default timeout.
    pub fn with_defaults() -> Self {
        log::debug!("🔧 Creating ChromeRendererFactory with auto-detect");
        Self::new(|| create_chrome_options(None, true), DEFAULT_TIMEOUT)
    }

    /// Specific browser binary, sandbox enabled, default timeout.
    pub fn with_path(chrome_path: impl Into<PathBuf>) -> Self {
        let chrome_path = chrome_path.into();
        log::debug!("🔧 Creating ChromeRendererFactory with custom path: {:?}", chrome_path);
        Self::new(
            move || create_chrome_options(Some(&chrome_path), true),
            DEFAULT_TIMEOUT,
        )
    }

    /// Factory matching a [`ConverterConfig`].
    pub fn from_config(config: &ConverterConfig) -> Self {
        let chrome_path = config.chrome_path.clone();
        let sandbox = config.sandbox;
        if !sandbox {
            log::warn!("⚠️ Chrome sandbox disabled");
        }
        Self::new(
            move || create_chrome_options(chrome_path.as_deref(), sandbox),
            config.timeout,
        )
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl RendererFactory for ChromeRendererFactory {
    fn create(&self) -> Result<Box<dyn PdfRenderer>> {
        log::trace!("ChromeRendererFactory::create() called");
        Ok(Box::new(BrowserRenderer::new(
            Arc::clone(&self.launch_options_fn),
            self.timeout,
        )))
    }
}

impl std::fmt::Debug for ChromeRendererFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChromeRendererFactory")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Launch options for stable headless printing.
///
/// With `chrome_path` unset, `headless_chrome` looks for an installed
/// browser and downloads one if none is found.
///
/// # Errors
///
/// Returns [`Md2PdfError::Configuration`] if the options fail to build.
pub fn create_chrome_options(
    chrome_path: Option<&Path>,
    sandbox: bool,
) -> Result<LaunchOptions<'static>> {
    match chrome_path {
        Some(path) => log::debug!("🔧 Creating Chrome options with custom path: {:?}", path),
        None => log::debug!("🔧 Creating Chrome options (auto-detect browser)"),
    }

    let mut builder = LaunchOptions::default_builder();

    if let Some(path) = chrome_path {
        builder.path(Some(path.to_path_buf()));
    }

    builder
        .headless(true)
        .sandbox(sandbox)
        .idle_browser_timeout(IDLE_BROWSER_TIMEOUT)
        .disable_default_args(true)
        .args(vec![
            // ===== Memory =====
            "--disable-dev-shm-usage".as_ref(),
            "--disable-crash-reporter".as_ref(),

            // ===== GPU and Rendering =====
            "--disable-gpu-compositing".as_ref(),
            "--disable-software-rasterizer".as_ref(),
            "--disable-accelerated-2d-canvas".as_ref(),
            "--disable-webgl".as_ref(),

            // ===== Unnecessary Features =====
            "--disable-extensions".as_ref(),
            "--disable-plugins".as_ref(),
            "--disable-sync".as_ref(),
            "--disable-default-apps".as_ref(),
            "--no-first-run".as_ref(),
            "--mute-audio".as_ref(),

            // ===== Local Files =====
            // Documents load stylesheets and images relative to their source
            "--allow-file-access-from-files".as_ref(),

            // ===== Stability =====
            "--disable-background-timer-throttling".as_ref(),
            "--disable-backgrounding-occluded-windows".as_ref(),
            "--disable-hang-monitor".as_ref(),
            "--disable-renderer-backgrounding".as_ref(),
            "--disable-ipc-flooding-protection".as_ref(),
        ])
        .build()
        .map_err(|e| {
            log::error!(
                "❌ Failed to build Chrome launch options (path: {:?}): {}",
                chrome_path,
                e
            );
            Md2PdfError::Configuration(e.to_string())
        })
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Verifies launch options build with and without a custom path.
    #[test]
    fn test_create_chrome_options() {
        let result = create_chrome_options(None, true);
        assert!(result.is_ok(), "Auto-detect options should build: {:?}", result.err());

        let options = create_chrome_options(Some(Path::new("/custom/chrome")), false).unwrap();
        assert_eq!(options.path, Some(PathBuf::from("/custom/chrome")));
        assert!(!options.sandbox);
        assert!(options.headless);
    }

    /// Verifies create() defers launching, so it succeeds without Chrome.
    #[test]
    fn test_create_is_lazy() {
        let factory = ChromeRendererFactory::with_path("/definitely/not/chrome");
        let mut renderer = factory.create().unwrap();
        renderer.close().unwrap();
    }

    /// Verifies from_config carries the configured timeout.
    #[test]
    fn test_from_config() {
        let config = ConverterConfig {
            timeout: Duration::from_secs(7),
            ..ConverterConfig::default()
        };
        assert_eq!(ChromeRendererFactory::from_config(&config).timeout(), Duration::from_secs(7));
    }
}

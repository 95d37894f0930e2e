//! Configuration for converter resources and per-document options.
//!
//! This module provides two layers of configuration:
//!
//! | Type | Scope | Source |
//! |------|-------|--------|
//! | [`ConverterConfig`] | Process: workers, browser, styles | Builder, environment, CLI |
//! | [`DocumentConfig`] | Document: page, cover, TOC, footer... | YAML file, CLI |
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use md2pdf::ConverterConfigBuilder;
//!
//! let config = ConverterConfigBuilder::new()
//!     .workers(4)
//!     .timeout(Duration::from_secs(120))
//!     .style("technical")
//!     .build()
//!     .expect("Invalid configuration");
//!
//! assert_eq!(config.workers, 4);
//! assert_eq!(config.style, "technical");
//! ```
//!
//! # Environment Configuration
//!
//! When the `env-config` feature is enabled, you can load configuration
//! from environment variables and an optional `app.env` file:
//!
//! ```rust,ignore
//! use md2pdf::config::env::from_env;
//!
//! let config = from_env()?;
//! ```
//!
//! See [`mod@env`] module for available environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Md2PdfError, Result, io_error};
use crate::types::{
    ConversionInput, CoverOptions, FooterOptions, ImageSource, PageBreakOptions, PageGeometry,
    SignatureOptions, TocOptions, WatermarkOptions,
};

/// Name of the embedded style used when none is configured.
pub const DEFAULT_STYLE: &str = "default";

/// Default per-operation browser timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Process-level converter configuration.
///
/// # Fields Overview
///
/// | Field | Default | Description |
/// |-------|---------|-------------|
/// | `workers` | 0 (auto) | Pool size and batch concurrency |
/// | `timeout` | 60s | Per-operation browser timeout |
/// | `chrome_path` | auto | Chrome binary; downloaded if none found |
/// | `sandbox` | true | Chrome sandbox |
/// | `style` | `default` | Style used when no custom CSS is given |
/// | `style_dir` | none | Directory checked for styles before embedded ones |
#[derive(Debug, Clone)]
pub struct ConverterConfig {
    /// Number of pooled services and concurrent conversions.
    ///
    /// `0` sizes the pool from available parallelism, see
    /// [`resolve_pool_size`](crate::pool::resolve_pool_size).
    pub workers: usize,

    /// Upper bound for each browser operation (navigate, print).
    ///
    /// A shorter context deadline always wins.
    pub timeout: Duration,

    /// Chrome/Chromium binary.
    pub chrome_path: Option<PathBuf>,

    /// Run Chrome with its sandbox.
    ///
    /// Containers usually need this disabled.
    pub sandbox: bool,

    /// Style name resolved through the asset loader.
    pub style: String,

    /// Directory of `<name>.css` files overriding the embedded styles.
    pub style_dir: Option<PathBuf>,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            timeout: DEFAULT_TIMEOUT,
            chrome_path: None,
            sandbox: true,
            style: DEFAULT_STYLE.to_string(),
            style_dir: None,
        }
    }
}

/// Builder for [`ConverterConfig`] with validation.
///
/// # Example
///
/// ```rust
/// use md2pdf::ConverterConfigBuilder;
///
/// let config = ConverterConfigBuilder::new()
///     .sandbox(false)
///     .chrome_path("/usr/bin/chromium")
///     .build()
///     .unwrap();
///
/// assert!(!config.sandbox);
/// ```
pub struct ConverterConfigBuilder {
    config: ConverterConfig,
}

impl ConverterConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ConverterConfig::default(),
        }
    }

    /// Set the worker count (`0` = automatic).
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    /// Set the per-operation browser timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn chrome_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.chrome_path = Some(path.into());
        self
    }

    pub fn sandbox(mut self, enabled: bool) -> Self {
        self.config.sandbox = enabled;
        self
    }

    pub fn style(mut self, name: impl Into<String>) -> Self {
        self.config.style = name.into();
        self
    }

    pub fn style_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.style_dir = Some(dir.into());
        self
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// - Returns error if `timeout` is zero
    /// - Returns error if `style` is blank
    pub fn build(self) -> std::result::Result<ConverterConfig, String> {
        if self.config.timeout.is_zero() {
            return Err("timeout must be greater than 0".to_string());
        }

        if self.config.style.trim().is_empty() {
            return Err("style must not be empty".to_string());
        }

        Ok(self.config)
    }
}

impl Default for ConverterConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Document Configuration (YAML)
// ============================================================================

/// Per-document options loaded from a YAML file.
///
/// Every key is optional; absent blocks stay disabled.
///
/// ```text
/// style: technical
/// css: ./custom.css
/// page: { size: a4, orientation: portrait, margin: 0.75 }
/// footer: { position: right, page_number: true, status: DRAFT }
/// cover: { title: Quarterly Report, author: Jane Doe, logo: logo.png }
/// toc: { title: Contents, max_depth: 2 }
/// signature: { name: Jane Doe, links: [{ label: Site, url: https://example.com }] }
/// watermark: { text: CONFIDENTIAL, opacity: 0.08 }
/// page_breaks: { before_h2: true, orphans: 3 }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DocumentConfig {
    /// Style name; overrides [`ConverterConfig::style`].
    pub style: Option<String>,
    /// Custom CSS file replacing the style.
    pub css: Option<PathBuf>,
    pub page: Option<PageGeometry>,
    pub footer: Option<FooterOptions>,
    pub cover: Option<CoverOptions>,
    pub toc: Option<TocOptions>,
    pub signature: Option<SignatureOptions>,
    pub watermark: Option<WatermarkOptions>,
    pub page_breaks: Option<PageBreakOptions>,
}

impl DocumentConfig {
    /// Load from a YAML file.
    ///
    /// Relative `css`, cover logo and signature image paths are resolved
    /// against the file's directory.
    ///
    /// # Errors
    ///
    /// - [`Md2PdfError::Io`] if the file cannot be read
    /// - [`Md2PdfError::Configuration`] if the YAML is malformed
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(io_error(path))?;
        let mut config = Self::from_yaml(&text)
            .map_err(|e| Md2PdfError::Configuration(format!("{}: {}", path.display(), e)))?;

        if let Some(dir) = path.parent() {
            config.resolve_paths(dir);
        }
        log::debug!("📄 Loaded document configuration from {:?}", path);
        Ok(config)
    }

    /// Anchor relative local paths to `dir`.
    fn resolve_paths(&mut self, dir: &Path) {
        if let Some(css) = self.css.as_mut() {
            if css.is_relative() {
                *css = dir.join(&*css);
            }
        }
        let images = self
            .cover
            .as_mut()
            .and_then(|c| c.logo.as_mut())
            .into_iter()
            .chain(self.signature.as_mut().and_then(|s| s.image.as_mut()));
        for image in images {
            if let ImageSource::File(path) = ImageSource::resolve(image, Some(dir)) {
                *image = path.display().to_string();
            }
        }
    }

    /// Parse YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`Md2PdfError::Configuration`] if the YAML is malformed or
    /// contains unknown keys.
    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|e| Md2PdfError::Configuration(e.to_string()))
    }

    /// Turn into a conversion template (empty Markdown body).
    ///
    /// Reads the custom CSS file if one is set.
    ///
    /// # Errors
    ///
    /// Returns [`Md2PdfError::Io`] if the CSS file cannot be read.
    pub fn into_input(self) -> Result<ConversionInput> {
        let css = match &self.css {
            Some(path) => Some(std::fs::read_to_string(path).map_err(io_error(path))?),
            None => None,
        };

        Ok(ConversionInput {
            markdown: String::new(),
            css,
            base_dir: None,
            page: self.page.unwrap_or_default(),
            footer: self.footer,
            cover: self.cover,
            toc: self.toc,
            signature: self.signature,
            watermark: self.watermark,
            page_breaks: self.page_breaks,
        })
    }
}

// ============================================================================
// Environment Configuration (feature-gated)
// ============================================================================

/// Environment-based configuration loading.
///
/// This module is only available when the `env-config` feature is enabled.
///
/// # Environment Variables
///
/// | Variable | Type | Default | Description |
/// |----------|------|---------|-------------|
/// | `MD2PDF_WORKERS` | usize | 0 (auto) | Pool size |
/// | `MD2PDF_TIMEOUT_SECONDS` | u64 | 60 | Browser operation timeout |
/// | `MD2PDF_NO_SANDBOX` | bool | false | Disable Chrome sandbox |
/// | `MD2PDF_STYLE` | String | `default` | Default style name |
/// | `MD2PDF_STYLE_DIR` | String | none | Style override directory |
/// | `CHROME_PATH` | String | auto | Custom Chrome binary path |
///
/// # Example `app.env` File
///
/// ```text
/// MD2PDF_WORKERS=4
/// MD2PDF_TIMEOUT_SECONDS=90
/// MD2PDF_NO_SANDBOX=true
/// # CHROME_PATH=/usr/bin/google-chrome
/// ```
#[cfg(feature = "env-config")]
pub mod env {
    use super::*;

    /// Default environment file name.
    pub const ENV_FILE_NAME: &str = "app.env";

    /// Load environment variables from `app.env` file.
    pub fn load_env_file() -> std::result::Result<PathBuf, dotenvy::Error> {
        dotenvy::from_filename(ENV_FILE_NAME)
    }

    fn flag(value: &str) -> bool {
        matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    }

    /// Load configuration from environment variables.
    ///
    /// Also loads `app.env` if present (via `dotenvy`). Unparseable numbers
    /// fall back to defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Md2PdfError::Configuration`] if the resulting values are invalid.
    pub fn from_env() -> Result<ConverterConfig> {
        match load_env_file() {
            Ok(path) => {
                log::info!("📁 Loaded configuration from: {:?}", path);
            }
            Err(e) => {
                log::debug!(
                    "📁 No {} file found or failed to load: {} (using environment variables and defaults)",
                    ENV_FILE_NAME,
                    e
                );
            }
        }

        let workers = std::env::var("MD2PDF_WORKERS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);

        let timeout_seconds = std::env::var("MD2PDF_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT.as_secs());

        let no_sandbox = std::env::var("MD2PDF_NO_SANDBOX")
            .map(|s| flag(&s))
            .unwrap_or(false);

        let style = std::env::var("MD2PDF_STYLE").unwrap_or_else(|_| DEFAULT_STYLE.to_string());

        log::debug!("🔧 Converter configuration from environment:");
        log::debug!("   - Workers: {}", workers);
        log::debug!("   - Timeout: {}s", timeout_seconds);
        log::debug!("   - Sandbox: {}", !no_sandbox);
        log::debug!("   - Style: {}", style);

        let mut builder = ConverterConfigBuilder::new()
            .workers(workers)
            .timeout(Duration::from_secs(timeout_seconds))
            .sandbox(!no_sandbox)
            .style(style);

        if let Some(dir) = std::env::var_os("MD2PDF_STYLE_DIR") {
            builder = builder.style_dir(dir);
        }
        if let Some(path) = chrome_path_from_env() {
            builder = builder.chrome_path(path);
        }

        builder.build().map_err(Md2PdfError::Configuration)
    }

    /// Get Chrome path from environment.
    ///
    /// Reads `CHROME_PATH`. Call [`load_env_file`] first if you rely on
    /// `app.env`.
    pub fn chrome_path_from_env() -> Option<String> {
        std::env::var("CHROME_PATH").ok()
    }

}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FooterPosition, PageSize};

    /// Verifies that ConverterConfigBuilder correctly sets all configuration values.
    #[test]
    fn test_config_builder() {
        let config = ConverterConfigBuilder::new()
            .workers(3)
            .timeout(Duration::from_secs(10))
            .chrome_path("/opt/chrome")
            .sandbox(false)
            .style("academic")
            .style_dir("/etc/md2pdf/styles")
            .build()
            .unwrap();

        assert_eq!(config.workers, 3);
        assert_eq!(config.timeout.as_secs(), 10);
        assert_eq!(config.chrome_path, Some(PathBuf::from("/opt/chrome")));
        assert!(!config.sandbox);
        assert_eq!(config.style, "academic");
        assert_eq!(config.style_dir, Some(PathBuf::from("/etc/md2pdf/styles")));
    }

    /// Verifies that the builder rejects a zero timeout.
    #[test]
    fn test_config_validation() {
        let result = ConverterConfigBuilder::new()
            .timeout(Duration::ZERO)
            .build();

        let err_msg = result.unwrap_err();
        assert!(
            err_msg.contains("timeout must be greater than 0"),
            "Expected validation error message, got: {}",
            err_msg
        );

        assert!(ConverterConfigBuilder::new().style("  ").build().is_err());
    }

    /// Verifies default configuration values.
    #[test]
    fn test_config_defaults() {
        let config = ConverterConfig::default();

        assert_eq!(config.workers, 0, "Default workers should be automatic");
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert!(config.sandbox, "Sandbox should be on by default");
        assert_eq!(config.style, DEFAULT_STYLE);
        assert!(config.chrome_path.is_none());
    }

    /// Verifies a full YAML document parses into typed blocks.
    #[test]
    fn test_document_config_yaml() {
        let yaml = r#"
style: technical
page:
  size: a4
  margin: 0.75
footer:
  position: right
  status: DRAFT
toc:
  max_depth: 2
watermark:
  text: CONFIDENTIAL
  opacity: 0.2
"#;
        let config = DocumentConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.style.as_deref(), Some("technical"));

        let page = config.page.clone().unwrap();
        assert_eq!(page.size, PageSize::A4);
        assert_eq!(page.margin, 0.75);

        let footer = config.footer.clone().unwrap();
        assert_eq!(footer.position, FooterPosition::Right);
        assert_eq!(footer.status.as_deref(), Some("DRAFT"));

        let input = config.into_input().unwrap();
        assert!(input.validate_options().is_ok());
        assert_eq!(input.toc.unwrap().depth_range(), (1, 2));
        assert_eq!(input.watermark.unwrap().color, "#888888");
    }

    /// Verifies unknown keys and bad enum values are configuration errors.
    #[test]
    fn test_document_config_rejects_bad_yaml() {
        assert!(matches!(
            DocumentConfig::from_yaml("colour: red\n"),
            Err(Md2PdfError::Configuration(_))
        ));
        assert!(matches!(
            DocumentConfig::from_yaml("page: { size: tabloid }\n"),
            Err(Md2PdfError::Configuration(_))
        ));
        assert!(DocumentConfig::from_yaml("").is_ok());
    }

    /// Verifies css paths resolve against the config file and are read into the input.
    #[test]
    fn test_document_config_css_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("custom.css"), "body { color: red; }").unwrap();
        let config_path = dir.path().join("doc.yaml");
        std::fs::write(&config_path, "css: custom.css\n").unwrap();

        let config = DocumentConfig::load(&config_path).unwrap();
        assert_eq!(config.css, Some(dir.path().join("custom.css")));

        let input = config.into_input().unwrap();
        assert_eq!(input.css.as_deref(), Some("body { color: red; }"));
    }

    /// Verifies relative image paths anchor to the config file and URLs stay put.
    #[test]
    fn test_document_config_image_paths() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("doc.yaml");
        std::fs::write(
            &config_path,
            "cover: { title: T, logo: img/logo.png }\nsignature: { name: N, image: https://x.test/s.png }\n",
        )
        .unwrap();

        let config = DocumentConfig::load(&config_path).unwrap();
        let logo = config.cover.unwrap().logo.unwrap();
        assert_eq!(PathBuf::from(logo), dir.path().join("img/logo.png"));
        assert_eq!(
            config.signature.unwrap().image.as_deref(),
            Some("https://x.test/s.png")
        );
    }

    /// Verifies a missing css file surfaces as an Io error.
    #[test]
    fn test_document_config_missing_css() {
        let config = DocumentConfig {
            css: Some(PathBuf::from("/nonexistent/style.css")),
            ..Default::default()
        };
        assert!(matches!(config.into_input(), Err(Md2PdfError::Io { .. })));
    }
}

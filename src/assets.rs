//! Style sheet loading.
//!
//! Styles are plain CSS files named `<style>.css`. The crate embeds a small
//! set at compile time ([`EmbeddedAssets`]); [`DirectoryAssets`] checks a
//! directory on disk first and falls back to the embedded set.
//!
//! "Not found" is reported separately from other failures so callers can
//! tell a typo in a style name apart from an unreadable file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use include_dir::{Dir, include_dir};

use crate::error::Md2PdfError;

static EMBEDDED_STYLES: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/assets/styles");

/// Errors from an [`AssetLoader`].
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("asset '{0}' not found")]
    NotFound(String),

    /// Name contains path separators or parent references.
    #[error("invalid asset name '{0}'")]
    InvalidName(String),

    #[error("failed to read asset '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("asset '{0}' is not valid UTF-8")]
    NotUtf8(String),
}

impl From<AssetError> for Md2PdfError {
    fn from(err: AssetError) -> Self {
        match err {
            AssetError::NotFound(name) => Md2PdfError::StyleNotFound(name),
            other => Md2PdfError::Asset(other.to_string()),
        }
    }
}

/// Source of style sheets.
pub trait AssetLoader: Send + Sync {
    /// CSS text of the named style.
    fn load_style(&self, name: &str) -> Result<String, AssetError>;

    /// Names of every style this loader can serve, sorted.
    fn available_styles(&self) -> Vec<String>;
}

fn check_name(name: &str) -> Result<(), AssetError> {
    if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
        return Err(AssetError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Styles compiled into the binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedAssets;

impl AssetLoader for EmbeddedAssets {
    fn load_style(&self, name: &str) -> Result<String, AssetError> {
        check_name(name)?;
        let file = EMBEDDED_STYLES
            .get_file(format!("{name}.css"))
            .ok_or_else(|| AssetError::NotFound(name.to_string()))?;
        file.contents_utf8()
            .map(str::to_string)
            .ok_or_else(|| AssetError::NotUtf8(name.to_string()))
    }

    fn available_styles(&self) -> Vec<String> {
        let mut names: Vec<String> = EMBEDDED_STYLES
            .files()
            .filter_map(|f| style_name(f.path()))
            .collect();
        names.sort();
        names
    }
}

/// Styles from a directory, falling back to [`EmbeddedAssets`].
#[derive(Debug, Clone)]
pub struct DirectoryAssets {
    dir: PathBuf,
}

impl DirectoryAssets {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl AssetLoader for DirectoryAssets {
    fn load_style(&self, name: &str) -> Result<String, AssetError> {
        check_name(name)?;
        let path = self.dir.join(format!("{name}.css"));
        match std::fs::read_to_string(&path) {
            Ok(css) => {
                log::debug!("🎨 Loaded style '{}' from {:?}", name, path);
                Ok(css)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => EmbeddedAssets.load_style(name),
            Err(source) => Err(AssetError::Io {
                name: name.to_string(),
                source,
            }),
        }
    }

    fn available_styles(&self) -> Vec<String> {
        let mut names = EmbeddedAssets.available_styles();
        if let Ok(entries) = std::fs::read_dir(&self.dir) {
            names.extend(entries.flatten().filter_map(|e| style_name(&e.path())));
        }
        names.sort();
        names.dedup();
        names
    }
}

fn style_name(path: &Path) -> Option<String> {
    if path.extension()? != "css" {
        return None;
    }
    path.file_stem()?.to_str().map(str::to_string)
}

/// Loader for an optional override directory.
pub fn asset_loader(style_dir: Option<&Path>) -> Arc<dyn AssetLoader> {
    match style_dir {
        Some(dir) => Arc::new(DirectoryAssets::new(dir)),
        None => Arc::new(EmbeddedAssets),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

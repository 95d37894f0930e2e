//! Bounded-concurrency conversion of many files.
//!
//! ```text
//! discover_inputs(root) ──▶ [a.md, b.md, c.md, ...]   (sorted)
//!          │
//!          ▼  one semaphore permit per file (at most `workers` in flight)
//!   spawn_blocking: read ─▶ acquire service ─▶ convert ─▶ write PDF
//!          │
//!          ▼
//!   BatchReport.results[i] for input i
//! ```
//!
//! A failed file is recorded in its [`ConversionResult`] and never stops
//! its siblings. When two inputs map to the same PDF (`a.md` and
//! `a.markdown`), the first in discovery order wins and the other fails with
//! [`Md2PdfError::OutputConflict`]. Cancelling the batch context makes pending and running
//! conversions finish with [`Md2PdfError::Cancelled`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use walkdir::WalkDir;

use crate::context::ConversionContext;
use crate::error::{Md2PdfError, Result, io_error};
use crate::pool::ServicePool;
use crate::types::ConversionInput;

/// File extensions treated as Markdown, compared case-insensitively.
pub const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown"];

/// Markdown files under `root`, in a stable order.
///
/// A file path is returned as-is whatever its extension. A directory is
/// walked recursively.
///
/// # Errors
///
/// [`Md2PdfError::Io`] if `root` does not exist or a directory cannot be read.
pub fn discover_inputs(root: &Path) -> Result<Vec<PathBuf>> {
    let metadata = std::fs::metadata(root).map_err(io_error(root))?;
    if metadata.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }

    let mut inputs = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            Md2PdfError::Io {
                path,
                source: e.into(),
            }
        })?;
        if entry.file_type().is_file() && is_markdown(entry.path()) {
            inputs.push(entry.into_path());
        }
    }
    inputs.sort();

    log::debug!("🔎 Found {} Markdown files under {:?}", inputs.len(), root);
    Ok(inputs)
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            MARKDOWN_EXTENSIONS
                .iter()
                .any(|m| m.eq_ignore_ascii_case(ext))
        })
}

/// Where the PDF for `input` goes.
///
/// | `output` | Result |
/// |----------|--------|
/// | none | next to the input |
/// | ends in `.pdf`, single-file run | exactly `output` |
/// | directory | `output/<path relative to root>.pdf` |
///
/// ```rust
/// use std::path::Path;
/// use md2pdf::batch::output_path_for;
///
/// let out = output_path_for(Path::new("docs/a/b.md"), Path::new("docs"), Some(Path::new("pdf")));
/// assert_eq!(out, Path::new("pdf/a/b.pdf"));
/// ```
pub fn output_path_for(input: &Path, root: &Path, output: Option<&Path>) -> PathBuf {
    let Some(output) = output else {
        return input.with_extension("pdf");
    };

    if input == root {
        let is_pdf = output
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
        if is_pdf {
            return output.to_path_buf();
        }
        let name = input.file_name().map(PathBuf::from).unwrap_or_default();
        return output.join(name).with_extension("pdf");
    }

    let relative = input.strip_prefix(root).unwrap_or(input);
    output.join(relative).with_extension("pdf")
}

/// Outcome for one input file.
#[derive(Debug)]
pub struct ConversionResult {
    pub input: PathBuf,
    pub output: PathBuf,
    /// `None` on success.
    pub error: Option<Md2PdfError>,
    pub duration: Duration,
}

impl ConversionResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Results of a batch run, in discovery order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub results: Vec<ConversionResult>,
    pub failed: usize,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn succeeded(&self) -> usize {
        self.results.len() - self.failed
    }

    /// The failed results only.
    pub fn failures(&self) -> impl Iterator<Item = &ConversionResult> {
        self.results.iter().filter(|r| !r.is_success())
    }
}

/// Converts a file or a directory tree through a shared [`ServicePool`].
///
/// # Example
///
/// ```rust,ignore
/// let pool = Arc::new(ServicePool::from_config(&config));
/// let batch = BatchConverter::new(Arc::clone(&pool), template);
///
/// let report = batch.run(&ConversionContext::new(), Path::new("docs"), Some(Path::new("out"))).await?;
/// println!("{} ok, {} failed", report.succeeded(), report.failed);
/// pool.close()?;
/// ```
#[derive(Debug)]
pub struct BatchConverter {
    pool: Arc<ServicePool>,
    template: Arc<ConversionInput>,
    workers: usize,
    write_html: bool,
}

impl BatchConverter {
    /// `template` supplies every option; its Markdown body is ignored.
    ///
    /// Concurrency defaults to the pool size.
    pub fn new(pool: Arc<ServicePool>, template: ConversionInput) -> Self {
        let workers = pool.size();
        Self {
            pool,
            template: Arc::new(template),
            workers,
            write_html: false,
        }
    }

    /// Maximum conversions in flight; `0` keeps the pool size.
    pub fn with_workers(mut self, workers: usize) -> Self {
        if workers > 0 {
            self.workers = workers;
        }
        self
    }

    /// Also write the final HTML next to each PDF.
    pub fn with_html_output(mut self, enabled: bool) -> Self {
        self.write_html = enabled;
        self
    }

    /// Convert everything under `root`.
    ///
    /// # Errors
    ///
    /// Only failures that happen before any file is converted: invalid
    /// template options or an unreadable `root`. Per-file failures are in
    /// the report.
    pub async fn run(
        &self,
        ctx: &ConversionContext,
        root: &Path,
        output: Option<&Path>,
    ) -> Result<BatchReport> {
        self.template.validate_layout()?;
        let inputs = discover_inputs(root)?;
        if inputs.is_empty() {
            log::warn!("⚠️ No Markdown files found under {:?}", root);
            return Ok(BatchReport::default());
        }

        log::info!(
            "📚 Converting {} files with up to {} workers",
            inputs.len(),
            self.workers
        );

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = Vec::with_capacity(inputs.len());
        let mut claimed: HashMap<PathBuf, PathBuf> = HashMap::new();

        for input in inputs {
            let output_path = output_path_for(&input, root, output);
            if let Some(first) = claimed.get(&output_path) {
                log::error!("❌ {:?}: output {:?} already taken by {:?}", input, output_path, first);
                let conflict = Md2PdfError::OutputConflict {
                    output: output_path.clone(),
                    first: first.clone(),
                };
                tasks.push((input, output_path, Err(conflict)));
                continue;
            }
            claimed.insert(output_path.clone(), input.clone());

            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| Md2PdfError::Configuration(e.to_string()))?;

            let job = FileJob {
                ctx: ctx.child(),
                pool: Arc::clone(&self.pool),
                template: Arc::clone(&self.template),
                input: input.clone(),
                output: output_path.clone(),
                write_html: self.write_html,
            };
            let handle = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                job.run()
            });
            tasks.push((input, output_path, Ok(handle)));
        }

        let mut report = BatchReport::default();
        for (input, output, task) in tasks {
            let error = match task {
                Ok(handle) => match handle.await {
                    Ok(result) => {
                        if !result.is_success() {
                            report.failed += 1;
                        }
                        report.results.push(result);
                        continue;
                    }
                    Err(e) => Md2PdfError::PdfGeneration(format!("conversion task failed: {e}")),
                },
                Err(conflict) => conflict,
            };
            report.failed += 1;
            report.results.push(ConversionResult {
                input,
                output,
                error: Some(error),
                duration: Duration::ZERO,
            });
        }

        log::info!(
            "🏁 Batch finished: {} succeeded, {} failed",
            report.succeeded(),
            report.failed
        );
        Ok(report)
    }
}

/// One file's conversion, run on a blocking thread.
struct FileJob {
    ctx: ConversionContext,
    pool: Arc<ServicePool>,
    template: Arc<ConversionInput>,
    input: PathBuf,
    output: PathBuf,
    write_html: bool,
}

impl FileJob {
    fn run(self) -> ConversionResult {
        let started = Instant::now();
        let error = self.convert().err();
        let duration = started.elapsed();

        match &error {
            None => log::info!("✅ {:?} → {:?} ({:?})", self.input, self.output, duration),
            Some(e) => log::error!("❌ {:?}: {}", self.input, e),
        }

        ConversionResult {
            input: self.input,
            output: self.output,
            error,
            duration,
        }
    }

    fn convert(&self) -> Result<()> {
        self.ctx.check()?;
        let markdown = std::fs::read_to_string(&self.input).map_err(io_error(&self.input))?;
        let base_dir = self
            .input
            .parent()
            .map(|p| std::path::absolute(p).unwrap_or_else(|_| p.to_path_buf()));
        let document = self.template.for_document(markdown, base_dir);

        let mut service = self.pool.acquire()?;
        let html = service.convert_to_html(&self.ctx, &document)?;
        if self.write_html {
            write_file(&self.output.with_extension("html"), html.as_bytes())?;
        }
        let pdf = service.render_pdf(&self.ctx, &document, &html)?;
        drop(service);

        write_file(&self.output, &pdf)
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_error(parent))?;
    }
    std::fs::write(path, bytes).map_err(io_error(path))
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Verifies discovery is recursive, extension-filtered and sorted.
    #[test]
    fn test_discover_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("b/nested")).unwrap();
        for name in ["z.md", "a.MD", "b/nested/c.markdown", "notes.txt", "b/img.png"] {
            std::fs::write(root.join(name), "x").unwrap();
        }

        let found = discover_inputs(root).unwrap();
        let relative: Vec<_> = found
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            relative,
            vec![
                PathBuf::from("a.MD"),
                PathBuf::from("b/nested/c.markdown"),
                PathBuf::from("z.md"),
            ]
        );
    }

    /// Verifies a single file is returned whatever its extension.
    #[test]
    fn test_discover_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("README.txt");
        std::fs::write(&file, "x").unwrap();
        assert_eq!(discover_inputs(&file).unwrap(), vec![file]);
    }

    /// Verifies a missing root is an Io error.
    #[test]
    fn test_discover_missing_root() {
        assert!(matches!(
            discover_inputs(Path::new("/definitely/not/here")),
            Err(Md2PdfError::Io { .. })
        ));
    }

    /// Verifies every output placement rule.
    #[test]
    fn test_output_path_for() {
        let root = Path::new("docs");
        assert_eq!(
            output_path_for(Path::new("docs/a.md"), root, None),
            PathBuf::from("docs/a.pdf")
        );
        assert_eq!(
            output_path_for(Path::new("docs/x/y.markdown"), root, Some(Path::new("out"))),
            PathBuf::from("out/x/y.pdf")
        );

        let file = Path::new("notes/plan.md");
        assert_eq!(
            output_path_for(file, file, Some(Path::new("final.PDF"))),
            PathBuf::from("final.PDF")
        );
        assert_eq!(
            output_path_for(file, file, Some(Path::new("out"))),
            PathBuf::from("out/plan.pdf")
        );
    }

    /// Verifies report counters.
    #[test]
    fn test_report_counts() {
        let ok = ConversionResult {
            input: "a.md".into(),
            output: "a.pdf".into(),
            error: None,
            duration: Duration::ZERO,
        };
        let bad = ConversionResult {
            input: "b.md".into(),
            output: "b.pdf".into(),
            error: Some(Md2PdfError::EmptyInput),
            duration: Duration::ZERO,
        };
        let report = BatchReport {
            results: vec![ok, bad],
            failed: 1,
        };
        assert!(!report.is_success());
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failures().count(), 1);
    }
}

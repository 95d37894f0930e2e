//! PDF rendering through a headless Chrome/Chromium process.
//!
//! [`BrowserRenderer`] owns at most one browser process for its lifetime and
//! starts it lazily on the first render. Every render opens a fresh tab,
//! loads the HTML file, prints it and closes the tab again.
//!
//! # Lifecycle
//!
//! ```text
//!            ensure_browser            close()
//!   Idle ─────────────────────▶ Running ─────────▶ Closed
//!     │   (launch + validate)                        ▲
//!     └──────────────────────────────────────────────┘
//!                         close()
//! ```
//!
//! - A failed launch or validation kills whatever was started and leaves the
//!   renderer `Idle`, so the next render tries again.
//! - `Closed` is terminal. Renders after close return
//!   [`Md2PdfError::RendererClosed`].
//!
//! # Shutdown
//!
//! Closing is two-phase:
//!
//! 1. Graceful: open tabs are closed and the browser connection is dropped on
//!    a helper thread, bounded by [`GRACEFUL_CLOSE_TIMEOUT`].
//! 2. Forced: the browser's process tree is killed regardless of how phase 1
//!    went. Chrome forks renderer, GPU and zygote helpers that can outlive
//!    the main process otherwise.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use headless_chrome::types::PrintToPdfOptions;
use headless_chrome::{Browser, LaunchOptions, Tab};

use crate::context::ConversionContext;
use crate::error::{Md2PdfError, Result};
use crate::inject;
use crate::types::{FooterOptions, PageGeometry};

/// Extra bottom margin reserved for the footer, in inches.
pub const FOOTER_EXTRA_MARGIN_INCHES: f64 = 0.35;

/// Upper bound on the graceful phase of [`BrowserRenderer::close`].
pub const GRACEFUL_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Page used to check a freshly launched browser.
const VALIDATION_URL: &str = "data:text/html,<html></html>";

// ============================================================================
// Render options
// ============================================================================

/// Print settings passed to the browser.
///
/// All lengths are in inches.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    pub paper_width: f64,
    pub paper_height: f64,
    pub margin_top: f64,
    pub margin_bottom: f64,
    pub margin_left: f64,
    pub margin_right: f64,
    pub print_background: bool,
    /// Enables Chrome's header/footer band.
    pub display_header_footer: bool,
    pub header_template: String,
    pub footer_template: String,
}

impl RenderOptions {
    /// Derive print settings from page geometry and the optional footer.
    ///
    /// Paper dimensions are already swapped for landscape, so the browser's
    /// own landscape flag stays off.
    ///
    /// # Example
    ///
    /// ```rust
    /// use md2pdf::renderer::{RenderOptions, FOOTER_EXTRA_MARGIN_INCHES};
    /// use md2pdf::types::{FooterOptions, Orientation, PageGeometry, PageSize};
    ///
    /// let page = PageGeometry {
    ///     size: PageSize::Letter,
    ///     orientation: Orientation::Landscape,
    ///     margin: 1.0,
    /// };
    /// let opts = RenderOptions::from_input(&page, Some(&FooterOptions::default())).unwrap();
    ///
    /// assert_eq!((opts.paper_width, opts.paper_height), (11.0, 8.5));
    /// assert_eq!(opts.margin_bottom, 1.0 + FOOTER_EXTRA_MARGIN_INCHES);
    /// assert!(opts.display_header_footer);
    /// ```
    pub fn from_input(page: &PageGeometry, footer: Option<&FooterOptions>) -> Result<Self> {
        let mut options = Self::for_page(page);
        if footer.is_some() {
            options.margin_bottom += FOOTER_EXTRA_MARGIN_INCHES;
            options.display_header_footer = true;
            options.header_template = "<span></span>".to_string();
            options.footer_template = inject::footer_template(footer)?;
        }
        Ok(options)
    }

    fn for_page(page: &PageGeometry) -> Self {
        let (paper_width, paper_height) = page.paper_dimensions();
        let margin = page.effective_margin();
        Self {
            paper_width,
            paper_height,
            margin_top: margin,
            margin_bottom: margin,
            margin_left: margin,
            margin_right: margin,
            print_background: true,
            display_header_footer: false,
            header_template: String::new(),
            footer_template: String::new(),
        }
    }

    fn to_print_options(&self) -> PrintToPdfOptions {
        let (header_template, footer_template) = if self.display_header_footer {
            (
                Some(self.header_template.clone()),
                Some(self.footer_template.clone()),
            )
        } else {
            (None, None)
        };

        PrintToPdfOptions {
            landscape: Some(false),
            display_header_footer: Some(self.display_header_footer),
            print_background: Some(self.print_background),
            paper_width: Some(self.paper_width),
            paper_height: Some(self.paper_height),
            margin_top: Some(self.margin_top),
            margin_bottom: Some(self.margin_bottom),
            margin_left: Some(self.margin_left),
            margin_right: Some(self.margin_right),
            header_template,
            footer_template,
            prefer_css_page_size: Some(false),
            ..Default::default()
        }
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::for_page(&PageGeometry::default())
    }
}

// ============================================================================
// PdfRenderer trait
// ============================================================================

/// Turns an HTML file into PDF bytes.
///
/// Implementations are used by one caller at a time (`&mut self`) and may
/// hold an expensive resource such as a browser process.
pub trait PdfRenderer: Send {
    /// Render the HTML file at `path`.
    ///
    /// # Errors
    ///
    /// - [`Md2PdfError::Cancelled`] / [`Md2PdfError::DeadlineExceeded`] from `ctx`
    /// - [`Md2PdfError::RendererClosed`] after [`close`](Self::close)
    /// - a stage error such as [`Md2PdfError::PageLoad`]
    fn render_from_file(
        &mut self,
        ctx: &ConversionContext,
        path: &Path,
        options: &RenderOptions,
    ) -> Result<Vec<u8>>;

    /// Release every resource. Repeated calls are no-ops.
    fn close(&mut self) -> Result<()>;
}

// ============================================================================
// BrowserRenderer
// ============================================================================

/// Produces launch options for a new browser process.
pub type LaunchOptionsFn = Arc<dyn Fn() -> Result<LaunchOptions<'static>> + Send + Sync>;

enum State<T> {
    Idle,
    Running(T),
    Closed,
}

/// Idle/Running/Closed bookkeeping around one live resource.
///
/// Leaving `Running` hands the resource back exactly once and counts as a
/// cleanup. `Closed` is terminal.
struct Lifecycle<T> {
    state: State<T>,
    cleanups: usize,
}

impl<T> Lifecycle<T> {
    fn new() -> Self {
        Self {
            state: State::Idle,
            cleanups: 0,
        }
    }

    fn is_running(&self) -> bool {
        matches!(self.state, State::Running(_))
    }

    fn is_closed(&self) -> bool {
        matches!(self.state, State::Closed)
    }

    fn live(&self) -> Option<&T> {
        match &self.state {
            State::Running(live) => Some(live),
            _ => None,
        }
    }

    /// Idle to Running. Hands `live` back unless idle.
    fn start(&mut self, live: T) -> std::result::Result<(), T> {
        if matches!(self.state, State::Idle) {
            self.state = State::Running(live);
            Ok(())
        } else {
            Err(live)
        }
    }

    /// Running to Idle.
    fn reset(&mut self) -> Option<T> {
        if !self.is_running() {
            return None;
        }
        self.leave(State::Idle)
    }

    /// Any state to Closed.
    fn close(&mut self) -> Option<T> {
        self.leave(State::Closed)
    }

    fn leave(&mut self, next: State<T>) -> Option<T> {
        match std::mem::replace(&mut self.state, next) {
            State::Running(live) => {
                self.cleanups += 1;
                Some(live)
            }
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self.state {
            State::Idle => "idle",
            State::Running(_) => "running",
            State::Closed => "closed",
        }
    }
}

struct LiveBrowser {
    browser: Browser,
    pid: Option<u32>,
}

/// [`PdfRenderer`] backed by a lazily launched headless Chrome.
pub struct BrowserRenderer {
    id: u64,
    launch_options_fn: LaunchOptionsFn,
    timeout: Duration,
    lifecycle: Lifecycle<LiveBrowser>,
}

impl BrowserRenderer {
    /// Create an idle renderer. No process is started yet.
    pub fn new(launch_options_fn: LaunchOptionsFn, timeout: Duration) -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(0);

        Self {
            id: NEXT_ID.fetch_add(1, Ordering::SeqCst),
            launch_options_fn,
            timeout,
            lifecycle: Lifecycle::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether a browser process is currently running.
    pub fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    pub fn is_closed(&self) -> bool {
        self.lifecycle.is_closed()
    }

    /// How many times a running browser has been shut down.
    pub fn cleanup_count(&self) -> usize {
        self.lifecycle.cleanups
    }

    /// Launch and validate the browser if it isn't running yet.
    fn ensure_browser(&mut self, ctx: &ConversionContext) -> Result<&Browser> {
        if self.lifecycle.is_closed() {
            return Err(Md2PdfError::RendererClosed);
        }
        if !self.lifecycle.is_running() {
            let live = self.launch(ctx)?;
            if let Err(live) = self.lifecycle.start(live) {
                shutdown(live);
                return Err(Md2PdfError::RendererClosed);
            }
        }

        self.lifecycle
            .live()
            .map(|live| &live.browser)
            .ok_or_else(|| Md2PdfError::BrowserLaunch("browser not started".to_string()))
    }

    fn launch(&self, ctx: &ConversionContext) -> Result<LiveBrowser> {
        // May locate or download a browser binary.
        let options = (self.launch_options_fn)()?;
        ctx.check()?;

        log::debug!("🚀 Renderer {} launching Chrome...", self.id);
        let browser = Browser::new(options).map_err(|e| {
            log::error!("❌ Chrome launch failed: {}", e);
            Md2PdfError::BrowserLaunch(e.to_string())
        })?;
        let pid = browser.get_process_id();

        if let Err(e) = validate_browser(&browser) {
            log::error!("❌ Renderer {} browser validation failed: {}", self.id, e);
            shutdown(LiveBrowser { browser, pid });
            return Err(e);
        }

        log::info!(
            "✅ Renderer {} started Chrome (pid {})",
            self.id,
            pid.map_or_else(|| "unknown".to_string(), |p| p.to_string())
        );
        Ok(LiveBrowser { browser, pid })
    }

    /// Drop a broken browser so the next render starts a fresh one.
    fn reset(&mut self) {
        if let Some(live) = self.lifecycle.reset() {
            log::warn!("⚠️ Renderer {} discarding unresponsive browser", self.id);
            shutdown(live);
        }
    }
}

/// Page-load budget: the configured timeout, capped by the time the context
/// has left.
fn tab_timeout(configured: Duration, ctx: &ConversionContext) -> Duration {
    match ctx.remaining() {
        Some(remaining) => configured.min(remaining),
        None => configured,
    }
}

impl PdfRenderer for BrowserRenderer {
    fn render_from_file(
        &mut self,
        ctx: &ConversionContext,
        path: &Path,
        options: &RenderOptions,
    ) -> Result<Vec<u8>> {
        ctx.check()?;
        if self.is_closed() {
            return Err(Md2PdfError::RendererClosed);
        }

        let absolute = std::path::absolute(path).map_err(crate::error::io_error(path))?;
        let url = url::Url::from_file_path(&absolute)
            .map_err(|_| Md2PdfError::PageLoad(format!("not a file path: {}", absolute.display())))?;

        let id = self.id;
        let configured = self.timeout;
        let browser = self.ensure_browser(ctx)?;

        // The budget is taken after a possibly slow launch.
        ctx.check()?;
        let timeout = tab_timeout(configured, ctx);

        let tab = match browser.new_tab() {
            Ok(tab) => tab,
            Err(e) => {
                log::error!("❌ Renderer {} failed to open tab: {}", id, e);
                self.reset();
                return Err(Md2PdfError::PageCreate(e.to_string()));
            }
        };
        tab.set_default_timeout(timeout);

        let result = print_tab(ctx, &tab, url.as_str(), options);
        close_tab_safely(&tab);

        let pdf = result?;
        log::debug!("📄 Renderer {} printed {} bytes from {}", id, pdf.len(), url);
        Ok(pdf)
    }

    fn close(&mut self) -> Result<()> {
        if let Some(live) = self.lifecycle.close() {
            log::debug!("🛑 Renderer {} closing browser", self.id);
            shutdown(live);
        }
        Ok(())
    }
}

impl Drop for BrowserRenderer {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl std::fmt::Debug for BrowserRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserRenderer")
            .field("id", &self.id)
            .field("timeout", &self.timeout)
            .field("state", &self.lifecycle.name())
            .finish()
    }
}

fn validate_browser(browser: &Browser) -> Result<()> {
    log::debug!("🔍 Validating new browser instance...");

    let tab = browser
        .new_tab()
        .map_err(|e| Md2PdfError::BrowserConnect(e.to_string()))?;

    let navigated = tab.navigate_to(VALIDATION_URL).map(|_| ());
    let _ = tab.close(true);
    navigated.map_err(|e| Md2PdfError::BrowserConnect(e.to_string()))?;

    log::debug!("✅ Browser validation passed");
    Ok(())
}

fn print_tab(
    ctx: &ConversionContext,
    tab: &Tab,
    url: &str,
    options: &RenderOptions,
) -> Result<Vec<u8>> {
    ctx.check()?;
    tab.navigate_to(url)
        .and_then(|t| t.wait_until_navigated())
        .map_err(|e| {
            log::error!("❌ Failed to load {}: {}", url, e);
            Md2PdfError::PageLoad(e.to_string())
        })?;

    ctx.check()?;
    let pdf = tab
        .print_to_pdf(Some(options.to_print_options()))
        .map_err(|e| {
            log::error!("❌ PDF generation failed: {}", e);
            Md2PdfError::PdfGeneration(e.to_string())
        })?;

    ctx.check()?;
    Ok(pdf)
}

fn close_tab_safely(tab: &Tab) {
    if let Err(e) = tab.close(true) {
        log::warn!("⚠️ Failed to close tab (continuing anyway): {}", e);
    }
}

/// Graceful close bounded by [`GRACEFUL_CLOSE_TIMEOUT`], then forced kill.
fn shutdown(live: LiveBrowser) {
    let LiveBrowser { browser, pid } = live;
    let tree = pid.map(process::ProcessTree::capture);

    let (tx, rx) = std::sync::mpsc::channel();
    let spawned = std::thread::Builder::new()
        .name("md2pdf-browser-close".to_string())
        .spawn(move || {
            let tabs: Vec<Arc<Tab>> = browser
                .get_tabs()
                .lock()
                .map(|tabs| tabs.clone())
                .unwrap_or_default();
            for tab in tabs {
                let _ = tab.close(false);
            }
            drop(browser);
            let _ = tx.send(());
        });

    match spawned {
        Ok(_) => match rx.recv_timeout(GRACEFUL_CLOSE_TIMEOUT) {
            Ok(()) => log::debug!("✅ Browser closed gracefully"),
            Err(_) => log::warn!(
                "⏱️ Browser did not close within {:?}, killing it",
                GRACEFUL_CLOSE_TIMEOUT
            ),
        },
        Err(e) => log::warn!("⚠️ Could not spawn close thread: {}", e),
    }

    if let Some(tree) = tree {
        tree.kill();
    }
}

// ============================================================================
// Process tree cleanup
// ============================================================================

mod process {
    /// A browser process and whatever it had forked when captured.
    ///
    /// On Linux every pid is recorded with its start time and is signalled
    /// only while it still names the same process, since headless_chrome may
    /// have reaped it during the graceful phase. Other unix systems have no
    /// `/proc`: only the process group and the top-level pid are signalled
    /// there, without the start-time check, and helpers that left the group
    /// survive.
    #[derive(Debug)]
    pub(super) struct ProcessTree {
        #[cfg(unix)]
        root: Member,
        #[cfg(unix)]
        group: Option<i32>,
        #[cfg(unix)]
        descendants: Vec<Member>,
        #[cfg(not(unix))]
        pid: u32,
    }

    /// A pid plus its start time in clock ticks since boot.
    #[cfg(unix)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(super) struct Member {
        pub(super) pid: u32,
        pub(super) started: Option<u64>,
    }

    #[cfg(unix)]
    impl Member {
        pub(super) fn capture(pid: u32) -> Self {
            Self {
                pid,
                started: start_time(pid),
            }
        }

        /// Whether the pid still refers to the captured process.
        pub(super) fn is_current(&self) -> bool {
            match self.started {
                Some(started) => start_time(self.pid) == Some(started),
                None => cfg!(not(target_os = "linux")),
            }
        }
    }

    #[cfg(unix)]
    impl ProcessTree {
        pub(super) fn capture(pid: u32) -> Self {
            let raw = pid as libc::pid_t;
            // SAFETY: getpgid/getpgrp only read process table entries.
            let (pgid, own) = unsafe { (libc::getpgid(raw), libc::getpgrp()) };
            let group = (pgid > 0 && pgid == raw && pgid != own).then_some(pgid);

            Self {
                root: Member::capture(pid),
                group,
                descendants: descendants_of(pid),
            }
        }

        pub(super) fn kill(self) {
            let alive: Vec<Member> = std::iter::once(self.root)
                .chain(self.descendants.iter().copied())
                .filter(Member::is_current)
                .collect();
            if alive.is_empty() {
                log::trace!("Browser pid {} and its helpers already exited", self.root.pid);
                return;
            }

            if let Some(pgid) = self.group {
                // A group id cannot be reused while one of its members lives.
                // SAFETY: getpgid only reads process table entries.
                let group_alive = alive.iter().any(|m| {
                    let member_group = unsafe { libc::getpgid(m.pid as libc::pid_t) };
                    member_group == pgid
                });
                if group_alive {
                    log::debug!("🔪 Killing process group {}", pgid);
                    // SAFETY: plain signal delivery.
                    unsafe {
                        libc::killpg(pgid, libc::SIGKILL);
                    }
                }
            }
            for member in alive.iter().rev() {
                // SAFETY: plain signal delivery; ESRCH for exited processes is ignored.
                unsafe {
                    libc::kill(member.pid as libc::pid_t, libc::SIGKILL);
                }
            }
            log::trace!(
                "Killed {} of {} browser processes rooted at pid {}",
                alive.len(),
                self.descendants.len() + 1,
                self.root.pid
            );
        }
    }

    #[cfg(target_os = "linux")]
    fn start_time(pid: u32) -> Option<u64> {
        let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
        start_time_of(&stat)
    }

    #[cfg(all(unix, not(target_os = "linux")))]
    fn start_time(_pid: u32) -> Option<u64> {
        None
    }

    #[cfg(target_os = "linux")]
    fn descendants_of(root: u32) -> Vec<Member> {
        use std::collections::HashMap;

        let mut children: HashMap<u32, Vec<Member>> = HashMap::new();
        let Ok(entries) = std::fs::read_dir("/proc") else {
            return Vec::new();
        };
        for entry in entries.flatten() {
            let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
                continue;
            };
            let Ok(stat) = std::fs::read_to_string(entry.path().join("stat")) else {
                continue;
            };
            if let Some(ppid) = parent_pid(&stat) {
                children.entry(ppid).or_default().push(Member {
                    pid,
                    started: start_time_of(&stat),
                });
            }
        }

        let mut found = Vec::new();
        let mut queue = vec![root];
        while let Some(pid) = queue.pop() {
            if let Some(kids) = children.get(&pid) {
                for kid in kids {
                    found.push(*kid);
                    queue.push(kid.pid);
                }
            }
        }
        found
    }

    #[cfg(all(unix, not(target_os = "linux")))]
    fn descendants_of(_root: u32) -> Vec<Member> {
        Vec::new()
    }

    /// Field `n` of a `/proc/<pid>/stat` line, numbered as in proc(5).
    /// The command name may contain spaces and parentheses, so fields are
    /// counted from the last `)`.
    #[cfg(any(target_os = "linux", test))]
    fn stat_field(stat: &str, n: usize) -> Option<&str> {
        let rest = &stat[stat.rfind(')')? + 1..];
        rest.split_whitespace().nth(n.checked_sub(3)?)
    }

    #[cfg(any(target_os = "linux", test))]
    pub(super) fn parent_pid(stat: &str) -> Option<u32> {
        stat_field(stat, 4)?.parse().ok()
    }

    #[cfg(any(target_os = "linux", test))]
    pub(super) fn start_time_of(stat: &str) -> Option<u64> {
        stat_field(stat, 22)?.parse().ok()
    }

    #[cfg(windows)]
    impl ProcessTree {
        pub(super) fn capture(pid: u32) -> Self {
            Self { pid }
        }

        pub(super) fn kill(self) {
            log::debug!("🔪 Killing process tree {}", self.pid);
            let _ = std::process::Command::new("taskkill")
                .args(["/PID", &self.pid.to_string(), "/T", "/F"])
                .output();
        }
    }

    #[cfg(not(any(unix, windows)))]
    impl ProcessTree {
        pub(super) fn capture(pid: u32) -> Self {
            Self { pid }
        }

        pub(super) fn kill(self) {
            log::warn!("⚠️ Cannot kill browser pid {} on this platform", self.pid);
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Orientation, PageSize};

    fn unreachable_launcher() -> LaunchOptionsFn {
        Arc::new(|| Err(Md2PdfError::Configuration("no browser in unit tests".into())))
    }

    /// Verifies Letter portrait without footer keeps symmetric margins.
    #[test]
    fn test_render_options_portrait() {
        let opts = RenderOptions::from_input(&PageGeometry::default(), None).unwrap();
        assert_eq!((opts.paper_width, opts.paper_height), (8.5, 11.0));
        assert_eq!(opts.margin_bottom, opts.margin_top);
        assert!(!opts.display_header_footer);
        assert!(opts.footer_template.is_empty());
        assert_eq!(opts, RenderOptions::default());
    }

    /// Verifies landscape swaps dimensions and a footer adds bottom margin.
    #[test]
    fn test_render_options_landscape_with_footer() {
        let page = PageGeometry {
            size: PageSize::A4,
            orientation: Orientation::Landscape,
            margin: 0.75,
        };
        let (w, h) = PageSize::A4.dimensions();
        let opts = RenderOptions::from_input(&page, Some(&FooterOptions::default())).unwrap();

        assert_eq!((opts.paper_width, opts.paper_height), (h, w));
        assert_eq!(opts.margin_left, 0.75);
        assert_eq!(opts.margin_top, 0.75);
        assert!((opts.margin_bottom - (0.75 + FOOTER_EXTRA_MARGIN_INCHES)).abs() < 1e-9);
        assert!(opts.display_header_footer);
        assert!(opts.footer_template.contains("pageNumber"));
    }

    /// Verifies the browser's own landscape flag stays off after the swap.
    #[test]
    fn test_print_options_not_double_rotated() {
        let page = PageGeometry {
            orientation: Orientation::Landscape,
            ..PageGeometry::default()
        };
        let print = RenderOptions::from_input(&page, None).unwrap().to_print_options();
        assert_eq!(print.landscape, Some(false));
        assert_eq!(print.paper_width, Some(11.0));
        assert_eq!(print.footer_template, None);
    }

    /// Verifies closing a never-launched renderer is idempotent and needs no cleanup.
    #[test]
    fn test_close_idempotent_without_browser() {
        let mut renderer = BrowserRenderer::new(unreachable_launcher(), Duration::from_secs(5));
        assert!(!renderer.is_running());

        renderer.close().unwrap();
        renderer.close().unwrap();

        assert!(renderer.is_closed());
        assert_eq!(renderer.cleanup_count(), 0);
    }

    /// Verifies render after close fails with RendererClosed and never launches.
    #[test]
    fn test_render_after_close() {
        let mut renderer = BrowserRenderer::new(unreachable_launcher(), Duration::from_secs(5));
        renderer.close().unwrap();

        let err = renderer
            .render_from_file(
                &ConversionContext::new(),
                Path::new("/tmp/x.html"),
                &RenderOptions::default(),
            )
            .unwrap_err();
        assert!(matches!(err, Md2PdfError::RendererClosed));
    }

    /// Verifies a cancelled context short-circuits before any launch attempt.
    #[test]
    fn test_cancelled_context_skips_browser() {
        let mut renderer = BrowserRenderer::new(unreachable_launcher(), Duration::from_secs(5));
        let ctx = ConversionContext::new();
        ctx.cancel();

        let err = renderer
            .render_from_file(&ctx, Path::new("/tmp/x.html"), &RenderOptions::default())
            .unwrap_err();
        assert!(matches!(err, Md2PdfError::Cancelled));
        assert!(!renderer.is_running());
    }

    /// Verifies a failed launch leaves the renderer idle for a later retry.
    #[test]
    fn test_failed_launch_stays_idle() {
        let mut renderer = BrowserRenderer::new(unreachable_launcher(), Duration::from_secs(5));
        let err = renderer
            .render_from_file(
                &ConversionContext::new(),
                Path::new("/tmp/x.html"),
                &RenderOptions::default(),
            )
            .unwrap_err();

        assert!(matches!(err, Md2PdfError::Configuration(_)));
        assert!(!renderer.is_running());
        assert!(!renderer.is_closed());
    }

    /// Verifies ppid parsing copes with odd command names.
    #[test]
    fn test_parent_pid_parsing() {
        assert_eq!(process::parent_pid("42 (chrome) S 7 42 42 0"), Some(7));
        assert_eq!(process::parent_pid("43 (Web Content (x)) R 9 1"), Some(9));
        assert_eq!(process::parent_pid("garbage"), None);
    }

    /// Verifies the start time is read from field 22.
    #[test]
    fn test_start_time_parsing() {
        let stat = "42 (chrome (gpu)) S 7 42 42 0 -1 4194560 100 0 0 0 1 2 0 0 20 0 12 0 98765 1000";
        assert_eq!(process::start_time_of(stat), Some(98765));
        assert_eq!(process::start_time_of("42 (chrome) S 7 42"), None);
    }

    /// Verifies a pid only counts as ours while its start time matches.
    #[cfg(target_os = "linux")]
    #[test]
    fn test_process_identity() {
        let me = process::Member::capture(std::process::id());
        assert!(me.started.is_some());
        assert!(me.is_current());

        let recycled = process::Member {
            started: me.started.map(|t| t + 1),
            ..me
        };
        assert!(!recycled.is_current());

        let unknown = process::Member { started: None, ..me };
        assert!(!unknown.is_current());
    }

    /// Verifies the tab timeout is the smaller of the setting and the time left.
    #[test]
    fn test_tab_timeout_bounded_by_deadline() {
        let configured = Duration::from_secs(60);
        assert_eq!(tab_timeout(configured, &ConversionContext::new()), configured);

        let ctx = ConversionContext::new().with_timeout(Duration::from_secs(2));
        assert!(tab_timeout(configured, &ctx) <= Duration::from_secs(2));
        assert_eq!(
            tab_timeout(Duration::from_millis(10), &ctx),
            Duration::from_millis(10)
        );
    }

    /// Verifies a launch slower than the deadline stops before starting Chrome.
    #[test]
    fn test_slow_launch_respects_deadline() {
        let launcher: LaunchOptionsFn = Arc::new(|| {
            std::thread::sleep(Duration::from_millis(150));
            crate::factory::chrome::create_chrome_options(
                Some(Path::new("/nonexistent/chrome")),
                false,
            )
        });
        let mut renderer = BrowserRenderer::new(launcher, Duration::from_secs(60));
        let ctx = ConversionContext::new().with_timeout(Duration::from_millis(50));

        let err = renderer
            .render_from_file(&ctx, Path::new("/tmp/x.html"), &RenderOptions::default())
            .unwrap_err();
        assert!(matches!(err, Md2PdfError::DeadlineExceeded), "{err}");
        assert!(!renderer.is_running());
        assert!(!renderer.is_closed());
    }

    /// Verifies a running resource is released exactly once on close.
    #[test]
    fn test_lifecycle_close_once() {
        let mut lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.name(), "idle");
        lifecycle.start(7).unwrap();
        assert!(lifecycle.is_running());
        assert_eq!(lifecycle.live(), Some(&7));

        assert_eq!(lifecycle.close(), Some(7));
        assert_eq!(lifecycle.close(), None);
        assert!(lifecycle.is_closed());
        assert_eq!(lifecycle.cleanups, 1);

        assert_eq!(lifecycle.start(8), Err(8));
        assert_eq!(lifecycle.reset(), None);
        assert!(lifecycle.is_closed());
    }

    /// Verifies reset returns to idle so a new resource can start.
    #[test]
    fn test_lifecycle_reset_then_close() {
        let mut lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.reset(), None);

        lifecycle.start(1).unwrap();
        assert_eq!(lifecycle.reset(), Some(1));
        assert!(!lifecycle.is_running());
        assert!(!lifecycle.is_closed());
        assert_eq!(lifecycle.reset(), None);

        lifecycle.start(2).unwrap();
        assert_eq!(lifecycle.close(), Some(2));
        assert_eq!(lifecycle.cleanups, 2);
    }

    /// Verifies a real browser is cleaned up exactly once.
    ///
    /// Needs Chrome installed; run with `cargo test -- --ignored`.
    #[test]
    #[ignore]
    fn test_real_browser_close_once() {
        let launcher: LaunchOptionsFn =
            Arc::new(|| crate::factory::chrome::create_chrome_options(None, false));
        let mut renderer = BrowserRenderer::new(launcher, Duration::from_secs(30));

        let dir = tempfile::tempdir().unwrap();
        let page = dir.path().join("page.html");
        std::fs::write(&page, "<html><body><h1>Hi</h1></body></html>").unwrap();

        let pdf = renderer
            .render_from_file(&ConversionContext::new(), &page, &RenderOptions::default())
            .unwrap();
        assert!(pdf.starts_with(b"%PDF"));
        assert!(renderer.is_running());

        renderer.close().unwrap();
        renderer.close().unwrap();
        assert_eq!(renderer.cleanup_count(), 1);
    }
}

//! Cancellation and deadline propagation for conversions.
//!
//! A [`ConversionContext`] is handed to every pipeline stage. Stages call
//! [`ConversionContext::check`] before non-trivial work and return its error
//! unchanged, so callers can tell cancellation apart from conversion failure.
//!
//! Contexts form a tree: cancelling a parent cancels every child, while
//! cancelling a child leaves its parent and siblings untouched.
//!
//! ```text
//! batch root (Ctrl-C)
//!   ├── file 1  (child, own deadline)
//!   ├── file 2  (child) ── cancel() affects only file 2
//!   └── file 3  (child)
//! ```
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use md2pdf::{ConversionContext, Md2PdfError};
//!
//! let root = ConversionContext::new();
//! let file = root.child().with_timeout(Duration::from_secs(30));
//!
//! assert!(file.check().is_ok());
//! root.cancel();
//! assert!(matches!(file.check(), Err(Md2PdfError::Cancelled)));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::{Md2PdfError, Result};

#[derive(Debug, Default)]
struct Flag {
    cancelled: AtomicBool,
    parent: Option<Arc<Flag>>,
}

impl Flag {
    fn is_set(&self) -> bool {
        if self.cancelled.load(Ordering::Acquire) {
            return true;
        }
        self.parent.as_ref().is_some_and(|p| p.is_set())
    }
}

/// Cancellation flag plus optional deadline, shared by clones.
///
/// Cloning is cheap and clones observe the same cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct ConversionContext {
    flag: Arc<Flag>,
    deadline: Option<Instant>,
}

impl ConversionContext {
    /// Create a root context with no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a child context.
    ///
    /// The child inherits the parent's cancellation and deadline but has its
    /// own flag, so [`cancel`](Self::cancel) on the child does not propagate
    /// upwards.
    pub fn child(&self) -> Self {
        Self {
            flag: Arc::new(Flag {
                cancelled: AtomicBool::new(false),
                parent: Some(Arc::clone(&self.flag)),
            }),
            deadline: self.deadline,
        }
    }

    /// Return a copy whose deadline is at most `timeout` from now.
    ///
    /// An existing earlier deadline is kept.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Return a copy whose deadline is at most `deadline`.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Cancel this context and all of its children.
    pub fn cancel(&self) {
        self.flag.cancelled.store(true, Ordering::Release);
    }

    /// Whether this context or any ancestor has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.flag.is_set()
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline.
    ///
    /// Returns `None` when there is no deadline and `Some(Duration::ZERO)`
    /// once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Fail if the context is cancelled or past its deadline.
    ///
    /// # Errors
    ///
    /// - [`Md2PdfError::Cancelled`] if cancelled
    /// - [`Md2PdfError::DeadlineExceeded`] if the deadline has passed
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Md2PdfError::Cancelled);
        }
        if self.remaining() == Some(Duration::ZERO) {
            return Err(Md2PdfError::DeadlineExceeded);
        }
        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

//! Cooperative cancellation for expensive recomputation.
//!
//! Full-document rescans (the preferred-width scan in [`SizeManager`](crate::SizeManager))
//! poll a [`CancellationToken`] every few lines. A cancelled scan unwinds with
//! [`Cancelled`], leaving whatever it already measured in the cache and the rest
//! still marked unknown, so the next call simply resumes.
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

/// Signal that a computation stopped early because its token was cancelled.
///
/// Not an [`Error`](crate::Error) variant: callers usually retry on the next frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("layout computation cancelled")
    }
}

impl std::error::Error for Cancelled {}

/// Shared cancellation flag. The default token never cancels.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Option<Arc<AtomicBool>>,
}

impl CancellationToken {
    /// A token that is never cancelled.
    pub fn never() -> Self {
        Self { flag: None }
    }

    /// A token that can be cancelled through [`cancel`](Self::cancel) on any clone.
    pub fn new() -> Self {
        Self {
            flag: Some(Arc::new(AtomicBool::new(false))),
        }
    }

    pub fn cancel(&self) {
        if let Some(flag) = &self.flag {
            flag.store(true, Ordering::Relaxed);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Returns `Err(Cancelled)` once the token has been cancelled.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

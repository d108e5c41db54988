//! Cooperative cancellation
//!
//! Long-running loops (catch-up copying, the migration saga) check a shared
//! [`CancellationToken`] at loop boundaries. Cancellation never interrupts
//! an in-flight append; progress made before the check is preserved.

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag for cooperative cancellation.
///
/// Clones observe the same flag. Checks are cheap enough for per-iteration
/// use.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// New, un-cancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// True once `cancel` has been called on any clone
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Error with `Cancelled` if cancellation was requested.
    ///
    /// # Errors
    ///
    /// Returns `Error::Cancelled` once the token is cancelled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

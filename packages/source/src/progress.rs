//! Progress reporting for harvest runs.
//!
//! The orchestrator reports locality and listing progress through
//! [`ProgressCallback`] so it does not care whether the updates end up in
//! an `indicatif` bar, a log, or nowhere.

use std::sync::Arc;

/// Receives progress updates from a long-running harvest.
///
/// Implementations must be `Send + Sync` so they can be shared through an
/// [`Arc`].
pub trait ProgressCallback: Send + Sync {
    /// Sets the total expected units of work.
    fn set_total(&self, total: u64);

    /// Advances progress by `delta` units.
    fn inc(&self, delta: u64);

    /// Updates the message displayed alongside the indicator.
    fn set_message(&self, msg: String);

    /// Marks progress as complete with a final message.
    fn finish(&self, msg: String);
}

/// A [`ProgressCallback`] that ignores every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// Returns a shared [`NullProgress`] instance.
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}

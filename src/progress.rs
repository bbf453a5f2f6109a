//! Progress-callback trait for per-batch generation events.
//!
//! Inject an [`Arc<dyn GenerationProgressCallback>`] via
//! [`crate::config::GenerationConfigBuilder::progress_callback`] to receive
//! events as the orchestrator dispatches and completes batches.
//!
//! Batches run concurrently, so `on_batch_complete` and `on_batch_error`
//! arrive in completion order, not dispatch order.
//!
//! # Example
//!
//! ```rust
//! use exam_forge::{GenerationConfig, GenerationProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Counting {
//!     questions: AtomicUsize,
//! }
//!
//! impl GenerationProgressCallback for Counting {
//!     fn on_batch_complete(&self, _batch: usize, _total: usize, produced: usize) {
//!         self.questions.fetch_add(produced, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = GenerationConfig::builder()
//!     .credentials(["key-a"])
//!     .progress_callback(Arc::new(Counting { questions: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the generation orchestrator as it processes each batch.
///
/// All methods have default no-op implementations.
pub trait GenerationProgressCallback: Send + Sync {
    /// Called once after the batch plan is known.
    fn on_generation_start(&self, requested: usize, batches: usize) {
        let _ = (requested, batches);
    }

    /// Called when a batch's stagger delay elapses and its request is sent.
    ///
    /// `batch` is 0-indexed in dispatch order.
    fn on_batch_start(&self, batch: usize, total_batches: usize) {
        let _ = (batch, total_batches);
    }

    /// Called when a batch returns parsed questions.
    fn on_batch_complete(&self, batch: usize, total_batches: usize, produced: usize) {
        let _ = (batch, total_batches, produced);
    }

    /// Called when a batch fails; the batch contributes nothing.
    fn on_batch_error(&self, batch: usize, total_batches: usize, error: &str) {
        let _ = (batch, total_batches, error);
    }

    /// Called when deduplication leaves a shortfall and a top-up batch is sent.
    fn on_top_up(&self, shortfall: usize, requested: usize) {
        let _ = (shortfall, requested);
    }

    /// Called once with the final (truncated) question count.
    fn on_generation_complete(&self, requested: usize, produced: usize) {
        let _ = (requested, produced);
    }
}

/// A no-op implementation, used when no callback is configured.
pub struct NoopProgressCallback;

impl GenerationProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::GenerationConfig`].
pub type ProgressCallback = Arc<dyn GenerationProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        produced: AtomicUsize,
        errors: AtomicUsize,
        top_ups: AtomicUsize,
    }

    impl GenerationProgressCallback for TrackingCallback {
        fn on_batch_start(&self, _batch: usize, _total: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_batch_complete(&self, _batch: usize, _total: usize, produced: usize) {
            self.produced.fetch_add(produced, Ordering::SeqCst);
        }

        fn on_batch_error(&self, _batch: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_top_up(&self, _shortfall: usize, _requested: usize) {
            self.top_ups.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_generation_start(25, 3);
        cb.on_batch_start(0, 3);
        cb.on_batch_complete(0, 3, 10);
        cb.on_batch_error(1, 3, "timeout");
        cb.on_top_up(4, 6);
        cb.on_generation_complete(25, 25);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_batch_start(0, 2);
        tracker.on_batch_start(1, 2);
        tracker.on_batch_complete(1, 2, 8);
        tracker.on_batch_error(0, 2, "HTTP 503");
        tracker.on_top_up(2, 3);

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.produced.load(Ordering::SeqCst), 8);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.top_ups.load(Ordering::SeqCst), 1);
    }
}

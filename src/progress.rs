//! Progress-callback trait for per-item batch events.
//!
//! Inject an [`Arc<dyn MergeProgressCallback>`] via
//! [`crate::config::MergeConfigBuilder::progress_callback`] to receive events
//! as each reference is fetched, converted or dropped.
//!
//! Items are processed concurrently, so events for different indices arrive
//! in completion order, not submission order.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdfmerge::{MergeConfig, MergeProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     dropped: AtomicUsize,
//! }
//!
//! impl MergeProgressCallback for CountingCallback {
//!     fn on_item_dropped(&self, index: usize, _total: usize, error: &str) {
//!         self.dropped.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("item {index} dropped: {error}");
//!     }
//! }
//!
//! let config = MergeConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { dropped: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::pipeline::classify::Kind;
use std::sync::Arc;

/// Called by the pipeline as it processes each batch item.
///
/// Implementations must be `Send + Sync`; all methods default to no-ops.
/// Indices are the 0-based submission positions.
pub trait MergeProgressCallback: Send + Sync {
    /// Called once before any reference is resolved.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called when an item starts resolving.
    fn on_item_start(&self, index: usize, total: usize) {
        let _ = (index, total);
    }

    /// Called when an item is ready to be merged.
    fn on_item_complete(&self, index: usize, total: usize, kind: Kind) {
        let _ = (index, total, kind);
    }

    /// Called when an item is dropped from the batch.
    fn on_item_dropped(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once after every item has completed or been dropped.
    fn on_batch_complete(&self, total: usize, included: usize) {
        let _ = (total, included);
    }
}

/// A no-op implementation; the default when no callback is configured.
pub struct NoopProgressCallback;

impl MergeProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::MergeConfig`].
pub type ProgressCallback = Arc<dyn MergeProgressCallback>;

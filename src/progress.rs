//! Progress-callback trait for per-record harvest events.
//!
//! Inject an [`Arc<dyn HarvestProgressCallback>`] via
//! [`crate::config::HarvestConfigBuilder::progress_callback`] to observe a
//! run as it walks the publication list. Records are processed one at a
//! time, so events for a run arrive strictly in order.
//!
//! # Example
//!
//! ```rust
//! use pubfig::{HarvestConfig, HarvestProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Failures(AtomicUsize);
//!
//! impl HarvestProgressCallback for Failures {
//!     fn on_record_error(&self, index: usize, _total: usize, title: &str, error: &str) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("#{index} {title}: {error}");
//!     }
//! }
//!
//! let config = HarvestConfig::builder()
//!     .progress_callback(Arc::new(Failures(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use crate::output::SkipReason;
use std::path::Path;
use std::sync::Arc;

/// Called by the harvest loop as it processes each record.
///
/// All methods default to no-ops. `index` is 1-based.
pub trait HarvestProgressCallback: Send + Sync {
    /// Called once after the source is loaded.
    fn on_harvest_start(&self, total_records: usize) {
        let _ = total_records;
    }

    /// Called before link resolution for a record that is not skipped.
    fn on_record_start(&self, index: usize, total: usize, title: &str) {
        let _ = (index, total, title);
    }

    /// Called when a record has been skipped without any work.
    fn on_record_skipped(&self, index: usize, total: usize, title: &str, reason: SkipReason) {
        let _ = (index, total, title, reason);
    }

    /// Called after a figure has been written.
    fn on_record_complete(&self, index: usize, total: usize, title: &str, figure: &Path) {
        let _ = (index, total, title, figure);
    }

    /// Called when a record failed; the run continues.
    fn on_record_error(&self, index: usize, total: usize, title: &str, error: &str) {
        let _ = (index, total, title, error);
    }

    /// Called once after every record has been attempted.
    fn on_harvest_complete(&self, total_records: usize, extracted: usize) {
        let _ = (total_records, extracted);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl HarvestProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::HarvestConfig`].
pub type ProgressCallback = Arc<dyn HarvestProgressCallback>;

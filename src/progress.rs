//! Progress-callback trait for per-chapter build events.
//!
//! Inject an [`Arc<dyn BuildProgressCallback>`] via
//! [`crate::config::BookConfigBuilder::progress_callback`] to receive events
//! as the build processes each chapter.
//!
//! # Example
//!
//! ```rust
//! use bookpress::{BookConfig, BuildProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl BuildProgressCallback for CountingCallback {
//!     fn on_chapter_complete(&self, index: usize, total: usize, html_len: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Chapter {}/{} done ({} bytes of HTML)", index, total, html_len);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = BookConfig::builder()
//!     .title("Book")
//!     .author("Someone")
//!     .progress_callback(counter as Arc<dyn BuildProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the build as it processes each chapter.
///
/// Chapters are processed one at a time on the calling thread, so events
/// arrive strictly in sequence order. The trait is still `Send + Sync` so a
/// callback can be shared with a UI thread. All methods have default no-op
/// implementations.
pub trait BuildProgressCallback: Send + Sync {
    /// Called once before the first chapter is read.
    fn on_build_start(&self, total_chapters: usize) {
        let _ = total_chapters;
    }

    /// Called before a chapter's Markdown is converted.
    ///
    /// # Arguments
    /// * `index`: 1-based sequence index
    /// * `total`: number of chapters in the build
    /// * `name`: source file name
    fn on_chapter_start(&self, index: usize, total: usize, name: &str) {
        let _ = (index, total, name);
    }

    /// Called after a chapter has been handed to the renderer.
    fn on_chapter_complete(&self, index: usize, total: usize, html_len: usize) {
        let _ = (index, total, html_len);
    }

    /// Called when a stage passed a chapter through unchanged (lenient mode).
    fn on_chapter_warning(&self, index: usize, total: usize, warning: &str) {
        let _ = (index, total, warning);
    }

    /// Called once the Typst document is being compiled to PDF.
    fn on_render_start(&self) {}

    /// Called once after the PDF has been written.
    fn on_build_complete(&self, chapters: usize, pages: usize) {
        let _ = (chapters, pages);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BuildProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::BookConfig`].
pub type ProgressCallback = Arc<dyn BuildProgressCallback>;

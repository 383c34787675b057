//! # bookpress
//!
//! Assemble a directory of Markdown chapters into a typeset PDF book.
//!
//! ## Pipeline Overview
//!
//! ```text
//! content/*.md (sorted by file name)
//!  │
//!  ├─ 1. Parse       Markdown → HTML (pulldown-cmark, fixed extension set)
//!  ├─ 2. Transform   keep headings with their paragraph, chapter decoration,
//!  │                 {notice} / [break] markers
//!  ├─ 3. Typography  punctuation fixer + orphan prevention per paragraph
//!  ├─ 4. Hyphenate   soft hyphens from Knuth–Liang dictionaries
//!  ├─ 5. Assemble    running header, chapter container, page breaks
//!  └─ 6. Render      Typst → PDF, written atomically
//! ```
//!
//! Covers, colophon and a theme are picked up from `assets/` when present.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bookpress::{build, BookConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BookConfig::builder()
//!         .title("Dandy Code")
//!         .author("A. Author")
//!         .font("EB Garamond", "EBGaramond-Regular.ttf")
//!         .build()?;
//!     let output = build("my-book", &config)?;
//!     eprintln!(
//!         "{} chapters, {} pages → {}",
//!         output.stats.chapters,
//!         output.stats.pages,
//!         output.output_path.display()
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `bookpress` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! bookpress = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod assembler;
pub mod assets;
pub mod build;
pub mod config;
pub mod error;
pub mod outline;
pub mod pipeline;
pub mod progress;
pub mod render;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use assembler::{AssemblyState, ChapterAssembler};
pub use build::{build, build_project, BuildOutput, BuildStats};
pub use config::{
    BookConfig, BookConfigBuilder, DecorationPolicy, Locale, MissingTitlePolicy, PageSide,
    TransformPolicy,
};
pub use error::{BookError, StageWarning};
pub use outline::OutlineEntry;
pub use pipeline::chapter::{ChapterProcessor, ProcessedChapter};
pub use progress::{BuildProgressCallback, NoopProgressCallback, ProgressCallback};
pub use render::{BookRenderer, TypstRenderer};

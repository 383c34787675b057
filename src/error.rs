//! Error types for the bookpress library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`BookError`] (**fatal**): the build cannot proceed at all (bad config,
//!   missing content directory, Typst rejected the document). Returned as
//!   `Err(BookError)` from [`crate::build::build`] and friends. No PDF is left
//!   on disk when one of these is returned.
//!
//! * [`StageWarning`] (**non-fatal**): one transform stage refused a chapter
//!   fragment (unbalanced tags from raw HTML in the Markdown source) and, under
//!   [`crate::config::TransformPolicy::Lenient`], passed it through unchanged.
//!   Collected into [`crate::build::BuildStats::warnings`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the bookpress library.
#[derive(Debug, Error)]
pub enum BookError {
    // ── Configuration errors ──────────────────────────────────────────────
    /// Builder or file validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// `book.json` exists but is not valid JSON or misses a required key.
    #[error("Failed to parse configuration '{path}': {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    // ── Input errors ──────────────────────────────────────────────────────
    /// Content directory, config file, font or asset is missing.
    #[error("{what} not found: '{path}'")]
    InputNotFound { what: String, path: PathBuf },

    /// An input exists but could not be read.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// A transform stage refused a malformed fragment (strict policy only).
    #[error("Chapter '{chapter}': {stage} stage rejected malformed HTML: {detail}")]
    Transform {
        chapter: String,
        stage: &'static str,
        detail: String,
    },

    /// A hyphenation dictionary could not be loaded.
    #[error("Hyphenation dictionary for '{locale}' unavailable: {detail}")]
    Hyphenation { locale: String, detail: String },

    // ── Render errors ─────────────────────────────────────────────────────
    /// The typesetting engine could not lay out the content.
    #[error("Render failed{}: {detail}", .chapter.as_ref().map(|c| format!(" in chapter '{c}'")).unwrap_or_default())]
    Render {
        chapter: Option<String>,
        detail: String,
    },

    /// A chapter was added after the final chapter, or the book was
    /// finalised twice.
    #[error("The book has already been finalised; no more content can be added")]
    AssemblyFinished,

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output PDF.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BookError {
    /// Attach the chapter's source file name to a render error that does not
    /// carry one yet. Other variants are returned untouched.
    pub fn in_chapter(self, name: &str) -> Self {
        match self {
            BookError::Render {
                chapter: None,
                detail,
            } => BookError::Render {
                chapter: Some(name.to_string()),
                detail,
            },
            other => other,
        }
    }
}

/// A non-fatal stage failure for a single chapter.
///
/// The fragment was passed through the named stage unmodified.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
#[error("Chapter '{chapter}': {stage} stage skipped: {detail}")]
pub struct StageWarning {
    /// Source file name of the chapter.
    pub chapter: String,
    /// Stage that refused the fragment.
    pub stage: String,
    /// Why the fragment was refused.
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_display_with_chapter() {
        let e = BookError::Render {
            chapter: None,
            detail: "unknown font".into(),
        }
        .in_chapter("02-intro.md");
        let msg = e.to_string();
        assert!(msg.contains("02-intro.md"), "got: {msg}");
        assert!(msg.contains("unknown font"), "got: {msg}");
    }

    #[test]
    fn render_display_without_chapter() {
        let e = BookError::Render {
            chapter: None,
            detail: "boom".into(),
        };
        assert_eq!(e.to_string(), "Render failed: boom");
    }

    #[test]
    fn in_chapter_keeps_existing_context() {
        let e = BookError::Render {
            chapter: Some("01.md".into()),
            detail: "x".into(),
        }
        .in_chapter("02.md");
        assert!(e.to_string().contains("01.md"));
    }

    #[test]
    fn input_not_found_display() {
        let e = BookError::InputNotFound {
            what: "Content directory".into(),
            path: PathBuf::from("/tmp/book/content"),
        };
        assert!(e.to_string().starts_with("Content directory not found"));
    }

    #[test]
    fn transform_display() {
        let e = BookError::Transform {
            chapter: "03.md".into(),
            stage: "typography",
            detail: "unclosed <span>".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("03.md") && msg.contains("typography"), "got: {msg}");
    }

    #[test]
    fn stage_warning_display() {
        let w = StageWarning {
            chapter: "04.md".into(),
            stage: "hyphenation".into(),
            detail: "unexpected </div>".into(),
        };
        assert!(w.to_string().contains("hyphenation stage skipped"));
    }
}

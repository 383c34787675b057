//! Pipeline stages for turning one Markdown chapter into print-ready HTML.
//!
//! Each submodule implements exactly one transformation step. Keeping stages
//! separate makes each independently testable and lets the driver guard every
//! stage boundary with the same well-formedness check.
//!
//! ## Data Flow
//!
//! ```text
//! markdown ──▶ transform ──▶ typography ──▶ hyphenate ──▶ (renderer)
//! (parse)      (blocks,       (punctuation,   (soft hyphens,
//!               markers)       orphans)        per locale)
//! ```
//!
//! 1. [`markdown`]: CommonMark + GFM extensions to HTML
//! 2. [`transform`]: heading/paragraph cohesion, chapter decoration, marker
//!    substitution
//! 3. [`typography`]: per-span punctuation fixes, global typograf pass,
//!    short-word orphan prevention
//! 4. [`hyphenate`]: soft-hyphen insertion, once per configured locale
//!
//! [`chapter`] drives the stages for one document; [`fragment`] holds the
//! HTML helpers they share.

pub mod chapter;
pub mod fragment;
pub mod hyphenate;
pub mod markdown;
pub mod transform;
pub mod typography;

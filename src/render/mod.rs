//! Rendering backend: everything between finished chapter HTML and the PDF.
//!
//! The build talks to the backend only through [`BookRenderer`], the small
//! surface a paginating engine needs: running header, content blocks, page
//! breaks, footer, covers and a final write. [`TypstRenderer`] implements it
//! by transpiling HTML to Typst markup and compiling that with the embedded
//! Typst engine.
//!
//! - [`typst`]: HTML fragment → Typst markup
//! - [`theme`]: built-in page/theme preamble
//! - [`compiler`]: the [`TypstRenderer`] session

pub mod compiler;
pub mod theme;
pub mod typst;

pub use compiler::TypstRenderer;

use crate::config::{CoverPlacement, PageSide};
use crate::error::BookError;
use crate::pipeline::fragment::css_declaration;
use std::path::{Path, PathBuf};

/// Text and anchor of a chapter's running header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningHeader {
    /// Visible chapter title.
    pub text: String,
    /// URL-safe anchor derived from the title.
    pub slug: String,
}

/// A front or back cover.
#[derive(Debug, Clone, PartialEq)]
pub enum Cover {
    /// Full-bleed image page.
    Image {
        path: PathBuf,
        placement: ImagePlacement,
    },
    /// An HTML page, followed by a page break.
    Html(String),
}

/// Result of [`BookRenderer::finalize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderSummary {
    pub pages: usize,
    /// Non-fatal layout warnings (unknown font families, …).
    pub warnings: Vec<String>,
}

/// Session with a paginating renderer. One instance renders one book.
///
/// Calls arrive in document order. After [`finalize`](Self::finalize) every
/// call fails with [`BookError::AssemblyFinished`].
pub trait BookRenderer {
    /// Install (or with `None`, clear) the header shown from the current page
    /// on, on pages of the given side.
    fn set_running_header(
        &mut self,
        header: Option<&RunningHeader>,
        side: PageSide,
    ) -> Result<(), BookError>;

    /// Append one block of HTML content.
    fn write_content_block(&mut self, html: &str) -> Result<(), BookError>;

    /// Force the next content onto a new page.
    fn insert_page_break(&mut self) -> Result<(), BookError>;

    /// Set the footer HTML printed on every page. `{PAGENO}` is the page
    /// number.
    fn set_footer(&mut self, html: &str) -> Result<(), BookError>;

    /// Append a cover page.
    fn write_cover(&mut self, cover: &Cover) -> Result<(), BookError>;

    /// Lay out the whole document and write it to `path`.
    fn finalize(&mut self, path: &Path) -> Result<RenderSummary, BookError>;
}

/// Where a cover image lands on its page, in millimetres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImagePlacement {
    pub width: Option<f32>,
    pub height: Option<f32>,
    pub left: f32,
    pub top: f32,
}

impl ImagePlacement {
    /// Read placement from the two CSS declaration strings of the config.
    ///
    /// Unitless numbers are millimetres. Percentages, `auto` and unknown
    /// units are ignored.
    pub fn from_css(placement: &CoverPlacement) -> Self {
        let get = |css: &str, prop: &str| css_declaration(css, prop).and_then(|v| css_length_mm(&v));
        Self {
            width: get(&placement.dimensions, "width"),
            height: get(&placement.dimensions, "height"),
            left: get(&placement.position, "left").unwrap_or(0.0),
            top: get(&placement.position, "top").unwrap_or(0.0),
        }
    }
}

/// Convert a CSS length to millimetres.
pub fn css_length_mm(value: &str) -> Option<f32> {
    let v = value.trim();
    let split = v
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
        .unwrap_or(v.len());
    let (num, unit) = v.split_at(split);
    let n: f32 = num.parse().ok()?;
    let factor = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "mm" => 1.0,
        "cm" => 10.0,
        "in" => 25.4,
        "pt" => 25.4 / 72.0,
        "px" => 25.4 / 96.0,
        _ => return None,
    };
    Some(n * factor)
}

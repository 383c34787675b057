//! Table-of-contents listing for a project's Markdown sources.
//!
//! Headings are read straight from the Markdown (no transform stages run),
//! files in sequence order, headings in document order. Used as a checklist
//! while writing: every heading is printed as `[] ## Title`.

use crate::error::BookError;
use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// One heading found in a chapter source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutlineEntry {
    /// 1–6.
    pub level: u8,
    pub text: String,
    /// Source file name, without directory.
    pub file: String,
}

/// Markdown files in `content_dir`, sorted by file name.
///
/// The sort order is the chapter order of the book.
pub fn chapter_files(content_dir: &Path) -> Result<Vec<PathBuf>, BookError> {
    if !content_dir.is_dir() {
        return Err(BookError::InputNotFound {
            what: "Content directory".to_string(),
            path: content_dir.to_path_buf(),
        });
    }
    let read_failed = |source| BookError::ReadFailed {
        path: content_dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in fs::read_dir(content_dir).map_err(read_failed)? {
        let path = entry.map_err(read_failed)?.path();
        let is_md = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("md"));
        if is_md && path.is_file() {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Headings of one Markdown document.
pub fn headings(markdown: &str, file: &str) -> Vec<OutlineEntry> {
    let mut out = Vec::new();
    let mut current: Option<(u8, String)> = None;
    for event in Parser::new_ext(markdown, crate::pipeline::markdown::options()) {
        match event {
            Event::Start(Tag::Heading { level, .. }) => current = Some((level as u8, String::new())),
            Event::End(TagEnd::Heading(_)) => {
                if let Some((level, text)) = current.take() {
                    out.push(OutlineEntry {
                        level,
                        text: text.trim().to_string(),
                        file: file.to_string(),
                    });
                }
            }
            Event::Text(t) | Event::Code(t) => {
                if let Some((_, text)) = current.as_mut() {
                    text.push_str(&t);
                }
            }
            Event::SoftBreak | Event::HardBreak => {
                if let Some((_, text)) = current.as_mut() {
                    text.push(' ');
                }
            }
            _ => {}
        }
    }
    out
}

/// Headings of every chapter in `content_dir`.
pub fn collect(content_dir: &Path) -> Result<Vec<OutlineEntry>, BookError> {
    let mut out = Vec::new();
    for path in chapter_files(content_dir)? {
        let src = fs::read_to_string(&path).map_err(|source| BookError::ReadFailed {
            path: path.clone(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        out.extend(headings(&src, &name));
    }
    Ok(out)
}

/// `[] ### Title` lines, one per heading.
pub fn format_checklist(entries: &[OutlineEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("[] {} {}\n", "#".repeat(e.level as usize), e.text))
        .collect()
}

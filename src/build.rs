//! Whole-book build entry points.
//!
//! ```text
//! book.json ─▶ validate ─▶ fonts + front matter ─▶ per chapter: process ─▶ assemble
//!                                                                            │
//!                                                       finalize (PDF) ◀─────┘
//! ```
//!
//! Chapters are processed strictly one after another: the renderer session
//! carries the running header and page flow from one chapter into the next.

use crate::assembler::ChapterAssembler;
use crate::assets::{self, FrontMatter};
use crate::config::{BookConfig, CONFIG_FILE_NAME};
use crate::error::{BookError, StageWarning};
use crate::outline::chapter_files;
use crate::pipeline::chapter::ChapterProcessor;
use crate::render::{BookRenderer, TypstRenderer};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Summary of one build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildStats {
    /// Chapters written to the book.
    pub chapters: usize,
    /// Pages in the final PDF, covers and colophon included.
    pub pages: usize,
    /// Stages skipped under the lenient transform policy.
    pub warnings: Vec<StageWarning>,
    /// Layout warnings reported by the typesetting engine.
    pub render_warnings: Vec<String>,
    /// Wall-clock time of the whole build.
    pub duration_ms: u64,
}

/// Result of a successful build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildOutput {
    /// Where the PDF was written.
    pub output_path: PathBuf,
    /// Typst source written next to the PDF, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typst_path: Option<PathBuf>,
    pub stats: BuildStats,
}

/// Load `book.json` from `project_dir` and build the book.
pub fn build_project(project_dir: impl AsRef<Path>) -> Result<BuildOutput, BookError> {
    let project_dir = project_dir.as_ref();
    let config = BookConfig::from_file(project_dir.join(CONFIG_FILE_NAME))?;
    build(project_dir, &config)
}

/// Build the book for the project at `project_dir` with `config`.
///
/// # Errors
/// Every error is fatal and leaves no PDF behind:
/// - invalid configuration
/// - missing content directory, chapters, fonts or explicitly configured assets
/// - malformed chapter HTML under the strict transform policy
/// - Typst rejecting the document, or the output not being writable
pub fn build(project_dir: impl AsRef<Path>, config: &BookConfig) -> Result<BuildOutput, BookError> {
    let start = Instant::now();
    let root = project_dir.as_ref();
    config.validate()?;
    info!("Building '{}' from {}", config.title, root.display());

    // ── Step 1: Chapter sources ──────────────────────────────────────────
    let content_dir = root.join(&config.paths.content);
    let files = chapter_files(&content_dir)?;
    if files.is_empty() {
        return Err(BookError::InputNotFound {
            what: "Markdown chapters".to_string(),
            path: content_dir,
        });
    }
    let total = files.len();
    debug!("Found {} chapters", total);

    // ── Step 2: Fonts and front matter ───────────────────────────────────
    let fonts = assets::load_fonts(root, config)?;
    let front = assets::load_front_matter(root, config)?;
    let output_path = output_path(root, config);

    // ── Step 3: Pipeline and renderer session ────────────────────────────
    let processor = ChapterProcessor::new(config)?;
    let mut renderer = TypstRenderer::new(config, root, fonts);
    if let Some(theme) = &front.theme {
        renderer = renderer.with_theme(theme.clone());
    }
    write_front_matter(&mut renderer, &front)?;
    renderer.set_footer(&config.footer)?;

    if let Some(ref cb) = config.progress_callback {
        cb.on_build_start(total);
    }

    // ── Step 4: Chapters, in file-name order ─────────────────────────────
    let mut assembler = ChapterAssembler::from_config(config);
    let mut warnings = Vec::new();
    for (i, path) in files.iter().enumerate() {
        let index = i + 1;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if let Some(ref cb) = config.progress_callback {
            cb.on_chapter_start(index, total, &name);
        }

        let source = fs::read_to_string(path).map_err(|source| BookError::ReadFailed {
            path: path.clone(),
            source,
        })?;
        let chapter = processor.process(&source, index, &name)?;
        for w in &chapter.warnings {
            if let Some(ref cb) = config.progress_callback {
                cb.on_chapter_warning(index, total, &w.to_string());
            }
        }
        warnings.extend(chapter.warnings);

        renderer.begin_chapter(&name);
        let assembled = assembler
            .add_chapter(&mut renderer, &chapter.html, index == total)
            .map_err(|e| e.in_chapter(&name))?;
        debug!(chapter = %name, title = ?assembled.title, "Chapter added");

        if let Some(ref cb) = config.progress_callback {
            cb.on_chapter_complete(index, total, chapter.html.len());
        }
    }

    // ── Step 5: Compile and write ────────────────────────────────────────
    if let Some(ref cb) = config.progress_callback {
        cb.on_render_start();
    }
    let summary = renderer.finalize(&output_path)?;

    let typst_path = if config.emit_typst {
        let path = output_path.with_extension("typ");
        fs::write(&path, renderer.to_typst_source()).map_err(|source| {
            BookError::OutputWriteFailed {
                path: path.clone(),
                source,
            }
        })?;
        Some(path)
    } else {
        None
    };

    if !warnings.is_empty() {
        warn!("{} stage(s) skipped on malformed HTML", warnings.len());
    }
    let stats = BuildStats {
        chapters: total,
        pages: summary.pages,
        warnings,
        render_warnings: summary.warnings,
        duration_ms: start.elapsed().as_millis() as u64,
    };
    info!(
        "Build complete: {} chapters, {} pages, {}ms",
        stats.chapters, stats.pages, stats.duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_build_complete(stats.chapters, stats.pages);
    }

    Ok(BuildOutput {
        output_path,
        typst_path,
        stats,
    })
}

/// Cover, back cover, then colophon followed by its own page.
fn write_front_matter<R: BookRenderer + ?Sized>(
    renderer: &mut R,
    front: &FrontMatter,
) -> Result<(), BookError> {
    for cover in [&front.cover, &front.back_cover].into_iter().flatten() {
        renderer.write_cover(cover)?;
    }
    if let Some(colophon) = &front.colophon {
        renderer.write_content_block(colophon)?;
        renderer.insert_page_break()?;
    }
    Ok(())
}

/// `config.output` resolved against the project, else
/// `<export>/<title>.pdf` with path separators in the title replaced.
pub fn output_path(root: &Path, config: &BookConfig) -> PathBuf {
    match &config.output {
        Some(path) => root.join(path),
        None => {
            let name: String = config
                .title
                .trim()
                .chars()
                .map(|c| if matches!(c, '/' | '\\' | '\0') { '-' } else { c })
                .collect();
            root.join(&config.paths.export).join(format!("{name}.pdf"))
        }
    }
}

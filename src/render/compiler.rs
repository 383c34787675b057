//! [`TypstRenderer`]: a [`BookRenderer`] session backed by the embedded Typst
//! compiler.
//!
//! Content accumulates as Typst markup in memory; nothing touches the disk
//! until [`finalize`](BookRenderer::finalize), which compiles the whole
//! document in one go and writes the PDF atomically (temp file in the target
//! directory, then persist), so a failed build never leaves a partial PDF
//! behind.

use crate::config::{BookConfig, PageSide};
use crate::error::BookError;
use crate::render::theme::{self, HEADER_LABEL};
use crate::render::typst::{string_literal, Transpiler};
use crate::render::{BookRenderer, Cover, RenderSummary, RunningHeader};
use std::io::Write;
use std::ops::Range;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use typst::diag::{Severity, SourceDiagnostic};
use typst::syntax::{Source, Span};
use typst_as_lib::{TypstAsLibError, TypstEngine};

/// Renderer session for one book.
pub struct TypstRenderer {
    config: BookConfig,
    root: PathBuf,
    transpiler: Transpiler,
    fonts: Vec<Vec<u8>>,
    theme: Option<String>,
    footer: Option<String>,
    header_side: PageSide,
    body: Vec<String>,
    /// Index into `body` where each named chapter starts.
    chapters: Vec<(usize, String)>,
    finished: bool,
}

impl std::fmt::Debug for TypstRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypstRenderer")
            .field("root", &self.root)
            .field("fonts", &self.fonts.len())
            .field("theme", &self.theme.is_some())
            .field("blocks", &self.body.len())
            .field("finished", &self.finished)
            .finish()
    }
}

impl TypstRenderer {
    /// `root` is the project directory; images and covers are resolved
    /// against it. `fonts` are raw font files (TTF/OTF).
    pub fn new(config: &BookConfig, root: impl Into<PathBuf>, fonts: Vec<Vec<u8>>) -> Self {
        let root = root.into();
        let transpiler = Transpiler::new(root.clone(), vec![config.paths.content.clone()]);
        Self {
            config: config.clone(),
            root,
            transpiler,
            fonts,
            theme: None,
            footer: None,
            header_side: config.chapters.running_header,
            body: Vec::new(),
            chapters: Vec::new(),
            finished: false,
        }
    }

    /// Append a user theme (Typst source) after the built-in preamble.
    pub fn with_theme(mut self, source: impl Into<String>) -> Self {
        self.theme = Some(source.into());
        self
    }

    /// The complete Typst document as it would be compiled now.
    pub fn to_typst_source(&self) -> String {
        self.assemble().0
    }

    /// Attribute the content written from now on to chapter `name`, for
    /// error reports.
    pub fn begin_chapter(&mut self, name: &str) {
        self.chapters.push((self.body.len(), name.to_string()));
    }

    /// Source text plus the byte range of every body block in it.
    fn assemble(&self) -> (String, Vec<Range<usize>>) {
        let mut src = theme::preamble(&self.config, self.footer.as_deref());
        if let Some(theme) = &self.theme {
            src.push('\n');
            src.push_str(theme);
            src.push('\n');
        }
        src.push('\n');
        let mut blocks = Vec::with_capacity(self.body.len());
        for (i, block) in self.body.iter().enumerate() {
            if i > 0 {
                src.push_str("\n\n");
            }
            let start = src.len();
            src.push_str(block);
            blocks.push(start..src.len());
        }
        src.push('\n');
        (src, blocks)
    }

    /// Side the running header was last configured for.
    pub fn header_side(&self) -> PageSide {
        self.header_side
    }

    fn ensure_open(&self) -> Result<(), BookError> {
        if self.finished {
            Err(BookError::AssemblyFinished)
        } else {
            Ok(())
        }
    }

    fn compile(&self, source: &str, blocks: &[Range<usize>]) -> Result<Compiled, BookError> {
        let engine = TypstEngine::builder()
            .main_file(source.to_string())
            .with_file_system_resolver(self.root.clone())
            .fonts(self.fonts.iter().cloned())
            .build();

        let compiled = engine.compile();
        let mut warnings = Vec::with_capacity(compiled.warnings.len());
        for w in compiled.warnings.iter() {
            let chapter = self.chapter_of(w.span, source, blocks);
            warn!(chapter = chapter.as_deref().unwrap_or("-"), "typst: {}", describe(w));
            warnings.push(match chapter {
                Some(name) => format!("{name}: {}", describe(w)),
                None => describe(w),
            });
        }
        let document = compiled.output.map_err(|e| match e {
            TypstAsLibError::TypstSource(diags) => self.diagnostics_error(&diags, source, blocks),
            other => BookError::Render {
                chapter: None,
                detail: other.to_string(),
            },
        })?;

        let options = typst_pdf::PdfOptions::default();
        let pdf = typst_pdf::pdf(&document, &options)
            .map_err(|diags| self.diagnostics_error(&diags, source, blocks))?;
        Ok(Compiled {
            pdf,
            pages: document.pages.len(),
            warnings,
        })
    }

    /// Render error carrying every error diagnostic, attributed to the
    /// chapter the first locatable one points into.
    fn diagnostics_error(
        &self,
        diags: &[SourceDiagnostic],
        source: &str,
        blocks: &[Range<usize>],
    ) -> BookError {
        let errors: Vec<&SourceDiagnostic> = diags
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .collect();
        let chapter = errors
            .iter()
            .find_map(|d| self.chapter_of(d.span, source, blocks));
        let detail = if errors.is_empty() {
            "unknown Typst error".to_string()
        } else {
            errors.iter().map(|d| describe(d)).collect::<Vec<_>>().join("; ")
        };
        BookError::Render { chapter, detail }
    }

    /// Chapter whose markup contains `span`, if any.
    fn chapter_of(&self, span: Span, source: &str, blocks: &[Range<usize>]) -> Option<String> {
        let offset = match span.range() {
            Some(range) => range.start,
            // Spans are numbered deterministically from the text, so a
            // reparse under the same file id locates them.
            None => Source::new(span.id()?, source.to_string()).range(span)?.start,
        };
        let block = blocks.iter().position(|b| b.start <= offset && offset < b.end)?;
        self.chapters
            .iter()
            .rev()
            .find(|(start, _)| *start <= block)
            .map(|(_, name)| name.clone())
    }
}

/// `message (hint: …)` for one diagnostic.
fn describe(diag: &SourceDiagnostic) -> String {
    let mut out = diag.message.to_string();
    for hint in &diag.hints {
        out.push_str(&format!(" (hint: {hint})"));
    }
    out
}

struct Compiled {
    pdf: Vec<u8>,
    pages: usize,
    warnings: Vec<String>,
}

/// `/a/b` form of a project-relative path, as Typst resolves it.
fn typst_path(rel: &Path) -> Result<String, BookError> {
    let mut parts = Vec::new();
    for c in rel.components() {
        match c {
            Component::Normal(s) => parts.push(s.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => {
                return Err(BookError::Render {
                    chapter: None,
                    detail: format!("cover path must be inside the project: '{}'", rel.display()),
                })
            }
        }
    }
    Ok(format!("/{}", parts.join("/")))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), BookError> {
    let fail = |source| BookError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(parent).map_err(fail)?;
    // Dropped (and deleted) on any error below.
    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(fail)?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(fail)?;
    tmp.persist(path).map_err(|e| fail(e.error))?;
    Ok(())
}

impl BookRenderer for TypstRenderer {
    fn set_running_header(
        &mut self,
        header: Option<&RunningHeader>,
        side: PageSide,
    ) -> Result<(), BookError> {
        self.ensure_open()?;
        self.header_side = side;
        self.config.chapters.running_header = side;
        match header {
            Some(h) => {
                self.body.push(format!(
                    "#metadata({}) <{HEADER_LABEL}>\n#metadata(none) <{}>",
                    string_literal(&h.text),
                    h.slug
                ));
            }
            None => self.body.push(format!("#metadata(none) <{HEADER_LABEL}>")),
        }
        Ok(())
    }

    fn write_content_block(&mut self, html: &str) -> Result<(), BookError> {
        self.ensure_open()?;
        let markup = self.transpiler.transpile(html)?;
        debug!(bytes = markup.len(), "Content block transpiled");
        self.body.push(markup);
        Ok(())
    }

    fn insert_page_break(&mut self) -> Result<(), BookError> {
        self.ensure_open()?;
        self.body.push("#pagebreak()".to_string());
        Ok(())
    }

    fn set_footer(&mut self, html: &str) -> Result<(), BookError> {
        self.ensure_open()?;
        self.footer = Some(self.transpiler.transpile_footer(html)?);
        Ok(())
    }

    fn write_cover(&mut self, cover: &Cover) -> Result<(), BookError> {
        self.ensure_open()?;
        match cover {
            Cover::Image { path, placement } => {
                let size = |v: Option<f32>| v.map_or_else(|| "100%".to_string(), |mm| format!("{mm}mm"));
                self.body.push(format!(
                    "#page(margin: 0pt, header: none, footer: none)[\n  #place(top + left, dx: {}mm, dy: {}mm, image({}, width: {}, height: {}, fit: \"cover\"))\n]",
                    placement.left,
                    placement.top,
                    string_literal(&typst_path(path)?),
                    size(placement.width),
                    size(placement.height),
                ));
            }
            Cover::Html(html) => {
                let markup = self.transpiler.transpile(html)?;
                self.body.push(markup);
                self.body.push("#pagebreak()".to_string());
            }
        }
        Ok(())
    }

    fn finalize(&mut self, path: &Path) -> Result<RenderSummary, BookError> {
        self.ensure_open()?;
        self.finished = true;
        let (source, blocks) = self.assemble();
        info!(blocks = self.body.len(), "Compiling document");
        let compiled = self.compile(&source, &blocks)?;
        write_atomic(path, &compiled.pdf)?;
        info!(pages = compiled.pages, path = %path.display(), "PDF written");
        Ok(RenderSummary {
            pages: compiled.pages,
            warnings: compiled.warnings,
        })
    }
}

//! End-to-end tests: throw-away projects on disk built into real PDFs.
//!
//! The Typst engine is pure Rust and fonts come from the bundled
//! `typst-assets` faces, so these run anywhere without system dependencies.
//!
//! Run with:
//!   cargo test --test e2e -- --nocapture

use bookpress::{
    build, build_project, outline, BookConfig, BookError, BuildProgressCallback, TransformPolicy,
    TypstRenderer,
};
use bookpress::{BookRenderer, ChapterAssembler, ChapterProcessor};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use typst::foundations::Bytes;
use typst::text::{Font, FontVariant};

// ── Test helpers ─────────────────────────────────────────────────────────────

const BOOK_JSON: &str = r#"{ "title": "Test Book", "author": "Tester", "fonts": {} }"#;

/// A project with `book.json` and the given chapters under `content/`.
fn project(chapters: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("book.json"), BOOK_JSON).unwrap();
    fs::create_dir_all(dir.path().join("content")).unwrap();
    for (name, md) in chapters {
        fs::write(dir.path().join("content").join(name), md).unwrap();
    }
    dir
}

fn config() -> BookConfig {
    BookConfig::builder()
        .title("Test Book")
        .author("Tester")
        .build()
        .unwrap()
}

/// Regular face of a bundled font family.
fn bundled_font(family: &str) -> &'static [u8] {
    typst_assets::fonts()
        .find(|data| {
            Font::new(Bytes::new(*data), 0).is_some_and(|f| {
                f.info().family == family && f.info().variant == FontVariant::default()
            })
        })
        .unwrap_or_else(|| panic!("{family} is not bundled"))
}

/// Like [`project`], with a serif and a mono font installed under
/// `assets/fonts` and named in `book.json`.
fn project_with_fonts(chapters: &[(&str, &str)]) -> TempDir {
    let dir = project(chapters);
    let fonts = dir.path().join("assets/fonts");
    fs::create_dir_all(&fonts).unwrap();
    fs::write(fonts.join("serif.otf"), bundled_font("Libertinus Serif")).unwrap();
    fs::write(fonts.join("mono.ttf"), bundled_font("DejaVu Sans Mono")).unwrap();
    fs::write(
        dir.path().join("book.json"),
        r#"{ "title": "Test Book", "author": "Tester",
             "fonts": { "Libertinus Serif": "serif.otf", "DejaVu Sans Mono": "mono.ttf" } }"#,
    )
    .unwrap();
    dir
}

/// One paragraph of `words` words.
fn long_paragraph(words: usize) -> String {
    const WORDS: &[&str] = &["lorem", "ipsum", "dolor", "sit", "amet", "consectetur", "adipiscing", "elit"];
    (0..words).map(|i| WORDS[i % WORDS.len()]).collect::<Vec<_>>().join(" ")
}

fn assert_pdf(path: &Path) {
    let bytes = fs::read(path).unwrap_or_else(|e| panic!("{}: {e}", path.display()));
    assert!(bytes.starts_with(b"%PDF"), "not a PDF: {}", path.display());
}

/// Records the order chapters were started in.
#[derive(Default)]
struct OrderRecorder {
    names: Mutex<Vec<String>>,
    warnings: Mutex<Vec<String>>,
    pages: Mutex<usize>,
}

impl BuildProgressCallback for OrderRecorder {
    fn on_chapter_start(&self, _index: usize, _total: usize, name: &str) {
        self.names.lock().unwrap().push(name.to_string());
    }

    fn on_chapter_warning(&self, _index: usize, _total: usize, warning: &str) {
        self.warnings.lock().unwrap().push(warning.to_string());
    }

    fn on_build_complete(&self, _chapters: usize, pages: usize) {
        *self.pages.lock().unwrap() = pages;
    }
}

// ── Builds ───────────────────────────────────────────────────────────────────

#[test]
fn test_build_project_writes_pdf() {
    let dir = project(&[
        ("01-intro.md", "# Introduction\n\nHello world.\n"),
        ("02-body.md", "# Body\n\n> {notice} Read this first.\n\nText.\n"),
    ]);
    let out = build_project(dir.path()).unwrap();
    assert_eq!(out.output_path, dir.path().join("export/Test Book.pdf"));
    assert_pdf(&out.output_path);
    assert_eq!(out.stats.chapters, 2);
    assert!(out.stats.pages >= 2, "pages: {}", out.stats.pages);
    assert!(out.stats.warnings.is_empty());
    assert!(out.typst_path.is_none());
}

#[test]
fn test_chapters_processed_in_file_name_order() {
    let dir = project(&[
        ("10-last.md", "# Last\n"),
        ("02-second.md", "# Second\n"),
        ("01-first.md", "# First\n"),
        ("README.txt", "not a chapter"),
    ]);
    let recorder = Arc::new(OrderRecorder::default());
    let mut config = config();
    config.progress_callback = Some(recorder.clone());
    let out = build(dir.path(), &config).unwrap();
    assert_eq!(out.stats.chapters, 3);
    assert_eq!(
        *recorder.names.lock().unwrap(),
        vec!["01-first.md", "02-second.md", "10-last.md"]
    );
    assert_eq!(*recorder.pages.lock().unwrap(), out.stats.pages);
}

#[test]
fn test_emitted_typst_has_n_minus_one_chapter_breaks() {
    let dir = project(&[
        ("a.md", "# A\n\nOne.\n"),
        ("b.md", "# B\n\nTwo.\n"),
        ("c.md", "# C\n\nThree.\n"),
    ]);
    let mut config = config();
    config.emit_typst = true;
    let out = build(dir.path(), &config).unwrap();
    let typ = out.typst_path.expect("typst source requested");
    assert_eq!(typ, dir.path().join("export/Test Book.typ"));
    let src = fs::read_to_string(typ).unwrap();
    assert_eq!(src.matches("#pagebreak()").count(), 2, "source:\n{src}");
    assert_eq!(src.matches("<chapter-header>").count(), 4, "three marks plus the header query");
}

#[test]
fn test_front_matter_written_before_chapters() {
    let dir = project(&[("01.md", "# Main\n\nBody.\n")]);
    fs::create_dir_all(dir.path().join("assets")).unwrap();
    fs::write(dir.path().join("assets/cover.html"), "<h1>My Cover</h1>").unwrap();
    fs::write(
        dir.path().join("assets/colophon.html"),
        "<p>Printed [year]. Build [commit].</p>",
    )
    .unwrap();
    fs::write(dir.path().join("assets/theme.typ"), "#set text(size: 10pt)\n").unwrap();
    let mut config = config();
    config.emit_typst = true;
    let out = build(dir.path(), &config).unwrap();
    assert_pdf(&out.output_path);
    let src = fs::read_to_string(out.typst_path.unwrap()).unwrap();
    let cover = src.find("My Cover").unwrap();
    let colophon = src.find("Printed").unwrap();
    let chapter = src.find("= Main").unwrap();
    assert!(cover < colophon && colophon < chapter);
    assert!(src.contains("#set text(size: 10pt)"));
    assert!(!src.contains("[year]"));
    // cover break + colophon break, no break after the only chapter
    assert_eq!(src.matches("#pagebreak()").count(), 2);
}

#[test]
fn test_explicit_output_path() {
    let dir = project(&[("01.md", "# One\n")]);
    let mut config = config();
    config.output = Some("out/custom.pdf".into());
    let out = build(dir.path(), &config).unwrap();
    assert_eq!(out.output_path, dir.path().join("out/custom.pdf"));
    assert_pdf(&out.output_path);
}

#[test]
fn test_fonts_resolve_and_pages_grow_with_content() {
    let short = project_with_fonts(&[("01.md", "# One\n\nShort.\n\n```\nlet x = 1;\n```\n")]);
    let long_text = format!("# One\n\n{}\n\n```\nlet x = 1;\n```\n", long_paragraph(3000));
    let long = project_with_fonts(&[("01.md", long_text.as_str())]);

    let short = build_project(short.path()).unwrap();
    let long = build_project(long.path()).unwrap();
    for out in [&short, &long] {
        assert_pdf(&out.output_path);
        assert!(
            out.stats.render_warnings.iter().all(|w| !w.contains("unknown font family")),
            "{:?}",
            out.stats.render_warnings
        );
    }
    assert_eq!(short.stats.pages, 1);
    assert!(long.stats.pages > short.stats.pages + 2, "pages: {}", long.stats.pages);
}

#[test]
fn test_heading_kept_with_long_paragraph_loses_nothing() {
    let text = long_paragraph(3000);
    let plain = project_with_fonts(&[("01.md", text.as_str())]);
    let with_heading = format!("## Section\n\n{text}\n");
    let headed = project_with_fonts(&[("01.md", with_heading.as_str())]);

    let plain = build_project(plain.path()).unwrap();
    let headed = build_project(headed.path()).unwrap();
    assert!(plain.stats.pages > 3, "pages: {}", plain.stats.pages);
    assert!(
        headed.stats.pages >= plain.stats.pages,
        "with heading: {}, without: {}",
        headed.stats.pages,
        plain.stats.pages
    );
}

#[test]
fn test_breaks_inside_containers_compile() {
    let dir = project(&[
        ("01-heading.md", "# Chapter\n\n[break]\n\nAfter the break.\n"),
        ("02-list.md", "# List\n\n- one\n- two [break] three\n- four\n\n1. a\n2. b [break] c\n"),
        ("03-notice.md", "# Notice\n\n> {notice} Before.\n>\n> [break]\n>\n> After.\n"),
    ]);
    let mut config = config();
    config.emit_typst = true;
    let out = build(dir.path(), &config).unwrap();
    assert_pdf(&out.output_path);
    let src = fs::read_to_string(out.typst_path.unwrap()).unwrap();
    // four author breaks plus two between chapters
    assert_eq!(src.matches("#pagebreak()").count(), 6, "source:\n{src}");
    assert!(!src.contains("breakable: false"));
    assert!(out.stats.pages >= 7, "pages: {}", out.stats.pages);
}

// ── Failures ─────────────────────────────────────────────────────────────────

#[test]
fn test_missing_content_dir() {
    let dir = tempfile::tempdir().unwrap();
    let err = build(dir.path(), &config()).unwrap_err();
    assert!(matches!(err, BookError::InputNotFound { .. }), "got: {err}");
    assert!(!dir.path().join("export").exists());
}

#[test]
fn test_missing_configured_theme_writes_nothing() {
    let dir = project(&[("01.md", "# One\n")]);
    let mut config = config();
    config.theme = Some("missing/theme.typ".into());
    let err = build(dir.path(), &config).unwrap_err();
    assert!(matches!(err, BookError::InputNotFound { .. }), "got: {err}");
    assert!(!dir.path().join("export/Test Book.pdf").exists());
}

#[test]
fn test_missing_font_file() {
    let dir = project(&[("01.md", "# One\n")]);
    let config = BookConfig::builder()
        .title("Test Book")
        .author("Tester")
        .font("Body", "nowhere.ttf")
        .build()
        .unwrap();
    let err = build(dir.path(), &config).unwrap_err();
    assert!(matches!(err, BookError::InputNotFound { .. }), "got: {err}");
}

#[test]
fn test_render_failure_names_chapter() {
    let dir = project(&[
        ("01-ok.md", "# Fine\n\nText.\n"),
        ("02-image.md", "# Picture\n\n![alt](broken.png)\n"),
    ]);
    fs::write(dir.path().join("content/broken.png"), b"not an image").unwrap();
    let err = build(dir.path(), &config()).unwrap_err();
    match err {
        BookError::Render { chapter, .. } => assert_eq!(chapter.as_deref(), Some("02-image.md")),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!dir.path().join("export/Test Book.pdf").exists());
}

#[test]
fn test_missing_config_keys() {
    let dir = project(&[("01.md", "# One\n")]);
    fs::write(dir.path().join("book.json"), r#"{ "title": "T", "fonts": {} }"#).unwrap();
    let err = build_project(dir.path()).unwrap_err();
    assert!(matches!(err, BookError::ConfigParse { .. }), "got: {err}");
}

// ── Transform policy ─────────────────────────────────────────────────────────

const MALFORMED: &str = "# Broken\n\n<div>\n\nunclosed raw html\n";

#[test]
fn test_lenient_policy_collects_warnings() {
    let dir = project(&[("01-ok.md", "# Fine\n"), ("02-broken.md", MALFORMED)]);
    let recorder = Arc::new(OrderRecorder::default());
    let mut config = config();
    config.progress_callback = Some(recorder.clone());
    let out = build(dir.path(), &config).unwrap();
    assert_pdf(&out.output_path);
    assert_eq!(out.stats.warnings.len(), 3, "{:?}", out.stats.warnings);
    assert!(out.stats.warnings.iter().all(|w| w.chapter == "02-broken.md"));
    let stages: Vec<_> = out.stats.warnings.iter().map(|w| w.stage.as_str()).collect();
    assert_eq!(stages, vec!["transform", "typography", "hyphenation"]);
    assert_eq!(recorder.warnings.lock().unwrap().len(), 3);
}

#[test]
fn test_strict_policy_aborts() {
    let dir = project(&[("01-broken.md", MALFORMED)]);
    let mut config = config();
    config.transform_policy = TransformPolicy::Strict;
    let err = build(dir.path(), &config).unwrap_err();
    match err {
        BookError::Transform { chapter, stage, .. } => {
            assert_eq!(chapter, "01-broken.md");
            assert_eq!(stage, "transform");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!dir.path().join("export/Test Book.pdf").exists());
}

// ── Library pieces used directly ─────────────────────────────────────────────

#[test]
fn test_processor_assembler_renderer_session() {
    let dir = tempfile::tempdir().unwrap();
    let config = config();
    let processor = ChapterProcessor::new(&config).unwrap();
    let mut renderer = TypstRenderer::new(&config, dir.path(), Vec::new());
    let mut assembler = ChapterAssembler::from_config(&config);

    let first = processor.process("# Title\n\nHello world\n", 1, "a.md").unwrap();
    let second = processor.process("# Next\n\nMore text\n", 2, "b.md").unwrap();
    assembler.add_chapter(&mut renderer, &first.html, false).unwrap();
    assembler.add_chapter(&mut renderer, &second.html, true).unwrap();
    assert_eq!(assembler.page_breaks(), 1);
    assert!(matches!(
        assembler.add_chapter(&mut renderer, &second.html, true),
        Err(BookError::AssemblyFinished)
    ));

    let path = dir.path().join("book.pdf");
    let summary = renderer.finalize(&path).unwrap();
    assert!(summary.pages >= 2);
    assert_pdf(&path);
}

#[test]
fn test_outline_lists_headings_in_order() {
    let dir = project(&[
        ("02.md", "# Two\n\n### Deep\n"),
        ("01.md", "# One\n\n## One.1\n"),
    ]);
    let entries = outline::collect(&dir.path().join("content")).unwrap();
    assert_eq!(
        outline::format_checklist(&entries),
        "[] # One\n[] ## One.1\n[] # Two\n[] ### Deep\n"
    );
}

//! Configuration types for building a book.
//!
//! All build behaviour is controlled through [`BookConfig`]. It is normally
//! read from `book.json` at the project root via [`BookConfig::from_file`],
//! but library callers can assemble one with [`BookConfig::builder()`] and
//! rely on the documented defaults for everything they do not set.
//!
//! A minimal `book.json`:
//!
//! ```json
//! {
//!   "title": "Dandy Code",
//!   "author": "A. Author",
//!   "fonts": { "EB Garamond": "EBGaramond.ttf" }
//! }
//! ```

use crate::error::BookError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Name of the configuration file looked up at the project root.
pub const CONFIG_FILE_NAME: &str = "book.json";

/// Configuration for one book build.
#[derive(Clone, Serialize, Deserialize)]
pub struct BookConfig {
    /// Book title. Used for PDF metadata, the running header and the default
    /// output file name.
    pub title: String,

    /// Author, written to PDF metadata.
    pub author: String,

    /// Font registrations: family name → font file.
    ///
    /// Relative files are looked up in `<assets>/fonts` first, then relative
    /// to the project root. Families form the body font fallback list in
    /// alphabetical order.
    pub fonts: BTreeMap<String, PathBuf>,

    /// Page geometry.
    #[serde(default)]
    pub document: PageGeometry,

    /// Cover image placement.
    #[serde(default)]
    pub cover: CoverPlacement,

    /// Punctuation and orphan-prevention settings.
    #[serde(default)]
    pub typography: TypographyOptions,

    /// Hyphenation settings.
    #[serde(default)]
    pub hyphenation: HyphenationOptions,

    /// Chapter decoration and running-header policy.
    #[serde(default)]
    pub chapters: ChapterOptions,

    /// What to do when a stage receives malformed HTML. Default: lenient.
    #[serde(default)]
    pub transform_policy: TransformPolicy,

    /// Project-relative directories.
    #[serde(default)]
    pub paths: ProjectPaths,

    /// Footer HTML written on every page; `{PAGENO}` becomes the page number.
    #[serde(default = "default_footer")]
    pub footer: String,

    /// Explicit Typst theme file. Defaults to `<assets>/theme.typ` when present.
    #[serde(default)]
    pub theme: Option<PathBuf>,

    /// Explicit colophon HTML file. Defaults to `<assets>/colophon.html` when present.
    #[serde(default)]
    pub colophon: Option<PathBuf>,

    /// Explicit output PDF path. Defaults to `<export>/<title>.pdf`.
    #[serde(default)]
    pub output: Option<PathBuf>,

    /// Also write the generated Typst source next to the PDF.
    #[serde(default)]
    pub emit_typst: bool,

    /// Optional per-chapter progress callback.
    #[serde(skip)]
    pub progress_callback: Option<ProgressCallback>,
}

fn default_footer() -> String {
    r#"<div style="text-align: center">{PAGENO}</div>"#.to_string()
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            title: String::new(),
            author: String::new(),
            fonts: BTreeMap::new(),
            document: PageGeometry::default(),
            cover: CoverPlacement::default(),
            typography: TypographyOptions::default(),
            hyphenation: HyphenationOptions::default(),
            chapters: ChapterOptions::default(),
            transform_policy: TransformPolicy::default(),
            paths: ProjectPaths::default(),
            footer: default_footer(),
            theme: None,
            colophon: None,
            output: None,
            emit_typst: false,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for BookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BookConfig")
            .field("title", &self.title)
            .field("author", &self.author)
            .field("fonts", &self.fonts)
            .field("document", &self.document)
            .field("cover", &self.cover)
            .field("typography", &self.typography)
            .field("hyphenation", &self.hyphenation)
            .field("chapters", &self.chapters)
            .field("transform_policy", &self.transform_policy)
            .field("paths", &self.paths)
            .field("theme", &self.theme)
            .field("colophon", &self.colophon)
            .field("output", &self.output)
            .field("emit_typst", &self.emit_typst)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BuildProgressCallback>"),
            )
            .finish()
    }
}

impl BookConfig {
    /// Create a new builder for `BookConfig`.
    pub fn builder() -> BookConfigBuilder {
        BookConfigBuilder {
            config: Self::default(),
        }
    }

    /// Read and validate a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, BookError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BookError::InputNotFound {
                    what: "Configuration file".into(),
                    path: path.to_path_buf(),
                }
            } else {
                BookError::ReadFailed {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })?;
        let config: BookConfig =
            serde_json::from_str(&raw).map_err(|source| BookError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), BookError> {
        if self.title.trim().is_empty() {
            return Err(BookError::InvalidConfig("title must not be empty".into()));
        }
        if self.author.trim().is_empty() {
            return Err(BookError::InvalidConfig("author must not be empty".into()));
        }
        if let PageFormat::Dimensions([w, h]) = self.document.format {
            if w <= 0.0 || h <= 0.0 {
                return Err(BookError::InvalidConfig(format!(
                    "page format must be positive, got {w}×{h} mm"
                )));
            }
        }
        let d = &self.document;
        for (name, m) in [
            ("margin_left", d.margin_left),
            ("margin_right", d.margin_right),
            ("margin_top", d.margin_top),
            ("margin_bottom", d.margin_bottom),
        ] {
            if m < 0.0 {
                return Err(BookError::InvalidConfig(format!(
                    "{name} must be ≥ 0, got {m}"
                )));
            }
        }
        if self.hyphenation.min_word_length == 0 {
            return Err(BookError::InvalidConfig(
                "hyphenation.min_word_length must be ≥ 1".into(),
            ));
        }
        if self.hyphenation.locales.is_empty() {
            return Err(BookError::InvalidConfig(
                "hyphenation.locales must name at least one locale".into(),
            ));
        }
        if self.typography.orphan_max_length == 0 {
            return Err(BookError::InvalidConfig(
                "typography.orphan_max_length must be ≥ 1".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`BookConfig`].
#[derive(Debug)]
pub struct BookConfigBuilder {
    config: BookConfig,
}

impl BookConfigBuilder {
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.config.title = title.into();
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.config.author = author.into();
        self
    }

    pub fn font(mut self, family: impl Into<String>, file: impl Into<PathBuf>) -> Self {
        self.config.fonts.insert(family.into(), file.into());
        self
    }

    pub fn document(mut self, geometry: PageGeometry) -> Self {
        self.config.document = geometry;
        self
    }

    pub fn cover(mut self, placement: CoverPlacement) -> Self {
        self.config.cover = placement;
        self
    }

    pub fn locale(mut self, locale: Locale) -> Self {
        self.config.typography.locale = locale;
        self
    }

    pub fn orphan_max_length(mut self, n: usize) -> Self {
        self.config.typography.orphan_max_length = n;
        self
    }

    pub fn hyphenation_locales(mut self, locales: Vec<Locale>) -> Self {
        self.config.hyphenation.locales = locales;
        self
    }

    pub fn min_word_length(mut self, n: usize) -> Self {
        self.config.hyphenation.min_word_length = n;
        self
    }

    pub fn decoration(mut self, policy: DecorationPolicy) -> Self {
        self.config.chapters.decoration = policy;
        self
    }

    pub fn running_header(mut self, side: PageSide) -> Self {
        self.config.chapters.running_header = side;
        self
    }

    pub fn missing_title(mut self, policy: MissingTitlePolicy) -> Self {
        self.config.chapters.missing_title = policy;
        self
    }

    pub fn transform_policy(mut self, policy: TransformPolicy) -> Self {
        self.config.transform_policy = policy;
        self
    }

    pub fn paths(mut self, paths: ProjectPaths) -> Self {
        self.config.paths = paths;
        self
    }

    pub fn footer(mut self, html: impl Into<String>) -> Self {
        self.config.footer = html.into();
        self
    }

    pub fn theme(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.theme = Some(path.into());
        self
    }

    pub fn colophon(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.colophon = Some(path.into());
        self
    }

    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output = Some(path.into());
        self
    }

    pub fn emit_typst(mut self, v: bool) -> Self {
        self.config.emit_typst = v;
        self
    }

    /// Attach a progress callback invoked once per chapter.
    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BookConfig, BookError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// ── Sections ─────────────────────────────────────────────────────────────

/// Page size and margins, in millimetres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageGeometry {
    pub format: PageFormat,
    pub margin_left: f32,
    pub margin_right: f32,
    pub margin_top: f32,
    pub margin_bottom: f32,
    /// Swap left/right margins on even pages for double-sided printing.
    pub mirror_margins: bool,
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self {
            format: PageFormat::Dimensions([148.0, 210.0]),
            margin_left: 15.0,
            margin_right: 15.0,
            margin_top: 12.0,
            margin_bottom: 12.0,
            mirror_margins: false,
        }
    }
}

/// Either explicit `[width, height]` in mm or a named paper size (`"a5"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageFormat {
    Dimensions([f32; 2]),
    Named(String),
}

/// CSS-style declarations controlling where a cover image lands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverPlacement {
    pub position: String,
    pub dimensions: String,
}

impl Default for CoverPlacement {
    fn default() -> Self {
        Self {
            position: "position: absolute; left:0; right: 0; top: -.2; bottom: 0;".into(),
            dimensions: "width: 148mm; height: 210mm; margin: 0;".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypographyOptions {
    /// Locale for punctuation rules. Default: `ru`.
    pub locale: Locale,
    /// Words up to this many characters are glued to the next word. Default: 4.
    pub orphan_max_length: usize,
}

impl Default for TypographyOptions {
    fn default() -> Self {
        Self {
            locale: Locale::Russian,
            orphan_max_length: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HyphenationOptions {
    /// Dictionaries applied in order over the whole fragment.
    /// Default: `["ru", "en-us"]`.
    pub locales: Vec<Locale>,
    /// Words shorter than this (in characters) are never hyphenated. Default: 2.
    pub min_word_length: usize,
}

impl Default for HyphenationOptions {
    fn default() -> Self {
        Self {
            locales: vec![Locale::Russian, Locale::EnglishUs],
            min_word_length: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChapterOptions {
    pub decoration: DecorationPolicy,
    pub running_header: PageSide,
    pub missing_title: MissingTitlePolicy,
}

/// Project-relative directories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectPaths {
    pub content: PathBuf,
    pub assets: PathBuf,
    pub export: PathBuf,
}

impl Default for ProjectPaths {
    fn default() -> Self {
        Self {
            content: PathBuf::from("content"),
            assets: PathBuf::from("assets"),
            export: PathBuf::from("export"),
        }
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Locales with punctuation rules and a hyphenation dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Locale {
    #[serde(rename = "ru")]
    Russian,
    #[serde(rename = "en-us")]
    EnglishUs,
    #[serde(rename = "en-gb")]
    EnglishGb,
    #[serde(rename = "fr")]
    French,
    #[serde(rename = "de")]
    German,
}

impl Locale {
    /// Short code as used in `book.json`.
    pub fn code(self) -> &'static str {
        match self {
            Locale::Russian => "ru",
            Locale::EnglishUs => "en-us",
            Locale::EnglishGb => "en-gb",
            Locale::French => "fr",
            Locale::German => "de",
        }
    }

    /// ISO 639-1 language code understood by Typst's `text(lang:)`.
    pub fn language(self) -> &'static str {
        match self {
            Locale::Russian => "ru",
            Locale::EnglishUs | Locale::EnglishGb => "en",
            Locale::French => "fr",
            Locale::German => "de",
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Locale {
    type Err = BookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "ru" | "ru-ru" => Ok(Locale::Russian),
            "en" | "en-us" => Ok(Locale::EnglishUs),
            "en-gb" => Ok(Locale::EnglishGb),
            "fr" | "fr-fr" => Ok(Locale::French),
            "de" | "de-de" => Ok(Locale::German),
            other => Err(BookError::InvalidConfig(format!(
                "unsupported locale '{other}' (expected ru, en-us, en-gb, fr, de)"
            ))),
        }
    }
}

/// Which first-level headings receive the decorative chapter block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecorationPolicy {
    /// Every `h1` (default).
    #[default]
    All,
    /// Every `h1` except in the chapter at sequence index 1.
    SkipFirst,
    /// No decoration.
    None,
}

impl DecorationPolicy {
    /// Whether the chapter at the 1-based `sequence_index` is decorated.
    pub fn decorates(self, sequence_index: usize) -> bool {
        match self {
            DecorationPolicy::All => true,
            DecorationPolicy::SkipFirst => sequence_index > 1,
            DecorationPolicy::None => false,
        }
    }
}

/// Pages on which the running header is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageSide {
    #[default]
    Even,
    Odd,
    Both,
}

/// What happens to the running header when a chapter has no `h1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingTitlePolicy {
    /// Remove the previous chapter's header (default).
    #[default]
    Clear,
    /// Leave the previous chapter's header in place.
    Keep,
}

/// How a stage reacts to a fragment it cannot safely process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransformPolicy {
    /// Log a warning and pass the fragment through the stage unchanged (default).
    #[default]
    Lenient,
    /// Abort the whole build.
    Strict,
}

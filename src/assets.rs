//! Project assets: covers, colophon, theme and fonts.
//!
//! All lookups are relative to the project root. Assets found by convention
//! (`<assets>/cover.jpg`, `<assets>/colophon.html`, …) are optional; a path
//! named explicitly in the configuration must exist.

use crate::config::BookConfig;
use crate::error::BookError;
use crate::render::{Cover, ImagePlacement};
use chrono::Datelike;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Cover image extensions, in lookup order, before falling back to `.html`.
const COVER_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Everything written before the first chapter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontMatter {
    pub cover: Option<Cover>,
    pub back_cover: Option<Cover>,
    /// Colophon HTML with placeholders already substituted.
    pub colophon: Option<String>,
    /// Typst source appended after the built-in theme.
    pub theme: Option<String>,
}

/// Load covers, colophon and theme for the project at `root`.
pub fn load_front_matter(root: &Path, config: &BookConfig) -> Result<FrontMatter, BookError> {
    let assets = root.join(&config.paths.assets);
    let cover = find_cover(root, config, "cover")?;
    let back_cover = find_cover(root, config, "cover-back")?;
    let colophon = optional_asset(root, config.colophon.as_deref(), &assets.join("colophon.html"), "Colophon")?
        .map(|html| substitute_placeholders(&html, &git_short_hash(root), chrono::Local::now().year()));
    let theme = optional_asset(root, config.theme.as_deref(), &assets.join("theme.typ"), "Theme")?;
    debug!(
        cover = cover.is_some(),
        back_cover = back_cover.is_some(),
        colophon = colophon.is_some(),
        theme = theme.is_some(),
        "Front matter loaded"
    );
    Ok(FrontMatter {
        cover,
        back_cover,
        colophon,
        theme,
    })
}

/// `<assets>/<name>.{jpg,jpeg,png}` as a full-bleed image, else
/// `<assets>/<name>.html`, else nothing.
fn find_cover(root: &Path, config: &BookConfig, name: &str) -> Result<Option<Cover>, BookError> {
    for ext in COVER_IMAGE_EXTENSIONS {
        let rel = config.paths.assets.join(format!("{name}.{ext}"));
        if root.join(&rel).is_file() {
            return Ok(Some(Cover::Image {
                path: rel,
                placement: ImagePlacement::from_css(&config.cover),
            }));
        }
    }
    let html_path = root.join(&config.paths.assets).join(format!("{name}.html"));
    if html_path.is_file() {
        return read_to_string(&html_path).map(|html| Some(Cover::Html(html)));
    }
    Ok(None)
}

fn optional_asset(
    root: &Path,
    explicit: Option<&Path>,
    conventional: &Path,
    what: &str,
) -> Result<Option<String>, BookError> {
    match explicit {
        Some(path) => {
            let path = root.join(path);
            if !path.is_file() {
                return Err(BookError::InputNotFound {
                    what: what.to_string(),
                    path,
                });
            }
            read_to_string(&path).map(Some)
        }
        None if conventional.is_file() => read_to_string(conventional).map(Some),
        None => Ok(None),
    }
}

fn read_to_string(path: &Path) -> Result<String, BookError> {
    fs::read_to_string(path).map_err(|source| BookError::ReadFailed {
        path: path.to_path_buf(),
        source,
    })
}

/// Replace `[commit]` and `[year]` in colophon HTML.
pub fn substitute_placeholders(html: &str, commit: &str, year: i32) -> String {
    html.replace("[commit]", commit)
        .replace("[year]", &year.to_string())
}

/// Seven-character hash of the checked-out commit, or an empty string when
/// the project is not a git checkout.
pub fn git_short_hash(root: &Path) -> String {
    let git = root.join(".git");
    let Ok(head) = fs::read_to_string(git.join("HEAD")) else {
        return String::new();
    };
    let head = head.trim();
    let full = match head.strip_prefix("ref:") {
        Some(reference) => resolve_ref(&git, reference.trim()),
        None => Some(head.to_string()),
    };
    full.filter(|h| h.len() >= 7 && h.chars().all(|c| c.is_ascii_hexdigit()))
        .map(|h| h[..7].to_string())
        .unwrap_or_default()
}

fn resolve_ref(git: &Path, reference: &str) -> Option<String> {
    if let Ok(hash) = fs::read_to_string(git.join(reference)) {
        return Some(hash.trim().to_string());
    }
    let packed = fs::read_to_string(git.join("packed-refs")).ok()?;
    packed.lines().find_map(|line| {
        let (hash, name) = line.split_once(' ')?;
        (name.trim() == reference).then(|| hash.to_string())
    })
}

/// Read every configured font file.
///
/// Relative files are looked up in `<assets>/fonts` first, then relative to
/// the project root.
pub fn load_fonts(root: &Path, config: &BookConfig) -> Result<Vec<Vec<u8>>, BookError> {
    config
        .fonts
        .iter()
        .map(|(family, file)| {
            let path = resolve_font(root, config, file).ok_or_else(|| BookError::InputNotFound {
                what: format!("Font file for '{family}'"),
                path: file.clone(),
            })?;
            debug!(family, path = %path.display(), "Loading font");
            fs::read(&path).map_err(|source| BookError::ReadFailed { path, source })
        })
        .collect()
}

fn resolve_font(root: &Path, config: &BookConfig, file: &Path) -> Option<PathBuf> {
    if file.is_absolute() {
        return file.is_file().then(|| file.to_path_buf());
    }
    [
        root.join(&config.paths.assets).join("fonts").join(file),
        root.join(file),
    ]
    .into_iter()
    .find(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn project() -> (TempDir, BookConfig) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("assets/fonts")).unwrap();
        let config = BookConfig::builder().title("T").author("A").build().unwrap();
        (dir, config)
    }

    #[test]
    fn test_empty_project_has_no_front_matter() {
        let (dir, config) = project();
        let fm = load_front_matter(dir.path(), &config).unwrap();
        assert_eq!(fm, FrontMatter::default());
    }

    #[test]
    fn test_image_cover_preferred_over_html() {
        let (dir, config) = project();
        fs::write(dir.path().join("assets/cover.png"), b"png").unwrap();
        fs::write(dir.path().join("assets/cover.html"), "<h1>C</h1>").unwrap();
        fs::write(dir.path().join("assets/cover-back.html"), "<p>Back</p>").unwrap();
        let fm = load_front_matter(dir.path(), &config).unwrap();
        match fm.cover {
            Some(Cover::Image { path, placement }) => {
                assert_eq!(path, PathBuf::from("assets/cover.png"));
                assert_eq!(placement.width, Some(148.0));
            }
            other => panic!("unexpected cover: {other:?}"),
        }
        assert_eq!(fm.back_cover, Some(Cover::Html("<p>Back</p>".into())));
    }

    #[test]
    fn test_colophon_placeholders() {
        let (dir, config) = project();
        fs::write(dir.path().join("assets/colophon.html"), "<p>[year] / [commit]</p>").unwrap();
        let git = dir.path().join(".git/refs/heads");
        fs::create_dir_all(&git).unwrap();
        fs::write(dir.path().join(".git/HEAD"), "ref: refs/heads/main\n").unwrap();
        fs::write(git.join("main"), "0123456789abcdef0123456789abcdef01234567\n").unwrap();
        let fm = load_front_matter(dir.path(), &config).unwrap();
        let colophon = fm.colophon.unwrap();
        assert!(colophon.ends_with(" / 0123456</p>"), "got: {colophon}");
        assert!(!colophon.contains("[year]"));
    }

    #[test]
    fn test_git_hash_packed_refs_and_detached() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(git_short_hash(dir.path()), "");
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".git/HEAD"), "ref: refs/heads/main\n").unwrap();
        fs::write(
            dir.path().join(".git/packed-refs"),
            "# pack-refs with: peeled\nfedcba9876543210fedcba9876543210fedcba98 refs/heads/main\n",
        )
        .unwrap();
        assert_eq!(git_short_hash(dir.path()), "fedcba9");
        fs::write(dir.path().join(".git/HEAD"), "abcdef0123456789abcdef0123456789abcdef01\n").unwrap();
        assert_eq!(git_short_hash(dir.path()), "abcdef0");
    }

    #[test]
    fn test_substitute_placeholders() {
        assert_eq!(
            substitute_placeholders("© [year], build [commit]", "abc1234", 2026),
            "© 2026, build abc1234"
        );
    }

    #[test]
    fn test_explicit_theme_missing_is_input_not_found() {
        let (dir, mut config) = project();
        config.theme = Some(PathBuf::from("styles/book.typ"));
        let err = load_front_matter(dir.path(), &config).unwrap_err();
        assert!(matches!(err, BookError::InputNotFound { .. }), "got: {err}");
    }

    #[test]
    fn test_conventional_theme_loaded() {
        let (dir, config) = project();
        fs::write(dir.path().join("assets/theme.typ"), "#set text(size: 10pt)").unwrap();
        let fm = load_front_matter(dir.path(), &config).unwrap();
        assert_eq!(fm.theme.as_deref(), Some("#set text(size: 10pt)"));
    }

    #[test]
    fn test_fonts_lookup_order() {
        let (dir, mut config) = project();
        fs::write(dir.path().join("assets/fonts/a.ttf"), b"assets").unwrap();
        fs::write(dir.path().join("a.ttf"), b"root").unwrap();
        fs::write(dir.path().join("b.ttf"), b"root-b").unwrap();
        config.fonts.insert("A".into(), PathBuf::from("a.ttf"));
        config.fonts.insert("B".into(), PathBuf::from("b.ttf"));
        let fonts = load_fonts(dir.path(), &config).unwrap();
        assert_eq!(fonts, vec![b"assets".to_vec(), b"root-b".to_vec()]);
    }

    #[test]
    fn test_missing_font() {
        let (dir, mut config) = project();
        config.fonts.insert("Ghost".into(), PathBuf::from("ghost.ttf"));
        let err = load_fonts(dir.path(), &config).unwrap_err();
        assert!(err.to_string().contains("Ghost"), "got: {err}");
    }
}

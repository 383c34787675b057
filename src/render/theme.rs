//! Built-in Typst preamble: document metadata, page geometry, running
//! header, footer, fonts and the default `styled` hook.
//!
//! A project's own `theme.typ` is appended after this preamble, so it can
//! override any `set`/`show` rule and shadow `styled` with its own
//! definition.

use crate::config::{BookConfig, PageFormat, PageSide};
use crate::render::typst::string_literal;

/// Label of the metadata marks that carry the running-header title.
pub const HEADER_LABEL: &str = "chapter-header";

/// Colour of the running header text.
const HEADER_COLOUR: &str = "#817d7d";

/// Build the preamble for `config`. `footer` is already Typst markup.
pub fn preamble(config: &BookConfig, footer: Option<&str>) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "#set document(title: {}, author: {})\n",
        string_literal(&config.title),
        string_literal(&config.author)
    ));
    out.push_str(&page_rule(config, footer));
    out.push_str(&text_rules(config));
    out.push_str(DEFAULT_STYLED);
    out
}

fn mm(v: f32) -> String {
    format!("{v}mm")
}

fn page_rule(config: &BookConfig, footer: Option<&str>) -> String {
    let d = &config.document;
    let size = match &d.format {
        PageFormat::Dimensions([w, h]) => format!("width: {}, height: {}", mm(*w), mm(*h)),
        PageFormat::Named(name) => format!("paper: {}", string_literal(&name.to_lowercase())),
    };
    let (first, second) = if d.mirror_margins {
        ("inside", "outside")
    } else {
        ("left", "right")
    };
    let margin = format!(
        "({first}: {}, {second}: {}, top: {}, bottom: {})",
        mm(d.margin_left),
        mm(d.margin_right),
        mm(d.margin_top),
        mm(d.margin_bottom)
    );
    let footer = footer
        .map(|f| format!("[\n{f}\n]"))
        .unwrap_or_else(|| "none".to_string());
    format!(
        "#set page(\n  {size},\n  margin: {margin},\n  header: {},\n  footer: {footer},\n)\n",
        header_expr(&config.title, config.chapters.running_header)
    )
}

/// `context` expression showing "book title | chapter title" on the chosen
/// side, taken from the latest header mark on or before the current page.
fn header_expr(book_title: &str, side: PageSide) -> String {
    let side_test = match side {
        PageSide::Even => "calc.even(here().page())",
        PageSide::Odd => "calc.odd(here().page())",
        PageSide::Both => "true",
    };
    format!(
        concat!(
            "context {{\n",
            "    let marks = query(<{label}>).filter(m => m.location().page() <= here().page())\n",
            "    if marks.len() > 0 and marks.last().value != none and {side} {{\n",
            "      align(right, text(size: 8pt, fill: rgb(\"{colour}\"), {title} + \" | \" + marks.last().value))\n",
            "    }}\n",
            "  }}"
        ),
        label = HEADER_LABEL,
        side = side_test,
        colour = HEADER_COLOUR,
        title = string_literal(book_title),
    )
}

fn text_rules(config: &BookConfig) -> String {
    let mut out = String::new();
    // Monospace families only serve as a fallback for body text.
    let (mono_families, body_families): (Vec<&String>, Vec<&String>) =
        config.fonts.keys().partition(|f| is_mono(f));
    let families: Vec<String> = body_families
        .into_iter()
        .chain(mono_families)
        .map(|f| string_literal(f))
        .collect();
    let lang = string_literal(config.typography.locale.language());
    if families.is_empty() {
        out.push_str(&format!("#set text(lang: {lang}, hyphenate: true)\n"));
    } else {
        out.push_str(&format!(
            "#set text(font: ({},), lang: {lang}, hyphenate: true)\n",
            families.join(", ")
        ));
    }
    let mono: Vec<String> = config
        .fonts
        .keys()
        .filter(|f| is_mono(f))
        .map(|f| string_literal(f))
        .collect();
    if !mono.is_empty() {
        out.push_str(&format!(
            "#show raw: set text(font: ({},))\n",
            mono.join(", ")
        ));
    }
    out.push_str("#set par(justify: true)\n");
    out.push_str("#show heading.where(level: 1): set text(size: 1.6em)\n");
    // Only chapters and sections go into the PDF outline.
    out.push_str("#set heading(bookmarked: false)\n");
    out.push_str("#show heading.where(level: 1): set heading(bookmarked: true)\n");
    out.push_str("#show heading.where(level: 2): set heading(bookmarked: true)\n");
    out
}

fn is_mono(family: &str) -> bool {
    let lower = family.to_lowercase();
    lower.contains("mono") || lower.contains("code")
}

/// Default look of classed containers. `chapter` must stay a plain
/// pass-through: chapters end in page breaks, which Typst forbids inside
/// blocks.
const DEFAULT_STYLED: &str = r##"#let styled(name, body) = {
  if name == "notice" {
    block(width: 100%, inset: 8pt, radius: 3pt, fill: luma(238), body)
  } else if name == "warning" {
    block(width: 100%, inset: 8pt, stroke: (left: 2pt + rgb("#b03a2e")), body)
  } else if name == "quote" {
    pad(x: 1.5em, emph(body))
  } else if name == "blockquote" {
    pad(left: 1.5em, body)
  } else if name == "chapter-padding" {
    pad(top: 2em, bottom: 0.5em, body)
  } else if name == "chapter-table" {
    text(fill: rgb("#817d7d"), body)
  } else {
    body
  }
}
"##;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PageGeometry;

    fn config() -> BookConfig {
        BookConfig::builder()
            .title("Dandy \"Code\"")
            .author("A. Author")
            .font("JetBrains Mono", "mono.ttf")
            .font("EB Garamond", "garamond.ttf")
            .build()
            .unwrap()
    }

    #[test]
    fn test_document_metadata() {
        let p = preamble(&config(), None);
        assert!(p.starts_with("#set document(title: \"Dandy \\\"Code\\\"\", author: \"A. Author\")\n"));
    }

    #[test]
    fn test_page_geometry_defaults() {
        let p = preamble(&config(), None);
        assert!(p.contains("width: 148mm, height: 210mm"), "got: {p}");
        assert!(p.contains("margin: (left: 15mm, right: 15mm, top: 12mm, bottom: 12mm)"));
        assert!(p.contains("footer: none"));
    }

    #[test]
    fn test_named_paper_and_mirrored_margins() {
        let mut c = config();
        c.document = PageGeometry {
            format: PageFormat::Named("A5".into()),
            mirror_margins: true,
            ..PageGeometry::default()
        };
        let p = preamble(&c, Some("#align(center)[x]"));
        assert!(p.contains("paper: \"a5\""));
        assert!(p.contains("(inside: 15mm, outside: 15mm"));
        assert!(p.contains("footer: [\n#align(center)[x]\n]"));
    }

    #[test]
    fn test_header_side_filter() {
        let mut c = config();
        assert!(preamble(&c, None).contains("calc.even(here().page())"));
        c.chapters.running_header = PageSide::Odd;
        assert!(preamble(&c, None).contains("calc.odd(here().page())"));
        assert!(preamble(&c, None).contains("query(<chapter-header>)"));
    }

    #[test]
    fn test_fonts() {
        let p = preamble(&config(), None);
        assert!(p.contains("#set text(font: (\"EB Garamond\", \"JetBrains Mono\",), lang: \"ru\", hyphenate: true)"));
        assert!(p.contains("#show raw: set text(font: (\"JetBrains Mono\",))"));
    }

    #[test]
    fn test_mono_family_not_first() {
        let c = BookConfig::builder()
            .title("T")
            .author("A")
            .font("DejaVu Sans Mono", "mono.ttf")
            .font("Libertinus Serif", "serif.otf")
            .build()
            .unwrap();
        let p = preamble(&c, None);
        assert!(p.contains("#set text(font: (\"Libertinus Serif\", \"DejaVu Sans Mono\",)"), "got: {p}");
    }

    #[test]
    fn test_no_fonts() {
        let c = BookConfig::builder().title("T").author("A").build().unwrap();
        let p = preamble(&c, None);
        assert!(p.contains("#set text(lang: \"ru\", hyphenate: true)"));
        assert!(!p.contains("#show raw"));
    }

    #[test]
    fn test_styled_hook_defined() {
        assert!(preamble(&config(), None).contains("#let styled(name, body)"));
    }

    #[test]
    fn test_bookmarks_limited_to_two_levels() {
        let p = preamble(&config(), None);
        let off = p.find("#set heading(bookmarked: false)").unwrap();
        let h1 = p
            .find("#show heading.where(level: 1): set heading(bookmarked: true)")
            .unwrap();
        assert!(off < h1);
        assert!(p.contains("#show heading.where(level: 2): set heading(bookmarked: true)"));
        assert!(!p.contains("level: 3"));
    }
}

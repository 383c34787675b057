//! HTML transform stage: structural rewrites applied to a freshly parsed
//! chapter before any typography runs.
//!
//! ## Step Order
//!
//! 1. Heading/paragraph cohesion
//! 2. Chapter decoration
//! 3. Marker substitution
//!
//! Cohesion runs first so the decoration lands inside the keep-together
//! container, next to the heading it belongs to.

use crate::config::DecorationPolicy;
use crate::pipeline::fragment::plain_text;
use once_cell::sync::Lazy;
use regex::Regex;

/// Class given to the container that keeps a heading with its first paragraph.
pub const KEEP_TOGETHER_CLASS: &str = "keep-together";

/// Page-break divider produced for `[break]`.
pub const PAGE_BREAK_DIV: &str = r#"<div style="page-break-after: always;"></div>"#;

/// Visual chapter marker placed before each decorated `<h1>`.
pub const CHAPTER_DECORATION: &str = concat!(
    "<div class=\"chapter-padding\">\n",
    "<table class=\"chapter-table\">\n",
    "<tr class=\"chapter-row\">\n",
    "<td class=\"chapter-icon-cell\">&gt;_</td>\n",
    "<td class=\"chapter-cell\"></td>\n",
    "<td class=\"chapter-cell\"></td>\n",
    "</tr>\n",
    "</table>\n",
    "</div>\n",
);

/// Sentinels recognised right after an opening `<blockquote>` + `<p>` pair,
/// with the class each one turns the quote into.
const BLOCKQUOTE_MARKERS: &[(&str, &str)] = &[
    ("{notice}", "notice"),
    ("{warning}", "warning"),
    ("{quote}", "quote"),
];

const BREAK_MARKER: &str = "[break]";

/// Apply the three structural rewrites in order.
///
/// `sequence_index` is the chapter's 1-based position in the build; it only
/// matters for [`DecorationPolicy::SkipFirst`].
pub fn transform(html: &str, sequence_index: usize, decoration: DecorationPolicy) -> String {
    let s = keep_headings_with_paragraphs(html);
    let s = decorate_chapter_headings(&s, sequence_index, decoration);
    substitute_markers(&s)
}

// ── Step 1: Heading/paragraph cohesion ───────────────────────────────────────

static RE_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<(h[1-6])(\s(?:[^>"']|"[^"]*"|'[^']*')*)?>(.*?)</(h[1-6])\s*>"#).unwrap()
});

static RE_LEADING_PARAGRAPH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)^\s*<p(\s(?:[^>"']|"[^"]*"|'[^']*')*)?>.*?</p\s*>"#).unwrap()
});

/// Wrap every heading that is directly followed by a paragraph in a
/// keep-together container. Both elements are copied verbatim, attributes
/// included. Headings without a following paragraph are left alone, and so
/// are headings followed by a `[break]` paragraph.
pub fn keep_headings_with_paragraphs(html: &str) -> String {
    let mut out = String::with_capacity(html.len() + 64);
    let mut pos = 0;
    while let Some(caps) = RE_HEADING.captures_at(html, pos) {
        let Some(heading) = caps.get(0) else {
            break;
        };
        let open_name = &caps[1];
        let close_name = &caps[4];
        let paragraph = if open_name.eq_ignore_ascii_case(close_name) {
            RE_LEADING_PARAGRAPH
                .find(&html[heading.end()..])
                .filter(|p| plain_text(p.as_str()) != BREAK_MARKER)
        } else {
            None
        };
        match paragraph {
            Some(p) => {
                let end = heading.end() + p.end();
                out.push_str(&html[pos..heading.start()]);
                out.push_str("<div class=\"");
                out.push_str(KEEP_TOGETHER_CLASS);
                out.push_str("\">");
                out.push_str(&html[heading.start()..end]);
                out.push_str("</div>");
                pos = end;
            }
            None => {
                out.push_str(&html[pos..heading.end()]);
                pos = heading.end();
            }
        }
    }
    out.push_str(&html[pos..]);
    out
}

// ── Step 2: Chapter decoration ───────────────────────────────────────────────

static RE_H1_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<h1(\s(?:[^>"']|"[^"]*"|'[^']*')*)?>"#).unwrap());

/// Insert [`CHAPTER_DECORATION`] immediately before each `<h1>` opening tag,
/// if the policy decorates this chapter.
pub fn decorate_chapter_headings(
    html: &str,
    sequence_index: usize,
    policy: DecorationPolicy,
) -> String {
    if !policy.decorates(sequence_index) {
        return html.to_string();
    }
    RE_H1_OPEN
        .replace_all(html, |caps: &regex::Captures<'_>| {
            format!("{CHAPTER_DECORATION}{}", &caps[0])
        })
        .into_owned()
}

// ── Step 3: Marker substitution ──────────────────────────────────────────────

static RE_BREAK_PARAGRAPH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<p>\s*\[break\]\s*</p>").unwrap());

/// Replace author sentinels with structural HTML.
///
/// Block-quote sentinels are only recognised in the exact position the parser
/// puts them (`<blockquote>\n<p>{notice}`); anywhere else they are left
/// verbatim. `[break]` is replaced everywhere. A paragraph holding nothing but
/// `[break]` is replaced as a whole so the divider does not end up inside it.
///
/// Running this twice is a no-op: no sentinel survives the first pass.
pub fn substitute_markers(html: &str) -> String {
    let mut out = html.to_string();
    for (marker, class) in BLOCKQUOTE_MARKERS {
        let needle = format!("<blockquote>\n<p>{marker}");
        if out.contains(&needle) {
            out = out.replace(&needle, &format!("<blockquote class=\"{class}\">\n<p>"));
        }
    }
    if out.contains(BREAK_MARKER) {
        out = RE_BREAK_PARAGRAPH
            .replace_all(&out, PAGE_BREAK_DIV)
            .into_owned();
        out = out.replace(BREAK_MARKER, PAGE_BREAK_DIV);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::fragment::check_well_formed;

    #[test]
    fn test_cohesion_wraps_heading_and_paragraph() {
        let out = keep_headings_with_paragraphs("<h2 id=\"a\">Sub</h2>\n<p class=\"x\">Body</p>\n");
        assert_eq!(
            out,
            "<div class=\"keep-together\"><h2 id=\"a\">Sub</h2>\n<p class=\"x\">Body</p></div>\n"
        );
    }

    #[test]
    fn test_cohesion_case_insensitive() {
        let out = keep_headings_with_paragraphs("<H3>Sub</H3><P>Body</P>");
        assert!(out.starts_with("<div class=\"keep-together\"><H3>"));
        assert!(out.ends_with("</P></div>"));
    }

    #[test]
    fn test_cohesion_passthrough_without_paragraph() {
        let html = "<h1>T</h1>\n<ul>\n<li>x</li>\n</ul>\n<p>later</p>\n";
        assert_eq!(keep_headings_with_paragraphs(html), html);
    }

    #[test]
    fn test_cohesion_does_not_cross_elements() {
        let html = "<h1>T</h1>\n<blockquote>\n<p>q</p>\n</blockquote>\n";
        assert_eq!(keep_headings_with_paragraphs(html), html);
    }

    #[test]
    fn test_cohesion_skips_break_paragraph() {
        let html = "<h1>T</h1>\n<p>[break]</p>\n<p>after</p>\n";
        assert_eq!(keep_headings_with_paragraphs(html), html);
        let out = transform(html, 2, DecorationPolicy::None);
        assert!(!out.contains(KEEP_TOGETHER_CLASS), "got: {out}");
        assert!(out.contains(PAGE_BREAK_DIV));
    }

    #[test]
    fn test_cohesion_attribute_with_angle_bracket() {
        let html = "<h2 title=\"a > b\">Sub</h2><p data-x='>'>Body</p>";
        let out = keep_headings_with_paragraphs(html);
        assert_eq!(out, format!("<div class=\"keep-together\">{html}</div>"));
        check_well_formed(&out).unwrap();
    }

    #[test]
    fn test_cohesion_multiple_pairs() {
        let html = "<h1>A</h1><p>1</p><h2>B</h2><p>2</p>";
        let out = keep_headings_with_paragraphs(html);
        assert_eq!(out.matches("keep-together").count(), 2);
        check_well_formed(&out).unwrap();
    }

    #[test]
    fn test_decoration_all() {
        let out = decorate_chapter_headings("<h1>T</h1>", 1, DecorationPolicy::All);
        assert!(out.starts_with("<div class=\"chapter-padding\">"));
        assert!(out.ends_with("</div>\n<h1>T</h1>"));
    }

    #[test]
    fn test_decoration_skip_first() {
        let html = "<h1>T</h1>";
        assert_eq!(
            decorate_chapter_headings(html, 1, DecorationPolicy::SkipFirst),
            html
        );
        assert!(decorate_chapter_headings(html, 2, DecorationPolicy::SkipFirst)
            .contains("chapter-table"));
        assert_eq!(decorate_chapter_headings(html, 5, DecorationPolicy::None), html);
    }

    #[test]
    fn test_decoration_keeps_h1_attributes() {
        let out = decorate_chapter_headings("<h1 id=\"x\">T</h1><h2>S</h2>", 1, DecorationPolicy::All);
        assert!(out.contains("</div>\n<h1 id=\"x\">T</h1>"));
        assert_eq!(out.matches("chapter-padding").count(), 1);
    }

    #[test]
    fn test_notice_marker() {
        let out = substitute_markers("<blockquote>\n<p>{notice} Careful.</p>\n</blockquote>\n");
        assert_eq!(
            out,
            "<blockquote class=\"notice\">\n<p> Careful.</p>\n</blockquote>\n"
        );
    }

    #[test]
    fn test_warning_and_quote_markers() {
        let out = substitute_markers(
            "<blockquote>\n<p>{warning}w</p>\n</blockquote>\n<blockquote>\n<p>{quote}q</p>\n</blockquote>\n",
        );
        assert!(out.contains("<blockquote class=\"warning\">"));
        assert!(out.contains("<blockquote class=\"quote\">"));
        assert!(!out.contains("{warning}") && !out.contains("{quote}"));
    }

    #[test]
    fn test_misplaced_marker_left_verbatim() {
        let html = "<p>Use {notice} inline.</p>";
        assert_eq!(substitute_markers(html), html);
    }

    #[test]
    fn test_break_marker() {
        let out = substitute_markers("<p>a</p>\n<p>[break]</p>\n<p>b [break] c</p>");
        assert_eq!(
            out,
            format!("<p>a</p>\n{PAGE_BREAK_DIV}\n<p>b {PAGE_BREAK_DIV} c</p>")
        );
    }

    #[test]
    fn test_markers_idempotent() {
        let html = "<blockquote>\n<p>{notice}n</p>\n</blockquote>\n<p>[break]</p>";
        let once = substitute_markers(html);
        assert_eq!(substitute_markers(&once), once);
    }

    #[test]
    fn test_transform_scenario_title_hello_world() {
        let html = crate::pipeline::markdown::parse("# Title\n\nHello world");
        let out = transform(&html, 2, DecorationPolicy::All);
        assert_eq!(out.matches("chapter-padding").count(), 1);
        let deco = out.find("chapter-padding").unwrap();
        let h1 = out.find("<h1>").unwrap();
        assert!(deco < h1);
        assert!(out.contains("<p>Hello world</p>"));
        check_well_formed(&out).unwrap();
    }

    #[test]
    fn test_transform_preserves_well_formedness() {
        let md = "# One\n\nIntro\n\n## Two\n\n> {warning} Hot\n\n- a\n- b\n\n[break]\n\n```\n# not a heading\n```\n";
        let html = crate::pipeline::markdown::parse(md);
        check_well_formed(&html).unwrap();
        let out = transform(&html, 1, DecorationPolicy::All);
        check_well_formed(&out).unwrap();
    }
}

//! Markdown → HTML.
//!
//! The extension set is fixed at compile time; there is no runtime plugin
//! registration.

use pulldown_cmark::{html, Options, Parser};

/// Extensions enabled for every chapter.
pub fn options() -> Options {
    let mut opts = Options::empty();
    opts.insert(Options::ENABLE_TABLES);
    opts.insert(Options::ENABLE_STRIKETHROUGH);
    opts.insert(Options::ENABLE_TASKLISTS);
    opts.insert(Options::ENABLE_FOOTNOTES);
    opts
}

/// Convert one chapter's Markdown source to an HTML fragment.
pub fn parse(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, options());
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heading_and_paragraph() {
        let html = parse("# Title\n\nHello world\n");
        assert_eq!(html, "<h1>Title</h1>\n<p>Hello world</p>\n");
    }

    #[test]
    fn test_blockquote_marker_survives_parsing() {
        let html = parse("> {notice} Read this first.\n");
        assert!(html.starts_with("<blockquote>\n<p>{notice}"), "got: {html}");
    }

    #[test]
    fn test_tables_enabled() {
        let html = parse("| a | b |\n|---|---|\n| 1 | 2 |\n");
        assert!(html.contains("<table>"));
        assert!(html.contains("<td>1</td>"));
    }

    #[test]
    fn test_strikethrough_and_tasks() {
        let html = parse("- [x] done ~~old~~\n");
        assert!(html.contains("<del>old</del>"));
        assert!(html.contains("type=\"checkbox\""));
    }

    #[test]
    fn test_code_block_language() {
        let html = parse("```rust\nfn main() {}\n```\n");
        assert!(html.contains("<pre><code class=\"language-rust\">"));
    }
}

//! Chapter assembly: sequences processed chapters into the renderer.
//!
//! ```text
//! NotStarted ──add──▶ InProgress ──add(is_last)──▶ Finished
//!                      │    ▲
//!                      └add─┘
//! ```
//!
//! Per chapter: running header (set, cleared or kept) → content wrapped in a
//! `chapter` container → page break unless it is the last chapter. Once the
//! last chapter is in, further chapters are rejected.

use crate::config::{BookConfig, MissingTitlePolicy, PageSide};
use crate::error::BookError;
use crate::pipeline::fragment::plain_text;
use crate::render::{BookRenderer, RunningHeader};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static RE_FIRST_H1: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<h1(?:\s(?:[^>"']|"[^"]*"|'[^']*')*)?>(.*?)</h1\s*>"#).unwrap()
});

/// Class of the container each chapter is wrapped in.
pub const CHAPTER_CLASS: &str = "chapter";

/// Where the assembler is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyState {
    NotStarted,
    InProgress { chapters: usize },
    Finished { chapters: usize },
}

/// What happened to one chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledChapter {
    /// Title found in the chapter's first `h1`, if any.
    pub title: Option<String>,
    /// Whether a page break followed the chapter.
    pub page_break: bool,
}

/// Feeds chapters to a [`BookRenderer`] in sequence order.
#[derive(Debug)]
pub struct ChapterAssembler {
    state: AssemblyState,
    side: PageSide,
    missing_title: MissingTitlePolicy,
    page_breaks: usize,
}

impl ChapterAssembler {
    pub fn new(side: PageSide, missing_title: MissingTitlePolicy) -> Self {
        Self {
            state: AssemblyState::NotStarted,
            side,
            missing_title,
            page_breaks: 0,
        }
    }

    pub fn from_config(config: &BookConfig) -> Self {
        Self::new(config.chapters.running_header, config.chapters.missing_title)
    }

    pub fn state(&self) -> AssemblyState {
        self.state
    }

    /// Inter-chapter page breaks inserted so far.
    pub fn page_breaks(&self) -> usize {
        self.page_breaks
    }

    /// Add the next chapter. Call once per document, in sequence order, with
    /// `is_last` set for the final one.
    pub fn add_chapter<R: BookRenderer + ?Sized>(
        &mut self,
        renderer: &mut R,
        html: &str,
        is_last: bool,
    ) -> Result<AssembledChapter, BookError> {
        let done = match self.state {
            AssemblyState::Finished { .. } => return Err(BookError::AssemblyFinished),
            AssemblyState::NotStarted => 0,
            AssemblyState::InProgress { chapters } => chapters,
        };

        let title = extract_title(html);
        match &title {
            Some(text) => {
                let header = RunningHeader {
                    text: text.clone(),
                    slug: chapter_slug(text, done + 1),
                };
                renderer.set_running_header(Some(&header), self.side)?;
            }
            None => {
                if self.missing_title == MissingTitlePolicy::Clear {
                    renderer.set_running_header(None, self.side)?;
                }
            }
        }

        renderer.write_content_block(&format!("<div class=\"{CHAPTER_CLASS}\">{html}</div>"))?;

        let page_break = !is_last;
        if page_break {
            renderer.insert_page_break()?;
            self.page_breaks += 1;
        }

        let chapters = done + 1;
        self.state = if is_last {
            AssemblyState::Finished { chapters }
        } else {
            AssemblyState::InProgress { chapters }
        };
        debug!(chapter = chapters, ?title, page_break, "Chapter assembled");
        Ok(AssembledChapter { title, page_break })
    }
}

/// Title of the chapter: the first `h1`'s text with entities decoded, soft
/// hyphens removed and whitespace trimmed. Empty titles count as missing.
pub fn extract_title(html: &str) -> Option<String> {
    let caps = RE_FIRST_H1.captures(html)?;
    let title = plain_text(&caps[1]);
    (!title.is_empty()).then_some(title)
}

/// Anchor for a chapter title, unique per sequence position.
pub fn chapter_slug(title: &str, sequence_index: usize) -> String {
    let slug = slug::slugify(title);
    if slug.is_empty() {
        format!("chapter-{sequence_index}")
    } else {
        format!("chapter-{sequence_index}-{slug}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{Cover, RenderSummary};
    use std::path::Path;

    /// Records every renderer call.
    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
    }

    impl BookRenderer for Recorder {
        fn set_running_header(
            &mut self,
            header: Option<&RunningHeader>,
            side: PageSide,
        ) -> Result<(), BookError> {
            self.calls.push(match header {
                Some(h) => format!("header:{}:{}:{side:?}", h.text, h.slug),
                None => "header:none".to_string(),
            });
            Ok(())
        }

        fn write_content_block(&mut self, html: &str) -> Result<(), BookError> {
            self.calls.push(format!("content:{html}"));
            Ok(())
        }

        fn insert_page_break(&mut self) -> Result<(), BookError> {
            self.calls.push("break".to_string());
            Ok(())
        }

        fn set_footer(&mut self, _html: &str) -> Result<(), BookError> {
            Ok(())
        }

        fn write_cover(&mut self, _cover: &Cover) -> Result<(), BookError> {
            Ok(())
        }

        fn finalize(&mut self, _path: &Path) -> Result<RenderSummary, BookError> {
            Ok(RenderSummary {
                pages: 0,
                warnings: Vec::new(),
            })
        }
    }

    #[test]
    fn test_extract_title() {
        assert_eq!(
            extract_title("<div><h1 id=\"x\">Вве&shy;де&shy;ние &amp; more </h1></div><h1>Second</h1>"),
            Some("Введение & more".to_string())
        );
        assert_eq!(extract_title("<h2>No</h2>"), None);
        assert_eq!(extract_title("<h1> </h1>"), None);
    }

    #[test]
    fn test_slug() {
        assert_eq!(chapter_slug("Hello, World!", 3), "chapter-3-hello-world");
        assert_eq!(chapter_slug("???", 1), "chapter-1");
    }

    #[test]
    fn test_two_chapters_one_break() {
        let mut r = Recorder::default();
        let mut a = ChapterAssembler::new(PageSide::Even, MissingTitlePolicy::Clear);
        a.add_chapter(&mut r, "<h1>One</h1>", false).unwrap();
        a.add_chapter(&mut r, "<h1>Two</h1>", true).unwrap();
        assert_eq!(a.page_breaks(), 1);
        assert_eq!(
            r.calls,
            vec![
                "header:One:chapter-1-one:Even",
                "content:<div class=\"chapter\"><h1>One</h1></div>",
                "break",
                "header:Two:chapter-2-two:Even",
                "content:<div class=\"chapter\"><h1>Two</h1></div>",
            ]
        );
        assert_eq!(a.state(), AssemblyState::Finished { chapters: 2 });
    }

    #[test]
    fn test_n_chapters_n_minus_one_breaks() {
        let mut r = Recorder::default();
        let mut a = ChapterAssembler::new(PageSide::Both, MissingTitlePolicy::Keep);
        for i in 1..=5 {
            a.add_chapter(&mut r, "<p>x</p>", i == 5).unwrap();
        }
        assert_eq!(a.page_breaks(), 4);
        assert_eq!(r.calls.iter().filter(|c| *c == "break").count(), 4);
        assert_ne!(r.calls.last().map(String::as_str), Some("break"));
    }

    #[test]
    fn test_missing_title_clear_vs_keep() {
        let mut r = Recorder::default();
        let mut a = ChapterAssembler::new(PageSide::Even, MissingTitlePolicy::Clear);
        a.add_chapter(&mut r, "<p>untitled</p>", true).unwrap();
        assert_eq!(r.calls[0], "header:none");

        let mut r = Recorder::default();
        let mut a = ChapterAssembler::new(PageSide::Even, MissingTitlePolicy::Keep);
        let out = a.add_chapter(&mut r, "<p>untitled</p>", true).unwrap();
        assert!(out.title.is_none());
        assert!(r.calls[0].starts_with("content:"));
    }

    #[test]
    fn test_add_after_last_fails() {
        let mut r = Recorder::default();
        let mut a = ChapterAssembler::new(PageSide::Even, MissingTitlePolicy::Clear);
        assert_eq!(a.state(), AssemblyState::NotStarted);
        a.add_chapter(&mut r, "<p>a</p>", false).unwrap();
        assert_eq!(a.state(), AssemblyState::InProgress { chapters: 1 });
        a.add_chapter(&mut r, "<p>b</p>", true).unwrap();
        assert!(matches!(
            a.add_chapter(&mut r, "<p>c</p>", true),
            Err(BookError::AssemblyFinished)
        ));
    }
}

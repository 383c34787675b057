//! Per-chapter pipeline driver.
//!
//! ```text
//! markdown ─parse─▶ html ─guard─▶ transform ─guard─▶ typography ─guard─▶ hyphenate
//! ```
//!
//! Before each stage the fragment is checked for balanced tags. Raw HTML in a
//! Markdown source can break that; what happens next depends on the
//! [`TransformPolicy`]:
//!
//! - `Lenient`: the stage is skipped for this chapter, a [`StageWarning`] is
//!   recorded and logged, and the fragment flows on unchanged.
//! - `Strict`: the build aborts with [`BookError::Transform`].

use crate::config::{BookConfig, DecorationPolicy, TransformPolicy};
use crate::error::{BookError, StageWarning};
use crate::pipeline::fragment::check_well_formed;
use crate::pipeline::hyphenate::Hyphenation;
use crate::pipeline::markdown;
use crate::pipeline::transform::transform;
use crate::pipeline::typography::{apply_typography, Typographer};
use tracing::{debug, warn};

/// Output of [`ChapterProcessor::process`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedChapter {
    /// Final HTML, ready for the renderer.
    pub html: String,
    /// Stages skipped under the lenient policy.
    pub warnings: Vec<StageWarning>,
}

/// Runs every stage for one document. Built once per build; dictionaries and
/// the orphan rule are compiled at construction.
#[derive(Debug)]
pub struct ChapterProcessor {
    decoration: DecorationPolicy,
    policy: TransformPolicy,
    typographer: Typographer,
    hyphenation: Hyphenation,
}

impl ChapterProcessor {
    pub fn new(config: &BookConfig) -> Result<Self, BookError> {
        Ok(Self {
            decoration: config.chapters.decoration,
            policy: config.transform_policy,
            typographer: Typographer::new(
                config.typography.locale,
                config.typography.orphan_max_length,
            )?,
            hyphenation: Hyphenation::new(&config.hyphenation)?,
        })
    }

    /// Convert one chapter.
    ///
    /// `sequence_index` is 1-based; `name` is the source file name, used in
    /// warnings and errors.
    pub fn process(
        &self,
        markdown_src: &str,
        sequence_index: usize,
        name: &str,
    ) -> Result<ProcessedChapter, BookError> {
        let mut warnings = Vec::new();
        let html = markdown::parse(markdown_src);
        debug!(chapter = name, bytes = html.len(), "Parsed Markdown");

        let html = self.stage("transform", html, name, &mut warnings, |h| {
            transform(h, sequence_index, self.decoration)
        })?;
        let html = self.stage("typography", html, name, &mut warnings, |h| {
            apply_typography(h, &self.typographer)
        })?;
        let html = self.stage("hyphenation", html, name, &mut warnings, |h| {
            self.hyphenation.apply(h)
        })?;

        Ok(ProcessedChapter { html, warnings })
    }

    fn stage<F>(
        &self,
        stage: &'static str,
        html: String,
        chapter: &str,
        warnings: &mut Vec<StageWarning>,
        run: F,
    ) -> Result<String, BookError>
    where
        F: FnOnce(&str) -> String,
    {
        match check_well_formed(&html) {
            Ok(()) => Ok(run(&html)),
            Err(e) => match self.policy {
                TransformPolicy::Strict => Err(BookError::Transform {
                    chapter: chapter.to_string(),
                    stage,
                    detail: e.to_string(),
                }),
                TransformPolicy::Lenient => {
                    warn!(chapter, stage, "Skipping stage: {}", e);
                    warnings.push(StageWarning {
                        chapter: chapter.to_string(),
                        stage: stage.to_string(),
                        detail: e.to_string(),
                    });
                    Ok(html)
                }
            },
        }
    }
}

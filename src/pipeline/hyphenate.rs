//! Hyphenation pass: soft-hyphen insertion.
//!
//! Runs once per configured locale, in order, over the whole fragment. Each
//! pass inserts `&shy;` at the break points its Knuth–Liang dictionary finds.
//! A word that already carries a soft hyphen (from an earlier pass or from the
//! author) is left alone, so a later locale never re-splits a word.
//!
//! Dictionaries are embedded in the binary and loaded once per build. There
//! is no on-disk cache.
//!
//! The pass is transparent: removing every inserted `&shy;` gives back the
//! input byte for byte. Entities, tags, whitespace and protected elements are
//! copied through untouched.

use crate::config::{HyphenationOptions, Locale};
use crate::error::BookError;
use crate::pipeline::fragment;
use hyphenation::{Hyphenator as _, Language, Load, Standard};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use tracing::debug;

pub const SOFT_HYPHEN: &str = "&shy;";

/// Either an entity (copied verbatim) or a word, possibly already containing
/// soft hyphens.
static RE_WORD_OR_ENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(&#?[A-Za-z0-9]+;)|(\p{L}+(?:(?:&shy;|\u{00AD})\p{L}+)*)").unwrap()
});

/// One loaded hyphenation dictionary.
pub struct Dictionary {
    locale: Locale,
    standard: Standard,
}

impl fmt::Debug for Dictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dictionary")
            .field("locale", &self.locale)
            .finish_non_exhaustive()
    }
}

fn language(locale: Locale) -> Language {
    match locale {
        Locale::Russian => Language::Russian,
        Locale::EnglishUs => Language::EnglishUS,
        Locale::EnglishGb => Language::EnglishGB,
        Locale::French => Language::French,
        Locale::German => Language::German1996,
    }
}

impl Dictionary {
    /// Load the embedded dictionary for `locale`.
    pub fn load(locale: Locale) -> Result<Self, BookError> {
        let standard =
            Standard::from_embedded(language(locale)).map_err(|e| BookError::Hyphenation {
                locale: locale.code().to_string(),
                detail: e.to_string(),
            })?;
        debug!("Loaded hyphenation dictionary for {}", locale);
        Ok(Self { locale, standard })
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    /// Byte offsets inside `word` where a soft hyphen may go.
    fn breaks(&self, word: &str) -> Vec<usize> {
        let mut breaks = self.standard.hyphenate(word).breaks;
        breaks.retain(|&i| i > 0 && i < word.len() && word.is_char_boundary(i));
        breaks.sort_unstable();
        breaks.dedup();
        breaks
    }
}

/// Insert soft hyphens into every eligible word of `html` using one
/// dictionary. Words shorter than `min_word_length` characters are skipped.
pub fn hyphenate(html: &str, dictionary: &Dictionary, min_word_length: usize) -> String {
    fragment::map_text(html, |text| {
        RE_WORD_OR_ENTITY
            .replace_all(text, |caps: &regex::Captures<'_>| match caps.get(2) {
                Some(word) => hyphenate_word(word.as_str(), dictionary, min_word_length),
                None => caps[0].to_string(),
            })
            .into_owned()
    })
}

fn hyphenate_word(word: &str, dictionary: &Dictionary, min_word_length: usize) -> String {
    if word.contains(SOFT_HYPHEN) || word.contains('\u{00AD}') {
        return word.to_string();
    }
    if word.chars().count() < min_word_length {
        return word.to_string();
    }
    let breaks = dictionary.breaks(word);
    if breaks.is_empty() {
        return word.to_string();
    }
    let mut out = String::with_capacity(word.len() + breaks.len() * SOFT_HYPHEN.len());
    let mut last = 0;
    for b in breaks {
        out.push_str(&word[last..b]);
        out.push_str(SOFT_HYPHEN);
        last = b;
    }
    out.push_str(&word[last..]);
    out
}

/// All configured dictionaries, applied in order.
#[derive(Debug)]
pub struct Hyphenation {
    dictionaries: Vec<Dictionary>,
    min_word_length: usize,
}

impl Hyphenation {
    pub fn new(options: &HyphenationOptions) -> Result<Self, BookError> {
        let dictionaries = options
            .locales
            .iter()
            .map(|&locale| Dictionary::load(locale))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            dictionaries,
            min_word_length: options.min_word_length,
        })
    }

    pub fn locales(&self) -> impl Iterator<Item = Locale> + '_ {
        self.dictionaries.iter().map(Dictionary::locale)
    }

    /// Run one pass per dictionary over the whole fragment.
    pub fn apply(&self, html: &str) -> String {
        self.dictionaries
            .iter()
            .fold(html.to_string(), |acc, dict| {
                hyphenate(&acc, dict, self.min_word_length)
            })
    }
}

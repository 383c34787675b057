//! Typography stage: locale-aware punctuation and orphan prevention.
//!
//! Three collaborators run here, in this order:
//!
//! 1. [`Fixer`]: the classic ordered rule set (ellipsis, dimensions, units,
//!    dashes, smart quotes, comma spacing, apostrophes, trademarks), applied
//!    to the inner content of one paragraph or list item at a time.
//! 2. [`typograf`]: a broader normaliser applied to the *whole* fragment
//!    after every span update. Its rules partly overlap with the fixer.
//! 3. Orphan prevention: short words are glued to the following word with a
//!    non-breaking space, again per span.
//!
//! Spans are re-located from the current string before every update, since
//! each replacement shifts later offsets.
//!
//! Every rule sees *decoded* text: entities are resolved first and the result
//! is re-escaped afterwards, so `&quot;` from the Markdown parser is a quote
//! and `&nbsp;` is whitespace. Tags and protected elements are never touched.

use crate::config::Locale;
use crate::error::BookError;
use crate::pipeline::fragment::{self, decode_entities, encode_text};
use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;

const NBSP: char = '\u{00A0}';

/// Run the whole typography stage over one chapter fragment.
pub fn apply_typography(html: &str, typographer: &Typographer) -> String {
    let s = typographer.fix_spans(html);
    typographer.prevent_orphans(&s)
}

/// Locale-bound typography stage, built once per build.
#[derive(Debug, Clone)]
pub struct Typographer {
    fixer: Fixer,
    locale: Locale,
    orphan: Regex,
}

impl Typographer {
    /// `orphan_max_length` is the longest word that may not end a line.
    pub fn new(locale: Locale, orphan_max_length: usize) -> Result<Self, BookError> {
        let orphan = Regex::new(&format!(r"\b(\w{{1,{orphan_max_length}}})\s+")).map_err(|e| {
            BookError::InvalidConfig(format!("typography.orphan_max_length: {e}"))
        })?;
        Ok(Self {
            fixer: Fixer::new(locale),
            locale,
            orphan,
        })
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    /// Steps 1 and 2: fix each span, then normalise the whole fragment.
    pub fn fix_spans(&self, html: &str) -> String {
        let mut html = html.to_string();
        let mut i = 0;
        loop {
            let found = fragment::spans(&html);
            let Some(span) = found.get(i) else {
                break;
            };
            let fixed = self.fixer.fix(&html[span.inner.clone()]);
            replace_range(&mut html, span.inner.clone(), &fixed);
            html = typograf(&html, self.locale);
            i += 1;
        }
        html
    }

    /// Step 3: join short words to their successor inside every span.
    pub fn prevent_orphans(&self, html: &str) -> String {
        let mut html = html.to_string();
        let mut i = 0;
        loop {
            let found = fragment::spans(&html);
            let Some(span) = found.get(i) else {
                break;
            };
            let joined = fragment::map_text(&html[span.inner.clone()], |text| {
                let decoded = decode_entities(text);
                let out = self
                    .orphan
                    .replace_all(&decoded, |caps: &regex::Captures<'_>| {
                        format!("{}{NBSP}", &caps[1])
                    });
                encode_text(&out)
            });
            replace_range(&mut html, span.inner.clone(), &joined);
            i += 1;
        }
        html
    }
}

fn replace_range(html: &mut String, range: Range<usize>, with: &str) {
    if html[range.clone()] != *with {
        html.replace_range(range, with);
    }
}


// ── Fixer ────────────────────────────────────────────────────────────────────

/// The per-span punctuation fixer.
///
/// Rules (applied in order to each text segment):
/// 1. Ellipsis
/// 2. Dimension
/// 3. Unit
/// 4. Dash
/// 5. SmartQuotes (stateful across the segments of one span)
/// 6. NoSpaceBeforeComma
/// 7. CurlyQuote
/// 8. Trademark
#[derive(Debug, Clone, Copy)]
pub struct Fixer {
    locale: Locale,
}

impl Fixer {
    pub fn new(locale: Locale) -> Self {
        Self { locale }
    }

    /// Fix one inner-HTML span.
    pub fn fix(&self, html: &str) -> String {
        let mut quotes = QuoteState::default();
        fragment::map_text(html, |text| {
            let s = decode_entities(text);
            let s = fix_ellipsis(&s);
            let s = fix_dimension(&s);
            let s = fix_unit(&s);
            let s = fix_dash(&s, self.locale);
            let s = smart_quotes(&s, self.locale, &mut quotes);
            let s = no_space_before_comma(&s);
            let s = curly_quote(&s);
            let s = trademark(&s);
            encode_text(&s)
        })
    }
}

// ── Rule 1: Ellipsis ─────────────────────────────────────────────────────────

static RE_ELLIPSIS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.{3,}").unwrap());

fn fix_ellipsis(input: &str) -> String {
    RE_ELLIPSIS.replace_all(input, "…").into_owned()
}

// ── Rule 2: Dimension ────────────────────────────────────────────────────────

static RE_DIMENSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d+) ?[xх] ?(\d+)\b").unwrap());

fn fix_dimension(input: &str) -> String {
    RE_DIMENSION.replace_all(input, "$1×$2").into_owned()
}

// ── Rule 3: Unit ─────────────────────────────────────────────────────────────

static RE_UNIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(\d) +(",
        r"(?:мм|см|дм|км|мг|кг|мл|мс|мин|сек|ч|м|г|л|с|т|",
        r"руб|коп|ГБ|МБ|КБ|ТБ|Гб|Мб|Кб|",
        r"mm|cm|dm|km|mg|kg|ml|ms|min|sec|h|m|g|l|s|t|",
        r"px|pt|em|rem|Hz|kHz|MHz|GHz|B|KB|MB|GB|TB)\b",
        r"|%|‰|°|₽|€|£",
        r")"
    ))
    .unwrap()
});

fn fix_unit(input: &str) -> String {
    RE_UNIT
        .replace_all(input, |caps: &regex::Captures<'_>| {
            format!("{}{NBSP}{}", &caps[1], &caps[2])
        })
        .into_owned()
}

// ── Rule 4: Dash ─────────────────────────────────────────────────────────────

static RE_SPACED_DASH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\S)[ \u{00A0}]+(?:-{1,3}|–|—)[ \u{00A0}]+").unwrap());

static RE_NUMERIC_RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(^|[^\d-])(\d+)-(\d+)($|[^\d-])").unwrap());

fn fix_dash(input: &str, locale: Locale) -> String {
    let s = RE_SPACED_DASH.replace_all(input, |caps: &regex::Captures<'_>| {
        let dash = match locale {
            Locale::Russian | Locale::French => format!("{NBSP}— "),
            Locale::German => format!("{NBSP}– "),
            Locale::EnglishUs | Locale::EnglishGb => "—".to_string(),
        };
        format!("{}{dash}", &caps[1])
    });
    RE_NUMERIC_RANGE
        .replace_all(&s, "$1$2–$3$4")
        .into_owned()
}

// ── Rule 5: SmartQuotes ──────────────────────────────────────────────────────

/// Nesting depth and previous character, carried across the text segments of
/// one span so a quote closed after an inline element still pairs up.
#[derive(Debug, Default)]
struct QuoteState {
    depth: usize,
    prev: Option<char>,
}

/// Outer and inner (open, close) quote pairs.
fn quote_marks(locale: Locale) -> [(&'static str, &'static str); 2] {
    match locale {
        Locale::Russian => [("«", "»"), ("„", "“")],
        Locale::EnglishUs | Locale::EnglishGb => [("“", "”"), ("‘", "’")],
        Locale::French => [("«\u{00A0}", "\u{00A0}»"), ("“", "”")],
        Locale::German => [("„", "“"), ("‚", "‘")],
    }
}

fn opens_quote(prev: Option<char>) -> bool {
    match prev {
        None => true,
        Some(c) => c.is_whitespace() || "([{«„“‘‚—–-/".contains(c),
    }
}

fn smart_quotes(input: &str, locale: Locale, state: &mut QuoteState) -> String {
    if !input.contains('"') {
        if let Some(last) = input.chars().last() {
            state.prev = Some(last);
        }
        return input.to_string();
    }
    let marks = quote_marks(locale);
    let mut out = String::with_capacity(input.len() + 8);
    for c in input.chars() {
        if c != '"' {
            out.push(c);
            state.prev = Some(c);
            continue;
        }
        let mark = if opens_quote(state.prev) && state.depth < marks.len() {
            state.depth += 1;
            marks[state.depth - 1].0
        } else if state.depth > 0 {
            state.depth -= 1;
            marks[state.depth].1
        } else {
            marks[0].1
        };
        out.push_str(mark);
        state.prev = mark.chars().last();
    }
    out
}

// ── Rule 6: NoSpaceBeforeComma ───────────────────────────────────────────────

static RE_SPACE_BEFORE_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\S)[ \u{00A0}]+,").unwrap());

fn no_space_before_comma(input: &str) -> String {
    RE_SPACE_BEFORE_COMMA.replace_all(input, "$1,").into_owned()
}

// ── Rule 7: CurlyQuote ───────────────────────────────────────────────────────

fn curly_quote(input: &str) -> String {
    input.replace('\'', "’")
}

// ── Rule 8: Trademark ────────────────────────────────────────────────────────

static RE_COPYRIGHT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\(c\)").unwrap());
static RE_REGISTERED: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\(r\)").unwrap());
static RE_TRADEMARK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\(tm\)").unwrap());

fn trademark(input: &str) -> String {
    if !input.contains('(') {
        return input.to_string();
    }
    let s = RE_COPYRIGHT.replace_all(input, "©");
    let s = RE_REGISTERED.replace_all(&s, "®");
    RE_TRADEMARK.replace_all(&s, "™").into_owned()
}

// ── Typograf ─────────────────────────────────────────────────────────────────

static RE_MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r" {2,}").unwrap());
static RE_PLUS_MINUS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\+-(\s?\d)").unwrap());
static RE_ARROW_RIGHT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(^|\s)->(\s|$)").unwrap());
static RE_ARROW_LEFT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(^|\s)<-(\s|$)").unwrap());
static RE_FRACTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(^|[^\d/])(1/2|1/4|3/4)($|[^\d/])").unwrap());
static RE_NUMERO: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:\bNo\.?|№) ?(\d)").unwrap());
static RE_INITIALS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\p{Lu}\.) +(\p{Lu}\.) +(\p{Lu}\p{Ll}+)").unwrap());
static RE_SPACE_BEFORE_DASH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r" +([—–])([ \u{00A0}])").unwrap());

/// Global normaliser applied over the whole fragment.
///
/// Every rule is idempotent, so re-running it after each span update only
/// touches text that changed since the previous run.
pub fn typograf(html: &str, locale: Locale) -> String {
    fragment::map_text(html, |text| {
        let s = decode_entities(text);
        let s = RE_MULTI_SPACE.replace_all(&s, " ");
        let s = RE_PLUS_MINUS.replace_all(&s, "±$1");
        let s = RE_ARROW_RIGHT.replace_all(&s, "$1→$2");
        let s = RE_ARROW_LEFT.replace_all(&s, "$1←$2");
        let s = RE_FRACTION.replace_all(&s, |caps: &regex::Captures<'_>| {
            let glyph = match &caps[2] {
                "1/2" => "½",
                "1/4" => "¼",
                _ => "¾",
            };
            format!("{}{glyph}{}", &caps[1], &caps[3])
        });
        let s = match locale {
            Locale::Russian => {
                let s = RE_NUMERO.replace_all(&s, |caps: &regex::Captures<'_>| {
                    format!("№{NBSP}{}", &caps[1])
                });
                RE_INITIALS
                    .replace_all(&s, |caps: &regex::Captures<'_>| {
                        format!("{}{NBSP}{}{NBSP}{}", &caps[1], &caps[2], &caps[3])
                    })
                    .into_owned()
            }
            _ => s.into_owned(),
        };
        let s = RE_SPACE_BEFORE_DASH.replace_all(&s, |caps: &regex::Captures<'_>| {
            format!("{NBSP}{}{}", &caps[1], &caps[2])
        });
        encode_text(&s)
    })
}

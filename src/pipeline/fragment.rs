//! HTML fragment helpers shared by every stage.
//!
//! Stages work on HTML *strings*. This module gives them three views of a
//! fragment:
//!
//! - [`segments`] / [`map_text`]: a flat tag/text tokenisation. Used by the
//!   typography, orphan and hyphenation passes, which must only ever rewrite
//!   text outside protected elements (`pre`, `code`, …).
//! - [`spans`]: byte ranges of the inner content of every `<p>` and `<li>`,
//!   recomputed from the current string on each call.
//! - [`parse_nodes`]: a lightweight element tree for the renderer, and
//!   [`check_well_formed`], the guard each stage runs before touching input.

use once_cell::sync::Lazy;
use quick_xml::escape::{partial_escape, resolve_html5_entity};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use std::ops::Range;
use thiserror::Error;

/// Elements whose text content is never rewritten.
const PROTECTED: &[&str] = &["pre", "code", "kbd", "samp", "script", "style"];

/// HTML void elements: never have a closing tag.
const VOID: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// A comment or a tag. Quoted attribute values may contain `>`.
static RE_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<!--.*?-->|<(?:[^>"']|"[^"]*"|'[^']*')*>"#).unwrap()
});

static RE_TAG_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^<\s*(/)?\s*([A-Za-z][A-Za-z0-9-]*)").unwrap());

static RE_ENTITY: Lazy<Regex> = Lazy::new(|| Regex::new(r"&(#?[A-Za-z0-9]+);").unwrap());

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Why a fragment is not well-formed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FragmentError {
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("expected </{expected}>, found </{found}>")]
    Mismatched { expected: String, found: String },
    #[error("unexpected </{0}> with no open element")]
    UnexpectedClose(String),
    #[error("<{0}> is never closed")]
    Unclosed(String),
}

pub fn is_void(name: &str) -> bool {
    VOID.contains(&name)
}

pub fn is_protected(name: &str) -> bool {
    PROTECTED.contains(&name)
}

// ── Tokenising ───────────────────────────────────────────────────────────

/// One piece of a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// A tag, comment or declaration, verbatim.
    Tag(&'a str),
    /// Character data between tags (still entity-encoded).
    Text(&'a str),
}

/// Parsed shape of a tag token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagInfo {
    /// Lower-cased element name.
    pub name: String,
    pub closing: bool,
    pub self_closing: bool,
}

/// Inspect a raw tag token. Returns `None` for comments and declarations.
pub fn tag_info(raw: &str) -> Option<TagInfo> {
    let caps = RE_TAG_NAME.captures(raw)?;
    Some(TagInfo {
        name: caps[2].to_ascii_lowercase(),
        closing: caps.get(1).is_some(),
        self_closing: raw.trim_end_matches('>').trim_end().ends_with('/'),
    })
}

/// Split a fragment into alternating tag and text segments.
pub fn segments(html: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut last = 0;
    for m in RE_TAG.find_iter(html) {
        if m.start() > last {
            out.push(Segment::Text(&html[last..m.start()]));
        }
        out.push(Segment::Tag(m.as_str()));
        last = m.end();
    }
    if last < html.len() {
        out.push(Segment::Text(&html[last..]));
    }
    out
}

/// Rewrite every text segment that is not inside a protected element.
///
/// Tags, comments and protected text are copied through byte for byte.
pub fn map_text<F>(html: &str, mut f: F) -> String
where
    F: FnMut(&str) -> String,
{
    let mut out = String::with_capacity(html.len() + html.len() / 8);
    let mut protected_depth = 0usize;
    for seg in segments(html) {
        match seg {
            Segment::Tag(raw) => {
                if let Some(tag) = tag_info(raw) {
                    if is_protected(&tag.name) && !tag.self_closing {
                        if tag.closing {
                            protected_depth = protected_depth.saturating_sub(1);
                        } else {
                            protected_depth += 1;
                        }
                    }
                }
                out.push_str(raw);
            }
            Segment::Text(text) if protected_depth == 0 => out.push_str(&f(text)),
            Segment::Text(text) => out.push_str(text),
        }
    }
    out
}

// ── Spans ────────────────────────────────────────────────────────────────

/// The inner content of one `<p>` or `<li>` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    /// `p` or `li`.
    pub tag: String,
    /// Byte offset of the opening tag.
    pub open: usize,
    /// Byte range of the content between the opening and closing tags.
    pub inner: Range<usize>,
}

/// Locate every paragraph and list-item span, in document order.
///
/// Nested spans (a `<p>` inside a loose `<li>`) are both reported. Elements
/// left unclosed are skipped.
pub fn spans(html: &str) -> Vec<Span> {
    let mut open: Vec<(String, usize, usize)> = Vec::new();
    let mut found = Vec::new();
    for m in RE_TAG.find_iter(html) {
        let Some(tag) = tag_info(m.as_str()) else {
            continue;
        };
        if tag.name != "p" && tag.name != "li" {
            continue;
        }
        if tag.closing {
            if let Some(pos) = open.iter().rposition(|(name, _, _)| *name == tag.name) {
                let (name, start, inner_start) = open.swap_remove(pos);
                open.truncate(pos);
                found.push(Span {
                    tag: name,
                    open: start,
                    inner: inner_start..m.start(),
                });
            }
        } else if !tag.self_closing {
            open.push((tag.name, m.start(), m.end()));
        }
    }
    found.sort_by_key(|s| s.open);
    found
}

// ── Well-formedness and node tree ────────────────────────────────────────

fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase()
}

fn html_reader(html: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_str(html);
    let config = reader.config_mut();
    config.check_end_names = false;
    config.allow_unmatched_ends = true;
    reader
}

/// Verify that every non-void element is closed in the right order.
pub fn check_well_formed(html: &str) -> Result<(), FragmentError> {
    let mut reader = html_reader(html);
    let mut open: Vec<String> = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = element_name(&e);
                if !is_void(&name) {
                    open.push(name);
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase();
                if is_void(&name) {
                    continue;
                }
                match open.pop() {
                    Some(top) if top == name => {}
                    Some(top) => {
                        return Err(FragmentError::Mismatched {
                            expected: top,
                            found: name,
                        })
                    }
                    None => return Err(FragmentError::UnexpectedClose(name)),
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(FragmentError::Syntax(e.to_string())),
        }
    }
    match open.pop() {
        Some(name) => Err(FragmentError::Unclosed(name)),
        None => Ok(()),
    }
}

/// A node of the lightweight element tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    /// Decoded character data.
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    fn new(name: String, attrs: Vec<(String, String)>) -> Self {
        Self {
            name,
            attrs,
            children: Vec::new(),
        }
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// First class listed in the `class` attribute.
    pub fn class(&self) -> Option<&str> {
        self.attr("class")
            .and_then(|c| c.split_whitespace().next())
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|c| c.split_whitespace().any(|x| x == class))
    }

    /// Value of one declaration in the inline `style` attribute.
    pub fn style(&self, property: &str) -> Option<String> {
        css_declaration(self.attr("style")?, property)
    }

    /// Concatenated decoded text of all descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) => collect_text(&e.children, out),
        }
    }
}

/// Look up `property` in a CSS declaration list such as `"width: 10mm; top: 0"`.
pub fn css_declaration(css: &str, property: &str) -> Option<String> {
    css.split(';').find_map(|decl| {
        let (name, value) = decl.split_once(':')?;
        (name.trim().eq_ignore_ascii_case(property)).then(|| value.trim().to_string())
    })
}

fn start_element(e: &BytesStart<'_>) -> Result<Element, FragmentError> {
    let mut attrs = Vec::new();
    for attr in e.html_attributes() {
        let attr = attr.map_err(|err| FragmentError::Syntax(err.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_ascii_lowercase();
        let value = decode_entities(&String::from_utf8_lossy(&attr.value));
        attrs.push((key, value));
    }
    Ok(Element::new(element_name(e), attrs))
}

/// Parse a fragment into a tree, tolerating unclosed elements and stray
/// closing tags. Only genuine syntax errors are reported.
pub fn parse_nodes(html: &str) -> Result<Vec<Node>, FragmentError> {
    let mut reader = html_reader(html);
    let mut stack: Vec<Element> = vec![Element::new(String::new(), Vec::new())];

    fn close_top(stack: &mut Vec<Element>) {
        if stack.len() > 1 {
            if let Some(done) = stack.pop() {
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Element(done));
                }
            }
        }
    }

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let el = start_element(&e)?;
                if is_void(&el.name) {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(Node::Element(el));
                    }
                } else {
                    stack.push(el);
                }
            }
            Ok(Event::Empty(e)) => {
                let el = start_element(&e)?;
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Element(el));
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase();
                if let Some(pos) = stack.iter().skip(1).rposition(|el| el.name == name) {
                    while stack.len() > pos + 1 {
                        close_top(&mut stack);
                    }
                }
            }
            Ok(Event::Text(t)) => {
                let text = decode_entities(&String::from_utf8_lossy(&t));
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Text(text));
                }
            }
            Ok(Event::CData(t)) => {
                let text = String::from_utf8_lossy(&t).into_owned();
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Text(text));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(FragmentError::Syntax(e.to_string())),
        }
    }
    while stack.len() > 1 {
        close_top(&mut stack);
    }
    Ok(stack.pop().map(|root| root.children).unwrap_or_default())
}

// ── Entities and text ────────────────────────────────────────────────────

/// Resolve named (HTML5) and numeric character references.
///
/// Unknown references are left as they are.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    RE_ENTITY
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let body = &caps[1];
            let resolved = if let Some(num) = body.strip_prefix('#') {
                let code = match num.strip_prefix(['x', 'X']) {
                    Some(hex) => u32::from_str_radix(hex, 16).ok(),
                    None => num.parse::<u32>().ok(),
                };
                code.and_then(char::from_u32).map(String::from)
            } else {
                resolve_html5_entity(body).map(String::from)
            };
            resolved.unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Escape `&`, `<` and `>` so decoded text can be written back into HTML.
/// Non-breaking spaces and soft hyphens go back to entities so the fragment
/// stays readable.
pub fn encode_text(text: &str) -> String {
    partial_escape(text)
        .replace('\u{00A0}', "&nbsp;")
        .replace('\u{00AD}', "&shy;")
}

/// Visible text of an inline fragment: tags stripped, entities decoded,
/// soft hyphens removed, whitespace collapsed and trimmed.
pub fn plain_text(html: &str) -> String {
    let stripped = RE_TAG.replace_all(html, "");
    let decoded = decode_entities(&stripped.replace("&shy;", ""));
    let visible = decoded.replace('\u{00AD}', "");
    RE_WHITESPACE.replace_all(visible.trim(), " ").into_owned()
}

//! HTML fragment → Typst markup.
//!
//! The transpiler walks the lightweight tree from
//! [`parse_nodes`](crate::pipeline::fragment::parse_nodes) and emits markup
//! that relies only on the Typst standard library plus one hook,
//! `styled(name, body)`, which the theme defines for classed containers
//! (`notice`, `chapter`, `chapter-table`, …).
//!
//! Text is always escaped, so nothing an author writes can turn into Typst
//! syntax. Whitespace is collapsed outside `<pre>`, except for non-breaking
//! spaces, which carry the orphan rules.
//!
//! Typst only allows page breaks at the top level, so a fragment is first cut
//! at its page-break dividers: every element that holds one is split into a
//! copy before and a copy after it, and the break lands between the two.

use crate::error::BookError;
use crate::pipeline::fragment::{parse_nodes, Element, Node};
use crate::pipeline::transform::KEEP_TOGETHER_CLASS;
use std::path::{Component, Path, PathBuf};
use tracing::warn;

/// Elements laid out inline.
const INLINE: &[&str] = &[
    "a", "abbr", "b", "br", "cite", "code", "del", "em", "i", "img", "input", "ins", "kbd",
    "mark", "q", "s", "samp", "small", "span", "strike", "strong", "sub", "sup", "u",
];

/// Placeholder in footer HTML for the current page number.
pub const PAGE_NUMBER_PLACEHOLDER: &str = "{PAGENO}";

const PAGE_COUNTER: &str = "#context counter(page).display()";

const PAGE_BREAK: &str = "#pagebreak()";

/// Set on the second half of a list item split by a page break.
const CONTINUED_ATTR: &str = "data-continued";

/// Converts fragments, resolving images against a project root.
#[derive(Debug, Clone, Default)]
pub struct Transpiler {
    root: Option<PathBuf>,
    image_dirs: Vec<PathBuf>,
}

impl Transpiler {
    /// Images are looked up in each of `image_dirs` (relative to `root`), in
    /// order.
    pub fn new(root: impl Into<PathBuf>, image_dirs: Vec<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            image_dirs,
        }
    }

    /// Convert a block-level fragment.
    pub fn transpile(&self, html: &str) -> Result<String, BookError> {
        let nodes = parse_nodes(html).map_err(|e| BookError::Render {
            chapter: None,
            detail: format!("unreadable HTML: {e}"),
        })?;
        let mut out = Vec::new();
        for (i, part) in split_at_page_breaks(&nodes).iter().enumerate() {
            if i > 0 {
                out.push(PAGE_BREAK.to_string());
            }
            let markup = self.blocks(part);
            if !markup.is_empty() {
                out.push(markup);
            }
        }
        Ok(out.join("\n\n"))
    }

    /// Convert footer HTML, mapping `{PAGENO}` to the page counter.
    pub fn transpile_footer(&self, html: &str) -> Result<String, BookError> {
        if !html.contains(PAGE_NUMBER_PLACEHOLDER) {
            return self.transpile(html);
        }
        // A private-use character survives escaping and marks the spot.
        let marked = html.replace(PAGE_NUMBER_PLACEHOLDER, "\u{E000}");
        let markup = self.transpile(&marked)?;
        Ok(markup.replace('\u{E000}', PAGE_COUNTER))
    }

    // ── Blocks ───────────────────────────────────────────────────────────

    fn blocks(&self, nodes: &[Node]) -> String {
        self.block_list(nodes).join("\n\n")
    }

    fn block_list(&self, nodes: &[Node]) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let mut run = String::new();
        for node in nodes {
            match node {
                Node::Element(el) if !is_inline(&el.name) => {
                    flush(&mut run, &mut out);
                    let block = self.block(el);
                    if !block.trim().is_empty() {
                        out.push(block);
                    }
                }
                other => push_inline(&mut run, &self.inline(other)),
            }
        }
        flush(&mut run, &mut out);
        out
    }

    fn block(&self, el: &Element) -> String {
        match el.name.as_str() {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = el.name[1..].parse::<usize>().unwrap_or(1);
                format!("{} {}", "=".repeat(level), self.inlines(&el.children).trim())
            }
            "p" => self.paragraph(el),
            "ul" => self.list(el, None),
            "ol" => {
                let start = el.attr("start").and_then(|s| s.parse::<i64>().ok()).unwrap_or(1);
                self.list(el, Some(start))
            }
            "blockquote" => {
                let class = el.class().unwrap_or("blockquote");
                format!("#styled({})[\n{}\n]", string_literal(class), self.blocks(&el.children))
            }
            "pre" => code_block(el),
            "hr" => "#line(length: 100%)".to_string(),
            "table" => self.table(el),
            "div" => self.div(el),
            "script" | "style" | "head" | "title" | "meta" | "link" => String::new(),
            _ => self.blocks(&el.children),
        }
    }

    fn paragraph(&self, el: &Element) -> String {
        let meaningful: Vec<&Node> = el
            .children
            .iter()
            .filter(|n| !matches!(n, Node::Text(t) if t.trim().is_empty()))
            .collect();
        if let [Node::Element(img)] = meaningful.as_slice() {
            if img.name == "img" {
                return self.image(img, true);
            }
        }
        self.inlines(&el.children).trim().to_string()
    }

    fn list(&self, el: &Element, start: Option<i64>) -> String {
        let items: Vec<&Element> = el
            .children
            .iter()
            .filter_map(|n| match n {
                Node::Element(li) if li.name == "li" => Some(li),
                _ => None,
            })
            .collect();
        let tight = !items.iter().any(|li| {
            li.children
                .iter()
                .any(|n| matches!(n, Node::Element(p) if p.name == "p"))
        });
        let mut args = vec![format!("tight: {tight}")];
        if let Some(start) = start {
            args.push(format!("start: {start}"));
        }
        for li in items {
            args.push(format!("[{}]", self.blocks(&li.children).trim()));
        }
        let func = if start.is_some() { "enum" } else { "list" };
        format!("#{func}({})", args.join(", "))
    }

    fn table(&self, el: &Element) -> String {
        let mut header: Vec<Vec<&Element>> = Vec::new();
        let mut body: Vec<Vec<&Element>> = Vec::new();
        collect_rows(el, false, &mut header, &mut body);
        let columns = header
            .iter()
            .chain(body.iter())
            .map(Vec::len)
            .max()
            .unwrap_or(0)
            .max(1);

        let mut args = vec![format!("columns: {columns}")];
        if el.class().is_some() {
            args.push("stroke: none".to_string());
        }
        let cells = |row: &[&Element]| -> Vec<String> {
            let mut cells: Vec<String> = row.iter().map(|c| self.cell(c)).collect();
            cells.resize(columns, "[]".to_string());
            cells
        };
        if !header.is_empty() {
            let head: Vec<String> = header.iter().flat_map(|r| cells(r.as_slice())).collect();
            args.push(format!("table.header({})", head.join(", ")));
        }
        for row in &body {
            args.extend(cells(row.as_slice()));
        }
        let table = format!("table({})", args.join(", "));
        match el.class() {
            Some(class) => format!("#styled({})[#{table}]", string_literal(class)),
            None => format!("#{table}"),
        }
    }

    fn cell(&self, cell: &Element) -> String {
        let content = self.blocks(&cell.children);
        let content = content.trim();
        let content = if cell.name == "th" {
            format!("#strong[{content}]")
        } else {
            content.to_string()
        };
        match cell.style("text-align").as_deref().and_then(alignment) {
            Some(align) => format!("table.cell(align: {align})[{content}]"),
            None => format!("[{content}]"),
        }
    }

    fn div(&self, el: &Element) -> String {
        if el.has_class(KEEP_TOGETHER_CLASS) {
            return self.keep_together(el);
        }
        let mut inner = self.blocks(&el.children);
        if let Some(align) = el.style("text-align").as_deref().and_then(alignment) {
            inner = format!("#align({align})[\n{inner}\n]");
        }
        match el.class() {
            Some(class) => format!("#styled({})[\n{inner}\n]", string_literal(class)),
            None => inner,
        }
    }

    /// Every block but the last sticks to the one after it. The last block
    /// stays breakable, so a long paragraph still flows across pages.
    fn keep_together(&self, el: &Element) -> String {
        let mut blocks = self.block_list(&el.children);
        let last = blocks.pop();
        let mut out: Vec<String> = blocks
            .into_iter()
            .map(|b| format!("#block(sticky: true)[\n{b}\n]"))
            .collect();
        out.extend(last);
        out.join("\n\n")
    }

    // ── Inlines ──────────────────────────────────────────────────────────

    fn inlines(&self, nodes: &[Node]) -> String {
        let mut out = String::new();
        for node in nodes {
            push_inline(&mut out, &self.inline(node));
        }
        out
    }

    fn inline(&self, node: &Node) -> String {
        let el = match node {
            Node::Text(t) => return escape_markup(&collapse_whitespace(t)),
            Node::Element(el) => el,
        };
        let inner = || self.inlines(&el.children);
        match el.name.as_str() {
            "em" | "i" | "cite" => format!("#emph[{}]", inner()),
            "strong" | "b" => format!("#strong[{}]", inner()),
            "del" | "s" | "strike" => format!("#strike[{}]", inner()),
            "u" | "ins" => format!("#underline[{}]", inner()),
            "mark" => format!("#highlight[{}]", inner()),
            "sup" => format!("#super[{}]", inner()),
            "sub" => format!("#sub[{}]", inner()),
            "small" => format!("#text(size: 0.8em)[{}]", inner()),
            "code" | "kbd" | "samp" => format!("#raw({})", string_literal(&el.text())),
            "br" => "#linebreak()".to_string(),
            "img" => self.image(el, false),
            "input" => checkbox(el),
            "a" => match el.attr("href") {
                Some(href) if is_external(href) => {
                    let text = inner();
                    if text.trim().is_empty() {
                        format!("#link({})", string_literal(href))
                    } else {
                        format!("#link({})[{text}]", string_literal(href))
                    }
                }
                _ => inner(),
            },
            "span" => match el.class() {
                Some(class) => format!("#styled({})[{}]", string_literal(class), inner()),
                None => inner(),
            },
            _ => inner(),
        }
    }

    fn image(&self, el: &Element, standalone: bool) -> String {
        let alt = el.attr("alt").unwrap_or_default();
        let src = el.attr("src").unwrap_or_default();
        match self.resolve_image(src) {
            Some(path) if standalone => {
                format!("#image({}, width: 100%)", string_literal(&path))
            }
            Some(path) => format!("#box(image({}))", string_literal(&path)),
            None => {
                warn!(src, "Image not embedded; using its alt text");
                escape_markup(alt)
            }
        }
    }

    /// Root-relative path (`/a/b.png`) of a local image inside the project.
    fn resolve_image(&self, src: &str) -> Option<String> {
        let root = self.root.as_ref()?;
        if src.is_empty() || is_external(src) || src.starts_with("data:") {
            return None;
        }
        let rel = Path::new(src.trim_start_matches('/'));
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return None;
        }
        let bases = std::iter::once(PathBuf::new()).chain(self.image_dirs.iter().cloned());
        for base in bases {
            let candidate = base.join(rel);
            if root.join(&candidate).is_file() {
                let parts: Vec<String> = candidate
                    .components()
                    .filter_map(|c| match c {
                        Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                        _ => None,
                    })
                    .collect();
                return Some(format!("/{}", parts.join("/")));
            }
        }
        None
    }
}

/// Append inline markup, merging a space at the seam.
fn push_inline(run: &mut String, piece: &str) {
    if run.ends_with(' ') && piece.starts_with(' ') {
        run.push_str(&piece[1..]);
    } else {
        run.push_str(piece);
    }
}

fn flush(run: &mut String, out: &mut Vec<String>) {
    let text = run.trim();
    if !text.is_empty() {
        out.push(text.to_string());
    }
    run.clear();
}

fn is_inline(name: &str) -> bool {
    INLINE.contains(&name)
}

/// Cut `nodes` at every page-break divider, however deeply nested.
///
/// Consecutive parts are separated by one break. Content inside a divider
/// comes before its break. Breaks inside tables are dropped.
fn split_at_page_breaks(nodes: &[Node]) -> Vec<Vec<Node>> {
    let mut parts: Vec<Vec<Node>> = vec![Vec::new()];
    for node in nodes {
        let el = match node {
            Node::Element(el) if is_page_break(el) => {
                append_parts(&mut parts, split_at_page_breaks(&el.children));
                parts.push(Vec::new());
                continue;
            }
            Node::Element(el) if contains_page_break(el) => el,
            other => {
                push_node(&mut parts, other.clone());
                continue;
            }
        };
        if el.name == "table" {
            warn!("Page break inside a table ignored");
            push_node(&mut parts, Node::Element(without_page_breaks(el)));
            continue;
        }
        let pieces = split_element(el);
        append_parts(&mut parts, pieces);
    }
    parts
}

/// Copies of `el`, one per part of its children. Empty copies are left out
/// but still count as parts, so the breaks between them are kept.
fn split_element(el: &Element) -> Vec<Vec<Node>> {
    let mut pieces: Vec<Vec<Node>> = Vec::new();
    let mut items_before = 0;
    for (i, children) in split_at_page_breaks(&el.children).into_iter().enumerate() {
        let mut copy = Element {
            name: el.name.clone(),
            attrs: el.attrs.clone(),
            children,
        };
        if i > 0 && el.name == "li" {
            copy.attrs.push((CONTINUED_ATTR.to_string(), String::new()));
        }
        if i > 0 && el.name == "ol" {
            let start = el.attr("start").and_then(|s| s.parse::<i64>().ok()).unwrap_or(1);
            let continued = first_item(&copy).is_some_and(|li| li.attr(CONTINUED_ATTR).is_some());
            let start = start + items_before - i64::from(continued);
            copy.attrs.retain(|(k, _)| k != "start");
            copy.attrs.push(("start".to_string(), start.to_string()));
        }
        items_before += copy
            .children
            .iter()
            .filter(|n| matches!(n, Node::Element(li) if li.name == "li"))
            .count() as i64;
        if is_blank(&copy.children) {
            pieces.push(Vec::new());
        } else {
            pieces.push(vec![Node::Element(copy)]);
        }
    }
    pieces
}

/// The first part of `more` continues the last part of `parts`.
fn append_parts(parts: &mut Vec<Vec<Node>>, more: Vec<Vec<Node>>) {
    let mut more = more.into_iter();
    if let (Some(first), Some(last)) = (more.next(), parts.last_mut()) {
        last.extend(first);
    }
    parts.extend(more);
}

fn push_node(parts: &mut [Vec<Node>], node: Node) {
    if let Some(last) = parts.last_mut() {
        last.push(node);
    }
}

fn first_item(list: &Element) -> Option<&Element> {
    list.children.iter().find_map(|n| match n {
        Node::Element(li) if li.name == "li" => Some(li),
        _ => None,
    })
}

fn is_blank(nodes: &[Node]) -> bool {
    nodes
        .iter()
        .all(|n| matches!(n, Node::Text(t) if t.trim().is_empty()))
}

fn contains_page_break(el: &Element) -> bool {
    el.children.iter().any(|n| match n {
        Node::Element(child) => is_page_break(child) || contains_page_break(child),
        Node::Text(_) => false,
    })
}

fn without_page_breaks(el: &Element) -> Element {
    let children = el
        .children
        .iter()
        .filter_map(|n| match n {
            Node::Element(child) if is_page_break(child) => None,
            Node::Element(child) => Some(Node::Element(without_page_breaks(child))),
            text => Some(text.clone()),
        })
        .collect();
    Element {
        name: el.name.clone(),
        attrs: el.attrs.clone(),
        children,
    }
}

fn is_page_break(el: &Element) -> bool {
    el.name == "div"
        && el
            .style("page-break-after")
            .or_else(|| el.style("page-break-before"))
            .or_else(|| el.style("break-after"))
            .is_some_and(|v| v.eq_ignore_ascii_case("always") || v.eq_ignore_ascii_case("page"))
}

fn is_external(href: &str) -> bool {
    let lower = href.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("mailto:")
}

fn alignment(css: &str) -> Option<&'static str> {
    match css.trim().to_ascii_lowercase().as_str() {
        "left" => Some("left"),
        "center" => Some("center"),
        "right" => Some("right"),
        _ => None,
    }
}

fn checkbox(el: &Element) -> String {
    if el.attr("type") != Some("checkbox") {
        return String::new();
    }
    if el.attr("checked").is_some() {
        "☑ ".to_string()
    } else {
        "☐ ".to_string()
    }
}

fn code_block(el: &Element) -> String {
    let code = el.children.iter().find_map(|n| match n {
        Node::Element(c) if c.name == "code" => Some(c),
        _ => None,
    });
    let lang = code
        .and_then(|c| c.attr("class"))
        .and_then(|cls| {
            cls.split_whitespace()
                .find_map(|c| c.strip_prefix("language-"))
        })
        .map(str::to_string);
    let text = code.map_or_else(|| el.text(), Element::text);
    let text = text.strip_suffix('\n').unwrap_or(&text);
    match lang {
        Some(lang) => format!(
            "#raw(block: true, lang: {}, {})",
            string_literal(&lang),
            string_literal(text)
        ),
        None => format!("#raw(block: true, {})", string_literal(text)),
    }
}

fn collect_rows<'a>(
    el: &'a Element,
    in_head: bool,
    header: &mut Vec<Vec<&'a Element>>,
    body: &mut Vec<Vec<&'a Element>>,
) {
    for node in &el.children {
        let Node::Element(child) = node else {
            continue;
        };
        match child.name.as_str() {
            "thead" => collect_rows(child, true, header, body),
            "tbody" | "tfoot" => collect_rows(child, false, header, body),
            "tr" => {
                let cells: Vec<&Element> = child
                    .children
                    .iter()
                    .filter_map(|n| match n {
                        Node::Element(c) if c.name == "td" || c.name == "th" => Some(c),
                        _ => None,
                    })
                    .collect();
                if in_head {
                    header.push(cells);
                } else {
                    body.push(cells);
                }
            }
            _ => {}
        }
    }
}

/// Collapse whitespace runs to one space. Non-breaking spaces are kept.
pub fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_whitespace() && c != '\u{00A0}' {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

/// Escape text for Typst markup mode.
pub fn escape_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        if matches!(
            c,
            '\\' | '#' | '*' | '_' | '`' | '$' | '<' | '>' | '@' | '[' | ']' | '~' | '/' | '='
                | '-' | '+' | '.' | '"' | '\'' | '(' | ')' | ';'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Quote a Typst string literal.
pub fn string_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

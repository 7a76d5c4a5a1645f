//! Constrained HTML for interpretation and description text.
//!
//! A fragment is parsed once into a small [`Node`] tree, then a separate
//! layout pass walks the tree and draws onto a [`Canvas`]. Parsing goes
//! through an HTML5 tree builder, so sloppy markup still yields a tree; the
//! plain, word-wrapped fallback is kept for fragments that yield no body.

use std::sync::OnceLock;

use kuchiki::NodeRef;
use kuchiki::traits::TendrilSink;
use regex::{Captures, Regex};

use crate::config::{Rgb, parse_color};
use crate::fonts::FontStyle;

use super::table::{ParsedTable, parse_table, render_table};
use super::{Align, Canvas, Paint, StyledRun, build_lines, render_lines, split_text, text_width};

/// Fixed pitch between rich-text lines, in millimetres.
pub const LINE_HEIGHT: f32 = 5.0;
/// Font size of unstyled rich text.
pub const BASE_FONT_SIZE: f32 = 9.0;

/// Styles understood from a `style="..."` attribute. Lengths are already
/// converted by [`parse_css_unit`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InlineStyle {
    pub color: Option<Rgb>,
    pub background_color: Option<Rgb>,
    pub bold: Option<bool>,
    pub italic: Option<bool>,
    pub font_size: Option<f32>,
    pub text_align: Option<Align>,
    pub margin: Option<f32>,
    pub padding: Option<f32>,
    pub border_width: Option<f32>,
    pub border_color: Option<Rgb>,
    pub width: Option<f32>,
    pub height: Option<f32>,
}

/// Converts a CSS length: `pt` as is, `px` x 0.75, `em`/`rem` x `base_font_size`,
/// `%` x `base_font_size / 100`. A bare number counts as `px`, an unknown unit
/// yields the raw number and anything malformed yields 0.
pub fn parse_css_unit(value: &str, base_font_size: f32) -> f32 {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(\d+(?:\.\d+)?|\.\d+)\s*([a-z%]*)\s*$").expect("valid regex")
    });
    let Some(caps) = re.captures(value) else {
        return 0.0;
    };
    let num: f32 = caps[1].parse().unwrap_or(0.0);
    match caps[2].to_ascii_lowercase().as_str() {
        "pt" => num,
        "" | "px" => num * 0.75,
        "em" | "rem" => num * base_font_size,
        "%" => num / 100.0 * base_font_size,
        _ => num,
    }
}

fn parse_weight(value: &str) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "bold" | "bolder" => true,
        other => other.parse::<u32>().is_ok_and(|w| w >= 600),
    }
}

/// Parses the declarations of a `style` attribute. Unknown properties and
/// colours that do not parse are ignored.
pub fn parse_inline_css(style_attr: &str) -> InlineStyle {
    let mut style = InlineStyle::default();
    for declaration in style_attr.split(';') {
        let Some((property, value)) = declaration.split_once(':') else {
            continue;
        };
        let (property, value) = (property.trim().to_ascii_lowercase(), value.trim());
        if property.is_empty() || value.is_empty() {
            continue;
        }
        let length = || parse_css_unit(value, BASE_FONT_SIZE);
        match property.as_str() {
            "color" => style.color = parse_color(value),
            "background-color" | "background" => style.background_color = parse_color(value),
            "font-weight" => style.bold = Some(parse_weight(value)),
            "font-style" => style.italic = Some(value.eq_ignore_ascii_case("italic")),
            "font-size" => style.font_size = Some(length()),
            "text-align" => {
                style.text_align = Some(match value.to_ascii_lowercase().as_str() {
                    "center" => Align::Center,
                    "right" => Align::Right,
                    _ => Align::Left,
                })
            }
            "margin" => style.margin = Some(length()),
            "padding" => style.padding = Some(length()),
            "border-width" => style.border_width = Some(length()),
            "border-color" => style.border_color = parse_color(value),
            "border" => {
                for part in value.split_whitespace() {
                    if part.starts_with(|c: char| c.is_ascii_digit()) {
                        style.border_width = Some(parse_css_unit(part, BASE_FONT_SIZE));
                    } else if matches!(part, "solid" | "dashed" | "dotted") {
                        continue;
                    } else if let Some(color) = parse_color(part) {
                        style.border_color = Some(color);
                    }
                }
            }
            "width" => style.width = Some(length()),
            "height" => style.height = Some(length()),
            _ => {}
        }
    }
    style
}

fn entity(name: &str) -> Option<&'static str> {
    Some(match name {
        "lt" => "<",
        "gt" => ">",
        "amp" => "&",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" => " ",
        "ge" => "\u{2265}",
        "le" => "\u{2264}",
        "ne" => "\u{2260}",
        "plusmn" => "\u{00B1}",
        "times" => "\u{00D7}",
        "divide" => "\u{00F7}",
        "deg" => "\u{00B0}",
        "micro" => "\u{00B5}",
        "alpha" => "\u{03B1}",
        "beta" => "\u{03B2}",
        "gamma" => "\u{03B3}",
        "delta" => "\u{03B4}",
        "omega" => "\u{03C9}",
        _ => return None,
    })
}

fn numeric_entity(body: &str) -> Option<char> {
    let code = match body.strip_prefix(['x', 'X']) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => body.parse::<u32>().ok()?,
    };
    char::from_u32(code).filter(|c| *c != '\0')
}

fn entity_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"&(#?[a-zA-Z0-9]+);").expect("valid regex"))
}

/// Replaces the known named and numeric entities. Anything else passes
/// through unchanged.
pub fn decode_entities(text: &str) -> String {
    entity_re()
        .replace_all(text, |caps: &Captures| {
            let body = &caps[1];
            if let Some(num) = body.strip_prefix('#') {
                if let Some(c) = numeric_entity(num) {
                    return c.to_string();
                }
            } else if let Some(s) = entity(body) {
                return s.to_string();
            }
            caps[0].to_string()
        })
        .into_owned()
}

/// Tags stripped, entities decoded.
pub fn strip_tags(html: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid regex"));
    decode_entities(&re.replace_all(html, ""))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementKind {
    Heading(u8),
    Paragraph,
    Div,
    List { ordered: bool },
    ListItem,
    Bold,
    Italic,
    /// Any other inline container (`span`, `u`, `a`, ...).
    Span,
}

impl ElementKind {
    fn from_tag(tag: &str) -> Self {
        match tag {
            "h1" => ElementKind::Heading(1),
            "h2" => ElementKind::Heading(2),
            "h3" => ElementKind::Heading(3),
            "h4" => ElementKind::Heading(4),
            "h5" => ElementKind::Heading(5),
            "h6" => ElementKind::Heading(6),
            "p" => ElementKind::Paragraph,
            "div" => ElementKind::Div,
            "ul" => ElementKind::List { ordered: false },
            "ol" => ElementKind::List { ordered: true },
            "li" => ElementKind::ListItem,
            "b" | "strong" => ElementKind::Bold,
            "i" | "em" => ElementKind::Italic,
            _ => ElementKind::Span,
        }
    }

    fn is_block(self) -> bool {
        matches!(
            self,
            ElementKind::Heading(_)
                | ElementKind::Paragraph
                | ElementKind::Div
                | ElementKind::List { .. }
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Text(String),
    Break,
    Element {
        kind: ElementKind,
        style: InlineStyle,
        children: Vec<Node>,
    },
    Table(ParsedTable),
}

impl Node {
    /// True when the node would put anything visible on the page.
    fn has_content(&self) -> bool {
        match self {
            Node::Text(t) => !t.trim().is_empty(),
            Node::Break | Node::Table(_) => true,
            Node::Element { children, .. } => children.iter().any(Node::has_content),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Fragment {
    Markup(Vec<Node>),
    /// The fragment did not parse; tags are stripped and the text wraps plainly.
    Plain(String),
}

/// Tag name of an element node; the tree builder has already lower-cased it.
pub(super) fn element_name(node: &NodeRef) -> Option<String> {
    node.as_element().map(|e| e.name.local.to_string())
}

pub(super) fn attribute(node: &NodeRef, name: &str) -> Option<String> {
    let element = node.as_element()?;
    let attrs = element.attributes.borrow();
    attrs.get(name).map(str::to_string)
}

/// Text of a text node. Non-breaking spaces become plain spaces so that
/// wrapping treats them like any other gap.
pub(super) fn text_content(node: &NodeRef) -> Option<String> {
    node.as_text().map(|t| t.borrow().replace('\u{a0}', " "))
}

fn convert(node: &NodeRef) -> Option<Node> {
    if let Some(text) = text_content(node) {
        return Some(Node::Text(text));
    }
    let tag = element_name(node)?;
    match tag.as_str() {
        "br" => Some(Node::Break),
        "table" => Some(Node::Table(parse_table(node))),
        "script" | "style" | "head" | "title" | "template" => None,
        _ => Some(Node::Element {
            kind: ElementKind::from_tag(&tag),
            style: parse_inline_css(&attribute(node, "style").unwrap_or_default()),
            children: node.children().filter_map(|c| convert(&c)).collect(),
        }),
    }
}

/// Parses a fragment into nodes, or the plain-text fallback.
///
/// The HTML5 tree builder recovers from unclosed tags, stray `<` and bare
/// attributes the way a browser does, so only a document without a body
/// ends up as plain text.
pub fn parse_fragment(html: &str) -> Fragment {
    let document = kuchiki::parse_html().one(html);
    match document.select_first("body") {
        Ok(body) => Fragment::Markup(body.as_node().children().filter_map(|c| convert(&c)).collect()),
        Err(()) => {
            log::debug!("rich text has no body, using plain text");
            Fragment::Plain(strip_tags(html))
        }
    }
}

#[derive(Clone, Copy)]
struct TextStyle {
    bold: bool,
    italic: bool,
    size: f32,
    color: Rgb,
}

impl TextStyle {
    fn base() -> Self {
        TextStyle {
            bold: false,
            italic: false,
            size: BASE_FONT_SIZE,
            color: [0, 0, 0],
        }
    }

    fn font(&self) -> FontStyle {
        FontStyle::from_flags(self.bold, self.italic)
    }

    /// Tag defaults first, then whatever the inline CSS sets.
    fn apply(mut self, kind: ElementKind, css: &InlineStyle) -> Self {
        match kind {
            ElementKind::Heading(level) => {
                self.bold = true;
                self.size = match level {
                    1 => 14.0,
                    2 => 12.0,
                    3 => 11.0,
                    _ => 10.0,
                };
            }
            ElementKind::Bold => self.bold = true,
            ElementKind::Italic => self.italic = true,
            _ => {}
        }
        if let Some(bold) = css.bold {
            self.bold = bold;
        }
        if let Some(italic) = css.italic {
            self.italic = italic;
        }
        if let Some(size) = css.font_size.filter(|s| *s > 0.0) {
            self.size = size;
        }
        if let Some(color) = css.color {
            self.color = color;
        }
        self
    }
}

struct Flow<'c> {
    canvas: &'c mut Canvas,
    left: f32,
    max_width: f32,
    /// Pen position relative to `left` on the current line.
    cursor_x: f32,
    y: f32,
    pending_space: bool,
}

impl Flow<'_> {
    fn newline(&mut self) {
        self.y += LINE_HEIGHT;
        self.cursor_x = 0.0;
        self.pending_space = false;
    }

    fn text_segment(&mut self, text: &str, style: TextStyle) {
        if text.trim().is_empty() {
            if !text.is_empty() && self.cursor_x > 0.0 {
                self.pending_space = true;
            }
            return;
        }
        let font = style.font();
        if self.cursor_x > 0.0 && (self.pending_space || text.starts_with(char::is_whitespace)) {
            self.cursor_x += text_width(" ", font, style.size);
        }
        let run = StyledRun {
            text: text.to_string(),
            style: font,
            size: style.size,
            color: style.color,
        };
        let lines = build_lines(std::slice::from_ref(&run), self.max_width, self.cursor_x);
        let last = lines.len() - 1;
        for (i, line) in lines.iter().enumerate() {
            if i > 0 {
                self.y += LINE_HEIGHT;
            }
            render_lines(
                self.canvas,
                std::slice::from_ref(line),
                self.left,
                self.max_width,
                self.y,
                LINE_HEIGHT,
                Align::Left,
            );
            if i == last {
                self.cursor_x = line.total_width;
            }
        }
        self.pending_space = text.ends_with(char::is_whitespace);
    }

    fn text(&mut self, text: &str, style: TextStyle) {
        let segments: Vec<&str> = text.split('\n').collect();
        let first = segments.iter().position(|s| !s.trim().is_empty());
        let last = segments.iter().rposition(|s| !s.trim().is_empty());
        let (Some(first), Some(last)) = (first, last) else {
            self.text_segment(text, style);
            return;
        };
        for (i, segment) in segments[first..=last].iter().enumerate() {
            if i > 0 {
                self.newline();
            }
            self.text_segment(segment, style);
        }
        if text.ends_with(char::is_whitespace) && self.cursor_x > 0.0 {
            self.pending_space = true;
        }
    }

    fn walk(&mut self, node: &Node, style: TextStyle, list_index: Option<usize>) {
        match node {
            Node::Text(t) => self.text(t, style),
            Node::Break => self.newline(),
            Node::Table(table) => {
                self.y = render_table(self.canvas, table, self.left, self.y, self.max_width);
                self.cursor_x = 0.0;
                self.pending_space = false;
            }
            Node::Element {
                kind,
                style: css,
                children,
            } => self.element(*kind, css, children, style, list_index),
        }
    }

    fn element(
        &mut self,
        kind: ElementKind,
        css: &InlineStyle,
        children: &[Node],
        inherited: TextStyle,
        list_index: Option<usize>,
    ) {
        let style = inherited.apply(kind, css);
        let non_empty = children.iter().any(Node::has_content);

        match kind {
            ElementKind::Heading(_) | ElementKind::Paragraph | ElementKind::Div if non_empty => {
                self.newline();
            }
            ElementKind::List { .. } => {
                self.y += 2.0;
                self.cursor_x = 0.0;
                self.pending_space = false;
            }
            ElementKind::ListItem => {
                let marker = match list_index {
                    Some(n) => format!("{n}. "),
                    None => "\u{2022} ".to_string(),
                };
                self.canvas.draw_run(
                    &marker,
                    self.left,
                    self.y + LINE_HEIGHT,
                    style.font(),
                    style.size,
                    style.color,
                );
                self.cursor_x = text_width(&marker, style.font(), style.size);
                self.y += LINE_HEIGHT;
                self.pending_space = false;
            }
            _ => {}
        }

        if kind == ElementKind::Div {
            if let Some(bg) = css.background_color {
                let band = LINE_HEIGHT * 1.2;
                self.canvas.set_fill_color(bg);
                self.canvas
                    .rect(self.left, self.y - band + 2.0, self.max_width, band, Paint::Fill);
            }
        }

        let ordered = matches!(kind, ElementKind::List { ordered: true });
        let mut item = 0;
        for child in children {
            let index = match child {
                Node::Element {
                    kind: ElementKind::ListItem,
                    ..
                } if ordered => {
                    item += 1;
                    Some(item)
                }
                _ => None,
            };
            self.walk(child, style, index);
        }

        if kind.is_block() {
            if non_empty {
                self.y += css.margin.filter(|m| *m > 0.0).unwrap_or(2.0);
            }
            self.cursor_x = 0.0;
            self.pending_space = false;
        }
    }
}

/// Lays out an HTML fragment with its first baseline at `y`.
/// Returns the y cursor after the last line so callers can continue below.
pub fn render_inline_content(canvas: &mut Canvas, html: &str, x: f32, y: f32, max_width: f32) -> f32 {
    match parse_fragment(html) {
        Fragment::Markup(nodes) => {
            let mut flow = Flow {
                canvas,
                left: x,
                max_width,
                cursor_x: 0.0,
                y,
                pending_space: false,
            };
            for node in &nodes {
                flow.walk(node, TextStyle::base(), None);
            }
            flow.y
        }
        Fragment::Plain(text) => {
            let lines = split_text(&text, FontStyle::Normal, BASE_FONT_SIZE, max_width);
            for (i, line) in lines.iter().enumerate() {
                canvas.draw_run(
                    line,
                    x,
                    y + i as f32 * LINE_HEIGHT,
                    FontStyle::Normal,
                    BASE_FONT_SIZE,
                    [0, 0, 0],
                );
            }
            y + lines.len() as f32 * LINE_HEIGHT
        }
    }
}

/// Height a fragment occupies when laid out at `max_width`, measured on a
/// scratch canvas.
pub fn measure_inline_content(canvas: &Canvas, html: &str, max_width: f32) -> f32 {
    let mut scratch = canvas.scratch();
    render_inline_content(&mut scratch, html, 0.0, 0.0, max_width)
}

use crate::error::FolioError;
use crate::fragment::{Heading, HeadingLevel, PILCROW, strip_pilcrow};
use crate::source::Source;
use crate::types::{Color, LayoutOptions};
use kuchiki::traits::TendrilSink;
use kuchiki::{NodeData, NodeRef};
use lopdf::content::{Content, Operation};
use lopdf::{Document as LoDocument, Object as LoObject, Stream as LoStream, StringFormat, dictionary};
use std::path::Path;

/// What a renderer reports about a source besides the artifact it wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedSource {
    pub title: String,
    pub headings: Vec<Heading>,
}

/// Turns one HTML source into a paginated PDF at `out`.
pub trait Renderer: Send + Sync {
    fn render(
        &self,
        source: &Source,
        layout: &LayoutOptions,
        out: &Path,
    ) -> Result<RenderedSource, FolioError>;
}

/// Small block-flow HTML renderer: text only, Helvetica/Courier, greedy word
/// wrap. Good enough for prose documents and for the generated contents page.
#[derive(Debug, Clone)]
pub struct FlowRenderer {
    pub base_font_size: f32,
    pub line_height: f32,
}

impl Default for FlowRenderer {
    fn default() -> Self {
        Self {
            base_font_size: 11.0,
            line_height: 1.3,
        }
    }
}

impl Renderer for FlowRenderer {
    fn render(
        &self,
        source: &Source,
        layout: &LayoutOptions,
        out: &Path,
    ) -> Result<RenderedSource, FolioError> {
        let html = match source {
            Source::File(path) => {
                let bytes = std::fs::read(path)
                    .map_err(|err| FolioError::render(source.url(), err.to_string()))?;
                String::from_utf8_lossy(&bytes).into_owned()
            }
            Source::Url(url) => {
                return Err(FolioError::render(
                    url.clone(),
                    "remote sources need a browser-backed renderer",
                ));
            }
        };
        self.render_html(&html, layout, out)
            .map_err(|err| match err {
                FolioError::Render { .. } => err,
                other => FolioError::render(source.url(), other.to_string()),
            })
    }
}

impl FlowRenderer {
    pub fn render_html(
        &self,
        html: &str,
        layout: &LayoutOptions,
        out: &Path,
    ) -> Result<RenderedSource, FolioError> {
        let document = kuchiki::parse_html().one(html);
        let title = document
            .select_first("title")
            .map(|node| collapse_whitespace(&node.as_node().text_contents()))
            .unwrap_or_default();
        let headings = discover_headings(&document);

        let blocks = collect_blocks(&document, self.base_font_size);
        let pages = self.layout_blocks(&blocks, layout);
        let background = if layout.print_background {
            body_background(&document)
        } else {
            None
        };
        write_pdf(&pages, layout, background, out)?;

        log::debug!(
            "rendered {} blocks onto {} pages ({})",
            blocks.len(),
            pages.len(),
            out.display()
        );
        Ok(RenderedSource { title, headings })
    }

    fn layout_blocks(&self, blocks: &[Block], layout: &LayoutOptions) -> Vec<Vec<DrawnText>> {
        let mut pages: Vec<Vec<DrawnText>> = Vec::new();
        let mut page: Vec<DrawnText> = Vec::new();
        let mut cursor = 0.0f32;
        let content_height = layout.content_height();
        let left = layout.margins.left;
        let right_edge = layout.page_size.width - layout.margins.right;
        let top = layout.page_size.height - layout.margins.top;

        for block in blocks {
            let style = &block.style;
            let line_height = style.size * self.line_height;
            if cursor > 0.0 {
                cursor += style.space_before;
            }
            let avail = (layout.content_width() - style.indent).max(style.size);
            let trailing_width = block
                .trailing
                .as_deref()
                .map(|t| text_width(t, FontFace::Regular, style.size) + style.size)
                .unwrap_or(0.0);
            let lines = wrap_block(block, avail, trailing_width);

            for (idx, line) in lines.iter().enumerate() {
                if cursor + line_height > content_height && cursor > 0.0 {
                    pages.push(std::mem::take(&mut page));
                    cursor = 0.0;
                }
                let baseline = top - cursor - style.size;
                let width = text_width(line, style.face, style.size);
                let x = if style.centered {
                    left + style.indent + ((avail - width) / 2.0).max(0.0)
                } else {
                    left + style.indent
                };
                if !line.is_empty() {
                    page.push(DrawnText {
                        face: style.face,
                        size: style.size,
                        x,
                        y: baseline,
                        text: line.clone(),
                    });
                }
                if let (0, Some(trailing)) = (idx, block.trailing.as_deref()) {
                    let w = text_width(trailing, FontFace::Regular, style.size);
                    page.push(DrawnText {
                        face: FontFace::Regular,
                        size: style.size,
                        x: right_edge - w,
                        y: baseline,
                        text: trailing.to_string(),
                    });
                }
                cursor += line_height;
            }
            cursor += style.space_after;
        }
        pages.push(page);
        pages
    }
}

fn discover_headings(document: &NodeRef) -> Vec<Heading> {
    let Ok(nodes) = document.select("h1, h2") else {
        return Vec::new();
    };
    nodes
        .map(|node| {
            let tag: &str = node.name.local.as_ref();
            let level = HeadingLevel::from_tag(tag);
            let text = collapse_whitespace(&strip_pilcrow(&node.as_node().text_contents()));
            Heading::new(level, &text)
        })
        .collect()
}

fn body_background(document: &NodeRef) -> Option<Color> {
    let body = document.select_first("body").ok()?;
    let attrs = body.attributes.borrow();
    let decls = parse_declarations(attrs.get("style")?);
    decls
        .iter()
        .find(|(k, _)| k == "background-color" || k == "background")
        .and_then(|(_, v)| Color::from_hex(v))
}

// ---------------------------------------------------------------------------
// Block collection

// Placeholder for `<br>` until a block is flushed; raw text newlines are
// ordinary whitespace.
const LINE_BREAK: char = '\u{2028}';

const SKIPPED_TAGS: &[&str] = &["head", "script", "style", "title", "noscript", "template"];

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "body", "dd", "div", "dl", "dt", "figcaption",
    "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "html", "li",
    "main", "nav", "ol", "p", "pre", "section", "table", "tbody", "tfoot", "thead", "tr", "ul",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FontFace {
    Regular,
    Bold,
    Mono,
}

impl FontFace {
    fn resource_name(&self) -> &'static [u8] {
        match self {
            FontFace::Regular => b"F1",
            FontFace::Bold => b"F2",
            FontFace::Mono => b"F3",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct BlockStyle {
    face: FontFace,
    size: f32,
    root_size: f32,
    indent: f32,
    centered: bool,
    preformatted: bool,
    heading: bool,
    space_before: f32,
    space_after: f32,
    prefix: Option<&'static str>,
}

impl BlockStyle {
    fn root(size: f32) -> Self {
        Self {
            face: FontFace::Regular,
            size,
            root_size: size,
            indent: 0.0,
            centered: false,
            preformatted: false,
            heading: false,
            space_before: 0.0,
            space_after: 0.0,
            prefix: None,
        }
    }

    fn for_element(&self, tag: &str, inline_style: Option<&str>) -> Self {
        let mut style = BlockStyle {
            space_before: 0.0,
            space_after: 0.0,
            prefix: None,
            heading: false,
            ..self.clone()
        };
        let root = self.root_size;
        match tag {
            "h1" => style.heading_of(root * 24.0 / 11.0),
            "h2" => style.heading_of(root * 18.0 / 11.0),
            "h3" => style.heading_of(root * 14.0 / 11.0),
            "h4" | "h5" | "h6" => style.heading_of(root),
            "p" | "dl" | "table" => {
                style.space_before = style.size * 0.5;
                style.space_after = style.size * 0.5;
            }
            "ul" | "ol" => style.indent += style.size * 1.5,
            "blockquote" | "dd" => style.indent += style.size * 2.0,
            "li" => style.prefix = Some("\u{2022} "),
            "pre" => {
                style.face = FontFace::Mono;
                style.preformatted = true;
                style.space_before = style.size * 0.5;
                style.space_after = style.size * 0.5;
            }
            _ => {}
        }
        if let Some(raw) = inline_style {
            for (key, value) in parse_declarations(raw) {
                match key.as_str() {
                    "margin-left" => {
                        if let Some(v) = parse_length(&value, style.size, root) {
                            style.indent += v;
                        }
                    }
                    "font-size" => {
                        if let Some(v) = parse_font_size(&value, style.size, root) {
                            style.size = v;
                        }
                    }
                    "text-align" => style.centered = value == "center",
                    "font-weight" => {
                        if value == "bold" || value == "700" {
                            style.face = FontFace::Bold;
                        }
                    }
                    _ => {}
                }
            }
        }
        style
    }

    fn heading_of(&mut self, size: f32) {
        self.face = FontFace::Bold;
        self.size = size;
        self.heading = true;
        self.space_before = size * 0.6;
        self.space_after = size * 0.3;
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Block {
    text: String,
    trailing: Option<String>,
    style: BlockStyle,
}

#[derive(Debug, Default)]
struct InlineText {
    text: String,
    trailing: String,
}

impl InlineText {
    fn is_blank(&self) -> bool {
        self.text.trim().is_empty() && self.trailing.trim().is_empty()
    }
}

fn element_tag(node: &NodeRef) -> Option<String> {
    node.as_element()
        .map(|el| el.name.local.as_ref().to_ascii_lowercase())
}

fn inline_style(node: &NodeRef) -> Option<String> {
    node.as_element()
        .and_then(|el| el.attributes.borrow().get("style").map(str::to_string))
}

fn is_block_tag(tag: &str) -> bool {
    BLOCK_TAGS.contains(&tag)
}

fn has_block_descendant(node: &NodeRef) -> bool {
    node.descendants()
        .filter_map(|n| element_tag(&n))
        .any(|tag| is_block_tag(&tag))
}

fn is_hidden(style: Option<&str>) -> bool {
    style
        .map(|raw| {
            parse_declarations(raw)
                .iter()
                .any(|(k, v)| k == "display" && v == "none")
        })
        .unwrap_or(false)
}

fn collect_blocks(document: &NodeRef, base_size: f32) -> Vec<Block> {
    let root = BlockStyle::root(base_size);
    let mut out = Vec::new();
    let mut pending = InlineText::default();
    walk_container(document, &root, &mut pending, &mut out);
    flush_inline(&mut pending, &root, &mut out);
    out
}

fn walk_container(node: &NodeRef, style: &BlockStyle, pending: &mut InlineText, out: &mut Vec<Block>) {
    for child in node.children() {
        if let Some(text) = child.as_text() {
            pending.text.push_str(&text.borrow());
            continue;
        }
        let Some(tag) = element_tag(&child) else {
            continue;
        };
        let css = inline_style(&child);
        if SKIPPED_TAGS.contains(&tag.as_str()) || is_hidden(css.as_deref()) {
            continue;
        }
        if !is_block_tag(&tag) {
            collect_inline(&child, pending);
            continue;
        }
        flush_inline(pending, style, out);
        let child_style = style.for_element(&tag, css.as_deref());
        if has_block_descendant(&child) {
            walk_container(&child, &child_style, pending, out);
            flush_inline(pending, &child_style, out);
        } else {
            let mut inline = InlineText::default();
            collect_inline(&child, &mut inline);
            flush_inline(&mut inline, &child_style, out);
        }
    }
}

fn collect_inline(node: &NodeRef, out: &mut InlineText) {
    for child in node.children() {
        match child.data() {
            NodeData::Text(text) => out.text.push_str(&text.borrow()),
            NodeData::Element(_) => {
                let tag = element_tag(&child).unwrap_or_default();
                let css = inline_style(&child);
                if SKIPPED_TAGS.contains(&tag.as_str()) || is_hidden(css.as_deref()) {
                    continue;
                }
                let floats_right = css
                    .as_deref()
                    .map(|raw| {
                        parse_declarations(raw)
                            .iter()
                            .any(|(k, v)| k == "float" && v == "right")
                    })
                    .unwrap_or(false);
                if floats_right {
                    out.trailing.push(' ');
                    out.trailing.push_str(&child.text_contents());
                    continue;
                }
                match tag.as_str() {
                    "br" => out.text.push(LINE_BREAK),
                    "td" | "th" => out.text.push(' '),
                    _ => {}
                }
                collect_inline(&child, out);
            }
            _ => {}
        }
    }
}

fn flush_inline(inline: &mut InlineText, style: &BlockStyle, out: &mut Vec<Block>) {
    if inline.is_blank() {
        *inline = InlineText::default();
        return;
    }
    let raw = std::mem::take(&mut inline.text);
    let trailing = collapse_whitespace(&std::mem::take(&mut inline.trailing));
    let mut text = if style.preformatted {
        raw.replace(LINE_BREAK, "\n").trim_matches('\n').to_string()
    } else {
        raw.split(LINE_BREAK)
            .map(collapse_whitespace)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    };
    if style.heading {
        text = text
            .split('\n')
            .map(|line| collapse_whitespace(&line.replace(PILCROW, "")))
            .collect::<Vec<_>>()
            .join("\n");
    }
    if let Some(prefix) = style.prefix {
        text.insert_str(0, prefix);
    }
    out.push(Block {
        text,
        trailing: (!trailing.is_empty()).then_some(trailing),
        style: style.clone(),
    });
}

pub(crate) fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_declarations(raw: &str) -> Vec<(String, String)> {
    raw.split(';')
        .filter_map(|decl| {
            let (key, value) = decl.split_once(':')?;
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim().to_ascii_lowercase();
            (!key.is_empty()).then_some((key, value))
        })
        .collect()
}

fn parse_length(value: &str, font_size: f32, root_size: f32) -> Option<f32> {
    let value = value.trim();
    if let Some(n) = value.strip_suffix("rem") {
        return n.trim().parse::<f32>().ok().map(|v| v * root_size);
    }
    if let Some(n) = value.strip_suffix("em") {
        return n.trim().parse::<f32>().ok().map(|v| v * font_size);
    }
    if let Some(n) = value.strip_suffix("pt") {
        return n.trim().parse::<f32>().ok();
    }
    if let Some(n) = value.strip_suffix("px") {
        return n.trim().parse::<f32>().ok().map(|v| v * 0.75);
    }
    value.parse::<f32>().ok().filter(|v| *v == 0.0)
}

fn parse_font_size(value: &str, current: f32, root_size: f32) -> Option<f32> {
    match value {
        "larger" => Some(current * 1.2),
        "smaller" => Some(current / 1.2),
        _ => parse_length(value, current, root_size).filter(|v| *v > 0.0),
    }
}

// ---------------------------------------------------------------------------
// Line breaking

// Helvetica advance widths for U+0020..U+007E, in 1/1000 em.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, 556, 556, 556,
    556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, 1015, 667, 667, 722, 722, 667,
    611, 778, 722, 278, 500, 667, 556, 833, 722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667,
    667, 611, 278, 278, 278, 469, 556, 333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500,
    222, 833, 556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

fn glyph_width(ch: char, face: FontFace) -> f32 {
    let base = match face {
        FontFace::Mono => return 600.0,
        _ => match ch as u32 {
            0x20..=0x7e => HELVETICA_WIDTHS[(ch as u32 - 0x20) as usize] as f32,
            _ => 556.0,
        },
    };
    if face == FontFace::Bold { base * 1.08 } else { base }
}

fn text_width(text: &str, face: FontFace, size: f32) -> f32 {
    text.chars().map(|ch| glyph_width(ch, face)).sum::<f32>() * size / 1000.0
}

fn wrap_block(block: &Block, avail: f32, first_line_reserve: f32) -> Vec<String> {
    let style = &block.style;
    let mut lines = Vec::new();
    let paragraphs: Vec<&str> = if style.preformatted {
        block.text.split('\n').collect()
    } else {
        block.text.split('\n').map(str::trim).collect()
    };
    for paragraph in paragraphs {
        let reserve = if lines.is_empty() { first_line_reserve } else { 0.0 };
        if style.preformatted {
            lines.extend(break_chars(paragraph.trim_end(), style.face, style.size, avail));
            continue;
        }
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let limit = if lines.is_empty() { avail - reserve } else { avail };
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{current} {word}")
            };
            if text_width(&candidate, style.face, style.size) <= limit || current.is_empty() {
                if current.is_empty() && text_width(word, style.face, style.size) > limit {
                    let mut pieces = break_chars(word, style.face, style.size, limit);
                    current = pieces.pop().unwrap_or_default();
                    lines.extend(pieces);
                } else {
                    current = candidate;
                }
            } else {
                lines.push(std::mem::take(&mut current));
                let limit = avail;
                if text_width(word, style.face, style.size) > limit {
                    let mut pieces = break_chars(word, style.face, style.size, limit);
                    current = pieces.pop().unwrap_or_default();
                    lines.extend(pieces);
                } else {
                    current = word.to_string();
                }
            }
        }
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

fn break_chars(text: &str, face: FontFace, size: f32, avail: f32) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut width = 0.0f32;
    for ch in text.chars() {
        let w = glyph_width(ch, face) * size / 1000.0;
        if width + w > avail && !current.is_empty() {
            out.push(std::mem::take(&mut current));
            width = 0.0;
        }
        current.push(ch);
        width += w;
    }
    out.push(current);
    out
}

// ---------------------------------------------------------------------------
// PDF output

#[derive(Debug, Clone, PartialEq)]
struct DrawnText {
    face: FontFace,
    size: f32,
    x: f32,
    y: f32,
    text: String,
}

/// Encodes text for a WinAnsiEncoding simple font; unmappable chars become `?`.
pub(crate) fn win_ansi_bytes(text: &str) -> Vec<u8> {
    text.chars()
        .map(|ch| match ch as u32 {
            0x20..=0x7e | 0xa0..=0xff => ch as u32 as u8,
            0x2022 => 0x95,
            0x2013 => 0x96,
            0x2014 => 0x97,
            0x2018 => 0x91,
            0x2019 => 0x92,
            0x201c => 0x93,
            0x201d => 0x94,
            0x2026 => 0x85,
            0x20ac => 0x80,
            0x2122 => 0x99,
            0x09 => b' ',
            _ => b'?',
        })
        .collect()
}

fn font_object(base_font: &str) -> lopdf::Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => base_font,
        "Encoding" => "WinAnsiEncoding",
    }
}

fn page_operations(texts: &[DrawnText], layout: &LayoutOptions, background: Option<Color>) -> Vec<Operation> {
    let mut ops = Vec::new();
    if let Some(bg) = background {
        ops.push(Operation::new("q", vec![]));
        ops.push(Operation::new("rg", vec![bg.r.into(), bg.g.into(), bg.b.into()]));
        ops.push(Operation::new(
            "re",
            vec![
                0.into(),
                0.into(),
                layout.page_size.width.into(),
                layout.page_size.height.into(),
            ],
        ));
        ops.push(Operation::new("f", vec![]));
        ops.push(Operation::new("Q", vec![]));
    }
    for text in texts {
        // One text object per line keeps extracted text line-faithful.
        ops.push(Operation::new("BT", vec![]));
        ops.push(Operation::new(
            "Tf",
            vec![
                LoObject::Name(text.face.resource_name().to_vec()),
                text.size.into(),
            ],
        ));
        ops.push(Operation::new("rg", vec![0.into(), 0.into(), 0.into()]));
        ops.push(Operation::new(
            "Tm",
            vec![1.into(), 0.into(), 0.into(), 1.into(), text.x.into(), text.y.into()],
        ));
        ops.push(Operation::new(
            "Tj",
            vec![LoObject::String(win_ansi_bytes(&text.text), StringFormat::Literal)],
        ));
        ops.push(Operation::new("ET", vec![]));
    }
    ops
}

fn write_pdf(
    pages: &[Vec<DrawnText>],
    layout: &LayoutOptions,
    background: Option<Color>,
    out: &Path,
) -> Result<(), FolioError> {
    let mut doc = LoDocument::with_version("1.7");
    let pages_id = doc.new_object_id();
    let regular = doc.add_object(font_object("Helvetica"));
    let bold = doc.add_object(font_object("Helvetica-Bold"));
    let mono = doc.add_object(font_object("Courier"));
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => regular, "F2" => bold, "F3" => mono },
    });

    let mut kids: Vec<LoObject> = Vec::with_capacity(pages.len().max(1));
    let empty: Vec<DrawnText> = Vec::new();
    let page_list: Vec<&Vec<DrawnText>> = if pages.is_empty() {
        vec![&empty]
    } else {
        pages.iter().collect()
    };
    for texts in page_list {
        let content = Content {
            operations: page_operations(texts, layout, background),
        };
        let mut data = content.encode()?;
        data.push(b'\n');
        let content_id = doc.add_object(LoStream::new(dictionary! {}, data));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![
                0.into(),
                0.into(),
                layout.page_size.width.into(),
                layout.page_size.height.into(),
            ],
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        LoObject::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();
    doc.save(out)?;
    Ok(())
}

use crate::error::FolioError;
use crate::fragment::{Fragment, FragmentKind, HeadingLevel};
use crate::render::Renderer;
use crate::source::Source;
use crate::types::LayoutOptions;
use std::path::Path;

pub const TOC_TITLE: &str = "Table of Contents";

/// One row of the table of contents with its page in the final document,
/// counted from the first body page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    pub level: HeadingLevel,
    pub text: String,
    pub page: usize,
}

/// Walks the body fragments in order and turns every heading into an entry.
///
/// An unresolved heading takes the page of the last resolved heading of the
/// same fragment, or the fragment's first page if none was resolved yet.
pub fn toc_entries(fragments: &[Fragment]) -> Vec<TocEntry> {
    let mut entries = Vec::new();
    let mut page_offset = 0usize;
    for fragment in fragments {
        let mut previous_page = 1usize;
        for heading in &fragment.headings {
            let page = match heading.page().page() {
                Some(page) => {
                    previous_page = page;
                    page
                }
                None => previous_page,
            };
            entries.push(TocEntry {
                level: heading.level,
                text: heading.text.clone(),
                page: page_offset + page,
            });
        }
        if let Some(count) = fragment.page_count {
            page_offset += count;
        }
    }
    entries
}

const TOC_STYLE: &str = r#"<style>
h1 {
    text-align: center;
}
.toc {
    margin: 0.5em;
    border-bottom: dotted 2px;
}
.toc-h1 {
    font-size: larger;
    margin-left: 2em;
}
.toc-h2 {
    margin-left: 3em;
}
.toc .pageNumber {
    float: right;
}
</style>"#;

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn row_inline_style(level: HeadingLevel) -> &'static str {
    match level {
        HeadingLevel::H1 => "font-size: larger; margin-left: 2em",
        HeadingLevel::H2 => "margin-left: 3em",
    }
}

/// Contents page markup. Rows carry both classes and inline styles so a
/// stylesheet-less renderer lays them out the same way.
pub fn toc_html(entries: &[TocEntry]) -> String {
    let mut lines: Vec<String> = vec![
        "<!DOCTYPE html>".to_string(),
        "<html lang='en'>".to_string(),
        "<head>".to_string(),
        "<meta charset='utf-8'>".to_string(),
        format!("<title>{TOC_TITLE}</title>"),
        TOC_STYLE.to_string(),
        "</head>".to_string(),
        "<body dir='ltr'>".to_string(),
        format!("<h1 style='text-align: center'>{TOC_TITLE}</h1>"),
    ];
    for entry in entries {
        lines.push(format!(
            "<div class='toc toc-{level}' style='{style}'><span class='description'>{text}</span><span class='pageNumber' style='float: right'>{page}</span></div>",
            level = entry.level.as_str(),
            style = row_inline_style(entry.level),
            text = escape_html(&entry.text),
            page = entry.page,
        ));
    }
    lines.push("</body>".to_string());
    lines.push("</html>".to_string());
    lines.join("\n")
}

/// Writes `toc.html` into `scratch_dir` and renders it to `toc.pdf`.
pub fn render_toc(
    entries: &[TocEntry],
    scratch_dir: &Path,
    layout: &LayoutOptions,
    renderer: &dyn Renderer,
) -> Result<Fragment, FolioError> {
    let html_path = scratch_dir.join("toc.html");
    std::fs::write(&html_path, toc_html(entries))?;
    let out = scratch_dir.join(FragmentKind::Toc.file_name());
    let rendered = renderer.render(&Source::File(html_path), layout, &out)?;
    Ok(Fragment::new(FragmentKind::Toc, Some(out)).with_title(rendered.title))
}

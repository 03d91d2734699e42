use std::num::NonZeroUsize;
use std::path::PathBuf;

/// Anchor glyph that documentation generators append to headings.
pub const PILCROW: char = '\u{b6}';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeadingLevel {
    H1,
    H2,
}

impl HeadingLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            HeadingLevel::H1 => "h1",
            HeadingLevel::H2 => "h2",
        }
    }

    /// Any tag other than `h1` is treated as a second-level heading.
    pub fn from_tag(tag: &str) -> Self {
        if tag.eq_ignore_ascii_case("h1") {
            HeadingLevel::H1
        } else {
            HeadingLevel::H2
        }
    }
}

/// Page of a heading inside its own fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeadingPage {
    #[default]
    Unresolved,
    ResolvedAt(NonZeroUsize),
}

impl HeadingPage {
    pub fn page(&self) -> Option<usize> {
        match self {
            HeadingPage::Unresolved => None,
            HeadingPage::ResolvedAt(page) => Some(page.get()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub level: HeadingLevel,
    pub text: String,
    page: HeadingPage,
}

impl Heading {
    pub fn new(level: HeadingLevel, raw_text: &str) -> Self {
        Self {
            level,
            text: strip_pilcrow(raw_text),
            page: HeadingPage::Unresolved,
        }
    }

    pub fn page(&self) -> HeadingPage {
        self.page
    }

    pub fn is_resolved(&self) -> bool {
        self.page != HeadingPage::Unresolved
    }

    /// Records the page the heading was found on. A heading that is already
    /// resolved keeps its page; returns whether the call changed anything.
    pub fn resolve(&mut self, page: NonZeroUsize) -> bool {
        if self.is_resolved() {
            return false;
        }
        self.page = HeadingPage::ResolvedAt(page);
        true
    }
}

pub fn strip_pilcrow(raw: &str) -> String {
    raw.chars().filter(|ch| *ch != PILCROW).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKind {
    Body(usize),
    Toc,
    Cover,
    BackCover,
}

impl FragmentKind {
    /// Scratch file name the fragment is rendered to.
    pub fn file_name(&self) -> String {
        match self {
            FragmentKind::Body(index) => format!("{index:03}.pdf"),
            FragmentKind::Toc => "toc.pdf".to_string(),
            FragmentKind::Cover => "cover.pdf".to_string(),
            FragmentKind::BackCover => "backcover.pdf".to_string(),
        }
    }

    pub fn label(&self) -> String {
        match self {
            FragmentKind::Body(index) => format!("body[{index}]"),
            FragmentKind::Toc => "toc".to_string(),
            FragmentKind::Cover => "cover".to_string(),
            FragmentKind::BackCover => "backcover".to_string(),
        }
    }
}

/// One rendered, paginated artifact for exactly one input source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub kind: FragmentKind,
    pub location: Option<PathBuf>,
    pub page_count: Option<usize>,
    pub title: String,
    pub headings: Vec<Heading>,
}

impl Fragment {
    pub fn new(kind: FragmentKind, location: Option<PathBuf>) -> Self {
        Self {
            kind,
            location,
            page_count: None,
            title: String::new(),
            headings: Vec::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_headings(mut self, headings: Vec<Heading>) -> Self {
        self.headings = headings;
        self
    }

    pub fn with_page_count(mut self, page_count: usize) -> Self {
        self.page_count = Some(page_count);
        self
    }

    pub fn resolved_heading_count(&self) -> usize {
        self.headings.iter().filter(|h| h.is_resolved()).count()
    }
}

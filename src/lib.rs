mod assemble;
mod debug;
mod error;
mod extract;
mod fragment;
mod locate;
mod pagetree;
mod pdfinspect;
mod render;
mod source;
mod stamp;
mod toc;
mod types;

pub use assemble::{AssemblyPlan, AssemblySummary, PageBook, assemble};
pub use debug::DebugLogger;
pub use error::FolioError;
pub use extract::{LopdfTextExtractor, TextExtractor};
pub use fragment::{Fragment, FragmentKind, Heading, HeadingLevel, HeadingPage, PILCROW, strip_pilcrow};
pub use locate::{locate_headings, resolve_fragment_headings};
pub use pdfinspect::{
    PdfInspectError, PdfInspectErrorCode, PdfInspectReport, count_fragment_pages,
    inspect_pdf_bytes, inspect_pdf_path, require_composable,
};
pub use render::{FlowRenderer, RenderedSource, Renderer};
pub use source::Source;
pub use stamp::{FooterSpec, footer_plan, footer_text, stamp_body_fragments, stamp_page_footers, stamp_pdf_file};
pub use toc::{TOC_TITLE, TocEntry, render_toc, toc_entries, toc_html};
pub use types::{Color, LayoutOptions, Margins, Size};

use rayon::prelude::*;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Binds an ordered list of HTML sources into one paginated PDF.
pub struct Folio {
    output: PathBuf,
    cover: Option<Source>,
    back_cover: Option<Source>,
    generate_toc: bool,
    layout: LayoutOptions,
    scratch_dir: PathBuf,
    jobs: usize,
    footer: FooterSpec,
    renderer: Arc<dyn Renderer>,
    extractor: Arc<dyn TextExtractor>,
    debug: Option<Arc<DebugLogger>>,
}

pub struct FolioBuilder {
    output: PathBuf,
    cover: Option<Source>,
    back_cover: Option<Source>,
    generate_toc: bool,
    layout: LayoutOptions,
    scratch_dir: Option<PathBuf>,
    jobs: usize,
    footer: FooterSpec,
    renderer: Arc<dyn Renderer>,
    extractor: Arc<dyn TextExtractor>,
    debug_path: Option<PathBuf>,
}

/// What a successful bind produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindSummary {
    pub output: PathBuf,
    pub total_pages: usize,
    pub cover_pages: usize,
    pub toc_pages: usize,
    pub body_pages: usize,
    pub back_cover_pages: usize,
    pub toc_entries: Vec<TocEntry>,
    pub fragments: Vec<Fragment>,
    pub bytes: usize,
    pub sha256: String,
}

impl Default for FolioBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FolioBuilder {
    pub fn new() -> Self {
        Self {
            output: PathBuf::from("output.pdf"),
            cover: None,
            back_cover: None,
            generate_toc: false,
            layout: LayoutOptions::default(),
            scratch_dir: None,
            jobs: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            footer: FooterSpec::default(),
            renderer: Arc::new(FlowRenderer::default()),
            extractor: Arc::new(LopdfTextExtractor),
            debug_path: None,
        }
    }

    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = path.into();
        self
    }

    pub fn cover(mut self, source: Source) -> Self {
        self.cover = Some(source);
        self
    }

    pub fn back_cover(mut self, source: Source) -> Self {
        self.back_cover = Some(source);
        self
    }

    pub fn generate_toc(mut self, enabled: bool) -> Self {
        self.generate_toc = enabled;
        self
    }

    pub fn layout(mut self, layout: LayoutOptions) -> Self {
        self.layout = layout;
        self
    }

    pub fn page_size(mut self, size: Size) -> Self {
        self.layout.page_size = size;
        self
    }

    pub fn margins(mut self, margins: Margins) -> Self {
        self.layout.margins = margins;
        self
    }

    pub fn print_background(mut self, enabled: bool) -> Self {
        self.layout.print_background = enabled;
        self
    }

    /// Directory that receives one PDF per fragment. Created if missing;
    /// never cleaned up by the binder.
    pub fn scratch_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(path.into());
        self
    }

    /// Upper bound on fragments processed at once within a stage.
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn footer(mut self, footer: FooterSpec) -> Self {
        self.footer = footer;
        self
    }

    pub fn renderer(mut self, renderer: impl Renderer + 'static) -> Self {
        self.renderer = Arc::new(renderer);
        self
    }

    pub fn extractor(mut self, extractor: impl TextExtractor + 'static) -> Self {
        self.extractor = Arc::new(extractor);
        self
    }

    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<Folio, FolioError> {
        let Some(scratch_dir) = self.scratch_dir else {
            return Err(FolioError::InvalidConfiguration(
                "a scratch directory is required".to_string(),
            ));
        };
        if self.jobs == 0 {
            return Err(FolioError::InvalidConfiguration(
                "jobs must be at least 1".to_string(),
            ));
        }
        if !(self.layout.content_width() > 0.0 && self.layout.content_height() > 0.0) {
            return Err(FolioError::InvalidConfiguration(
                "margins leave no content area on the page".to_string(),
            ));
        }
        if self.output.file_name().is_none() {
            return Err(FolioError::InvalidConfiguration(format!(
                "output path has no file name: {}",
                self.output.display()
            )));
        }
        std::fs::create_dir_all(&scratch_dir)?;
        let debug = if let Some(path) = self.debug_path {
            Some(Arc::new(DebugLogger::new(path)?))
        } else {
            None
        };
        Ok(Folio {
            output: self.output,
            cover: self.cover,
            back_cover: self.back_cover,
            generate_toc: self.generate_toc,
            layout: self.layout,
            scratch_dir,
            jobs: self.jobs,
            footer: self.footer,
            renderer: self.renderer,
            extractor: self.extractor,
            debug,
        })
    }
}

impl Folio {
    pub fn builder() -> FolioBuilder {
        FolioBuilder::new()
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Runs every stage over `sources` and writes the assembled document.
    ///
    /// Stages run one after another; fragments inside a stage run on a pool
    /// of at most `jobs` threads. Any failure other than a text-extraction
    /// miss aborts the bind and leaves no output file.
    pub fn bind(&self, sources: &[Source]) -> Result<BindSummary, FolioError> {
        if sources.is_empty() {
            return Err(FolioError::EmptySourceList);
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .build()
            .map_err(|err| FolioError::ThreadPool(err.to_string()))?;
        let result = pool.install(|| self.run(sources));
        if let Err(err) = &result {
            self.trace("folio.error", json!({ "message": err.to_string() }));
        }
        self.emit_debug_summary("bind");
        result
    }

    fn run(&self, sources: &[Source]) -> Result<BindSummary, FolioError> {
        log::info!("rendering {} sources", sources.len());
        let body = sources
            .par_iter()
            .enumerate()
            .map(|(index, source)| self.render_fragment(FragmentKind::Body(index), source))
            .collect::<Result<Vec<_>, _>>()?;

        let body = self.locate_stage(body);
        let body = self.count_stage(body)?;

        let body = stamp_body_fragments(body, &self.footer)?;
        for fragment in &body {
            self.trace(
                "folio.stamp",
                json!({
                    "fragment": fragment.kind.label(),
                    "pages": fragment.page_count,
                }),
            );
        }

        let cover = self.render_optional(FragmentKind::Cover, self.cover.as_ref())?;
        let back_cover = self.render_optional(FragmentKind::BackCover, self.back_cover.as_ref())?;

        let (entries, toc) = if self.generate_toc {
            let entries = toc_entries(&body);
            let fragment = render_toc(&entries, &self.scratch_dir, &self.layout, self.renderer.as_ref())?;
            let fragment = count_fragment_pages(fragment)?;
            self.trace(
                "folio.toc",
                json!({ "entries": entries.len(), "pages": fragment.page_count }),
            );
            log::info!("table of contents: {} entries", entries.len());
            (entries, Some(fragment))
        } else {
            (Vec::new(), None)
        };

        let summary = assemble(&AssemblyPlan {
            body: &body,
            toc: toc.as_ref().and_then(|f| f.location.as_deref()),
            cover: cover.as_ref().and_then(|f| f.location.as_deref()),
            back_cover: back_cover.as_ref().and_then(|f| f.location.as_deref()),
            output: &self.output,
        })?;
        self.trace(
            "folio.assemble",
            json!({
                "output": summary.output.display().to_string(),
                "pages": summary.total_pages,
                "bytes": summary.bytes,
                "sha256": summary.sha256,
            }),
        );
        log::info!(
            "assembled {} pages into {}",
            summary.total_pages,
            summary.output.display()
        );

        Ok(BindSummary {
            output: summary.output,
            total_pages: summary.total_pages,
            cover_pages: summary.cover_pages,
            toc_pages: summary.toc_pages,
            body_pages: summary.body_pages,
            back_cover_pages: summary.back_cover_pages,
            toc_entries: entries,
            fragments: body,
            bytes: summary.bytes,
            sha256: summary.sha256,
        })
    }

    fn render_fragment(&self, kind: FragmentKind, source: &Source) -> Result<Fragment, FolioError> {
        let out = self.scratch_dir.join(kind.file_name());
        let rendered = self.renderer.render(source, &self.layout, &out)?;
        log::debug!("{}: rendered {source}", kind.label());
        self.trace(
            "folio.render",
            json!({
                "fragment": kind.label(),
                "source": source.url(),
                "title": rendered.title,
                "headings": rendered.headings.len(),
            }),
        );
        self.increment("fragments.rendered", 1);
        Ok(Fragment::new(kind, Some(out))
            .with_title(rendered.title)
            .with_headings(rendered.headings))
    }

    fn render_optional(
        &self,
        kind: FragmentKind,
        source: Option<&Source>,
    ) -> Result<Option<Fragment>, FolioError> {
        let Some(source) = source else {
            return Ok(None);
        };
        let fragment = self.render_fragment(kind, source)?;
        Ok(Some(count_fragment_pages(fragment)?))
    }

    fn locate_stage(&self, fragments: Vec<Fragment>) -> Vec<Fragment> {
        let extractor = self.extractor.as_ref();
        let fragments: Vec<Fragment> = fragments
            .into_par_iter()
            .map(|fragment| resolve_fragment_headings(fragment, extractor))
            .collect();
        for fragment in &fragments {
            let resolved = fragment.resolved_heading_count();
            self.trace(
                "folio.locate",
                json!({
                    "fragment": fragment.kind.label(),
                    "headings": fragment.headings.len(),
                    "resolved": resolved,
                }),
            );
            self.increment("headings.total", fragment.headings.len() as u64);
            self.increment("headings.resolved", resolved as u64);
        }
        fragments
    }

    fn count_stage(&self, fragments: Vec<Fragment>) -> Result<Vec<Fragment>, FolioError> {
        let fragments = fragments
            .into_par_iter()
            .map(|fragment| count_fragment_pages(fragment).map_err(FolioError::from))
            .collect::<Result<Vec<_>, _>>()?;
        for fragment in &fragments {
            self.trace(
                "folio.count",
                json!({
                    "fragment": fragment.kind.label(),
                    "pages": fragment.page_count,
                }),
            );
            self.increment("pages.body", fragment.page_count.unwrap_or(0) as u64);
        }
        Ok(fragments)
    }

    fn trace(&self, event: &str, fields: serde_json::Value) {
        if let Some(logger) = self.debug.as_deref() {
            logger.event(event, fields);
        }
    }

    fn increment(&self, key: &str, amount: u64) {
        if let Some(logger) = self.debug.as_deref() {
            logger.increment(key, amount);
        }
    }

    fn emit_debug_summary(&self, context: &str) {
        if let Some(logger) = self.debug.as_deref() {
            logger.emit_summary(context);
            logger.flush();
        }
    }
}

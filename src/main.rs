//! folio - bind HTML sources into one PDF

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use folio::{BindSummary, Folio, FolioError, Source};

#[derive(Parser)]
#[command(name = "folio")]
#[command(version, about = "Bind HTML sources into one PDF", long_about = None)]
#[command(after_help = "EXAMPLES:
    folio intro.html guide.html                 Bind two files into output.pdf
    folio -o book.pdf --generate-toc ch*.html   Add a table of contents
    folio --cover cover.html --backcover back.html body.html")]
struct Cli {
    /// HTML sources in binding order (paths, file:// or http(s):// URLs)
    #[arg(value_name = "SOURCE", required = true)]
    sources: Vec<String>,

    /// Output PDF path
    #[arg(short, long, value_name = "FILE", default_value = "output.pdf")]
    output: PathBuf,

    /// HTML source rendered as the front cover
    #[arg(long, value_name = "SOURCE")]
    cover: Option<String>,

    /// HTML source rendered as the back cover
    #[arg(long = "backcover", value_name = "SOURCE")]
    back_cover: Option<String>,

    /// Insert a table of contents built from h1/h2 headings
    #[arg(long)]
    generate_toc: bool,

    /// Verbose logging
    #[arg(long)]
    debug: bool,

    /// Write a JSON-lines trace of every stage to FILE
    #[arg(long, value_name = "FILE")]
    debug_log: Option<PathBuf>,

    /// Fragments processed at once [default: number of CPUs]
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Leave the per-fragment PDFs in the scratch directory
    #[arg(long)]
    keep_scratch: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match bind(&cli) {
        Ok(summary) => {
            println!("Wrote PDF to: {}", summary.output.display());
            println!("Pages: {}", summary.total_pages);
            println!("SHA-256: {}", summary.sha256);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn bind(cli: &Cli) -> Result<BindSummary, FolioError> {
    let scratch = tempfile::Builder::new()
        .prefix("folio-")
        .keep(cli.keep_scratch)
        .tempdir()?;
    if cli.keep_scratch {
        log::info!("keeping scratch files in {}", scratch.path().display());
    }

    let mut builder = Folio::builder()
        .output(&cli.output)
        .generate_toc(cli.generate_toc)
        .scratch_dir(scratch.path());
    if let Some(cover) = &cli.cover {
        builder = builder.cover(Source::parse(cover));
    }
    if let Some(back_cover) = &cli.back_cover {
        builder = builder.back_cover(Source::parse(back_cover));
    }
    if let Some(jobs) = cli.jobs {
        builder = builder.jobs(jobs);
    }
    if let Some(path) = &cli.debug_log {
        builder = builder.debug_log(path);
    }

    let sources: Vec<Source> = cli.sources.iter().map(|s| Source::parse(s)).collect();
    let folio = builder.build()?;
    log::debug!(
        "binding {} sources into {} (scratch {})",
        sources.len(),
        folio.output().display(),
        folio.scratch_dir().display()
    );
    folio.bind(&sources)
}

//! CLI binary for pdf2tiff.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and reports progress.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf2tiff::pipeline::assemble::read_frames;
use pdf2tiff::pipeline::input::read_pdf_file;
use pdf2tiff::pipeline::render::{self, PdfiumEngine};
use pdf2tiff::{
    convert_file_with, ConversionConfig, ConversionProgressCallback, ConvertError, DeflateLevel,
    PageGeometry, ProgressCallback, RasterFrame, TiffCompression,
};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per rasterised page.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    /// Spinner until `on_conversion_start` reports the page count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(SPINNER);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(SPINNER);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Rasterising");
        self.bar.reset_eta();
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Rasterising {total_pages} pages…"))
        ));
    }

    fn on_page_rendered(&self, page_num: usize, total: usize, width: u32, height: u32) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{width}×{height} px")),
        ));
        self.bar.inc(1);
        if page_num == total {
            self.bar.set_prefix("Encoding");
            self.bar.set_message("writing TIFF…");
        }
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let msg = if error.chars().count() > 80 {
            let cut: String = error.chars().take(79).collect();
            format!("{cut}\u{2026}")
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
        ));
        self.bar.abandon();
    }

    fn on_conversion_complete(&self, frames: usize, tiff_bytes: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} frames written  {}",
            green("✔"),
            bold(&frames.to_string()),
            dim(&format!("{} bytes", tiff_bytes)),
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert at 300 DPI to output.tiff
  pdf2tiff document.pdf

  # Choose the output file
  pdf2tiff document.pdf -o scans/document.tiff

  # Fax-style resolution, LZW compression
  pdf2tiff --dpi 204 --dpi-y 196 --compression lzw letter.pdf -o fax.tiff

  # Encrypted document
  pdf2tiff --password s3cret statement.pdf -o statement.tiff

  # Page count and predicted frame sizes, no rendering
  pdf2tiff --inspect-only --json document.pdf

  # Decode the written TIFF and check it against the document
  pdf2tiff --verify document.pdf

EXIT CODES:
  0  success
  1  internal failure (render, encode, I/O, engine)
  2  missing input or invalid options
  3  the document was rejected (not a PDF, encrypted, no pages)

ENVIRONMENT VARIABLES:
  PDF2TIFF_*              Every option can be set from the environment
  PDFIUM_LIB_PATH         Path to an existing libpdfium; skips auto-download
  PDFIUM_AUTO_CACHE_DIR   Override the default pdfium cache directory
  RUST_LOG                Override the log filter (e.g. pdf2tiff=debug)

SETUP:
  PDFium (~30 MB) is downloaded automatically on first run and cached in
  ~/.cache/pdf2tiff/pdfium-7690/. No manual library setup is required.
"#;

/// Rasterise every page of a PDF into one multi-page TIFF.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2tiff",
    version,
    about = "Rasterise every page of a PDF into one multi-page, losslessly compressed TIFF",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF file to convert (not needed with --serve).
    input: Option<PathBuf>,

    /// Where to write the TIFF.
    #[arg(short, long, env = "PDF2TIFF_OUTPUT", default_value = "output.tiff")]
    output: PathBuf,

    /// Rendering resolution (horizontal, and vertical unless --dpi-y is set).
    #[arg(long, env = "PDF2TIFF_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(1..=2400))]
    dpi: u32,

    /// Vertical resolution, if different from --dpi.
    #[arg(long, env = "PDF2TIFF_DPI_Y",
          value_parser = clap::value_parser!(u32).range(1..=2400))]
    dpi_y: Option<u32>,

    /// Frame compression: deflate, lzw, packbits.
    #[arg(long, env = "PDF2TIFF_COMPRESSION", default_value = "deflate")]
    compression: TiffCompression,

    /// Deflate effort.
    #[arg(long, env = "PDF2TIFF_DEFLATE_LEVEL", value_enum, default_value = "balanced")]
    deflate_level: DeflateArg,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2TIFF_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Leave the resolution unitless (1/1, ResolutionUnit=None) instead of the DPI.
    #[arg(long, env = "PDF2TIFF_NO_RESOLUTION_TAGS")]
    no_resolution_tags: bool,

    /// Largest accepted frame width or height in pixels.
    #[arg(long, env = "PDF2TIFF_MAX_FRAME_DIMENSION", default_value_t = 20_000)]
    max_frame_dimension: u32,

    /// Print document metadata and predicted frame sizes only.
    #[arg(long)]
    inspect_only: bool,

    /// With --inspect-only: print JSON. Otherwise: print stats as JSON.
    #[arg(long, env = "PDF2TIFF_JSON")]
    json: bool,

    /// Decode the written TIFF and check frame count and sizes.
    #[arg(long, env = "PDF2TIFF_VERIFY")]
    verify: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2TIFF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2TIFF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2TIFF_QUIET")]
    quiet: bool,

    /// Serve POST /api/convertpdf2tiff on this address instead of converting.
    #[cfg(feature = "server")]
    #[arg(long, env = "PDF2TIFF_SERVE", value_name = "ADDR")]
    serve: Option<std::net::SocketAddr>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum DeflateArg {
    Fast,
    Balanced,
    Best,
}

impl From<DeflateArg> for DeflateLevel {
    fn from(v: DeflateArg) -> Self {
        match v {
            DeflateArg::Fast => DeflateLevel::Fast,
            DeflateArg::Balanced => DeflateLevel::Balanced,
            DeflateArg::Best => DeflateLevel::Best,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {:#}", red("error:"), err);
            let code = err
                .chain()
                .find_map(|cause| cause.downcast_ref::<ConvertError>())
                .map(ConvertError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}

fn init_tracing(cli: &Cli) {
    // The progress bar replaces INFO logs unless -v asks for them.
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress(cli) {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();
}

fn show_progress(cli: &Cli) -> bool {
    !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only
}

fn run(cli: &Cli) -> Result<()> {
    #[cfg(feature = "server")]
    if let Some(addr) = cli.serve {
        ensure_engine(cli.quiet)?;
        let config = build_config(cli, None)?;
        let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
        return runtime
            .block_on(pdf2tiff::server::serve(addr, config))
            .context("Server failed");
    }

    let input = cli
        .input
        .as_deref()
        .ok_or(ConvertError::InputMissing)
        .context("No input PDF given")?;
    ensure_engine(cli.quiet)?;

    if cli.inspect_only {
        return print_inspection(cli, input);
    }

    let progress_cb: Option<ProgressCallback> = if show_progress(cli) {
        Some(CliProgressCallback::new_dynamic() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(cli, progress_cb)?;

    let engine = PdfiumEngine::shared().context("PDF engine unavailable")?;
    let stats = convert_file_with(engine, input, &cli.output, &config)
        .with_context(|| format!("Conversion of '{}' failed", input.display()))?;

    if cli.verify {
        let pdf = read_pdf_file(input)?;
        let expected = render::inspect(engine, &pdf, &config).context("Failed to inspect PDF")?;
        verify_output(&cli.output, &expected.pages, cli.quiet)?;
    }

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&stats).context("Failed to serialise stats")?
        );
    } else if !cli.quiet {
        eprintln!(
            "{}  {} pages  {}ms  {:.1}x  →  {}",
            green("✔"),
            stats.frames_written,
            stats.total_duration_ms,
            stats.compression_ratio(),
            bold(&cli.output.display().to_string()),
        );
    }
    Ok(())
}

/// Make sure a pdfium library is on disk, downloading it with a progress bar
/// on first run.
fn ensure_engine(quiet: bool) -> Result<()> {
    if pdfium_auto::is_pdfium_cached() || std::env::var_os("PDFIUM_LIB_PATH").is_some() {
        return Ok(());
    }

    if quiet {
        pdfium_auto::ensure_pdfium_library(None).context("Failed to download PDFium engine")?;
        return Ok(());
    }

    let dl_bar = ProgressBar::new(0);
    dl_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(SPINNER),
    );
    dl_bar.set_prefix("PDF engine");
    dl_bar.set_message("Connecting…");
    dl_bar.enable_steady_tick(Duration::from_millis(80));

    let bar = dl_bar.clone();
    pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
        if let Some(t) = total {
            if bar.length().unwrap_or(0) != t {
                bar.set_length(t);
            }
        }
        bar.set_position(downloaded);
    }))
    .context("Failed to download PDFium engine")?;

    dl_bar.finish_with_message("ready ✓");
    Ok(())
}

fn print_inspection(cli: &Cli, input: &Path) -> Result<()> {
    let pdf = read_pdf_file(input)?;
    let config = build_config(cli, None)?;
    let engine = PdfiumEngine::shared().context("PDF engine unavailable")?;
    let meta = render::inspect(engine, &pdf, &config).context("Failed to inspect PDF")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&meta).context("Failed to serialise metadata")?
        );
        return Ok(());
    }

    println!("File:         {}", input.display());
    if let Some(ref t) = meta.title {
        println!("Title:        {}", t);
    }
    if let Some(ref a) = meta.author {
        println!("Author:       {}", a);
    }
    println!("Pages:        {}", meta.page_count);
    println!("PDF Version:  {}", meta.pdf_version);
    if let Some(ref p) = meta.producer {
        println!("Producer:     {}", p);
    }
    let (dx, dy) = config.scale.dpi();
    println!("Frames at {:.0}×{:.0} DPI:", dx, dy);
    for page in &meta.pages {
        println!(
            "  {:>4}  {:>8.1} × {:<8.1} pt  →  {} × {} px",
            page.page_num, page.width_pt, page.height_pt, page.width_px, page.height_px
        );
    }
    Ok(())
}

/// Re-read the TIFF from disk and check it against the page geometry.
fn verify_output(path: &Path, expected: &[PageGeometry], quiet: bool) -> Result<()> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to re-read '{}'", path.display()))?;
    let frames = read_frames(&bytes).context("Written TIFF does not decode")?;

    if let Some(problem) = frame_mismatch(&frames, expected) {
        anyhow::bail!("Verification failed: {problem}");
    }
    if !quiet {
        eprintln!("{} verified {} frames", green("✔"), frames.len());
    }
    Ok(())
}

/// First difference between decoded frames and the pages they came from.
fn frame_mismatch(frames: &[RasterFrame], expected: &[PageGeometry]) -> Option<String> {
    if frames.len() != expected.len() {
        return Some(format!(
            "{} frames in TIFF, {} pages in PDF",
            frames.len(),
            expected.len()
        ));
    }
    frames.iter().zip(expected).find_map(|(frame, page)| {
        ((frame.width, frame.height) != (page.width_px, page.height_px)).then(|| {
            format!(
                "frame {} is {}×{} px, page {} should be {}×{} px",
                page.page_num,
                frame.width,
                frame.height,
                page.page_num,
                page.width_px,
                page.height_px
            )
        })
    })
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .dpi_xy(cli.dpi, cli.dpi_y.unwrap_or(cli.dpi))
        .compression(cli.compression)
        .deflate_level(cli.deflate_level.into())
        .embed_resolution(!cli.no_resolution_tags)
        .max_frame_dimension(cli.max_frame_dimension);

    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    Ok(builder.build()?)
}

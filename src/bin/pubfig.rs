//! CLI binary for pubfig.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `HarvestConfig` and prints results. Run with no arguments from a site
//! checkout to process `_data/publications.yml`.

use anyhow::{Context, Result};
use clap::builder::TypedValueParser as _;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pubfig::{
    harvest, HarvestConfig, HarvestProgressCallback, HarvestReport, ProgressCallback,
    PubFigError, SkipReason, DEFAULT_LOOKAHEAD_PAGES, DEFAULT_MIN_IMAGE_BYTES,
};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar over the record list plus a log line
/// per record that did work.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Harvesting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }
}

/// Keep log lines on one row.
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let cut: String = s.chars().take(max - 1).collect();
        format!("{cut}\u{2026}")
    } else {
        s.to_string()
    }
}

impl HarvestProgressCallback for CliProgressCallback {
    fn on_harvest_start(&self, total_records: usize) {
        self.bar.set_length(total_records as u64);
        self.bar.reset_eta();
    }

    fn on_record_start(&self, _index: usize, _total: usize, title: &str) {
        self.bar.set_message(truncate(title, 40));
    }

    fn on_record_skipped(&self, _index: usize, _total: usize, _title: &str, _reason: SkipReason) {
        self.bar.inc(1);
    }

    fn on_record_complete(&self, index: usize, total: usize, title: &str, figure: &Path) {
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            green("✓"),
            index,
            total,
            truncate(title, 50),
            dim(&figure.display().to_string()),
        ));
        self.bar.inc(1);
    }

    fn on_record_error(&self, index: usize, total: usize, title: &str, error: &str) {
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            red("✗"),
            index,
            total,
            truncate(title, 50),
            red(&truncate(error, 80)),
        ));
        self.bar.inc(1);
    }

    fn on_harvest_complete(&self, _total_records: usize, _extracted: usize) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Default job: _data/publications.yml → images/publications/
  pubfig

  # A different site checkout, only 2025 papers
  pubfig --root ~/src/site --year 2025

  # Read the publication table of an HTML page (pictures are not written back)
  pubfig --html publications/index.html

  # Supply PDF URLs for papers whose links do not resolve
  pubfig --overrides manual-urls.yml

  # Machine-readable report
  pubfig --json > report.json

OVERRIDES FILE:
  A YAML mapping of exact publication title to PDF URL:

    "MetaAgent: Automatically Constructing Multi-Agent Systems": https://openreview.net/pdf?id=vOxaD3hhPt

ENVIRONMENT VARIABLES:
  PUBFIG_*           Every flag has an env twin, e.g. PUBFIG_YEAR=2025
  PDFIUM_LIB_PATH    Path to an existing libpdfium; skips the download
  PDFIUM_CACHE_DIR   Override the pdfium cache directory
  RUST_LOG           Override the log filter

PDFium (~30 MB) is only needed when a PDF has no usable embedded image. It is
downloaded on first use and cached for later runs.
"#;

/// Extract one figure per publication and record it in the publication list.
#[derive(Parser, Debug)]
#[command(
    name = "pubfig",
    version,
    about = "Extract one figure per publication and record it in the publication list",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Site checkout root; other paths are relative to it.
    #[arg(long, env = "PUBFIG_ROOT", default_value = ".")]
    root: PathBuf,

    /// YAML publication list.
    #[arg(long, env = "PUBFIG_SOURCE", default_value = "_data/publications.yml")]
    source: PathBuf,

    /// Read an HTML publication table instead of the YAML list.
    #[arg(long, env = "PUBFIG_HTML", conflicts_with = "source")]
    html: Option<PathBuf>,

    /// Directory figures are written to.
    #[arg(long, env = "PUBFIG_IMAGES_DIR", default_value = "images/publications")]
    images_dir: PathBuf,

    /// Prefix of the picture path written back.
    #[arg(long, env = "PUBFIG_PICTURE_PREFIX", default_value = "/images/publications")]
    picture_prefix: String,

    /// Base URL relative links are resolved against.
    #[arg(long, env = "PUBFIG_SITE_BASE", default_value = pubfig::config::DEFAULT_SITE_BASE)]
    site_base: String,

    /// Only process publications from this year.
    #[arg(long, env = "PUBFIG_YEAR")]
    year: Option<i32>,

    /// YAML file mapping publication titles to PDF URLs.
    #[arg(long, env = "PUBFIG_OVERRIDES")]
    overrides: Option<PathBuf>,

    /// Skip embedded images smaller than this many bytes.
    #[arg(long, env = "PUBFIG_MIN_IMAGE_BYTES", default_value_t = DEFAULT_MIN_IMAGE_BYTES)]
    min_image_bytes: usize,

    /// Number of leading pages scanned for embedded images.
    #[arg(long, env = "PUBFIG_LOOKAHEAD", default_value_t = DEFAULT_LOOKAHEAD_PAGES,
          value_parser = clap::value_parser!(u64).range(1..).map(|v| v as usize))]
    lookahead: usize,

    /// Fallback render DPI (72–400).
    #[arg(long, env = "PUBFIG_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PUBFIG_DOWNLOAD_TIMEOUT", default_value_t = 30)]
    download_timeout: u64,

    /// Print the HarvestReport as JSON on stdout.
    #[arg(long, env = "PUBFIG_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PUBFIG_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PUBFIG_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PUBFIG_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
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

    match run(&cli, show_progress).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Fatal library errors are printed bare so scripts can match on them.
            match e.downcast_ref::<PubFigError>() {
                Some(fatal) => eprintln!("{fatal}"),
                None => eprintln!("{} {e:#}", red("error:")),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli, show_progress: bool) -> Result<()> {
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn HarvestProgressCallback>)
    } else {
        None
    };

    let config = build_config(cli, progress_cb).await?;
    let report = harvest(&config).await?;

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&report, &config);
    }

    Ok(())
}

fn print_summary(report: &HarvestReport, config: &HarvestConfig) {
    let s = &report.stats;
    eprintln!(
        "{}  {} extracted  {} skipped  {} failed  {}ms",
        if s.failed == 0 { green("✔") } else { red("⚠") },
        bold(&s.extracted.to_string()),
        s.skipped,
        s.failed,
        s.duration_ms,
    );
    if report.source_written {
        eprintln!("   updated {}", bold(&config.source_path().display().to_string()));
    } else {
        eprintln!("   {}", dim("publication list unchanged"));
    }
}

/// Map CLI args to `HarvestConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<HarvestConfig> {
    let mut builder = HarvestConfig::builder()
        .site_root(&cli.root)
        .images_dir(&cli.images_dir)
        .picture_prefix(&cli.picture_prefix)
        .site_base(&cli.site_base)
        .min_image_bytes(cli.min_image_bytes)
        .lookahead_pages(cli.lookahead)
        .render_dpi(cli.dpi)
        .download_timeout_secs(cli.download_timeout);

    builder = match cli.html {
        Some(ref html) => builder.html_source(html),
        None => builder.yaml_source(&cli.source),
    };

    if let Some(year) = cli.year {
        builder = builder.year(year);
    }

    if let Some(ref path) = cli.overrides {
        builder = builder.url_overrides(load_overrides(path).await?);
    }

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Read a `title: url` YAML mapping.
async fn load_overrides(path: &Path) -> Result<BTreeMap<String, String>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read overrides from {:?}", path))?;
    let table: Option<BTreeMap<String, String>> = serde_yaml::from_str(&text)
        .with_context(|| format!("Overrides file {:?} is not a title → URL mapping", path))?;
    Ok(table.unwrap_or_default())
}

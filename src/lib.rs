//! # pubfig
//!
//! Harvest one representative figure per publication for an academic site.
//!
//! ## Why this crate?
//!
//! A publication page looks far better with a thumbnail per paper, but
//! cropping figures by hand for dozens of papers does not scale. This crate
//! walks the site's publication list, finds each paper's PDF, pulls out the
//! first real figure (or renders the first page when there is none) and
//! records the image path back into the list.
//!
//! ## Pipeline Overview
//!
//! ```text
//! publications.yml
//!  │
//!  ├─ 1. Load     YAML list (or an HTML table, read-only)
//!  ├─ 2. Filter   skip records that already have a picture
//!  ├─ 3. Resolve  pdf link > arXiv abstract > OpenReview forum
//!  ├─ 4. Fetch    stream the PDF into a temp dir
//!  ├─ 5. Extract  first embedded image ≥ 10 KB on pages 1–3, else render page 1
//!  └─ 6. Write    save the list back, only if something changed
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pubfig::{harvest, HarvestConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = HarvestConfig::builder().site_root("my-site").build()?;
//!     let report = harvest(&config).await?;
//!     eprintln!(
//!         "{} extracted, {} skipped, {} failed",
//!         report.stats.extracted, report.stats.skipped, report.stats.failed
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pubfig` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pubfig = { version = "0.1", default-features = false }
//! ```
//!
//! ## PDFium
//!
//! Only the first-page fallback needs PDFium. It is located through
//! `PDFIUM_LIB_PATH`, then the `pdfium-cache` directory, and downloaded on
//! first use otherwise. Supply your own [`PageRenderer`] via
//! [`HarvestConfigBuilder::renderer`] to avoid it entirely.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod harvest;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod record;
pub mod source;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    HarvestConfig, HarvestConfigBuilder, DEFAULT_LOOKAHEAD_PAGES, DEFAULT_MIN_IMAGE_BYTES,
};
pub use error::{PubFigError, RecordError};
pub use harvest::{harvest, harvest_sync, process_records};
pub use output::{
    ExtractedFigure, FigureOrigin, HarvestReport, HarvestStats, RecordOutcome, RecordResult,
    SkipReason,
};
pub use pipeline::render::{PageRenderer, PdfiumRenderer};
pub use progress::{HarvestProgressCallback, NoopProgressCallback, ProgressCallback};
pub use record::{Link, LinkKind, PublicationRecord};
pub use source::{HtmlStore, RecordStore, SourceFormat, YamlStore};

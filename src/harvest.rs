//! Batch entry points: walk the publication list and harvest one figure per
//! record.
//!
//! Records are processed strictly one after another. A failure inside one
//! record (no link, dead URL, broken PDF) is captured in that record's
//! [`RecordResult`] and the loop moves on; only source-level problems abort
//! the run. The publication list is written back once at the end, and only
//! when at least one record gained a picture.

use crate::config::HarvestConfig;
use crate::error::{PubFigError, RecordError};
use crate::output::{
    ExtractedFigure, HarvestReport, HarvestStats, RecordOutcome, RecordResult, SkipReason,
};
use crate::pipeline::extract::{self, ExtractOptions};
use crate::pipeline::fetch::Fetcher;
use crate::pipeline::render::{PageRenderer, PdfiumRenderer};
use crate::pipeline::resolve;
use crate::record::PublicationRecord;
use crate::source::{RecordStore, SourceFormat};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Run a full harvest: load the source, process every record, write back.
///
/// # Returns
/// `Ok(HarvestReport)` whenever the source could be loaded, even if every
/// record failed (check `report.stats.failed`).
///
/// # Errors
/// Returns `Err(PubFigError)` only for fatal errors:
/// - the publication list is missing or unparsable
/// - the updated list could not be written
pub async fn harvest(config: &HarvestConfig) -> Result<HarvestReport, PubFigError> {
    let store = open_store(config);
    info!("Loading publications from {}", store.path().display());
    let mut records = store.load()?;

    let mut report = process_records(&mut records, config).await?;
    let changed = report.changed();

    report.source_written = if changed && store.writable() {
        store.save(&records)?;
        info!("Updated {}", store.path().display());
        true
    } else {
        if changed {
            debug!("{} is read-only; pictures not written back", store.path().display());
        } else {
            info!("No changes; {} left untouched", store.path().display());
        }
        false
    };

    Ok(report)
}

/// Synchronous wrapper around [`harvest`].
///
/// Creates a temporary tokio runtime internally.
pub fn harvest_sync(config: &HarvestConfig) -> Result<HarvestReport, PubFigError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| PubFigError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(harvest(config))
}

/// Process an in-memory record list.
///
/// Records that gain a figure have their `picture` set to
/// `<picture_prefix>/<file name>`, or to the declared image's directory when
/// the source names one. File stems are unique within the run and never
/// reuse the stem of a picture already in the list. Nothing is persisted;
/// the returned report always has `source_written == false`.
pub async fn process_records(
    records: &mut [PublicationRecord],
    config: &HarvestConfig,
) -> Result<HarvestReport, PubFigError> {
    let start = Instant::now();
    let total = records.len();
    info!("Processing {} publications", total);

    let fetcher = Fetcher::new(config.download_timeout_secs)
        .map_err(|e| PubFigError::Internal(e.to_string()))?;
    let renderer: Arc<dyn PageRenderer> = config
        .renderer
        .clone()
        .unwrap_or_else(|| Arc::new(PdfiumRenderer));
    let options = ExtractOptions::from(config);

    if let Some(ref cb) = config.progress_callback {
        cb.on_harvest_start(total);
    }

    let mut results = Vec::with_capacity(total);
    let mut taken_stems: HashSet<String> = records
        .iter()
        .filter_map(|r| r.picture.as_deref())
        .filter_map(|p| Path::new(p).file_stem())
        .map(|s| s.to_string_lossy().into_owned())
        .collect();

    for (i, record) in records.iter_mut().enumerate() {
        let index = i + 1;
        let title = record.title.clone();

        if let Some(reason) = skip_reason(record, config) {
            debug!("[{}/{}] Skipping '{}': {}", index, total, title, reason);
            if let Some(ref cb) = config.progress_callback {
                cb.on_record_skipped(index, total, &title, reason);
            }
            results.push(RecordResult {
                index,
                title,
                outcome: Ok(RecordOutcome::Skipped { reason }),
            });
            continue;
        }

        info!("[{}/{}] Processing: {}", index, total, title);
        if let Some(ref cb) = config.progress_callback {
            cb.on_record_start(index, total, &title);
        }

        let stem = claim_stem(record.figure_stem(i), &mut taken_stems);
        let (record_options, prefix) = output_target(record, config, &options);

        let processed =
            process_record(record, stem, config, &fetcher, &renderer, record_options).await;
        let outcome = match processed {
            Ok((pdf_url, figure)) => {
                let picture = picture_value(&prefix, &figure);
                record.picture = picture.clone();
                info!("[{}/{}] Saved {}", index, total, figure.path.display());
                if let Some(ref cb) = config.progress_callback {
                    cb.on_record_complete(index, total, &title, &figure.path);
                }
                Ok(RecordOutcome::Extracted {
                    pdf_url,
                    figure,
                    picture,
                })
            }
            Err(e) => {
                warn!("[{}/{}] {}: {}", index, total, title, e);
                if let Some(ref cb) = config.progress_callback {
                    cb.on_record_error(index, total, &title, &e.to_string());
                }
                Err(e)
            }
        };

        results.push(RecordResult {
            index,
            title,
            outcome,
        });
    }

    let stats = HarvestStats::from_results(&results, start.elapsed().as_millis() as u64);
    info!(
        "Harvest complete: {} extracted, {} skipped, {} failed, {}ms",
        stats.extracted, stats.skipped, stats.failed, stats.duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_harvest_complete(total, stats.extracted);
    }

    Ok(HarvestReport {
        records: results,
        stats,
        source_written: false,
    })
}

fn skip_reason(record: &PublicationRecord, config: &HarvestConfig) -> Option<SkipReason> {
    if record.has_picture() {
        return Some(SkipReason::AlreadyHasPicture);
    }
    match config.year {
        Some(year) if record.year != Some(year) => Some(SkipReason::YearFiltered),
        _ => None,
    }
}

/// `stem`, or `stem-2`, `stem-3`, … when already taken.
fn claim_stem(stem: String, taken: &mut HashSet<String>) -> String {
    if taken.insert(stem.clone()) {
        return stem;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{stem}-{n}");
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Output directory and picture prefix for one record: beside its declared
/// image when it has one, the configured images dir otherwise.
fn output_target(
    record: &PublicationRecord,
    config: &HarvestConfig,
    options: &ExtractOptions,
) -> (ExtractOptions, String) {
    match record.declared_dir() {
        Some(dir) => {
            let prefix = dir.iter().fold(String::new(), |mut acc, part| {
                acc.push('/');
                acc.push_str(&part.to_string_lossy());
                acc
            });
            let options = ExtractOptions {
                images_dir: config.site_root.join(&dir),
                ..options.clone()
            };
            (options, prefix)
        }
        None => (options.clone(), config.picture_prefix.clone()),
    }
}

/// Resolve, download and extract for one record.
async fn process_record(
    record: &PublicationRecord,
    stem: String,
    config: &HarvestConfig,
    fetcher: &Fetcher,
    renderer: &Arc<dyn PageRenderer>,
    options: ExtractOptions,
) -> Result<(String, ExtractedFigure), RecordError> {
    let pdf_url = resolve::resolve_pdf_url(record, &config.url_overrides, &config.site_base)
        .ok_or(RecordError::NoPdfLink)?;
    debug!("Resolved PDF URL: {}", pdf_url);

    let pdf = fetcher.fetch(&pdf_url).await?;

    let renderer = Arc::clone(renderer);

    // `pdf` is moved into the task so its temp dir outlives the extraction.
    let figure = tokio::task::spawn_blocking(move || {
        extract::extract_figure(pdf.path(), &stem, &options, renderer.as_ref())
    })
    .await
    .map_err(|e| RecordError::Internal(format!("Extraction task panicked: {}", e)))??;

    Ok((pdf_url, figure))
}

/// `<prefix>/<file name>` for a saved figure.
fn picture_value(prefix: &str, figure: &ExtractedFigure) -> Option<String> {
    let name = figure.path.file_name()?.to_string_lossy();
    Some(format!("{}/{}", prefix.trim_end_matches('/'), name))
}

fn open_store(config: &HarvestConfig) -> Box<dyn RecordStore> {
    let path = config.source_path();
    match config.source {
        SourceFormat::Yaml(_) => SourceFormat::Yaml(path),
        SourceFormat::Html(_) => SourceFormat::Html(path),
    }
    .open()
}

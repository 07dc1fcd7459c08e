//! Result types produced by a harvest run.

use crate::error::RecordError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Why a record was not processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The record already carries a picture; it is never overwritten.
    AlreadyHasPicture,
    /// The record's year does not match the configured filter.
    YearFiltered,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyHasPicture => f.write_str("already has picture"),
            Self::YearFiltered => f.write_str("year filtered"),
        }
    }
}

/// Which tier of the extraction policy produced the figure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FigureOrigin {
    /// An embedded image, saved in its native encoding.
    Embedded {
        /// 1-based page the image was found on.
        page: usize,
        /// Encoded size of the image stream.
        encoded_bytes: usize,
    },
    /// Page 1 rendered as a bitmap.
    RenderedPage { dpi: u32 },
}

/// A figure written to disk for one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFigure {
    pub path: PathBuf,
    /// File extension the figure was saved with (`jpg`, `png`, `jpx`).
    pub extension: String,
    pub origin: FigureOrigin,
}

/// Successful outcome of one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecordOutcome {
    Skipped { reason: SkipReason },
    Extracted {
        pdf_url: String,
        figure: ExtractedFigure,
        /// Value written into the record's `picture` field, if any.
        picture: Option<String>,
    },
}

/// Outcome of one record, in source order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordResult {
    /// 1-based position in the source list.
    pub index: usize,
    pub title: String,
    pub outcome: Result<RecordOutcome, RecordError>,
}

impl RecordResult {
    pub fn is_extracted(&self) -> bool {
        matches!(self.outcome, Ok(RecordOutcome::Extracted { .. }))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, Ok(RecordOutcome::Skipped { .. }))
    }

    pub fn is_failed(&self) -> bool {
        self.outcome.is_err()
    }
}

/// Counts for a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestStats {
    pub total_records: usize,
    pub extracted: usize,
    pub skipped: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

impl HarvestStats {
    pub fn from_results(results: &[RecordResult], duration_ms: u64) -> Self {
        Self {
            total_records: results.len(),
            extracted: results.iter().filter(|r| r.is_extracted()).count(),
            skipped: results.iter().filter(|r| r.is_skipped()).count(),
            failed: results.iter().filter(|r| r.is_failed()).count(),
            duration_ms,
        }
    }
}

/// Everything a harvest run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestReport {
    pub records: Vec<RecordResult>,
    pub stats: HarvestStats,
    /// Whether the publication list was rewritten.
    pub source_written: bool,
}

impl HarvestReport {
    /// Whether any record gained a picture during the run.
    pub fn changed(&self) -> bool {
        self.records.iter().any(|r| {
            matches!(
                r.outcome,
                Ok(RecordOutcome::Extracted {
                    picture: Some(_),
                    ..
                })
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(outcome: Result<RecordOutcome, RecordError>) -> RecordResult {
        RecordResult {
            index: 1,
            title: "t".into(),
            outcome,
        }
    }

    #[test]
    fn stats_count_each_outcome() {
        let results = vec![
            result(Ok(RecordOutcome::Skipped {
                reason: SkipReason::AlreadyHasPicture,
            })),
            result(Err(RecordError::NoPdfLink)),
            result(Ok(RecordOutcome::Extracted {
                pdf_url: "https://a/b.pdf".into(),
                figure: ExtractedFigure {
                    path: "b.png".into(),
                    extension: "png".into(),
                    origin: FigureOrigin::RenderedPage { dpi: 150 },
                },
                picture: Some("/images/publications/b.png".into()),
            })),
        ];
        let stats = HarvestStats::from_results(&results, 7);
        let report = HarvestReport {
            records: results.clone(),
            stats: stats.clone(),
            source_written: false,
        };
        assert!(report.changed());
        assert_eq!(stats.total_records, 3);
        assert_eq!(stats.extracted, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.failed, 1);
    }

    #[test]
    fn report_serialises_to_json() {
        let report = HarvestReport {
            records: vec![result(Err(RecordError::EmptyDocument))],
            stats: HarvestStats::default(),
            source_written: false,
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("EmptyDocument"), "got: {json}");
        assert!(json.contains("\"source_written\":false"));
    }
}

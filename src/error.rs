//! Error types for the pubfig library.
//!
//! Two error types mirror the two failure scopes of a harvest run:
//!
//! * [`PubFigError`] is **fatal**: the batch cannot start or cannot persist
//!   its result (source file missing or unparsable, bad configuration,
//!   write-back failed). Returned as `Err` from [`crate::harvest::harvest`].
//!
//! * [`RecordError`] is **per record**: one publication could not get a
//!   figure (no PDF link, download failed, extraction failed). Stored in the
//!   record's [`crate::output::RecordResult`]; the batch moves on.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors returned by the pubfig library.
#[derive(Debug, Error)]
pub enum PubFigError {
    // ── Source errors ─────────────────────────────────────────────────────
    /// The publications file does not exist.
    #[error("Could not find {path}")]
    SourceNotFound { path: PathBuf },

    /// The publications file exists but could not be read.
    #[error("Failed to read '{path}': {source}")]
    SourceRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The publications file is not a list of records.
    #[error("Failed to parse '{path}': {detail}")]
    SourceParse { path: PathBuf, detail: String },

    /// Writing the updated publications file failed.
    #[error("Failed to write '{path}': {source}")]
    SourceWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serialising the updated record list failed.
    #[error("Failed to serialise records for '{path}': {detail}")]
    Serialise { path: PathBuf, detail: String },

    /// The source format has no write-back (HTML tables).
    #[error("Source '{path}' is read-only")]
    ReadOnlySource { path: PathBuf },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single publication record.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum RecordError {
    /// No link rule matched and no override exists for the title.
    #[error("no pdf link found")]
    NoPdfLink,

    /// Transport error or non-success HTTP status.
    #[error("failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// The download did not finish within the configured timeout.
    #[error("download of '{url}' timed out after {secs}s")]
    DownloadTimeout { url: String, secs: u64 },

    /// The downloaded body does not start with `%PDF`.
    #[error("'{url}' did not return a PDF (first bytes {magic:?})")]
    NotAPdf { url: String, magic: Vec<u8> },

    /// lopdf could not parse the document.
    #[error("corrupt PDF: {detail}")]
    CorruptPdf { detail: String },

    /// The document has no pages, so no figure can be produced.
    #[error("document has no pages")]
    EmptyDocument,

    /// The first-page fallback could not be rendered.
    #[error("page {page} render failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// Writing the figure file failed.
    #[error("failed to write '{path}': {detail}")]
    WriteFailed { path: PathBuf, detail: String },

    /// Anything else (temp dir creation, task panic).
    #[error("{0}")]
    Internal(String),
}

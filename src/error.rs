//! Error types for the edgequake-pdfmerge library.
//!
//! Errors are split by blast radius:
//!
//! * [`PdfMergeError`]: **Fatal**: the request cannot produce a document
//!   (the merge itself failed, nothing survived, the batch was cancelled).
//!   Returned as `Err(PdfMergeError)` from the top-level entry points.
//!
//! * [`ItemError`]: **Non-fatal**: one reference could not be fetched,
//!   classified or converted. Under the default best-effort policy the item is
//!   dropped, logged, and recorded in [`crate::output::ItemReport`] so callers
//!   can see exactly what was omitted.
//!
//! * [`MetadataError`]: stamping author/creator/… failed. Never fails a
//!   request; the unstamped document is still returned.
//!
//! * [`BackendError`]: what the collaborators in [`crate::backend`] return.
//!   The pipeline wraps it into one of the above depending on the stage.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdfmerge library.
#[derive(Debug, Error)]
pub enum PdfMergeError {
    // ── Assembly errors ───────────────────────────────────────────────────
    /// The PDF library could not merge the surviving documents.
    #[error("Failed to merge {inputs} documents into '{dest}': {detail}")]
    MergeFailed {
        inputs: usize,
        dest: PathBuf,
        detail: String,
    },

    /// Every item in the batch was dropped; there is nothing to merge.
    #[error("No document survived out of {total} submitted references")]
    NothingToMerge { total: usize },

    /// An item failed while the fail-fast policy was active.
    #[error("Item {index} ('{reference}') failed: {source}")]
    ItemFailed {
        index: usize,
        reference: String,
        #[source]
        source: ItemError,
    },

    /// The batch was cancelled before it completed.
    #[error("Batch cancelled after {completed}/{total} items")]
    Cancelled { completed: usize, total: usize },

    /// A single-document render (link or HTML source) failed.
    #[error("Render failed for '{url}': {detail}")]
    RenderFailed { url: String, detail: String },

    /// A reference could not be resolved or read as a PDF for inspection.
    #[error("Cannot inspect '{reference}': {detail}")]
    InspectFailed { reference: String, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not write the merged document to its destination.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configuration file could not be read or parsed.
    #[error("Failed to load configuration from '{path}': {detail}")]
    ConfigLoad { path: PathBuf, detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// The pipeline stage at which an item was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Classify,
    Convert,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stage::Fetch => "fetch",
            Stage::Classify => "classify",
            Stage::Convert => "convert",
        })
    }
}

/// A non-fatal error for a single batch item.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum ItemError {
    /// The reference is neither an existing local file nor an HTTP(S) URL.
    #[error("'{reference}' is not an existing file or a valid HTTP/HTTPS URL")]
    InvalidReference { reference: String },

    /// Network error or non-success HTTP status.
    #[error("Failed to fetch '{url}': {reason}")]
    Fetch { url: String, reason: String },

    /// Fetch exceeded the configured timeout.
    #[error("Fetching '{url}' timed out after {secs}s")]
    FetchTimeout { url: String, secs: u64 },

    /// File name has no recognised document extension.
    #[error("Unsupported document type: '{name}'")]
    UnsupportedType { name: String },

    /// The rasterizer or render service failed.
    #[error("Conversion of '{path}' failed: {detail}")]
    Conversion { path: PathBuf, detail: String },

    /// The render service exceeded the configured timeout.
    #[error("Conversion of '{path}' timed out after {secs}s")]
    ConversionTimeout { path: PathBuf, secs: u64 },
}

impl ItemError {
    /// The stage that produced this error.
    pub fn stage(&self) -> Stage {
        match self {
            ItemError::InvalidReference { .. }
            | ItemError::Fetch { .. }
            | ItemError::FetchTimeout { .. } => Stage::Fetch,
            ItemError::UnsupportedType { .. } => Stage::Classify,
            ItemError::Conversion { .. } | ItemError::ConversionTimeout { .. } => Stage::Convert,
        }
    }
}

/// Stamping document-information fields failed.
#[derive(Debug, Error)]
#[error("Failed to stamp metadata on '{path}': {detail}")]
pub struct MetadataError {
    pub path: PathBuf,
    pub detail: String,
}

/// Errors reported by the external collaborators (renderer, rasterizer, PDF library).
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The PDF could not be parsed or written.
    #[error("PDF error: {0}")]
    Pdf(String),

    /// The raster image could not be decoded.
    #[error("Image error: {0}")]
    Image(String),

    /// The browser could not be launched or failed while printing.
    #[error("Browser error: {0}")]
    Browser(String),

    /// The operation did not finish within its deadline.
    #[error("Timed out after {secs}s")]
    Timeout { secs: u64 },

    /// No implementation is available in this build.
    #[error("{0} is not available in this build")]
    Unavailable(&'static str),
}

//! # edgequake-pdfmerge
//!
//! Fetch PDFs, images and HTML pages from URLs or local paths, convert each
//! to PDF and merge them into one document in submission order.
//!
//! ## Pipeline Overview
//!
//! ```text
//! references (ordered)
//!  │
//!  ├─ 1. Resolve   local path in place, or download (fetch pool)
//!  ├─ 2. Classify  .pdf / image / .html by extension; others dropped
//!  ├─ 3. Convert   image → rasterizer, HTML → headless Chrome (convert pool)
//!  ├─ 4. Assemble  merge survivors by index, stamp author/creator/…
//!  └─ 5. Release   every temp file deleted once; the output after delivery
//! ```
//!
//! Failing items are dropped and reported per item by default. See
//! [`FailurePolicy`] for the fail-fast alternative.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdfmerge::{merge_to_file, MergeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MergeConfig::builder()
//!         .worker(4)
//!         .timeout_secs(30)
//!         .author("Docs Team")
//!         .build()?;
//!     let refs = ["intro.pdf", "https://example.com/diagram.png", "appendix.html"];
//!     let stats = merge_to_file(&refs, "bundle.pdf", &config).await?;
//!     eprintln!("{} of {} items merged", stats.included_items, stats.total_items);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | Enables the `pdfmerge` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `chrome` | on      | HTML rendering through headless Chrome via `chromiumoxide` |
//!
//! Without `chrome`, HTML items fail conversion and are dropped. Custom
//! collaborators can be plugged in with [`Pipeline::with_backends`].

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod config;
pub mod error;
pub mod merge;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{PdfLibrary, Rasterizer, RenderService};
pub use config::{
    ConfigFile, FailurePolicy, Margins, MergeConfig, MergeConfigBuilder, PaperSize, PdfMeta,
    PrintOptions,
};
pub use error::{BackendError, ItemError, MetadataError, PdfMergeError, Stage};
pub use merge::{inspect, merge, merge_sync, merge_to_file, Pipeline};
pub use output::{
    DocumentMetadata, ItemReport, ItemStatus, MergeOutput, MergeStats, MergedDocument,
};
pub use pipeline::classify::Kind;
pub use pipeline::resolve::Origin;
pub use progress::{MergeProgressCallback, NoopProgressCallback, ProgressCallback};
pub use tokio_util::sync::CancellationToken;

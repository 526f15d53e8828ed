//! Configuration types for fetch-convert-merge batches.
//!
//! All pipeline behaviour is controlled through [`MergeConfig`], built via its
//! [`MergeConfigBuilder`]. The config is passed explicitly into every
//! component's constructor; nothing below this module reads global state.
//!
//! A deployment usually starts from a JSON file plus environment overrides:
//!
//! ```rust,no_run
//! use edgequake_pdfmerge::config::ConfigFile;
//!
//! let config = ConfigFile::load("pdfmerge.json")?
//!     .apply_env()
//!     .into_builder()
//!     .build()?;
//! # Ok::<(), edgequake_pdfmerge::PdfMergeError>(())
//! ```

use crate::error::PdfMergeError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Configuration for a merge batch.
///
/// # Example
/// ```rust
/// use edgequake_pdfmerge::{FailurePolicy, MergeConfig};
///
/// let config = MergeConfig::builder()
///     .worker(4)
///     .timeout_secs(30)
///     .author("Records Office")
///     .failure_policy(FailurePolicy::BestEffort)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct MergeConfig {
    /// Maximum number of network fetches in flight at once. Default: 4.
    pub fetch_workers: usize,

    /// Maximum number of image/HTML conversions in flight at once, independent
    /// of `fetch_workers`. Default: 4.
    pub convert_workers: usize,

    /// Per-operation timeout in seconds, applied to each fetch and each render. Default: 30.
    pub timeout_secs: u64,

    /// Document-information fields stamped on every produced PDF.
    pub metadata: PdfMeta,

    /// What to do when a single item fails. Default: [`FailurePolicy::BestEffort`].
    pub failure_policy: FailurePolicy,

    /// Ask the PDF library to tolerate recoverable structural problems. Default: true.
    pub relaxed_validation: bool,

    /// Seconds to keep a delivered document on disk after the byte stream ends. Default: 10.
    pub release_grace_secs: u64,

    /// Directory for temporary files. `None` uses the system temp directory.
    pub temp_dir: Option<PathBuf>,

    /// Chrome/Chromium executable. `None` lets the renderer search the usual locations.
    pub chrome_path: Option<PathBuf>,

    /// CSS selector that must be present before a page is printed. Default: `body`.
    pub wait_selector: String,

    /// Paper and margin settings for HTML rendering.
    pub print: PrintOptions,

    /// Optional per-item progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            fetch_workers: 4,
            convert_workers: 4,
            timeout_secs: 30,
            metadata: PdfMeta::default(),
            failure_policy: FailurePolicy::default(),
            relaxed_validation: true,
            release_grace_secs: 10,
            temp_dir: None,
            chrome_path: None,
            wait_selector: "body".to_string(),
            print: PrintOptions::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for MergeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeConfig")
            .field("fetch_workers", &self.fetch_workers)
            .field("convert_workers", &self.convert_workers)
            .field("timeout_secs", &self.timeout_secs)
            .field("metadata", &self.metadata)
            .field("failure_policy", &self.failure_policy)
            .field("relaxed_validation", &self.relaxed_validation)
            .field("release_grace_secs", &self.release_grace_secs)
            .field("temp_dir", &self.temp_dir)
            .field("chrome_path", &self.chrome_path)
            .field("wait_selector", &self.wait_selector)
            .field("print", &self.print)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn MergeProgressCallback>"),
            )
            .finish()
    }
}

impl MergeConfig {
    /// Create a new builder for `MergeConfig`.
    pub fn builder() -> MergeConfigBuilder {
        MergeConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn release_grace(&self) -> Duration {
        Duration::from_secs(self.release_grace_secs)
    }

    /// Directory in which temp files are created.
    pub fn temp_root(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Builder for [`MergeConfig`].
pub struct MergeConfigBuilder {
    config: MergeConfig,
}

impl fmt::Debug for MergeConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl MergeConfigBuilder {
    /// Size both worker pools.
    pub fn worker(mut self, n: usize) -> Self {
        self.config.fetch_workers = n;
        self.config.convert_workers = n;
        self
    }

    pub fn fetch_workers(mut self, n: usize) -> Self {
        self.config.fetch_workers = n;
        self
    }

    pub fn convert_workers(mut self, n: usize) -> Self {
        self.config.convert_workers = n;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    pub fn metadata(mut self, meta: PdfMeta) -> Self {
        self.config.metadata = meta;
        self
    }

    pub fn author(mut self, v: impl Into<String>) -> Self {
        self.config.metadata.author = v.into();
        self
    }

    pub fn creator(mut self, v: impl Into<String>) -> Self {
        self.config.metadata.creator = v.into();
        self
    }

    pub fn subject(mut self, v: impl Into<String>) -> Self {
        self.config.metadata.subject = v.into();
        self
    }

    pub fn keywords(mut self, v: impl Into<String>) -> Self {
        self.config.metadata.keywords = v.into();
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    pub fn relaxed_validation(mut self, v: bool) -> Self {
        self.config.relaxed_validation = v;
        self
    }

    pub fn release_grace_secs(mut self, secs: u64) -> Self {
        self.config.release_grace_secs = secs;
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_dir = Some(dir.into());
        self
    }

    pub fn chrome_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.chrome_path = Some(path.into());
        self
    }

    pub fn wait_selector(mut self, selector: impl Into<String>) -> Self {
        self.config.wait_selector = selector.into();
        self
    }

    pub fn print_options(mut self, print: PrintOptions) -> Self {
        self.config.print = print;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<MergeConfig, PdfMergeError> {
        let c = &self.config;
        if c.fetch_workers == 0 || c.convert_workers == 0 {
            return Err(PdfMergeError::InvalidConfig(format!(
                "Worker pools must be ≥ 1, got fetch={} convert={}",
                c.fetch_workers, c.convert_workers
            )));
        }
        if c.timeout_secs == 0 {
            return Err(PdfMergeError::InvalidConfig("Timeout must be ≥ 1s".into()));
        }
        if c.wait_selector.trim().is_empty() {
            return Err(PdfMergeError::InvalidConfig(
                "Wait selector must not be empty".into(),
            ));
        }
        if c.print.scale <= 0.0 {
            return Err(PdfMergeError::InvalidConfig(format!(
                "Print scale must be positive, got {}",
                c.print.scale
            )));
        }
        Ok(self.config)
    }
}

// ── Config file ──────────────────────────────────────────────────────────

/// On-disk JSON configuration.
///
/// Every field is optional; anything missing falls back to the
/// [`MergeConfig`] default.
///
/// ```json
/// {
///   "worker": 4,
///   "timeout": 30,
///   "chrome_path": "/usr/bin/chromium",
///   "build_meta": { "author": "Records Office", "creator": "pdfmerge" }
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub worker: Option<usize>,
    pub fetch_worker: Option<usize>,
    pub convert_worker: Option<usize>,
    pub timeout: Option<u64>,
    pub chrome_path: Option<PathBuf>,
    pub wait_selector: Option<String>,
    pub temp_dir: Option<PathBuf>,
    pub release_grace: Option<u64>,
    pub fail_fast: bool,
    pub build_meta: PdfMeta,
}

impl ConfigFile {
    /// Read and parse a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PdfMergeError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| PdfMergeError::ConfigLoad {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        serde_json::from_str(&raw).map_err(|e| PdfMergeError::ConfigLoad {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }

    /// Override fields from `PDFMERGE_*` environment variables.
    pub fn apply_env(self) -> Self {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Override fields from an arbitrary key lookup. Unparseable numbers are ignored.
    pub fn apply_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(n) = get("PDFMERGE_WORKER").and_then(|v| v.parse().ok()) {
            self.worker = Some(n);
        }
        if let Some(n) = get("PDFMERGE_TIMEOUT").and_then(|v| v.parse().ok()) {
            self.timeout = Some(n);
        }
        if let Some(p) = get("PDFMERGE_CHROME_PATH") {
            self.chrome_path = Some(PathBuf::from(p));
        }
        if let Some(v) = get("PDFMERGE_PDF_AUTHOR") {
            self.build_meta.author = v;
        }
        if let Some(v) = get("PDFMERGE_PDF_CREATOR") {
            self.build_meta.creator = v;
        }
        if let Some(v) = get("PDFMERGE_PDF_KEYWORDS") {
            self.build_meta.keywords = v;
        }
        if let Some(v) = get("PDFMERGE_PDF_SUBJECT") {
            self.build_meta.subject = v;
        }
        self
    }

    /// Convert into a builder so callers can layer further overrides.
    pub fn into_builder(self) -> MergeConfigBuilder {
        let mut builder = MergeConfig::builder().metadata(self.build_meta);
        if let Some(n) = self.worker {
            builder = builder.worker(n);
        }
        if let Some(n) = self.fetch_worker {
            builder = builder.fetch_workers(n);
        }
        if let Some(n) = self.convert_worker {
            builder = builder.convert_workers(n);
        }
        if let Some(secs) = self.timeout {
            builder = builder.timeout_secs(secs);
        }
        if let Some(p) = self.chrome_path {
            builder = builder.chrome_path(p);
        }
        if let Some(s) = self.wait_selector {
            builder = builder.wait_selector(s);
        }
        if let Some(d) = self.temp_dir {
            builder = builder.temp_dir(d);
        }
        if let Some(secs) = self.release_grace {
            builder = builder.release_grace_secs(secs);
        }
        if self.fail_fast {
            builder = builder.failure_policy(FailurePolicy::FailFast);
        }
        builder
    }
}

// ── Metadata ─────────────────────────────────────────────────────────────

/// Document-information fields stamped on produced PDFs. Empty fields are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfMeta {
    pub author: String,
    pub creator: String,
    pub keywords: String,
    pub subject: String,
}

impl PdfMeta {
    /// Non-empty fields keyed by their PDF Info dictionary name.
    pub fn to_info_map(&self) -> BTreeMap<String, String> {
        [
            ("Author", &self.author),
            ("Creator", &self.creator),
            ("Keywords", &self.keywords),
            ("Subject", &self.subject),
        ]
        .into_iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How the batch reacts to a single item failing.
///
/// | Policy | Failed item | Rest of batch | Caller sees |
/// |--------|-------------|---------------|-------------|
/// | `BestEffort` | dropped, logged | continues | `ItemStatus::Dropped` in the report |
/// | `FailFast` | aborts batch | no new work issued | `Err(PdfMergeError::ItemFailed)` |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    #[default]
    BestEffort,
    FailFast,
}

/// Standard paper sizes, dimensions in inches (portrait).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PaperSize {
    A0,
    A1,
    A2,
    A3,
    #[default]
    A4,
    A5,
    A6,
    Letter,
    Legal,
    Tabloid,
    Ledger,
}

impl PaperSize {
    /// `(width, height)` in inches.
    pub fn inches(self) -> (f64, f64) {
        match self {
            PaperSize::A0 => (33.11, 46.81),
            PaperSize::A1 => (23.39, 33.11),
            PaperSize::A2 => (16.54, 23.39),
            PaperSize::A3 => (11.69, 16.54),
            PaperSize::A4 => (8.27, 11.69),
            PaperSize::A5 => (5.83, 8.27),
            PaperSize::A6 => (4.13, 5.83),
            PaperSize::Letter => (8.5, 11.0),
            PaperSize::Legal => (8.5, 14.0),
            PaperSize::Tabloid => (11.0, 17.0),
            PaperSize::Ledger => (17.0, 11.0),
        }
    }
}

impl FromStr for PaperSize {
    type Err = PdfMergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_uppercase().as_str() {
            "A0" => PaperSize::A0,
            "A1" => PaperSize::A1,
            "A2" => PaperSize::A2,
            "A3" => PaperSize::A3,
            "A4" => PaperSize::A4,
            "A5" => PaperSize::A5,
            "A6" => PaperSize::A6,
            "LETTER" => PaperSize::Letter,
            "LEGAL" => PaperSize::Legal,
            "TABLOID" => PaperSize::Tabloid,
            "LEDGER" => PaperSize::Ledger,
            other => {
                return Err(PdfMergeError::InvalidConfig(format!(
                    "Invalid paper type '{other}'"
                )))
            }
        })
    }
}

/// Margins in inches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Margins {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

/// Print settings handed to the render service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrintOptions {
    pub paper: PaperSize,
    /// Overrides the paper width (inches) when set.
    pub width: Option<f64>,
    /// Overrides the paper height (inches) when set.
    pub height: Option<f64>,
    pub landscape: bool,
    pub scale: f64,
    pub margins: Margins,
    pub print_background: bool,
    pub prefer_css_page_size: bool,
}

impl Default for PrintOptions {
    fn default() -> Self {
        Self {
            paper: PaperSize::A4,
            width: None,
            height: None,
            landscape: false,
            scale: 1.0,
            margins: Margins::default(),
            print_background: true,
            prefer_css_page_size: false,
        }
    }
}

impl PrintOptions {
    /// Portrait `(width, height)` in inches after applying overrides.
    pub fn paper_inches(&self) -> (f64, f64) {
        let (w, h) = self.paper.inches();
        (self.width.unwrap_or(w), self.height.unwrap_or(h))
    }

    /// `(width, height)` as laid out on screen, swapped for landscape.
    pub fn oriented_inches(&self) -> (f64, f64) {
        let (w, h) = self.paper_inches();
        if self.landscape {
            (h, w)
        } else {
            (w, h)
        }
    }

    /// `@page` rule matching the effective size and margins.
    pub fn page_css(&self) -> String {
        let (w, h) = self.oriented_inches();
        let m = &self.margins;
        format!(
            "@page {{ size: {w:.2}in {h:.2}in; margin: {:.2}in {:.2}in {:.2}in {:.2}in; }}",
            m.top, m.right, m.bottom, m.left
        )
    }
}

//! CLI binary for edgequake-pdfmerge.
//!
//! Maps flags (over an optional JSON config file and `PDFMERGE_*`
//! environment variables) to a `MergeConfig`, runs one batch and writes the
//! merged PDF to a file or stdout.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdfmerge::{
    inspect, merge, ConfigFile, FailurePolicy, ItemStatus, Kind, MergeProgressCallback,
    MergedDocument, PaperSize, Pipeline, PrintOptions, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One bar for the batch plus a log line per item. Items finish out of
/// order, so each line names its submission position.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} items  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Merging");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed(&self, index: usize) -> String {
        let ms = self
            .start_times
            .lock()
            .remove(&index)
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);
        dim(&format!("{:.1}s", ms as f64 / 1000.0))
    }
}

impl MergeProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Merging {total} references…"))
        ));
    }

    fn on_item_start(&self, index: usize, _total: usize) {
        self.start_times.lock().insert(index, Instant::now());
    }

    fn on_item_complete(&self, index: usize, total: usize, kind: Kind) {
        let elapsed = self.elapsed(index);
        self.bar.println(format!(
            "  {} #{:>3}/{:<3}  {:<6}  {}",
            green("✓"),
            index + 1,
            total,
            dim(&kind.to_string()),
            elapsed,
        ));
        self.bar.inc(1);
    }

    fn on_item_dropped(&self, index: usize, total: usize, error: &str) {
        let elapsed = self.elapsed(index);
        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} #{:>3}/{:<3}  {}  {}",
            red("✗"),
            index + 1,
            total,
            red(&msg),
            elapsed,
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, included: usize) {
        self.bar.finish_and_clear();
        let dropped = total.saturating_sub(included);
        if dropped == 0 {
            eprintln!("{} {} items merged", green("✔"), bold(&included.to_string()));
        } else {
            eprintln!(
                "{} {}/{} items merged  ({} dropped)",
                cyan("⚠"),
                bold(&included.to_string()),
                total,
                red(&dropped.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Merge local files and URLs, in order
  pdfmerge cover.pdf https://example.com/chart.png appendix.html -o bundle.pdf

  # Stream the merged PDF to stdout
  pdfmerge a.pdf b.pdf > out.pdf

  # Stop at the first failing reference
  pdfmerge --fail-fast a.pdf https://example.com/b.pdf -o out.pdf

  # Stamp metadata
  pdfmerge --author "Docs Team" --keywords "q3,report" *.pdf -o report.pdf

  # Per-item report as JSON
  pdfmerge --json a.pdf missing.pdf -o out.pdf

  # Inspect a PDF's metadata
  pdfmerge --inspect-only report.pdf

  # Print one web page to PDF
  pdfmerge --link --paper letter https://example.com/pricing -o pricing.pdf

CONFIG FILE (--config):
  {
    "worker": 4,
    "timeout": 30,
    "chrome_path": "/usr/bin/chromium",
    "wait_selector": "body",
    "fail_fast": false,
    "build_meta": { "author": "", "creator": "", "keywords": "", "subject": "" }
  }

ENVIRONMENT VARIABLES (override the config file, overridden by flags):
  PDFMERGE_WORKER         Size of the fetch and conversion pools
  PDFMERGE_TIMEOUT        Fetch and render timeout in seconds
  PDFMERGE_CHROME_PATH    Chrome/Chromium executable
  PDFMERGE_PDF_AUTHOR     Author stamped on the output
  PDFMERGE_PDF_CREATOR    Creator stamped on the output
  PDFMERGE_PDF_KEYWORDS   Keywords stamped on the output
  PDFMERGE_PDF_SUBJECT    Subject stamped on the output
"#;

/// Merge PDFs, images and HTML pages into one PDF.
#[derive(Parser, Debug)]
#[command(
    name = "pdfmerge",
    version,
    about = "Merge PDFs, images and HTML pages (local or remote) into one PDF",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local paths, file:// URLs or HTTP/HTTPS URLs, in output order.
    #[arg(required = true)]
    references: Vec<String>,

    /// Write the merged PDF to this file instead of stdout.
    #[arg(short, long, env = "PDFMERGE_OUTPUT")]
    output: Option<PathBuf>,

    /// JSON config file.
    #[arg(long, env = "PDFMERGE_CONFIG")]
    config: Option<PathBuf>,

    /// Size of both the fetch and conversion pools.
    #[arg(short, long)]
    worker: Option<usize>,

    /// Size of the fetch pool only.
    #[arg(long)]
    fetch_workers: Option<usize>,

    /// Size of the conversion pool only.
    #[arg(long)]
    convert_workers: Option<usize>,

    /// Fetch and render timeout in seconds.
    #[arg(long)]
    timeout: Option<u64>,

    /// Chrome/Chromium executable used for HTML rendering.
    #[arg(long)]
    chrome_path: Option<PathBuf>,

    /// Paper size for HTML rendering: A0–A6, Letter, Legal, Tabloid, Ledger.
    #[arg(long, default_value = "A4")]
    paper: PaperSize,

    /// Landscape orientation for HTML rendering.
    #[arg(long)]
    landscape: bool,

    #[arg(long)]
    author: Option<String>,

    #[arg(long)]
    creator: Option<String>,

    #[arg(long)]
    subject: Option<String>,

    #[arg(long)]
    keywords: Option<String>,

    /// Abort the batch at the first failing reference.
    #[arg(long, env = "PDFMERGE_FAIL_FAST")]
    fail_fast: bool,

    /// Print the per-item report and stats as JSON on stdout (requires -o).
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDFMERGE_NO_PROGRESS")]
    no_progress: bool,

    /// Print metadata of the first reference only, no merge.
    #[arg(long)]
    inspect_only: bool,

    /// Render the first reference (a URL) straight to PDF, no merge.
    #[arg(long, conflicts_with_all = ["inspect_only", "json"])]
    link: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFMERGE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDFMERGE_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; -v brings them back.
    let show_progress =
        !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only && !cli.link;
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
        .with_writer(std::io::stderr)
        .init();

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let reference = &cli.references[0];
        let config = build_config(&cli, None)?;
        let meta = inspect(reference, &config)
            .await
            .context("Failed to inspect PDF")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&meta).context("Failed to serialize metadata")?
            );
        } else {
            println!("File:         {}", reference);
            for (label, value) in [
                ("Title:      ", &meta.title),
                ("Author:     ", &meta.author),
                ("Subject:    ", &meta.subject),
                ("Keywords:   ", &meta.keywords),
                ("Creator:    ", &meta.creator),
                ("Producer:   ", &meta.producer),
            ] {
                if let Some(v) = value {
                    println!("{label}  {v}");
                }
            }
            println!("Pages:        {}", meta.page_count);
            println!("PDF Version:  {}", meta.pdf_version);
        }
        return Ok(());
    }

    // ── Single link mode ─────────────────────────────────────────────────
    if cli.link {
        let url = &cli.references[0];
        let config = build_config(&cli, None)?;
        let pipeline = Pipeline::from_config(config).context("Failed to set up renderer")?;
        let doc = pipeline
            .render_link(url, &pipeline.config().print)
            .await
            .with_context(|| format!("Failed to render {url}"))?;
        match &cli.output {
            Some(path) => {
                doc.persist(path)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                if !cli.quiet {
                    eprintln!("{}  {}  →  {}", green("✔"), url, bold(&path.display().to_string()));
                }
            }
            None => write_stdout(doc).await?,
        }
        return Ok(());
    }

    if cli.json && cli.output.is_none() {
        anyhow::bail!("--json writes the report to stdout; use -o for the PDF");
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn MergeProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Run batch ────────────────────────────────────────────────────────
    let output = merge(&cli.references, &config)
        .await
        .context("Merge failed")?;
    let stats = output.stats.clone();

    if cli.json {
        let report = serde_json::json!({
            "output": cli.output,
            "items": output.items,
            "stats": stats,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if !cli.quiet && !show_progress {
        for item in output.dropped() {
            if let ItemStatus::Dropped { stage, reason } = &item.status {
                eprintln!("  dropped #{} at {}: {}", item.index + 1, stage, reason);
            }
        }
    }

    match &cli.output {
        Some(path) => {
            output
                .document
                .persist(path)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            if !cli.quiet && !cli.json {
                eprintln!(
                    "{}  {}/{} items  {} pages  {}ms  →  {}",
                    if stats.dropped_items == 0 {
                        green("✔")
                    } else {
                        cyan("⚠")
                    },
                    stats.included_items,
                    stats.total_items,
                    stats.page_count,
                    stats.total_duration_ms,
                    bold(&path.display().to_string()),
                );
            }
        }
        None => write_stdout(output.document).await?,
    }

    Ok(())
}

/// Copy a document to stdout and delete it.
///
/// The process exits right after, so read and drop rather than deliver with
/// a deferred release.
async fn write_stdout(doc: MergedDocument) -> Result<()> {
    let bytes = doc
        .read_bytes()
        .await
        .context("Failed to read merged document")?;
    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(&bytes)
        .await
        .context("Failed to write to stdout")?;
    stdout.flush().await.context("Failed to write to stdout")?;
    Ok(())
}

/// Layer config file, environment and flags into a `MergeConfig`.
fn build_config(
    cli: &Cli,
    progress: Option<ProgressCallback>,
) -> Result<edgequake_pdfmerge::MergeConfig> {
    let file = match &cli.config {
        Some(path) => ConfigFile::load(path).context("Failed to load config file")?,
        None => ConfigFile::default(),
    };
    let mut builder = file.apply_env().into_builder();

    if let Some(n) = cli.worker {
        builder = builder.worker(n);
    }
    if let Some(n) = cli.fetch_workers {
        builder = builder.fetch_workers(n);
    }
    if let Some(n) = cli.convert_workers {
        builder = builder.convert_workers(n);
    }
    if let Some(secs) = cli.timeout {
        builder = builder.timeout_secs(secs);
    }
    if let Some(ref p) = cli.chrome_path {
        builder = builder.chrome_path(p.clone());
    }
    if let Some(ref v) = cli.author {
        builder = builder.author(v.clone());
    }
    if let Some(ref v) = cli.creator {
        builder = builder.creator(v.clone());
    }
    if let Some(ref v) = cli.subject {
        builder = builder.subject(v.clone());
    }
    if let Some(ref v) = cli.keywords {
        builder = builder.keywords(v.clone());
    }
    if cli.fail_fast {
        builder = builder.failure_policy(FailurePolicy::FailFast);
    }
    builder = builder.print_options(PrintOptions {
        paper: cli.paper,
        landscape: cli.landscape,
        ..PrintOptions::default()
    });
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

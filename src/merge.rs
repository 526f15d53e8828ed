//! Batch orchestration and the top-level entry points.
//!
//! ## Fan-out / fan-in
//!
//! Every reference becomes one future that runs resolve → classify →
//! dispatch for that item alone, so an image that is already local starts
//! converting while a sibling is still downloading. The futures are polled
//! together from a [`FuturesUnordered`]; the fetch and conversion semaphores
//! inside the components decide how many actually do work at once.
//!
//! Results arrive in completion order. The collector is the only writer of
//! the result slots, and writes slot `i` for item `i`, so submission order
//! is recovered without sorting a shared list or taking a lock.
//!
//! ## Failure policy
//!
//! [`FailurePolicy::BestEffort`] drops failing items, logs them, and reports
//! them in [`MergeOutput::items`]. [`FailurePolicy::FailFast`] cancels the
//! remaining items at the first failure and returns
//! [`PdfMergeError::ItemFailed`]. Either way, a merge failure is fatal and a
//! batch with no survivors is [`PdfMergeError::NothingToMerge`].

use crate::backend::lopdf::LopdfLibrary;
use crate::backend::raster::ImageRasterizer;
use crate::backend::{self, PdfLibrary, Rasterizer, RenderService};
use crate::config::{FailurePolicy, MergeConfig, PrintOptions};
use crate::error::{ItemError, PdfMergeError};
use crate::output::{DocumentMetadata, ItemReport, ItemStatus, MergeOutput, MergeStats, MergedDocument};
use crate::pipeline::assemble::Assembler;
use crate::pipeline::classify::Kind;
use crate::pipeline::dispatch::{self, ConversionResult, Dispatcher};
use crate::pipeline::janitor::{CreatedBy, Janitor};
use crate::pipeline::resolve::{Origin, Resolver};
use crate::progress::{MergeProgressCallback, NoopProgressCallback};
use futures::stream::{FuturesUnordered, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

static NOOP_PROGRESS: NoopProgressCallback = NoopProgressCallback;

/// What one item produced, written into its slot by the collector.
struct Slot {
    kind: Option<Kind>,
    origin: Option<Origin>,
    outcome: Result<PathBuf, ItemError>,
}

/// The five components wired together for one configuration.
///
/// A pipeline can run any number of batches; each batch gets its own
/// [`Janitor`], while the fetch and conversion pools are shared.
pub struct Pipeline {
    config: MergeConfig,
    resolver: Resolver,
    dispatcher: Dispatcher,
    assembler: Assembler,
}

impl Pipeline {
    /// Pipeline with the default collaborators for this build.
    pub fn from_config(config: MergeConfig) -> Result<Self, PdfMergeError> {
        let render = backend::default_renderer(&config);
        Self::with_backends(
            config,
            render,
            Arc::new(ImageRasterizer::new()),
            Arc::new(LopdfLibrary::new()),
        )
    }

    /// Pipeline with caller-supplied collaborators.
    pub fn with_backends(
        config: MergeConfig,
        render: Arc<dyn RenderService>,
        raster: Arc<dyn Rasterizer>,
        pdf: Arc<dyn PdfLibrary>,
    ) -> Result<Self, PdfMergeError> {
        let resolver = Resolver::new(config.fetch_workers, config.timeout())
            .map_err(|e| PdfMergeError::Internal(format!("HTTP client: {e}")))?;
        let dispatcher = Dispatcher::new(
            render,
            raster,
            config.convert_workers,
            config.timeout(),
            config.print.clone(),
        );
        let assembler = Assembler::new(pdf, config.relaxed_validation, &config.metadata);
        Ok(Self {
            config,
            resolver,
            dispatcher,
            assembler,
        })
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    /// Fetch, convert and merge `references` in order.
    pub async fn run<S: AsRef<str>>(&self, references: &[S]) -> Result<MergeOutput, PdfMergeError> {
        self.run_with_cancel(references, CancellationToken::new())
            .await
    }

    /// [`run`](Self::run), stopping early once `cancel` fires.
    ///
    /// Items not yet finished are abandoned and their temp files released;
    /// the call returns [`PdfMergeError::Cancelled`].
    pub async fn run_with_cancel<S: AsRef<str>>(
        &self,
        references: &[S],
        cancel: CancellationToken,
    ) -> Result<MergeOutput, PdfMergeError> {
        let start = Instant::now();
        let total = references.len();
        let progress = self.progress();
        let janitor = self.janitor().await?;
        // Child token: fail-fast cancels the batch without touching the caller's token.
        let batch = cancel.child_token();

        info!(total, fetch_workers = self.config.fetch_workers, convert_workers = self.config.convert_workers, "Starting batch");
        progress.on_batch_start(total);

        let mut in_flight = FuturesUnordered::new();
        for (index, reference) in references.iter().enumerate() {
            let reference = reference.as_ref();
            let janitor = &janitor;
            let batch = &batch;
            in_flight.push(async move {
                let slot = tokio::select! {
                    biased;
                    _ = batch.cancelled() => None,
                    slot = self.process_item(index, reference, total, janitor) => Some(slot),
                };
                (index, slot)
            });
        }

        let mut slots: Vec<Option<Slot>> = (0..total).map(|_| None).collect();
        let mut first_failure: Option<(usize, ItemError)> = None;

        while let Some((index, slot)) = in_flight.next().await {
            let Some(slot) = slot else { continue };
            let reference = references[index].as_ref();
            match &slot.outcome {
                Ok(_) => {
                    progress.on_item_complete(index, total, slot.kind.unwrap_or(Kind::Pdf));
                }
                Err(e) => {
                    warn!(index, reference, stage = %e.stage(), "Dropping item: {}", e);
                    progress.on_item_dropped(index, total, &e.to_string());
                    if self.config.failure_policy == FailurePolicy::FailFast && first_failure.is_none() {
                        first_failure = Some((index, e.clone()));
                        batch.cancel();
                    }
                }
            }
            slots[index] = Some(slot);
        }
        drop(in_flight);

        if let Some((index, source)) = first_failure {
            return Err(PdfMergeError::ItemFailed {
                index,
                reference: references[index].as_ref().to_string(),
                source,
            });
        }
        if cancel.is_cancelled() {
            let completed = slots.iter().filter(|s| s.is_some()).count();
            info!(completed, total, "Batch cancelled");
            return Err(PdfMergeError::Cancelled { completed, total });
        }

        let mut items = Vec::with_capacity(total);
        let mut results = Vec::with_capacity(total);
        for (index, slot) in slots.into_iter().enumerate() {
            let reference = references[index].as_ref().to_string();
            let Some(slot) = slot else {
                return Err(PdfMergeError::Internal(format!(
                    "item {index} finished without a result"
                )));
            };
            let status = match &slot.outcome {
                Ok(_) => ItemStatus::Included,
                Err(e) => ItemStatus::from(e),
            };
            items.push(ItemReport {
                index,
                reference,
                kind: slot.kind,
                origin: slot.origin,
                status,
            });
            results.push(ConversionResult {
                index,
                outcome: slot.outcome,
            });
        }

        let included = items.iter().filter(|r| r.is_included()).count();
        let assembly = self.assembler.assemble(results, total, &janitor).await?;
        let released = janitor.release();
        debug!(released, "Released batch temp files");

        let stats = MergeStats {
            total_items: total,
            included_items: included,
            dropped_items: total - included,
            page_count: assembly.page_count,
            merged: assembly.merged,
            total_duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            included,
            dropped = stats.dropped_items,
            pages = stats.page_count,
            ms = stats.total_duration_ms,
            "Batch complete"
        );
        progress.on_batch_complete(total, included);

        Ok(MergeOutput {
            document: MergedDocument::new(assembly.resource, self.config.release_grace()),
            items,
            stats,
        })
    }

    /// Render one URL to PDF and stamp metadata.
    pub async fn render_link(
        &self,
        url: &str,
        options: &PrintOptions,
    ) -> Result<MergedDocument, PdfMergeError> {
        let janitor = self.janitor().await?;
        let path = self
            .dispatcher
            .render_url(url, options, &janitor)
            .await
            .map_err(|e| PdfMergeError::RenderFailed {
                url: url.to_string(),
                detail: e.to_string(),
            })?;
        let assembly = self.assembler.finish(&path, &janitor, false).await?;
        Ok(MergedDocument::new(assembly.resource, self.config.release_grace()))
    }

    /// Render an HTML document given as bytes, with the configured print options.
    pub async fn render_html(&self, html: &[u8]) -> Result<MergedDocument, PdfMergeError> {
        let janitor = self.janitor().await?;
        let render_err = |detail: String| PdfMergeError::RenderFailed {
            url: "<inline html>".to_string(),
            detail,
        };

        let source = janitor
            .create("html", CreatedBy::Render)
            .map_err(|e| render_err(e.to_string()))?;
        tokio::fs::write(&source, html)
            .await
            .map_err(|e| render_err(e.to_string()))?;
        let url = dispatch::file_url(&source).map_err(render_err)?;

        let path = self
            .dispatcher
            .render_url(url.as_str(), &self.config.print, &janitor)
            .await
            .map_err(|e| render_err(e.to_string()))?;
        let assembly = self.assembler.finish(&path, &janitor, false).await?;
        Ok(MergedDocument::new(assembly.resource, self.config.release_grace()))
    }

    async fn process_item(
        &self,
        index: usize,
        reference: &str,
        total: usize,
        janitor: &Janitor,
    ) -> Slot {
        self.progress().on_item_start(index, total);

        let job = match self.resolver.resolve(reference, index, janitor).await {
            Ok(job) => job,
            Err(e) => {
                return Slot {
                    kind: None,
                    origin: None,
                    outcome: Err(e),
                }
            }
        };
        debug!(index, reference, kind = %job.kind, origin = ?job.origin, "Classified");

        let outcome = if job.kind.is_supported() {
            self.dispatcher.convert(&job, janitor).await.outcome
        } else {
            Err(dispatch::unsupported(&job))
        };
        Slot {
            kind: Some(job.kind),
            origin: Some(job.origin),
            outcome,
        }
    }

    async fn janitor(&self) -> Result<Janitor, PdfMergeError> {
        let root = self.config.temp_root();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| PdfMergeError::Internal(format!("temp dir {}: {e}", root.display())))?;
        Ok(Janitor::new(root))
    }

    fn progress(&self) -> &dyn MergeProgressCallback {
        match &self.config.progress_callback {
            Some(cb) => cb.as_ref(),
            None => &NOOP_PROGRESS,
        }
    }
}

// ── Free-function entry points ───────────────────────────────────────────

/// Fetch, convert and merge `references` with the default collaborators.
///
/// Returns `Ok` as long as at least one item survives and the merge
/// succeeds; check [`MergeOutput::dropped`] for omitted items.
///
/// ```rust,no_run
/// use edgequake_pdfmerge::{merge, MergeConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = MergeConfig::builder().worker(4).author("Docs Team").build()?;
/// let output = merge(&["cover.pdf", "https://example.com/chart.png"], &config).await?;
/// for item in output.dropped() {
///     eprintln!("dropped #{}: {:?}", item.index, item.status);
/// }
/// output.document.persist("bundle.pdf").await?;
/// # Ok(())
/// # }
/// ```
pub async fn merge<S: AsRef<str>>(
    references: &[S],
    config: &MergeConfig,
) -> Result<MergeOutput, PdfMergeError> {
    Pipeline::from_config(config.clone())?.run(references).await
}

/// Merge and move the result to `dest`.
pub async fn merge_to_file<S: AsRef<str>>(
    references: &[S],
    dest: impl AsRef<Path>,
    config: &MergeConfig,
) -> Result<MergeStats, PdfMergeError> {
    let output = merge(references, config).await?;
    output.document.persist(dest).await?;
    Ok(output.stats)
}

/// Synchronous wrapper around [`merge`].
///
/// Creates a temporary tokio runtime internally. The returned document must
/// be persisted or read before it is dropped; its deferred release needs a
/// runtime and otherwise happens immediately.
pub fn merge_sync<S: AsRef<str>>(
    references: &[S],
    config: &MergeConfig,
) -> Result<MergeOutput, PdfMergeError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| PdfMergeError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(merge(references, config))
}

/// Read document-information fields and page count of a PDF path or URL.
///
/// Remote references are fetched with the configured timeout into the
/// configured temp directory and removed before returning.
pub async fn inspect(
    reference: impl AsRef<str>,
    config: &MergeConfig,
) -> Result<DocumentMetadata, PdfMergeError> {
    let reference = reference.as_ref();
    let inspect_err = |detail: String| PdfMergeError::InspectFailed {
        reference: reference.to_string(),
        detail,
    };

    let resolver =
        Resolver::new(1, config.timeout()).map_err(|e| inspect_err(e.to_string()))?;
    let root = config.temp_root();
    tokio::fs::create_dir_all(&root)
        .await
        .map_err(|e| inspect_err(format!("temp dir {}: {e}", root.display())))?;
    let janitor = Janitor::new(root);
    let job = resolver
        .resolve(reference, 0, &janitor)
        .await
        .map_err(|e| inspect_err(e.to_string()))?;
    if job.kind != Kind::Pdf {
        return Err(inspect_err(format!("not a PDF ({})", job.kind)));
    }

    let path = job.path.clone();
    let metadata = tokio::task::spawn_blocking(move || LopdfLibrary::new().read_metadata(&path))
        .await
        .map_err(|e| inspect_err(format!("task panicked: {e}")))?
        .map_err(|e| inspect_err(e.to_string()))?;
    Ok(metadata)
}

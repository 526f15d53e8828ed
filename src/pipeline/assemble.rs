//! Ordered assembly: merge surviving PDFs by submission index, then stamp
//! metadata.
//!
//! ## Single survivor
//!
//! With exactly one surviving PDF the merge library is not called at all, so
//! the document is structurally untouched. Only its info dictionary changes.
//! If that PDF is the caller's own local file it is first copied into a
//! tracked temp file; stamping never writes to, and release never deletes, a
//! file the pipeline did not create.
//!
//! ## Metadata
//!
//! Stamping failures are logged and swallowed. The unstamped document is
//! still a valid answer.

use crate::backend::PdfLibrary;
use crate::config::PdfMeta;
use crate::error::{MetadataError, PdfMergeError};
use crate::pipeline::dispatch::ConversionResult;
use crate::pipeline::janitor::{CreatedBy, Janitor, TrackedResource};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// The assembled document, already detached from the batch janitor.
#[derive(Debug)]
pub struct Assembly {
    pub resource: TrackedResource,
    /// Whether the PDF library merged several inputs.
    pub merged: bool,
    pub page_count: usize,
}

pub struct Assembler {
    pdf: Arc<dyn PdfLibrary>,
    relaxed: bool,
    metadata: BTreeMap<String, String>,
}

impl Assembler {
    pub fn new(pdf: Arc<dyn PdfLibrary>, relaxed: bool, metadata: &PdfMeta) -> Self {
        Self {
            pdf,
            relaxed,
            metadata: metadata.to_info_map(),
        }
    }

    /// Merge the successful results in ascending index order.
    ///
    /// `total` is the batch size, used only for the error when nothing
    /// survived.
    pub async fn assemble(
        &self,
        results: Vec<ConversionResult>,
        total: usize,
        janitor: &Janitor,
    ) -> Result<Assembly, PdfMergeError> {
        let mut survivors: Vec<(usize, PathBuf)> = results
            .into_iter()
            .filter_map(|r| r.outcome.ok().map(|path| (r.index, path)))
            .collect();
        survivors.sort_by_key(|(index, _)| *index);
        let paths: Vec<PathBuf> = survivors.into_iter().map(|(_, p)| p).collect();

        match paths.as_slice() {
            [] => Err(PdfMergeError::NothingToMerge { total }),
            [only] => {
                let path = self.own_copy(only, janitor).await?;
                debug!(path = %path.display(), "Single survivor, skipping merge");
                self.finish(&path, janitor, false).await
            }
            _ => {
                let dest = janitor
                    .create("pdf", CreatedBy::Assemble)
                    .map_err(|e| PdfMergeError::Internal(format!("temp file: {e}")))?;
                self.merge(paths, &dest).await?;
                self.finish(&dest, janitor, true).await
            }
        }
    }

    /// Stamp metadata on a pipeline-owned PDF and take it out of the janitor.
    pub async fn finish(
        &self,
        path: &Path,
        janitor: &Janitor,
        merged: bool,
    ) -> Result<Assembly, PdfMergeError> {
        if let Err(e) = self.stamp(path).await {
            warn!(path = %path.display(), "Metadata not stamped: {}", e);
        }
        let page_count = self.page_count(path).await;
        let resource = janitor.detach(path).ok_or_else(|| {
            PdfMergeError::Internal(format!("{} is not a tracked file", path.display()))
        })?;
        Ok(Assembly {
            resource,
            merged,
            page_count,
        })
    }

    /// Rewrite the configured document-information fields in place.
    pub async fn stamp(&self, path: &Path) -> Result<(), MetadataError> {
        if self.metadata.is_empty() {
            return Ok(());
        }
        let pdf = Arc::clone(&self.pdf);
        let fields = self.metadata.clone();
        let target = path.to_path_buf();
        let metadata_err = |detail: String| MetadataError {
            path: path.to_path_buf(),
            detail,
        };

        tokio::task::spawn_blocking(move || pdf.set_metadata(&target, &fields))
            .await
            .map_err(|e| metadata_err(format!("task panicked: {e}")))?
            .map_err(|e| metadata_err(e.to_string()))?;
        debug!(path = %path.display(), fields = self.metadata.len(), "Stamped metadata");
        Ok(())
    }

    async fn merge(&self, inputs: Vec<PathBuf>, dest: &Path) -> Result<(), PdfMergeError> {
        let count = inputs.len();
        let pdf = Arc::clone(&self.pdf);
        let relaxed = self.relaxed;
        let target = dest.to_path_buf();
        let merge_err = |detail: String| {
            error!(inputs = count, dest = %dest.display(), "Merge failed: {}", detail);
            PdfMergeError::MergeFailed {
                inputs: count,
                dest: dest.to_path_buf(),
                detail,
            }
        };

        tokio::task::spawn_blocking(move || pdf.merge(&inputs, &target, relaxed))
            .await
            .map_err(|e| merge_err(format!("merge task panicked: {e}")))?
            .map_err(|e| merge_err(e.to_string()))?;
        info!(inputs = count, dest = %dest.display(), "Merged documents");
        Ok(())
    }

    async fn own_copy(&self, path: &Path, janitor: &Janitor) -> Result<PathBuf, PdfMergeError> {
        if janitor.is_tracked(path) {
            return Ok(path.to_path_buf());
        }
        let copy = janitor
            .create("pdf", CreatedBy::Assemble)
            .map_err(|e| PdfMergeError::Internal(format!("temp file: {e}")))?;
        tokio::fs::copy(path, &copy)
            .await
            .map_err(|e| PdfMergeError::Internal(format!("copy {}: {e}", path.display())))?;
        Ok(copy)
    }

    async fn page_count(&self, path: &Path) -> usize {
        let pdf = Arc::clone(&self.pdf);
        let target = path.to_path_buf();
        match tokio::task::spawn_blocking(move || pdf.read_metadata(&target)).await {
            Ok(Ok(meta)) => meta.page_count,
            Ok(Err(e)) => {
                debug!(path = %path.display(), "Could not read back page count: {}", e);
                0
            }
            Err(_) => 0,
        }
    }
}

//! Output types: the merged artifact, per-item reports and batch stats.

use crate::error::{ItemError, PdfMergeError, Stage};
use crate::pipeline::classify::Kind;
use crate::pipeline::janitor::TrackedResource;
use crate::pipeline::resolve::Origin;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Result of a successful batch.
#[derive(Debug)]
pub struct MergeOutput {
    /// The merged (or single pass-through) PDF.
    pub document: MergedDocument,
    /// One report per submitted reference, in submission order.
    pub items: Vec<ItemReport>,
    pub stats: MergeStats,
}

impl MergeOutput {
    /// Reports for items that did not make it into the document.
    pub fn dropped(&self) -> impl Iterator<Item = &ItemReport> {
        self.items.iter().filter(|r| !r.is_included())
    }
}

/// What happened to one submitted reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemReport {
    pub index: usize,
    pub reference: String,
    /// `None` when the item never got as far as classification.
    pub kind: Option<Kind>,
    pub origin: Option<Origin>,
    pub status: ItemStatus,
}

impl ItemReport {
    pub fn is_included(&self) -> bool {
        matches!(self.status, ItemStatus::Included)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    Included,
    Dropped { stage: Stage, reason: String },
}

impl From<&ItemError> for ItemStatus {
    fn from(e: &ItemError) -> Self {
        ItemStatus::Dropped {
            stage: e.stage(),
            reason: e.to_string(),
        }
    }
}

/// Counters for one batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeStats {
    pub total_items: usize,
    pub included_items: usize,
    pub dropped_items: usize,
    /// Pages in the output document; 0 if it could not be read back.
    pub page_count: usize,
    /// Whether the PDF library was invoked (false for a single survivor).
    pub merged: bool,
    pub total_duration_ms: u64,
}

/// Document-information fields and page count of a PDF.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
}

/// The response-bound PDF produced by a batch or a single render.
///
/// The file is the one temp file not released with the rest of the batch.
/// Ownership moves here instead, and one of the consuming methods decides
/// when it goes away:
///
/// * [`deliver`](Self::deliver) streams it to a writer, then deletes it after
///   the grace window.
/// * [`persist`](Self::persist) moves it to a permanent location.
/// * [`release_after`](Self::release_after) schedules deletion explicitly.
///
/// Dropping a document without calling any of them deletes the file at once.
#[derive(Debug)]
pub struct MergedDocument {
    path: PathBuf,
    owned: Option<TrackedResource>,
    grace: Duration,
}

impl MergedDocument {
    pub(crate) fn new(resource: TrackedResource, grace: Duration) -> Self {
        Self {
            path: resource.path.clone(),
            owned: Some(resource),
            grace,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The whole file in memory.
    pub async fn read_bytes(&self) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }

    /// Stream the file into `writer`, then release it after the grace window.
    ///
    /// Returns the number of bytes written. On a write error the file is
    /// released immediately.
    pub async fn deliver<W>(mut self, writer: &mut W) -> std::io::Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut file = tokio::fs::File::open(&self.path).await?;
        let written = tokio::io::copy(&mut file, writer).await?;
        writer.flush().await?;
        drop(file);

        debug!(path = %self.path.display(), bytes = written, "Delivered document");
        if let Some(owned) = self.owned.take() {
            owned.remove_after(self.grace);
        }
        Ok(written)
    }

    /// Move the file to `dest`, creating parent directories as needed.
    ///
    /// Falls back to copy-then-rename when `dest` is on another filesystem,
    /// so a partially written `dest` is never observed.
    pub async fn persist(mut self, dest: impl AsRef<Path>) -> Result<PathBuf, PdfMergeError> {
        let dest = dest.as_ref().to_path_buf();
        let write_err = |source| PdfMergeError::OutputWriteFailed {
            path: dest.clone(),
            source,
        };

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        if tokio::fs::rename(&self.path, &dest).await.is_err() {
            let tmp = dest.with_extension("pdf.tmp");
            tokio::fs::copy(&self.path, &tmp).await.map_err(write_err)?;
            tokio::fs::rename(&tmp, &dest).await.map_err(write_err)?;
        }

        if let Some(owned) = self.owned.take() {
            owned.remove();
        }
        Ok(dest)
    }

    /// Keep the file for `grace`, then delete it.
    pub fn release_after(mut self, grace: Duration) {
        if let Some(owned) = self.owned.take() {
            owned.remove_after(grace);
        }
    }
}

impl Drop for MergedDocument {
    fn drop(&mut self) {
        if let Some(owned) = self.owned.take() {
            owned.remove();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::janitor::{CreatedBy, Janitor};

    fn document(dir: &Path, body: &[u8]) -> MergedDocument {
        let janitor = Janitor::new(dir);
        let path = janitor.create("pdf", CreatedBy::Assemble).unwrap();
        std::fs::write(&path, body).unwrap();
        let owned = janitor.detach(&path).unwrap();
        MergedDocument::new(owned, Duration::from_millis(50))
    }

    #[tokio::test]
    async fn deliver_streams_then_releases_after_grace() {
        let dir = tempfile::tempdir().unwrap();
        let doc = document(dir.path(), b"%PDF-1.5 body");
        let path = doc.path().to_path_buf();

        let mut sink: Vec<u8> = Vec::new();
        let n = doc.deliver(&mut sink).await.unwrap();
        assert_eq!(n, 13);
        assert_eq!(sink, b"%PDF-1.5 body");
        assert!(path.exists(), "released before grace elapsed");

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn persist_moves_file() {
        let dir = tempfile::tempdir().unwrap();
        let doc = document(dir.path(), b"%PDF");
        let src = doc.path().to_path_buf();
        let dest = dir.path().join("out/final.pdf");

        let written = doc.persist(&dest).await.unwrap();
        assert_eq!(written, dest);
        assert_eq!(std::fs::read(&dest).unwrap(), b"%PDF");
        assert!(!src.exists());
    }

    #[tokio::test]
    async fn dropping_undelivered_document_deletes_it() {
        let dir = tempfile::tempdir().unwrap();
        let doc = document(dir.path(), b"%PDF");
        let path = doc.path().to_path_buf();
        assert_eq!(doc.read_bytes().await.unwrap(), b"%PDF");
        drop(doc);
        assert!(!path.exists());
    }

    #[test]
    fn dropped_status_carries_stage_and_reason() {
        let err = ItemError::UnsupportedType {
            name: "notes.docx".into(),
        };
        let status = ItemStatus::from(&err);
        assert_eq!(
            status,
            ItemStatus::Dropped {
                stage: Stage::Classify,
                reason: err.to_string(),
            }
        );
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "dropped");
        assert_eq!(json["stage"], "classify");
    }
}

//! Conversion dispatch: route each job to the converter for its kind.
//!
//! | Kind    | Action |
//! |---------|--------|
//! | PDF     | pass through, no temp file, no converter call |
//! | Image   | [`Rasterizer`] into a tracked `.pdf` |
//! | HTML    | [`RenderService`] on the file's `file://` URL, under the timeout |
//! | Unknown | [`ItemError::UnsupportedType`] |
//!
//! Image and HTML conversions share one semaphore sized by
//! `convert_workers`, separate from the fetch pool in [`super::resolve`].

use crate::backend::{Rasterizer, RenderService};
use crate::config::PrintOptions;
use crate::error::{BackendError, ItemError};
use crate::pipeline::classify::Kind;
use crate::pipeline::janitor::{CreatedBy, Janitor};
use crate::pipeline::resolve::Job;
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info};

/// Outcome of converting one job.
#[derive(Debug)]
pub struct ConversionResult {
    pub index: usize,
    pub outcome: Result<PathBuf, ItemError>,
}

pub struct Dispatcher {
    render: Arc<dyn RenderService>,
    raster: Arc<dyn Rasterizer>,
    permits: Arc<Semaphore>,
    timeout: Duration,
    print: PrintOptions,
}

impl Dispatcher {
    pub fn new(
        render: Arc<dyn RenderService>,
        raster: Arc<dyn Rasterizer>,
        workers: usize,
        timeout: Duration,
        print: PrintOptions,
    ) -> Self {
        Self {
            render,
            raster,
            permits: Arc::new(Semaphore::new(workers.max(1))),
            timeout,
            print,
        }
    }

    /// Convert `job` into a PDF path.
    pub async fn convert(&self, job: &Job, janitor: &Janitor) -> ConversionResult {
        let outcome = match job.kind {
            Kind::Pdf => {
                debug!(index = job.index, reference = %job.reference, "PDF passes through");
                Ok(job.path.clone())
            }
            Kind::Image => self.rasterize(job, janitor).await,
            Kind::Html => self.render_file(job, janitor).await,
            Kind::Unknown => Err(unsupported(job)),
        };
        ConversionResult {
            index: job.index,
            outcome,
        }
    }

    /// Render `url` to a tracked PDF with `options`, under the conversion pool
    /// and timeout.
    pub async fn render_url(
        &self,
        url: &str,
        options: &PrintOptions,
        janitor: &Janitor,
    ) -> Result<PathBuf, ItemError> {
        let source = PathBuf::from(url);
        let dest = janitor
            .create("pdf", CreatedBy::Convert)
            .map_err(|e| conversion_err(&source, e))?;

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| conversion_err(&source, e))?;

        let secs = self.timeout.as_secs();
        let rendered = tokio::time::timeout(
            self.timeout,
            self.render.render(url, &dest, self.timeout, options),
        )
        .await;

        match rendered {
            Ok(Ok(())) => {
                info!(url, dest = %dest.display(), "Rendered");
                Ok(dest)
            }
            Ok(Err(BackendError::Timeout { .. })) | Err(_) => Err(ItemError::ConversionTimeout {
                path: source,
                secs,
            }),
            Ok(Err(e)) => Err(conversion_err(&source, e)),
        }
    }

    async fn rasterize(&self, job: &Job, janitor: &Janitor) -> Result<PathBuf, ItemError> {
        let dest = janitor
            .create("pdf", CreatedBy::Convert)
            .map_err(|e| conversion_err(&job.path, e))?;

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| conversion_err(&job.path, e))?;

        self.raster
            .rasterize(&job.path, &dest)
            .await
            .map_err(|e| conversion_err(&job.path, e))?;
        debug!(index = job.index, reference = %job.reference, dest = %dest.display(), "Rasterized");
        Ok(dest)
    }

    async fn render_file(&self, job: &Job, janitor: &Janitor) -> Result<PathBuf, ItemError> {
        let url = file_url(&job.path).map_err(|e| conversion_err(&job.path, e))?;
        self.render_url(url.as_str(), &self.print, janitor)
            .await
            .map_err(|e| match e {
                ItemError::ConversionTimeout { secs, .. } => ItemError::ConversionTimeout {
                    path: job.path.clone(),
                    secs,
                },
                ItemError::Conversion { detail, .. } => ItemError::Conversion {
                    path: job.path.clone(),
                    detail,
                },
                other => other,
            })
    }
}

/// The error for a job whose kind has no converter.
pub fn unsupported(job: &Job) -> ItemError {
    ItemError::UnsupportedType {
        name: job
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| job.reference.clone()),
    }
}

/// `file://` URL for a local path, made absolute first.
pub fn file_url(path: &Path) -> Result<Url, String> {
    let absolute = std::fs::canonicalize(path).map_err(|e| e.to_string())?;
    Url::from_file_path(&absolute).map_err(|_| format!("cannot express {} as a URL", absolute.display()))
}

fn conversion_err(path: &Path, e: impl std::fmt::Display) -> ItemError {
    ItemError::Conversion {
        path: path.to_path_buf(),
        detail: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::resolve::Origin;
    use async_trait::async_trait;

    struct FailingRaster;

    #[async_trait]
    impl Rasterizer for FailingRaster {
        async fn rasterize(&self, _image: &Path, _dest: &Path) -> Result<(), BackendError> {
            Err(BackendError::Image("corrupt".into()))
        }
    }

    struct SlowRender;

    #[async_trait]
    impl RenderService for SlowRender {
        async fn render(
            &self,
            _url: &str,
            _dest: &Path,
            _timeout: Duration,
            _options: &PrintOptions,
        ) -> Result<(), BackendError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }

    fn job(path: PathBuf, kind: Kind) -> Job {
        Job {
            reference: path.display().to_string(),
            path,
            index: 3,
            origin: Origin::Local,
            kind,
        }
    }

    fn dispatcher(timeout: Duration) -> Dispatcher {
        Dispatcher::new(
            Arc::new(SlowRender),
            Arc::new(FailingRaster),
            1,
            timeout,
            PrintOptions::default(),
        )
    }

    #[tokio::test]
    async fn pdf_passes_through_without_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let janitor = Janitor::new(dir.path());
        let src = dir.path().join("a.pdf");
        std::fs::write(&src, b"%PDF").unwrap();

        let result = dispatcher(Duration::from_secs(1))
            .convert(&job(src.clone(), Kind::Pdf), &janitor)
            .await;
        assert_eq!(result.index, 3);
        assert_eq!(result.outcome.unwrap(), src);
        assert!(janitor.is_empty());
    }

    #[tokio::test]
    async fn unknown_kind_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let janitor = Janitor::new(dir.path());
        let result = dispatcher(Duration::from_secs(1))
            .convert(&job(dir.path().join("notes.docx"), Kind::Unknown), &janitor)
            .await;
        assert!(matches!(
            result.outcome,
            Err(ItemError::UnsupportedType { ref name }) if name == "notes.docx"
        ));
    }

    #[tokio::test]
    async fn rasterizer_failure_is_conversion_error() {
        let dir = tempfile::tempdir().unwrap();
        let janitor = Janitor::new(dir.path());
        let src = dir.path().join("b.png");
        std::fs::write(&src, b"png").unwrap();

        let result = dispatcher(Duration::from_secs(1))
            .convert(&job(src, Kind::Image), &janitor)
            .await;
        assert!(matches!(result.outcome, Err(ItemError::Conversion { .. })));
        // The destination was tracked before the call and is still released.
        assert_eq!(janitor.len(), 1);
    }

    #[tokio::test]
    async fn slow_render_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let janitor = Janitor::new(dir.path());
        let src = dir.path().join("c.html");
        std::fs::write(&src, b"<html></html>").unwrap();

        let result = dispatcher(Duration::from_millis(100))
            .convert(&job(src.clone(), Kind::Html), &janitor)
            .await;
        match result.outcome {
            Err(ItemError::ConversionTimeout { path, .. }) => assert_eq!(path, src),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn file_url_is_absolute() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("page.html");
        std::fs::write(&src, b"").unwrap();
        let url = file_url(&src).unwrap();
        assert_eq!(url.scheme(), "file");
        assert!(url.path().ends_with("/page.html"));
        assert!(file_url(&dir.path().join("missing.html")).is_err());
    }
}

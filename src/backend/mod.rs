//! External collaborators consumed by the pipeline.
//!
//! The pipeline only sees these traits, so tests can substitute instrumented
//! fakes and deployments can swap the browser or PDF engine.
//!
//! | Trait | Default implementation |
//! |-------|------------------------|
//! | [`RenderService`] | [`chrome::ChromeRenderer`] (feature `chrome`) |
//! | [`Rasterizer`]    | [`raster::ImageRasterizer`] |
//! | [`PdfLibrary`]    | [`lopdf::LopdfLibrary`] |
//!
//! Implementations write their output to a destination path chosen (and
//! tracked for cleanup) by the caller.

#[cfg(feature = "chrome")]
pub mod chrome;
pub mod lopdf;
pub mod raster;

use crate::config::{MergeConfig, PrintOptions};
use crate::error::BackendError;
use crate::output::DocumentMetadata;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Turns a URL into PDF bytes written at `dest`.
#[async_trait]
pub trait RenderService: Send + Sync {
    async fn render(
        &self,
        url: &str,
        dest: &Path,
        timeout: Duration,
        options: &PrintOptions,
    ) -> Result<(), BackendError>;
}

/// Turns a raster image into a single-page PDF written at `dest`.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    async fn rasterize(&self, image: &Path, dest: &Path) -> Result<(), BackendError>;
}

/// Structural PDF operations. Methods are blocking; callers run them on the
/// blocking pool.
pub trait PdfLibrary: Send + Sync {
    /// Concatenate `inputs` in order into `dest`.
    fn merge(&self, inputs: &[PathBuf], dest: &Path, relaxed: bool) -> Result<(), BackendError>;

    /// Rewrite document-information entries in place.
    fn set_metadata(&self, path: &Path, fields: &BTreeMap<String, String>)
        -> Result<(), BackendError>;

    /// Read document-information entries and page count.
    fn read_metadata(&self, path: &Path) -> Result<DocumentMetadata, BackendError>;
}

/// Default renderer for this build.
pub fn default_renderer(config: &MergeConfig) -> Arc<dyn RenderService> {
    #[cfg(feature = "chrome")]
    {
        Arc::new(chrome::ChromeRenderer::new(
            config.chrome_path.clone(),
            config.wait_selector.clone(),
        ))
    }
    #[cfg(not(feature = "chrome"))]
    {
        let _ = config;
        Arc::new(UnavailableRenderer)
    }
}

/// Renderer used when the crate is built without a browser backend.
#[cfg(not(feature = "chrome"))]
pub struct UnavailableRenderer;

#[cfg(not(feature = "chrome"))]
#[async_trait]
impl RenderService for UnavailableRenderer {
    async fn render(
        &self,
        _url: &str,
        _dest: &Path,
        _timeout: Duration,
        _options: &PrintOptions,
    ) -> Result<(), BackendError> {
        Err(BackendError::Unavailable("HTML rendering (feature `chrome`)"))
    }
}

//! [`RenderService`] backed by headless Chrome over the DevTools protocol.
//!
//! Each render launches its own browser, opens the URL, waits until the
//! ready selector matches, prints to PDF and shuts the browser down. The
//! whole sequence runs under the caller's timeout; on expiry the browser is
//! dropped, which kills the child process.
//!
//! The viewport is sized to the printed sheet at 150 DPI so that layouts
//! using viewport units come out the same as on paper.

use super::RenderService;
use crate::config::PrintOptions;
use crate::error::BackendError;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::Page;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const VIEWPORT_DPI: f64 = 150.0;
const READY_POLL: Duration = Duration::from_millis(100);

/// Headless Chrome renderer.
#[derive(Debug, Clone)]
pub struct ChromeRenderer {
    chrome_path: Option<PathBuf>,
    wait_selector: String,
}

impl ChromeRenderer {
    /// `chrome_path` overrides executable discovery; `wait_selector` must
    /// match before the page is considered ready.
    pub fn new(chrome_path: Option<PathBuf>, wait_selector: impl Into<String>) -> Self {
        Self {
            chrome_path,
            wait_selector: wait_selector.into(),
        }
    }

    fn browser_config(
        &self,
        timeout: Duration,
        options: &PrintOptions,
    ) -> Result<BrowserConfig, BackendError> {
        let (w, h) = options.oriented_inches();
        let mut builder = BrowserConfig::builder()
            .arg("--disable-gpu")
            .arg("--disable-web-security")
            .arg("--hide-scrollbars")
            .window_size((w * VIEWPORT_DPI) as u32, (h * VIEWPORT_DPI) as u32 + 50)
            .request_timeout(timeout);
        if let Some(path) = &self.chrome_path {
            builder = builder.chrome_executable(path);
        }
        builder.build().map_err(BackendError::Browser)
    }

    async fn render_inner(
        &self,
        url: &str,
        timeout: Duration,
        options: &PrintOptions,
    ) -> Result<Vec<u8>, BackendError> {
        let config = self.browser_config(timeout, options)?;
        let (mut browser, mut handler) = Browser::launch(config).await.map_err(browser_err)?;
        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let printed = async {
            let page = browser.new_page(url).await.map_err(browser_err)?;
            page.wait_for_navigation().await.map_err(browser_err)?;
            self.wait_ready(&page).await;
            if options.prefer_css_page_size {
                inject_page_css(&page, &options.page_css()).await?;
            }
            page.pdf(print_params(options)).await.map_err(browser_err)
        }
        .await;

        if let Err(e) = browser.close().await {
            debug!("Browser close failed: {}", e);
        }
        if let Err(e) = browser.wait().await {
            debug!("Browser exit wait failed: {}", e);
        }
        events.abort();

        printed
    }

    /// Poll until the ready selector matches. The caller's timeout bounds it.
    async fn wait_ready(&self, page: &Page) {
        while page.find_element(self.wait_selector.as_str()).await.is_err() {
            tokio::time::sleep(READY_POLL).await;
        }
    }
}

#[async_trait]
impl RenderService for ChromeRenderer {
    async fn render(
        &self,
        url: &str,
        dest: &Path,
        timeout: Duration,
        options: &PrintOptions,
    ) -> Result<(), BackendError> {
        let bytes = tokio::time::timeout(timeout, self.render_inner(url, timeout, options))
            .await
            .map_err(|_| BackendError::Timeout {
                secs: timeout.as_secs(),
            })??;

        tokio::fs::write(dest, &bytes).await?;
        info!(url, bytes = bytes.len(), dest = %dest.display(), "Rendered page");
        Ok(())
    }
}

fn browser_err(e: impl std::fmt::Display) -> BackendError {
    BackendError::Browser(e.to_string())
}

async fn inject_page_css(page: &Page, css: &str) -> Result<(), BackendError> {
    let literal = serde_json::to_string(css).map_err(browser_err)?;
    let script = format!(
        "(() => {{ const s = document.createElement('style'); s.textContent = {literal}; \
         document.head.appendChild(s); }})()"
    );
    page.evaluate(script).await.map_err(browser_err)?;
    Ok(())
}

fn print_params(options: &PrintOptions) -> PrintToPdfParams {
    let (w, h) = options.paper_inches();
    let m = &options.margins;
    PrintToPdfParams {
        landscape: Some(options.landscape),
        print_background: Some(options.print_background),
        scale: Some(options.scale),
        paper_width: Some(w),
        paper_height: Some(h),
        margin_top: Some(m.top),
        margin_bottom: Some(m.bottom),
        margin_left: Some(m.left),
        margin_right: Some(m.right),
        prefer_css_page_size: Some(options.prefer_css_page_size),
        ..Default::default()
    }
}

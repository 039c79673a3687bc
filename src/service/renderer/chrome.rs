//! Chrome renderer - headless Chromium over the DevTools protocol.
//!
//! Every render launches its own browser with a throwaway profile directory so
//! concurrent workers never share cookies, storage or a profile lock. The
//! session is closed on success, timeout and failure alike.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use super::{PageRenderer, RenderedPage};
use crate::error::AnalysisError;

/// Upper bound on shutting a browser down before falling back to a kill.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ChromeRenderer {
    executable: Option<PathBuf>,
    render_timeout: Duration,
}

impl ChromeRenderer {
    pub fn new(executable: Option<PathBuf>, render_timeout: Duration) -> Self {
        Self {
            executable,
            render_timeout,
        }
    }
}

#[async_trait]
impl PageRenderer for ChromeRenderer {
    async fn render(&self, url: &Url) -> Result<RenderedPage, AnalysisError> {
        let session = BrowserSession::launch(self.executable.as_deref()).await?;

        let outcome = tokio::time::timeout(self.render_timeout, session.capture(url)).await;
        // Dropping an unfinished close() kills the process in Drop.
        if tokio::time::timeout(CLOSE_TIMEOUT, session.close())
            .await
            .is_err()
        {
            warn!(%url, "Browser did not close within {:?}, killing it", CLOSE_TIMEOUT);
        }

        match outcome {
            Ok(rendered) => rendered,
            Err(_) => Err(AnalysisError::Timeout {
                url: url.to_string(),
                secs: self.render_timeout.as_secs(),
            }),
        }
    }

    fn name(&self) -> &'static str {
        "chrome"
    }
}

/// One browser process plus the task pumping its CDP events.
struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
    profile_dir: PathBuf,
    closed: bool,
}

impl BrowserSession {
    async fn launch(executable: Option<&Path>) -> Result<Self, AnalysisError> {
        let profile_dir =
            std::env::temp_dir().join(format!("page-auditor-{}", uuid::Uuid::new_v4()));

        let mut builder = BrowserConfig::builder()
            .new_headless_mode()
            .user_data_dir(&profile_dir)
            .args(vec![
                "--disable-gpu",
                "--no-sandbox",
                "--disable-dev-shm-usage",
                "--no-first-run",
            ]);
        if let Some(path) = executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(AnalysisError::browser)?;

        debug!(profile = %profile_dir.display(), "Launching headless browser");
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AnalysisError::browser(format!("failed to launch browser: {}", e)))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            browser,
            handler,
            profile_dir,
            closed: false,
        })
    }

    async fn capture(&self, url: &Url) -> Result<RenderedPage, AnalysisError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| AnalysisError::browser(format!("failed to open tab: {}", e)))?;

        info!(%url, "Opening page");
        page.goto(url.as_str())
            .await
            .map_err(|e| AnalysisError::navigation(url.as_str(), e.to_string()))?;

        let html = page
            .content()
            .await
            .map_err(|e| AnalysisError::browser(format!("failed to read page content: {}", e)))?;

        let final_url = page
            .url()
            .await
            .ok()
            .flatten()
            .and_then(|u| Url::parse(&u).ok())
            .unwrap_or_else(|| url.clone());

        Ok(RenderedPage { final_url, html })
    }

    async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Failed to close browser cleanly: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            debug!("Browser process wait failed: {}", e);
        }
        self.handler.abort();
        if let Err(e) = tokio::fs::remove_dir_all(&self.profile_dir).await {
            debug!(profile = %self.profile_dir.display(), "Profile cleanup failed: {}", e);
        }
        self.closed = true;
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        // Only reached without close() when the owning future was dropped.
        // chromiumoxide kills the child process in its own Drop.
        if !self.closed {
            self.handler.abort();
            let _ = std::fs::remove_dir_all(&self.profile_dir);
        }
    }
}

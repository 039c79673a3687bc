//! Single-page audit: render, extract, probe.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info};
use url::Url;

use crate::domain::models::AuditResult;
use crate::error::AnalysisError;
use crate::extractor::PageExtractor;
use crate::service::link_checker::LinkChecker;
use crate::service::renderer::{ChromeRenderer, HttpRenderer, PageRenderer, RendererKind};

/// Seam between the worker pool and whatever produces audits.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, url: &str) -> Result<AuditResult, AnalysisError>;
}

/// Knobs for building an [`AnalysisEngine`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub renderer: RendererKind,
    pub chrome_executable: Option<PathBuf>,
    pub render_timeout: Duration,
    pub probe_timeout: Duration,
    pub probe_concurrency: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            renderer: RendererKind::Chrome,
            chrome_executable: None,
            render_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
            probe_concurrency: 1,
        }
    }
}

pub struct AnalysisEngine {
    renderer: Arc<dyn PageRenderer>,
    link_checker: LinkChecker,
}

impl AnalysisEngine {
    pub fn new(renderer: Arc<dyn PageRenderer>, link_checker: LinkChecker) -> Self {
        Self {
            renderer,
            link_checker,
        }
    }

    pub fn from_settings(settings: &EngineSettings) -> Result<Self, AnalysisError> {
        let renderer: Arc<dyn PageRenderer> = match settings.renderer {
            RendererKind::Chrome => Arc::new(ChromeRenderer::new(
                settings.chrome_executable.clone(),
                settings.render_timeout,
            )),
            RendererKind::Http => Arc::new(HttpRenderer::new(settings.render_timeout)?),
        };
        let link_checker = LinkChecker::new(settings.probe_timeout, settings.probe_concurrency)?;
        Ok(Self::new(renderer, link_checker))
    }

    pub fn renderer_name(&self) -> &'static str {
        self.renderer.name()
    }
}

#[async_trait]
impl Analyzer for AnalysisEngine {
    async fn analyze(&self, url: &str) -> Result<AuditResult, AnalysisError> {
        let started = Instant::now();
        let target = Url::parse(url).map_err(|e| AnalysisError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let page = self.renderer.render(&target).await?;
        debug!(
            url = %target,
            final_url = %page.final_url,
            bytes = page.html.len(),
            renderer = self.renderer.name(),
            "Page rendered"
        );

        // The parsed DOM is dropped inside extract(), before the next await.
        let facts = PageExtractor::extract(&page.html, &page.final_url);
        let internal_links = facts.internal_count();
        let external_links = facts.external_count();
        let hrefs: Vec<String> = facts.links.into_iter().map(|l| l.href).collect();

        let (broken_links, working_links) = self.link_checker.check_all(&hrefs).await;

        info!(
            url = %target,
            headings = facts.heading_counts.total(),
            links = hrefs.len(),
            broken = broken_links.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Audit finished"
        );

        Ok(AuditResult {
            html_version: facts.html_version,
            page_title: facts.page_title,
            heading_counts: facts.heading_counts,
            internal_links,
            external_links,
            broken_links,
            working_links,
            has_login_form: facts.has_login_form,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::HtmlVersion;
    use crate::test_utils::mocks;
    use mockito::Server;

    fn http_engine() -> AnalysisEngine {
        AnalysisEngine::from_settings(&EngineSettings {
            renderer: RendererKind::Http,
            render_timeout: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(2),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn audits_a_served_page() {
        let mut server = Server::new_async().await;
        let _page = server
            .mock("GET", "/")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body(
                r#"<!DOCTYPE HTML PUBLIC "-//W3C//DTD HTML 4.01//EN">
                <html><head><title> Test </title></head><body>
                <h1>Hi</h1><h2>a</h2><h2>b</h2>
                <a href="/ok">ok</a>
                <a href="/missing">missing</a>
                <form action="/login"><input type="text"></form>
                </body></html>"#,
            )
            .create_async()
            .await;
        let _ok = server.mock("HEAD", "/ok").with_status(200).create_async().await;
        let _missing = server
            .mock("HEAD", "/missing")
            .with_status(404)
            .create_async()
            .await;

        let audit = http_engine().analyze(&server.url()).await.unwrap();

        assert_eq!(audit.page_title, "Test");
        assert_eq!(audit.html_version, HtmlVersion::Html401);
        assert_eq!(audit.heading_counts.h1, 1);
        assert_eq!(audit.heading_counts.h2, 2);
        assert_eq!(audit.internal_links, 2);
        assert_eq!(audit.external_links, 0);
        assert_eq!(audit.working_links.len(), 1);
        assert_eq!(audit.working_links[0].status_code, 200);
        assert_eq!(audit.broken_links.len(), 1);
        assert_eq!(audit.broken_links[0].status_code, Some(404));
        assert!(audit.broken_links[0].link.ends_with("/missing"));
        assert!(audit.has_login_form);
    }

    #[tokio::test]
    async fn unreachable_host_fails_without_partial_result() {
        let err = http_engine()
            .analyze("http://127.0.0.1:1/")
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Navigation { .. }));
        assert!(!err.to_string().is_empty());
    }

    #[tokio::test]
    async fn hanging_page_times_out() {
        let base = mocks::silent_server().await;
        let engine = AnalysisEngine::from_settings(&EngineSettings {
            renderer: RendererKind::Http,
            render_timeout: Duration::from_secs(1),
            ..Default::default()
        })
        .unwrap();

        let err = engine.analyze(&base).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Timeout { secs: 1, .. }), "{:?}", err);
    }

    #[tokio::test]
    async fn hanging_link_is_recorded_as_broken() {
        let stalled = format!("{}/stall", mocks::silent_server().await);
        let mut server = Server::new_async().await;
        let _page = server
            .mock("GET", "/")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body(mocks::basic_html_page("Slow links", "Hi", &[&stalled, "/ok"]))
            .create_async()
            .await;
        let _ok = server.mock("HEAD", "/ok").with_status(200).create_async().await;

        let engine = AnalysisEngine::from_settings(&EngineSettings {
            renderer: RendererKind::Http,
            render_timeout: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(1),
            ..Default::default()
        })
        .unwrap();
        let audit = engine.analyze(&server.url()).await.unwrap();

        assert_eq!(audit.page_title, "Slow links");
        // Same host as the page; ports are not compared.
        assert_eq!(audit.internal_links, 2);
        assert_eq!(audit.external_links, 0);
        assert_eq!(audit.broken_links.len(), 1);
        assert_eq!(audit.broken_links[0].link, stalled);
        assert_eq!(audit.broken_links[0].status_code, None);
        assert!(audit.broken_links[0].error_message.is_some());
        assert_eq!(audit.working_links.len(), 1);
    }

    #[tokio::test]
    async fn rejects_unparseable_urls() {
        let err = http_engine().analyze("not a url").await.unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidUrl { .. }));
    }
}

//! Http renderer - direct fetch with browser emulation.
//!
//! Much cheaper than a browser but never executes scripts, so pages that build
//! their DOM client-side will look emptier than they are.

use std::time::Duration;

use async_trait::async_trait;
use rquest::Client;
use tracing::debug;
use url::Url;

use super::{PageRenderer, RenderedPage};
use crate::error::AnalysisError;
use crate::service::http::{create_client, describe_error, ClientType};

pub struct HttpRenderer {
    client: Client,
    render_timeout: Duration,
}

impl HttpRenderer {
    pub fn new(render_timeout: Duration) -> Result<Self, AnalysisError> {
        let client = create_client(ClientType::HeavyEmulation, render_timeout)
            .map_err(|e| AnalysisError::Client(format!("{:#}", e)))?;
        Ok(Self {
            client,
            render_timeout,
        })
    }

    fn classify(&self, url: &Url, err: rquest::Error) -> AnalysisError {
        if err.is_timeout() {
            AnalysisError::Timeout {
                url: url.to_string(),
                secs: self.render_timeout.as_secs(),
            }
        } else {
            AnalysisError::navigation(url.as_str(), describe_error(&err))
        }
    }
}

#[async_trait]
impl PageRenderer for HttpRenderer {
    async fn render(&self, url: &Url) -> Result<RenderedPage, AnalysisError> {
        debug!(%url, "Fetching page");
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| self.classify(url, e))?;

        let final_url = Url::parse(response.url().as_str()).unwrap_or_else(|_| url.clone());
        let html = response.text().await.map_err(|e| self.classify(url, e))?;

        Ok(RenderedPage { final_url, html })
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

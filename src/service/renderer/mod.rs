//! Page rendering strategies.
//!
//! This module provides two renderers:
//! - **Chrome**: headless Chromium over the DevTools protocol, scripts enabled
//! - **Http**: plain HTTP fetch with browser emulation, no script execution
//!
//! Both implement the `PageRenderer` trait and enforce their own render timeout.

mod chrome;
mod http;

pub use chrome::ChromeRenderer;
pub use http::HttpRenderer;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use url::Url;

use crate::error::AnalysisError;

/// Fully rendered document and the URL it ended up at after redirects.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub final_url: Url,
    pub html: String,
}

/// Strategy trait for turning a URL into rendered HTML.
///
/// Implementations must release every resource they acquire (browser
/// processes, profile directories, connections) on all exit paths.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &Url) -> Result<RenderedPage, AnalysisError>;

    /// Human-readable name for this renderer.
    fn name(&self) -> &'static str;
}

/// Renderer selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RendererKind {
    #[default]
    Chrome,
    Http,
}

impl RendererKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RendererKind::Chrome => "chrome",
            RendererKind::Http => "http",
        }
    }
}

impl fmt::Display for RendererKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RendererKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chrome" | "chromium" | "browser" => Ok(RendererKind::Chrome),
            "http" | "light" => Ok(RendererKind::Http),
            other => Err(format!(
                "unknown renderer '{}', expected 'chrome' or 'http'",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renderer_kind_parses_aliases() {
        assert_eq!("Chrome".parse::<RendererKind>(), Ok(RendererKind::Chrome));
        assert_eq!("light".parse::<RendererKind>(), Ok(RendererKind::Http));
        assert!("lynx".parse::<RendererKind>().is_err());
    }
}

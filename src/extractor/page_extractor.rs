use regex::Regex;
use scraper::{Html, Selector};
use std::sync::OnceLock;
use url::Url;

use crate::domain::models::{HeadingCounts, HtmlVersion};

/// Anchor target resolved against the page URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedLink {
    pub href: String,
    pub is_internal: bool,
}

/// Everything the engine needs from the rendered document, gathered in one
/// synchronous pass so the parsed DOM never lives across an await point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFacts {
    pub html_version: HtmlVersion,
    pub page_title: String,
    pub heading_counts: HeadingCounts,
    pub links: Vec<ExtractedLink>,
    pub has_login_form: bool,
}

impl PageFacts {
    pub fn internal_count(&self) -> u32 {
        self.links.iter().filter(|l| l.is_internal).count() as u32
    }

    pub fn external_count(&self) -> u32 {
        self.links.iter().filter(|l| !l.is_internal).count() as u32
    }
}

pub struct PageExtractor;

impl PageExtractor {
    pub fn extract(raw_html: &str, page_url: &Url) -> PageFacts {
        let html_version = Self::extract_html_version(raw_html);
        let document = Html::parse_document(raw_html);

        PageFacts {
            html_version,
            page_title: Self::extract_title(&document),
            heading_counts: Self::count_headings(&document),
            links: Self::extract_links(&document, page_url),
            has_login_form: Self::has_login_form(&document),
        }
    }

    /// First `<!DOCTYPE ...>` token in the raw markup, matched case-insensitively.
    pub fn find_doctype(raw_html: &str) -> Option<&str> {
        static DOCTYPE: OnceLock<Regex> = OnceLock::new();
        let re = DOCTYPE.get_or_init(|| Regex::new(r"(?i)<!DOCTYPE[^>]*>").unwrap());
        re.find(raw_html).map(|m| m.as_str())
    }

    pub fn extract_html_version(raw_html: &str) -> HtmlVersion {
        HtmlVersion::from_doctype(Self::find_doctype(raw_html))
    }

    pub fn extract_title(html: &Html) -> String {
        static SELECTOR: OnceLock<Selector> = OnceLock::new();
        let selector = SELECTOR.get_or_init(|| Selector::parse("title").unwrap());
        html.select(selector)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default()
    }

    pub fn count_headings(html: &Html) -> HeadingCounts {
        static SELECTORS: OnceLock<Vec<Selector>> = OnceLock::new();
        let selectors = SELECTORS.get_or_init(|| {
            (1..=6)
                .map(|level| Selector::parse(&format!("h{}", level)).unwrap())
                .collect()
        });

        let mut counts = HeadingCounts::default();
        for (idx, selector) in selectors.iter().enumerate() {
            counts.set(idx as u8 + 1, html.select(selector).count() as u32);
        }
        counts
    }

    /// Every non-empty anchor href, resolved against `page_url`. Hrefs that do
    /// not resolve are dropped. Duplicates are kept.
    pub fn extract_links(html: &Html, page_url: &Url) -> Vec<ExtractedLink> {
        static SELECTOR: OnceLock<Selector> = OnceLock::new();
        let selector = SELECTOR.get_or_init(|| Selector::parse("a[href]").unwrap());

        let page_host = page_url.host_str();

        html.select(selector)
            .filter_map(|element| {
                let href = element.value().attr("href")?;
                if href.is_empty() {
                    return None;
                }
                let resolved = page_url.join(href).ok()?;
                let is_internal = resolved.host_str().is_some() && resolved.host_str() == page_host;
                Some(ExtractedLink {
                    href: resolved.to_string(),
                    is_internal,
                })
            })
            .collect()
    }

    /// Password field, or a form whose action, id or class mentions "login".
    pub fn has_login_form(html: &Html) -> bool {
        static SELECTORS: OnceLock<Vec<Selector>> = OnceLock::new();
        let selectors = SELECTORS.get_or_init(|| {
            [
                r#"input[type="password"]"#,
                r#"form[action*="login"]"#,
                r#"form[id*="login"]"#,
                r#"form[class*="login"]"#,
            ]
            .iter()
            .map(|s| Selector::parse(s).unwrap())
            .collect()
        });

        selectors
            .iter()
            .any(|selector| html.select(selector).next().is_some())
    }
}

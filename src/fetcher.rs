use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use crate::error::{Result, ScraperError};

/// A fetched page plus the response metadata the rate limiter cares about.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

/// Page retrieval seam. The crawler only sees this trait, so tests can swap
/// in a canned fetcher.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        let client = Client::builder()
            .user_agent("Mozilla/5.0 (compatible; LeadHarvester/1.0)")
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        debug!("Fetching: {}", url);
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();

        if !response.status().is_success() {
            return Err(ScraperError::Http {
                status,
                url: url.to_string(),
            });
        }

        let body = response.text().await?;
        debug!("Fetched {} bytes from {}", body.len(), url);

        Ok(FetchedPage {
            url: url.to_string(),
            status,
            headers,
            body,
        })
    }
}

/// Collapse a document's body text into whitespace-normalized plain text.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let body_selector = Selector::parse("body").unwrap();

    document
        .select(&body_selector)
        .next()
        .map(|body| {
            body.text()
                .collect::<Vec<_>>()
                .join(" ")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_else(|| {
            html.split_whitespace().collect::<Vec<_>>().join(" ")
        })
}

/// Extract all absolute http(s) links from a page, resolving relative hrefs
/// against `base_url`. Fragments are stripped and duplicates removed.
pub fn extract_links(html: &str, base_url: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let link_selector = Selector::parse("a[href]").unwrap();
    let base = match Url::parse(base_url) {
        Ok(base) => base,
        Err(_) => return Vec::new(),
    };

    let mut links = Vec::new();
    for element in document.select(&link_selector) {
        if let Some(href) = element.value().attr("href") {
            if href.starts_with('#') || href.starts_with("mailto:") || href.starts_with("tel:") {
                continue;
            }
            if let Ok(mut resolved) = base.join(href) {
                resolved.set_fragment(None);
                if resolved.scheme() == "http" || resolved.scheme() == "https" {
                    links.push(resolved.to_string());
                }
            }
        }
    }

    links.sort();
    links.dedup();
    links
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_extraction_collapses_whitespace() {
        let html = "<html><body><h1>Acme</h1>\n  <p>We   build\nthings.</p></body></html>";
        assert_eq!(html_to_text(html), "Acme We build things.");
    }

    #[test]
    fn links_resolve_relative_hrefs() {
        let html = r#"
            <a href="/about">About</a>
            <a href="team.html">Team</a>
            <a href="https://other.com/page#section">Other</a>
        "#;
        let links = extract_links(html, "https://acme.com/company/");
        assert!(links.contains(&"https://acme.com/about".to_string()));
        assert!(links.contains(&"https://acme.com/company/team.html".to_string()));
        assert!(links.contains(&"https://other.com/page".to_string()));
    }

    #[test]
    fn links_skip_non_http_schemes() {
        let html = r##"
            <a href="mailto:hi@acme.com">Mail</a>
            <a href="tel:+15551234">Call</a>
            <a href="#top">Top</a>
            <a href="javascript:void(0)">Nope</a>
            <a href="/contact">Contact</a>
        "##;
        let links = extract_links(html, "https://acme.com");
        assert_eq!(links, vec!["https://acme.com/contact".to_string()]);
    }

    #[test]
    fn duplicate_links_are_collapsed() {
        let html = r#"<a href="/a">1</a><a href="/a">2</a><a href="/b">3</a>"#;
        let links = extract_links(html, "https://acme.com");
        assert_eq!(links.len(), 2);
    }
}

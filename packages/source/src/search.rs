//! External search index used to find contact pages.
//!
//! [`SearchProvider`] is the seam; [`HtmlSearchEngine`] implements it by
//! scraping an HTML results page. Results carry no relevance guarantee and
//! the engine may rate-limit or block at any time.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use scraper::Html;
use serde::Deserialize;
use stayscout_scraper::render::parse_selector;
use stayscout_scraper::{PageFetcher, ScrapeError};
use url::Url;

/// Placeholder in [`SearchEngineConfig::url_template`] replaced by the
/// URL-encoded query.
pub const QUERY_PLACEHOLDER: &str = "{query}";

/// Free-text web search returning candidate page URLs.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Returns at most `max_results` result URLs for `query`.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError`] if the search itself fails.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<String>, ScrapeError>;
}

/// Where and how to scrape search results.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchEngineConfig {
    /// Results page URL containing [`QUERY_PLACEHOLDER`].
    pub url_template: String,
    /// CSS selector for result anchors.
    pub result_selector: String,
    /// Query parameter holding the real target of a redirect link.
    pub redirect_param: Option<String>,
}

impl Default for SearchEngineConfig {
    fn default() -> Self {
        Self {
            url_template: "https://html.duckduckgo.com/html/?q={query}".to_owned(),
            result_selector: "a.result__a".to_owned(),
            redirect_param: Some("uddg".to_owned()),
        }
    }
}

/// [`SearchProvider`] that scrapes an HTML search results page.
pub struct HtmlSearchEngine {
    fetcher: Arc<dyn PageFetcher>,
    config: SearchEngineConfig,
}

impl HtmlSearchEngine {
    /// Creates a search engine client.
    #[must_use]
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: SearchEngineConfig) -> Self {
        Self { fetcher, config }
    }

    fn results_url(&self, query: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
        self.config.url_template.replace(QUERY_PLACEHOLDER, &encoded)
    }
}

#[async_trait]
impl SearchProvider for HtmlSearchEngine {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<String>, ScrapeError> {
        let page_url = self.results_url(query);
        log::debug!("Searching: {query}");
        let html = self.fetcher.fetch_text(&page_url).await?;
        parse_results(&html, &page_url, &self.config, max_results)
    }
}

/// Extracts result URLs from a search results page.
///
/// Relative links are resolved against `page_url`, redirect links are
/// unwrapped, non-`http(s)` targets and duplicates are dropped.
///
/// # Errors
///
/// Returns [`ScrapeError::Parse`] if the selector or `page_url` is invalid.
pub fn parse_results(
    html: &str,
    page_url: &str,
    config: &SearchEngineConfig,
    max_results: usize,
) -> Result<Vec<String>, ScrapeError> {
    let base = Url::parse(page_url)
        .map_err(|e| ScrapeError::Parse(format!("invalid search URL '{page_url}': {e}")))?;
    let selector = parse_selector(&config.result_selector)?;
    let document = Html::parse_document(html);

    let mut seen = HashSet::new();
    let mut results = Vec::new();
    for href in document
        .select(&selector)
        .filter_map(|el| el.value().attr("href"))
    {
        if results.len() >= max_results {
            break;
        }
        let Ok(url) = base.join(href) else {
            continue;
        };
        let target = config
            .redirect_param
            .as_deref()
            .and_then(|param| {
                url.query_pairs()
                    .find(|(key, _)| key == param)
                    .and_then(|(_, value)| Url::parse(&value).ok())
            })
            .unwrap_or(url);

        if matches!(target.scheme(), "http" | "https") && seen.insert(target.to_string()) {
            results.push(target.to_string());
        }
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESULTS_PAGE: &str = r#"
        <div class="result"><a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fhotelnovecento.it%2Fcontatti&rut=abc">Novecento</a></div>
        <div class="result"><a class="result__a" href="https://www.tripadvisor.it/Hotel_Review">Trip</a></div>
        <div class="result"><a class="result__a" href="https://www.tripadvisor.it/Hotel_Review">Trip again</a></div>
        <div class="result"><a class="result__a" href="javascript:void(0)">Ad</a></div>
        <div class="result"><a class="result__a" href="https://example.org/a">A</a></div>
    "#;

    const PAGE_URL: &str = "https://html.duckduckgo.com/html/?q=Hotel";

    #[test]
    fn unwraps_redirects_and_dedupes() {
        let results =
            parse_results(RESULTS_PAGE, PAGE_URL, &SearchEngineConfig::default(), 5).unwrap();
        assert_eq!(
            results,
            [
                "https://hotelnovecento.it/contatti",
                "https://www.tripadvisor.it/Hotel_Review",
                "https://example.org/a",
            ]
        );
    }

    #[test]
    fn respects_max_results() {
        let results =
            parse_results(RESULTS_PAGE, PAGE_URL, &SearchEngineConfig::default(), 1).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn encodes_query_into_template() {
        struct Never;
        #[async_trait]
        impl PageFetcher for Never {
            async fn fetch_text(&self, url: &str) -> Result<String, ScrapeError> {
                Err(ScrapeError::Parse(url.to_string()))
            }
        }

        let engine = HtmlSearchEngine::new(Arc::new(Never), SearchEngineConfig::default());
        assert_eq!(
            engine.results_url("Hotel Novecento Venice phone email"),
            "https://html.duckduckgo.com/html/?q=Hotel+Novecento+Venice+phone+email"
        );
    }
}

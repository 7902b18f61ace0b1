//! The rendering seam between a crawler and whatever drives the page.
//!
//! A [`Renderer`] exposes the five operations a results-page crawler needs
//! from a browser. [`PagerRenderer`] satisfies them over plain HTTP: each
//! "click" on a pager link fetches the next page and appends it to the
//! view, so the markup grows the same way an infinitely scrolling page
//! does.

use std::sync::Arc;
use std::time::Duration;

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::{PageFetcher, ScrapeError};

/// Browser-like operations used to walk an incrementally rendered view.
pub trait Renderer: Send {
    /// Navigates to `url`, replacing whatever was shown before.
    fn load(&mut self, url: &str) -> impl Future<Output = Result<(), ScrapeError>> + Send;

    /// Returns the markup of the whole current view.
    fn current_markup(&self) -> impl Future<Output = Result<String, ScrapeError>> + Send;

    /// Scrolls to the end of the view so lazy content gets rendered.
    fn scroll_to_bottom(&mut self) -> impl Future<Output = Result<(), ScrapeError>> + Send;

    /// Activates the first element matching `selector`.
    fn click(&mut self, selector: &str) -> impl Future<Output = Result<(), ScrapeError>> + Send;

    /// Waits up to `timeout` for an element matching `selector` to become
    /// clickable. Returns `false` if it never does.
    fn wait_until_clickable(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<bool, ScrapeError>> + Send;
}

/// Parses a CSS selector string, returning a [`ScrapeError`] on failure.
///
/// # Errors
///
/// Returns [`ScrapeError::Parse`] if `selector` is not valid CSS.
pub fn parse_selector(selector: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(selector)
        .map_err(|e| ScrapeError::Parse(format!("invalid CSS selector '{selector}': {e}")))
}

/// Concatenated, trimmed text content of an element.
#[must_use]
pub fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join("").trim().to_owned()
}

/// [`Renderer`] that follows pager links over HTTP.
pub struct PagerRenderer {
    fetcher: Arc<dyn PageFetcher>,
    /// Every page in the current view, oldest first.
    pages: Vec<(Url, String)>,
}

impl PagerRenderer {
    /// Creates a renderer with an empty view.
    #[must_use]
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            fetcher,
            pages: Vec::new(),
        }
    }

    /// Number of pages fetched into the current view.
    #[must_use]
    pub const fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Absolute target of the first `selector` match on the newest page.
    fn next_link(&self, selector: &str) -> Result<Option<Url>, ScrapeError> {
        let Some((base, markup)) = self.pages.last() else {
            return Ok(None);
        };
        let sel = parse_selector(selector)?;
        let document = Html::parse_document(markup);
        let href = document
            .select(&sel)
            .find_map(|el| el.value().attr("href").map(str::to_owned));

        href.map(|href| {
            base.join(&href)
                .map_err(|e| ScrapeError::Parse(format!("invalid pager link '{href}': {e}")))
        })
        .transpose()
    }

    async fn fetch_page(&self, url: Url) -> Result<(Url, String), ScrapeError> {
        let markup = self.fetcher.fetch_text(url.as_str()).await?;
        Ok((url, markup))
    }
}

impl Renderer for PagerRenderer {
    async fn load(&mut self, url: &str) -> Result<(), ScrapeError> {
        let url =
            Url::parse(url).map_err(|e| ScrapeError::Parse(format!("invalid URL '{url}': {e}")))?;
        let page = self.fetch_page(url).await?;
        self.pages.clear();
        self.pages.push(page);
        Ok(())
    }

    async fn current_markup(&self) -> Result<String, ScrapeError> {
        if self.pages.is_empty() {
            return Err(ScrapeError::Parse("no page loaded".to_owned()));
        }
        Ok(self
            .pages
            .iter()
            .map(|(_, markup)| markup.as_str())
            .collect::<Vec<_>>()
            .join("\n"))
    }

    async fn scroll_to_bottom(&mut self) -> Result<(), ScrapeError> {
        // Static pages have nothing left to lazy-render.
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> Result<(), ScrapeError> {
        let next = self.next_link(selector)?.ok_or_else(|| {
            ScrapeError::Parse(format!("no clickable element matching '{selector}'"))
        })?;
        log::debug!("Following pager link {next}");
        let page = self.fetch_page(next).await?;
        self.pages.push(page);
        Ok(())
    }

    async fn wait_until_clickable(
        &mut self,
        selector: &str,
        _timeout: Duration,
    ) -> Result<bool, ScrapeError> {
        // The newest page is already complete, so there is nothing to wait for.
        Ok(self.next_link(selector)?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    struct MapFetcher {
        pages: BTreeMap<String, String>,
        requests: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PageFetcher for MapFetcher {
        async fn fetch_text(&self, url: &str) -> Result<String, ScrapeError> {
            self.requests.lock().unwrap().push(url.to_string());
            self.pages.get(url).cloned().ok_or_else(|| ScrapeError::Status {
                url: url.to_string(),
                status: 404,
            })
        }
    }

    fn fetcher() -> Arc<MapFetcher> {
        let pages = BTreeMap::from([
            (
                "https://example.com/results?ss=Venice".to_string(),
                r#"<div class="card">A</div><a class="next" href="/results?ss=Venice&offset=25">more</a>"#
                    .to_string(),
            ),
            (
                "https://example.com/results?ss=Venice&offset=25".to_string(),
                r#"<div class="card">B</div>"#.to_string(),
            ),
        ]);
        Arc::new(MapFetcher {
            pages,
            requests: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn follows_pager_links_and_grows_the_view() {
        let fetcher = fetcher();
        let mut renderer = PagerRenderer::new(fetcher.clone());

        renderer.load("https://example.com/results?ss=Venice").await.unwrap();
        assert!(renderer.wait_until_clickable("a.next", Duration::from_secs(1)).await.unwrap());

        renderer.click("a.next").await.unwrap();
        let markup = renderer.current_markup().await.unwrap();
        assert!(markup.contains(">A<"));
        assert!(markup.contains(">B<"));
        assert_eq!(renderer.page_count(), 2);

        assert!(!renderer.wait_until_clickable("a.next", Duration::from_secs(1)).await.unwrap());
        assert_eq!(fetcher.requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn load_resets_the_view() {
        let mut renderer = PagerRenderer::new(fetcher());
        renderer.load("https://example.com/results?ss=Venice").await.unwrap();
        renderer.click("a.next").await.unwrap();
        renderer.load("https://example.com/results?ss=Venice").await.unwrap();
        assert_eq!(renderer.page_count(), 1);
    }

    #[tokio::test]
    async fn click_without_target_is_an_error() {
        let mut renderer = PagerRenderer::new(fetcher());
        renderer.load("https://example.com/results?ss=Venice&offset=25").await.unwrap();
        assert!(renderer.click("a.next").await.is_err());
    }

    #[tokio::test]
    async fn markup_before_load_is_an_error() {
        let renderer = PagerRenderer::new(fetcher());
        assert!(renderer.current_markup().await.is_err());
    }

    #[test]
    fn invalid_selector_is_reported() {
        assert!(matches!(parse_selector("div[[["), Err(ScrapeError::Parse(_))));
    }
}

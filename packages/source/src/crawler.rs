//! Locality results crawler.
//!
//! [`crawl`] loads a locality's results view and hands back a
//! [`CrawlSession`], a lazy sequence of [`ListingStub`]s. The session only
//! touches the renderer when its buffer runs dry: it scrolls, extracts the
//! cards it has not seen yet, and, once those are consumed, asks for more
//! results through the site's "load more" affordance.
//!
//! A session stops for one of three reasons, checked in this order before
//! every advance: the interrupt token fired, the result cap was reached,
//! or no more results could be loaded.

use std::collections::HashSet;
use std::time::Duration;

use scraper::Html;
use stayscout_listing_models::ListingStub;
use stayscout_scraper::ScrapeError;
use stayscout_scraper::render::{Renderer, element_text, parse_selector};
use tokio_util::sync::CancellationToken;

use crate::locality::format_locality;
use crate::site_def::SiteDefinition;

/// How long to wait for the "load more" affordance to become clickable.
pub const LOAD_MORE_TIMEOUT: Duration = Duration::from_secs(10);

/// Why a crawl session stopped producing stubs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlTermination {
    /// The interrupt token fired.
    Interrupted,
    /// The nonzero result cap was reached.
    CapReached,
    /// No further results could be loaded.
    Exhausted,
}

/// Lazy, per-locality sequence of listing stubs.
pub struct CrawlSession<'a, R: Renderer> {
    renderer: &'a mut R,
    site: &'a SiteDefinition,
    cancel: CancellationToken,
    locality: String,
    /// Zero means unlimited.
    result_cap: usize,
    accumulated: Vec<ListingStub>,
    /// Number of `accumulated` entries already handed out.
    yielded: usize,
    /// Number of cards in the view that have been looked at.
    seen_cards: usize,
    seen_links: HashSet<String>,
    rounds: u32,
    termination: Option<CrawlTermination>,
}

/// Starts crawling `locality`, loading its first results view.
///
/// Nothing is loaded if `cancel` has already fired; the returned session
/// is then empty and reports [`CrawlTermination::Interrupted`].
///
/// # Errors
///
/// Returns [`ScrapeError`] if the initial results view cannot be loaded.
pub async fn crawl<'a, R: Renderer>(
    renderer: &'a mut R,
    site: &'a SiteDefinition,
    locality: &str,
    result_cap: usize,
    cancel: &CancellationToken,
) -> Result<CrawlSession<'a, R>, ScrapeError> {
    let mut session = CrawlSession {
        renderer,
        site,
        cancel: cancel.clone(),
        locality: locality.to_owned(),
        result_cap,
        accumulated: Vec::new(),
        yielded: 0,
        seen_cards: 0,
        seen_links: HashSet::new(),
        rounds: 0,
        termination: None,
    };

    if cancel.is_cancelled() {
        session.finish(CrawlTermination::Interrupted);
        return Ok(session);
    }

    let url = site.results_url(&format_locality(locality));
    log::info!("Crawling {locality}: {url}");
    session.renderer.load(&url).await?;
    Ok(session)
}

impl<R: Renderer> CrawlSession<'_, R> {
    /// Returns the next stub, rendering more results when needed.
    ///
    /// Returns `None` once the session has terminated and every
    /// accumulated stub has been handed out, or immediately after an
    /// interrupt.
    pub async fn next(&mut self) -> Option<ListingStub> {
        loop {
            if self.cancel.is_cancelled() {
                self.finish(CrawlTermination::Interrupted);
                return None;
            }
            if let Some(stub) = self.accumulated.get(self.yielded) {
                self.yielded += 1;
                return Some(stub.clone());
            }
            if self.termination.is_some() {
                return None;
            }
            self.round().await;
        }
    }

    /// Drains the session and returns every stub it accumulated.
    pub async fn collect(mut self) -> Vec<ListingStub> {
        while self.next().await.is_some() {}
        self.accumulated
    }

    /// The locality being crawled.
    #[must_use]
    pub fn locality(&self) -> &str {
        &self.locality
    }

    /// Every stub found so far, in discovery order.
    #[must_use]
    pub fn accumulated(&self) -> &[ListingStub] {
        &self.accumulated
    }

    /// Why the session stopped, if it has.
    #[must_use]
    pub const fn termination(&self) -> Option<CrawlTermination> {
        self.termination
    }

    fn cap_reached(&self) -> bool {
        self.result_cap != 0 && self.accumulated.len() >= self.result_cap
    }

    fn finish(&mut self, reason: CrawlTermination) {
        if self.termination.is_none() {
            log::debug!(
                "Crawl of {} finished ({reason:?}) with {} listings",
                self.locality,
                self.accumulated.len()
            );
            self.termination = Some(reason);
        }
    }

    /// Renders one more batch of results into the buffer.
    async fn round(&mut self) {
        if self.rounds > 0 && !self.advance().await {
            return;
        }
        self.rounds += 1;

        if self.cancel.is_cancelled() {
            self.finish(CrawlTermination::Interrupted);
            return;
        }

        if let Err(e) = self.renderer.scroll_to_bottom().await {
            log::warn!("Scrolling results for {} failed: {e}", self.locality);
            self.finish(CrawlTermination::Exhausted);
            return;
        }

        let cards = match self.renderer.current_markup().await {
            Ok(markup) => extract_cards(&markup, self.site, &self.locality),
            Err(e) => Err(e),
        };
        let cards = match cards {
            Ok(cards) => cards,
            Err(e) => {
                log::warn!("Reading results for {} failed: {e}", self.locality);
                self.finish(CrawlTermination::Exhausted);
                return;
            }
        };

        let total_cards = cards.len();
        let before = self.accumulated.len();
        for stub in cards.into_iter().skip(self.seen_cards) {
            if self.cap_reached() {
                break;
            }
            if stub.has_detail_link() && !self.seen_links.insert(stub.detail_link.clone()) {
                continue;
            }
            self.accumulated.push(stub);
        }
        self.seen_cards = self.seen_cards.max(total_cards);
        let added = self.accumulated.len() - before;

        log::debug!(
            "Round {} for {}: {added} new listings ({} total)",
            self.rounds,
            self.locality,
            self.accumulated.len()
        );

        if self.cap_reached() {
            self.finish(CrawlTermination::CapReached);
        } else if added == 0 && self.rounds > 1 {
            // Loading more produced nothing new; the view is not growing.
            self.finish(CrawlTermination::Exhausted);
        }
    }

    /// Asks the renderer for more results. Returns `false` (with the
    /// termination reason recorded) when the session must stop instead.
    async fn advance(&mut self) -> bool {
        if self.cancel.is_cancelled() {
            self.finish(CrawlTermination::Interrupted);
            return false;
        }
        if self.cap_reached() {
            self.finish(CrawlTermination::CapReached);
            return false;
        }

        let load_more = &self.site.selectors.load_more;
        match self
            .renderer
            .wait_until_clickable(load_more, LOAD_MORE_TIMEOUT)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                log::info!("No more results for {}", self.locality);
                self.finish(CrawlTermination::Exhausted);
                return false;
            }
            Err(e) => {
                log::info!("No more results for {} ({e})", self.locality);
                self.finish(CrawlTermination::Exhausted);
                return false;
            }
        }

        if self.cancel.is_cancelled() {
            self.finish(CrawlTermination::Interrupted);
            return false;
        }

        if let Err(e) = self.renderer.click(load_more).await {
            log::info!("Loading more results for {} failed: {e}", self.locality);
            self.finish(CrawlTermination::Exhausted);
            return false;
        }
        true
    }
}

/// Extracts every listing card in `markup`, in document order.
///
/// Cards without a title get the name `"unknown"`; cards without a usable
/// link get the detail link `"unknown"`. Links are made absolute against
/// the site's base URL.
///
/// # Errors
///
/// Returns [`ScrapeError::Parse`] if one of the site's selectors is invalid.
pub fn extract_cards(
    markup: &str,
    site: &SiteDefinition,
    locality: &str,
) -> Result<Vec<ListingStub>, ScrapeError> {
    let card_sel = parse_selector(&site.selectors.card)?;
    let title_sel = parse_selector(&site.selectors.title)?;
    let link_sel = parse_selector(&site.selectors.link)?;

    let document = Html::parse_document(markup);
    Ok(document
        .select(&card_sel)
        .map(|card| {
            let name = card.select(&title_sel).next().map(element_text);
            let link = card
                .select(&link_sel)
                .next()
                .and_then(|el| el.value().attr("href"))
                .and_then(|href| site.absolute_url(href));
            ListingStub::new(name, locality, link)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use stayscout_listing_models::UNKNOWN;

    use super::*;

    fn card(i: usize) -> String {
        format!(
            r#"<div data-testid="property-card-container">
                 <div data-testid="title">Hotel {i}</div>
                 <a data-testid="property-card-desktop-single-image" href="/hotel/it/{i}.html">x</a>
               </div>"#
        )
    }

    /// Grows its view by `per_page` cards per click, up to `total`.
    struct FakeRenderer {
        total: usize,
        per_page: usize,
        pages_shown: usize,
        loads: usize,
        clicks: usize,
        waits: usize,
        fail_click: bool,
    }

    impl FakeRenderer {
        fn new(total: usize, per_page: usize) -> Self {
            Self {
                total,
                per_page,
                pages_shown: 0,
                loads: 0,
                clicks: 0,
                waits: 0,
                fail_click: false,
            }
        }

        fn visible(&self) -> usize {
            (self.pages_shown * self.per_page).min(self.total)
        }
    }

    impl Renderer for FakeRenderer {
        async fn load(&mut self, _url: &str) -> Result<(), ScrapeError> {
            self.loads += 1;
            self.pages_shown = 1;
            Ok(())
        }

        async fn current_markup(&self) -> Result<String, ScrapeError> {
            Ok((0..self.visible()).map(card).collect())
        }

        async fn scroll_to_bottom(&mut self) -> Result<(), ScrapeError> {
            Ok(())
        }

        async fn click(&mut self, _selector: &str) -> Result<(), ScrapeError> {
            self.clicks += 1;
            if self.fail_click {
                return Err(ScrapeError::Parse("button vanished".to_string()));
            }
            self.pages_shown += 1;
            Ok(())
        }

        async fn wait_until_clickable(
            &mut self,
            _selector: &str,
            _timeout: Duration,
        ) -> Result<bool, ScrapeError> {
            self.waits += 1;
            Ok(self.visible() < self.total)
        }
    }

    fn site() -> SiteDefinition {
        SiteDefinition::booking().unwrap()
    }

    #[tokio::test]
    async fn stops_at_result_cap_without_loading_more() {
        let site = site();
        let mut renderer = FakeRenderer::new(12, 4);
        let cancel = CancellationToken::new();

        let mut session = crawl(&mut renderer, &site, "Venice", 5, &cancel).await.unwrap();
        let mut names = Vec::new();
        while let Some(stub) = session.next().await {
            names.push(stub.name);
        }
        assert_eq!(session.termination(), Some(CrawlTermination::CapReached));
        assert_eq!(names, ["Hotel 0", "Hotel 1", "Hotel 2", "Hotel 3", "Hotel 4"]);

        // One click was needed to get past the first four; none after the fifth.
        assert_eq!(renderer.clicks, 1);
        assert_eq!(renderer.waits, 1);
        assert_eq!(renderer.loads, 1);
    }

    #[tokio::test]
    async fn unlimited_cap_runs_until_exhaustion() {
        let site = site();
        let mut renderer = FakeRenderer::new(12, 4);
        let cancel = CancellationToken::new();

        let stubs = crawl(&mut renderer, &site, "Venice", 0, &cancel)
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(stubs.len(), 12);
        assert_eq!(stubs[11].name, "Hotel 11");
        assert_eq!(renderer.clicks, 2);
    }

    #[tokio::test]
    async fn failed_load_more_is_natural_exhaustion() {
        let site = site();
        let mut renderer = FakeRenderer::new(12, 4);
        renderer.fail_click = true;
        let cancel = CancellationToken::new();

        let mut session = crawl(&mut renderer, &site, "Venice", 0, &cancel).await.unwrap();
        let mut count = 0;
        while session.next().await.is_some() {
            count += 1;
        }
        assert_eq!(count, 4);
        assert_eq!(session.termination(), Some(CrawlTermination::Exhausted));
    }

    #[tokio::test]
    async fn interrupt_stops_immediately_with_partial_results() {
        let site = site();
        let mut renderer = FakeRenderer::new(12, 4);
        let cancel = CancellationToken::new();

        let mut session = crawl(&mut renderer, &site, "Venice", 0, &cancel).await.unwrap();
        assert!(session.next().await.is_some());
        assert!(session.next().await.is_some());
        cancel.cancel();
        assert!(session.next().await.is_none());
        assert_eq!(session.termination(), Some(CrawlTermination::Interrupted));
        assert_eq!(session.accumulated().len(), 4);
        assert_eq!(renderer.clicks, 0);
    }

    #[tokio::test]
    async fn already_cancelled_crawl_loads_nothing() {
        let site = site();
        let mut renderer = FakeRenderer::new(12, 4);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let stubs = crawl(&mut renderer, &site, "Venice", 0, &cancel)
            .await
            .unwrap()
            .collect()
            .await;
        assert!(stubs.is_empty());
        assert_eq!(renderer.loads, 0);
    }

    #[test]
    fn extracts_cards_with_sentinels_and_absolute_links() {
        let markup = format!(
            r#"{}<div data-testid="property-card-container"><span>no title, no link</span></div>"#,
            card(7)
        );
        let stubs = extract_cards(&markup, &site(), "Venice").unwrap();
        assert_eq!(stubs.len(), 2);
        assert_eq!(stubs[0].name, "Hotel 7");
        assert_eq!(stubs[0].city, "Venice");
        assert_eq!(stubs[0].detail_link, "https://www.booking.com/hotel/it/7.html");
        assert_eq!(stubs[1].name, UNKNOWN);
        assert_eq!(stubs[1].detail_link, UNKNOWN);
    }

    #[tokio::test]
    async fn skips_cards_whose_link_was_already_seen() {
        struct RepeatingRenderer {
            clicked: bool,
        }

        impl Renderer for RepeatingRenderer {
            async fn load(&mut self, _url: &str) -> Result<(), ScrapeError> {
                Ok(())
            }
            async fn current_markup(&self) -> Result<String, ScrapeError> {
                // After the click the view shows card 1 again, then card 2.
                Ok(if self.clicked {
                    format!("{}{}{}{}", card(0), card(1), card(1), card(2))
                } else {
                    format!("{}{}", card(0), card(1))
                })
            }
            async fn scroll_to_bottom(&mut self) -> Result<(), ScrapeError> {
                Ok(())
            }
            async fn click(&mut self, _selector: &str) -> Result<(), ScrapeError> {
                self.clicked = true;
                Ok(())
            }
            async fn wait_until_clickable(
                &mut self,
                _selector: &str,
                _timeout: Duration,
            ) -> Result<bool, ScrapeError> {
                Ok(!self.clicked)
            }
        }

        let site = site();
        let mut renderer = RepeatingRenderer { clicked: false };
        let cancel = CancellationToken::new();
        let stubs = crawl(&mut renderer, &site, "Venice", 0, &cancel)
            .await
            .unwrap()
            .collect()
            .await;
        let names: Vec<_> = stubs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["Hotel 0", "Hotel 1", "Hotel 2"]);
    }
}

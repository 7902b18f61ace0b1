//! Detail-page enrichment: address and property category.

use std::sync::Arc;

use scraper::Html;
use stayscout_listing_models::{DetailFields, NOT_AVAILABLE};
use stayscout_scraper::PageFetcher;
use stayscout_scraper::render::{element_text, parse_selector};

use crate::Recoverable;
use crate::normalize::{property_type_from_label, truncate_address};
use crate::site_def::SiteDefinition;

/// Fetches listing detail pages and extracts their address and category.
pub struct DetailFetcher {
    fetcher: Arc<dyn PageFetcher>,
    site: Arc<SiteDefinition>,
}

impl DetailFetcher {
    /// Creates a detail fetcher for the given site.
    #[must_use]
    pub fn new(fetcher: Arc<dyn PageFetcher>, site: Arc<SiteDefinition>) -> Self {
        Self { fetcher, site }
    }

    /// Returns the address and property type behind `detail_link`.
    ///
    /// Never fails: any fetch or parse problem yields `("N/A", "N/A")`.
    pub async fn fetch_detail(&self, detail_link: &str) -> DetailFields {
        match self.try_fetch_detail(detail_link).await {
            Ok(detail) => detail,
            Err(e) => {
                log::warn!("Detail page {detail_link} unusable: {e}");
                DetailFields::unavailable()
            }
        }
    }

    /// Like [`Self::fetch_detail`] but reports why the page was unusable.
    ///
    /// Relative links are resolved against the site's base URL first.
    ///
    /// # Errors
    ///
    /// Returns [`Recoverable::Absent`] for a link that cannot be made
    /// absolute or a page with neither field, and [`Recoverable::Fetch`]
    /// when the page cannot be fetched.
    pub async fn try_fetch_detail(&self, detail_link: &str) -> Result<DetailFields, Recoverable> {
        let url = self
            .site
            .absolute_url(detail_link)
            .ok_or_else(|| Recoverable::Absent {
                what: format!("absolute URL for '{detail_link}'"),
            })?;
        let html = self.fetcher.fetch_text(&url).await?;
        parse_detail(&html, &self.site)
    }
}

/// Extracts the detail fields from a detail page's markup.
///
/// A missing address or category yields `"N/A"` for that field alone;
/// a page with neither is reported as absent.
///
/// # Errors
///
/// Returns [`Recoverable::Absent`] if neither field is on the page and
/// [`Recoverable::Fetch`] if a configured selector is invalid.
pub fn parse_detail(html: &str, site: &SiteDefinition) -> Result<DetailFields, Recoverable> {
    let address_sel = parse_selector(&site.selectors.address)?;
    let property_sel = parse_selector(&site.selectors.property_type)?;
    let document = Html::parse_document(html);

    let address = document
        .select(&address_sel)
        .next()
        .map(|el| truncate_address(&element_text(el), &site.country))
        .filter(|address| !address.is_empty());
    let property_type = document
        .select(&property_sel)
        .next()
        .and_then(|el| property_type_from_label(&element_text(el)));

    if address.is_none() && property_type.is_none() {
        return Err(Recoverable::Absent {
            what: "address and property type".to_owned(),
        });
    }

    Ok(DetailFields {
        address: address.unwrap_or_else(|| NOT_AVAILABLE.to_owned()),
        property_type: property_type.unwrap_or_else(|| NOT_AVAILABLE.to_owned()),
    })
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use stayscout_scraper::ScrapeError;

    use super::*;

    const DETAIL_PAGE: &str = r#"
        <html><body>
          <a class="bui_breadcrumb__link_masked" href="/x">Hotel Novecento (Hotel)</a>
          <div tabindex="0" class="a53cbfa6de f17adf7576">Via Roma 1, 20100 Milano, Italy, Lombardy</div>
        </body></html>"#;

    struct StaticFetcher(Result<String, u16>);

    #[async_trait]
    impl PageFetcher for StaticFetcher {
        async fn fetch_text(&self, url: &str) -> Result<String, ScrapeError> {
            self.0.clone().map_err(|status| ScrapeError::Status {
                url: url.to_string(),
                status,
            })
        }
    }

    fn detail_fetcher(result: Result<String, u16>) -> DetailFetcher {
        DetailFetcher::new(
            Arc::new(StaticFetcher(result)),
            Arc::new(SiteDefinition::booking().unwrap()),
        )
    }

    #[test]
    fn parses_address_and_category() {
        let site = SiteDefinition::booking().unwrap();
        let detail = parse_detail(DETAIL_PAGE, &site).unwrap();
        assert_eq!(detail.address, "Via Roma 1, 20100 Milano, Italy");
        assert_eq!(detail.property_type, "Hotel");
    }

    #[test]
    fn missing_category_parenthesis_is_a_field_sentinel() {
        let site = SiteDefinition::booking().unwrap();
        let html = DETAIL_PAGE.replace("Hotel Novecento (Hotel)", "Hotel Novecento");
        let detail = parse_detail(&html, &site).unwrap();
        assert_eq!(detail.address, "Via Roma 1, 20100 Milano, Italy");
        assert_eq!(detail.property_type, NOT_AVAILABLE);
    }

    #[test]
    fn page_without_either_field_is_absent() {
        let site = SiteDefinition::booking().unwrap();
        let result = parse_detail("<html><body>captcha</body></html>", &site);
        assert!(matches!(result, Err(Recoverable::Absent { .. })));
    }

    #[tokio::test]
    async fn fetch_failure_yields_sentinel_pair() {
        let fetcher = detail_fetcher(Err(503));
        let detail = fetcher
            .fetch_detail("https://www.booking.com/hotel/it/novecento.html")
            .await;
        assert_eq!(detail, DetailFields::unavailable());
    }

    #[tokio::test]
    async fn relative_links_are_fetched_too() {
        let fetcher = detail_fetcher(Ok(DETAIL_PAGE.to_string()));
        let detail = fetcher.fetch_detail("/hotel/it/novecento.html").await;
        assert_eq!(detail.property_type, "Hotel");
    }

    #[tokio::test]
    async fn unresolvable_link_yields_sentinel_pair() {
        let fetcher = detail_fetcher(Ok(DETAIL_PAGE.to_string()));
        let detail = fetcher.fetch_detail("").await;
        assert_eq!(detail, DetailFields::unavailable());
    }
}

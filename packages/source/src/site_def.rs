//! Config-driven description of the booking site being crawled.
//!
//! A [`SiteDefinition`] captures everything markup-specific about the
//! search engine: where results live, which selectors find cards and
//! detail fields, and which country name ends an address. The Booking
//! definition is baked into the binary; others can be loaded from TOML at
//! runtime.

use serde::Deserialize;
use stayscout_scraper::render::parse_selector;
use url::Url;

use crate::SiteError;

/// TOML for the built-in Booking definition.
const BOOKING_TOML: &str = include_str!("../sites/booking.toml");

/// Placeholder in [`SiteDefinition::search_url`] replaced by the
/// formatted locality.
pub const LOCALITY_PLACEHOLDER: &str = "{locality}";

/// A complete, config-driven site definition.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteDefinition {
    /// Unique identifier (e.g., `"booking"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Origin relative links are resolved against.
    pub base_url: String,
    /// Results URL template containing [`LOCALITY_PLACEHOLDER`].
    pub search_url: String,
    /// Country name after which address text is discarded.
    pub country: String,
    /// CSS selectors for results and detail pages.
    pub selectors: SiteSelectors,
}

/// CSS selectors used against the site's markup.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteSelectors {
    /// One listing card on the results page.
    pub card: String,
    /// Listing title inside a card.
    pub title: String,
    /// Anchor inside a card whose `href` is the detail page.
    pub link: String,
    /// Affordance that loads more results.
    pub load_more: String,
    /// Address element on the detail page.
    pub address: String,
    /// Breadcrumb label carrying `"Name (Category)"`.
    pub property_type: String,
}

impl SiteDefinition {
    /// The embedded Booking definition.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError`] if the embedded TOML is invalid.
    pub fn booking() -> Result<Self, SiteError> {
        parse_site_toml(BOOKING_TOML)
    }

    /// Results URL for an already formatted locality.
    #[must_use]
    pub fn results_url(&self, formatted_locality: &str) -> String {
        self.search_url
            .replace(LOCALITY_PLACEHOLDER, formatted_locality)
    }

    /// Resolves `href` against [`Self::base_url`].
    ///
    /// Absolute links pass through unchanged. Returns `None` when the
    /// result is not an `http(s)` URL.
    #[must_use]
    pub fn absolute_url(&self, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() {
            return None;
        }
        let base = Url::parse(&self.base_url).ok()?;
        let url = base.join(href).ok()?;
        matches!(url.scheme(), "http" | "https").then(|| url.to_string())
    }

    fn validate(&self) -> Result<(), SiteError> {
        Url::parse(&self.base_url).map_err(|e| SiteError::Invalid {
            site: self.id.clone(),
            message: format!("base_url '{}': {e}", self.base_url),
        })?;
        if !self.search_url.contains(LOCALITY_PLACEHOLDER) {
            return Err(SiteError::Invalid {
                site: self.id.clone(),
                message: format!("search_url must contain {LOCALITY_PLACEHOLDER}"),
            });
        }
        let s = &self.selectors;
        for selector in [
            &s.card,
            &s.title,
            &s.link,
            &s.load_more,
            &s.address,
            &s.property_type,
        ] {
            parse_selector(selector).map_err(|e| SiteError::Invalid {
                site: self.id.clone(),
                message: e.to_string(),
            })?;
        }
        Ok(())
    }
}

/// Parses and validates a site definition from TOML.
///
/// # Errors
///
/// Returns [`SiteError`] if the TOML is malformed, a selector is not valid
/// CSS, or a URL is unusable.
pub fn parse_site_toml(toml_str: &str) -> Result<SiteDefinition, SiteError> {
    let site: SiteDefinition = toml::from_str(toml_str)?;
    site.validate()?;
    Ok(site)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_booking_definition_is_valid() {
        let site = SiteDefinition::booking().unwrap();
        assert_eq!(site.id, "booking");
        assert_eq!(site.country, "Italy");
    }

    #[test]
    fn builds_results_url() {
        let site = SiteDefinition::booking().unwrap();
        assert_eq!(
            site.results_url("Forte+dei+Marmi"),
            "https://www.booking.com/searchresults.html?ss=Forte+dei+Marmi"
        );
    }

    #[test]
    fn resolves_relative_and_keeps_absolute_links() {
        let site = SiteDefinition::booking().unwrap();
        assert_eq!(
            site.absolute_url("/hotel/it/novecento.html").as_deref(),
            Some("https://www.booking.com/hotel/it/novecento.html")
        );
        assert_eq!(
            site.absolute_url("https://other.example/x").as_deref(),
            Some("https://other.example/x")
        );
        assert!(site.absolute_url("").is_none());
        assert!(site.absolute_url("mailto:info@hotel.it").is_none());
    }

    #[test]
    fn rejects_search_url_without_placeholder() {
        let toml = BOOKING_TOML.replace("{locality}", "venice");
        assert!(matches!(
            parse_site_toml(&toml),
            Err(SiteError::Invalid { .. })
        ));
    }

    #[test]
    fn rejects_invalid_selector() {
        let toml = BOOKING_TOML.replace("a.bui_breadcrumb__link_masked", "a[[[");
        assert!(parse_site_toml(&toml).is_err());
    }
}

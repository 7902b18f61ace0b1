#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Listing discovery and enrichment.
//!
//! The [`crawler`] walks a locality's results view and yields
//! [`ListingStub`](stayscout_listing_models::ListingStub)s; the
//! [`detail`] fetcher and the [`contacts`] resolver turn each stub into the
//! pieces of an enriched record. Every enrichment step returns a
//! `Result<_, Recoverable>` and its public entry point substitutes sentinel
//! values, so a single bad page never fails a listing.

pub mod contacts;
pub mod crawler;
pub mod detail;
pub mod locality;
pub mod normalize;
pub mod progress;
pub mod search;
pub mod site_def;

use stayscout_scraper::ScrapeError;

/// Failures an enrichment step recovers from locally.
#[derive(Debug, thiserror::Error)]
pub enum Recoverable {
    /// A network, timeout or status failure.
    #[error("fetch failed: {0}")]
    Fetch(#[from] ScrapeError),

    /// The expected markup element was not on the page.
    #[error("{what} not found")]
    Absent {
        /// What was looked for.
        what: String,
    },

    /// The interrupt flag was observed before the step could finish.
    #[error("interrupted")]
    Interrupted,
}

/// Errors loading a site definition.
#[derive(Debug, thiserror::Error)]
pub enum SiteError {
    /// The TOML could not be parsed.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// The definition parsed but is unusable.
    #[error("invalid site definition '{site}': {message}")]
    Invalid {
        /// Identifier of the offending site.
        site: String,
        /// What is wrong with it.
        message: String,
    },
}

//! Contact resolution through an external search index.
//!
//! For one listing, [`ContactResolver::resolve_contacts`] searches for
//! `"{name} {locality} phone email"`, fetches each candidate page on its
//! own, and unions whatever valid emails and phones the pages contain.
//! Candidates fail independently: a dead page costs only its own share of
//! the results.

use std::sync::Arc;

use scraper::Html;
use stayscout_listing_models::ContactQuery;
use stayscout_scraper::PageFetcher;
use tokio_util::sync::CancellationToken;

use crate::Recoverable;
use crate::normalize::extract_contacts;
use crate::search::SearchProvider;

/// Number of search results fetched per listing unless configured.
pub const DEFAULT_MAX_CANDIDATES: usize = 5;

/// Builds the free-text search query for a listing.
#[must_use]
pub fn contact_query_text(name: &str, locality: &str) -> String {
    format!("{name} {locality} phone email")
}

/// Resolves listing contacts by fanning out over search results.
pub struct ContactResolver {
    search: Arc<dyn SearchProvider>,
    fetcher: Arc<dyn PageFetcher>,
    max_candidates: usize,
}

impl ContactResolver {
    /// Creates a resolver fetching up to `max_candidates` pages per listing.
    #[must_use]
    pub fn new(
        search: Arc<dyn SearchProvider>,
        fetcher: Arc<dyn PageFetcher>,
        max_candidates: usize,
    ) -> Self {
        Self {
            search,
            fetcher,
            max_candidates,
        }
    }

    /// Returns every valid email and phone found for the listing.
    ///
    /// Empty results and a failed search both come back as the
    /// `{"unknown"}` pair. `cancel` is checked before the search and before
    /// each candidate fetch.
    ///
    /// # Errors
    ///
    /// Returns [`Recoverable::Interrupted`] if `cancel` fires before the
    /// fan-out completes; the partial result is discarded.
    pub async fn resolve_contacts(
        &self,
        name: &str,
        locality: &str,
        cancel: &CancellationToken,
    ) -> Result<ContactQuery, Recoverable> {
        if cancel.is_cancelled() {
            return Err(Recoverable::Interrupted);
        }

        let query = contact_query_text(name, locality);
        let candidates = match self.search.search(&query, self.max_candidates).await {
            Ok(candidates) => candidates,
            Err(e) => {
                log::warn!("Search for '{query}' failed: {e}");
                return Ok(ContactQuery::unknown());
            }
        };

        let mut contacts = ContactQuery::default();
        for url in &candidates {
            if cancel.is_cancelled() {
                return Err(Recoverable::Interrupted);
            }
            match self.fetch_candidate(url).await {
                Ok(found) => {
                    log::debug!(
                        "{url}: {} emails, {} phones",
                        found.emails.len(),
                        found.phones.len()
                    );
                    contacts.absorb(found);
                }
                Err(e) => log::warn!("Contact candidate {url} skipped: {e}"),
            }
        }

        Ok(contacts.or_unknown())
    }

    async fn fetch_candidate(&self, url: &str) -> Result<ContactQuery, Recoverable> {
        let html = self.fetcher.fetch_text(url).await?;
        Ok(extract_contacts(&page_text(&html)))
    }
}

/// All text content of a page, one space between text nodes.
fn page_text(html: &str) -> String {
    Html::parse_document(html)
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ")
}

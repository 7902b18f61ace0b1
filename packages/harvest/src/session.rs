//! The harvest loop: localities, then listings, then persistence.
//!
//! [`Harvester::run`] walks the localities in order. For each one it crawls
//! the results, enriches every stub with its detail fields and contacts,
//! appends the finished record to the run's [`Accumulator`] and rewrites
//! the affected dataset files. A record is either fully enriched and
//! appended or not appended at all.
//!
//! Interrupts arrive through a [`CancellationToken`]. Once it fires no new
//! fetch starts, the listing being enriched is dropped, and every dataset
//! file is rewritten from the accumulator before `run` returns.

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng as _;
use stayscout_listing_models::{
    ContactColumns, ContactQuery, DetailFields, EnrichedRecord, ListingStub,
};
use stayscout_scraper::render::Renderer;
use stayscout_sink::{SinkError, SinkLayout, TOTAL_FILE, Table, TabularSink, locality_file};
use stayscout_source::Recoverable;
use stayscout_source::contacts::ContactResolver;
use stayscout_source::crawler::crawl;
use stayscout_source::detail::DetailFetcher;
use stayscout_source::progress::{ProgressCallback, null_progress};
use stayscout_source::site_def::SiteDefinition;
use tokio_util::sync::CancellationToken;

use crate::HarvestError;

/// Creates the per-locality listing progress indicator.
pub type ListingProgressFactory = Arc<dyn Fn(&str) -> Arc<dyn ProgressCallback> + Send + Sync>;

/// Every record completed during a run, in completion order. Append-only.
#[derive(Debug, Default)]
pub struct Accumulator {
    records: Vec<EnrichedRecord>,
}

impl Accumulator {
    /// Appends a finished record.
    pub fn push(&mut self, record: EnrichedRecord) {
        self.records.push(record);
    }

    /// All records.
    #[must_use]
    pub fn records(&self) -> &[EnrichedRecord] {
        &self.records
    }

    /// Records harvested for `locality`.
    pub fn for_locality<'a>(
        &'a self,
        locality: &'a str,
    ) -> impl Iterator<Item = &'a EnrichedRecord> + 'a {
        self.records.iter().filter(move |r| r.city == locality)
    }

    /// Distinct localities present, in first-seen order.
    #[must_use]
    pub fn localities(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for record in &self.records {
            if !seen.contains(&record.city.as_str()) {
                seen.push(&record.city);
            }
        }
        seen
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing has been harvested yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Outcome of a harvest run.
#[derive(Debug, Clone)]
pub struct HarvestReport {
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run ended, after the final flush.
    pub finished_at: DateTime<Utc>,
    /// Localities whose crawl ran to its natural end.
    pub completed: Vec<String>,
    /// Localities that failed, with the reason.
    pub failed: Vec<(String, String)>,
    /// Records in the accumulator when the run ended.
    pub records: usize,
    /// Whether the run stopped because of an interrupt.
    pub interrupted: bool,
}

impl HarvestReport {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            finished_at: now,
            completed: Vec::new(),
            failed: Vec::new(),
            records: 0,
            interrupted: false,
        }
    }

    /// Wall-clock duration of the run.
    #[must_use]
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Writes accumulator snapshots according to the dataset layout.
struct Persistence {
    sink: Arc<dyn TabularSink>,
    layout: SinkLayout,
    columns: ContactColumns,
}

impl Persistence {
    fn write_locality(&self, acc: &Accumulator, locality: &str) -> Result<(), SinkError> {
        let table = Table::from_records(acc.for_locality(locality), self.columns);
        if table.is_empty() {
            return Ok(());
        }
        self.sink.write(&locality_file(locality), &table)
    }

    fn write_total(&self, acc: &Accumulator) -> Result<(), SinkError> {
        if acc.is_empty() {
            return Ok(());
        }
        self.sink
            .write(TOTAL_FILE, &Table::from_records(acc.records(), self.columns))
    }

    /// Flush after each appended listing.
    fn after_listing(&self, acc: &Accumulator, locality: &str) -> Result<(), SinkError> {
        if self.layout.writes_locality_files() {
            self.write_locality(acc, locality)?;
        }
        if self.layout.cumulative_per_listing() {
            self.write_total(acc)?;
        }
        Ok(())
    }

    /// Flush after each locality, whatever its outcome.
    fn after_locality(&self, acc: &Accumulator) {
        if self.layout.writes_cumulative()
            && !self.layout.cumulative_per_listing()
            && let Err(e) = self.write_total(acc)
        {
            log::error!("Failed to save {TOTAL_FILE}: {e}");
        }
    }

    /// Rewrites every file the layout keeps, from the whole accumulator.
    fn everything(&self, acc: &Accumulator) {
        if self.layout.writes_locality_files() {
            for locality in acc.localities() {
                match self.write_locality(acc, locality) {
                    Ok(()) => log::info!(
                        "Saved {} accommodations for {locality}",
                        acc.for_locality(locality).count()
                    ),
                    Err(e) => log::error!("Failed to save {locality}: {e}"),
                }
            }
        }
        if self.layout.writes_cumulative() {
            match self.write_total(acc) {
                Ok(()) => log::info!("Saved total results of {} accommodations", acc.len()),
                Err(e) => log::error!("Failed to save {TOTAL_FILE}: {e}"),
            }
        }
    }
}

/// Sequences crawling, enrichment and persistence over a list of
/// localities.
pub struct Harvester<R: Renderer> {
    renderer: R,
    site: Arc<SiteDefinition>,
    details: DetailFetcher,
    contacts: ContactResolver,
    persistence: Persistence,
    result_cap: usize,
    pause: RangeInclusive<u64>,
    progress: Arc<dyn ProgressCallback>,
    listing_progress: Option<ListingProgressFactory>,
}

impl<R: Renderer> Harvester<R> {
    /// Creates a harvester with no result cap, the default layout and
    /// contact columns, the default 1-3 s pause and no progress output.
    #[must_use]
    pub fn new(
        renderer: R,
        site: Arc<SiteDefinition>,
        details: DetailFetcher,
        contacts: ContactResolver,
        sink: Arc<dyn TabularSink>,
    ) -> Self {
        Self {
            renderer,
            site,
            details,
            contacts,
            persistence: Persistence {
                sink,
                layout: SinkLayout::default(),
                columns: ContactColumns::default(),
            },
            result_cap: 0,
            pause: 1_000..=3_000,
            progress: null_progress(),
            listing_progress: None,
        }
    }

    /// Sets which dataset files are kept up to date.
    #[must_use]
    pub const fn with_layout(mut self, layout: SinkLayout) -> Self {
        self.persistence.layout = layout;
        self
    }

    /// Sets the contact column shape.
    #[must_use]
    pub const fn with_contact_columns(mut self, columns: ContactColumns) -> Self {
        self.persistence.columns = columns;
        self
    }

    /// Sets the per-locality listing cap; 0 is unlimited.
    #[must_use]
    pub const fn with_result_cap(mut self, cap: usize) -> Self {
        self.result_cap = cap;
        self
    }

    /// Sets the pause after each listing, in milliseconds.
    #[must_use]
    pub const fn with_pause(mut self, pause_ms: RangeInclusive<u64>) -> Self {
        self.pause = pause_ms;
        self
    }

    /// Reports locality progress to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Reports listing progress within each locality to an indicator
    /// created by `factory`.
    #[must_use]
    pub fn with_listing_progress(mut self, factory: ListingProgressFactory) -> Self {
        self.listing_progress = Some(factory);
        self
    }

    /// Harvests `localities` in order until done or interrupted.
    ///
    /// A failing locality is logged and recorded in the report; the run
    /// carries on with the next one.
    pub async fn run(
        &mut self,
        localities: &[String],
        cancel: &CancellationToken,
    ) -> HarvestReport {
        let mut report = HarvestReport::new();
        let mut acc = Accumulator::default();
        self.progress.set_total(localities.len() as u64);

        for locality in localities {
            if cancel.is_cancelled() {
                break;
            }
            self.progress.set_message(locality.clone());

            match self.harvest_locality(locality, &mut acc, cancel).await {
                Ok(count) if !cancel.is_cancelled() => {
                    log::info!("Finished {locality}: {count} accommodations");
                    report.completed.push(locality.clone());
                }
                Ok(count) => log::warn!("Stopped {locality} after {count} accommodations"),
                Err(e) => {
                    log::error!("Error processing {locality}: {e}");
                    report.failed.push((locality.clone(), e.to_string()));
                }
            }

            if !cancel.is_cancelled() {
                self.persistence.after_locality(&acc);
            }
            self.progress.inc(1);
        }

        if cancel.is_cancelled() {
            log::warn!("Interrupt detected; saving progress and stopping");
            report.interrupted = true;
            self.persistence.everything(&acc);
        }

        report.records = acc.len();
        report.finished_at = Utc::now();
        self.progress.finish(format!(
            "{} accommodations from {} localities",
            report.records,
            report.completed.len()
        ));
        report
    }

    async fn harvest_locality(
        &mut self,
        locality: &str,
        acc: &mut Accumulator,
        cancel: &CancellationToken,
    ) -> Result<usize, HarvestError> {
        let Self {
            renderer,
            site,
            details,
            contacts,
            persistence,
            result_cap,
            pause,
            listing_progress,
            ..
        } = self;

        let progress = listing_progress
            .as_ref()
            .map_or_else(null_progress, |factory| factory(locality));
        if *result_cap > 0 {
            progress.set_total(*result_cap as u64);
        }

        let mut session = crawl(renderer, site, locality, *result_cap, cancel)
            .await
            .map_err(|e| HarvestError::Locality {
                locality: locality.to_owned(),
                source: Box::new(e),
            })?;

        let mut count = 0;
        while let Some(stub) = session.next().await {
            let name = stub.name.clone();
            let enriched = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                record = enrich(details, contacts, stub, cancel) => record,
            };
            let Some(record) = enriched else {
                log::warn!("Dropped {name} ({locality}): interrupted during enrichment");
                break;
            };

            log::info!(
                "[{locality}] {}: {} | {} | {} | {}",
                record.name,
                record.address,
                record.property_type,
                record.emails.iter().next().map_or("", String::as_str),
                record.phones.iter().next().map_or("", String::as_str),
            );
            acc.push(record);
            count += 1;
            progress.inc(1);

            persistence
                .after_listing(acc, locality)
                .map_err(|e| HarvestError::Locality {
                    locality: locality.to_owned(),
                    source: Box::new(e),
                })?;

            if !pause_between_listings(pause.clone(), cancel).await {
                break;
            }
        }

        progress.finish(format!("{locality}: {count} accommodations"));
        Ok(count)
    }
}

/// Runs both enrichment steps for one stub.
///
/// Returns `None` when the interrupt was observed before the record could
/// be completed.
async fn enrich(
    details: &DetailFetcher,
    contacts: &ContactResolver,
    stub: ListingStub,
    cancel: &CancellationToken,
) -> Option<EnrichedRecord> {
    if cancel.is_cancelled() {
        return None;
    }
    if !stub.has_detail_link() {
        log::warn!("{} ({}) has no detail link", stub.name, stub.city);
        return Some(EnrichedRecord::new(
            stub,
            DetailFields::unavailable(),
            ContactQuery::unknown(),
        ));
    }

    let detail = details.fetch_detail(&stub.detail_link).await;
    match contacts.resolve_contacts(&stub.name, &stub.city, cancel).await {
        Ok(found) => Some(EnrichedRecord::new(stub, detail, found)),
        Err(Recoverable::Interrupted) => None,
        Err(e) => {
            log::warn!("Contacts for {} unavailable: {e}", stub.name);
            Some(EnrichedRecord::new(stub, detail, ContactQuery::unknown()))
        }
    }
}

/// Sleeps for a random duration within `pause_ms`. Returns `false` if the
/// interrupt fired first.
async fn pause_between_listings(pause_ms: RangeInclusive<u64>, cancel: &CancellationToken) -> bool {
    if *pause_ms.end() == 0 {
        return !cancel.is_cancelled();
    }
    let millis = rand::thread_rng().gen_range(pause_ms);
    tokio::select! {
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(Duration::from_millis(millis)) => true,
    }
}

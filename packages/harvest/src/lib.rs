#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Resumable lodging harvest.
//!
//! Wires the crawler, the enrichment steps and the CSV sink into a
//! [`session::Harvester`], driven from a validated [`config::RunConfig`].
//! Datasets are rewritten after every listing, so an interrupted run keeps
//! everything it finished; `merge` later consolidates the partial files.

pub mod config;
pub mod interactive;
pub mod session;

use std::path::Path;
use std::sync::Arc;

use stayscout_cli_utils::{IndicatifProgress, MultiProgress};
use stayscout_scraper::render::PagerRenderer;
use stayscout_scraper::{HttpFetcher, PageFetcher, ScrapeError};
use stayscout_sink::merge::{MergeOutcome, merge_dir};
use stayscout_sink::{CsvSink, SinkError};
use stayscout_source::SiteError;
use stayscout_source::contacts::ContactResolver;
use stayscout_source::detail::DetailFetcher;
use stayscout_source::search::HtmlSearchEngine;
use tokio_util::sync::CancellationToken;

use crate::config::RunConfig;
use crate::session::{HarvestReport, Harvester};

/// Errors that end a harvest command.
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    /// The run configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A configuration file is not valid TOML.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// The site definition is unusable.
    #[error("site definition error: {0}")]
    Site(#[from] SiteError),

    /// Writing or merging datasets failed.
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// File-system failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// One locality could not be harvested.
    #[error("locality {locality} failed: {source}")]
    Locality {
        /// The locality.
        locality: String,
        /// What went wrong.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl From<ScrapeError> for HarvestError {
    fn from(e: ScrapeError) -> Self {
        Self::Config(format!("HTTP client: {e}"))
    }
}

/// Builds the production harvester for `config`.
///
/// Progress bars are attached to `multi` when given.
///
/// # Errors
///
/// Returns [`HarvestError`] if the site definition cannot be loaded or the
/// HTTP client cannot be built.
pub fn build_harvester(
    config: &RunConfig,
    multi: Option<&MultiProgress>,
) -> Result<Harvester<PagerRenderer>, HarvestError> {
    let site = Arc::new(config.site_definition()?);
    let fetcher: Arc<dyn PageFetcher> = Arc::new(HttpFetcher::new(&config.fetch_config())?);
    let search = Arc::new(HtmlSearchEngine::new(fetcher.clone(), config.search.clone()));

    let mut harvester = Harvester::new(
        PagerRenderer::new(fetcher.clone()),
        site.clone(),
        DetailFetcher::new(fetcher.clone(), site),
        ContactResolver::new(search, fetcher, config.search_results),
        Arc::new(CsvSink::new(&config.output_dir)),
    )
    .with_layout(config.layout)
    .with_contact_columns(config.contact_columns)
    .with_result_cap(config.result_cap)
    .with_pause(config.pause_range());

    if let Some(multi) = multi {
        let localities = u64::try_from(config.localities.len()).unwrap_or(u64::MAX);
        let multi = multi.clone();
        harvester = harvester
            .with_progress(IndicatifProgress::steps_bar(&multi, "Localities", localities))
            .with_listing_progress(Arc::new(move |locality: &str| {
                IndicatifProgress::records_bar(&multi, locality)
            }));
    }
    Ok(harvester)
}

/// Runs a full harvest and logs its summary.
///
/// # Errors
///
/// Returns [`HarvestError`] only for setup failures; locality failures are
/// reported in the returned [`HarvestReport`].
pub async fn run_harvest(
    config: &RunConfig,
    multi: Option<&MultiProgress>,
    cancel: &CancellationToken,
) -> Result<HarvestReport, HarvestError> {
    let mut harvester = build_harvester(config, multi)?;
    log::info!(
        "Harvesting {} localities into {} (cap {}, layout {})",
        config.localities.len(),
        config.output_dir.display(),
        config.result_cap,
        config.layout
    );

    let report = harvester.run(&config.localities, cancel).await;

    log::info!(
        "Harvest {} in {}s: {} accommodations, {} localities completed, {} failed",
        if report.interrupted { "interrupted" } else { "finished" },
        report.elapsed().num_seconds(),
        report.records,
        report.completed.len(),
        report.failed.len()
    );
    for (locality, reason) in &report.failed {
        log::warn!("  {locality}: {reason}");
    }
    Ok(report)
}

/// Merges the datasets in `input` into `output` and logs the outcome.
///
/// The cumulative dataset is left out next to locality files unless
/// `include_total` is set.
///
/// # Errors
///
/// Returns [`HarvestError::Sink`] if `input` cannot be listed or `output`
/// cannot be written.
pub fn run_merge(
    input: &Path,
    output: &Path,
    include_total: bool,
) -> Result<MergeOutcome, HarvestError> {
    let outcome = merge_dir(input, output, include_total)?;
    match outcome {
        MergeOutcome::Merged { files, rows } => {
            log::info!("Merged {rows} rows from {files} files into {}", output.display());
        }
        MergeOutcome::NothingToMerge => {
            log::warn!("No readable datasets in {}; nothing merged", input.display());
        }
    }
    Ok(outcome)
}

/// Cancels `cancel` when the process receives Ctrl+C or, on Unix, a
/// termination signal.
///
/// Must be called from within a Tokio runtime. The termination handler is
/// installed before this returns.
///
/// # Errors
///
/// Returns [`HarvestError::Io`] if the termination handler cannot be
/// installed.
pub fn spawn_interrupt_listener(cancel: CancellationToken) -> Result<(), HarvestError> {
    #[cfg(unix)]
    let mut terminate =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::spawn(async move {
        #[cfg(unix)]
        let received = tokio::select! {
            result = tokio::signal::ctrl_c() => result.ok().map(|()| "interrupt"),
            signal = terminate.recv() => signal.map(|()| "termination signal"),
        };
        #[cfg(not(unix))]
        let received = tokio::signal::ctrl_c().await.ok().map(|()| "interrupt");

        if let Some(signal) = received {
            log::warn!("Received {signal}; finishing up");
            cancel.cancel();
        }
    });
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn termination_signal_cancels_the_run() {
        let cancel = CancellationToken::new();
        spawn_interrupt_listener(cancel.clone()).unwrap();

        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(std::time::Duration::from_secs(5), cancel.cancelled())
            .await
            .unwrap();
    }
}

//! Run configuration.
//!
//! A harvest is configured from three layers, later ones winning: built-in
//! defaults, a TOML file (`stayscout.toml` in the working directory when
//! present, or the file given with `--config`), and command-line overrides.

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use stayscout_listing_models::ContactColumns;
use stayscout_scraper::{DEFAULT_USER_AGENT, FetchConfig};
use stayscout_sink::SinkLayout;
use stayscout_source::contacts::DEFAULT_MAX_CANDIDATES;
use stayscout_source::search::{QUERY_PLACEHOLDER, SearchEngineConfig};
use stayscout_source::site_def::{SiteDefinition, parse_site_toml};

use crate::HarvestError;

/// Configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "stayscout.toml";

const DEFAULT_LOCALITIES_TOML: &str = include_str!("../localities.toml");

#[derive(Deserialize)]
struct LocalityList {
    localities: Vec<String>,
}

/// The built-in locality list, in harvest order.
///
/// # Errors
///
/// Returns [`HarvestError::Toml`] if the embedded list is invalid.
pub fn default_localities() -> Result<Vec<String>, HarvestError> {
    let list: LocalityList = toml::from_str(DEFAULT_LOCALITIES_TOML)?;
    Ok(list.localities)
}

/// Everything a harvest run needs to know.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Localities in harvest order. Empty means the built-in list.
    pub localities: Vec<String>,
    /// Listings per locality; 0 is unlimited.
    pub result_cap: usize,
    /// Directory the datasets are written to.
    pub output_dir: PathBuf,
    /// Which dataset files are kept up to date.
    pub layout: SinkLayout,
    /// Shape of the contact columns.
    pub contact_columns: ContactColumns,
    /// Lower bound of the pause after each listing, in milliseconds.
    pub pause_min_ms: u64,
    /// Upper bound of the pause after each listing, in milliseconds.
    pub pause_max_ms: u64,
    /// Whole-request HTTP timeout, in seconds.
    pub http_timeout_secs: u64,
    /// Retries for transient HTTP failures.
    pub max_retries: u32,
    /// Search results fetched per listing when resolving contacts.
    pub search_results: usize,
    /// Search engine used for contact resolution.
    pub search: SearchEngineConfig,
    /// `User-Agent` sent with every request.
    pub user_agent: String,
    /// Site definition file replacing the embedded Booking definition.
    pub site: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            localities: Vec::new(),
            result_cap: 30,
            output_dir: PathBuf::from("output"),
            layout: SinkLayout::default(),
            contact_columns: ContactColumns::default(),
            pause_min_ms: 1_000,
            pause_max_ms: 3_000,
            http_timeout_secs: 15,
            max_retries: 2,
            search_results: DEFAULT_MAX_CANDIDATES,
            search: SearchEngineConfig::default(),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            site: None,
        }
    }
}

/// Command-line values that replace configured ones.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    /// Replaces [`RunConfig::localities`].
    pub localities: Option<Vec<String>>,
    /// Replaces [`RunConfig::result_cap`].
    pub limit: Option<usize>,
    /// Replaces [`RunConfig::output_dir`].
    pub output_dir: Option<PathBuf>,
    /// Replaces [`RunConfig::layout`].
    pub layout: Option<SinkLayout>,
    /// Replaces [`RunConfig::site`].
    pub site: Option<PathBuf>,
}

impl RunConfig {
    /// Parses a configuration from TOML. Omitted keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::Toml`] for invalid TOML or unknown keys.
    pub fn from_toml(toml_str: &str) -> Result<Self, HarvestError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Loads the configuration file.
    ///
    /// An explicit `path` must exist. Without one, [`DEFAULT_CONFIG_FILE`]
    /// is used when present and the defaults otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError`] if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, HarvestError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.is_file() {
                    log::debug!("No {DEFAULT_CONFIG_FILE}; using defaults");
                    return Ok(Self::default());
                }
                default
            }
        };
        log::info!("Loading configuration from {}", path.display());
        Self::from_toml(&std::fs::read_to_string(&path)?)
    }

    /// Applies command-line overrides.
    #[must_use]
    pub fn with_overrides(mut self, overrides: RunOverrides) -> Self {
        if let Some(localities) = overrides.localities {
            self.localities = localities;
        }
        if let Some(limit) = overrides.limit {
            self.result_cap = limit;
        }
        if let Some(dir) = overrides.output_dir {
            self.output_dir = dir;
        }
        if let Some(layout) = overrides.layout {
            self.layout = layout;
        }
        if overrides.site.is_some() {
            self.site = overrides.site;
        }
        self
    }

    /// Fills in the built-in locality list when none is configured, trims
    /// names, and rejects unusable values.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::Config`] describing the first problem found.
    pub fn validated(mut self) -> Result<Self, HarvestError> {
        if self.localities.is_empty() {
            self.localities = default_localities()?;
        }
        self.localities = self
            .localities
            .iter()
            .map(|l| l.trim().to_owned())
            .collect();

        if self.localities.iter().any(String::is_empty) {
            return Err(HarvestError::Config("locality names must not be blank".to_owned()));
        }
        if self.pause_min_ms > self.pause_max_ms {
            return Err(HarvestError::Config(format!(
                "pause_min_ms ({}) exceeds pause_max_ms ({})",
                self.pause_min_ms, self.pause_max_ms
            )));
        }
        if self.http_timeout_secs == 0 {
            return Err(HarvestError::Config(
                "http_timeout_secs must be positive".to_owned(),
            ));
        }
        if self.search_results == 0 {
            return Err(HarvestError::Config("search_results must be positive".to_owned()));
        }
        if !self.search.url_template.contains(QUERY_PLACEHOLDER) {
            return Err(HarvestError::Config(format!(
                "search.url_template must contain {QUERY_PLACEHOLDER}"
            )));
        }
        Ok(self)
    }

    /// HTTP settings derived from this configuration.
    #[must_use]
    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig::default()
            .with_user_agent(&self.user_agent)
            .with_timeout(Duration::from_secs(self.http_timeout_secs))
            .with_max_retries(self.max_retries)
    }

    /// Pause bounds after each listing, in milliseconds.
    #[must_use]
    pub const fn pause_range(&self) -> RangeInclusive<u64> {
        self.pause_min_ms..=self.pause_max_ms
    }

    /// The site definition to crawl.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError`] if the configured site file cannot be read
    /// or is invalid.
    pub fn site_definition(&self) -> Result<SiteDefinition, HarvestError> {
        match &self.site {
            Some(path) => Ok(parse_site_toml(&std::fs::read_to_string(path)?)?),
            None => Ok(SiteDefinition::booking()?),
        }
    }
}

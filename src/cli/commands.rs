//! Command definitions and execution

use chrono::{Datelike, NaiveDate, NaiveDateTime, Utc};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing::warn;

use super::CliError;
use crate::archive::{update_stations, UpdateJob};
use crate::config::Config;
use crate::fetcher::avalanche::{
    AvalancheClient, BulletinArea, BULLETIN_START_YEAR, EVENING_START_YEAR,
};
use crate::fetcher::mesonet::MesonetClient;
use crate::process::events::normalize_events;
use crate::process::hazards::{extract_hazard_ratings, DEFAULT_BULLETIN_CUTOFF};
use crate::process::stations::{select_stations, StationFilter};
use crate::{DateRange, Mesonet};

/// Default events store file name
const EVENTS_STORE: &str = "btac_events.json.gz";

/// Default observations store file name
const OBS_STORE: &str = "btac_obs.json.gz";

/// Default evening forecast store file name
const EVENING_STORE: &str = "btac_evening_fcst.json.gz";

/// Default hazard rating table file name
const HAZARD_TABLE: &str = "hazard_ratings.csv";

/// Default event table file name
const EVENT_TABLE: &str = "btac_events.csv";

fn bulletin_store(area: BulletinArea) -> String {
    format!("btac_bulletins_{area}.json.gz")
}

// ─── Argument parsing helpers ────────────────────────────────────────────────

/// Parse a date in `YYYY-MM-DD` format.
fn parse_date(input: &str) -> Result<NaiveDate, CliError> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .map_err(|e| CliError::InvalidArgument(format!("Invalid date '{input}': {e}")))
}

/// Parse a start time from `YYYY-MM-DD` or `YYYY-MM-DDTHH:MM:SS`.
///
/// For date-only input, uses start-of-day (00:00:00).
fn parse_start_datetime(input: &str) -> Result<NaiveDateTime, CliError> {
    let input = input.trim();
    if let Ok(t) = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S") {
        return Ok(t);
    }
    let date = parse_date(input)?;
    date.and_hms_opt(0, 0, 0)
        .ok_or_else(|| CliError::InvalidArgument(format!("Invalid start time: {input}")))
}

/// Parse an end time from `YYYY-MM-DD` or `YYYY-MM-DDTHH:MM:SS`.
///
/// For date-only input, uses 23:59 so the specified date is fully included
/// at the archive's minute resolution.
fn parse_end_datetime(input: &str) -> Result<NaiveDateTime, CliError> {
    let input = input.trim();
    if let Ok(t) = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S") {
        return Ok(t);
    }
    let date = parse_date(input)?;
    date.and_hms_opt(23, 59, 0)
        .ok_or_else(|| CliError::InvalidArgument(format!("Invalid end time: {input}")))
}

/// Resolve an optional start/end date pair into a range, defaulting to the
/// configured start date and today.
fn resolve_range(
    start: Option<&str>,
    end: Option<&str>,
    config: &Config,
) -> Result<DateRange, CliError> {
    let start = match start {
        Some(s) => parse_date(s)?,
        None => config.default_start,
    };
    let end = match end {
        Some(s) => parse_date(s)?,
        None => Utc::now().date_naive(),
    };
    DateRange::new(start, end).map_err(CliError::InvalidArgument)
}

/// Load configuration and apply the global CLI overrides.
fn load_config(cli: &Cli) -> Result<Config, CliError> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = data_dir.clone();
    }
    if let Some(token) = &cli.token {
        config.api_token = Some(token.clone());
    }
    Ok(config)
}

fn resolve_store_path(explicit: Option<&PathBuf>, config: &Config, default_name: &str) -> PathBuf {
    explicit
        .cloned()
        .unwrap_or_else(|| config.data_dir.join(default_name))
}

// ─── CLI surface ─────────────────────────────────────────────────────────────

/// Avalanche Data Downloader CLI
#[derive(Parser, Debug)]
#[command(name = "avalanche-data-downloader")]
#[command(about = "Fetch and archive avalanche observation data", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (JSON)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Data directory for archives and stores (default: "data")
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Mesonet API token (overrides the config file and environment)
    #[arg(long, global = true)]
    pub token: Option<String>,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch raw data into local stores
    Fetch(FetchArgs),

    /// Transform stored raw data into derived tables
    Process(ProcessArgs),
}

/// Fetch command arguments
#[derive(Parser, Debug)]
pub struct FetchArgs {
    /// Data source to fetch
    #[command(subcommand)]
    pub source: FetchCommand,
}

/// Data sources available to fetch
#[derive(Subcommand, Debug)]
pub enum FetchCommand {
    /// Update station archives and the metadata table
    Stations(StationsArgs),
    /// Fetch the avalanche event log
    Events(EventsArgs),
    /// Fetch field observations
    Observations(ObservationsArgs),
    /// Fetch morning bulletins for an area
    Advisories(AdvisoriesArgs),
    /// Fetch evening forecasts
    Forecasts(ForecastsArgs),
    /// Print the mesonet network listing
    Networks,
}

/// Process command arguments
#[derive(Parser, Debug)]
pub struct ProcessArgs {
    /// Transformation to run
    #[command(subcommand)]
    pub action: ProcessCommand,
}

/// Transformations available
#[derive(Subcommand, Debug)]
pub enum ProcessCommand {
    /// Extract hazard ratings from stored bulletins
    Hazards(HazardsArgs),
    /// Normalize the stored event batch into a typed table
    Events(ProcessEventsArgs),
    /// Select station ids from the metadata table
    Select(SelectArgs),
}

/// Arguments for updating station archives
#[derive(Parser, Debug)]
pub struct StationsArgs {
    /// Networks to archive (comma separated: SNOTEL, NWAC, BTAVAL)
    #[arg(long, value_delimiter = ',', default_value = "SNOTEL,NWAC,BTAVAL")]
    pub networks: Vec<Mesonet>,

    /// Restrict stations to a state (two-letter code)
    #[arg(long)]
    pub state: Option<String>,

    /// Start time for new archives (YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS)
    #[arg(long)]
    pub start: Option<String>,

    /// End time for every archive (YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS)
    #[arg(long)]
    pub end: Option<String>,
}

/// Arguments for fetching the event log
#[derive(Parser, Debug)]
pub struct EventsArgs {
    /// Range start (YYYY-MM-DD, default: configured start date)
    #[arg(long)]
    pub start: Option<String>,

    /// Range end (YYYY-MM-DD, default: today)
    #[arg(long)]
    pub end: Option<String>,

    /// Output store (default: btac_events.json.gz in the data directory)
    #[arg(long)]
    pub output: Option<PathBuf>,
}

/// Arguments for fetching field observations
#[derive(Parser, Debug)]
pub struct ObservationsArgs {
    /// Range start (YYYY-MM-DD, default: configured start date)
    #[arg(long)]
    pub start: Option<String>,

    /// Range end (YYYY-MM-DD, default: today)
    #[arg(long)]
    pub end: Option<String>,

    /// Output store (default: btac_obs.json.gz in the data directory)
    #[arg(long)]
    pub output: Option<PathBuf>,
}

/// Arguments for fetching morning bulletins
#[derive(Parser, Debug)]
pub struct AdvisoriesArgs {
    /// Bulletin area: teton, tog, or grey
    #[arg(long, default_value = "teton")]
    pub area: BulletinArea,

    /// First season start year
    #[arg(long, default_value_t = BULLETIN_START_YEAR)]
    pub start_year: i32,

    /// Year to stop before, exclusive (default: current year)
    #[arg(long)]
    pub end_year: Option<i32>,

    /// Output store (default: btac_bulletins_<area>.json.gz in the data directory)
    #[arg(long)]
    pub output: Option<PathBuf>,
}

/// Arguments for fetching evening forecasts
#[derive(Parser, Debug)]
pub struct ForecastsArgs {
    /// First season start year
    #[arg(long, default_value_t = EVENING_START_YEAR)]
    pub start_year: i32,

    /// Year to stop before, exclusive (default: current year)
    #[arg(long)]
    pub end_year: Option<i32>,

    /// Output store (default: btac_evening_fcst.json.gz in the data directory)
    #[arg(long)]
    pub output: Option<PathBuf>,
}

/// Arguments for extracting hazard ratings
#[derive(Parser, Debug)]
pub struct HazardsArgs {
    /// Input bulletin store (default: btac_bulletins_teton.json.gz in the data directory)
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Output table (default: hazard_ratings.csv in the data directory)
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Minimum body length for a page to count as a bulletin
    #[arg(long, default_value_t = DEFAULT_BULLETIN_CUTOFF)]
    pub cutoff: usize,
}

/// Arguments for normalizing the event batch
#[derive(Parser, Debug)]
pub struct ProcessEventsArgs {
    /// Input event store (default: btac_events.json.gz in the data directory)
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Output table (default: btac_events.csv in the data directory)
    #[arg(long)]
    pub output: Option<PathBuf>,
}

/// Arguments for selecting stations
#[derive(Parser, Debug)]
pub struct SelectArgs {
    /// Keep stations of this network only
    #[arg(long)]
    pub network: Option<Mesonet>,

    /// Keep stations in this state only (two-letter code)
    #[arg(long)]
    pub state: Option<String>,

    /// Minimum elevation in feet
    #[arg(long)]
    pub elevation_min: Option<f64>,

    /// Maximum elevation in feet
    #[arg(long)]
    pub elevation_max: Option<f64>,

    /// Reference latitude for proximity selection
    #[arg(long, requires = "lon", allow_negative_numbers = true)]
    pub lat: Option<f64>,

    /// Reference longitude for proximity selection
    #[arg(long, requires = "lat", allow_negative_numbers = true)]
    pub lon: Option<f64>,

    /// Keep stations within this distance of the reference point, in km
    #[arg(long, conflicts_with = "k_nearest")]
    pub max_dist: Option<f64>,

    /// Keep the k stations nearest the reference point
    #[arg(long)]
    pub k_nearest: Option<usize>,
}

// ─── Execution ───────────────────────────────────────────────────────────────

impl FetchArgs {
    /// Dispatch to the selected source.
    pub fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        match &self.source {
            FetchCommand::Stations(args) => args.execute(cli),
            FetchCommand::Events(args) => args.execute(cli),
            FetchCommand::Observations(args) => args.execute(cli),
            FetchCommand::Advisories(args) => args.execute(cli),
            FetchCommand::Forecasts(args) => args.execute(cli),
            FetchCommand::Networks => execute_networks(cli),
        }
    }
}

impl ProcessArgs {
    /// Dispatch to the selected transformation.
    pub fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        match &self.action {
            ProcessCommand::Hazards(args) => args.execute(cli),
            ProcessCommand::Events(args) => args.execute(cli),
            ProcessCommand::Select(args) => args.execute(cli),
        }
    }
}

impl StationsArgs {
    /// Execute the station archive update.
    pub fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let config = load_config(cli)?;
        let client = MesonetClient::new(&config)?;
        let start = match &self.start {
            Some(s) => parse_start_datetime(s)?,
            None => config.default_start_datetime(),
        };
        let end = match &self.end {
            Some(s) => parse_end_datetime(s)?,
            None => Utc::now().naive_utc(),
        };
        let job = UpdateJob {
            networks: self.networks.clone(),
            state_filter: self.state.clone(),
            start,
            end,
            data_dir: config.data_dir.clone(),
        };

        let pb = create_progress_bar("Updating station archives".to_string());
        let result = update_stations(&client, &job, Some(&pb));
        pb.finish_and_clear();
        let summary = result?;
        println!(
            "{} of {} stations updated, {} created, {} unchanged, {} skipped",
            summary.updated, summary.total, summary.created, summary.unchanged, summary.skipped
        );
        Ok(())
    }
}

impl EventsArgs {
    /// Execute the event log fetch.
    pub fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let config = load_config(cli)?;
        let client = AvalancheClient::new(&config)?;
        let range = resolve_range(self.start.as_deref(), self.end.as_deref(), &config)?;
        let output = resolve_store_path(self.output.as_ref(), &config, EVENTS_STORE);

        let events = client.fetch_events(range, &output)?;
        println!("{} events written to {}", events, output.display());
        Ok(())
    }
}

impl ObservationsArgs {
    /// Execute the chunked observation fetch.
    pub fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let config = load_config(cli)?;
        let client = AvalancheClient::new(&config)?;
        let range = resolve_range(self.start.as_deref(), self.end.as_deref(), &config)?;
        let output = resolve_store_path(self.output.as_ref(), &config, OBS_STORE);

        let pb = create_progress_bar("Fetching observation chunks".to_string());
        let result = client.fetch_observations(range, &output, Some(&pb));
        pb.finish_and_clear();
        let observations = result?;
        println!("{} observations written to {}", observations, output.display());
        Ok(())
    }
}

impl AdvisoriesArgs {
    /// Execute the morning bulletin fetch.
    pub fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let config = load_config(cli)?;
        let client = AvalancheClient::new(&config)?;
        let end_year = resolve_end_year(self.end_year, self.start_year)?;
        let default_name = bulletin_store(self.area);
        let output = resolve_store_path(self.output.as_ref(), &config, &default_name);

        let pb = create_progress_bar(format!("Fetching {} bulletins", self.area));
        let result = client.fetch_bulletins(self.area, self.start_year, end_year, &output, Some(&pb));
        pb.finish_and_clear();
        let pages = result?;
        println!("{} pages written to {}", pages, output.display());
        Ok(())
    }
}

impl ForecastsArgs {
    /// Execute the evening forecast fetch.
    pub fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let config = load_config(cli)?;
        let client = AvalancheClient::new(&config)?;
        let end_year = resolve_end_year(self.end_year, self.start_year)?;
        let output = resolve_store_path(self.output.as_ref(), &config, EVENING_STORE);

        let pb = create_progress_bar("Fetching evening forecasts".to_string());
        let result = client.fetch_evening_forecasts(self.start_year, end_year, &output, Some(&pb));
        pb.finish_and_clear();
        let pages = result?;
        println!("{} pages written to {}", pages, output.display());
        Ok(())
    }
}

fn execute_networks(cli: &Cli) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let client = MesonetClient::new(&config)?;
    let listing = client.fetch_networks()?;
    println!("{listing:#}");
    Ok(())
}

impl HazardsArgs {
    /// Execute the hazard rating extraction.
    pub fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let config = load_config(cli)?;
        let default_input = bulletin_store(BulletinArea::Teton);
        let input = resolve_store_path(self.input.as_ref(), &config, &default_input);
        let output = resolve_store_path(self.output.as_ref(), &config, HAZARD_TABLE);

        let rows = extract_hazard_ratings(&input, &output, self.cutoff)?;
        println!("{} hazard rows written to {}", rows, output.display());
        Ok(())
    }
}

impl ProcessEventsArgs {
    /// Execute the event table normalization.
    pub fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let config = load_config(cli)?;
        let input = resolve_store_path(self.input.as_ref(), &config, EVENTS_STORE);
        let output = resolve_store_path(self.output.as_ref(), &config, EVENT_TABLE);

        let events = normalize_events(&input, &output)?;
        println!("{} events written to {}", events, output.display());
        Ok(())
    }
}

impl SelectArgs {
    /// Execute the station selection and print matching ids.
    pub fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let config = load_config(cli)?;
        let filter = StationFilter {
            mnet: self.network,
            state: self.state.clone(),
            elevation_min: self.elevation_min,
            elevation_max: self.elevation_max,
            lat_lon: match (self.lat, self.lon) {
                (Some(lat), Some(lon)) => Some((lat, lon)),
                _ => None,
            },
            max_dist_km: self.max_dist,
            k_nearest: self.k_nearest,
        };

        let stids = select_stations(&config.data_dir, &filter)?;
        if stids.is_empty() {
            warn!("No stations meet the criteria");
        }
        for stid in stids {
            println!("{stid}");
        }
        Ok(())
    }
}

/// Resolve the exclusive end year, defaulting to the current year.
fn resolve_end_year(end_year: Option<i32>, start_year: i32) -> Result<i32, CliError> {
    let end_year = end_year.unwrap_or_else(|| Utc::now().year());
    if end_year <= start_year {
        return Err(CliError::InvalidArgument(format!(
            "End year {end_year} must be after start year {start_year}"
        )));
    }
    Ok(end_year)
}

// ─── Progress bar ────────────────────────────────────────────────────────────

/// Create a progress bar with the standard style. The length starts at zero;
/// each operation sets it once the work list is known.
fn create_progress_bar(message: String) -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
            .expect("hardcoded template is valid")
            .progress_chars("#>-"),
    );
    pb.set_message(message);
    pb
}

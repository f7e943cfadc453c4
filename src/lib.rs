//! # Avalanche Data Downloader Library
//!
//! A library for building and maintaining local archives of avalanche-related
//! observation data: weather station timeseries from the mesonet API, avalanche
//! event logs and field observations from the avalanche center, and forecast
//! bulletin pages.
//!
//! ## Features
//!
//! - **Incremental Archives**: Per-station timeseries archives that resume from
//!   the last archived timestamp and append only strictly newer rows
//! - **Resilient Fetching**: Exponential-backoff retry around every network call
//! - **Compressed Stores**: Gzip line-delimited JSON for raw pages, gzip CSV for
//!   tabular archives, all written atomically
//! - **Range Chunking**: Multi-year request windows split into fixed-size chunks
//!   with known-bad dates excised
//! - **Derived Tables**: Transformers that turn stored raw pages and batches into
//!   typed CSV tables
//!
//! ## Quick Start
//!
//! ```no_run
//! use avalanche_data_downloader::archive::{update_stations, UpdateJob};
//! use avalanche_data_downloader::config::Config;
//! use avalanche_data_downloader::fetcher::mesonet::MesonetClient;
//! use avalanche_data_downloader::Mesonet;
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = Config::load(None)?;
//! let client = MesonetClient::new(&config)?;
//!
//! let job = UpdateJob {
//!     networks: vec![Mesonet::Snotel, Mesonet::Nwac],
//!     state_filter: None,
//!     start: config.default_start_datetime(),
//!     end: chrono::Utc::now().naive_utc(),
//!     data_dir: config.data_dir.clone(),
//! };
//!
//! let summary = update_stations(&client, &job, None)?;
//! println!(
//!     "{} of {} stations updated, {} unchanged",
//!     summary.updated, summary.total, summary.unchanged
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several core modules:
//!
//! - [`retry`] - Exponential-backoff retry wrapper for network operations
//! - [`store`] - Line-record stores (plain and gzip) and atomic gzip file helpers
//! - [`fetcher`] - HTTP client wrapper, page fetcher, and per-endpoint clients
//! - [`archive`] - Incremental per-station timeseries archiver
//! - [`process`] - Transformers from stored raw data to derived tables
//! - [`config`] - Explicit runtime configuration
//! - [`cli`] - Command-line surface
//!
//! ## Execution Model
//!
//! Everything is single-threaded, synchronous, blocking I/O. Ordering across
//! URLs, chunks, and stations follows input iteration order; the only pauses are
//! the deliberate inter-request delay and the retry backoff sleeps.

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::{Datelike, Days, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Incremental station timeseries archiver
pub mod archive;

/// CLI command implementations
pub mod cli;

/// Runtime configuration
pub mod config;

/// Network fetchers and endpoint clients
pub mod fetcher;

/// Transformers from raw stores to derived tables
pub mod process;

/// Retry wrapper with exponential backoff
pub mod retry;

/// Line-record stores and gzip file helpers
pub mod store;

/// Textual timestamp format used in station archives: `YYYY-MM-DDTHH:MM:SSZ`.
///
/// Archive rows carry minute-resolution timestamps in this shape; the same
/// format stamps fetched page records. All times are UTC, the `Z` is literal.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Byte length of one timestamp token.
const TIMESTAMP_TOKEN_LEN: usize = 20;

/// Locate the first timestamp token in `s`.
///
/// Scans for the fixed `YYYY-MM-DDTHH:MM:SSZ` shape and validates the match as
/// a real calendar date/time, so `9999-99-99T99:99:99Z` never counts. Returns
/// the byte offset of the token and its parsed value.
pub fn find_timestamp_token(s: &str) -> Option<(usize, NaiveDateTime)> {
    let bytes = s.as_bytes();
    if bytes.len() < TIMESTAMP_TOKEN_LEN {
        return None;
    }
    for i in 0..=bytes.len() - TIMESTAMP_TOKEN_LEN {
        let window = &bytes[i..i + TIMESTAMP_TOKEN_LEN];
        if !token_shape_matches(window) {
            continue;
        }
        // Shape match is all ASCII, so the str slice cannot split a character.
        let token = &s[i..i + TIMESTAMP_TOKEN_LEN];
        if let Ok(ts) = NaiveDateTime::parse_from_str(token, TIMESTAMP_FORMAT) {
            return Some((i, ts));
        }
    }
    None
}

fn token_shape_matches(window: &[u8]) -> bool {
    const DIGIT_POSITIONS: [usize; 14] = [0, 1, 2, 3, 5, 6, 8, 9, 11, 12, 14, 15, 17, 18];
    window[4] == b'-'
        && window[7] == b'-'
        && window[10] == b'T'
        && window[13] == b':'
        && window[16] == b':'
        && window[19] == b'Z'
        && DIGIT_POSITIONS.iter().all(|&i| window[i].is_ascii_digit())
}

/// Mesonet networks with known ids on the mesonet API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mesonet {
    /// NRCS snow telemetry network
    #[serde(rename = "SNOTEL")]
    Snotel,
    /// Northwest Avalanche Center network
    #[serde(rename = "NWAC")]
    Nwac,
    /// Bridger-Teton avalanche network
    #[serde(rename = "BTAVAL")]
    Btaval,
}

impl Mesonet {
    /// All known networks, in id order.
    pub const ALL: [Mesonet; 3] = [Mesonet::Snotel, Mesonet::Nwac, Mesonet::Btaval];

    /// Numeric network id used by the mesonet API.
    pub fn id(&self) -> u32 {
        match self {
            Mesonet::Snotel => 25,
            Mesonet::Nwac => 37,
            Mesonet::Btaval => 48,
        }
    }
}

impl std::fmt::Display for Mesonet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Mesonet::Snotel => "SNOTEL",
            Mesonet::Nwac => "NWAC",
            Mesonet::Btaval => "BTAVAL",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Mesonet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SNOTEL" => Ok(Mesonet::Snotel),
            "NWAC" => Ok(Mesonet::Nwac),
            "BTAVAL" => Ok(Mesonet::Btaval),
            _ => Err(format!("Unrecognized mesonet name: {s}")),
        }
    }
}

/// Inclusive [start, end] date range with chunk-splitting policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    /// First day of the range (inclusive)
    pub start: NaiveDate,
    /// Last day of the range (inclusive)
    pub end: NaiveDate,
}

impl DateRange {
    /// Create a range, rejecting `end < start`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, String> {
        if end < start {
            return Err(format!("Range end ({end}) must not precede start ({start})"));
        }
        Ok(DateRange { start, end })
    }

    /// Whether `day` falls inside the range, endpoints included.
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    /// Split the range into consecutive chunks of at most `years` years.
    ///
    /// Each chunk after the first starts the day after the previous chunk ends,
    /// so the chunks cover the full range with no gaps or overlaps. If `excise`
    /// is given, any chunk that would span that date is clipped to end the day
    /// before it; the excised date then opens the next chunk, where callers can
    /// apply their endpoint-specific repair. The date is never strictly inside
    /// a chunk.
    ///
    /// A `years` of zero is treated as one.
    pub fn chunk_by_years(&self, years: u32, excise: Option<NaiveDate>) -> Vec<DateRange> {
        let years = years.max(1);
        let mut chunks = Vec::new();
        let mut cur_start = self.start;
        let mut cur_end = add_years(self.start, years as i32);
        while cur_start <= self.end {
            if cur_end > self.end {
                cur_end = self.end;
            }
            if let Some(bad) = excise {
                if cur_start < bad && cur_end > bad {
                    cur_end = bad.pred_opt().unwrap_or(bad);
                }
            }
            chunks.push(DateRange {
                start: cur_start,
                end: cur_end,
            });
            cur_start = match cur_end.checked_add_days(Days::new(1)) {
                Some(next) => next,
                None => break,
            };
            cur_end = add_years(cur_end, years as i32);
        }
        chunks
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Shift a date by whole years, falling back a day when the target year has no
/// Feb 29.
fn add_years(date: NaiveDate, years: i32) -> NaiveDate {
    let year = date.year() + years;
    NaiveDate::from_ymd_opt(year, date.month(), date.day())
        .or_else(|| NaiveDate::from_ymd_opt(year, date.month(), date.day() - 1))
        .unwrap_or(date)
}

/// One fetched page as stored in a raw page store
///
/// Serialized with the on-disk field names `url`, `time`, `status`, `content`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageRecord {
    /// URL the page was fetched from
    pub url: String,
    /// UTC fetch time, formatted with [`TIMESTAMP_FORMAT`]
    #[serde(rename = "time")]
    pub fetched_at: String,
    /// HTTP status code of the response
    #[serde(rename = "status")]
    pub status_code: u16,
    /// Response body as text
    #[serde(rename = "content")]
    pub body: String,
}

/// One row of the station metadata table
///
/// Field values are kept as the API returns them (strings); consumers that need
/// numbers parse on use. Serialized field names are the table's column headers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StationMetadata {
    /// Station identifier
    #[serde(rename = "STID")]
    pub stid: String,
    /// Numeric mesonet network id
    #[serde(rename = "MNET_ID")]
    pub mnet_id: String,
    /// Human-readable station name
    #[serde(rename = "NAME")]
    pub name: String,
    /// Latitude in decimal degrees
    #[serde(rename = "LATITUDE")]
    pub latitude: String,
    /// Longitude in decimal degrees
    #[serde(rename = "LONGITUDE")]
    pub longitude: String,
    /// Elevation in feet
    #[serde(rename = "ELEVATION")]
    pub elevation: String,
    /// Two-letter state code
    #[serde(rename = "STATE")]
    pub state: String,
    /// Start of the station's period of record
    #[serde(rename = "REC_START")]
    pub record_start: String,
    /// End of the station's period of record
    #[serde(rename = "REC_END")]
    pub record_end: String,
}

impl StationMetadata {
    /// Validate the fields every downstream consumer depends on.
    pub fn validate(&self) -> Result<(), String> {
        if self.stid.is_empty() {
            return Err("Station id must not be empty".to_string());
        }
        if self.mnet_id.is_empty() {
            return Err(format!("Station {} has no network id", self.stid));
        }
        Ok(())
    }
}

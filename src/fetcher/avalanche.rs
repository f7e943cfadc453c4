//! Avalanche-center fetchers
//!
//! The event log and field observations come back as date-bounded batches;
//! morning bulletins and evening forecasts are plain pages fetched one URL
//! per forecast day through the page fetcher.
//!
//! Observations are served per chunk by a session-cookie endpoint: each chunk
//! gets a fresh client, a HEAD to the observation page to obtain cookies, and
//! then the form POST. Chunk failures are independent; a chunk whose XML
//! cannot be parsed is logged and dropped while the remaining chunks proceed.

use chrono::{NaiveDate, NaiveDateTime};
use indicatif::ProgressBar;
use serde_json::{json, Map, Value};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::http::HttpClient;
use super::pages::PageFetcher;
use super::FetchResult;
use crate::config::Config;
use crate::retry::RetryPolicy;
use crate::store::{Compression, JsonlWriter};
use crate::DateRange;

/// Date format in avalanche-center request parameters
const MDY_FORMAT: &str = "%m/%d/%Y";

/// Chunk size for multi-year observation ranges, in years
pub const OBSERVATION_CHUNK_YEARS: u32 = 5;

/// First season year with morning bulletins on the server
pub const BULLETIN_START_YEAR: i32 = 1999;

/// First season year with evening forecasts on the server
pub const EVENING_START_YEAR: i32 = 2005;

/// The observation endpoint serves truncated XML for ranges spanning this
/// date. Chunking keeps it at a chunk edge and that chunk's response gets
/// repaired before parsing.
pub fn known_bad_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2013, 2, 14).unwrap_or(NaiveDate::MIN)
}

/// Morning bulletin areas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulletinArea {
    /// Teton area (print-template page layout)
    Teton,
    /// Togwotee Pass / continental divide area
    Tog,
    /// Greys River area
    Grey,
}

impl std::fmt::Display for BulletinArea {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BulletinArea::Teton => "teton",
            BulletinArea::Tog => "tog",
            BulletinArea::Grey => "grey",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for BulletinArea {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "teton" => Ok(BulletinArea::Teton),
            "tog" => Ok(BulletinArea::Tog),
            "grey" => Ok(BulletinArea::Grey),
            _ => Err(format!("Unrecognized bulletin area: {s}")),
        }
    }
}

/// Client for the avalanche-center endpoints
pub struct AvalancheClient {
    http: HttpClient,
    base_url: String,
    retry: RetryPolicy,
    page_delay: Duration,
}

impl AvalancheClient {
    /// Build a client from configuration.
    pub fn new(config: &Config) -> FetchResult<Self> {
        Ok(Self {
            http: HttpClient::new(config.retry)?,
            base_url: config.avalanche_base_url.clone(),
            retry: config.retry,
            page_delay: config.page_delay,
        })
    }

    /// Fetch the avalanche event log for `range` and write it as a gzip JSON
    /// batch (`{"data": [...]}`) at `destination`.
    ///
    /// The endpoint pollutes each event with duplicate numeric keys
    /// `"0"`-`"25"`; those are dropped before the events are sorted by
    /// `event_date` ascending. A body that is not valid JSON is logged and
    /// nothing is written. Returns the number of events in the batch.
    pub fn fetch_events(&self, range: DateRange, destination: &Path) -> FetchResult<u64> {
        let url = format!(
            "{}/lib/avy_events.php?action=get&start={}&end={}&areas=All+areas&",
            self.base_url,
            encode_mdy(range.start),
            encode_mdy(range.end),
        );
        info!(%range, "Fetching avalanche events");
        let response = self.http.get(&url)?;

        let mut payload: Value = match serde_json::from_str(&response.body) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(
                    status = response.status,
                    "Events response did not contain valid JSON: {e}"
                );
                return Ok(0);
            }
        };
        let count = match payload.get_mut("data").and_then(Value::as_array_mut) {
            Some(events) => {
                for event in events.iter_mut() {
                    scrub_numeric_keys(event);
                }
                sort_by_event_date(events, "event_date");
                events.len() as u64
            }
            None => {
                warn!("Events payload has no data array, skipping write");
                return Ok(0);
            }
        };

        let mut store = JsonlWriter::create(destination, Compression::Gzip)?;
        store.write(&payload)?;
        store.finish()?;
        info!(events = count, path = %destination.display(), "Wrote event batch");
        Ok(count)
    }

    /// Fetch field observations for `range` in 5-year chunks and write the
    /// combined batch, sorted by `obs_date`, as gzip JSON at `destination`.
    ///
    /// Returns the number of observation records across all parsed chunks.
    pub fn fetch_observations(
        &self,
        range: DateRange,
        destination: &Path,
        progress: Option<&ProgressBar>,
    ) -> FetchResult<u64> {
        let chunks = range.chunk_by_years(OBSERVATION_CHUNK_YEARS, Some(known_bad_date()));
        if let Some(pb) = progress {
            pb.set_length(chunks.len() as u64);
        }
        info!(%range, chunks = chunks.len(), "Fetching field observations");

        let view_url = format!("{}/observations/viewObs", self.base_url);
        let mut records: Vec<Value> = Vec::new();

        for chunk in chunks {
            debug!(%chunk, "Fetching observation chunk");
            // Fresh session per chunk; the cookie jar dies with the client
            let session = HttpClient::with_cookies(self.retry)?;
            session.head(&view_url)?;

            let export = observation_export(&self.base_url, &chunk);
            let form: Vec<(&str, &str)> = export
                .form
                .iter()
                .map(|(name, value)| (*name, value.as_str()))
                .collect();
            let response = session.post_form(&export.url, &export.referer, &form)?;

            let mut xml = response.body;
            if chunk.contains(known_bad_date()) {
                xml = repair_truncated_xml(xml);
            }
            match parse_marker_records(&xml) {
                Ok(mut markers) => {
                    debug!(%chunk, markers = markers.len(), "Parsed observation chunk");
                    records.append(&mut markers);
                }
                Err(e) => {
                    warn!(%chunk, "Observation chunk XML cannot be parsed, skipping: {e}");
                }
            }
            if let Some(pb) = progress {
                pb.inc(1);
            }
        }

        sort_by_event_date(&mut records, "obs_date");
        let count = records.len() as u64;
        let batch = json!({ "data": records });

        let mut store = JsonlWriter::create(destination, Compression::Gzip)?;
        store.write(&batch)?;
        store.finish()?;
        info!(observations = count, path = %destination.display(), "Wrote observation batch");
        Ok(count)
    }

    /// Fetch every morning bulletin for `area` across the seasons starting in
    /// `[start_year, end_year)` into a page store at `destination`.
    pub fn fetch_bulletins(
        &self,
        area: BulletinArea,
        start_year: i32,
        end_year: i32,
        destination: &Path,
        progress: Option<&ProgressBar>,
    ) -> FetchResult<u64> {
        let urls = season_urls(&self.base_url, area, start_year, end_year);
        if let Some(pb) = progress {
            pb.set_length(urls.len() as u64);
        }
        info!(%area, urls = urls.len(), "Fetching morning bulletins");
        PageFetcher::new(&self.http, self.page_delay).fetch_pages(&urls, destination, progress)
    }

    /// Fetch every evening forecast across the seasons starting in
    /// `[start_year, end_year)` into a page store at `destination`.
    pub fn fetch_evening_forecasts(
        &self,
        start_year: i32,
        end_year: i32,
        destination: &Path,
        progress: Option<&ProgressBar>,
    ) -> FetchResult<u64> {
        let urls = evening_urls(&self.base_url, start_year, end_year);
        if let Some(pb) = progress {
            pb.set_length(urls.len() as u64);
        }
        info!(urls = urls.len(), "Fetching evening forecasts");
        PageFetcher::new(&self.http, self.page_delay).fetch_pages(&urls, destination, progress)
    }
}

/// Format a date as `MM/DD/YYYY` with the slashes percent-encoded.
fn encode_mdy(day: NaiveDate) -> String {
    day.format(MDY_FORMAT).to_string().replace('/', "%2F")
}

/// One bulletin URL per forecast day for all seasons starting in
/// `[start_year, end_year)`. A season runs Nov 1 through May 30 of the
/// following year.
pub fn season_urls(
    base_url: &str,
    area: BulletinArea,
    start_year: i32,
    end_year: i32,
) -> Vec<String> {
    season_days(start_year, end_year)
        .into_iter()
        .map(|day| bulletin_url(base_url, area, day))
        .collect()
}

/// One evening-forecast URL per forecast day for all seasons starting in
/// `[start_year, end_year)`.
pub fn evening_urls(base_url: &str, start_year: i32, end_year: i32) -> Vec<String> {
    season_days(start_year, end_year)
        .into_iter()
        .map(|day| format!("{base_url}/viewAdvisory?&data_date={day}"))
        .collect()
}

fn season_days(start_year: i32, end_year: i32) -> Vec<NaiveDate> {
    let mut days = Vec::new();
    for year in start_year..end_year {
        let (Some(first), Some(last)) = (
            NaiveDate::from_ymd_opt(year, 11, 1),
            NaiveDate::from_ymd_opt(year + 1, 5, 30),
        ) else {
            continue;
        };
        let mut day = first;
        while day <= last {
            days.push(day);
            day = match day.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }
    }
    days
}

fn bulletin_url(base_url: &str, area: BulletinArea, day: NaiveDate) -> String {
    match area {
        BulletinArea::Teton => {
            format!("{base_url}/viewTeton?data_date={day}&template=teton_print.tpl.php")
        }
        BulletinArea::Tog => format!("{base_url}/viewOther?area=tog&data_date={day}"),
        // sic, the server spells the area parameter this way
        BulletinArea::Grey => format!("{base_url}/viewOther?area=greay&data_date={day}"),
    }
}

/// The observation export POST for one chunk. The export endpoint doubles as
/// the request's referer.
struct ObservationExport {
    url: String,
    referer: String,
    form: [(&'static str, String); 5],
}

fn observation_export(base_url: &str, chunk: &DateRange) -> ObservationExport {
    let url = format!("{base_url}/lib/obs_xml.php");
    ObservationExport {
        referer: url.clone(),
        url,
        form: [
            ("start_date", chunk.start.format(MDY_FORMAT).to_string()),
            ("end_date", chunk.end.format(MDY_FORMAT).to_string()),
            ("area", "All areas".to_string()),
            ("zone", "0".to_string()),
            ("approved", "1".to_string()),
        ],
    }
}

/// Remove the duplicate numeric keys `"0"`-`"25"` the events endpoint adds to
/// every record.
fn scrub_numeric_keys(event: &mut Value) {
    if let Some(object) = event.as_object_mut() {
        for i in 0..=25 {
            object.remove(&i.to_string());
        }
    }
}

/// Sort records ascending by the date string under `key`.
///
/// Records whose date cannot be parsed sort first; a tolerant batch beats a
/// lost one. The sort is stable, so same-date records keep arrival order.
fn sort_by_event_date(records: &mut [Value], key: &str) {
    records.sort_by_key(|record| {
        record
            .get(key)
            .and_then(Value::as_str)
            .and_then(parse_lenient_datetime)
            .unwrap_or(NaiveDateTime::MIN)
    });
}

/// Parse the date formats observed in event and observation records.
fn parse_lenient_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    const DATETIME_FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M",
    ];
    for format in DATETIME_FORMATS {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, format) {
            return Some(t);
        }
    }
    const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];
    for format in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, format) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Rebuild a truncated markers document: cut at the last complete element and
/// close the root.
fn repair_truncated_xml(xml: String) -> String {
    match xml.rfind("/>") {
        Some(idx) => {
            let mut fixed = xml[..idx + 2].to_string();
            fixed.push_str("\n</markers>\n");
            fixed
        }
        None => xml,
    }
}

/// Parse a `<markers>` document into one flat record per `<marker .../>`
/// element, attribute names as keys.
fn parse_marker_records(xml: &str) -> Result<Vec<Value>, String> {
    if !xml.contains("<markers") {
        return Err("missing <markers> root element".to_string());
    }
    let mut records = Vec::new();
    let mut rest = xml;
    while let Some(idx) = rest.find("<marker ") {
        let after = &rest[idx + "<marker ".len()..];
        let end = after
            .find("/>")
            .ok_or_else(|| "unterminated <marker> element".to_string())?;
        records.push(parse_attributes(&after[..end])?);
        rest = &after[end + 2..];
    }
    Ok(records)
}

fn parse_attributes(attrs: &str) -> Result<Value, String> {
    let mut record = Map::new();
    let mut rest = attrs.trim();
    while !rest.is_empty() {
        let eq = rest
            .find('=')
            .ok_or_else(|| format!("attribute without value near `{rest}`"))?;
        let name = rest[..eq].trim();
        if name.is_empty() {
            return Err("empty attribute name".to_string());
        }
        let after_eq = rest[eq + 1..].trim_start();
        let quote = after_eq
            .chars()
            .next()
            .ok_or_else(|| format!("attribute `{name}` has no value"))?;
        if quote != '"' && quote != '\'' {
            return Err(format!("unquoted value for attribute `{name}`"));
        }
        let value_rest = &after_eq[1..];
        let close = value_rest
            .find(quote)
            .ok_or_else(|| format!("unterminated value for attribute `{name}`"))?;
        record.insert(
            name.to_string(),
            Value::String(unescape_xml(&value_rest[..close])),
        );
        rest = value_rest[close + 1..].trim_start();
    }
    Ok(Value::Object(record))
}

fn unescape_xml(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

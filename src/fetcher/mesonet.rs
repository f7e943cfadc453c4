//! Mesonet API client
//!
//! Wraps the `networks`, `stations/metadata`, and `stations/timeseries`
//! endpoints. The API reports failures in-band: a JSON envelope whose
//! `SUMMARY.RESPONSE_CODE` is `-1` carries the error message, and a request
//! too large for JSON output comes back as a non-JSON body.

use chrono::NaiveDateTime;
use serde_json::Value;
use tracing::{debug, warn};

use super::http::HttpClient;
use super::{FetchError, FetchResult};
use crate::config::Config;
use crate::{Mesonet, StationMetadata};

/// Request timestamp format on the timeseries endpoint
const API_TIME_FORMAT: &str = "%Y%m%d%H%M";

/// Body format requested from the timeseries endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// CSV rows with a preamble and header block
    Csv,
    /// JSON payload; large requests are rejected by the service
    Json,
}

impl OutputFormat {
    fn as_param(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        }
    }
}

/// Client for the mesonet API
pub struct MesonetClient {
    http: HttpClient,
    base_url: String,
    token: String,
}

impl MesonetClient {
    /// Build a client from configuration. Requires the API token.
    pub fn new(config: &Config) -> FetchResult<Self> {
        let token = config.require_token()?.to_string();
        let http = HttpClient::new(config.retry)?;
        Ok(Self {
            http,
            base_url: config.mesonet_base_url.clone(),
            token,
        })
    }

    /// List mesonet networks. The payload has no fixed schema.
    pub fn fetch_networks(&self) -> FetchResult<Value> {
        let url = format!("{}networks?&token={}", self.base_url, self.token);
        debug!("Fetching network list");
        let response = self.http.get(&url)?;
        let payload: Value = serde_json::from_str(&response.body)
            .map_err(|e| FetchError::MalformedResponse(format!("networks payload: {e}")))?;
        check_envelope(&payload)?;
        Ok(payload)
    }

    /// Fetch station metadata for `networks`, with optional extra `key=value`
    /// query filters (for example `state=WY`).
    ///
    /// Every station entry must carry the fields the metadata table needs;
    /// a malformed entry fails the whole fetch since the table drives all
    /// downstream per-station work.
    pub fn fetch_station_metadata(
        &self,
        networks: &[Mesonet],
        filters: &[(String, String)],
    ) -> FetchResult<Vec<StationMetadata>> {
        let ids = networks
            .iter()
            .map(|n| n.id().to_string())
            .collect::<Vec<_>>()
            .join(",");
        let mut url = format!("{}stations/metadata?&network={ids}", self.base_url);
        for (key, value) in filters {
            url.push_str(&format!("&{key}={value}"));
        }
        url.push_str(&format!("&token={}", self.token));

        debug!(networks = %ids, filters = filters.len(), "Fetching station metadata");
        let response = self.http.get(&url)?;
        let payload: Value = serde_json::from_str(&response.body)
            .map_err(|e| FetchError::MalformedResponse(format!("metadata payload: {e}")))?;
        check_envelope(&payload)?;

        let stations = payload
            .get("STATION")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                FetchError::MalformedResponse("metadata payload has no STATION array".to_string())
            })?;

        let mut rows = Vec::with_capacity(stations.len());
        for station in stations {
            let row = station_row(station);
            row.validate().map_err(FetchError::MalformedResponse)?;
            rows.push(row);
        }
        debug!(stations = rows.len(), "Parsed station metadata");
        Ok(rows)
    }

    /// Fetch a timeseries for `stids` over `[start, end]`, returning the raw
    /// body text (CSV rows for [`OutputFormat::Csv`]).
    ///
    /// An in-band API rejection surfaces as [`FetchError::Api`]; a body in
    /// the wrong format as [`FetchError::MalformedResponse`].
    pub fn fetch_timeseries(
        &self,
        stids: &[String],
        start: NaiveDateTime,
        end: NaiveDateTime,
        output: OutputFormat,
    ) -> FetchResult<String> {
        let stid = stids.join(",");
        let url = format!(
            "{}stations/timeseries?&stid={stid}&start={}&end={}&output={}&token={}",
            self.base_url,
            start.format(API_TIME_FORMAT),
            end.format(API_TIME_FORMAT),
            output.as_param(),
            self.token,
        );
        debug!(stid = %stid, start = %start, end = %end, "Fetching timeseries");
        let response = self.http.get(&url)?;
        classify_timeseries_body(output, response.body)
    }
}

/// Surface an in-band API error envelope, if present.
fn check_envelope(payload: &Value) -> FetchResult<()> {
    let summary = payload.get("SUMMARY");
    let code = summary
        .and_then(|s| s.get("RESPONSE_CODE"))
        .and_then(Value::as_i64);
    if code == Some(-1) {
        let message = summary
            .and_then(|s| s.get("RESPONSE MESSAGE"))
            .and_then(Value::as_str)
            .unwrap_or("unspecified API error")
            .to_string();
        warn!("API rejected request: {message}");
        return Err(FetchError::Api(message));
    }
    Ok(())
}

/// Sort a timeseries body into data or error per the requested format.
fn classify_timeseries_body(output: OutputFormat, body: String) -> FetchResult<String> {
    match serde_json::from_str::<Value>(&body) {
        Ok(payload) => {
            check_envelope(&payload)?;
            match output {
                // A JSON body where CSV rows were requested carries no data
                OutputFormat::Csv => Err(FetchError::MalformedResponse(
                    "expected CSV rows, got a JSON payload".to_string(),
                )),
                OutputFormat::Json => Ok(body),
            }
        }
        Err(_) => match output {
            OutputFormat::Csv => Ok(body),
            OutputFormat::Json => Err(FetchError::MalformedResponse(
                "request too large for JSON output".to_string(),
            )),
        },
    }
}

fn string_field(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn station_row(station: &Value) -> StationMetadata {
    let period = station
        .get("PERIOD_OF_RECORD")
        .cloned()
        .unwrap_or(Value::Null);
    StationMetadata {
        stid: string_field(station, "STID"),
        mnet_id: string_field(station, "MNET_ID"),
        name: string_field(station, "NAME"),
        latitude: string_field(station, "LATITUDE"),
        longitude: string_field(station, "LONGITUDE"),
        elevation: string_field(station, "ELEVATION"),
        state: string_field(station, "STATE"),
        record_start: string_field(&period, "start"),
        record_end: string_field(&period, "end"),
    }
}

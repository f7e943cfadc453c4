//! Incremental station timeseries archiver
//!
//! Each station archives to one gzip CSV file named `<STID>.csv` under the
//! data directory. An update run refreshes the station metadata table, then
//! walks the stations: archives that already exist resume one minute after
//! their last archived timestamp and grow by append only, new stations get
//! the full response written as their initial archive.
//!
//! Failures are handled per station: an API rejection or a malformed
//! response skips that station and the run continues, while transport
//! failures that survive the retry policy abort the whole run.

use chrono::NaiveDateTime;
use indicatif::ProgressBar;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::fetcher::mesonet::{MesonetClient, OutputFormat};
use crate::fetcher::FetchError;
use crate::store::gz::{read_gzip_string, write_csv_gzip_atomic, write_gzip_atomic};
use crate::store::StoreError;
use crate::{find_timestamp_token, Mesonet, StationMetadata};

/// Archiver errors
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Fetching metadata or timeseries failed
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Reading or writing an archive file failed
    #[error("Store failed: {0}")]
    Store(#[from] StoreError),
}

/// Result type for archiver operations
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// One station update run
#[derive(Debug, Clone)]
pub struct UpdateJob {
    /// Networks whose stations are archived
    pub networks: Vec<Mesonet>,
    /// Optional state filter applied to station selection (e.g. `"WY"`)
    pub state_filter: Option<String>,
    /// Start of the request window for stations with no archive yet
    pub start: NaiveDateTime,
    /// End of the request window for every station
    pub end: NaiveDateTime,
    /// Directory holding the archives and the metadata table
    pub data_dir: PathBuf,
}

/// Outcome counts for an update run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UpdateSummary {
    /// Stations in the metadata table
    pub total: usize,
    /// Existing archives that gained rows
    pub updated: usize,
    /// Archives created this run
    pub created: usize,
    /// Archives whose response held nothing new
    pub unchanged: usize,
    /// Stations skipped after a per-station failure
    pub skipped: usize,
}

/// How a response merged into an archive
#[derive(Debug, PartialEq, Eq)]
enum MergeOutcome {
    /// No archive existed; the full response becomes the archive
    Created(String),
    /// Rows strictly after the archived tail were appended
    Appended(String),
    /// The response carried no data rows; the archive is untouched
    NoNewData,
}

enum StationOutcome {
    Created,
    Appended,
    Unchanged,
    Skipped,
}

/// Refresh the station metadata table and update every station archive.
///
/// The metadata table is rewritten from the fresh listing before any station
/// is touched, so the table and the archives never drift more than one run
/// apart. Returns counts of what happened to each archive.
pub fn update_stations(
    client: &MesonetClient,
    job: &UpdateJob,
    progress: Option<&ProgressBar>,
) -> ArchiveResult<UpdateSummary> {
    let filters: Vec<(String, String)> = job
        .state_filter
        .iter()
        .map(|state| ("state".to_string(), state.clone()))
        .collect();
    let stations = client.fetch_station_metadata(&job.networks, &filters)?;

    let table = metadata_table_path(&job.data_dir, &job.networks);
    write_csv_gzip_atomic(&table, &stations)?;
    info!(
        stations = stations.len(),
        path = %table.display(),
        "Wrote station metadata table"
    );

    if let Some(pb) = progress {
        pb.set_length(stations.len() as u64);
    }
    let mut summary = UpdateSummary {
        total: stations.len(),
        ..UpdateSummary::default()
    };
    for station in &stations {
        match update_station(client, job, station) {
            Ok(StationOutcome::Created) => summary.created += 1,
            Ok(StationOutcome::Appended) => summary.updated += 1,
            Ok(StationOutcome::Unchanged) => summary.unchanged += 1,
            Ok(StationOutcome::Skipped) => summary.skipped += 1,
            Err(ArchiveError::Fetch(FetchError::Api(message))) => {
                warn!(stid = %station.stid, "API rejected request, skipping station: {message}");
                summary.skipped += 1;
            }
            Err(ArchiveError::Fetch(FetchError::MalformedResponse(message))) => {
                warn!(stid = %station.stid, "Malformed response, skipping station: {message}");
                summary.skipped += 1;
            }
            Err(e) => return Err(e),
        }
        if let Some(pb) = progress {
            pb.inc(1);
        }
    }
    info!(
        total = summary.total,
        created = summary.created,
        updated = summary.updated,
        unchanged = summary.unchanged,
        skipped = summary.skipped,
        "Station update complete"
    );
    Ok(summary)
}

/// Path of the station metadata table for `networks`.
pub fn metadata_table_path(data_dir: &Path, networks: &[Mesonet]) -> PathBuf {
    let ids = networks
        .iter()
        .map(|n| n.id().to_string())
        .collect::<Vec<_>>()
        .join("_");
    data_dir.join(format!("stn_metadata_MNETIDs_{ids}.csv"))
}

fn update_station(
    client: &MesonetClient,
    job: &UpdateJob,
    station: &StationMetadata,
) -> ArchiveResult<StationOutcome> {
    let stid = &station.stid;
    let path = job.data_dir.join(format!("{stid}.csv"));

    let existing = if path.exists() {
        info!(%stid, "Archive exists, updating");
        Some(read_gzip_string(&path)?)
    } else {
        info!(%stid, "No archive yet, creating");
        None
    };

    let start = match &existing {
        Some(content) => match last_timestamp(content) {
            Some(t) => t
                .checked_add_signed(chrono::Duration::minutes(1))
                .unwrap_or(t),
            None => {
                warn!(%stid, "No timestamp in archive tail, skipping");
                return Ok(StationOutcome::Skipped);
            }
        },
        None => job.start,
    };

    let response = client.fetch_timeseries(&[stid.clone()], start, job.end, OutputFormat::Csv)?;

    match merge_archive(existing.as_deref(), &response) {
        MergeOutcome::Created(content) => {
            write_gzip_atomic(&path, content.as_bytes())?;
            info!(%stid, path = %path.display(), "Wrote new archive");
            Ok(StationOutcome::Created)
        }
        MergeOutcome::Appended(content) => {
            write_gzip_atomic(&path, content.as_bytes())?;
            info!(%stid, path = %path.display(), "Appended new rows");
            Ok(StationOutcome::Appended)
        }
        MergeOutcome::NoNewData => {
            info!(%stid, "No data in response, skipping update");
            Ok(StationOutcome::Unchanged)
        }
    }
}

/// Last timestamp in an archive, scanning lines from the end.
fn last_timestamp(content: &str) -> Option<NaiveDateTime> {
    content
        .lines()
        .rev()
        .find_map(|line| find_timestamp_token(line).map(|(_, t)| t))
}

/// Merge a timeseries response into an existing archive.
///
/// Responses repeat the banner and header block on every request; for an
/// existing archive that block is cut by locating the first timestamp token
/// and keeping the response from the start of that token's line. The kept
/// tail is appended byte for byte.
///
/// An empty response creates nothing, so a station with no archive yet is
/// retried in full on the next run.
fn merge_archive(existing: Option<&str>, response: &str) -> MergeOutcome {
    let Some(content) = existing else {
        if response.is_empty() {
            return MergeOutcome::NoNewData;
        }
        return MergeOutcome::Created(response.to_string());
    };
    match find_timestamp_token(response) {
        Some((idx, _)) => {
            let cut = response[..idx].rfind('\n').map(|i| i + 1).unwrap_or(0);
            let mut merged = String::with_capacity(content.len() + response.len() - cut);
            merged.push_str(content);
            merged.push_str(&response[cut..]);
            MergeOutcome::Appended(merged)
        }
        None => MergeOutcome::NoNewData,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const RESPONSE: &str = "\
# STATION: ABC\n\
# UNITS: metric\n\
Station_ID,Date_Time,air_temp_set_1\n\
ABC,2020-01-01T00:10:00Z,1.2\n\
ABC,2020-01-01T00:20:00Z,1.3\n\
ABC,2020-01-01T00:30:00Z,1.4\n";

    #[test]
    fn test_last_timestamp_scans_from_end() {
        let archive = "\
Station_ID,Date_Time,air_temp_set_1\n\
ABC,2020-01-01T00:00:00Z,1.0\n\
ABC,2020-01-01T00:10:00Z,1.1\n";
        let t = last_timestamp(archive).unwrap();
        assert_eq!(
            t,
            NaiveDate::from_ymd_opt(2020, 1, 1)
                .unwrap()
                .and_hms_opt(0, 10, 0)
                .unwrap()
        );
    }

    #[test]
    fn test_last_timestamp_skips_trailing_banner() {
        let archive = "ABC,2020-01-01T00:00:00Z,1.0\n# end of file\n";
        assert!(last_timestamp(archive).is_some());
        assert!(last_timestamp("# banner only\n").is_none());
    }

    #[test]
    fn test_merge_creates_full_response() {
        match merge_archive(None, RESPONSE) {
            MergeOutcome::Created(content) => assert_eq!(content, RESPONSE),
            other => panic!("expected Created, got {other:?}"),
        }
    }

    #[test]
    fn test_merge_does_not_create_archive_from_empty_response() {
        assert_eq!(merge_archive(None, ""), MergeOutcome::NoNewData);
    }

    #[test]
    fn test_merge_appends_from_first_data_line() {
        let archive = "header\nABC,2020-01-01T00:00:00Z,1.0\n";
        match merge_archive(Some(archive), RESPONSE) {
            MergeOutcome::Appended(content) => {
                assert!(content.starts_with(archive));
                // The banner and header block is gone, the data rows survive
                assert!(!content[archive.len()..].contains("# STATION"));
                assert!(!content[archive.len()..].contains("Station_ID"));
                assert!(content.ends_with(
                    "ABC,2020-01-01T00:10:00Z,1.2\n\
                     ABC,2020-01-01T00:20:00Z,1.3\n\
                     ABC,2020-01-01T00:30:00Z,1.4\n"
                ));
                // Exactly the three new rows were added
                assert_eq!(content.lines().count(), archive.lines().count() + 3);
            }
            other => panic!("expected Appended, got {other:?}"),
        }
    }

    #[test]
    fn test_merge_without_data_rows_is_noop() {
        let archive = "ABC,2020-01-01T00:00:00Z,1.0\n";
        let empty = "# STATION: ABC\nStation_ID,Date_Time,air_temp_set_1\n";
        assert_eq!(merge_archive(Some(archive), empty), MergeOutcome::NoNewData);
    }

    #[test]
    fn test_metadata_table_path_joins_network_ids() {
        let path = metadata_table_path(
            Path::new("data"),
            &[Mesonet::Snotel, Mesonet::Nwac, Mesonet::Btaval],
        );
        assert_eq!(
            path,
            Path::new("data").join("stn_metadata_MNETIDs_25_37_48.csv")
        );
    }

    #[test]
    fn test_resume_point_is_one_minute_after_tail() {
        let archive = "ABC,2020-06-30T23:59:00Z,4.2\n";
        let resume = last_timestamp(archive)
            .and_then(|t| t.checked_add_signed(chrono::Duration::minutes(1)))
            .unwrap();
        assert_eq!(
            resume,
            NaiveDate::from_ymd_opt(2020, 7, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        );
    }
}

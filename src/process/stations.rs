//! Station metadata loading and selection
//!
//! The metadata table written by the archiver drives everything here:
//! loading it back, filtering stations by network, state, elevation band,
//! and proximity, and reading an individual station archive as a header
//! plus rows frame.

use std::path::{Path, PathBuf};
use tracing::debug;

use super::{ProcessError, ProcessResult};
use crate::store::gz::{open_gzip, read_gzip_string};
use crate::{Mesonet, StationMetadata};

/// Earth radius used for great-circle distances, in kilometers.
const EARTH_RADIUS_KM: f64 = 6373.0;

/// Station selection filter; unset fields do not constrain.
///
/// Proximity needs `lat_lon` plus exactly one of `max_dist_km` and
/// `k_nearest`.
#[derive(Debug, Default, Clone)]
pub struct StationFilter {
    /// Keep stations of this network only
    pub mnet: Option<Mesonet>,
    /// Keep stations in this state only (two-letter code)
    pub state: Option<String>,
    /// Keep stations at or above this elevation, in feet
    pub elevation_min: Option<f64>,
    /// Keep stations at or below this elevation, in feet
    pub elevation_max: Option<f64>,
    /// Origin for proximity selection, decimal degrees
    pub lat_lon: Option<(f64, f64)>,
    /// Keep stations within this distance of the origin, in kilometers
    pub max_dist_km: Option<f64>,
    /// Keep the k stations nearest the origin
    pub k_nearest: Option<usize>,
}

/// Great-circle distance between two `(latitude, longitude)` points in
/// decimal degrees, in kilometers.
pub fn haversine_km(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());
    let half_dlat = (lat2 - lat1) / 2.0;
    let half_dlon = (lon2 - lon1) / 2.0;
    let h = half_dlat.sin().powi(2) + lat1.cos() * lat2.cos() * half_dlon.sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Locate the station metadata table under `data_dir`.
///
/// Exactly one `stn_metadata*` file must exist; none means no update run has
/// happened yet, several means the directory mixes runs with different
/// network sets.
pub fn locate_metadata_table(data_dir: &Path) -> ProcessResult<PathBuf> {
    let entries = std::fs::read_dir(data_dir)
        .map_err(|e| ProcessError::Io(format!("Failed to read {}: {e}", data_dir.display())))?;
    let mut tables = Vec::new();
    for entry in entries {
        let entry =
            entry.map_err(|e| ProcessError::Io(format!("Failed to read directory entry: {e}")))?;
        if entry
            .file_name()
            .to_string_lossy()
            .starts_with("stn_metadata")
        {
            tables.push(entry.path());
        }
    }
    match tables.len() {
        0 => Err(ProcessError::Metadata(format!(
            "no station metadata table under {}",
            data_dir.display()
        ))),
        1 => Ok(tables.remove(0)),
        _ => Err(ProcessError::Metadata(format!(
            "multiple station metadata tables under {}",
            data_dir.display()
        ))),
    }
}

/// Load the station metadata table at `path`.
pub fn load_metadata(path: &Path) -> ProcessResult<Vec<StationMetadata>> {
    let mut reader = csv::Reader::from_reader(open_gzip(path)?);
    let mut stations = Vec::new();
    for row in reader.deserialize() {
        let station: StationMetadata =
            row.map_err(|e| ProcessError::Metadata(format!("{}: {e}", path.display())))?;
        stations.push(station);
    }
    debug!(stations = stations.len(), path = %path.display(), "Loaded station metadata");
    Ok(stations)
}

/// Select station ids from the metadata table under `data_dir`.
///
/// Stations pass the network, state, and elevation filters in table order.
/// With `max_dist_km` the result keeps table order; with `k_nearest` it is
/// ordered nearest first. Stations whose coordinates or elevation do not
/// parse are excluded by the filters that need those numbers.
pub fn select_stations(data_dir: &Path, filter: &StationFilter) -> ProcessResult<Vec<String>> {
    if filter.max_dist_km.is_some() && filter.k_nearest.is_some() {
        return Err(ProcessError::Filter(
            "specify either a distance limit or a station count, not both".to_string(),
        ));
    }
    let proximity = filter.max_dist_km.is_some() || filter.k_nearest.is_some();
    let origin = match (proximity, filter.lat_lon) {
        (true, None) => {
            return Err(ProcessError::Filter(
                "proximity selection needs a latitude and longitude".to_string(),
            ))
        }
        (true, Some(origin)) => Some(origin),
        (false, _) => None,
    };

    let table = locate_metadata_table(data_dir)?;
    let stations = load_metadata(&table)?;
    let mut selected: Vec<StationMetadata> = stations
        .into_iter()
        .filter(|station| passes_base_filters(station, filter))
        .collect();

    if let Some(origin) = origin {
        let mut measured: Vec<(f64, StationMetadata)> = selected
            .into_iter()
            .filter_map(|station| {
                let lat = station.latitude.parse::<f64>().ok()?;
                let lon = station.longitude.parse::<f64>().ok()?;
                Some((haversine_km(origin, (lat, lon)), station))
            })
            .collect();
        if let Some(limit) = filter.max_dist_km {
            measured.retain(|(distance, _)| *distance <= limit);
        }
        if let Some(k) = filter.k_nearest {
            measured.sort_by(|a, b| a.0.total_cmp(&b.0));
            measured.truncate(k);
        }
        selected = measured.into_iter().map(|(_, station)| station).collect();
    }

    Ok(selected.into_iter().map(|station| station.stid).collect())
}

fn passes_base_filters(station: &StationMetadata, filter: &StationFilter) -> bool {
    if let Some(mnet) = filter.mnet {
        if station.mnet_id != mnet.id().to_string() {
            return false;
        }
    }
    if let Some(state) = &filter.state {
        if !station.state.eq_ignore_ascii_case(state) {
            return false;
        }
    }
    if filter.elevation_min.is_some() || filter.elevation_max.is_some() {
        let Ok(elevation) = station.elevation.parse::<f64>() else {
            return false;
        };
        if let Some(min) = filter.elevation_min {
            if elevation < min {
                return false;
            }
        }
        if let Some(max) = filter.elevation_max {
            if elevation > max {
                return false;
            }
        }
    }
    true
}

/// Read a station archive as a `(header, rows)` frame.
///
/// Archives carry the response banner block verbatim: six comment lines,
/// then the column header, then a units line, then the data rows. The banner
/// and units lines are dropped here.
pub fn read_station_frame(path: &Path) -> ProcessResult<(Vec<String>, Vec<Vec<String>>)> {
    let content = read_gzip_string(path)?;
    let data_block = content
        .lines()
        .skip(6)
        .collect::<Vec<_>>()
        .join("\n");
    if data_block.is_empty() {
        return Err(ProcessError::Input(format!(
            "{}: archive too short for a header",
            path.display()
        )));
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(data_block.as_bytes());
    let header: Vec<String> = reader
        .headers()
        .map_err(|e| ProcessError::Input(format!("{}: {e}", path.display())))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record =
            record.map_err(|e| ProcessError::Input(format!("{}: {e}", path.display())))?;
        // the units line sits between the header and the data
        if i == 0 {
            continue;
        }
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok((header, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::gz::{write_csv_gzip_atomic, write_gzip_atomic};
    use tempfile::TempDir;

    fn station(stid: &str, mnet: &str, state: &str, elev: &str, lat: &str, lon: &str) -> StationMetadata {
        StationMetadata {
            stid: stid.to_string(),
            mnet_id: mnet.to_string(),
            name: format!("{stid} site"),
            latitude: lat.to_string(),
            longitude: lon.to_string(),
            elevation: elev.to_string(),
            state: state.to_string(),
            record_start: "1997-01-01T00:00:00Z".to_string(),
            record_end: "2023-01-01T00:00:00Z".to_string(),
        }
    }

    fn write_table(dir: &Path, stations: &[StationMetadata]) {
        write_csv_gzip_atomic(&dir.join("stn_metadata_MNETIDs_25_48.csv"), stations).unwrap();
    }

    fn test_stations() -> Vec<StationMetadata> {
        vec![
            station("PHIL", "25", "WY", "9580", "43.50", "-110.80"),
            station("GRNV", "25", "WY", "8760", "42.90", "-110.50"),
            station("RAIN", "48", "WY", "9360", "43.52", "-110.85"),
            station("CTLK", "25", "ID", "7870", "43.90", "-111.20"),
            station("NOEL", "48", "WY", "n/a", "bad", "-110.00"),
        ]
    }

    #[test]
    fn test_haversine_basics() {
        assert_eq!(haversine_km((43.5, -110.8), (43.5, -110.8)), 0.0);
        // One degree of longitude at the equator
        let d = haversine_km((0.0, 0.0), (0.0, 1.0));
        assert!((d - 111.23).abs() < 0.1, "got {d}");
        let back = haversine_km((0.0, 1.0), (0.0, 0.0));
        assert!((d - back).abs() < 1e-9);
    }

    #[test]
    fn test_select_by_network_and_state() {
        let tmp = TempDir::new().unwrap();
        write_table(tmp.path(), &test_stations());

        let filter = StationFilter {
            mnet: Some(Mesonet::Snotel),
            state: Some("wy".to_string()),
            ..StationFilter::default()
        };
        let stids = select_stations(tmp.path(), &filter).unwrap();
        assert_eq!(stids, vec!["PHIL", "GRNV"]);
    }

    #[test]
    fn test_select_by_elevation_band() {
        let tmp = TempDir::new().unwrap();
        write_table(tmp.path(), &test_stations());

        let filter = StationFilter {
            elevation_min: Some(9000.0),
            elevation_max: Some(9500.0),
            ..StationFilter::default()
        };
        // NOEL's unparseable elevation excludes it from the band
        let stids = select_stations(tmp.path(), &filter).unwrap();
        assert_eq!(stids, vec!["RAIN"]);
    }

    #[test]
    fn test_select_k_nearest_orders_by_distance() {
        let tmp = TempDir::new().unwrap();
        write_table(tmp.path(), &test_stations());

        let filter = StationFilter {
            lat_lon: Some((43.50, -110.80)),
            k_nearest: Some(2),
            ..StationFilter::default()
        };
        let stids = select_stations(tmp.path(), &filter).unwrap();
        assert_eq!(stids, vec!["PHIL", "RAIN"]);
    }

    #[test]
    fn test_select_within_distance_keeps_table_order() {
        let tmp = TempDir::new().unwrap();
        write_table(tmp.path(), &test_stations());

        let filter = StationFilter {
            lat_lon: Some((43.52, -110.85)),
            max_dist_km: Some(10.0),
            ..StationFilter::default()
        };
        let stids = select_stations(tmp.path(), &filter).unwrap();
        assert_eq!(stids, vec!["PHIL", "RAIN"]);
    }

    #[test]
    fn test_select_rejects_inconsistent_filters() {
        let tmp = TempDir::new().unwrap();
        write_table(tmp.path(), &test_stations());

        let both = StationFilter {
            lat_lon: Some((43.5, -110.8)),
            max_dist_km: Some(10.0),
            k_nearest: Some(3),
            ..StationFilter::default()
        };
        assert!(matches!(
            select_stations(tmp.path(), &both),
            Err(ProcessError::Filter(_))
        ));

        let no_origin = StationFilter {
            k_nearest: Some(3),
            ..StationFilter::default()
        };
        assert!(matches!(
            select_stations(tmp.path(), &no_origin),
            Err(ProcessError::Filter(_))
        ));
    }

    #[test]
    fn test_locate_metadata_table_requires_exactly_one() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            locate_metadata_table(tmp.path()),
            Err(ProcessError::Metadata(_))
        ));

        write_table(tmp.path(), &test_stations());
        assert!(locate_metadata_table(tmp.path()).is_ok());

        write_csv_gzip_atomic(
            &tmp.path().join("stn_metadata_MNETIDs_37.csv"),
            &test_stations(),
        )
        .unwrap();
        assert!(matches!(
            locate_metadata_table(tmp.path()),
            Err(ProcessError::Metadata(_))
        ));
    }

    #[test]
    fn test_read_station_frame_skips_banner_and_units() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("PHIL.csv");
        let archive = "\
# STATION: PHIL\n\
# NAME: Phillips Bench\n\
# LATITUDE: 43.50\n\
# LONGITUDE: -110.80\n\
# ELEVATION: 9580\n\
# STATE: WY\n\
Station_ID,Date_Time,air_temp_set_1,snow_depth_set_1\n\
,,Celsius,Millimeters\n\
PHIL,2020-01-01T00:00:00Z,-8.3,1420\n\
PHIL,2020-01-01T01:00:00Z,-8.9,1425\n";
        write_gzip_atomic(&path, archive.as_bytes()).unwrap();

        let (header, rows) = read_station_frame(&path).unwrap();
        assert_eq!(
            header,
            vec!["Station_ID", "Date_Time", "air_temp_set_1", "snow_depth_set_1"]
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][1], "2020-01-01T00:00:00Z");
        assert_eq!(rows[1][3], "1425");
    }
}

//! Integration tests for the raw-store to derived-table pipeline
//!
//! Builds stores shaped like real fetch output, runs the transformers over
//! them, and checks the resulting tables.

use avalanche_data_downloader::process::events::normalize_events;
use avalanche_data_downloader::process::hazards::extract_hazard_ratings;
use avalanche_data_downloader::process::stations::{select_stations, StationFilter};
use avalanche_data_downloader::store::gz::{read_gzip_string, write_csv_gzip_atomic};
use avalanche_data_downloader::store::{Compression, JsonlWriter};
use avalanche_data_downloader::{Mesonet, PageRecord, StationMetadata};
use serde_json::json;
use tempfile::TempDir;

/// A print-template bulletin page with a headline and three rating tables.
/// The third table carries the AM/PM triples the extractor reads.
fn bulletin_page(date: &str, am: [u8; 3], pm: [u8; 3]) -> String {
    let level = |n: u8| match n {
        1 => "LOW",
        2 => "MODERATE",
        3 => "CONSIDERABLE",
        4 => "HIGH",
        _ => "EXTREME",
    };
    let mut bands = String::new();
    for i in 0..3 {
        bands.push_str(&format!(
            "<tr><td>band</td><td>{}</td><td>{}</td></tr>",
            level(am[i]),
            level(pm[i])
        ));
    }
    format!(
        concat!(
            "<html><body>",
            "<div class=\"forecast-headline-box\">",
            "Avalanche forecast for the Teton Area issued {date}",
            "</div>",
            "<table class=\"mtnWeather\"><tr><td>temps</td></tr></table>",
            "<table class=\"mtnWeather\"><tr><td>winds</td></tr></table>",
            "<table class=\"mtnWeather\">{bands}</table>",
            "</body></html>"
        ),
        date = date,
        bands = bands
    )
}

fn page(url: &str, body: String) -> PageRecord {
    PageRecord {
        url: url.to_string(),
        fetched_at: "2021-06-01T12:00:00Z".to_string(),
        status_code: 200,
        body,
    }
}

#[test]
fn test_bulletin_store_to_hazard_table() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("btac_bulletins_teton.json.gz");
    let output = dir.path().join("hazard_ratings.csv");

    // Two real bulletins out of date order plus an empty template page
    let mut writer = JsonlWriter::create(&input, Compression::Gzip).unwrap();
    writer
        .write(&page(
            "http://www.jhavalanche.org/viewTeton?data_date=2020-01-16&template=teton_print.tpl.php",
            bulletin_page("01/16/2020", [2, 3, 2], [3, 3, 2]),
        ))
        .unwrap();
    writer
        .write(&page(
            "http://www.jhavalanche.org/viewTeton?data_date=2020-01-15&template=teton_print.tpl.php",
            bulletin_page("01/15/2020", [1, 2, 1], [2, 2, 1]),
        ))
        .unwrap();
    writer
        .write(&page(
            "http://www.jhavalanche.org/viewTeton?data_date=2020-01-17&template=teton_print.tpl.php",
            "<html>too short</html>".to_string(),
        ))
        .unwrap();
    writer.finish().unwrap();

    let rows = extract_hazard_ratings(&input, &output, 100).unwrap();
    assert_eq!(rows, 4);

    let table = read_gzip_string(&output).unwrap();
    let lines: Vec<&str> = table.lines().collect();
    assert_eq!(lines[0], "date,region,atl,tl,btl");
    // Sorted by period even though the store was out of order
    assert_eq!(lines[1], "2020-01-15 09:00:00,teton,1,2,1");
    assert_eq!(lines[2], "2020-01-15 15:00:00,teton,2,2,1");
    assert_eq!(lines[3], "2020-01-16 09:00:00,teton,2,3,2");
    assert_eq!(lines[4], "2020-01-16 15:00:00,teton,3,3,2");
}

#[test]
fn test_event_store_to_event_table() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("btac_events.json.gz");
    let output = dir.path().join("btac_events.csv");

    let batch = json!({
        "data": [
            {
                "ID": "205",
                "event_date": "2020-02-03",
                "zone": "Teton",
                "elevation": "10250",
                "lat": "43.74",
                "lng": "-110.80",
                "avy_trigger": "natural",
                "fatality": "0",
                "notes": "ran to the valley floor"
            },
            {
                "ID": "206",
                "event_date": "2020-02-04",
                "zone": "Togwotee",
                "elevation": "not surveyed",
                "fatality": serde_json::Value::Null
            }
        ]
    });
    let mut writer = JsonlWriter::create(&input, Compression::Gzip).unwrap();
    writer.write(&batch).unwrap();
    writer.finish().unwrap();

    let events = normalize_events(&input, &output).unwrap();
    assert_eq!(events, 2);

    let table = read_gzip_string(&output).unwrap();
    let lines: Vec<&str> = table.lines().collect();
    assert!(lines[0].starts_with("ID,event_date,event_time,zone,"));
    assert!(lines[1].starts_with("205,2020-02-03,,Teton,"));
    // Unparseable numeric text passes through untouched
    assert!(lines[2].contains("not surveyed"));
}

#[test]
fn test_metadata_table_to_station_selection() {
    let dir = TempDir::new().unwrap();
    let table = dir.path().join("stn_metadata_MNETIDs_25_37.csv");

    let station = |stid: &str, mnet: &str, state: &str, elevation: &str| StationMetadata {
        stid: stid.to_string(),
        mnet_id: mnet.to_string(),
        name: format!("{stid} site"),
        latitude: "43.5".to_string(),
        longitude: "-110.8".to_string(),
        elevation: elevation.to_string(),
        state: state.to_string(),
        record_start: "1997-01-01".to_string(),
        record_end: "2023-01-01".to_string(),
    };
    let stations = vec![
        station("PHIL", "25", "WY", "8700"),
        station("GRNV", "25", "ID", "6200"),
        station("RAIN", "37", "WY", "9300"),
    ];
    write_csv_gzip_atomic(&table, &stations).unwrap();

    let filter = StationFilter {
        mnet: Some(Mesonet::Snotel),
        ..StationFilter::default()
    };
    let stids = select_stations(dir.path(), &filter).unwrap();
    assert_eq!(stids, vec!["PHIL".to_string(), "GRNV".to_string()]);

    let filter = StationFilter {
        state: Some("WY".to_string()),
        elevation_min: Some(9000.0),
        ..StationFilter::default()
    };
    let stids = select_stations(dir.path(), &filter).unwrap();
    assert_eq!(stids, vec!["RAIN".to_string()]);
}

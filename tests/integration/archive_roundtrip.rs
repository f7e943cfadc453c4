//! Integration tests for page stores and archive files
//!
//! Exercises the store layer end to end the way the fetchers and the archiver
//! use it: gzip line-record stores for raw pages, whole-file gzip archives
//! written atomically, and timestamp scanning over archive tails.

use avalanche_data_downloader::store::gz::{read_gzip_string, write_gzip_atomic};
use avalanche_data_downloader::store::{Compression, JsonlReader, JsonlWriter};
use avalanche_data_downloader::{find_timestamp_token, PageRecord};
use tempfile::TempDir;

fn sample_pages(n: usize) -> Vec<PageRecord> {
    (0..n)
        .map(|i| PageRecord {
            url: format!("http://www.jhavalanche.org/viewTeton?data_date=2020-01-{:02}", i + 1),
            fetched_at: format!("2021-06-{:02}T12:00:00Z", i + 1),
            status_code: 200,
            body: format!("<html><body>bulletin {i}</body></html>"),
        })
        .collect()
}

#[test]
fn test_page_store_roundtrip_gzip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("btac_bulletins_teton.json.gz");
    let pages = sample_pages(5);

    let mut writer = JsonlWriter::create(&path, Compression::Gzip).unwrap();
    for page in &pages {
        writer.write(page).unwrap();
    }
    assert_eq!(writer.finish().unwrap(), 5);

    let reader: JsonlReader<PageRecord> = JsonlReader::open(&path, Compression::Gzip).unwrap();
    let read: Vec<PageRecord> = reader.map(|r| r.unwrap()).collect();
    assert_eq!(read, pages);
}

#[test]
fn test_archive_write_and_tail_scan() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("KJAC.csv");

    // Shaped like a mesonet CSV response: banner, header, units, data rows.
    let archive = "\
# STATION: KJAC\n\
Station_ID,Date_Time,air_temp_set_1\n\
,,Celsius\n\
KJAC,2021-02-01T00:00:00Z,-5.0\n\
KJAC,2021-02-01T01:00:00Z,-5.5\n\
KJAC,2021-02-01T02:00:00Z,-6.0\n";
    write_gzip_atomic(&path, archive.as_bytes()).unwrap();

    let content = read_gzip_string(&path).unwrap();
    assert_eq!(content, archive);

    // The archiver resumes from the newest timestamp near the end of the file.
    let (_, last) = content
        .lines()
        .rev()
        .find_map(find_timestamp_token)
        .unwrap();
    assert_eq!(last.to_string(), "2021-02-01 02:00:00");
}

#[test]
fn test_atomic_overwrite_replaces_cleanly() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("archive.csv");

    write_gzip_atomic(&path, b"first version\n").unwrap();
    write_gzip_atomic(&path, b"second version\n").unwrap();

    assert_eq!(read_gzip_string(&path).unwrap(), "second version\n");

    // No temp files left behind next to the target
    let entries: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(entries, vec![std::ffi::OsString::from("archive.csv")]);
}

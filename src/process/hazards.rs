//! Hazard rating extraction from stored bulletin pages
//!
//! Walks a bulletin page store and produces one table row per forecast
//! period: the morning rating triple stamped 09:00, the afternoon triple
//! stamped 15:00, each carrying the elevation-band ratings above, at, and
//! below treeline as numeric danger levels 1 (low) through 5 (extreme).
//!
//! Only the print-template page layout carries its ratings as a parseable
//! table; pages in other layouts draw them as a graphic and are skipped.

use chrono::{NaiveDate, NaiveDateTime};
use std::path::Path;
use tracing::{debug, info, warn};

use super::html::{find_tag_blocks, strip_tags};
use super::ProcessResult;
use crate::store::gz::write_csv_rows_gzip_atomic;
use crate::store::{Compression, JsonlReader};
use crate::PageRecord;

/// Bodies smaller than this hold an empty-page template, not a bulletin.
pub const DEFAULT_BULLETIN_CUTOFF: usize = 15_000;

/// Columns of the hazard rating table
const HAZARD_COLUMNS: [&str; 5] = ["date", "region", "atl", "tl", "btl"];

/// Extract hazard ratings from the bulletin page store at `input` and write
/// them as a gzip CSV table at `output`, sorted by period timestamp.
///
/// Pages whose body is shorter than `cutoff` bytes are treated as empty
/// templates and skipped. Returns the number of table rows written.
pub fn extract_hazard_ratings(input: &Path, output: &Path, cutoff: usize) -> ProcessResult<u64> {
    let reader: JsonlReader<PageRecord> = JsonlReader::open(input, Compression::Gzip)?;
    let mut rows: Vec<(NaiveDateTime, Vec<String>)> = Vec::new();
    let mut pages = 0u64;

    for record in reader {
        let page = record?;
        pages += 1;
        if page.body.len() < cutoff {
            debug!(url = %page.url, bytes = page.body.len(), "Body below cutoff, skipping");
            continue;
        }
        let headline = match find_tag_blocks(&page.body, "div", "forecast-headline-box").first() {
            Some(block) => strip_tags(block),
            None => {
                warn!(url = %page.url, "No forecast headline on page, skipping");
                continue;
            }
        };
        let Some(region) = headline_region(&headline) else {
            warn!(url = %page.url, "No recognizable region in headline, skipping");
            continue;
        };
        let Some(date) = find_mdy_date(&headline) else {
            warn!(url = %page.url, "No issue date in headline, skipping");
            continue;
        };
        if region != "teton" || !page.url.contains("teton_print") {
            warn!(url = %page.url, "Hazard graphic parsing not implemented for this layout, skipping");
            continue;
        }
        match rating_triples(&page.body) {
            Some((am, pm)) => {
                push_period(&mut rows, date, 9, region, am);
                push_period(&mut rows, date, 15, region, pm);
            }
            None => {
                warn!(url = %page.url, "No rating table on page, skipping");
            }
        }
    }

    rows.sort_by_key(|(period, _)| *period);
    let table: Vec<Vec<String>> = rows.into_iter().map(|(_, row)| row).collect();
    write_csv_rows_gzip_atomic(output, &HAZARD_COLUMNS, &table)?;
    let count = table.len() as u64;
    info!(
        pages,
        rows = count,
        path = %output.display(),
        "Wrote hazard rating table"
    );
    Ok(count)
}

/// Region slug from the headline text, if the headline names one.
fn headline_region(headline: &str) -> Option<&'static str> {
    let lower = headline.to_lowercase();
    if lower.contains("teton") {
        Some("teton")
    } else if lower.contains("continental divide") {
        Some("tog")
    } else if lower.contains("grey") {
        Some("grey")
    } else {
        None
    }
}

/// AM and PM rating triples `[atl, tl, btl]` from the third mountain-weather
/// table, whose three rows are the elevation bands and whose second and third
/// cells carry the morning and afternoon ratings.
fn rating_triples(body: &str) -> Option<([u8; 3], [u8; 3])> {
    let tables = find_tag_blocks(body, "table", "mtnWeather");
    let table = tables.get(2)?;
    let bands = find_tag_blocks(table, "tr", "");
    if bands.len() < 3 {
        return None;
    }
    let mut am = [0u8; 3];
    let mut pm = [0u8; 3];
    for (i, band) in bands.iter().take(3).enumerate() {
        let cells = find_tag_blocks(band, "td", "");
        am[i] = cells.get(1).map(|c| hazard_level(&strip_tags(c))).unwrap_or(0);
        pm[i] = cells.get(2).map(|c| hazard_level(&strip_tags(c))).unwrap_or(0);
    }
    Some((am, pm))
}

fn push_period(
    rows: &mut Vec<(NaiveDateTime, Vec<String>)>,
    date: NaiveDate,
    hour: u32,
    region: &str,
    ratings: [u8; 3],
) {
    let Some(period) = date.and_hms_opt(hour, 0, 0) else {
        return;
    };
    let row = vec![
        period.format("%Y-%m-%d %H:%M:%S").to_string(),
        region.to_string(),
        ratings[0].to_string(),
        ratings[1].to_string(),
        ratings[2].to_string(),
    ];
    rows.push((period, row));
}

/// Numeric danger level for a rating cell's text, 0 when unrecognized.
fn hazard_level(text: &str) -> u8 {
    let lower = text.to_lowercase();
    if lower.contains("low") {
        1
    } else if lower.contains("moderate") {
        2
    } else if lower.contains("considerable") {
        3
    } else if lower.contains("high") {
        4
    } else if lower.contains("extreme") {
        5
    } else {
        0
    }
}

/// First `MM/DD/YYYY` date in `text` that is a real calendar date.
fn find_mdy_date(text: &str) -> Option<NaiveDate> {
    const TOKEN_LEN: usize = 10;
    let bytes = text.as_bytes();
    if bytes.len() < TOKEN_LEN {
        return None;
    }
    for start in 0..=bytes.len() - TOKEN_LEN {
        let window = &bytes[start..start + TOKEN_LEN];
        let shaped = window.iter().enumerate().all(|(i, b)| match i {
            2 | 5 => *b == b'/',
            _ => b.is_ascii_digit(),
        });
        if !shaped {
            continue;
        }
        // ASCII window, so the slice is on char boundaries
        if let Ok(date) =
            NaiveDate::parse_from_str(&text[start..start + TOKEN_LEN], "%m/%d/%Y")
        {
            return Some(date);
        }
    }
    None
}

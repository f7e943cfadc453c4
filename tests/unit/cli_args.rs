//! Unit tests for CLI argument parsing

use avalanche_data_downloader::cli::commands::{FetchCommand, ProcessCommand};
use avalanche_data_downloader::cli::{Cli, Commands};
use avalanche_data_downloader::fetcher::avalanche::BulletinArea;
use avalanche_data_downloader::Mesonet;
use clap::Parser;

#[test]
fn test_fetch_stations_defaults() {
    let cli = Cli::parse_from(vec!["avalanche-data-downloader", "fetch", "stations"]);

    let Commands::Fetch(fetch) = &cli.command else {
        panic!("Expected fetch command");
    };
    let FetchCommand::Stations(args) = &fetch.source else {
        panic!("Expected stations source");
    };
    assert_eq!(
        args.networks,
        vec![Mesonet::Snotel, Mesonet::Nwac, Mesonet::Btaval]
    );
    assert!(args.state.is_none());
    assert!(args.start.is_none());
}

#[test]
fn test_fetch_stations_network_list_overrides_default() {
    let cli = Cli::parse_from(vec![
        "avalanche-data-downloader",
        "fetch",
        "stations",
        "--networks",
        "snotel,nwac",
        "--state",
        "WY",
    ]);

    let Commands::Fetch(fetch) = &cli.command else {
        panic!("Expected fetch command");
    };
    let FetchCommand::Stations(args) = &fetch.source else {
        panic!("Expected stations source");
    };
    assert_eq!(args.networks, vec![Mesonet::Snotel, Mesonet::Nwac]);
    assert_eq!(args.state.as_deref(), Some("WY"));
}

#[test]
fn test_fetch_advisories_defaults() {
    let cli = Cli::parse_from(vec!["avalanche-data-downloader", "fetch", "advisories"]);

    let Commands::Fetch(fetch) = &cli.command else {
        panic!("Expected fetch command");
    };
    let FetchCommand::Advisories(args) = &fetch.source else {
        panic!("Expected advisories source");
    };
    assert_eq!(args.area, BulletinArea::Teton);
    assert_eq!(args.start_year, 1999);
    assert!(args.end_year.is_none());
}

#[test]
fn test_fetch_advisories_area_parses_case_insensitively() {
    let cli = Cli::parse_from(vec![
        "avalanche-data-downloader",
        "fetch",
        "advisories",
        "--area",
        "GREY",
        "--start-year",
        "2010",
        "--end-year",
        "2015",
    ]);

    let Commands::Fetch(fetch) = &cli.command else {
        panic!("Expected fetch command");
    };
    let FetchCommand::Advisories(args) = &fetch.source else {
        panic!("Expected advisories source");
    };
    assert_eq!(args.area, BulletinArea::Grey);
    assert_eq!(args.start_year, 2010);
    assert_eq!(args.end_year, Some(2015));
}

#[test]
fn test_fetch_forecasts_default_start_year() {
    let cli = Cli::parse_from(vec!["avalanche-data-downloader", "fetch", "forecasts"]);

    let Commands::Fetch(fetch) = &cli.command else {
        panic!("Expected fetch command");
    };
    let FetchCommand::Forecasts(args) = &fetch.source else {
        panic!("Expected forecasts source");
    };
    assert_eq!(args.start_year, 2005);
}

#[test]
fn test_process_hazards_cutoff_default() {
    let cli = Cli::parse_from(vec!["avalanche-data-downloader", "process", "hazards"]);

    let Commands::Process(process) = &cli.command else {
        panic!("Expected process command");
    };
    let ProcessCommand::Hazards(args) = &process.action else {
        panic!("Expected hazards action");
    };
    assert_eq!(args.cutoff, 15_000);
    assert!(args.input.is_none());
}

#[test]
fn test_process_select_rejects_conflicting_proximity_flags() {
    let result = Cli::try_parse_from(vec![
        "avalanche-data-downloader",
        "process",
        "select",
        "--lat",
        "43.5",
        "--lon",
        "-110.8",
        "--max-dist",
        "25",
        "--k-nearest",
        "3",
    ]);
    assert!(result.is_err());
}

#[test]
fn test_process_select_lat_requires_lon() {
    let result = Cli::try_parse_from(vec![
        "avalanche-data-downloader",
        "process",
        "select",
        "--lat",
        "43.5",
    ]);
    assert!(result.is_err());
}

#[test]
fn test_global_flags_parse_anywhere() {
    let cli = Cli::parse_from(vec![
        "avalanche-data-downloader",
        "fetch",
        "events",
        "--data-dir",
        "/tmp/avy",
        "--token",
        "abc123",
    ]);

    assert_eq!(cli.data_dir.as_deref(), Some(std::path::Path::new("/tmp/avy")));
    assert_eq!(cli.token.as_deref(), Some("abc123"));
}

use anyhow::Result;
use clap::Parser;
use lib_common::ingestors::{
    AdsbExchangeConfig, CelestrakConfig, CelestrakFetcher, Fetcher, MilitaryFetcher, MilitarySource, OpenSkyConfig,
    OpenSkyCredentials, OpenSkyFetcher, UsgsConfig, UsgsFetcher,
};
use lib_common::loggers::{init_logging, LoggerLocalOptions};
use lib_common::models::AircraftPosition;
use std::sync::Arc;
use std::time::Instant;

/// One-shot query of every real upstream, printing what came back.
#[derive(Parser, Debug)]
#[clap(about = "Fetches each live source once and prints record counts")]
struct Args {
    /// Maximum satellite element sets to keep.
    #[clap(long, default_value_t = 500)]
    max_satellites: usize,

    /// Print the first record of each source.
    #[clap(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let _guard = init_logging(&LoggerLocalOptions {
        app_name: "test_live_feeds".to_string(),
        ..Default::default()
    })?;

    let credentials = OpenSkyCredentials {
        client_id: std::env::var("OPENSKY_CLIENT_ID").ok(),
        client_secret: std::env::var("OPENSKY_CLIENT_SECRET").ok(),
        username: std::env::var("OPENSKY_USERNAME").ok(),
        password: std::env::var("OPENSKY_PASSWORD").ok(),
    };
    let opensky = OpenSkyFetcher::new(OpenSkyConfig {
        credentials,
        ..Default::default()
    })?;
    println!("OpenSky auth: {}", opensky.auth_label());

    let started = Instant::now();
    let aircraft = opensky.fetch().await;
    println!("aircraft:    {:>6} in {:?}", aircraft.len(), started.elapsed());
    if args.verbose {
        println!("  {:?}", aircraft.first());
    }

    let primary: Arc<dyn Fetcher<Record = AircraftPosition>> = Arc::new(opensky);
    let military = MilitaryFetcher::new(
        AdsbExchangeConfig {
            api_key: std::env::var("ADSB_API_KEY").ok(),
            ..Default::default()
        },
        primary,
    )?;
    let started = Instant::now();
    let military_aircraft = military.fetch_military(Some(aircraft.as_slice())).await;
    println!(
        "military:    {:>6} in {:?} ({})",
        military_aircraft.len(),
        started.elapsed(),
        if military.uses_api() { "ADS-B Exchange" } else { "prefix filter" }
    );

    let celestrak = CelestrakFetcher::new(CelestrakConfig {
        max_satellites: args.max_satellites,
        ..Default::default()
    })?;
    let started = Instant::now();
    let tles = celestrak.fetch().await;
    println!("satellites:  {:>6} in {:?}", tles.len(), started.elapsed());
    if args.verbose {
        println!("  {:?}", tles.first());
    }

    let usgs = UsgsFetcher::new(UsgsConfig::default())?;
    let started = Instant::now();
    let quakes = usgs.fetch().await;
    println!("earthquakes: {:>6} in {:?}", quakes.len(), started.elapsed());
    if args.verbose {
        println!("  {:?}", quakes.first());
    }

    Ok(())
}

use anyhow::{Context, Result};
use lib_common::core::{BroadcastLoop, Sources, SubscriberRegistry};
use lib_common::ingestors::{CelestrakFetcher, Fetcher, MilitaryFetcher, OpenSkyFetcher, UsgsFetcher};
use lib_common::loggers::{init_logging, LoggerLocalOptions};
use lib_common::models::AircraftPosition;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod orbital_logic;
use orbital_logic::{config, downstream, state::AppState};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = config::load_config();
    config.validate().context("invalid configuration")?;

    let _log_guard = init_logging(&LoggerLocalOptions {
        app_name: "server_orbital".to_string(),
        log_dir: config.log_dir.clone(),
        level: config.log_level(),
        keep_files: 1,
    })?;

    // --- Sources ---
    let aircraft: Arc<dyn Fetcher<Record = AircraftPosition>> =
        Arc::new(OpenSkyFetcher::new(config.to_opensky_config()?)?);
    let sources = Sources {
        military: Arc::new(MilitaryFetcher::new(config.to_adsb_config(), Arc::clone(&aircraft))?),
        aircraft,
        satellites: Arc::new(CelestrakFetcher::new(config.to_celestrak_config())?),
        earthquakes: Arc::new(UsgsFetcher::new(config.to_usgs_config())?),
    };

    let registry = Arc::new(SubscriberRegistry::default());
    let broadcast_loop = BroadcastLoop::new(sources, Arc::clone(&registry), config.polling_interval());
    let app_state = AppState::new(registry, broadcast_loop.interval().as_secs());

    // --- Tasks ---
    let shutdown = CancellationToken::new();

    let loop_handle = {
        let token = shutdown.clone();
        tokio::spawn(async move { broadcast_loop.run(token).await })
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port()));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    let server_handle = tokio::spawn(downstream::run(listener, app_state, shutdown.clone()));

    shutdown_signal().await;
    info!("Shutdown signal received, stopping.");
    shutdown.cancel();

    let (loop_result, server_result) = tokio::join!(loop_handle, server_handle);
    if let Err(e) = loop_result {
        error!("Broadcast loop task failed: {}", e);
    }
    match server_result {
        Ok(Err(e)) => error!("Downstream server failed: {}", e),
        Err(e) => error!("Downstream server task failed: {}", e),
        Ok(Ok(())) => {}
    }

    info!("Shutdown complete.");
    Ok(())
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    // Handler for CTRL+C
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    // Handler for SIGTERM (on UNIX systems)
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    // On non-UNIX systems, `terminate` is a future that never completes.
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

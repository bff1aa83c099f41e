//! feedgate server binary.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use feedgate::admin::setup_admin_router;
use feedgate::config::{load_config, FeedgateConfig};
use feedgate::engine::EngineBuilder;
use feedgate::health::HealthMonitor;
use feedgate::http::{AppState, HttpServer, ReqwestTransport};
use feedgate::lifecycle::{wait_for_signal, Shutdown};
use feedgate::observability::{logging, metrics};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "feedgate", version, about = "Resilient multi-provider data gateway")]
struct Args {
    /// Path to the TOML configuration file. Defaults apply when absent.
    #[arg(short, long, env = "FEEDGATE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => FeedgateConfig::default(),
    };

    logging::init(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "feedgate starting");
    tracing::info!(
        config = ?args.config,
        providers = config.providers.len(),
        pools = config.pools.len(),
        bind_address = %config.server.bind_address,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let transport = Arc::new(ReqwestTransport::from_config(&config.proxy)?);
    let engine = Arc::new(EngineBuilder::from_config(&config, transport)?.build()?);
    let state = AppState::new(engine.clone(), config.admin.api_key.as_str());

    let mut shutdown = Shutdown::new();

    let monitor = HealthMonitor::new(engine.clone(), &config.health_check);
    shutdown.track("health_monitor", tokio::spawn(monitor.run(shutdown.subscribe())));

    let sweeper = engine.cache().clone().run_sweeper(
        Duration::from_secs(config.cache.sweep_interval_secs),
        shutdown.subscribe(),
    );
    shutdown.track("cache_sweeper", tokio::spawn(sweeper));

    if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %listener.local_addr()?, "Admin API listening");
        let router = setup_admin_router(state.clone());
        let mut rx = shutdown.subscribe();
        shutdown.track(
            "admin_api",
            tokio::spawn(async move {
                let served = axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        let _ = rx.recv().await;
                    })
                    .await;
                if let Err(e) = served {
                    tracing::error!(error = %e, "Admin API server failed");
                }
            }),
        );
    }

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    let server = HttpServer::new(
        state,
        Duration::from_secs(config.server.request_timeout_secs),
    );
    let mut server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    let server_exited = tokio::select! {
        _ = wait_for_signal() => false,
        result = &mut server_task => {
            match result {
                Ok(Ok(())) => tracing::warn!("HTTP server exited unexpectedly"),
                Ok(Err(e)) => tracing::error!(error = %e, "HTTP server failed"),
                Err(e) => tracing::error!(error = %e, "HTTP server task panicked"),
            }
            true
        }
    };

    if !server_exited {
        shutdown.track(
            "http_server",
            tokio::spawn(async move {
                if let Ok(Err(e)) = server_task.await {
                    tracing::error!(error = %e, "HTTP server failed during shutdown");
                }
            }),
        );
    }
    let finished = shutdown.drain(SHUTDOWN_GRACE).await;
    tracing::info!(tasks_stopped = finished, "Shutdown complete");
    Ok(())
}

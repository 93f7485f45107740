use session_relay::api;
use session_relay::config::{Config, LogFormat, LoggingConfig};
use session_relay::lifecycle;
use session_relay::relay::RoomRegistry;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    init_tracing(&config.logging);

    let bind_address = config.bind_address();
    tracing::info!(
        %bind_address,
        persistent_store = config.database.url.is_some(),
        "Starting live-session relay"
    );

    let store = lifecycle::open_store(&config.database).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to open live-session store");
        e
    })?;
    let registry = RoomRegistry::new();

    let routes = api::routes(registry, store, config.signaling.clone());

    let (addr, server) =
        warp::serve(routes).try_bind_with_graceful_shutdown(bind_address, shutdown_signal())?;
    tracing::info!(%addr, "Listening");

    server.await;
    tracing::info!("Server shut down");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("session_relay=info,warp=info"));

    let registry = tracing_subscriber::registry().with(filter);
    match logging.format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections");
}

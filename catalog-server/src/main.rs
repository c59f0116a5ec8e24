//! catalog-server binary
//!
//! Loads configuration, connects to PostgreSQL, builds the image store and
//! serves the catalog API until Ctrl-C or SIGTERM.

use catalog_server::{AppState, Config, create_router, logger};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Load .env file
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;

    let _log_guard = logger::init_logger_with_file(
        &config.log_level,
        config.log_format,
        config.log_dir.as_deref(),
    );

    tracing::info!("Starting catalog-server (env: {})", config.environment);

    let state = AppState::from_config(&config).await?;
    let app = create_router(state.clone());

    let http_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&http_addr).await?;
    tracing::info!("catalog-server HTTP listening on {http_addr}");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // Close the pool whether or not the server exited cleanly
    state.close().await;
    tracing::info!("catalog-server stopped");

    served?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {e}");
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

    tracing::info!("Shutdown signal received");
}

#[cfg(feature = "server")]
#[derive(clap::Parser, Debug)]
#[command(name = "monograph", version, about = "Monograph workflow server")]
struct Cli {
    /// Configuration file (TOML). Defaults to ./monograph.toml when present.
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Override `server.bind_addr`.
    #[arg(short, long)]
    bind: Option<String>,
}

#[cfg(feature = "server")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use anyhow::Context;
    use clap::Parser;
    use monograph::app::{router, AppState};
    use monograph::config::{AppConfig, StorageBackend};

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.as_str().into()),
        )
        .init();

    tracing::info!("Starting monograph server...");

    let state = match config.storage.backend {
        StorageBackend::Mongo => {
            let db = monograph::db::mongo::connect(
                &config.storage.mongodb_uri,
                &config.storage.mongodb_database,
            )
            .await
            .context("Failed to connect to MongoDB")?;
            monograph::db::mongo::ensure_indexes(&db)
                .await
                .context("Failed to create MongoDB indexes")?;

            tracing::info!(
                "Connected to MongoDB at {} (database '{}')",
                config.storage.mongodb_uri,
                config.storage.mongodb_database
            );
            AppState::mongo(&db, config.workflow.clone())
        }
        StorageBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on shutdown");
            AppState::in_memory(config.workflow.clone())
        }
    };

    let app = router(state);

    let addr = cli.bind.unwrap_or(config.server.bind_addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

#[cfg(feature = "server")]
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

// Library-only builds have no server entry point.
#[cfg(not(feature = "server"))]
fn main() {}

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info, warn};

use shopkeeper as app;

#[derive(Parser)]
#[command(name = "shopkeeper", about = "Customer management web service", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Apply pending database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = app::config::load_config().context("loading configuration")?;
    app::config::init_tracing(cfg.log_level(), cfg.log_json);

    let db_pool = app::db::establish_connection_from_app_config(&cfg)
        .await
        .context("connecting to the database")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Migrate => {
            app::db::run_migrations(&db_pool).await?;
            app::db::close_pool(db_pool).await?;
            Ok(())
        }
        Command::Serve => serve(cfg, db_pool).await,
    }
}

async fn serve(
    cfg: app::config::AppConfig,
    db_pool: app::db::DbPool,
) -> anyhow::Result<()> {
    if cfg.auto_migrate {
        app::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }

    app::handlers::health::init_start_time();

    let db_arc = Arc::new(db_pool);
    let app_state = app::AppState::new(db_arc.clone(), cfg.clone());

    // Expired sessions are only ever skipped on read; sweep them periodically
    let sessions = app_state.services.sessions.clone();
    let cleanup_every = Duration::from_secs(cfg.session_cleanup_interval_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(cleanup_every);
        loop {
            ticker.tick().await;
            if let Err(e) = sessions.purge_expired().await {
                warn!("Session cleanup failed: {}", e);
            }
        }
    });

    let app = app::app_router(app_state);

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", cfg.host, cfg.port))?;
    info!("shopkeeper listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped; closing database pool");
    if let Ok(pool) = Arc::try_unwrap(db_arc) {
        app::db::close_pool(pool).await?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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
}

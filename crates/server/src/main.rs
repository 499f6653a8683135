mod api;
mod bootstrap;
mod health;
mod sessions;
mod shelf;

use std::time::Duration;

use anyhow::Result;
use shelfmate_core::config::{AppConfig, LoadOptions};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(config: &AppConfig) {
    use shelfmate_core::config::LogFormat::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    let router = api::router(app.state.clone())
        .merge(health::router(app.db_pool.clone(), app.state.sessions.clone()));

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = stop_rx.await;
            })
            .await
    });

    info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "shelfmate-server listening"
    );

    let shutdown_requested = tokio::select! {
        finished = &mut server => {
            finished??;
            false
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            true
        }
    };

    if shutdown_requested {
        info!(
            event_name = "system.server.stopping",
            correlation_id = "shutdown",
            "shelfmate-server stopping"
        );
        let _ = stop_tx.send(());
        let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
        match tokio::time::timeout(grace, server).await {
            Ok(finished) => finished??,
            Err(_) => warn!(
                event_name = "system.server.shutdown_timeout",
                correlation_id = "shutdown",
                grace_secs = grace.as_secs(),
                "in-flight requests did not finish before the grace period"
            ),
        }
    } else {
        warn!(
            event_name = "system.server.exited",
            correlation_id = "runtime",
            "server stopped without a shutdown signal"
        );
    }

    app.db_pool.close().await;
    Ok(())
}

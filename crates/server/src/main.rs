mod bootstrap;
mod chat;
mod health;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;

use rolodex_core::config::{AppConfig, LoadOptions};
use rolodex_telegram::{ReconnectPolicy, UpdateRunner};

use crate::chat::CrmChatService;

fn init_logging(config: &AppConfig) {
    use rolodex_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.db_pool.clone(),
    )
    .await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_handle = {
        let scheduler = app.scheduler.clone();
        tokio::spawn(async move { scheduler.run(shutdown_rx).await })
    };

    let chat_service = Arc::new(CrmChatService::new(
        app.orchestrator.clone(),
        app.store.clone(),
        app.messenger.clone(),
    ));
    let runner =
        UpdateRunner::new(app.update_source.clone(), chat_service, ReconnectPolicy::default());
    let runner_handle = tokio::spawn(async move { runner.start().await });

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        "rolodex-server started"
    );
    wait_for_shutdown().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "rolodex-server stopping"
    );

    let _ = shutdown_tx.send(true);
    let _ = scheduler_handle.await;
    runner_handle.abort();

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use rolodex_agent::conversation::SessionStore;
use rolodex_agent::llm::GeminiClient;
use rolodex_agent::tools::ToolRegistry;
use rolodex_agent::Orchestrator;
use rolodex_core::config::{AppConfig, ConfigError, LoadOptions};
use rolodex_core::messaging::Messenger;
use rolodex_db::store::{CrmStore, SqlCrmStore};
use rolodex_db::{connect, migrations, DbPool};
use rolodex_scheduler::ReminderScheduler;
use rolodex_telegram::{HttpMessenger, HttpUpdateSource, UpdateSource};

/// Everything the process needs, constructed once and passed explicitly;
/// there are no module-level clients.
pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub store: Arc<dyn CrmStore>,
    pub orchestrator: Arc<Orchestrator>,
    pub scheduler: Arc<ReminderScheduler>,
    pub messenger: Arc<dyn Messenger>,
    pub update_source: Arc<dyn UpdateSource>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("llm client initialization failed: {0}")]
    Llm(String),
    #[error("telegram transport initialization failed: {0}")]
    Transport(String),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let store: Arc<dyn CrmStore> = Arc::new(SqlCrmStore::new(db_pool.clone()));
    let registry = Arc::new(ToolRegistry::builtin(store.clone()));
    let llm = Arc::new(
        GeminiClient::new(&config.llm).map_err(|error| BootstrapError::Llm(error.to_string()))?,
    );
    let sessions = Arc::new(SessionStore::default());
    let orchestrator = Arc::new(Orchestrator::new(llm, registry, sessions));

    let messenger: Arc<dyn Messenger> = Arc::new(
        HttpMessenger::new(&config.telegram)
            .map_err(|error| BootstrapError::Transport(error.to_string()))?,
    );
    let update_source: Arc<dyn UpdateSource> = Arc::new(
        HttpUpdateSource::new(&config.telegram)
            .map_err(|error| BootstrapError::Transport(error.to_string()))?,
    );

    let scheduler = Arc::new(ReminderScheduler::new(
        store.clone(),
        messenger.clone(),
        Duration::from_secs(config.scheduler.poll_interval_secs),
    ));

    Ok(Application { config, db_pool, store, orchestrator, scheduler, messenger, update_source })
}

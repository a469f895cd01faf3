use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use thiserror::Error;
use tracing::info;

use threadline_agent::{
    AgentRuntime, GeminiChatModel, GeminiEmbedder, LlmError, SessionStore, ToolSettings, Toolbox,
};
use threadline_core::config::{AppConfig, ConfigError};
use threadline_db::{connect_with_settings, migrations, DbPool, SqlCatalogRepository};
use threadline_whatsapp::{GatewayError, MessageSender, TwilioClient};

use crate::{health, webhook};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub agent_runtime: Arc<AgentRuntime>,
    pub sender: Arc<dyn MessageSender>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("model client setup failed: {0}")]
    Model(#[source] LlmError),
    #[error("whatsapp gateway setup failed: {0}")]
    Gateway(#[source] GatewayError),
}

impl Application {
    /// `/whatsapp` webhook plus `/health` on one listener.
    pub fn router(&self) -> Router {
        let state = webhook::WebhookState {
            runtime: self.agent_runtime.clone(),
            sender: self.sender.clone(),
            fallback_reply: Arc::from(self.config.agent.fallback_reply.as_str()),
        };
        webhook::router(state).merge(health::router(self.db_pool.clone()))
    }
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
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

    let repository = Arc::new(SqlCatalogRepository::new(db_pool.clone()));
    let embedder =
        Arc::new(GeminiEmbedder::from_config(&config.llm).map_err(BootstrapError::Model)?);
    let model = Arc::new(GeminiChatModel::from_config(&config.llm).map_err(BootstrapError::Model)?);
    let toolbox = Toolbox::new(
        repository.clone(),
        repository,
        embedder,
        ToolSettings::from(&config.agent),
    );
    let sessions = Arc::new(SessionStore::new(Duration::from_secs(config.agent.session_ttl_secs)));
    let agent_runtime = Arc::new(AgentRuntime::new(model, toolbox, sessions, &config.agent));

    let sender: Arc<dyn MessageSender> =
        Arc::new(TwilioClient::from_config(&config.gateway).map_err(BootstrapError::Gateway)?);
    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        model = %config.llm.model,
        max_tool_iterations = config.agent.max_tool_iterations,
        "agent runtime and gateway client ready"
    );

    Ok(Application { config, db_pool, agent_runtime, sender })
}

use std::sync::Arc;

use telassist_agent::{Orchestrator, SupportServices};
use telassist_core::config::{AppConfig, ConfigError};
use telassist_core::errors::ApplicationError;
use telassist_db::repositories::{
    SqlAccountRepository, SqlKnowledgeRepository, SqlNetworkStatusRepository,
};
use telassist_db::{connect_with_settings, migrations, DbPool};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub orchestrator: Arc<Orchestrator>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("routing setup failed: {0}")]
    Routing(#[source] ApplicationError),
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

    let services = SupportServices {
        accounts: Arc::new(SqlAccountRepository::new(db_pool.clone())),
        network: Arc::new(SqlNetworkStatusRepository::new(db_pool.clone())),
        knowledge: Arc::new(SqlKnowledgeRepository::new(db_pool.clone())),
    };
    let orchestrator =
        Orchestrator::from_config(&config, services).map_err(BootstrapError::Routing)?;
    info!(
        event_name = "system.bootstrap.router_ready",
        correlation_id = "bootstrap",
        llm_provider = config.llm.provider.as_str(),
        model_classification = config.router.model_classification,
        "query router assembled"
    );

    Ok(Application { config, db_pool, orchestrator: Arc::new(orchestrator) })
}

#[cfg(test)]
mod tests {
    use telassist_core::config::{AppConfig, ConfigOverrides, LoadOptions};
    use telassist_core::{Category, Role, SessionId};

    use crate::bootstrap::{bootstrap_with_config, Application, BootstrapError};

    async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
        bootstrap_with_config(AppConfig::load(options)?).await
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_on_non_sqlite_database_url() {
        let result = bootstrap(overrides("postgres://localhost/telassist")).await;

        assert!(result.is_err());
        let message = result.err().map(|error| error.to_string()).unwrap_or_default();
        assert!(message.contains("database.url"), "unexpected error: {message}");
    }

    #[tokio::test]
    async fn bootstrap_applies_schema_and_answers_through_the_router() {
        let app = bootstrap(overrides("sqlite::memory:"))
            .await
            .expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' \
             AND name IN ('service_plans', 'customers', 'network_status', 'knowledge_passages')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("support tables should exist after bootstrap");
        assert_eq!(table_count, 4);

        let response =
            app.orchestrator.submit_query("", SessionId::new("boot"), Role::Customer).await;
        assert_eq!(response.category, Category::Fallback);
        assert!(!response.text.is_empty());

        app.db_pool.close().await;
    }

    fn overrides(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }
}

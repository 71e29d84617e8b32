use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use telassist_agent::Orchestrator;
use telassist_db::{connection::ping, DbPool};

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    orchestrator: Arc<Orchestrator>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub active_sessions: usize,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool, orchestrator: Arc<Orchestrator>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool, orchestrator })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let ready = database.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "telassist-server query router initialized".to_string(),
        },
        database,
        active_sessions: state.orchestrator.active_sessions(),
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match ping(pool).await {
        Ok(()) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{extract::State, http::StatusCode, Json};
    use telassist_agent::{Orchestrator, SupportServices};
    use telassist_core::config::AppConfig;
    use telassist_db::connect_with_settings;
    use telassist_db::repositories::{
        InMemoryAccountRepository, InMemoryKnowledgeRepository, InMemoryNetworkStatusRepository,
    };

    use crate::health::{health, HealthState};

    fn orchestrator() -> Arc<Orchestrator> {
        let services = SupportServices {
            accounts: Arc::new(InMemoryAccountRepository::default()),
            network: Arc::new(InMemoryNetworkStatusRepository::default()),
            knowledge: Arc::new(InMemoryKnowledgeRepository::default()),
        };
        Arc::new(
            Orchestrator::from_config(&AppConfig::default(), services)
                .expect("default config should assemble"),
        )
    }

    #[tokio::test]
    async fn health_returns_ready_when_database_is_reachable() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");

        let (status, Json(payload)) =
            health(State(HealthState { db_pool: pool.clone(), orchestrator: orchestrator() }))
                .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.database.status, "ready");
        assert_eq!(payload.service.status, "ready");
        assert_eq!(payload.active_sessions, 0);

        pool.close().await;
    }

    #[tokio::test]
    async fn health_returns_service_unavailable_when_database_is_unavailable() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");
        pool.close().await;

        let (status, Json(payload)) =
            health(State(HealthState { db_pool: pool, orchestrator: orchestrator() })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.database.status, "degraded");
        assert_eq!(payload.service.status, "ready");
    }
}

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use telassist_agent::Orchestrator;
use telassist_core::{ApplicationError, CustomerId, InterfaceError, Query, Role, SessionId};
use tracing::{info, warn};

#[derive(Clone)]
pub struct ApiState {
    orchestrator: Arc<Orchestrator>,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub text: String,
    pub session_id: String,
    pub role: Role,
    #[serde(default)]
    pub customer_id: Option<String>,
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub text: String,
    pub category: String,
    pub query_id: String,
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub message: String,
    pub correlation_id: String,
}

type ApiFailure = (StatusCode, Json<ApiError>);

pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/v1/query", post(submit_query))
        .route("/v1/sessions/{session_id}", delete(end_session))
        .with_state(ApiState { orchestrator })
}

async fn submit_query(
    State(state): State<ApiState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiFailure> {
    let mut query = Query::new(request.text, SessionId::new(request.session_id), request.role);
    if let Some(customer_id) = request.customer_id.filter(|id| !id.trim().is_empty()) {
        query = query.with_customer(CustomerId::new(customer_id));
    }
    let query_id = query.id.to_string();

    if query.session_id.0.trim().is_empty() {
        return Err(reject(InterfaceError::BadRequest {
            message: "session_id must not be empty".to_string(),
            correlation_id: query_id,
        }));
    }
    if let Err(error) = state.orchestrator.validate_text(&query.text) {
        return Err(reject(ApplicationError::from(error).into_interface(query_id)));
    }

    info!(
        event_name = "server.query.accepted",
        correlation_id = %query_id,
        session_id = %query.session_id,
        role = query.role.as_str(),
        "query accepted"
    );

    let outcome = state.orchestrator.submit(query).await;
    Ok(Json(QueryResponse {
        text: outcome.response.text,
        category: outcome.response.category.label().to_string(),
        query_id: outcome.query_id.to_string(),
    }))
}

async fn end_session(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiFailure> {
    if state.orchestrator.end_session(&SessionId::new(session_id.clone())) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(reject(InterfaceError::NotFound {
            message: format!("session `{session_id}` is not active"),
            correlation_id: session_id,
        }))
    }
}

fn reject(error: InterfaceError) -> ApiFailure {
    let status = match &error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(
        event_name = "server.request.rejected",
        correlation_id = %error.correlation_id(),
        status = status.as_u16(),
        error = %error,
        "request rejected"
    );

    (
        status,
        Json(ApiError {
            error: error.to_string(),
            message: error.user_message().to_string(),
            correlation_id: error.correlation_id().to_string(),
        }),
    )
}

use std::sync::Arc;

use serde::Serialize;
use telassist_agent::{Orchestrator, SupportServices};
use telassist_core::{CustomerId, Query, Role, SessionId};
use telassist_db::repositories::{
    SqlAccountRepository, SqlKnowledgeRepository, SqlNetworkStatusRepository,
};

use crate::commands::{open_database, prepare, CommandResult, StepError};

pub const DEFAULT_SESSION: &str = "cli";

#[derive(Debug, Clone)]
pub struct AskRequest {
    pub text: String,
    pub session_id: String,
    pub role: Role,
    pub customer_id: Option<String>,
}

impl AskRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            session_id: DEFAULT_SESSION.to_string(),
            role: Role::Customer,
            customer_id: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct AskOutput {
    command: &'static str,
    status: &'static str,
    query_id: String,
    session_id: String,
    category: &'static str,
    handler: Option<&'static str>,
    final_state: &'static str,
    fallback: bool,
    text: String,
}

/// Answers one query against the configured database, the same way the
/// server would.
pub fn run(request: AskRequest) -> CommandResult {
    let (config, runtime) = match prepare("ask") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let services = SupportServices {
            accounts: Arc::new(SqlAccountRepository::new(pool.clone())),
            network: Arc::new(SqlNetworkStatusRepository::new(pool.clone())),
            knowledge: Arc::new(SqlKnowledgeRepository::new(pool.clone())),
        };

        let answered = async {
            let orchestrator = Orchestrator::from_config(&config, services)
                .map_err(|error| ("routing_setup", error.to_string(), 7u8))?;
            orchestrator
                .validate_text(&request.text)
                .map_err(|error| ("query_validation", error.to_string(), 8u8))?;

            let mut query = Query::new(
                request.text.clone(),
                SessionId::new(request.session_id.clone()),
                request.role,
            );
            if let Some(customer_id) = &request.customer_id {
                query = query.with_customer(CustomerId::new(customer_id.clone()));
            }

            let outcome = orchestrator.submit(query).await;
            Ok::<AskOutput, StepError>(AskOutput {
                command: "ask",
                status: "ok",
                query_id: outcome.query_id.0.clone(),
                session_id: outcome.session_id.0.clone(),
                category: outcome.response.category.label(),
                handler: outcome.handler,
                final_state: outcome.final_state.as_str(),
                fallback: outcome.used_fallback(),
                text: outcome.response.text,
            })
        }
        .await;

        pool.close().await;
        answered
    });

    match result {
        Ok(output) => {
            let human = format!("[{}] {}", output.category, output.text);
            match serde_json::to_string(&output) {
                Ok(machine) => CommandResult { exit_code: 0, output: format!("{human}\n{machine}") },
                Err(error) => CommandResult::failure("ask", "serialization", error.to_string(), 1),
            }
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("ask", error_class, message, exit_code)
        }
    }
}

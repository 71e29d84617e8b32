use std::time::Instant;

use std::sync::Arc;

use crate::commands::CommandResult;
use serde::Serialize;
use telassist_agent::{Orchestrator, SupportServices};
use telassist_core::config::{AppConfig, LlmProvider, LoadOptions};
use telassist_core::{Category, PipelineState, Query, Role, SessionId};
use telassist_db::repositories::{
    SqlAccountRepository, SqlKnowledgeRepository, SqlNetworkStatusRepository,
};
use telassist_db::{connect_with_settings, migrations, DbPool};
use tokio::runtime::Runtime;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum SmokeStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: SmokeStatus,
    elapsed_ms: u64,
    message: String,
}

#[derive(Debug, Serialize)]
struct SmokeReport {
    command: &'static str,
    status: SmokeStatus,
    summary: String,
    total_elapsed_ms: u64,
    checks: Vec<SmokeCheck>,
}

pub fn run() -> CommandResult {
    let started = Instant::now();
    let mut checks = Vec::new();

    let config = match timed_check(|| AppConfig::load(LoadOptions::default())) {
        Ok((elapsed_ms, config)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Pass,
                elapsed_ms,
                message: "configuration loaded and validated".to_string(),
            });
            config
        }
        Err((elapsed_ms, error)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Fail,
                elapsed_ms,
                message: error.to_string(),
            });
            checks.push(skipped("llm_readiness"));
            checks.push(skipped("db_connectivity"));
            checks.push(skipped("migration_visibility"));
            checks.push(skipped("routing_roundtrip"));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    checks.push(llm_readiness(&config));

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            checks.push(SmokeCheck {
                name: "db_connectivity",
                status: SmokeStatus::Fail,
                elapsed_ms: 0,
                message: format!("failed to initialize async runtime: {error}"),
            });
            checks.push(skipped("migration_visibility"));
            checks.push(skipped("routing_roundtrip"));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    let db_started = Instant::now();
    let db_result = runtime.block_on(async {
        connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
    });

    let pool = match db_result {
        Ok(pool) => {
            checks.push(SmokeCheck {
                name: "db_connectivity",
                status: SmokeStatus::Pass,
                elapsed_ms: db_started.elapsed().as_millis() as u64,
                message: format!("connected using `{}`", config.database.url),
            });
            pool
        }
        Err(error) => {
            checks.push(SmokeCheck {
                name: "db_connectivity",
                status: SmokeStatus::Fail,
                elapsed_ms: db_started.elapsed().as_millis() as u64,
                message: format!("failed to connect: {error}"),
            });
            checks.push(skipped("migration_visibility"));
            checks.push(skipped("routing_roundtrip"));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    let migration_started = Instant::now();
    let migration_result = runtime.block_on(async { migrations::run_pending(&pool).await });
    let migrated = migration_result.is_ok();
    checks.push(match migration_result {
        Ok(()) => SmokeCheck {
            name: "migration_visibility",
            status: SmokeStatus::Pass,
            elapsed_ms: migration_started.elapsed().as_millis() as u64,
            message: "migrations are visible and executable".to_string(),
        },
        Err(error) => SmokeCheck {
            name: "migration_visibility",
            status: SmokeStatus::Fail,
            elapsed_ms: migration_started.elapsed().as_millis() as u64,
            message: format!("migration execution failed: {error}"),
        },
    });

    checks.push(if migrated {
        routing_roundtrip(&runtime, &config, &pool)
    } else {
        skipped("routing_roundtrip")
    });

    runtime.block_on(async {
        pool.close().await;
    });

    finalize_report(checks, started.elapsed().as_millis() as u64)
}

fn llm_readiness(config: &AppConfig) -> SmokeCheck {
    let started = Instant::now();
    let (status, message) = match config.llm.provider {
        LlmProvider::Disabled => {
            (SmokeStatus::Skipped, "model disabled, keyword routing only".to_string())
        }
        provider => match config.llm.effective_base_url() {
            Some(base_url) => (
                SmokeStatus::Pass,
                format!("{} model `{}` at {base_url}", provider.as_str(), config.llm.model),
            ),
            None => (
                SmokeStatus::Fail,
                format!("{} provider has no base url", provider.as_str()),
            ),
        },
    };
    SmokeCheck {
        name: "llm_readiness",
        status,
        elapsed_ms: started.elapsed().as_millis() as u64,
        message,
    }
}

/// Sends a blank query through the full pipeline. Needs no model and no
/// seeded rows, so it isolates routing wiring from data problems.
fn routing_roundtrip(runtime: &Runtime, config: &AppConfig, pool: &DbPool) -> SmokeCheck {
    let started = Instant::now();
    let services = SupportServices {
        accounts: Arc::new(SqlAccountRepository::new(pool.clone())),
        network: Arc::new(SqlNetworkStatusRepository::new(pool.clone())),
        knowledge: Arc::new(SqlKnowledgeRepository::new(pool.clone())),
    };

    let result = Orchestrator::from_config(config, services)
        .map_err(|error| format!("routing setup failed: {error}"))
        .map(|orchestrator| {
            runtime.block_on(orchestrator.submit(Query::new(
                "",
                SessionId::new("smoke"),
                Role::Admin,
            )))
        });

    let (status, message) = match result {
        Ok(outcome)
            if outcome.final_state == PipelineState::Delivered
                && outcome.response.category == Category::Fallback
                && !outcome.response.text.is_empty() =>
        {
            (SmokeStatus::Pass, "blank query delivered the fallback answer".to_string())
        }
        Ok(outcome) => (
            SmokeStatus::Fail,
            format!(
                "unexpected outcome: state {} category {}",
                outcome.final_state.as_str(),
                outcome.response.category
            ),
        ),
        Err(message) => (SmokeStatus::Fail, message),
    };

    SmokeCheck {
        name: "routing_roundtrip",
        status,
        elapsed_ms: started.elapsed().as_millis() as u64,
        message,
    }
}

fn timed_check<T, E>(check: impl FnOnce() -> Result<T, E>) -> Result<(u64, T), (u64, E)> {
    let started = Instant::now();
    match check() {
        Ok(value) => Ok((started.elapsed().as_millis() as u64, value)),
        Err(error) => Err((started.elapsed().as_millis() as u64, error)),
    }
}

fn skipped(name: &'static str) -> SmokeCheck {
    SmokeCheck {
        name,
        status: SmokeStatus::Skipped,
        elapsed_ms: 0,
        message: "skipped due previous failure".to_string(),
    }
}

fn finalize_report(checks: Vec<SmokeCheck>, total_elapsed_ms: u64) -> CommandResult {
    let passed = checks.iter().filter(|check| check.status == SmokeStatus::Pass).count();
    let total = checks.len();
    let failed = checks.iter().any(|check| check.status == SmokeStatus::Fail);

    let report = SmokeReport {
        command: "smoke",
        status: if failed { SmokeStatus::Fail } else { SmokeStatus::Pass },
        summary: format!("smoke: {passed}/{total} checks passed in {total_elapsed_ms}ms"),
        total_elapsed_ms,
        checks,
    };

    let human = report.summary.clone();
    let machine = serde_json::to_string(&report).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"smoke\",\"status\":\"fail\",\"summary\":\"serialization failed\",\"error\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    });

    CommandResult { exit_code: if failed { 6 } else { 0 }, output: format!("{human}\n{machine}") }
}

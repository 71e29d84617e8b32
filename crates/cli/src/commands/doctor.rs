use std::sync::Arc;

use secrecy::ExposeSecret;
use serde::Serialize;
use telassist_agent::{HandlerRegistry, SupportServices};
use telassist_core::config::{AppConfig, LlmProvider, LoadOptions};
use telassist_db::repositories::{
    InMemoryAccountRepository, InMemoryKnowledgeRepository, InMemoryNetworkStatusRepository,
};
use telassist_db::connect_with_settings;
use telassist_db::connection::ping;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_llm_readiness(&config));
            checks.push(check_database_connectivity(&config));
            checks.push(check_routing_registry(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["llm_readiness", "database_connectivity", "routing_registry"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_llm_readiness(config: &AppConfig) -> DoctorCheck {
    let llm = &config.llm;
    let (status, details) = match llm.provider {
        LlmProvider::Disabled => {
            (CheckStatus::Pass, "model disabled, classification uses keyword rules only".to_string())
        }
        LlmProvider::OpenAi
            if llm.api_key.as_ref().map_or(true, |key| key.expose_secret().trim().is_empty()) =>
        {
            (CheckStatus::Fail, "openai provider requires llm.api_key".to_string())
        }
        provider => (
            CheckStatus::Pass,
            format!(
                "{} model `{}` at {}",
                provider.as_str(),
                llm.model,
                llm.effective_base_url().unwrap_or_else(|| "<unset>".to_string())
            ),
        ),
    };
    DoctorCheck { name: "llm_readiness", status, details }
}

/// Builds the standard registry over empty stores so wiring problems show up
/// without touching the database.
fn check_routing_registry(config: &AppConfig) -> DoctorCheck {
    let services = SupportServices {
        accounts: Arc::new(InMemoryAccountRepository::default()),
        network: Arc::new(InMemoryNetworkStatusRepository::default()),
        knowledge: Arc::new(InMemoryKnowledgeRepository::default()),
    };
    match HandlerRegistry::for_support(&services, &config.router, None) {
        Ok(_) => DoctorCheck {
            name: "routing_registry",
            status: CheckStatus::Pass,
            details: "every category has a handler".to_string(),
        },
        Err(error) => DoctorCheck {
            name: "routing_registry",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn check_database_connectivity(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| format!("failed to connect to database: {error}"))?;

        let probe = ping(&pool).await.map_err(|error| format!("database did not answer: {error}"));
        pool.close().await;
        probe
    });

    match result {
        Ok(()) => DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`", config.database.url),
        },
        Err(error) => {
            DoctorCheck { name: "database_connectivity", status: CheckStatus::Fail, details: error }
        }
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;
    use telassist_core::config::{AppConfig, LlmProvider};

    use super::{check_llm_readiness, check_routing_registry, render_human, CheckStatus};
    use super::{DoctorCheck, DoctorReport};

    #[test]
    fn disabled_model_is_ready_and_openai_needs_a_key() {
        let mut config = AppConfig::default();
        assert_eq!(check_llm_readiness(&config).status, CheckStatus::Pass);

        config.llm.provider = LlmProvider::OpenAi;
        assert_eq!(check_llm_readiness(&config).status, CheckStatus::Fail);

        config.llm.api_key = Some(SecretString::from("sk-test".to_string()));
        let check = check_llm_readiness(&config);
        assert_eq!(check.status, CheckStatus::Pass);
        assert!(check.details.contains("https://api.openai.com/v1"));
    }

    #[test]
    fn standard_registry_covers_every_category() {
        assert_eq!(check_routing_registry(&AppConfig::default()).status, CheckStatus::Pass);
    }

    #[test]
    fn human_report_marks_each_check() {
        let report = DoctorReport {
            overall_status: CheckStatus::Fail,
            summary: "doctor: one or more readiness checks failed".to_string(),
            checks: vec![
                DoctorCheck {
                    name: "config_validation",
                    status: CheckStatus::Pass,
                    details: "ok".to_string(),
                },
                DoctorCheck {
                    name: "database_connectivity",
                    status: CheckStatus::Skipped,
                    details: "later".to_string(),
                },
            ],
        };

        assert_eq!(
            render_human(&report),
            "doctor: one or more readiness checks failed\n- [ok] config_validation: ok\n- [skip] database_connectivity: later"
        );
    }
}

use std::env;
use std::fs;
use std::path::Path;

use secrecy::ExposeSecret;
use telassist_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_key) in effective_values(&config) {
        let source =
            field_source(key, Some(env_key), config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key, &value, source));
    }

    lines.join("\n")
}

fn effective_values(config: &AppConfig) -> Vec<(&'static str, String, &'static str)> {
    let llm_api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| redact_secret(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());

    vec![
        ("database.url", config.database.url.clone(), "TELASSIST_DATABASE_URL"),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            "TELASSIST_DATABASE_MAX_CONNECTIONS",
        ),
        (
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            "TELASSIST_DATABASE_TIMEOUT_SECS",
        ),
        ("llm.provider", config.llm.provider.as_str().to_string(), "TELASSIST_LLM_PROVIDER"),
        ("llm.model", config.llm.model.clone(), "TELASSIST_LLM_MODEL"),
        (
            "llm.base_url",
            config.llm.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
            "TELASSIST_LLM_BASE_URL",
        ),
        ("llm.api_key", llm_api_key, "TELASSIST_LLM_API_KEY"),
        ("llm.timeout_secs", config.llm.timeout_secs.to_string(), "TELASSIST_LLM_TIMEOUT_SECS"),
        ("llm.max_retries", config.llm.max_retries.to_string(), "TELASSIST_LLM_MAX_RETRIES"),
        (
            "router.max_response_chars",
            config.router.max_response_chars.to_string(),
            "TELASSIST_ROUTER_MAX_RESPONSE_CHARS",
        ),
        (
            "router.max_query_chars",
            config.router.max_query_chars.to_string(),
            "TELASSIST_ROUTER_MAX_QUERY_CHARS",
        ),
        (
            "router.fallback_message",
            config.router.fallback_message.clone(),
            "TELASSIST_ROUTER_FALLBACK_MESSAGE",
        ),
        (
            "router.handler_timeout_secs",
            config.router.handler_timeout_secs.to_string(),
            "TELASSIST_ROUTER_HANDLER_TIMEOUT_SECS",
        ),
        (
            "router.history_limit",
            config.router.history_limit.to_string(),
            "TELASSIST_ROUTER_HISTORY_LIMIT",
        ),
        (
            "router.model_classification",
            config.router.model_classification.to_string(),
            "TELASSIST_ROUTER_MODEL_CLASSIFICATION",
        ),
        (
            "router.passage_limit",
            config.router.passage_limit.to_string(),
            "TELASSIST_ROUTER_PASSAGE_LIMIT",
        ),
        (
            "router.max_sessions",
            config.router.max_sessions.to_string(),
            "TELASSIST_ROUTER_MAX_SESSIONS",
        ),
        (
            "router.session_idle_secs",
            config.router.session_idle_secs.to_string(),
            "TELASSIST_ROUTER_SESSION_IDLE_SECS",
        ),
        ("server.bind_address", config.server.bind_address.clone(), "TELASSIST_SERVER_BIND_ADDRESS"),
        ("server.port", config.server.port.to_string(), "TELASSIST_SERVER_PORT"),
        ("logging.level", config.logging.level.clone(), "TELASSIST_LOGGING_LEVEL"),
        ("logging.format", format!("{:?}", config.logging.format), "TELASSIST_LOGGING_FORMAT"),
    ]
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILES: [&str; 2] = ["telassist.toml", "config/telassist.toml"];
pub const MIN_RESPONSE_CHARS: usize = 32;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub router: RouterConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        !matches!(self.provider, LlmProvider::Disabled)
    }

    /// Base URL of the chat-completions API, falling back to the provider's
    /// well-known endpoint.
    pub fn effective_base_url(&self) -> Option<String> {
        if let Some(url) = self.base_url.as_deref().filter(|url| !url.trim().is_empty()) {
            return Some(url.trim_end_matches('/').to_string());
        }
        match self.provider {
            LlmProvider::OpenAi => Some("https://api.openai.com/v1".to_string()),
            LlmProvider::Ollama => Some("http://localhost:11434/v1".to_string()),
            LlmProvider::Disabled => None,
        }
    }
}

/// Routing and response-shaping knobs.
#[derive(Clone, Debug)]
pub struct RouterConfig {
    pub max_response_chars: usize,
    pub max_query_chars: usize,
    /// Delivered whenever a handler fails, panics or times out.
    pub fallback_message: String,
    pub empty_input_message: String,
    pub unrecognized_message: String,
    pub handler_timeout_secs: u64,
    /// Turns kept per session; zero keeps the whole history.
    pub history_limit: usize,
    pub model_classification: bool,
    pub passage_limit: usize,
    /// Live sessions kept in memory; the least recently used idle one is
    /// evicted beyond this.
    pub max_sessions: usize,
    /// Sessions untouched for this long are dropped; zero disables expiry.
    pub session_idle_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
    Disabled,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
            Self::Disabled => "disabled",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub max_response_chars: Option<usize>,
    pub handler_timeout_secs: Option<u64>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_response_chars: 2_000,
            max_query_chars: 4_000,
            fallback_message: "I'm sorry, I couldn't complete that request right now. Please try again, or ask about billing, network issues, service plans, or technical support.".to_string(),
            empty_input_message: "It looks like you didn't ask anything. Please type your question about billing, network, service plans, or technical support.".to_string(),
            unrecognized_message: "I'm sorry, I couldn't understand your request. Please ask about billing, network issues, service plans, or technical support.".to_string(),
            handler_timeout_secs: 30,
            history_limit: 20,
            model_classification: true,
            passage_limit: 3,
            max_sessions: 10_000,
            session_idle_secs: 1_800,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://telassist.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::Disabled,
                api_key: None,
                base_url: None,
                model: "gpt-4o-mini".to_string(),
                timeout_secs: 30,
                max_retries: 2,
            },
            router: RouterConfig::default(),
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            "disabled" | "none" | "off" => Ok(Self::Disabled),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|ollama|disabled)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(router) = patch.router {
            if let Some(value) = router.max_response_chars {
                self.router.max_response_chars = value;
            }
            if let Some(value) = router.max_query_chars {
                self.router.max_query_chars = value;
            }
            if let Some(value) = router.fallback_message {
                self.router.fallback_message = value;
            }
            if let Some(value) = router.empty_input_message {
                self.router.empty_input_message = value;
            }
            if let Some(value) = router.unrecognized_message {
                self.router.unrecognized_message = value;
            }
            if let Some(value) = router.handler_timeout_secs {
                self.router.handler_timeout_secs = value;
            }
            if let Some(value) = router.history_limit {
                self.router.history_limit = value;
            }
            if let Some(value) = router.model_classification {
                self.router.model_classification = value;
            }
            if let Some(value) = router.passage_limit {
                self.router.passage_limit = value;
            }
            if let Some(value) = router.max_sessions {
                self.router.max_sessions = value;
            }
            if let Some(value) = router.session_idle_secs {
                self.router.session_idle_secs = value;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("TELASSIST_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("TELASSIST_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_env("TELASSIST_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("TELASSIST_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_env("TELASSIST_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TELASSIST_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("TELASSIST_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("TELASSIST_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("TELASSIST_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("TELASSIST_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_env("TELASSIST_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("TELASSIST_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_env("TELASSIST_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("TELASSIST_ROUTER_MAX_RESPONSE_CHARS") {
            self.router.max_response_chars =
                parse_env("TELASSIST_ROUTER_MAX_RESPONSE_CHARS", &value)?;
        }
        if let Some(value) = read_env("TELASSIST_ROUTER_MAX_QUERY_CHARS") {
            self.router.max_query_chars = parse_env("TELASSIST_ROUTER_MAX_QUERY_CHARS", &value)?;
        }
        if let Some(value) = read_env("TELASSIST_ROUTER_FALLBACK_MESSAGE") {
            self.router.fallback_message = value;
        }
        if let Some(value) = read_env("TELASSIST_ROUTER_HANDLER_TIMEOUT_SECS") {
            self.router.handler_timeout_secs =
                parse_env("TELASSIST_ROUTER_HANDLER_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("TELASSIST_ROUTER_HISTORY_LIMIT") {
            self.router.history_limit = parse_env("TELASSIST_ROUTER_HISTORY_LIMIT", &value)?;
        }
        if let Some(value) = read_env("TELASSIST_ROUTER_MODEL_CLASSIFICATION") {
            self.router.model_classification =
                parse_env("TELASSIST_ROUTER_MODEL_CLASSIFICATION", &value)?;
        }
        if let Some(value) = read_env("TELASSIST_ROUTER_PASSAGE_LIMIT") {
            self.router.passage_limit = parse_env("TELASSIST_ROUTER_PASSAGE_LIMIT", &value)?;
        }
        if let Some(value) = read_env("TELASSIST_ROUTER_MAX_SESSIONS") {
            self.router.max_sessions = parse_env("TELASSIST_ROUTER_MAX_SESSIONS", &value)?;
        }
        if let Some(value) = read_env("TELASSIST_ROUTER_SESSION_IDLE_SECS") {
            self.router.session_idle_secs =
                parse_env("TELASSIST_ROUTER_SESSION_IDLE_SECS", &value)?;
        }

        if let Some(value) = read_env("TELASSIST_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("TELASSIST_SERVER_PORT") {
            self.server.port = parse_env("TELASSIST_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("TELASSIST_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_env("TELASSIST_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("TELASSIST_LOGGING_LEVEL").or_else(|| read_env("TELASSIST_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("TELASSIST_LOGGING_FORMAT").or_else(|| read_env("TELASSIST_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(max_response_chars) = overrides.max_response_chars {
            self.router.max_response_chars = max_response_chars;
        }
        if let Some(handler_timeout_secs) = overrides.handler_timeout_secs {
            self.router.handler_timeout_secs = handler_timeout_secs;
        }
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_router(&self.router)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// The config file `load` would read, if any.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    DEFAULT_CONFIG_FILES.into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if let Some(base_url) = llm.base_url.as_deref().filter(|url| !url.trim().is_empty()) {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    match llm.provider {
        LlmProvider::OpenAi => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for the openai provider".to_string(),
                ));
            }
        }
        LlmProvider::Ollama | LlmProvider::Disabled => {}
    }

    if llm.is_enabled() && llm.model.trim().is_empty() {
        return Err(ConfigError::Validation(
            "llm.model must be set when an llm provider is enabled".to_string(),
        ));
    }

    Ok(())
}

fn validate_router(router: &RouterConfig) -> Result<(), ConfigError> {
    if router.max_response_chars < MIN_RESPONSE_CHARS {
        return Err(ConfigError::Validation(format!(
            "router.max_response_chars must be at least {MIN_RESPONSE_CHARS}"
        )));
    }

    if router.max_query_chars == 0 {
        return Err(ConfigError::Validation(
            "router.max_query_chars must be greater than zero".to_string(),
        ));
    }

    for (key, message) in [
        ("router.fallback_message", &router.fallback_message),
        ("router.empty_input_message", &router.empty_input_message),
        ("router.unrecognized_message", &router.unrecognized_message),
    ] {
        if message.trim().is_empty() {
            return Err(ConfigError::Validation(format!("{key} must not be empty")));
        }
        if message.chars().count() > router.max_response_chars {
            return Err(ConfigError::Validation(format!(
                "{key} must fit within router.max_response_chars"
            )));
        }
    }

    if router.handler_timeout_secs == 0 || router.handler_timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "router.handler_timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    if router.passage_limit == 0 {
        return Err(ConfigError::Validation(
            "router.passage_limit must be greater than zero".to_string(),
        ));
    }

    if router.max_sessions == 0 {
        return Err(ConfigError::Validation(
            "router.max_sessions must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    router: Option<RouterPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct RouterPatch {
    max_response_chars: Option<usize>,
    max_query_chars: Option<usize>,
    fallback_message: Option<String>,
    empty_input_message: Option<String>,
    unrecognized_message: Option<String>,
    handler_timeout_secs: Option<u64>,
    history_limit: Option<usize>,
    model_classification: Option<bool>,
    passage_limit: Option<usize>,
    max_sessions: Option<usize>,
    session_idle_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_are_valid_and_keep_model_disabled() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.llm.provider == LlmProvider::Disabled, "llm should default to disabled")?;
        ensure(!config.llm.is_enabled(), "disabled provider is not enabled")?;
        ensure(config.router.max_response_chars == 2_000, "default max response chars")?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_TELASSIST_OPENAI_KEY", "sk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("telassist.toml");
            fs::write(
                &path,
                r#"
[llm]
provider = "openai"
api_key = "${TEST_TELASSIST_OPENAI_KEY}"
model = "gpt-4o-mini"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.llm.provider == LlmProvider::OpenAi, "provider should come from file")?;
            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret().to_string())
                    == Some("sk-from-env".to_string()),
                "api key should be interpolated from environment",
            )?;
            ensure(
                config.llm.effective_base_url().as_deref() == Some("https://api.openai.com/v1"),
                "openai should default to the public endpoint",
            )
        })();

        clear_vars(&["TEST_TELASSIST_OPENAI_KEY"]);
        result
    }

    #[test]
    fn missing_interpolation_variable_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("telassist.toml");
        fs::write(&path, "[llm]\napi_key = \"${TELASSIST_TEST_UNSET_VARIABLE}\"\n")
            .map_err(|err| err.to_string())?;

        let error = AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
            .err()
            .ok_or_else(|| "expected interpolation failure".to_string())?;
        ensure(
            matches!(error, ConfigError::MissingEnvInterpolation { ref var } if var == "TELASSIST_TEST_UNSET_VARIABLE"),
            "error should name the missing variable",
        )
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TELASSIST_LOG_LEVEL", "warn");
        env::set_var("TELASSIST_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )
        })();

        clear_vars(&["TELASSIST_LOG_LEVEL", "TELASSIST_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TELASSIST_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("TELASSIST_ROUTER_HISTORY_LIMIT", "7");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("telassist.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[router]
history_limit = 3
max_response_chars = 500
fallback_message = "Please try again shortly."

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.router.history_limit == 7, "env history limit should win over file")?;
            ensure(config.router.max_response_chars == 500, "file value should win over default")?;
            ensure(
                config.router.fallback_message == "Please try again shortly.",
                "fallback message should come from file",
            )
        })();

        clear_vars(&["TELASSIST_DATABASE_URL", "TELASSIST_ROUTER_HISTORY_LIMIT"]);
        result
    }

    #[test]
    fn invalid_numeric_env_override_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TELASSIST_ROUTER_HANDLER_TIMEOUT_SECS", "soon");
        let result = (|| -> Result<(), String> {
            let error = AppConfig::load(LoadOptions::default())
                .err()
                .ok_or_else(|| "expected env override failure".to_string())?;
            ensure(
                matches!(error, ConfigError::InvalidEnvOverride { ref key, .. } if key == "TELASSIST_ROUTER_HANDLER_TIMEOUT_SECS"),
                "error should name the offending variable",
            )
        })();

        clear_vars(&["TELASSIST_ROUTER_HANDLER_TIMEOUT_SECS"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let tiny = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides { max_response_chars: Some(8), ..ConfigOverrides::default() },
            ..LoadOptions::default()
        });
        ensure(
            matches!(tiny, Err(ConfigError::Validation(ref message)) if message.contains("router.max_response_chars")),
            "tiny response limit should be rejected",
        )?;

        let keyless = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                llm_provider: Some(LlmProvider::OpenAi),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });
        ensure(
            matches!(keyless, Err(ConfigError::Validation(ref message)) if message.contains("llm.api_key")),
            "openai without api key should be rejected",
        )
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TELASSIST_LLM_PROVIDER", "openai");
        env::set_var("TELASSIST_LLM_API_KEY", "sk-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")
        })();

        clear_vars(&["TELASSIST_LLM_PROVIDER", "TELASSIST_LLM_API_KEY"]);
        result
    }

    #[test]
    fn required_file_must_exist() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let missing = dir.path().join("absent.toml");
        let result = AppConfig::load(LoadOptions {
            config_path: Some(missing),
            require_file: true,
            ..LoadOptions::default()
        });
        ensure(
            matches!(result, Err(ConfigError::MissingConfigFile(_))),
            "missing required file should be reported",
        )
    }
}

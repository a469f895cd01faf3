use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub gateway: GatewayConfig,
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

/// Twilio WhatsApp credentials and sender identity.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub account_sid: String,
    pub auth_token: SecretString,
    pub from_number: String,
    pub api_base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub embedding_model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub max_tool_iterations: u32,
    pub session_ttl_secs: u64,
    pub session_sweep_secs: u64,
    pub search_match_threshold: f32,
    pub search_match_count: u32,
    pub inventory_limit: u32,
    pub fallback_reply: String,
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
    Gemini,
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
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub llm_model: Option<String>,
    pub gateway_account_sid: Option<String>,
    pub gateway_auth_token: Option<String>,
    pub gateway_from_number: Option<String>,
    pub gateway_api_base_url: Option<String>,
    pub max_tool_iterations: Option<u32>,
    pub server_port: Option<u16>,
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

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://threadline.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            gateway: GatewayConfig {
                account_sid: String::new(),
                auth_token: String::new().into(),
                from_number: String::new(),
                api_base_url: "https://api.twilio.com".to_string(),
                timeout_secs: 15,
            },
            llm: LlmConfig {
                provider: LlmProvider::Gemini,
                api_key: None,
                base_url: "https://generativelanguage.googleapis.com".to_string(),
                model: "gemini-1.5-flash".to_string(),
                embedding_model: "text-embedding-004".to_string(),
                timeout_secs: 60,
                max_retries: 2,
            },
            agent: AgentConfig {
                max_tool_iterations: 8,
                session_ttl_secs: 3_600,
                session_sweep_secs: 60,
                search_match_threshold: 0.3,
                search_match_count: 5,
                inventory_limit: 10,
                fallback_reply:
                    "Sorry, I could not complete that request. Please try again in a moment."
                        .to_string(),
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 5000,
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
            "gemini" => Ok(Self::Gemini),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected gemini)"
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("threadline.toml"));
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

        if let Some(gateway) = patch.gateway {
            if let Some(account_sid) = gateway.account_sid {
                self.gateway.account_sid = account_sid;
            }
            if let Some(auth_token) = gateway.auth_token {
                self.gateway.auth_token = secret_value(auth_token);
            }
            if let Some(from_number) = gateway.from_number {
                self.gateway.from_number = from_number;
            }
            if let Some(api_base_url) = gateway.api_base_url {
                self.gateway.api_base_url = api_base_url;
            }
            if let Some(timeout_secs) = gateway.timeout_secs {
                self.gateway.timeout_secs = timeout_secs;
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
                self.llm.base_url = base_url;
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(embedding_model) = llm.embedding_model {
                self.llm.embedding_model = embedding_model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(max_tool_iterations) = agent.max_tool_iterations {
                self.agent.max_tool_iterations = max_tool_iterations;
            }
            if let Some(session_ttl_secs) = agent.session_ttl_secs {
                self.agent.session_ttl_secs = session_ttl_secs;
            }
            if let Some(session_sweep_secs) = agent.session_sweep_secs {
                self.agent.session_sweep_secs = session_sweep_secs;
            }
            if let Some(search_match_threshold) = agent.search_match_threshold {
                self.agent.search_match_threshold = search_match_threshold;
            }
            if let Some(search_match_count) = agent.search_match_count {
                self.agent.search_match_count = search_match_count;
            }
            if let Some(inventory_limit) = agent.inventory_limit {
                self.agent.inventory_limit = inventory_limit;
            }
            if let Some(fallback_reply) = agent.fallback_reply {
                self.agent.fallback_reply = fallback_reply;
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
        if let Some(value) = read_env("THREADLINE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("THREADLINE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("THREADLINE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("THREADLINE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("THREADLINE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        let account_sid =
            read_env("THREADLINE_GATEWAY_ACCOUNT_SID").or_else(|| read_env("TWILIO_ACCOUNT_SID"));
        if let Some(value) = account_sid {
            self.gateway.account_sid = value;
        }
        let auth_token =
            read_env("THREADLINE_GATEWAY_AUTH_TOKEN").or_else(|| read_env("TWILIO_AUTH_TOKEN"));
        if let Some(value) = auth_token {
            self.gateway.auth_token = secret_value(value);
        }
        let from_number =
            read_env("THREADLINE_GATEWAY_FROM_NUMBER").or_else(|| read_env("TWILIO_PHONE_NUMBER"));
        if let Some(value) = from_number {
            self.gateway.from_number = value;
        }
        if let Some(value) = read_env("THREADLINE_GATEWAY_API_BASE_URL") {
            self.gateway.api_base_url = value;
        }
        if let Some(value) = read_env("THREADLINE_GATEWAY_TIMEOUT_SECS") {
            self.gateway.timeout_secs = parse_u64("THREADLINE_GATEWAY_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("THREADLINE_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        let api_key = read_env("THREADLINE_LLM_API_KEY").or_else(|| read_env("GEMINI_API_KEY"));
        if let Some(value) = api_key {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("THREADLINE_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("THREADLINE_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("THREADLINE_LLM_EMBEDDING_MODEL") {
            self.llm.embedding_model = value;
        }
        if let Some(value) = read_env("THREADLINE_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("THREADLINE_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("THREADLINE_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("THREADLINE_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("THREADLINE_AGENT_MAX_TOOL_ITERATIONS") {
            self.agent.max_tool_iterations =
                parse_u32("THREADLINE_AGENT_MAX_TOOL_ITERATIONS", &value)?;
        }
        if let Some(value) = read_env("THREADLINE_AGENT_SESSION_TTL_SECS") {
            self.agent.session_ttl_secs = parse_u64("THREADLINE_AGENT_SESSION_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("THREADLINE_AGENT_SESSION_SWEEP_SECS") {
            self.agent.session_sweep_secs =
                parse_u64("THREADLINE_AGENT_SESSION_SWEEP_SECS", &value)?;
        }
        if let Some(value) = read_env("THREADLINE_AGENT_SEARCH_MATCH_THRESHOLD") {
            self.agent.search_match_threshold =
                parse_f32("THREADLINE_AGENT_SEARCH_MATCH_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("THREADLINE_AGENT_SEARCH_MATCH_COUNT") {
            self.agent.search_match_count =
                parse_u32("THREADLINE_AGENT_SEARCH_MATCH_COUNT", &value)?;
        }
        if let Some(value) = read_env("THREADLINE_AGENT_INVENTORY_LIMIT") {
            self.agent.inventory_limit = parse_u32("THREADLINE_AGENT_INVENTORY_LIMIT", &value)?;
        }
        if let Some(value) = read_env("THREADLINE_AGENT_FALLBACK_REPLY") {
            self.agent.fallback_reply = value;
        }

        if let Some(value) = read_env("THREADLINE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("THREADLINE_SERVER_PORT") {
            self.server.port = parse_u16("THREADLINE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("THREADLINE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("THREADLINE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("THREADLINE_LOGGING_LEVEL").or_else(|| read_env("THREADLINE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("THREADLINE_LOGGING_FORMAT").or_else(|| read_env("THREADLINE_LOG_FORMAT"));
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
        if let Some(api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(api_key));
        }
        if let Some(base_url) = overrides.llm_base_url {
            self.llm.base_url = base_url;
        }
        if let Some(model) = overrides.llm_model {
            self.llm.model = model;
        }
        if let Some(account_sid) = overrides.gateway_account_sid {
            self.gateway.account_sid = account_sid;
        }
        if let Some(auth_token) = overrides.gateway_auth_token {
            self.gateway.auth_token = secret_value(auth_token);
        }
        if let Some(from_number) = overrides.gateway_from_number {
            self.gateway.from_number = from_number;
        }
        if let Some(api_base_url) = overrides.gateway_api_base_url {
            self.gateway.api_base_url = api_base_url;
        }
        if let Some(max_tool_iterations) = overrides.max_tool_iterations {
            self.agent.max_tool_iterations = max_tool_iterations;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_gateway(&self.gateway)?;
        validate_llm(&self.llm)?;
        validate_agent(&self.agent)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("threadline.toml"), PathBuf::from("config/threadline.toml")]
        .into_iter()
        .find(|path| path.exists())
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

fn validate_gateway(gateway: &GatewayConfig) -> Result<(), ConfigError> {
    let account_sid = gateway.account_sid.trim();
    if account_sid.is_empty() {
        return Err(ConfigError::Validation(
            "gateway.account_sid is required. Find it in the Twilio console under Account Info (set THREADLINE_GATEWAY_ACCOUNT_SID or TWILIO_ACCOUNT_SID)"
                .to_string(),
        ));
    }
    if !account_sid.starts_with("AC") {
        return Err(ConfigError::Validation(
            "gateway.account_sid must start with `AC`".to_string(),
        ));
    }

    if gateway.auth_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "gateway.auth_token is required (set THREADLINE_GATEWAY_AUTH_TOKEN or TWILIO_AUTH_TOKEN)"
                .to_string(),
        ));
    }

    let from_number = gateway.from_number.trim();
    let digits = from_number.strip_prefix("whatsapp:").unwrap_or(from_number);
    if !digits.starts_with('+') || digits.len() < 8 {
        return Err(ConfigError::Validation(
            "gateway.from_number must be an E.164 number such as `whatsapp:+14155238886`"
                .to_string(),
        ));
    }

    validate_http_url("gateway.api_base_url", &gateway.api_base_url)?;

    if gateway.timeout_secs == 0 || gateway.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "gateway.timeout_secs must be in range 1..=300".to_string(),
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

    match llm.provider {
        LlmProvider::Gemini => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for the gemini provider (set THREADLINE_LLM_API_KEY or GEMINI_API_KEY)"
                        .to_string(),
                ));
            }
        }
    }

    validate_http_url("llm.base_url", &llm.base_url)?;

    if llm.model.trim().is_empty() || llm.embedding_model.trim().is_empty() {
        return Err(ConfigError::Validation(
            "llm.model and llm.embedding_model must not be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.max_tool_iterations == 0 || agent.max_tool_iterations > 50 {
        return Err(ConfigError::Validation(
            "agent.max_tool_iterations must be in range 1..=50".to_string(),
        ));
    }

    if agent.session_ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "agent.session_ttl_secs must be greater than zero".to_string(),
        ));
    }

    if agent.session_sweep_secs == 0 {
        return Err(ConfigError::Validation(
            "agent.session_sweep_secs must be greater than zero".to_string(),
        ));
    }

    if !(-1.0..=1.0).contains(&agent.search_match_threshold) {
        return Err(ConfigError::Validation(
            "agent.search_match_threshold must be in range -1.0..=1.0".to_string(),
        ));
    }

    if agent.search_match_count == 0 || agent.inventory_limit == 0 {
        return Err(ConfigError::Validation(
            "agent.search_match_count and agent.inventory_limit must be greater than zero"
                .to_string(),
        ));
    }

    if agent.fallback_reply.trim().is_empty() {
        return Err(ConfigError::Validation(
            "agent.fallback_reply must not be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
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

fn validate_http_url(key: &str, value: &str) -> Result<(), ConfigError> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(ConfigError::Validation(format!("{key} must start with http:// or https://")));
    }
    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f32(key: &str, value: &str) -> Result<f32, ConfigError> {
    value.parse::<f32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    gateway: Option<GatewayPatch>,
    llm: Option<LlmPatch>,
    agent: Option<AgentPatch>,
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
struct GatewayPatch {
    account_sid: Option<String>,
    auth_token: Option<String>,
    from_number: Option<String>,
    api_base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    embedding_model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    max_tool_iterations: Option<u32>,
    session_ttl_secs: Option<u64>,
    session_sweep_secs: Option<u64>,
    search_match_threshold: Option<f32>,
    search_match_count: Option<u32>,
    inventory_limit: Option<u32>,
    fallback_reply: Option<String>,
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

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const REQUIRED_VARS: &[(&str, &str)] = &[
        ("THREADLINE_GATEWAY_ACCOUNT_SID", "AC-test-account"),
        ("THREADLINE_GATEWAY_AUTH_TOKEN", "twilio-test-token"),
        ("THREADLINE_GATEWAY_FROM_NUMBER", "whatsapp:+14155238886"),
        ("THREADLINE_LLM_API_KEY", "gemini-test-key"),
    ];

    const ALL_VARS: &[&str] = &[
        "THREADLINE_DATABASE_URL",
        "THREADLINE_GATEWAY_ACCOUNT_SID",
        "THREADLINE_GATEWAY_AUTH_TOKEN",
        "THREADLINE_GATEWAY_FROM_NUMBER",
        "THREADLINE_LLM_API_KEY",
        "THREADLINE_LOG_LEVEL",
        "THREADLINE_LOG_FORMAT",
        "THREADLINE_AGENT_MAX_TOOL_ITERATIONS",
        "TWILIO_ACCOUNT_SID",
        "TWILIO_AUTH_TOKEN",
        "TWILIO_PHONE_NUMBER",
        "GEMINI_API_KEY",
        "TEST_TWILIO_TOKEN",
    ];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn set_vars(vars: &[(&str, &str)]) {
        for (key, value) in vars {
            env::set_var(key, value);
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
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(ALL_VARS);
        set_vars(REQUIRED_VARS);
        env::remove_var("THREADLINE_GATEWAY_AUTH_TOKEN");
        env::set_var("TEST_TWILIO_TOKEN", "token-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("threadline.toml");
            fs::write(
                &path,
                r#"
[gateway]
auth_token = "${TEST_TWILIO_TOKEN}"

[agent]
inventory_limit = 7
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.gateway.auth_token.expose_secret() == "token-from-env",
                "auth token should be interpolated from environment",
            )?;
            ensure(config.agent.inventory_limit == 7, "inventory limit should come from file")?;
            Ok(())
        })();

        clear_vars(ALL_VARS);
        result
    }

    #[test]
    fn conventional_provider_variables_are_accepted() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(ALL_VARS);
        set_vars(&[
            ("TWILIO_ACCOUNT_SID", "AC-legacy"),
            ("TWILIO_AUTH_TOKEN", "legacy-token"),
            ("TWILIO_PHONE_NUMBER", "whatsapp:+14155238886"),
            ("GEMINI_API_KEY", "legacy-gemini"),
        ]);

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.gateway.account_sid == "AC-legacy", "account sid alias should load")?;
            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret() == "legacy-gemini")
                    == Some(true),
                "gemini key alias should load",
            )?;
            ensure(config.agent.max_tool_iterations == 8, "iteration bound should default to 8")?;
            ensure(
                (config.agent.search_match_threshold - 0.3).abs() < f32::EPSILON,
                "match threshold should default to 0.3",
            )?;
            Ok(())
        })();

        clear_vars(ALL_VARS);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(ALL_VARS);
        set_vars(REQUIRED_VARS);
        env::set_var("THREADLINE_LOG_LEVEL", "warn");
        env::set_var("THREADLINE_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(ALL_VARS);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(ALL_VARS);
        set_vars(REQUIRED_VARS);
        env::set_var("THREADLINE_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("THREADLINE_AGENT_MAX_TOOL_ITERATIONS", "4");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("threadline.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[agent]
max_tool_iterations = 3

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
            ensure(
                config.agent.max_tool_iterations == 4,
                "env iteration bound should win over file",
            )?;
            Ok(())
        })();

        clear_vars(ALL_VARS);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(ALL_VARS);
        set_vars(REQUIRED_VARS);
        env::set_var("THREADLINE_GATEWAY_FROM_NUMBER", "14155238886");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("gateway.from_number")
            );
            ensure(has_message, "validation failure should mention gateway.from_number")
        })();

        clear_vars(ALL_VARS);
        result
    }

    #[test]
    fn missing_model_key_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(ALL_VARS);
        set_vars(&REQUIRED_VARS[..3]);

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected missing api key failure".to_string()),
                Err(error) => error,
            };
            ensure(error.to_string().contains("llm.api_key"), "error should mention llm.api_key")
        })();

        clear_vars(ALL_VARS);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(ALL_VARS);
        set_vars(REQUIRED_VARS);

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("twilio-test-token"),
                "debug output should not contain gateway token",
            )?;
            ensure(
                !debug.contains("gemini-test-key"),
                "debug output should not contain model api key",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(ALL_VARS);
        result
    }
}

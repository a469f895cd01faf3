use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use threadline_core::config::{AppConfig, LoadOptions};
use toml::Value;

struct ConfigFile {
    path: Option<PathBuf>,
    doc: Option<Value>,
}

impl ConfigFile {
    fn detect() -> Self {
        let path = detect_config_path();
        let doc = load_config_file_doc(path.as_deref());
        Self { path, doc }
    }

    fn line(&self, key_path: &str, value: &str, env_keys: &[&str]) -> String {
        format!("- {key_path} = {value} (source: {})", self.source(key_path, env_keys))
    }

    fn source(&self, key_path: &str, env_keys: &[&str]) -> String {
        if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
            return format!("env ({env_key})");
        }

        if let Some(doc) = &self.doc {
            if contains_path(doc, key_path) {
                let file_path = self
                    .path
                    .as_deref()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "config file".to_string());
                return format!("file ({file_path})");
            }
        }

        "default".to_string()
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };
    render(&config, &ConfigFile::detect())
}

fn render(config: &AppConfig, file: &ConfigFile) -> String {
    let auth_token = redact(config.gateway.auth_token.expose_secret());
    let api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| redact(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());

    let lines = vec![
        "effective config (source precedence: env > file > default):".to_string(),
        file.line("database.url", &config.database.url, &["THREADLINE_DATABASE_URL"]),
        file.line(
            "database.max_connections",
            &config.database.max_connections.to_string(),
            &["THREADLINE_DATABASE_MAX_CONNECTIONS"],
        ),
        file.line(
            "database.timeout_secs",
            &config.database.timeout_secs.to_string(),
            &["THREADLINE_DATABASE_TIMEOUT_SECS"],
        ),
        file.line(
            "gateway.account_sid",
            &redact_sid(&config.gateway.account_sid),
            &["THREADLINE_GATEWAY_ACCOUNT_SID", "TWILIO_ACCOUNT_SID"],
        ),
        file.line(
            "gateway.auth_token",
            &auth_token,
            &["THREADLINE_GATEWAY_AUTH_TOKEN", "TWILIO_AUTH_TOKEN"],
        ),
        file.line(
            "gateway.from_number",
            &config.gateway.from_number,
            &["THREADLINE_GATEWAY_FROM_NUMBER", "TWILIO_PHONE_NUMBER"],
        ),
        file.line(
            "gateway.api_base_url",
            &config.gateway.api_base_url,
            &["THREADLINE_GATEWAY_API_BASE_URL"],
        ),
        file.line(
            "llm.provider",
            &format!("{:?}", config.llm.provider),
            &["THREADLINE_LLM_PROVIDER"],
        ),
        file.line("llm.api_key", &api_key, &["THREADLINE_LLM_API_KEY", "GEMINI_API_KEY"]),
        file.line("llm.base_url", &config.llm.base_url, &["THREADLINE_LLM_BASE_URL"]),
        file.line("llm.model", &config.llm.model, &["THREADLINE_LLM_MODEL"]),
        file.line(
            "llm.embedding_model",
            &config.llm.embedding_model,
            &["THREADLINE_LLM_EMBEDDING_MODEL"],
        ),
        file.line(
            "llm.max_retries",
            &config.llm.max_retries.to_string(),
            &["THREADLINE_LLM_MAX_RETRIES"],
        ),
        file.line(
            "agent.max_tool_iterations",
            &config.agent.max_tool_iterations.to_string(),
            &["THREADLINE_AGENT_MAX_TOOL_ITERATIONS"],
        ),
        file.line(
            "agent.session_ttl_secs",
            &config.agent.session_ttl_secs.to_string(),
            &["THREADLINE_AGENT_SESSION_TTL_SECS"],
        ),
        file.line(
            "agent.search_match_threshold",
            &config.agent.search_match_threshold.to_string(),
            &["THREADLINE_AGENT_SEARCH_MATCH_THRESHOLD"],
        ),
        file.line(
            "agent.inventory_limit",
            &config.agent.inventory_limit.to_string(),
            &["THREADLINE_AGENT_INVENTORY_LIMIT"],
        ),
        file.line(
            "server.bind_address",
            &config.server.bind_address,
            &["THREADLINE_SERVER_BIND_ADDRESS"],
        ),
        file.line("server.port", &config.server.port.to_string(), &["THREADLINE_SERVER_PORT"]),
        file.line(
            "logging.level",
            &config.logging.level,
            &["THREADLINE_LOGGING_LEVEL", "THREADLINE_LOG_LEVEL"],
        ),
        file.line(
            "logging.format",
            &format!("{:?}", config.logging.format),
            &["THREADLINE_LOGGING_FORMAT", "THREADLINE_LOG_FORMAT"],
        ),
    ];

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("threadline.toml"), PathBuf::from("config/threadline.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
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

fn redact(secret: &str) -> String {
    if secret.trim().is_empty() {
        "<empty>".to_string()
    } else {
        "<redacted>".to_string()
    }
}

/// Keeps the `AC` prefix and the last four characters, enough to tell
/// accounts apart.
fn redact_sid(sid: &str) -> String {
    let sid = sid.trim();
    let chars = sid.chars().collect::<Vec<_>>();
    if chars.len() <= 6 {
        return redact(sid);
    }
    let head = chars[..2].iter().collect::<String>();
    let tail = chars[chars.len() - 4..].iter().collect::<String>();
    format!("{head}***{tail}")
}

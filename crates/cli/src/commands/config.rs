use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use lineup_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

struct Field {
    key: &'static str,
    env_key: &'static str,
    value: String,
}

impl Field {
    fn new(key: &'static str, env_key: &'static str, value: impl Into<String>) -> Self {
        Self { key, env_key, value: value.into() }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source = field_source(
            field.key,
            field.env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(format!("- {} = {} (source: {source})", field.key, field.value));
    }

    lines.join("\n")
}

fn effective_fields(config: &AppConfig) -> Vec<Field> {
    vec![
        Field::new("database.url", "LINEUP_DATABASE_URL", &config.database.url),
        Field::new(
            "database.max_connections",
            "LINEUP_DATABASE_MAX_CONNECTIONS",
            config.database.max_connections.to_string(),
        ),
        Field::new(
            "database.timeout_secs",
            "LINEUP_DATABASE_TIMEOUT_SECS",
            config.database.timeout_secs.to_string(),
        ),
        Field::new(
            "messenger.enabled",
            "LINEUP_MESSENGER_ENABLED",
            config.messenger.enabled.to_string(),
        ),
        Field::new(
            "messenger.bot_token",
            "LINEUP_MESSENGER_BOT_TOKEN",
            redact_token(config.messenger.bot_token.expose_secret()),
        ),
        Field::new(
            "messenger.api_base_url",
            "LINEUP_MESSENGER_API_BASE_URL",
            &config.messenger.api_base_url,
        ),
        Field::new(
            "messenger.timeout_secs",
            "LINEUP_MESSENGER_TIMEOUT_SECS",
            config.messenger.timeout_secs.to_string(),
        ),
        Field::new(
            "booking.horizon_days",
            "LINEUP_BOOKING_HORIZON_DAYS",
            config.booking.horizon_days.to_string(),
        ),
        Field::new(
            "booking.intake_timeout_secs",
            "LINEUP_BOOKING_INTAKE_TIMEOUT_SECS",
            config.booking.intake_timeout_secs.to_string(),
        ),
        Field::new(
            "server.bind_address",
            "LINEUP_SERVER_BIND_ADDRESS",
            &config.server.bind_address,
        ),
        Field::new("server.port", "LINEUP_SERVER_PORT", config.server.port.to_string()),
        Field::new(
            "server.graceful_shutdown_secs",
            "LINEUP_SERVER_GRACEFUL_SHUTDOWN_SECS",
            config.server.graceful_shutdown_secs.to_string(),
        ),
        Field::new("logging.level", "LINEUP_LOGGING_LEVEL", &config.logging.level),
        Field::new(
            "logging.format",
            "LINEUP_LOGGING_FORMAT",
            format!("{:?}", config.logging.format),
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    ["lineup.toml", "config/lineup.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
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

/// Bot tokens look like `<bot id>:<secret>`; only the bot id is shown.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((bot_id, _)) = trimmed.split_once(':') {
        return format!("{bot_id}:***");
    }

    "<redacted>".to_string()
}

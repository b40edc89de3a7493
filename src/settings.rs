//! Bot configuration.
//!
//! Settings layer from lowest to highest precedence: compiled defaults, a
//! JSON config file, `BOT_*` environment variables, then explicit overrides
//! (the hook an outer CLI uses for command-line flags). Wire names are
//! camelCase to match the JSON config format.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// All recognised configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Bot display name; matched by direct branches. Sanitised to
    /// `[a-z0-9_-]`.
    pub name: String,
    /// Alternate name for direct matching.
    pub alias: Option<String>,
    /// Minimum log level emitted: `silent`, `debug`, `info`, `warn`,
    /// `error`.
    pub log_level: String,
    /// Enable periodic memory snapshotting.
    pub auto_save: bool,
    /// Milliseconds between automatic memory snapshots.
    pub save_interval: u64,
    /// Whether the host process should run its HTTP collaborator.
    pub use_server: bool,
    /// HTTP collaborator bind host.
    pub server_host: String,
    /// HTTP collaborator bind port.
    pub server_port: u16,
    /// HTTP collaborator TLS toggle.
    pub server_secure: bool,
    /// Message adapter identifier; the built-in `shell` adapter when unset.
    pub message_adapter: Option<String>,
    /// NLU adapter identifier.
    pub nlu_adapter: Option<String>,
    /// Storage adapter identifier.
    pub storage_adapter: Option<String>,
    /// Minimum text length before the understand stage invokes NLU.
    pub nlu_min_length: usize,
    /// Adapter operation timeout in milliseconds.
    pub request_timeout: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            name: "bot".to_string(),
            alias: None,
            log_level: "info".to_string(),
            auto_save: false,
            save_interval: 5000,
            use_server: false,
            server_host: "localhost".to_string(),
            server_port: 5000,
            server_secure: false,
            message_adapter: None,
            nlu_adapter: None,
            storage_adapter: None,
            nlu_min_length: 10,
            request_timeout: 5000,
        }
    }
}

impl Settings {
    /// Load settings from the layered sources. `overrides` is a JSON object
    /// applied last (pass `Value::Null` for none).
    pub fn layered(config_path: Option<&Path>, overrides: Value) -> Result<Self, anyhow::Error> {
        let mut value = serde_json::to_value(Settings::default())?;
        if let Some(path) = config_path {
            let raw = std::fs::read_to_string(path)?;
            merge(&mut value, serde_json::from_str(&raw)?);
        }
        merge(&mut value, env_overrides());
        merge(&mut value, overrides);
        let mut settings: Settings = serde_json::from_value(value)?;
        settings.name = sanitize_name(&settings.name);
        settings.alias = settings.alias.as_deref().map(sanitize_name);
        Ok(settings)
    }

    /// The minimum level filter the `logLevel` option maps to.
    pub fn log_level_filter(&self) -> log::LevelFilter {
        match self.log_level.as_str() {
            "silent" => log::LevelFilter::Off,
            "debug" => log::LevelFilter::Debug,
            "warn" => log::LevelFilter::Warn,
            "error" => log::LevelFilter::Error,
            _ => log::LevelFilter::Info,
        }
    }

    /// Apply the name sanitisation used at construction.
    pub fn sanitized(mut self) -> Self {
        self.name = sanitize_name(&self.name);
        self.alias = self.alias.as_deref().map(sanitize_name);
        self
    }
}

/// Lowercase and restrict to `[a-z0-9_-]`, falling back to `bot` for names
/// that sanitise to nothing.
pub fn sanitize_name(raw: &str) -> String {
    let cleaned: String = raw
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        "bot".to_string()
    } else {
        cleaned
    }
}

/// Shallow-merge `incoming` object keys over `base`.
fn merge(base: &mut Value, incoming: Value) {
    if let (Value::Object(base_map), Value::Object(incoming_map)) = (base, incoming) {
        for (key, value) in incoming_map {
            base_map.insert(key, value);
        }
    }
}

fn env_overrides() -> Value {
    let mut map = serde_json::Map::new();
    let string_keys = [
        ("BOT_NAME", "name"),
        ("BOT_ALIAS", "alias"),
        ("BOT_LOG_LEVEL", "logLevel"),
        ("BOT_SERVER_HOST", "serverHost"),
        ("BOT_MESSAGE_ADAPTER", "messageAdapter"),
        ("BOT_NLU_ADAPTER", "nluAdapter"),
        ("BOT_STORAGE_ADAPTER", "storageAdapter"),
    ];
    for (var, key) in string_keys {
        if let Ok(value) = std::env::var(var) {
            map.insert(key.to_string(), Value::String(value));
        }
    }
    let bool_keys = [
        ("BOT_AUTO_SAVE", "autoSave"),
        ("BOT_USE_SERVER", "useServer"),
        ("BOT_SERVER_SECURE", "serverSecure"),
    ];
    for (var, key) in bool_keys {
        if let Ok(value) = std::env::var(var) {
            let parsed = matches!(value.to_lowercase().as_str(), "true" | "1" | "yes");
            map.insert(key.to_string(), Value::Bool(parsed));
        }
    }
    let number_keys = [
        ("BOT_SAVE_INTERVAL", "saveInterval"),
        ("BOT_SERVER_PORT", "serverPort"),
        ("BOT_NLU_MIN_LENGTH", "nluMinLength"),
        ("BOT_REQUEST_TIMEOUT", "requestTimeout"),
    ];
    for (var, key) in number_keys {
        if let Ok(value) = std::env::var(var) {
            if let Ok(parsed) = value.parse::<u64>() {
                map.insert(key.to_string(), Value::from(parsed));
            }
        }
    }
    Value::Object(map)
}

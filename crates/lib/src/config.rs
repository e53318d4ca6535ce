//! Configuration types and loading.
//!
//! Config is loaded from an optional JSON file (e.g. `~/.whatsgpt/config.json`) and then
//! overridden from the environment (`PORT`, `OPENAI_API_KEY`, `WHATSAPP_API_TOKEN`, ...).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 8080;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    /// Inbound webhook verification.
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Outbound WhatsApp Cloud API settings.
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,

    #[serde(default)]
    pub completion: CompletionConfig,

    /// Where replies go: the WhatsApp channel or the log.
    #[serde(default)]
    pub output: OutputMode,

    /// Database for "data: " queries. Data queries are disabled when no url is set.
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub conversation: ConversationConfig,
}

/// HTTP listen settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Port (default 8080). Overridden by PORT env.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bind address (default "0.0.0.0"; the provider must reach the webhook).
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfig {
    /// Token expected in `hub.verify_token` during the subscription handshake.
    /// When unset every handshake is refused. Overridden by WEBHOOK_VERIFY_TOKEN env.
    pub verify_token: Option<String>,
    /// App secret for `X-Hub-Signature-256` checks. Unset disables the check.
    /// Overridden by WHATSAPP_APP_SECRET env.
    pub app_secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhatsAppConfig {
    /// Bearer token for the Cloud API. Overridden by WHATSAPP_API_TOKEN env.
    pub api_token: Option<String>,
    /// Business phone number id used in the send URL. Overridden by WHATSAPP_APP_ID env.
    pub phone_number_id: Option<String>,
    /// Graph API base (default https://graph.facebook.com/v15.0).
    pub api_base: Option<String>,
    #[serde(default = "default_send_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_send_timeout_secs() -> u64 {
    30
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            api_token: None,
            phone_number_id: None,
            api_base: None,
            timeout_secs: default_send_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionConfig {
    /// Overridden by OPENAI_API_KEY env.
    pub api_key: Option<String>,
    /// OpenAI-compatible base URL (default https://api.openai.com/v1). Overridden by OPENAI_BASE_URL env.
    pub base_url: Option<String>,
    /// Chat model (default gpt-3.5-turbo). Overridden by OPENAI_MODEL env.
    pub model: Option<String>,
    #[serde(default = "default_completion_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_completion_timeout_secs() -> u64 {
    60
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: None,
            timeout_secs: default_completion_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Log replies instead of sending them.
    #[default]
    Log,
    /// Send replies through the WhatsApp Cloud API.
    #[serde(rename = "whatsapp")]
    WhatsApp,
}

impl OutputMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputMode::Log => "log",
            OutputMode::WhatsApp => "whatsapp",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfig {
    /// Postgres connection url. Overridden by DATABASE_URL env.
    pub url: Option<String>,
    /// Schema whose tables are described to the model (default "public").
    #[serde(default = "default_schema")]
    pub schema: String,
    /// Restrict introspection to this catalog (database name) when set.
    pub catalog: Option<String>,
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_query_timeout_secs() -> u64 {
    30
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            schema: default_schema(),
            catalog: None,
            query_timeout_secs: default_query_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationConfig {
    /// Most recent turns sent to the model with each request (default 10).
    #[serde(default = "default_prompt_window")]
    pub prompt_window: usize,
    /// Turns kept per sender; older ones are dropped (default 100).
    #[serde(default = "default_max_stored_turns")]
    pub max_stored_turns: usize,
}

fn default_prompt_window() -> usize {
    10
}

fn default_max_stored_turns() -> usize {
    crate::session::DEFAULT_MAX_STORED_TURNS
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            prompt_window: default_prompt_window(),
            max_stored_turns: default_max_stored_turns(),
        }
    }
}

/// Trimmed value, or None when unset or blank.
pub fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Apply environment overrides using `lookup` (normally `std::env::var`).
/// Blank values are ignored. An unparsable PORT keeps the configured port and logs a warning.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| non_empty(&lookup(key));

    if let Some(port) = get("PORT") {
        match port.parse::<u16>() {
            Ok(p) => config.server.port = p,
            Err(_) => log::warn!(
                "failed to convert env variable 'PORT' of value '{}' to a port number; using {}",
                port,
                config.server.port
            ),
        }
    }
    if let Some(v) = get("OPENAI_API_KEY") {
        config.completion.api_key = Some(v);
    }
    if let Some(v) = get("OPENAI_BASE_URL") {
        config.completion.base_url = Some(v);
    }
    if let Some(v) = get("OPENAI_MODEL") {
        config.completion.model = Some(v);
    }
    if let Some(v) = get("WHATSAPP_API_TOKEN") {
        config.whatsapp.api_token = Some(v);
    }
    if let Some(v) = get("WHATSAPP_APP_ID") {
        config.whatsapp.phone_number_id = Some(v);
    }
    if let Some(v) = get("WHATSAPP_APP_SECRET") {
        config.webhook.app_secret = Some(v);
    }
    if let Some(v) = get("WEBHOOK_VERIFY_TOKEN") {
        config.webhook.verify_token = Some(v);
    }
    if let Some(v) = get("DATABASE_URL") {
        config.database.url = Some(v);
    }
    if let Some(v) = get("OUTPUT") {
        config.output = if v.eq_ignore_ascii_case("whatsapp") {
            OutputMode::WhatsApp
        } else {
            OutputMode::Log
        };
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("WHATSGPT_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".whatsgpt").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path (or the default), then apply environment overrides.
/// Missing file => default config. Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let mut config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    apply_env_overrides(&mut config, |k| std::env::var(k).ok());
    Ok((config, path))
}

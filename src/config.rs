//! Configuration management

use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_OPENAI_HOST: &str = "https://api.openai.com";

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Anthropic API key (reasoning tools and autonomous loops)
    pub anthropic_api_key: Option<String>,

    /// OpenAI API key (image generation)
    pub openai_api_key: Option<String>,

    /// OpenAI base URL
    pub openai_host: String,

    /// Serper API key (web search)
    pub serper_api_key: Option<String>,

    /// Goose state directory (results, session log, tool call log)
    pub goose_home: PathBuf,

    /// Default model hint for the reasoning client (haiku, sonnet, opus)
    pub default_model: String,

    /// Sleep between autonomous loop iterations
    pub loop_interval: Duration,

    /// Timeout for outbound HTTP requests
    pub http_timeout: Duration,

    /// Search cache TTL in seconds
    pub search_cache_ttl_secs: u64,

    /// Enable search response caching
    pub search_cache_enabled: bool,

    /// Raise a desktop dialog when a background task finishes
    pub desktop_notifications: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let anthropic_api_key = std::env::var("ANTHROPIC_API_KEY").ok();
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();
        let serper_api_key = std::env::var("SERPER_API_KEY").ok();

        let openai_host = std::env::var("OPENAI_HOST")
            .unwrap_or_else(|_| DEFAULT_OPENAI_HOST.to_string());

        let goose_home = std::env::var("GOOSE_HOME")
            .map(|p| PathBuf::from(shellexpand::tilde(&p).into_owned()))
            .unwrap_or_else(|_| default_goose_home());

        let default_model = std::env::var("GOOSE_PLUGINS_MODEL")
            .unwrap_or_else(|_| "sonnet".to_string());

        let loop_interval = std::env::var("GOOSE_LOOP_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(20));

        let http_timeout = std::env::var("GOOSE_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(600));

        let search_cache_enabled = std::env::var("GOOSE_SEARCH_CACHE_ENABLED")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(true);

        let search_cache_ttl_secs = std::env::var("GOOSE_SEARCH_CACHE_TTL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(900);

        let desktop_notifications = std::env::var("GOOSE_DESKTOP_NOTIFY")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(true);

        Ok(Self {
            anthropic_api_key,
            openai_api_key,
            openai_host,
            serper_api_key,
            goose_home,
            default_model,
            loop_interval,
            http_timeout,
            search_cache_ttl_secs,
            search_cache_enabled,
            desktop_notifications,
        })
    }

    /// Configuration rooted at `goose_home` with no API keys. Used by tests
    /// and offline runs.
    pub fn offline(goose_home: impl Into<PathBuf>) -> Self {
        Self {
            anthropic_api_key: None,
            openai_api_key: None,
            openai_host: DEFAULT_OPENAI_HOST.to_string(),
            serper_api_key: None,
            goose_home: goose_home.into(),
            default_model: "sonnet".to_string(),
            loop_interval: Duration::from_secs(20),
            http_timeout: Duration::from_secs(600),
            search_cache_ttl_secs: 900,
            search_cache_enabled: true,
            desktop_notifications: false,
        }
    }

    /// Directory for per-iteration snapshots
    pub fn results_dir(&self) -> PathBuf {
        self.goose_home.join("results")
    }

    /// JSON-lines session log read by `--stream-log`
    pub fn session_log_path(&self) -> PathBuf {
        self.goose_home.join("session_log.json")
    }

    /// Plain-text log of tool invocations
    pub fn tool_log_path(&self) -> PathBuf {
        self.goose_home.join("tool_calls.log")
    }
}

fn default_goose_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".goose")
}

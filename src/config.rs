//! Configuration loading and constants.
//!
//! Loads application configuration from a TOML file, then applies environment
//! overrides for deployment secrets. Every section has defaults so the service
//! can start without any file. `AppConfig` is the root configuration struct.

use std::path::Path;

use chrono_tz::Tz;
use serde::Deserialize;

// =============================================================================
// HTTP
// =============================================================================

/// Default bind address (all interfaces, for container deployments)
pub const DEFAULT_HTTP_HOST: &str = "0.0.0.0";

/// Default listen port, matching the container's exposed port
pub const DEFAULT_HTTP_PORT: u16 = 8000;

/// Cache-Control for health probe responses
pub const CACHE_CONTROL_NO_STORE: &str = "no-store";

/// Seconds to wait for in-flight work after a shutdown signal
pub const SHUTDOWN_GRACE_SECS: u64 = 30;

// =============================================================================
// Job Queue
// =============================================================================

/// Default number of message-processing workers
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Default capacity of the webhook job queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// How long a webhook event ID is remembered for redelivery detection
pub const WEBHOOK_EVENT_DEDUP_TTL_SECS: u64 = 600;

/// Maximum number of remembered webhook event IDs
pub const WEBHOOK_EVENT_DEDUP_CAPACITY: u64 = 10_000;

// =============================================================================
// Scheduler
// =============================================================================

/// Interval between scheduler ticks
pub const SCHEDULER_TICK_SECS: u64 = 60;

/// Upper bound on missed minutes replayed after a stalled tick (one day)
pub const SCHEDULER_MAX_CATCHUP_MINUTES: i64 = 24 * 60;

/// Default timezone for scheduled reports
pub const DEFAULT_TIMEZONE: &str = "Asia/Tokyo";

// =============================================================================
// External APIs
// =============================================================================

/// LINE Messaging API base URL
pub const LINE_API_BASE: &str = "https://api.line.me";

/// LINE content API base URL (images, audio)
pub const LINE_DATA_API_BASE: &str = "https://api-data.line.me";

/// LINE limit on quick reply items per message
pub const LINE_QUICK_REPLY_MAX_ITEMS: usize = 13;

/// LINE limit on quick reply label length (characters)
pub const LINE_QUICK_REPLY_LABEL_MAX: usize = 20;

/// LINE limit on text message length (characters)
pub const LINE_TEXT_MAX_CHARS: usize = 5000;

/// Anthropic Messages API base URL
pub const CLAUDE_API_BASE: &str = "https://api.anthropic.com";

/// Anthropic API version header value
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Default model for transaction analysis
pub const DEFAULT_CLAUDE_MODEL: &str = "claude-sonnet-4-20250514";

/// Default token budget for a transaction analysis reply
pub const DEFAULT_CLAUDE_MAX_TOKENS: u32 = 1000;

/// Token budget for tax consultation answers
pub const CLAUDE_TAX_ANSWER_MAX_TOKENS: u32 = 2000;

/// Google Cloud Vision API base URL
pub const VISION_API_BASE: &str = "https://vision.googleapis.com";

/// OpenAI API base URL (Whisper transcription)
pub const OPENAI_API_BASE: &str = "https://api.openai.com";

/// Timeout for any outbound API request
pub const OUTBOUND_REQUEST_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// Defaults
// =============================================================================

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Default log filter when neither CLI nor RUST_LOG is set
pub const DEFAULT_LOG_FILTER: &str = "chobo=info,tower_http=info";

/// Log filter used when `app.debug` is enabled
pub const DEBUG_LOG_FILTER: &str = "chobo=debug,tower_http=debug";

/// Default log format (text or json)
pub const DEFAULT_LOG_FORMAT: &str = "text";

/// Default application name shown in the root endpoint and logs
pub const DEFAULT_APP_NAME: &str = "LINE会計AGI";

/// Default PostgreSQL pool size
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub http: HttpServerConfig,
    #[serde(default)]
    pub app: AppSettings,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub line: LineConfig,
    #[serde(default)]
    pub claude: ClaudeConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "HttpServerConfig::default_host")]
    pub host: String,
    #[serde(default = "HttpServerConfig::default_port")]
    pub port: u16,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
        }
    }
}

impl HttpServerConfig {
    fn default_host() -> String {
        DEFAULT_HTTP_HOST.to_string()
    }

    fn default_port() -> u16 {
        DEFAULT_HTTP_PORT
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default = "AppSettings::default_name")]
    pub name: String,
    /// Enables debug logging when no explicit filter is given
    #[serde(default)]
    pub debug: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            name: Self::default_name(),
            debug: false,
        }
    }
}

impl AppSettings {
    fn default_name() -> String {
        DEFAULT_APP_NAME.to_string()
    }
}

/// PostgreSQL settings. Without a URL the service keeps its books in memory.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    #[serde(default = "DatabaseConfig::default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: Self::default_max_connections(),
        }
    }
}

impl DatabaseConfig {
    fn default_max_connections() -> u32 {
        DEFAULT_DB_MAX_CONNECTIONS
    }
}

/// LINE Messaging API channel settings
#[derive(Debug, Clone, Deserialize)]
pub struct LineConfig {
    pub channel_access_token: Option<String>,
    pub channel_secret: Option<String>,
    #[serde(default = "LineConfig::default_api_base")]
    pub api_base: String,
    #[serde(default = "LineConfig::default_data_api_base")]
    pub data_api_base: String,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            channel_access_token: None,
            channel_secret: None,
            api_base: Self::default_api_base(),
            data_api_base: Self::default_data_api_base(),
        }
    }
}

impl LineConfig {
    fn default_api_base() -> String {
        LINE_API_BASE.to_string()
    }

    fn default_data_api_base() -> String {
        LINE_DATA_API_BASE.to_string()
    }
}

/// Anthropic API settings for transaction analysis
#[derive(Debug, Clone, Deserialize)]
pub struct ClaudeConfig {
    pub api_key: Option<String>,
    #[serde(default = "ClaudeConfig::default_model")]
    pub model: String,
    #[serde(default = "ClaudeConfig::default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "ClaudeConfig::default_api_base")]
    pub api_base: String,
}

impl Default for ClaudeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: Self::default_model(),
            max_tokens: Self::default_max_tokens(),
            api_base: Self::default_api_base(),
        }
    }
}

impl ClaudeConfig {
    fn default_model() -> String {
        DEFAULT_CLAUDE_MODEL.to_string()
    }

    fn default_max_tokens() -> u32 {
        DEFAULT_CLAUDE_MAX_TOKENS
    }

    fn default_api_base() -> String {
        CLAUDE_API_BASE.to_string()
    }
}

/// Receipt OCR (Google Cloud Vision)
#[derive(Debug, Clone, Deserialize)]
pub struct OcrConfig {
    pub vision_api_key: Option<String>,
    #[serde(default = "OcrConfig::default_api_base")]
    pub api_base: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            vision_api_key: None,
            api_base: Self::default_api_base(),
        }
    }
}

impl OcrConfig {
    fn default_api_base() -> String {
        VISION_API_BASE.to_string()
    }
}

/// Voice transcription (OpenAI Whisper)
#[derive(Debug, Clone, Deserialize)]
pub struct SpeechConfig {
    pub openai_api_key: Option<String>,
    #[serde(default = "SpeechConfig::default_api_base")]
    pub api_base: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            api_base: Self::default_api_base(),
        }
    }
}

impl SpeechConfig {
    fn default_api_base() -> String {
        OPENAI_API_BASE.to_string()
    }
}

/// Webhook job workers
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "WorkerConfig::default_count")]
    pub count: usize,
    #[serde(default = "WorkerConfig::default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: Self::default_count(),
            queue_capacity: Self::default_queue_capacity(),
        }
    }
}

impl WorkerConfig {
    fn default_count() -> usize {
        DEFAULT_WORKER_COUNT
    }

    fn default_queue_capacity() -> usize {
        DEFAULT_QUEUE_CAPACITY
    }
}

/// Periodic reports and reminders
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "SchedulerConfig::default_enabled")]
    pub enabled: bool,
    /// IANA timezone name the schedule is evaluated in
    #[serde(default = "SchedulerConfig::default_timezone")]
    pub timezone: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            timezone: Self::default_timezone(),
        }
    }
}

impl SchedulerConfig {
    fn default_enabled() -> bool {
        true
    }

    fn default_timezone() -> String {
        DEFAULT_TIMEZONE.to_string()
    }

    /// Parsed timezone. `AppConfig::validate` guarantees this succeeds for loaded configs.
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::Validation(format!("Unknown timezone: {}", self.timezone)))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "text" (human-readable, default) or "json" (structured)
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: DEFAULT_LOG_FORMAT.to_string(),
        }
    }
}

impl LoggingConfig {
    fn default_format() -> String {
        DEFAULT_LOG_FORMAT.to_string()
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Load from an explicit path, or from the default path if it exists,
    /// falling back to built-in defaults. Environment overrides are applied last.
    pub fn load_with_env(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::load(DEFAULT_CONFIG_PATH)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment-style overrides. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("DATABASE_URL") {
            self.database.url = Some(url);
        }
        if let Some(token) = get("LINE_CHANNEL_ACCESS_TOKEN") {
            self.line.channel_access_token = Some(token);
        }
        if let Some(secret) = get("LINE_CHANNEL_SECRET") {
            self.line.channel_secret = Some(secret);
        }
        if let Some(key) = get("CLAUDE_API_KEY") {
            self.claude.api_key = Some(key);
        }
        if let Some(key) = get("GOOGLE_CLOUD_VISION_API_KEY") {
            self.ocr.vision_api_key = Some(key);
        }
        if let Some(key) = get("OPENAI_API_KEY") {
            self.speech.openai_api_key = Some(key);
        }
        if let Some(name) = get("APP_NAME") {
            self.app.name = name;
        }
        if let Some(debug) = get("DEBUG") {
            self.app.debug = matches!(debug.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        if let Some(host) = get("HOST") {
            self.http.host = host;
        }
        if let Some(port) = get("PORT").and_then(|p| p.parse().ok()) {
            self.http.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker.count == 0 {
            return Err(ConfigError::Validation(
                "worker.count must be at least 1".to_string(),
            ));
        }
        if self.worker.queue_capacity == 0 {
            return Err(ConfigError::Validation(
                "worker.queue_capacity must be at least 1".to_string(),
            ));
        }
        self.scheduler.tz()?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Configuration error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config.http.host, "0.0.0.0");
        assert_eq!(config.http.port, 8000);
        assert_eq!(config.app.name, DEFAULT_APP_NAME);
        assert!(config.database.url.is_none());
        assert_eq!(config.worker.count, DEFAULT_WORKER_COUNT);
        assert!(config.scheduler.enabled);
        assert_eq!(config.logging.format, "text");
    }

    #[test]
    fn test_parse_sections() {
        let config = AppConfig::parse(
            r#"
            [http]
            port = 9000

            [database]
            url = "postgres://localhost/books"
            max_connections = 2

            [worker]
            count = 2

            [scheduler]
            enabled = false
            timezone = "UTC"
            "#,
        )
        .unwrap();
        assert_eq!(config.http.port, 9000);
        assert_eq!(config.http.host, "0.0.0.0");
        assert_eq!(config.database.url.as_deref(), Some("postgres://localhost/books"));
        assert_eq!(config.database.max_connections, 2);
        assert_eq!(config.worker.count, 2);
        assert_eq!(config.worker.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert!(!config.scheduler.enabled);
        assert_eq!(config.scheduler.tz().unwrap(), chrono_tz::UTC);
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let config = AppConfig::parse(include_str!("../config/default.toml")).unwrap();
        assert_eq!(config.http.port, DEFAULT_HTTP_PORT);
        assert_eq!(config.app.name, DEFAULT_APP_NAME);
        assert_eq!(config.claude.model, DEFAULT_CLAUDE_MODEL);
        assert_eq!(config.scheduler.timezone, DEFAULT_TIMEZONE);
        assert!(config.database.url.is_none());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let err = AppConfig::parse("[worker]\ncount = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_unknown_timezone_rejected() {
        let err = AppConfig::parse("[scheduler]\ntimezone = \"Mars/Olympus\"\n").unwrap_err();
        assert!(err.to_string().contains("Mars/Olympus"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("DATABASE_URL", "postgresql://postgres:password@db:5432/accounting_db"),
            ("LINE_CHANNEL_SECRET", "secret"),
            ("CLAUDE_API_KEY", ""),
            ("DEBUG", "True"),
            ("PORT", "8080"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert!(config.database.url.is_some());
        assert_eq!(config.line.channel_secret.as_deref(), Some("secret"));
        // Empty values do not override
        assert!(config.claude.api_key.is_none());
        assert!(config.app.debug);
        assert_eq!(config.http.port, 8080);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[app]\nname = \"帳簿\"\n").unwrap();
        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.app.name, "帳簿");
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = AppConfig::load("/nonexistent/chobo.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}

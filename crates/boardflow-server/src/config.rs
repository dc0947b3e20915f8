use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Automation engine settings and outbound provider credentials
    #[serde(default)]
    pub automation: AutomationConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        // Storage validation
        if self.storage.backend == StorageBackend::Rest {
            let base_url = self.storage.rest.base_url.as_deref().unwrap_or("");
            if base_url.is_empty() {
                return Err("storage.backend = \"rest\" requires storage.rest.base_url".into());
            }
            url::Url::parse(base_url)
                .map_err(|e| format!("storage.rest.base_url is not a valid URL: {e}"))?;
        }
        // Automation validations
        let batch = self.automation.batch_size;
        if !(1..=1000).contains(&batch) {
            return Err("automation.batch_size must be between 1 and 1000".into());
        }
        if self.automation.poll_interval_ms == Some(0) {
            return Err("automation.poll_interval_ms must be > 0 when set".into());
        }
        url::Url::parse(&self.automation.ai.base_url)
            .map_err(|e| format!("automation.ai.base_url is not a valid URL: {e}"))?;
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }

    /// Which of the recognized provider options are set. Values are never
    /// reported.
    pub fn presence(&self) -> ConfigPresence {
        let set = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        ConfigPresence {
            email_relay_url: set(&self.automation.email_relay_url),
            ai_api_key: set(&self.automation.ai.api_key),
            ai_model: !self.automation.ai.model.trim().is_empty(),
            storage_base_url: set(&self.storage.rest.base_url),
            storage_service_key: set(&self.storage.rest.service_key),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPresence {
    pub email_relay_url: bool,
    pub ai_api_key: bool,
    pub ai_model: bool,
    pub storage_base_url: bool,
    pub storage_service_key: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_body_limit() -> usize {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// PostgREST-compatible relational REST API
    #[default]
    Rest,
    /// Process memory, lost on restart
    Memory,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default)]
    pub rest: RestStorageConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestStorageConfig {
    /// REST root, e.g. `https://project.supabase.co/rest/v1`
    #[serde(default)]
    pub base_url: Option<String>,
    /// Service key sent as `apikey` and bearer token.
    /// Prefer BOARDFLOW__STORAGE__REST__SERVICE_KEY over the config file.
    #[serde(default)]
    pub service_key: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl RestStorageConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// How a cycle takes ownership of pending events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStrategy {
    /// Conditional update before matching; concurrent cycles never share an event.
    #[default]
    Atomic,
    /// Fetch, execute, then mark processed. Overlapping cycles may both act
    /// on the same event.
    MarkAfter,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub claim_strategy: ClaimStrategy,
    /// Background cycle interval. Unset means cycles run only on request.
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
    #[serde(default)]
    pub email_relay_url: Option<String>,
    #[serde(default = "default_from")]
    pub default_from: String,
    #[serde(default = "default_subject")]
    pub default_subject: String,
    /// Signs webhook bodies with `X-Signature-256` when set
    #[serde(default)]
    pub webhook_secret: Option<String>,
    /// Outbound HTTP timeout. Unset means no timeout.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
    #[serde(default)]
    pub ai: AiConfig,
}

fn default_batch_size() -> usize {
    100
}
fn default_from() -> String {
    "noreply@boardflow.local".into()
}
fn default_subject() -> String {
    "Task Update".into()
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            claim_strategy: ClaimStrategy::default(),
            poll_interval_ms: None,
            email_relay_url: None,
            default_from: default_from(),
            default_subject: default_subject(),
            webhook_secret: None,
            request_timeout_ms: None,
            ai: AiConfig::default(),
        }
    }
}

impl AutomationConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_ms.map(Duration::from_millis)
    }
}

/// OpenAI-compatible chat-completions provider used by AI_FILL_FIELDS
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_ai_model")]
    pub model: String,
    #[serde(default = "default_ai_base_url")]
    pub base_url: String,
    /// Sent as `HTTP-Referer`
    #[serde(default)]
    pub referer: Option<String>,
}

fn default_ai_model() -> String {
    "anthropic/claude-3.5-sonnet".into()
}
fn default_ai_base_url() -> String {
    "https://openrouter.ai/api/v1/chat/completions".into()
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_ai_model(),
            base_url: default_ai_base_url(),
            referer: None,
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::{Path, PathBuf};

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or("boardflow.toml"));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., BOARDFLOW__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("BOARDFLOW")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }

    pub fn load_config_with_default_path<P: AsRef<Path>>(
        path: Option<P>,
    ) -> Result<AppConfig, String> {
        let p = path
            .as_ref()
            .map(|p| p.as_ref().to_string_lossy().to_string());
        load_config(p.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_config() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.storage.backend = StorageBackend::Memory;
        cfg
    }

    #[test]
    fn defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.automation.batch_size, 100);
        assert_eq!(cfg.automation.claim_strategy, ClaimStrategy::Atomic);
        assert_eq!(cfg.automation.default_subject, "Task Update");
        assert_eq!(cfg.automation.ai.model, "anthropic/claude-3.5-sonnet");
        assert!(cfg.automation.request_timeout().is_none());
        assert!(cfg.automation.poll_interval().is_none());
    }

    #[test]
    fn rest_backend_requires_base_url() {
        let cfg = AppConfig::default();
        let err = cfg.validate().unwrap_err();
        assert!(err.contains("storage.rest.base_url"));
        assert!(memory_config().validate().is_ok());
    }

    #[test]
    fn batch_size_bounds() {
        let mut cfg = memory_config();
        cfg.automation.batch_size = 0;
        assert!(cfg.validate().is_err());
        cfg.automation.batch_size = 1001;
        assert!(cfg.validate().is_err());
        cfg.automation.batch_size = 1000;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn invalid_log_level_rejected() {
        let mut cfg = memory_config();
        cfg.logging.level = "verbose".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn presence_reports_booleans_only() {
        let mut cfg = memory_config();
        cfg.automation.email_relay_url = Some("https://relay.example.com".into());
        cfg.automation.ai.api_key = Some("  ".into());
        let presence = cfg.presence();
        assert!(presence.email_relay_url);
        assert!(!presence.ai_api_key);
        assert!(presence.ai_model);
        assert!(!presence.storage_service_key);

        let json = serde_json::to_value(presence).unwrap();
        assert_eq!(json["emailRelayUrl"], true);
    }
}

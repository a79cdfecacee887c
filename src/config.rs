use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub retention: RetentionConfig,

    pub worker: WorkerConfig,

    pub engine: EngineConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,

    pub database_path: String,

    pub max_db_connections: u32,

    pub min_db_connections: u32,

    /// 0 lets tokio pick the number of runtime threads.
    pub worker_threads: usize,

    pub event_bus_buffer_size: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            database_path: "sqlite:ragarr.db".to_string(),
            max_db_connections: 5,
            min_db_connections: 1,
            worker_threads: 0,
            event_bus_buffer_size: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,

    pub port: u16,

    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 7878,
            cors_allowed_origins: vec!["*".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Records expire this many hours after creation. Expired records
    /// are invisible to reads immediately and reclaimed by the purge
    /// job.
    pub ttl_hours: u32,

    pub purge_interval_minutes: u32,

    /// Optional six-field cron expression; takes precedence over the
    /// fixed interval when set.
    pub purge_cron: Option<String>,
}

impl RetentionConfig {
    #[must_use]
    pub const fn ttl_seconds(&self) -> i64 {
        self.ttl_hours as i64 * 3600
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            ttl_hours: 24,
            purge_interval_minutes: 30,
            purge_cron: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Dispatch queue depth; submissions fail fast once it is full.
    pub queue_capacity: usize,

    /// Re-attempts of `process` when the terminal write hits a store
    /// outage. Safe under the conditional update.
    pub update_retry_limit: u32,

    pub update_retry_delay_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            update_retry_limit: 3,
            update_retry_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base URL of an OpenAI-compatible API, e.g.
    /// `https://api.openai.com/v1`.
    pub api_base_url: String,

    pub model: String,

    /// Falls back to the OPENAI_API_KEY environment variable when
    /// empty, so the key can stay out of config.toml.
    pub api_key: String,

    pub request_timeout_seconds: u64,

    pub max_tokens: Option<u32>,
}

impl EngineConfig {
    #[must_use]
    pub fn resolve_api_key(&self) -> Option<String> {
        if !self.api_key.is_empty() {
            return Some(self.api_key.clone());
        }
        std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            api_key: String::new(),
            request_timeout_seconds: 60,
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    pub loki_enabled: bool,

    pub loki_url: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            loki_enabled: false,
            loki_url: "http://localhost:3100".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        paths.push(PathBuf::from("config.toml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("ragarr").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".ragarr").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.retention.ttl_hours == 0 {
            anyhow::bail!("Retention TTL must be at least one hour");
        }

        if self.worker.queue_capacity == 0 {
            anyhow::bail!("Worker queue capacity must be > 0");
        }

        if self.retention.purge_interval_minutes == 0 {
            anyhow::bail!("Purge interval must be > 0");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        // The connection URL form sea-orm accepts; a bare file name
        // would fail to parse at connect time.
        assert!(config.general.database_path.starts_with("sqlite:"));
        assert_eq!(config.retention.ttl_hours, 24);
        assert_eq!(config.retention.ttl_seconds(), 24 * 3600);
        assert_eq!(config.server.port, 7878);
        assert_eq!(config.worker.queue_capacity, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[retention]"));
        assert!(toml_str.contains("[engine]"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [general]
            log_level = "debug"

            [retention]
            ttl_hours = 2
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.retention.ttl_hours, 2);

        assert_eq!(config.engine.model, "gpt-3.5-turbo");
    }

    #[test]
    fn test_validate_rejects_zero_ttl() {
        let mut config = Config::default();
        config.retention.ttl_hours = 0;
        assert!(config.validate().is_err());
    }
}

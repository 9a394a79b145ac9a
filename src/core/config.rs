use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;
use url::Url;

use crate::core::connection::ConnectionConfig;
use crate::core::connection::backoff::ReconnectPolicy;
use crate::core::connection::subscriptions::topics;

const ENV_PREFIX: &str = "TOWERWATCH_";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("{key}={value:?} is not a valid value")]
    InvalidValue { key: String, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Ring-buffer sizes for the diagnostic traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticCapacities {
    #[serde(default = "default_thinking_capacity")]
    pub thinking: usize,
    #[serde(default = "default_llm_capacity")]
    pub llm: usize,
    #[serde(default = "default_tool_capacity")]
    pub tools: usize,
    #[serde(default = "default_log_capacity")]
    pub logs: usize,
}

fn default_thinking_capacity() -> usize {
    500
}
fn default_llm_capacity() -> usize {
    200
}
fn default_tool_capacity() -> usize {
    500
}
fn default_log_capacity() -> usize {
    500
}

impl Default for DiagnosticCapacities {
    fn default() -> Self {
        Self {
            thinking: default_thinking_capacity(),
            llm: default_llm_capacity(),
            tools: default_tool_capacity(),
            logs: default_log_capacity(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Backend base URL; the socket endpoint is derived from it.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Explicit `ws://` / `wss://` base, used instead of the derived one.
    #[serde(default)]
    pub ws_url: Option<String>,

    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    /// Settle time after open before topics are re-issued.
    #[serde(default = "default_resubscribe_delay_ms")]
    pub resubscribe_delay_ms: u64,

    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,

    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    #[serde(default = "default_topics")]
    pub topics: Vec<String>,

    #[serde(default)]
    pub capacities: DiagnosticCapacities,
}

fn default_api_url() -> String {
    "http://127.0.0.1:8000".to_string()
}
fn default_ping_interval_ms() -> u64 {
    30_000
}
fn default_resubscribe_delay_ms() -> u64 {
    100
}
fn default_reconnect_base_ms() -> u64 {
    1_000
}
fn default_backoff_factor() -> f64 {
    2.0
}
fn default_max_reconnect_attempts() -> u32 {
    10
}
fn default_topics() -> Vec<String> {
    topics::DEFAULT.iter().map(|t| t.to_string()).collect()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            ws_url: None,
            ping_interval_ms: default_ping_interval_ms(),
            resubscribe_delay_ms: default_resubscribe_delay_ms(),
            reconnect_base_ms: default_reconnect_base_ms(),
            backoff_factor: default_backoff_factor(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            topics: default_topics(),
            capacities: DiagnosticCapacities::default(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

impl SyncConfig {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let config = Self::parse_toml(&content, &path.display().to_string())?;
        info!("Loaded sync config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Self::parse_toml(content, "inline config")
    }

    fn parse_toml(content: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            origin: origin.to_string(),
            source,
        })
    }

    /// Overlay `TOWERWATCH_*` variables. `lookup` is `std::env::var` in the
    /// binary and a map in tests.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            let key = format!("{}{}", ENV_PREFIX, name);
            lookup(&key).map(|value| (key, value))
        };

        if let Some((_, value)) = var("API_URL") {
            self.api_url = value;
        }
        if let Some((_, value)) = var("WS_URL") {
            self.ws_url = Some(value);
        }
        if let Some((key, value)) = var("PING_INTERVAL_MS") {
            self.ping_interval_ms = parse_env(&key, &value)?;
        }
        if let Some((key, value)) = var("RESUBSCRIBE_DELAY_MS") {
            self.resubscribe_delay_ms = parse_env(&key, &value)?;
        }
        if let Some((key, value)) = var("RECONNECT_BASE_MS") {
            self.reconnect_base_ms = parse_env(&key, &value)?;
        }
        if let Some((key, value)) = var("BACKOFF_FACTOR") {
            self.backoff_factor = parse_env(&key, &value)?;
        }
        if let Some((key, value)) = var("MAX_RECONNECTS") {
            self.max_reconnect_attempts = parse_env(&key, &value)?;
        }
        if let Some((key, value)) = var("THINKING_CAPACITY") {
            self.capacities.thinking = parse_env(&key, &value)?;
        }
        if let Some((key, value)) = var("LLM_CAPACITY") {
            self.capacities.llm = parse_env(&key, &value)?;
        }
        if let Some((key, value)) = var("TOOL_CAPACITY") {
            self.capacities.tools = parse_env(&key, &value)?;
        }
        if let Some((key, value)) = var("LOG_CAPACITY") {
            self.capacities.logs = parse_env(&key, &value)?;
        }
        if let Some((_, value)) = var("TOPICS") {
            self.topics = value
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
        }
        Ok(())
    }

    pub fn apply_process_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ping_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "ping_interval_ms must be greater than zero".into(),
            ));
        }
        if self.reconnect_base_ms == 0 {
            return Err(ConfigError::Invalid(
                "reconnect_base_ms must be greater than zero".into(),
            ));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor <= 1.0 {
            return Err(ConfigError::Invalid(format!(
                "backoff_factor must be greater than 1.0 (got {})",
                self.backoff_factor
            )));
        }
        let caps = &self.capacities;
        if caps.thinking == 0 || caps.llm == 0 || caps.tools == 0 || caps.logs == 0 {
            return Err(ConfigError::Invalid(
                "diagnostic capacities must be greater than zero".into(),
            ));
        }
        self.websocket_base()?;
        Ok(())
    }

    /// The socket base URL: the explicit `ws_url` if set, otherwise
    /// `api_url` with `http`/`https` mapped to `ws`/`wss` and the path
    /// dropped.
    pub fn websocket_base(&self) -> Result<Url, ConfigError> {
        if let Some(raw) = &self.ws_url {
            let url = parse_url("ws_url", raw)?;
            if !matches!(url.scheme(), "ws" | "wss") {
                return Err(ConfigError::InvalidValue {
                    key: "ws_url".into(),
                    value: raw.clone(),
                });
            }
            return Ok(url);
        }

        let mut url = parse_url("api_url", &self.api_url)?;
        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            _ => {
                return Err(ConfigError::InvalidValue {
                    key: "api_url".into(),
                    value: self.api_url.clone(),
                });
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| ConfigError::InvalidValue {
                key: "api_url".into(),
                value: self.api_url.clone(),
            })?;
        url.set_path("");
        url.set_query(None);
        url.set_fragment(None);
        Ok(url)
    }

    pub fn connection(&self) -> Result<ConnectionConfig, ConfigError> {
        Ok(ConnectionConfig {
            endpoint: self.websocket_base()?,
            ping_interval: Duration::from_millis(self.ping_interval_ms),
            resubscribe_delay: Duration::from_millis(self.resubscribe_delay_ms),
            reconnect: ReconnectPolicy {
                base_delay: Duration::from_millis(self.reconnect_base_ms),
                growth_factor: self.backoff_factor,
                max_attempts: self.max_reconnect_attempts,
            },
            default_topics: self.topics.clone(),
        })
    }
}

fn parse_url(key: &str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = SyncConfig::default();
        config.validate().unwrap();
        assert_eq!(
            config.topics,
            vec!["disruptions", "approvals", "workflows", "agent_thinking"]
        );
        assert_eq!(config.capacities.llm, 200);
    }

    #[test]
    fn partial_toml_keeps_defaults_for_missing_keys() {
        let config = SyncConfig::from_toml_str(
            r#"
api_url = "https://ops.example.com/api"
max_reconnect_attempts = 3

[capacities]
thinking = 50
"#,
        )
        .unwrap();
        assert_eq!(config.max_reconnect_attempts, 3);
        assert_eq!(config.capacities.thinking, 50);
        assert_eq!(config.capacities.logs, 500);
        assert_eq!(config.ping_interval_ms, 30_000);
    }

    #[tokio::test]
    async fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("towerwatch.toml");
        std::fs::write(&path, "ping_interval_ms = 5000\n").unwrap();
        let config = SyncConfig::load(&path).await.unwrap();
        assert_eq!(config.ping_interval_ms, 5000);

        let missing = SyncConfig::load(dir.path().join("nope.toml")).await;
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = SyncConfig::from_toml_str("reconnect_base_ms = 250").unwrap();
        config
            .apply_env(env(&[
                ("TOWERWATCH_RECONNECT_BASE_MS", "400"),
                ("TOWERWATCH_BACKOFF_FACTOR", "1.5"),
                ("TOWERWATCH_TOPICS", "disruptions, tool_invocations,"),
            ]))
            .unwrap();
        assert_eq!(config.reconnect_base_ms, 400);
        assert_eq!(config.backoff_factor, 1.5);
        assert_eq!(config.topics, vec!["disruptions", "tool_invocations"]);
    }

    #[test]
    fn unparseable_env_value_is_reported_with_its_key() {
        let mut config = SyncConfig::default();
        let err = config
            .apply_env(env(&[("TOWERWATCH_MAX_RECONNECTS", "lots")]))
            .unwrap_err();
        match err {
            ConfigError::InvalidValue { key, value } => {
                assert_eq!(key, "TOWERWATCH_MAX_RECONNECTS");
                assert_eq!(value, "lots");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn validate_rejects_degenerate_timing() {
        let mut config = SyncConfig {
            ping_interval_ms: 0,
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());
        config.ping_interval_ms = 1000;
        config.backoff_factor = 1.0;
        assert!(config.validate().is_err());
        config.backoff_factor = 2.0;
        config.capacities.tools = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn websocket_base_maps_scheme_and_drops_path() {
        let config = SyncConfig {
            api_url: "https://ops.example.com:8443/api/v1?x=1".into(),
            ..SyncConfig::default()
        };
        assert_eq!(
            config.websocket_base().unwrap().as_str(),
            "wss://ops.example.com:8443/"
        );

        let plain = SyncConfig::default();
        assert_eq!(
            plain.websocket_base().unwrap().as_str(),
            "ws://127.0.0.1:8000/"
        );
    }

    #[test]
    fn explicit_ws_url_wins_and_must_be_a_socket_scheme() {
        let mut config = SyncConfig {
            ws_url: Some("wss://stream.example.com/live".into()),
            ..SyncConfig::default()
        };
        assert_eq!(
            config.websocket_base().unwrap().as_str(),
            "wss://stream.example.com/live"
        );
        config.ws_url = Some("https://stream.example.com".into());
        assert!(config.validate().is_err());
        config.ws_url = None;
        config.api_url = "ftp://files.example.com".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn connection_settings_carry_the_policy() {
        let connection = SyncConfig::default().connection().unwrap();
        assert_eq!(connection.ping_interval, Duration::from_secs(30));
        assert_eq!(connection.resubscribe_delay, Duration::from_millis(100));
        assert_eq!(connection.reconnect.base_delay, Duration::from_secs(1));
        assert_eq!(connection.reconnect.max_attempts, 10);
    }
}

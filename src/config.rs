//! Service and source configuration.
//!
//! Every field has a default, so an empty TOML document is a valid config:
//!
//! ```toml
//! start_policy = "best_effort"
//! drain_wait_ms = 2000
//!
//! [broker]
//! url = "mqtt://broker.local:1883"
//! topics = ["commands/+"]
//! reconnect_interval_ms = 5000
//!
//! [rest]
//! bind = "0.0.0.0:8080"
//! ```
//!
//! `MQTT_BROKER_URL` overrides `broker.url` when set.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use uuid::Uuid;

use crate::error::ConfigError;

/// Environment variable overriding [`BrokerConfig::url`].
pub const BROKER_URL_ENV: &str = "MQTT_BROKER_URL";

/// What `start()` does when one of several sources fails to start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartPolicy {
    /// Stop the sources already started and stay `Stopped`.
    #[default]
    AllOrNothing,
    /// Keep the sources that started and enter `Running`.
    BestEffort,
}

/// Whether `stop()` waits for in-flight handler invocations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DrainPolicy {
    /// Return once sources are stopped; handlers finish in the background.
    #[default]
    Detach,
    /// Wait up to the given time for in-flight handlers after stopping sources.
    Wait(Duration),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub start_policy: StartPolicy,
    /// When set, `stop()` waits this long for in-flight handlers.
    pub drain_wait_ms: Option<u64>,
    pub broker: BrokerConfig,
    pub rest: RestConfig,
}

impl ServiceConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|error| ConfigError::Read {
            path: path.display().to_string(),
            error,
        })?;
        let mut config = Self::from_toml_str(&text)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn drain_policy(&self) -> DrainPolicy {
        match self.drain_wait_ms {
            Some(ms) => DrainPolicy::Wait(Duration::from_millis(ms)),
            None => DrainPolicy::Detach,
        }
    }

    /// Overlay environment variables onto this config.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var(BROKER_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.broker.url = url;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.broker.validate()?;
        if self.rest.bind.trim().is_empty() {
            return Err(ConfigError::Invalid("rest.bind must not be empty".into()));
        }
        Ok(())
    }
}

/// Settings for the broker-backed source.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub url: String,
    /// Client ids are `<prefix>-<uuid>`.
    pub client_id_prefix: String,
    pub clean_session: bool,
    pub reconnect_interval_ms: u64,
    /// `None` retries forever.
    pub max_reconnect_attempts: Option<u32>,
    pub poll_interval_ms: u64,
    pub topics: Vec<String>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: "mqtt://localhost:1883".to_string(),
            client_id_prefix: "yet-another-notifier".to_string(),
            clean_session: true,
            reconnect_interval_ms: 5000,
            max_reconnect_attempts: None,
            poll_interval_ms: 50,
            topics: vec!["notifications/+".to_string(), "commands/+".to_string()],
        }
    }
}

impl BrokerConfig {
    /// Generate a fresh client identifier.
    pub fn generate_client_id(&self) -> String {
        format!("{}-{}", self.client_id_prefix, Uuid::new_v4())
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::Invalid("broker.url must not be empty".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "broker.poll_interval_ms must be positive".into(),
            ));
        }
        if self.topics.is_empty() || self.topics.iter().any(|t| t.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "broker.topics must list at least one non-empty filter".into(),
            ));
        }
        Ok(())
    }
}

/// Settings for the HTTP source.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RestConfig {
    pub bind: String,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

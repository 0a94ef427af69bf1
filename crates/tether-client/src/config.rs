//! Socket configuration.
//!
//! Loaded from TOML or built in code:
//!
//! ```toml
//! keepalive_interval = 10.0   # seconds between liveness probes
//! dispatch = "inline"         # or "spawn"
//! ```

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Default time between liveness probes.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);

/// Where message handlers run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dispatch {
    /// On the socket's dispatcher task, one message at a time, in arrival
    /// order.
    #[default]
    Inline,
    /// On a fresh task per message. Handlers may run concurrently and out
    /// of order.
    Spawn,
}

/// Process-wide knobs for a [`Socket`](crate::Socket).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SocketConfig {
    #[serde(deserialize_with = "de_interval")]
    pub keepalive_interval: Duration,
    pub dispatch: Dispatch,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            dispatch: Dispatch::default(),
        }
    }
}

impl SocketConfig {
    /// Set the probe interval. A zero interval is replaced by the default.
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = if interval.is_zero() {
            DEFAULT_KEEPALIVE_INTERVAL
        } else {
            interval
        };
        self
    }

    pub fn dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}

fn de_interval<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    match Duration::try_from_secs_f64(secs) {
        Ok(interval) if !interval.is_zero() => Ok(interval),
        _ => Err(serde::de::Error::custom(format!(
            "keepalive_interval must be a positive number of seconds, got {secs}"
        ))),
    }
}

/// Configuration could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SocketConfig::default();
        assert_eq!(config.keepalive_interval, Duration::from_secs(10));
        assert_eq!(config.dispatch, Dispatch::Inline);
        assert_eq!(SocketConfig::from_toml_str("").unwrap(), config);
    }

    #[test]
    fn parse_toml() {
        let config = SocketConfig::from_toml_str(
            r#"
            keepalive_interval = 2.5
            dispatch = "spawn"
            "#,
        )
        .unwrap();
        assert_eq!(config.keepalive_interval, Duration::from_millis(2500));
        assert_eq!(config.dispatch, Dispatch::Spawn);
    }

    #[test]
    fn reject_bad_interval() {
        assert!(SocketConfig::from_toml_str("keepalive_interval = 0.0").is_err());
        assert!(SocketConfig::from_toml_str("keepalive_interval = -1.0").is_err());
    }

    #[test]
    fn reject_unknown_keys() {
        assert!(SocketConfig::from_toml_str("ping = 3.0").is_err());
    }

    #[test]
    fn zero_interval_builder_falls_back() {
        let config = SocketConfig::default().keepalive_interval(Duration::ZERO);
        assert_eq!(config.keepalive_interval, DEFAULT_KEEPALIVE_INTERVAL);
    }

    #[test]
    fn load_missing_file() {
        let err = SocketConfig::load("/nonexistent/tether.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}

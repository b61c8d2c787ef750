//! Activity monitor configuration.

use std::time::Duration;

use ext_config::{Config, File, FileFormat};
use serde::Deserialize;

use crate::error::ActivityError;

fn default_poll_interval_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActivityMonitorConfig {
    /// Base address of the supervised client's monitoring API, e.g.
    /// `127.0.0.1:8442` or `http://10.0.0.5:8442`. When unset the poller
    /// idles and the dashboard reports an unknown pool status.
    #[serde(default)]
    monitoring_address: Option<String>,
    /// Set when the supervised client mines solo, without an upstream pool.
    #[serde(default)]
    solo_mining: bool,
    /// Seconds between stats poll cycles.
    #[serde(default = "default_poll_interval_secs")]
    poll_interval_secs: u64,
}

impl Default for ActivityMonitorConfig {
    fn default() -> Self {
        Self {
            monitoring_address: None,
            solo_mining: false,
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl ActivityMonitorConfig {
    pub fn new(monitoring_address: Option<String>, solo_mining: bool) -> Self {
        Self {
            monitoring_address,
            solo_mining,
            poll_interval_secs: default_poll_interval_secs(),
        }
    }

    /// Load the configuration from a TOML file.
    pub fn from_file(path: &str) -> Result<Self, ActivityError> {
        let settings = Config::builder()
            .add_source(File::new(path, FileFormat::Toml))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn solo_mining(&self) -> bool {
        self.solo_mining
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn set_poll_interval_secs(&mut self, secs: u64) {
        self.poll_interval_secs = secs;
    }

    /// Resolved monitoring base URL.
    ///
    /// The scheme defaults to `http://` and a wildcard bind address is
    /// rewritten to loopback, since the supervised client reports its bind
    /// address, not a reachable one.
    pub fn monitoring_base_url(&self) -> Option<String> {
        let raw = self.monitoring_address.as_deref()?.trim();
        if raw.is_empty() {
            return None;
        }
        let with_scheme = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("http://{raw}")
        };
        Some(
            with_scheme
                .replace("0.0.0.0", "127.0.0.1")
                .trim_end_matches('/')
                .to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_defaults_to_http() {
        let config = ActivityMonitorConfig::new(Some("127.0.0.1:8442".to_string()), false);
        assert_eq!(
            config.monitoring_base_url().as_deref(),
            Some("http://127.0.0.1:8442")
        );
    }

    #[test]
    fn explicit_scheme_is_kept() {
        let config = ActivityMonitorConfig::new(Some("https://pool.local:8442".to_string()), false);
        assert_eq!(
            config.monitoring_base_url().as_deref(),
            Some("https://pool.local:8442")
        );
    }

    #[test]
    fn wildcard_bind_rewritten_to_loopback() {
        let config = ActivityMonitorConfig::new(Some("0.0.0.0:8442".to_string()), false);
        assert_eq!(
            config.monitoring_base_url().as_deref(),
            Some("http://127.0.0.1:8442")
        );
    }

    #[test]
    fn trailing_slash_is_stripped() {
        let config = ActivityMonitorConfig::new(Some("http://127.0.0.1:8442/".to_string()), false);
        assert_eq!(
            config.monitoring_base_url().as_deref(),
            Some("http://127.0.0.1:8442")
        );
    }

    #[test]
    fn unset_or_empty_address_yields_none() {
        assert_eq!(
            ActivityMonitorConfig::new(None, false).monitoring_base_url(),
            None
        );
        assert_eq!(
            ActivityMonitorConfig::new(Some("  ".to_string()), false).monitoring_base_url(),
            None
        );
    }

    #[test]
    fn default_poll_interval_is_ten_seconds() {
        assert_eq!(
            ActivityMonitorConfig::default().poll_interval(),
            Duration::from_secs(10)
        );
    }
}

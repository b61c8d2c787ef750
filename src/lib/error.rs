//! Error types for the activity monitor.
//!
//! Failures in the poll path never propagate out of the poll task; they
//! degrade the tracked state instead (see [`crate::stats_poller`]). These
//! variants surface only through the fallible construction and
//! configuration APIs.

use std::fmt;

#[derive(Debug)]
pub enum ActivityError {
    /// A monitoring API request failed, timed out, or returned a non-2xx
    /// status.
    Http(reqwest::Error),
    /// The configuration file could not be loaded or parsed.
    Config(ext_config::ConfigError),
}

impl fmt::Display for ActivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(e) => write!(f, "monitoring API request failed: {e}"),
            Self::Config(e) => write!(f, "invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ActivityError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Http(e) => Some(e),
            Self::Config(e) => Some(e),
        }
    }
}

impl From<reqwest::Error> for ActivityError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e)
    }
}

impl From<ext_config::ConfigError> for ActivityError {
    fn from(e: ext_config::ConfigError) -> Self {
        Self::Config(e)
    }
}

//! Wire types and HTTP client for the supervised client's monitoring API.
//!
//! The shapes mirror the JSON the SV2 monitoring server exposes under
//! `/api/v1`: a global summary, a paginated clients listing, and per-client
//! channel listings. Unknown fields are ignored and missing fields default,
//! so minor API drift degrades to zeros instead of failing the poll cycle.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ActivityError;

/// Per-request timeout for every monitoring API call; no call may block
/// a poll cycle indefinitely.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Summary of the server (upstream) connection, from `/api/v1/global`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerSummary {
    #[serde(default)]
    pub total_channels: usize,
    #[serde(default)]
    pub extended_channels: usize,
    #[serde(default)]
    pub standard_channels: usize,
    #[serde(default)]
    pub total_hashrate: f64,
}

/// Summary of all clients (downstream) connections, from `/api/v1/global`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientsSummary {
    #[serde(default)]
    pub total_clients: usize,
    #[serde(default)]
    pub total_channels: usize,
    #[serde(default)]
    pub extended_channels: usize,
    #[serde(default)]
    pub standard_channels: usize,
    #[serde(default)]
    pub total_hashrate: f64,
}

/// Global statistics from `/api/v1/global`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GlobalInfo {
    #[serde(default)]
    pub server: ServerSummary,
    #[serde(default)]
    pub clients: ClientsSummary,
    #[serde(default)]
    pub uptime_secs: u64,
}

/// One entry of the paginated `/api/v1/clients` listing.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientMetadata {
    pub client_id: usize,
    #[serde(default)]
    pub extended_channels_count: usize,
    #[serde(default)]
    pub standard_channels_count: usize,
    #[serde(default)]
    pub total_hashrate: f64,
}

/// Paginated `/api/v1/clients` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientsPage {
    #[serde(default)]
    pub total: usize,
    #[serde(default)]
    pub items: Vec<ClientMetadata>,
}

/// One standard channel from `/api/v1/clients/{id}/channels`.
#[derive(Debug, Clone, Deserialize)]
pub struct StandardChannelInfo {
    pub channel_id: u32,
    #[serde(default)]
    pub user_identity: String,
    #[serde(default)]
    pub shares_accepted: u32,
    #[serde(default)]
    pub share_work_sum: f64,
    #[serde(default)]
    pub best_diff: f64,
    #[serde(default)]
    pub expected_shares_per_minute: f64,
}

/// `/api/v1/clients/{id}/channels` response. Only standard channels carry
/// per-device work counters; extended channels are aggregated upstream.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientChannels {
    #[serde(default)]
    pub standard_channels: Vec<StandardChannelInfo>,
}

/// Thin HTTP client over the monitoring API.
#[derive(Debug, Clone)]
pub struct StatsClient {
    http: reqwest::Client,
    base_url: String,
}

impl StatsClient {
    pub fn new(base_url: String) -> Result<Self, ActivityError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http, base_url })
    }

    pub async fn global(&self) -> Result<GlobalInfo, ActivityError> {
        let url = format!("{}/api/v1/global", self.base_url);
        Ok(self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }

    pub async fn clients(&self) -> Result<ClientsPage, ActivityError> {
        let url = format!("{}/api/v1/clients", self.base_url);
        Ok(self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }

    pub async fn client_channels(&self, client_id: usize) -> Result<ClientChannels, ActivityError> {
        let url = format!("{}/api/v1/clients/{}/channels", self.base_url, client_id);
        Ok(self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_global_info() {
        let json = r#"{
            "server": {"total_channels": 1, "extended_channels": 1, "standard_channels": 0, "total_hashrate": 500.0},
            "clients": {"total_clients": 2, "total_channels": 2, "extended_channels": 0, "standard_channels": 2, "total_hashrate": 900.0},
            "uptime_secs": 3600
        }"#;
        let global: GlobalInfo = serde_json::from_str(json).expect("valid global payload");
        assert_eq!(global.server.total_channels, 1);
        assert_eq!(global.clients.total_clients, 2);
        assert_eq!(global.uptime_secs, 3600);
    }

    #[test]
    fn deserializes_client_channels_ignoring_unknown_fields() {
        let json = r#"{
            "client_id": 1,
            "offset": 0,
            "limit": 25,
            "total_extended": 0,
            "total_standard": 1,
            "extended_channels": [],
            "standard_channels": [{
                "channel_id": 7,
                "user_identity": "addr.worker1",
                "nominal_hashrate": 500.0,
                "target_hex": "00ff",
                "shares_accepted": 12,
                "share_work_sum": 1024.5,
                "best_diff": 42.0,
                "expected_shares_per_minute": 6.0
            }]
        }"#;
        let channels: ClientChannels = serde_json::from_str(json).expect("valid channels payload");
        assert_eq!(channels.standard_channels.len(), 1);
        let channel = &channels.standard_channels[0];
        assert_eq!(channel.channel_id, 7);
        assert_eq!(channel.share_work_sum, 1024.5);
        assert_eq!(channel.expected_shares_per_minute, 6.0);
    }

    #[test]
    fn missing_optional_fields_default_to_zero() {
        let json = r#"{"standard_channels": [{"channel_id": 3}]}"#;
        let channels: ClientChannels = serde_json::from_str(json).expect("minimal payload");
        assert_eq!(channels.standard_channels[0].share_work_sum, 0.0);
        assert_eq!(channels.standard_channels[0].user_identity, "");
    }
}

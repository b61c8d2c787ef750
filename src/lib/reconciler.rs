//! Joins the log-derived miner registry with the latest channel snapshots.
//!
//! The two sources update independently and either can lag: stats appear a
//! little after the channel-open log line, and a disconnect can slip past
//! the log stream entirely. Reconciliation keeps a miner while it is inside
//! a connection grace period or while the stats side shows live hashrate,
//! and evicts it otherwise. It reads both sources and never mutates the
//! snapshot side.

use serde::Serialize;
use tracing::warn;

use crate::hashrate::HashratePoint;
use crate::miner_registry::ConnectedMiner;
use crate::stats_poller::{ActivityState, ChannelSnapshot};

/// Grace period after a channel-open event during which a miner is kept
/// even without corroborating stats.
pub const STATS_GRACE_MS: u64 = 30_000;

/// A connected miner joined with its channel statistics. `channel` is
/// `None` while the stats side has no snapshot for it yet, which is
/// distinct from a snapshot reporting zero hashrate.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichedMinerView {
    #[serde(flatten)]
    pub miner: ConnectedMiner,
    pub channel: Option<ChannelSnapshot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolStatus {
    Solo,
    Connected,
    Disconnected,
    Unknown,
}

/// Aggregate view for the console's dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub miner_count: usize,
    pub total_hashrate: f64,
    pub pool_status: PoolStatus,
    pub uptime_secs: u64,
    pub total_channels: usize,
    pub server_hashrate: f64,
}

/// Point-in-time enriched miner list.
///
/// Miners past the grace period with no matching snapshot, or whose
/// snapshot shows zero hashrate, are removed from the registry: a
/// disconnect the log stream never reported.
pub(crate) fn enriched_miners(state: &mut ActivityState, now_ms: u64) -> Vec<EnrichedMinerView> {
    let mut views = Vec::new();
    let mut stale = Vec::new();

    for miner in state.registry.connected_miners() {
        // A client can hold several standard channels; retention holds as
        // long as any of them shows live hashrate. The joined snapshot is
        // the lowest channel id so the view is deterministic.
        let snapshot = state
            .snapshots
            .values()
            .filter(|s| s.client_id == miner.downstream_id)
            .min_by_key(|s| s.channel_id)
            .cloned();

        let within_grace = now_ms.saturating_sub(miner.connected_at_ms) < STATS_GRACE_MS;
        let active = state
            .snapshots
            .values()
            .any(|s| s.client_id == miner.downstream_id && s.current_hashrate > 0.0);

        if within_grace || active {
            views.push(EnrichedMinerView {
                miner,
                channel: snapshot,
            });
        } else {
            stale.push(miner.downstream_id);
        }
    }

    for downstream_id in stale {
        warn!(downstream_id, "evicting stale miner with no recent activity");
        state.registry.remove(downstream_id);
    }

    views
}

pub(crate) fn dashboard(
    state: &mut ActivityState,
    solo_mining: bool,
    monitoring_configured: bool,
    now_ms: u64,
) -> Dashboard {
    let miner_count = enriched_miners(state, now_ms).len();
    let total_hashrate = state.snapshots.values().map(|s| s.current_hashrate).sum();

    let pool_status = if solo_mining {
        PoolStatus::Solo
    } else if !monitoring_configured {
        PoolStatus::Unknown
    } else if state.monitoring_reachable {
        PoolStatus::Connected
    } else {
        PoolStatus::Disconnected
    };

    let (uptime_secs, total_channels, server_hashrate) = match &state.global {
        Some(global) => (
            global.uptime_secs,
            global.server.total_channels,
            global.server.total_hashrate,
        ),
        None => (0, 0, 0.0),
    };

    Dashboard {
        miner_count,
        total_hashrate,
        pool_status,
        uptime_secs,
        total_channels,
        server_hashrate,
    }
}

pub(crate) fn global_hashrate_history(state: &ActivityState) -> Vec<HashratePoint> {
    state.global_hashrate_history.to_vec()
}

pub(crate) fn miner_hashrate_history(state: &ActivityState, key: &str) -> Vec<HashratePoint> {
    state
        .channel_hashrate_history
        .get(key)
        .map(|ring| ring.to_vec())
        .unwrap_or_default()
}

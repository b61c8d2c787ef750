//! Pending-setup correlation queue and connected-miner registry.
//!
//! `SetupConnection` describes the device, `OpenStandardMiningChannel`
//! carries the downstream id, and nothing in the log format ties the two
//! together. The registry therefore queues setup metadata and matches it
//! FIFO against the next channel open. Under concurrent connections
//! arriving out of order, cross-matching is possible; this is an inherent
//! limitation of the log format, not a correctable bug.

use std::collections::{HashMap, VecDeque};

use serde::Serialize;
use tracing::{debug, info};

use crate::log_events::{parse_log_line, LogEvent};

/// How long queued setup metadata waits for its channel-open event.
pub const PENDING_SETUP_TTL_MS: u64 = 30_000;

/// Device metadata from a `SetupConnection` line, awaiting the matching
/// channel-open event.
#[derive(Debug, Clone)]
pub struct PendingSetup {
    pub vendor: String,
    pub hardware_version: String,
    pub firmware: String,
    pub device_id: String,
    pub received_at_ms: u64,
}

/// A currently connected mining device, keyed by its downstream id.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectedMiner {
    pub downstream_id: usize,
    pub vendor: String,
    pub hardware_version: String,
    pub firmware: String,
    pub device_id: String,
    pub user_identity: String,
    pub nominal_hashrate: f64,
    pub connected_at_ms: u64,
}

/// In-memory view of connected miners, rebuilt purely from log events.
#[derive(Debug, Default)]
pub struct MinerRegistry {
    pending: VecDeque<PendingSetup>,
    miners: HashMap<usize, ConnectedMiner>,
}

impl MinerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify one raw log line and apply it to the registry.
    ///
    /// Synchronous, O(1) amortized, never fails; unrecognized lines are
    /// silently ignored.
    pub fn handle_log_line(&mut self, line: &str, now_ms: u64) {
        match parse_log_line(line) {
            Some(LogEvent::SetupConnection {
                vendor,
                hardware_version,
                firmware,
                device_id,
            }) => {
                debug!(%vendor, %hardware_version, "queueing device metadata from SetupConnection");
                self.pending.push_back(PendingSetup {
                    vendor,
                    hardware_version,
                    firmware,
                    device_id,
                    received_at_ms: now_ms,
                });
                self.purge_expired(now_ms);
            }
            Some(LogEvent::ChannelOpen {
                user_identity,
                nominal_hashrate,
                downstream_id,
            }) => {
                self.purge_expired(now_ms);
                // Best-effort FIFO match; "unknown" device when no setup
                // metadata is queued.
                let (vendor, hardware_version, firmware, device_id) =
                    match self.pending.pop_front() {
                        Some(setup) => (
                            setup.vendor,
                            setup.hardware_version,
                            setup.firmware,
                            setup.device_id,
                        ),
                        None => (
                            "unknown".to_string(),
                            String::new(),
                            String::new(),
                            String::new(),
                        ),
                    };
                info!(downstream_id, %user_identity, %vendor, "miner connected");
                self.miners.insert(
                    downstream_id,
                    ConnectedMiner {
                        downstream_id,
                        vendor,
                        hardware_version,
                        firmware,
                        device_id,
                        user_identity,
                        nominal_hashrate,
                        connected_at_ms: now_ms,
                    },
                );
            }
            Some(LogEvent::Disconnect { downstream_id }) => {
                if self.miners.remove(&downstream_id).is_some() {
                    info!(downstream_id, "miner disconnected");
                }
            }
            None => {}
        }
    }

    fn purge_expired(&mut self, now_ms: u64) {
        while let Some(front) = self.pending.front() {
            if now_ms.saturating_sub(front.received_at_ms) > PENDING_SETUP_TTL_MS {
                debug!(vendor = %front.vendor, "discarding expired pending setup");
                self.pending.pop_front();
            } else {
                break;
            }
        }
    }

    /// Snapshot copy of the currently connected miners.
    pub fn connected_miners(&self) -> Vec<ConnectedMiner> {
        self.miners.values().cloned().collect()
    }

    pub fn get(&self, downstream_id: usize) -> Option<&ConnectedMiner> {
        self.miners.get(&downstream_id)
    }

    /// Remove a miner, returning it if present. Used by the reconciler for
    /// stale eviction in addition to the disconnect log path.
    pub fn remove(&mut self, downstream_id: usize) -> Option<ConnectedMiner> {
        self.miners.remove(&downstream_id)
    }

    /// Clear both the registry and the pending queue. Called when the
    /// supervised process restarts; tracked state is rebuilt from live
    /// signals, never persisted.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.miners.clear();
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETUP: &str = "Received: SetupConnection(protocol: 0, vendor: bitaxe, hardware_version: BM1370, firmware: , device_id: )";
    const OPEN_1: &str = "Received: OpenStandardMiningChannel(user_identity: addr.worker1, nominal_hash_rate: 500000000000, max_target: ffff) downstream_id=1";

    #[test]
    fn setup_then_open_matches_fifo() {
        let mut registry = MinerRegistry::new();
        registry.handle_log_line(SETUP, 1_000);
        registry.handle_log_line(OPEN_1, 2_000);

        let miners = registry.connected_miners();
        assert_eq!(miners.len(), 1);
        let miner = &miners[0];
        assert_eq!(miner.downstream_id, 1);
        assert_eq!(miner.vendor, "bitaxe");
        assert_eq!(miner.hardware_version, "BM1370");
        assert_eq!(miner.firmware, "");
        assert_eq!(miner.user_identity, "addr.worker1");
        assert_eq!(miner.nominal_hashrate, 500_000_000_000.0);
        assert_eq!(registry.pending_len(), 0);
    }

    #[test]
    fn two_setups_match_two_opens_in_order() {
        let mut registry = MinerRegistry::new();
        registry.handle_log_line(
            "Received: SetupConnection(vendor: first, hardware_version: A, firmware: 1, device_id: a)",
            0,
        );
        registry.handle_log_line(
            "Received: SetupConnection(vendor: second, hardware_version: B, firmware: 2, device_id: b)",
            100,
        );
        registry.handle_log_line(
            "Received: OpenStandardMiningChannel(user_identity: u1, nominal_hash_rate: 1000) downstream_id=1",
            200,
        );
        registry.handle_log_line(
            "Received: OpenStandardMiningChannel(user_identity: u2, nominal_hash_rate: 2000) downstream_id=2",
            300,
        );

        let vendor_of = |id: usize, registry: &MinerRegistry| {
            registry.get(id).map(|m| m.vendor.clone()).unwrap_or_default()
        };
        assert_eq!(vendor_of(1, &registry), "first");
        assert_eq!(vendor_of(2, &registry), "second");
    }

    #[test]
    fn expired_setup_is_never_matched() {
        let mut registry = MinerRegistry::new();
        registry.handle_log_line(SETUP, 0);
        // Channel opens 31s later: the queued setup is past its TTL.
        registry.handle_log_line(OPEN_1, PENDING_SETUP_TTL_MS + 1_000);

        let miners = registry.connected_miners();
        assert_eq!(miners.len(), 1);
        assert_eq!(miners[0].vendor, "unknown");
        assert_eq!(miners[0].hardware_version, "");
    }

    #[test]
    fn open_without_setup_uses_unknown_defaults() {
        let mut registry = MinerRegistry::new();
        registry.handle_log_line(OPEN_1, 0);

        let miners = registry.connected_miners();
        assert_eq!(miners.len(), 1);
        assert_eq!(miners[0].vendor, "unknown");
        assert_eq!(miners[0].user_identity, "addr.worker1");
    }

    #[test]
    fn disconnect_removes_matching_miner() {
        let mut registry = MinerRegistry::new();
        registry.handle_log_line(SETUP, 0);
        registry.handle_log_line(OPEN_1, 100);
        registry.handle_log_line("Downstream Some(1) disconnected", 200);
        assert!(registry.connected_miners().is_empty());
    }

    #[test]
    fn disconnect_for_unknown_id_is_a_noop() {
        let mut registry = MinerRegistry::new();
        registry.handle_log_line(SETUP, 0);
        registry.handle_log_line(OPEN_1, 100);
        registry.handle_log_line("Downstream Some(3) disconnected", 200);
        assert_eq!(registry.connected_miners().len(), 1);
    }

    #[test]
    fn channel_open_overwrites_existing_downstream_id() {
        let mut registry = MinerRegistry::new();
        registry.handle_log_line(OPEN_1, 0);
        registry.handle_log_line(
            "Received: OpenStandardMiningChannel(user_identity: other.worker, nominal_hash_rate: 1000) downstream_id=1",
            100,
        );
        let miners = registry.connected_miners();
        assert_eq!(miners.len(), 1);
        assert_eq!(miners[0].user_identity, "other.worker");
    }

    #[test]
    fn reset_clears_registry_and_queue() {
        let mut registry = MinerRegistry::new();
        registry.handle_log_line(SETUP, 0);
        registry.handle_log_line(OPEN_1, 100);
        registry.handle_log_line(SETUP, 200);
        registry.reset();
        assert!(registry.connected_miners().is_empty());
        assert_eq!(registry.pending_len(), 0);
    }
}

//! Downstream miner activity tracking and hashrate estimation for a
//! supervised SV2 mining client.
//!
//! Two independent signal sources feed one consistent view:
//!
//! - **Log stream**: raw log lines from the supervised client binary are
//!   classified ([`log_events`]) and folded into an in-memory registry of
//!   connected miners ([`miner_registry`]). Device metadata and channel
//!   opens are correlated best-effort FIFO, since the log format carries no
//!   shared id between the two lines describing one connection.
//! - **Stats API**: a recurring poll ([`stats_poller`]) of the client's
//!   monitoring HTTP API rebuilds per-channel snapshots each cycle and
//!   feeds cumulative-work ring buffers from which instantaneous hashrate
//!   is derived ([`hashrate`]).
//!
//! The [`reconciler`] joins both sides on demand, evicting miners with no
//! corroborating recent activity from either source. All tracked state is
//! memory-resident and rebuilt from live signals after a restart.

use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::broadcast;
use tracing::info;

pub mod config;
pub mod error;
pub mod hashrate;
pub mod log_events;
pub mod miner_registry;
pub mod reconciler;
pub mod stats_api;
pub mod stats_poller;

pub use config::ActivityMonitorConfig;
pub use error::ActivityError;
pub use hashrate::HashratePoint;
pub use log_events::LogEvent;
pub use miner_registry::ConnectedMiner;
pub use reconciler::{Dashboard, EnrichedMinerView, PoolStatus};
pub use stats_api::GlobalInfo;
pub use stats_poller::ChannelSnapshot;

use stats_poller::{lock, ActivityState};

const SHUTDOWN_BROADCAST_CAPACITY: usize = 8;

/// Current Unix time in milliseconds.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Supervision core for one SV2 client process.
///
/// Constructed once at startup and injected into whatever consumes it; the
/// query API is synchronous, read-only and never performs I/O. `start`
/// spawns the recurring stats poll; `stop` (or dropping the last clone)
/// shuts it down.
#[derive(Clone)]
pub struct ActivityMonitor {
    config: ActivityMonitorConfig,
    state: Arc<Mutex<ActivityState>>,
    notify_shutdown: broadcast::Sender<()>,
}

impl ActivityMonitor {
    pub fn new(config: ActivityMonitorConfig) -> Self {
        let (notify_shutdown, _) = broadcast::channel(SHUTDOWN_BROADCAST_CAPACITY);
        Self {
            config,
            state: Arc::new(Mutex::new(ActivityState::new())),
            notify_shutdown,
        }
    }

    /// Start the recurring stats poll task.
    pub fn start(&self) {
        info!(
            interval_secs = self.config.poll_interval().as_secs(),
            configured = self.config.monitoring_base_url().is_some(),
            "starting stats poller"
        );
        let state = Arc::clone(&self.state);
        let config = self.config.clone();
        let shutdown = self.notify_shutdown.subscribe();
        tokio::spawn(stats_poller::run_poll_loop(state, config, shutdown));
    }

    /// Stop the recurring poll task. The query API keeps serving the last
    /// tracked state.
    pub fn stop(&self) {
        let _ = self.notify_shutdown.send(());
    }

    /// Feed one raw log line from the supervised process. Synchronous and
    /// infallible; unrecognized lines are silently ignored.
    pub fn handle_log_line(&self, line: &str) {
        lock(&self.state).registry.handle_log_line(line, now_ms());
    }

    /// Clear the miner registry and pending-setup queue. Called when the
    /// supervised process restarts; state is rebuilt from live signals.
    pub fn reset(&self) {
        info!("resetting tracked miner state");
        lock(&self.state).registry.reset();
    }

    /// Snapshot copy of the currently connected miners.
    pub fn connected_miners(&self) -> Vec<ConnectedMiner> {
        lock(&self.state).registry.connected_miners()
    }

    /// Connected miners joined with their latest channel statistics; stale
    /// miners are evicted as a side effect (see [`reconciler`]).
    pub fn enriched_miners(&self) -> Vec<EnrichedMinerView> {
        reconciler::enriched_miners(&mut lock(&self.state), now_ms())
    }

    /// Aggregate dashboard view.
    pub fn dashboard(&self) -> Dashboard {
        reconciler::dashboard(
            &mut lock(&self.state),
            self.config.solo_mining(),
            self.config.monitoring_base_url().is_some(),
            now_ms(),
        )
    }

    /// Snapshot copy of the aggregate hashrate series.
    pub fn global_hashrate_history(&self) -> Vec<HashratePoint> {
        reconciler::global_hashrate_history(&lock(&self.state))
    }

    /// Snapshot copy of one channel's hashrate series, keyed
    /// `clientId:channelId`. Empty when the key is unknown.
    pub fn miner_hashrate_history(&self, key: &str) -> Vec<HashratePoint> {
        reconciler::miner_hashrate_history(&lock(&self.state), key)
    }

    /// Whether the last poll cycle reached the monitoring endpoint.
    pub fn monitoring_reachable(&self) -> bool {
        lock(&self.state).monitoring_reachable
    }
}

impl Drop for ActivityMonitor {
    fn drop(&mut self) {
        let _ = self.notify_shutdown.send(());
    }
}

//! Recurring poll of the monitoring API and channel snapshot maintenance.
//!
//! One cycle fetches the global summary, the clients listing, and each
//! client's channels, then rebuilds the channel-snapshot map wholesale.
//! Partial failure degrades rather than aborts: a failed global fetch fails
//! the whole cycle (status goes unreachable, current data is cleared, ring
//! history is kept), a failed clients listing keeps the previous snapshot
//! map, and a failed per-client channel fetch skips only that client.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use serde::Serialize;

use crate::config::ActivityMonitorConfig;
use crate::hashrate::{HashratePoint, SampleRing, ShareWorkSample};
use crate::miner_registry::MinerRegistry;
use crate::now_ms;
use crate::stats_api::{ClientChannels, GlobalInfo, StatsClient};

/// Point-in-time statistics for one standard channel. Rebuilt wholesale
/// every successful cycle, never merged field-by-field, so one snapshot
/// never mixes data from two polling generations.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelSnapshot {
    pub client_id: usize,
    pub channel_id: u32,
    pub user_identity: String,
    pub shares_accepted: u32,
    pub best_diff: f64,
    pub share_work_sum: f64,
    pub expected_shares_per_minute: f64,
    pub current_hashrate: f64,
}

/// Re-entrancy tag for the poll loop: a tick that fires while a cycle is
/// still in flight is skipped, not queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PollerState {
    Idle,
    Polling,
}

/// All mutable monitoring state, guarded by one mutex with single-writer
/// discipline: the poll task writes snapshots and series, the log ingest
/// path writes only the registry, and readers never observe a snapshot map
/// mid-replace.
pub(crate) struct ActivityState {
    pub registry: MinerRegistry,
    /// `clientId:channelId` → latest snapshot.
    pub snapshots: HashMap<String, ChannelSnapshot>,
    pub global: Option<GlobalInfo>,
    pub monitoring_reachable: bool,
    pub channel_series: HashMap<String, SampleRing<ShareWorkSample>>,
    pub channel_hashrate_history: HashMap<String, SampleRing<HashratePoint>>,
    pub global_hashrate_history: SampleRing<HashratePoint>,
    pub poller: PollerState,
}

impl ActivityState {
    pub fn new() -> Self {
        Self {
            registry: MinerRegistry::new(),
            snapshots: HashMap::new(),
            global: None,
            monitoring_reachable: false,
            channel_series: HashMap::new(),
            channel_hashrate_history: HashMap::new(),
            global_hashrate_history: SampleRing::new(),
            poller: PollerState::Idle,
        }
    }
}

pub(crate) fn channel_key(client_id: usize, channel_id: u32) -> String {
    format!("{client_id}:{channel_id}")
}

/// Mark the state as polling. Returns `false` when a cycle is already in
/// flight, in which case the caller skips its tick; ticks are never queued.
pub(crate) fn try_begin_cycle(state: &mut ActivityState) -> bool {
    if state.poller == PollerState::Polling {
        return false;
    }
    state.poller = PollerState::Polling;
    true
}

/// Outcome of the network half of one poll cycle. Fetching happens without
/// holding the state lock; [`apply_cycle`] folds the outcome in afterwards.
pub(crate) enum CycleOutcome {
    /// No monitoring address is configured.
    Unconfigured,
    /// The global endpoint failed; the whole cycle is failed.
    GlobalFailed,
    /// Global succeeded. `channels` is `None` when the clients listing
    /// failed (previous snapshots are kept), otherwise it carries every
    /// successfully fetched client.
    Fetched {
        global: GlobalInfo,
        channels: Option<Vec<(usize, ClientChannels)>>,
    },
}

pub(crate) async fn fetch_cycle(client: &StatsClient) -> CycleOutcome {
    let global = match client.global().await {
        Ok(global) => global,
        Err(e) => {
            warn!(error = %e, "global stats fetch failed, marking monitoring unreachable");
            return CycleOutcome::GlobalFailed;
        }
    };

    let page = match client.clients().await {
        Ok(page) => page,
        Err(e) => {
            warn!(error = %e, "clients listing failed, keeping previous channel snapshots");
            return CycleOutcome::Fetched {
                global,
                channels: None,
            };
        }
    };

    let mut channels = Vec::with_capacity(page.items.len());
    for meta in &page.items {
        match client.client_channels(meta.client_id).await {
            Ok(client_channels) => channels.push((meta.client_id, client_channels)),
            Err(e) => {
                // Isolated failure: skip this client, keep the rest of the
                // cycle going.
                warn!(client_id = meta.client_id, error = %e, "channel fetch failed for one client, skipping");
            }
        }
    }

    CycleOutcome::Fetched {
        global,
        channels: Some(channels),
    }
}

/// Fold one cycle outcome into the shared state.
pub(crate) fn apply_cycle(state: &mut ActivityState, outcome: CycleOutcome, now_ms: u64) {
    match outcome {
        CycleOutcome::Unconfigured => {
            state.monitoring_reachable = false;
        }
        CycleOutcome::GlobalFailed => {
            // Current data is dropped but ring history survives, so a
            // transient outage does not discard the time series.
            state.monitoring_reachable = false;
            state.global = None;
            state.snapshots.clear();
        }
        CycleOutcome::Fetched { global, channels } => {
            if !state.monitoring_reachable {
                info!("monitoring endpoint reachable");
            }
            state.monitoring_reachable = true;
            state.global = Some(global);

            let Some(channels) = channels else {
                return;
            };

            let mut new_snapshots = HashMap::new();
            let mut cycle_total = 0.0;

            for (client_id, client_channels) in channels {
                for channel in client_channels.standard_channels {
                    let key = channel_key(client_id, channel.channel_id);

                    let series = state.channel_series.entry(key.clone()).or_default();
                    series.push(ShareWorkSample {
                        timestamp_ms: now_ms,
                        share_work_sum: channel.share_work_sum,
                    });
                    let hashrate = series.windowed_hashrate(now_ms);

                    state
                        .channel_hashrate_history
                        .entry(key.clone())
                        .or_default()
                        .push(HashratePoint {
                            timestamp_ms: now_ms,
                            hashrate,
                        });
                    cycle_total += hashrate;

                    new_snapshots.insert(
                        key,
                        ChannelSnapshot {
                            client_id,
                            channel_id: channel.channel_id,
                            user_identity: channel.user_identity,
                            shares_accepted: channel.shares_accepted,
                            best_diff: channel.best_diff,
                            share_work_sum: channel.share_work_sum,
                            expected_shares_per_minute: channel.expected_shares_per_minute,
                            current_hashrate: hashrate,
                        },
                    );
                }
            }

            state.global_hashrate_history.push(HashratePoint {
                timestamp_ms: now_ms,
                hashrate: cycle_total,
            });

            // Drop series for channels that disappeared from this cycle.
            state
                .channel_series
                .retain(|key, _| new_snapshots.contains_key(key));
            state
                .channel_hashrate_history
                .retain(|key, _| new_snapshots.contains_key(key));

            state.snapshots = new_snapshots;
        }
    }
}

/// Run the recurring poll until the shutdown signal arrives.
pub(crate) async fn run_poll_loop(
    state: Arc<Mutex<ActivityState>>,
    config: ActivityMonitorConfig,
    mut shutdown: broadcast::Receiver<()>,
) {
    let client = match config.monitoring_base_url() {
        Some(base_url) => match StatsClient::new(base_url) {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(error = %e, "failed to build HTTP client, poller will idle");
                None
            }
        },
        None => {
            info!("no monitoring address configured, poller will idle");
            None
        }
    };

    let mut interval = tokio::time::interval(config.poll_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!("stats poller shutting down");
                break;
            }
            _ = interval.tick() => {
                {
                    let mut state = lock(&state);
                    if !try_begin_cycle(&mut state) {
                        debug!("previous poll cycle still running, skipping tick");
                        continue;
                    }
                }

                let outcome = match &client {
                    Some(client) => fetch_cycle(client).await,
                    None => CycleOutcome::Unconfigured,
                };

                let now = now_ms();
                let mut state = lock(&state);
                apply_cycle(&mut state, outcome, now);
                state.poller = PollerState::Idle;
            }
        }
    }
}

/// A poisoned lock only means another thread panicked mid-update; the
/// monitor keeps serving its last consistent view rather than propagating
/// the panic out of the poll task.
pub(crate) fn lock(state: &Mutex<ActivityState>) -> std::sync::MutexGuard<'_, ActivityState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

//! Log line classification for the supervised SV2 client.
//!
//! The client binary reports connection lifecycle as plain log text. Three
//! forms are recognized; everything else is ignored without error. The SV2
//! log format carries no transaction id linking the `SetupConnection` line
//! to the `OpenStandardMiningChannel` line of the same connection, so
//! callers correlate the two best-effort (FIFO, see
//! [`crate::miner_registry`]).

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// A classified log line from the supervised client.
#[derive(Debug, Clone, PartialEq)]
pub enum LogEvent {
    /// `Received: SetupConnection(...)` — device metadata, no channel yet.
    SetupConnection {
        vendor: String,
        hardware_version: String,
        firmware: String,
        device_id: String,
    },
    /// `Received: OpenStandardMiningChannel(...) downstream_id=<n>`
    ChannelOpen {
        user_identity: String,
        nominal_hashrate: f64,
        downstream_id: usize,
    },
    /// Either disconnect form carrying a downstream id.
    Disconnect { downstream_id: usize },
}

static SETUP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"Received: SetupConnection\(.*?vendor:\s*([^,)]*).*?hardware_version:\s*([^,)]*).*?firmware:\s*([^,)]*).*?device_id:\s*([^,)]*)",
    )
    .expect("setup pattern is valid")
});

static CHANNEL_OPEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"Received: OpenStandardMiningChannel\(.*?user_identity:\s*([^,)]*).*?nominal_hash_rate:\s*([0-9.eE+-]+).*?downstream_id=(\d+)",
    )
    .expect("channel open pattern is valid")
});

static DISCONNECT_SOME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Downstream Some\((\d+)\) disconnected").expect("pattern is valid"));

static DISCONNECT_REMOVE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"downstream_id=(\d+).*removing downstream").expect("pattern is valid")
});

/// Classify one log line.
///
/// The three patterns are mutually exclusive and tried in fixed order;
/// first match wins. Unrecognized or malformed lines yield `None`.
pub fn parse_log_line(line: &str) -> Option<LogEvent> {
    if let Some(caps) = SETUP_RE.captures(line) {
        return Some(LogEvent::SetupConnection {
            vendor: field(&caps, 1),
            hardware_version: field(&caps, 2),
            firmware: field(&caps, 3),
            device_id: field(&caps, 4),
        });
    }

    if let Some(caps) = CHANNEL_OPEN_RE.captures(line) {
        let nominal_hashrate = caps.get(2)?.as_str().parse().unwrap_or(0.0);
        let downstream_id = caps.get(3)?.as_str().parse().ok()?;
        return Some(LogEvent::ChannelOpen {
            user_identity: field(&caps, 1),
            nominal_hashrate,
            downstream_id,
        });
    }

    if let Some(caps) = DISCONNECT_SOME_RE
        .captures(line)
        .or_else(|| DISCONNECT_REMOVE_RE.captures(line))
    {
        let downstream_id = caps.get(1)?.as_str().parse().ok()?;
        return Some(LogEvent::Disconnect { downstream_id });
    }

    None
}

fn field(caps: &Captures<'_>, idx: usize) -> String {
    caps.get(idx)
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

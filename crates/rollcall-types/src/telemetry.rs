use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Round trip of one frame from transmission to its accepted annotations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencySample {
    pub seq: u64,
    pub round_trip_ms: u64,
    pub captured_at: DateTime<Utc>,
}

/// Counters kept by the capture/annotate loop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopStats {
    pub frames_sent: u64,
    pub ticks_not_ready: u64,
    pub frames_dropped: u64,
    pub sets_accepted: u64,
    pub sets_stale: u64,
    pub sets_untagged: u64,
    pub in_flight_abandoned: u64,
    pub in_flight_expired: u64,
}

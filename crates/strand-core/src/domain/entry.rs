//! Queue entries as seen by consumers and by pending-entry inspection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EntryId;

/// One entry handed out by `read_new` or `reclaim_stale`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub id: EntryId,
    pub payload: Vec<u8>,

    /// How many times this entry has been delivered, including this delivery.
    pub delivery_count: u32,
}

/// Ownership record of a delivered-but-unacknowledged entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEntry {
    pub entry_id: EntryId,
    pub owner: String,
    pub last_delivered_at: DateTime<Utc>,
    pub delivery_count: u32,
}

impl PendingEntry {
    /// Time since the last delivery, clamped at zero.
    pub fn idle(&self, now: DateTime<Utc>) -> chrono::Duration {
        (now - self.last_delivered_at).max(chrono::Duration::zero())
    }
}

/// Where a newly created group starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartPosition {
    /// Deliver everything already in the log (`0`).
    Beginning,

    /// Deliver only entries appended after creation (`$`).
    #[default]
    Latest,
}

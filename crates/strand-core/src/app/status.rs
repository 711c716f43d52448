//! Status - consumer の状態とイテレーションごとの集計

use serde::{Deserialize, Serialize};

/// Consumer lifecycle.
///
/// State transitions:
/// - Init -> Registered (group created + consumer registered)
/// - Registered -> Running (loop started)
/// - Running -> ShutDown (shutdown observed between iterations)
///
/// Registration failure leaves the consumer in `Init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerState {
    Init,
    Registered,
    Running,
    ShutDown,
}

impl ConsumerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ConsumerState::ShutDown)
    }
}

/// Which store call an iteration made. Never both in the same iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    ReadNew,
    Reclaim,
}

/// Outcome of one consumer iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationReport {
    pub pass: PassKind,
    /// Entries returned by the store.
    pub fetched: usize,
    /// Entries whose handler succeeded.
    pub handled: usize,
    /// Entries removed by the batch delete.
    pub acked: usize,
    pub decode_failures: usize,
    pub handler_failures: usize,
    /// The store call failed and the iteration was abandoned.
    pub store_error: bool,
}

impl IterationReport {
    pub(crate) fn new(pass: PassKind) -> Self {
        Self {
            pass,
            fetched: 0,
            handled: 0,
            acked: 0,
            decode_failures: 0,
            handler_failures: 0,
            store_error: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fetched == 0
    }
}

/// Running totals over a consumer's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerStats {
    pub iterations: u64,
    pub reclaim_passes: u64,
    pub fetched: u64,
    pub acked: u64,
    pub decode_failures: u64,
    pub handler_failures: u64,
    pub store_errors: u64,
}

impl ConsumerStats {
    pub(crate) fn record(&mut self, report: &IterationReport) {
        self.iterations += 1;
        if report.pass == PassKind::Reclaim {
            self.reclaim_passes += 1;
        }
        self.fetched += report.fetched as u64;
        self.acked += report.acked as u64;
        self.decode_failures += report.decode_failures as u64;
        self.handler_failures += report.handler_failures as u64;
        if report.store_error {
            self.store_errors += 1;
        }
    }
}

/// Outcome of one delayed-scheduler pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionReport {
    /// Members returned by `pop_ready`.
    pub ready: usize,
    /// Members appended to the live queue.
    pub promoted: usize,
    /// Appended but not removed from the delay set (will be promoted again).
    pub remove_failures: usize,
    pub store_error: bool,
}

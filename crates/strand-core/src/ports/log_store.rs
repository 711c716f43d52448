//! LogStore port - 追記専用ログ + consumer group
//!
//! consumer 同士はロックを持ちません。同期点はこのストアだけです。
//! 「pending エントリの所有者は常に高々 1 人」という性質は、
//! `read_new` と `reclaim_stale` の原子性によって実装側が保証します。
//!
//! # 実装
//! - **InMemoryLogStore**: 開発用・テスト用（`impls::inmem_log`）

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::{EntryId, PendingEntry, QueueEntry, StartPosition, StoreError};

/// Append-only log per queue with group-based delivery tracking.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Append one payload. Ids are strictly increasing per queue.
    async fn append(&self, queue: &str, payload: &[u8]) -> Result<EntryId, StoreError>;

    /// Create `group` on `queue`, creating the queue if needed.
    ///
    /// Idempotent: creating an existing group succeeds. Backends that cannot
    /// express this may return [`StoreError::GroupAlreadyExists`] instead.
    async fn create_group(
        &self,
        queue: &str,
        group: &str,
        start: StartPosition,
    ) -> Result<(), StoreError>;

    /// Idempotent identity registration of `consumer` inside `group`.
    async fn register_consumer(
        &self,
        queue: &str,
        group: &str,
        consumer: &str,
    ) -> Result<(), StoreError>;

    /// Up to `limit` entries never delivered to this group before.
    ///
    /// Returned entries become pending and owned by `consumer`. Blocks up to
    /// `block` when nothing is available and then returns an empty batch.
    async fn read_new(
        &self,
        queue: &str,
        group: &str,
        consumer: &str,
        limit: usize,
        block: Duration,
    ) -> Result<Vec<QueueEntry>, StoreError>;

    /// Reassign up to `limit` pending entries idle for at least `min_idle` to
    /// `consumer` and bump their delivery count.
    ///
    /// Atomic with respect to concurrent calls: an entry is never returned to
    /// two overlapping callers.
    async fn reclaim_stale(
        &self,
        queue: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        limit: usize,
    ) -> Result<Vec<QueueEntry>, StoreError>;

    /// Remove entries from the log and from pending tracking. This is the
    /// acknowledgment.
    ///
    /// Deleting from the log means one queue supports a single consumer
    /// group: a second group would lose entries the first one acknowledged.
    /// Returns how many entries were actually removed.
    async fn delete(&self, queue: &str, ids: &[EntryId]) -> Result<usize, StoreError>;

    /// Number of entries still in the log.
    async fn len(&self, queue: &str) -> Result<usize, StoreError>;

    /// Pending entries of `group`, ascending by id.
    async fn pending(&self, queue: &str, group: &str) -> Result<Vec<PendingEntry>, StoreError>;
}

//! InMemoryLogStore - 開発用・テスト用のログストア
//!
//! # 実装詳細
//! - queue ごとに `BTreeMap<EntryId, payload>` で追記順を保持
//! - group ごとに配送カーソルと pending 表を持つ
//! - 状態全体を 1 つの Mutex で守る（read_new / reclaim_stale が互いに原子的になる）
//! - Notify で append 時に blocking read を起こす
//!
//! アイドル時間は注入された Clock で測ります。テストでは FixedClock を進めるだけで
//! reclaim の閾値を越えられます。

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::domain::{EntryId, PendingEntry, QueueEntry, StartPosition, StoreError};
use crate::ports::{Clock, LogStore, SystemClock};

#[derive(Debug, Default)]
struct GroupState {
    /// Highest id ever delivered to this group.
    cursor: EntryId,
    consumers: BTreeSet<String>,
    pending: BTreeMap<EntryId, PendingEntry>,
}

#[derive(Debug, Default)]
struct QueueLog {
    entries: BTreeMap<EntryId, Vec<u8>>,
    last_id: EntryId,
    groups: HashMap<String, GroupState>,
}

impl QueueLog {
    fn group_mut(&mut self, queue: &str, group: &str) -> Result<&mut GroupState, StoreError> {
        self.groups.get_mut(group).ok_or_else(|| StoreError::NoSuchGroup {
            queue: queue.to_string(),
            group: group.to_string(),
        })
    }
}

#[derive(Debug, Default)]
struct InMemoryLogState {
    queues: HashMap<String, QueueLog>,
}

impl InMemoryLogState {
    fn queue_mut(&mut self, queue: &str, group: &str) -> Result<&mut QueueLog, StoreError> {
        self.queues
            .get_mut(queue)
            .ok_or_else(|| StoreError::NoSuchGroup {
                queue: queue.to_string(),
                group: group.to_string(),
            })
    }
}

/// In-memory [`LogStore`].
///
/// Cheap to share behind an `Arc`; every consumer, producer and scheduler in a
/// test or demo points at the same instance.
pub struct InMemoryLogStore {
    state: Mutex<InMemoryLogState>,
    notify: Notify,
    clock: Arc<dyn Clock>,
    unavailable: AtomicBool,
}

impl InMemoryLogStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(InMemoryLogState::default()),
            notify: Notify::new(),
            clock,
            unavailable: AtomicBool::new(false),
        }
    }

    /// Fault injection: while set, every operation fails with
    /// [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store marked unavailable".into()));
        }
        Ok(())
    }

    fn now_ms(&self) -> u64 {
        self.clock.now_millis().max(0) as u64
    }
}

impl Default for InMemoryLogStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LogStore for InMemoryLogStore {
    async fn append(&self, queue: &str, payload: &[u8]) -> Result<EntryId, StoreError> {
        self.check_available()?;
        let id = {
            let mut state = self.state.lock().await;
            let log = state.queues.entry(queue.to_string()).or_default();
            let id = log.last_id.next_after(self.now_ms());
            log.last_id = id;
            log.entries.insert(id, payload.to_vec());
            id
        };

        // Wake blocked readers outside the lock
        self.notify.notify_waiters();
        Ok(id)
    }

    async fn create_group(
        &self,
        queue: &str,
        group: &str,
        start: StartPosition,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let log = state.queues.entry(queue.to_string()).or_default();
        if log.groups.contains_key(group) {
            return Ok(());
        }
        let cursor = match start {
            StartPosition::Beginning => EntryId::MIN,
            StartPosition::Latest => log.last_id,
        };
        log.groups.insert(
            group.to_string(),
            GroupState {
                cursor,
                ..GroupState::default()
            },
        );
        Ok(())
    }

    async fn register_consumer(
        &self,
        queue: &str,
        group: &str,
        consumer: &str,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let group_state = state.queue_mut(queue, group)?.group_mut(queue, group)?;
        group_state.consumers.insert(consumer.to_string());
        Ok(())
    }

    async fn read_new(
        &self,
        queue: &str,
        group: &str,
        consumer: &str,
        limit: usize,
        block: Duration,
    ) -> Result<Vec<QueueEntry>, StoreError> {
        let deadline = Instant::now() + block;
        loop {
            self.check_available()?;

            let notified = self.notify.notified();
            tokio::pin!(notified);
            {
                let mut state = self.state.lock().await;
                let now = self.clock.now();
                let log = state.queue_mut(queue, group)?;
                let QueueLog { entries, groups, .. } = log;
                let group_state = groups.get_mut(group).ok_or_else(|| StoreError::NoSuchGroup {
                    queue: queue.to_string(),
                    group: group.to_string(),
                })?;

                let batch: Vec<QueueEntry> = entries
                    .range((Bound::Excluded(group_state.cursor), Bound::Unbounded))
                    .take(limit)
                    .map(|(id, payload)| QueueEntry {
                        id: *id,
                        payload: payload.clone(),
                        delivery_count: 1,
                    })
                    .collect();

                if !batch.is_empty() || limit == 0 {
                    group_state.consumers.insert(consumer.to_string());
                    for entry in &batch {
                        group_state.cursor = entry.id;
                        group_state.pending.insert(
                            entry.id,
                            PendingEntry {
                                entry_id: entry.id,
                                owner: consumer.to_string(),
                                last_delivered_at: now,
                                delivery_count: 1,
                            },
                        );
                    }
                    return Ok(batch);
                }

                // Register interest before releasing the lock so an append
                // between unlock and await is not missed.
                notified.as_mut().enable();
            }

            if Instant::now() >= deadline {
                return Ok(Vec::new());
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(deadline) => return Ok(Vec::new()),
            }
        }
    }

    async fn reclaim_stale(
        &self,
        queue: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        limit: usize,
    ) -> Result<Vec<QueueEntry>, StoreError> {
        self.check_available()?;
        let min_idle = chrono::Duration::from_std(min_idle).unwrap_or(chrono::Duration::MAX);

        let mut state = self.state.lock().await;
        let now = self.clock.now();
        let log = state.queue_mut(queue, group)?;
        let QueueLog { entries, groups, .. } = log;
        let group_state = groups.get_mut(group).ok_or_else(|| StoreError::NoSuchGroup {
            queue: queue.to_string(),
            group: group.to_string(),
        })?;
        group_state.consumers.insert(consumer.to_string());

        let mut claimed = Vec::new();
        for pending in group_state.pending.values_mut() {
            if claimed.len() >= limit {
                break;
            }
            if pending.idle(now) < min_idle {
                continue;
            }
            let Some(payload) = entries.get(&pending.entry_id) else {
                continue;
            };
            pending.owner = consumer.to_string();
            pending.last_delivered_at = now;
            pending.delivery_count += 1;
            claimed.push(QueueEntry {
                id: pending.entry_id,
                payload: payload.clone(),
                delivery_count: pending.delivery_count,
            });
        }
        Ok(claimed)
    }

    async fn delete(&self, queue: &str, ids: &[EntryId]) -> Result<usize, StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let Some(log) = state.queues.get_mut(queue) else {
            return Ok(0);
        };

        let mut removed = 0;
        for id in ids {
            if log.entries.remove(id).is_some() {
                removed += 1;
            }
            for group_state in log.groups.values_mut() {
                group_state.pending.remove(id);
            }
        }
        Ok(removed)
    }

    async fn len(&self, queue: &str) -> Result<usize, StoreError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state.queues.get(queue).map_or(0, |log| log.entries.len()))
    }

    async fn pending(&self, queue: &str, group: &str) -> Result<Vec<PendingEntry>, StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let group_state = state.queue_mut(queue, group)?.group_mut(queue, group)?;
        Ok(group_state.pending.values().cloned().collect())
    }
}

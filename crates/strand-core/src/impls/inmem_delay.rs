//! InMemoryDelaySet - 開発用の遅延セット
//!
//! # 実装詳細
//! - `BTreeSet<(score, key)>` でスコア順（同点は key の辞書順）
//! - key → (score, payload) の索引で key 指定の削除・上書きを O(log n) に
//! - `pop_ready` は取り出したメンバーのスコアを `max_score + claim_lease` に
//!   付け替える（他の promoter から一時的に見えなくなる）
//!
//! promoter が append 後に remove する前に落ちても、lease が切れればメンバーは
//! 再び ready になります。つまり昇格は at-least-once です。

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{DelayedEntry, ReadyScore, StoreError};
use crate::ports::DelaySet;

/// Default time a popped member stays hidden from other promoters.
pub const DEFAULT_CLAIM_LEASE: Duration = Duration::from_secs(30);

#[derive(Debug, Default)]
struct ScoredSet {
    order: BTreeSet<(ReadyScore, String)>,
    members: HashMap<String, (ReadyScore, Vec<u8>)>,
}

impl ScoredSet {
    fn upsert(&mut self, score: ReadyScore, key: &str, payload: Vec<u8>) {
        if let Some((old_score, _)) = self.members.get(key) {
            self.order.remove(&(*old_score, key.to_string()));
        }
        self.order.insert((score, key.to_string()));
        self.members.insert(key.to_string(), (score, payload));
    }

    fn remove(&mut self, key: &str) -> bool {
        match self.members.remove(key) {
            Some((score, _)) => {
                self.order.remove(&(score, key.to_string()));
                true
            }
            None => false,
        }
    }
}

pub struct InMemoryDelaySet {
    sets: Mutex<HashMap<String, ScoredSet>>,
    claim_lease: Duration,
    unavailable: AtomicBool,
}

impl InMemoryDelaySet {
    pub fn new() -> Self {
        Self::with_claim_lease(DEFAULT_CLAIM_LEASE)
    }

    pub fn with_claim_lease(claim_lease: Duration) -> Self {
        Self {
            sets: Mutex::new(HashMap::new()),
            claim_lease,
            unavailable: AtomicBool::new(false),
        }
    }

    /// Fault injection, same as `InMemoryLogStore::set_unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory delay set marked unavailable".into()));
        }
        Ok(())
    }

    /// Current score of `key`, if present (for inspection and tests).
    pub async fn score_of(&self, set: &str, key: &str) -> Option<ReadyScore> {
        let sets = self.sets.lock().await;
        sets.get(set)
            .and_then(|s| s.members.get(key))
            .map(|(score, _)| *score)
    }
}

impl Default for InMemoryDelaySet {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DelaySet for InMemoryDelaySet {
    async fn insert(
        &self,
        set: &str,
        score: ReadyScore,
        key: &str,
        payload: &[u8],
    ) -> Result<(), StoreError> {
        self.check_available()?;
        let mut sets = self.sets.lock().await;
        sets.entry(set.to_string())
            .or_default()
            .upsert(score, key, payload.to_vec());
        Ok(())
    }

    async fn pop_ready(
        &self,
        set: &str,
        max_score: ReadyScore,
        limit: usize,
    ) -> Result<Vec<DelayedEntry>, StoreError> {
        self.check_available()?;
        let mut sets = self.sets.lock().await;
        let Some(scored) = sets.get_mut(set) else {
            return Ok(Vec::new());
        };

        let ready: Vec<(ReadyScore, String)> = scored
            .order
            .iter()
            .take_while(|(score, _)| *score <= max_score)
            .take(limit)
            .cloned()
            .collect();

        let claimed_score = max_score.saturating_add(self.claim_lease);
        let mut out = Vec::with_capacity(ready.len());
        for (score, key) in ready {
            let Some((_, payload)) = scored.members.get(&key) else {
                continue;
            };
            let payload = payload.clone();
            scored.upsert(claimed_score, &key, payload.clone());
            out.push(DelayedEntry {
                key,
                payload,
                score,
            });
        }
        Ok(out)
    }

    async fn remove(&self, set: &str, key: &str) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut sets = self.sets.lock().await;
        Ok(sets.get_mut(set).is_some_and(|s| s.remove(key)))
    }

    async fn len(&self, set: &str) -> Result<usize, StoreError> {
        self.check_available()?;
        let sets = self.sets.lock().await;
        Ok(sets.get(set).map_or(0, |s| s.members.len()))
    }
}

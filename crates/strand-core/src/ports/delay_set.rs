//! DelaySet port - スコア順の集合（遅延タスク用）
//!
//! メンバーは一意な key で識別します。payload の一致では削除しません。
//! 同じ内容の遅延タスクが 2 つあっても、key が違えば別物です。

use async_trait::async_trait;

use crate::domain::{DelayedEntry, ReadyScore, StoreError};

#[async_trait]
pub trait DelaySet: Send + Sync {
    /// Insert or replace the member `key` with the given score and payload.
    async fn insert(
        &self,
        set: &str,
        score: ReadyScore,
        key: &str,
        payload: &[u8],
    ) -> Result<(), StoreError>;

    /// Up to `limit` members with score <= `max_score`, ascending by score and
    /// then by key.
    ///
    /// Implementations may hide returned members from other callers for a
    /// while (a claim), so that competing promoters do not pick the same
    /// member. A claimed member that is never removed becomes ready again.
    async fn pop_ready(
        &self,
        set: &str,
        max_score: ReadyScore,
        limit: usize,
    ) -> Result<Vec<DelayedEntry>, StoreError>;

    /// Remove by key. Returns whether a member was removed.
    async fn remove(&self, set: &str, key: &str) -> Result<bool, StoreError>;

    async fn len(&self, set: &str) -> Result<usize, StoreError>;
}

//! Domain identifiers.
//!
//! 2 種類の ID を区別します。
//! - **EntryId**: ストアが採番するログ上の位置（単調増加）
//! - **TaskId**: 呼び出し側が付与するタスクの識別子（ランダムなトークン）
//!
//! 両者は独立しています。同じ TaskId のタスクが再投入されれば、
//! 別の EntryId を持つ別エントリになります。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Store-assigned position of an entry in a queue log.
///
/// Rendered as `"<ms>-<seq>"`. Ordering is `(ms, seq)` so ids compare in
/// append order. The default is [`EntryId::MIN`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId {
    ms: u64,
    seq: u64,
}

impl EntryId {
    /// The smallest possible id (`0-0`).
    pub const MIN: EntryId = EntryId { ms: 0, seq: 0 };

    pub fn new(ms: u64, seq: u64) -> Self {
        Self { ms, seq }
    }

    pub fn ms(&self) -> u64 {
        self.ms
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Next id strictly greater than `self`, given the current wall time.
    ///
    /// If the clock stalled or went backwards, the millisecond part is kept
    /// and the sequence is bumped.
    pub fn next_after(&self, now_ms: u64) -> Self {
        if now_ms > self.ms {
            Self { ms: now_ms, seq: 0 }
        } else {
            Self {
                ms: self.ms,
                seq: self.seq + 1,
            }
        }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid entry id '{0}', expected '<ms>-<seq>'")]
pub struct ParseEntryIdError(String);

impl FromStr for EntryId {
    type Err = ParseEntryIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ms, seq) = s
            .split_once('-')
            .ok_or_else(|| ParseEntryIdError(s.to_string()))?;
        let ms = ms.parse().map_err(|_| ParseEntryIdError(s.to_string()))?;
        let seq = seq.parse().map_err(|_| ParseEntryIdError(s.to_string()))?;
        Ok(Self { ms, seq })
    }
}

impl Serialize for EntryId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EntryId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Caller-assigned task identifier.
///
/// Opaque to the queue. It also keys delayed tasks, so two delayed tasks with
/// identical payloads stay distinct as long as their ids differ.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Fresh random id (ULID text form).
    pub fn generate() -> Self {
        Self::from(Ulid::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<Ulid> for TaskId {
    fn from(ulid: Ulid) -> Self {
        Self(ulid.to_string())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn entry_ids_order_by_ms_then_seq() {
        let a = EntryId::new(10, 5);
        let b = EntryId::new(11, 0);
        let c = EntryId::new(11, 1);
        assert!(a < b);
        assert!(b < c);
        assert!(EntryId::MIN < a);
    }

    #[rstest]
    #[case::clock_advanced(EntryId::new(100, 3), 150, EntryId::new(150, 0))]
    #[case::same_ms(EntryId::new(100, 3), 100, EntryId::new(100, 4))]
    #[case::clock_went_back(EntryId::new(100, 3), 90, EntryId::new(100, 4))]
    fn next_after_is_strictly_greater(
        #[case] last: EntryId,
        #[case] now_ms: u64,
        #[case] expected: EntryId,
    ) {
        let next = last.next_after(now_ms);
        assert_eq!(next, expected);
        assert!(next > last);
    }

    #[test]
    fn entry_id_display_and_parse() {
        let id = EntryId::new(1_700_000_000_000, 7);
        let text = id.to_string();
        assert_eq!(text, "1700000000000-7");
        assert_eq!(text.parse::<EntryId>().unwrap(), id);
    }

    #[rstest]
    #[case("")]
    #[case("12")]
    #[case("a-1")]
    #[case("1-b")]
    fn entry_id_parse_rejects_garbage(#[case] input: &str) {
        assert!(input.parse::<EntryId>().is_err());
    }

    #[test]
    fn entry_id_serializes_as_string() {
        let id = EntryId::new(5, 2);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"5-2\"");
        let back: EntryId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn generated_task_ids_are_unique() {
        let id1 = TaskId::generate();
        let id2 = TaskId::generate();
        assert_ne!(id1, id2);
        assert_eq!(id1.as_str().len(), 26);
    }

    #[test]
    fn task_id_is_transparent_in_json() {
        let id = TaskId::new("t1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"t1\"");
    }
}

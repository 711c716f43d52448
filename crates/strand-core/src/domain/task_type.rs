//! EventType - ハンドラ選択に使うタグ
//!
//! # 命名規約
//! - `{domain}.{event}.v{major}`
//! - 例: `user.registered.v1`

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tag that selects which handler processes a message.
///
/// The set of known event types is whatever has been registered with the
/// dispatcher; there is no built-in list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventType(String);

impl EventType {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

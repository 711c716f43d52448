//! Message - キューに流すタスクの運搬用データ
//!
//! ワイヤ形式は JSON オブジェクト 1 つです。
//! ```text
//! {"id": "<task id>", "payload": "<opaque string>", "type": "<event type>"}
//! ```
//! `type` は省略可能で、省略時は consumer 側の既定 event type が使われます。

use serde::{Deserialize, Serialize};

use super::errors::DecodeError;
use super::{EventType, TaskId};

/// Task as carried through the queue.
///
/// `id` is assigned by the caller; the store assigns its own `EntryId`
/// independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: TaskId,
    pub payload: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<EventType>,
}

/// Lenient mirror of [`Message`] so that missing fields can be reported by
/// name instead of as a generic parse failure.
#[derive(Deserialize)]
struct WireMessage {
    id: Option<TaskId>,
    payload: Option<String>,
    #[serde(rename = "type", default)]
    event_type: Option<EventType>,
}

impl Message {
    pub fn new(id: TaskId, payload: impl Into<String>) -> Self {
        Self {
            id,
            payload: payload.into(),
            event_type: None,
        }
    }

    pub fn with_event_type(mut self, event_type: impl Into<EventType>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Serialize into the bytes stored in a queue entry.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parse queue entry bytes back into a message.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let wire: WireMessage = serde_json::from_slice(bytes)?;
        let id = wire.id.ok_or(DecodeError::MissingField("id"))?;
        let payload = wire.payload.ok_or(DecodeError::MissingField("payload"))?;
        Ok(Self {
            id,
            payload,
            event_type: wire.event_type,
        })
    }
}

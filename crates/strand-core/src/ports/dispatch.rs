//! MessageHandler port - event type ごとの処理
//!
//! consumer が要求するのは「event type とメッセージを受けて処理する」能力だけです。
//! 実装は `typed::TypedRegistry`（event type → handler の登録表）。
//! 未登録の event type は `HandlerError::UnknownEventType` で必ず失敗させます。

use async_trait::async_trait;

use crate::domain::{EventType, HandlerError, Message};

#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, event_type: &EventType, message: &Message) -> Result<(), HandlerError>;
}


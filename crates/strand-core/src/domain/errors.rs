//! Errors - エラー型と分類
//!
//! 境界ごとに enum を分けています。
//! - **StoreError**: ログストアの障害（StoreUnavailable など）
//! - **DecodeError**: ペイロードの不正（SerializationError / MissingField）
//! - **HandlerError**: ドメイン処理の失敗（未知の event type を含む）
//! - **ProduceError / ConsumerError / SchedulerError**: 各コンポーネントの公開エラー
//!
//! エントリ単位のエラーはループ内で握りつぶしてログに残し、
//! 起動時のグループ登録失敗だけが consumer の外に伝播します。

use thiserror::Error;

use super::EventType;

/// Failure reported by a [`crate::ports::LogStore`] or [`crate::ports::DelaySet`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Transport or backend failure. Recoverable except during registration.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Reported by backends whose group creation is not natively idempotent.
    /// Callers treat it as success.
    #[error("group '{group}' already exists on queue '{queue}'")]
    GroupAlreadyExists { queue: String, group: String },

    #[error("group '{group}' does not exist on queue '{queue}'")]
    NoSuchGroup { queue: String, group: String },
}

impl StoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Queue entry bytes could not be turned into a [`super::Message`].
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("payload missing field '{0}'")]
    MissingField(&'static str),
}

/// Domain processing failure. The entry stays pending and is retried through
/// reclaim.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("no handler registered for event type '{0}'")]
    UnknownEventType(EventType),

    #[error("decode task for '{event_type}': {source}")]
    Decode {
        event_type: EventType,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }
}

#[derive(Debug, Error)]
pub enum ProduceError {
    #[error("serialize message: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Fatal consumer failures. Only registration can produce one; iteration
/// failures are logged and the loop continues.
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("register consumer '{consumer}' in group '{group}' on queue '{queue}': {source}")]
    Registration {
        queue: String,
        group: String,
        consumer: String,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("serialize delayed message: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_event_type_names_the_tag() {
        let err = HandlerError::UnknownEventType(EventType::new("order.paid.v1"));
        assert!(err.to_string().contains("order.paid.v1"));
    }

    #[test]
    fn registration_error_keeps_store_source() {
        let err = ConsumerError::Registration {
            queue: "q".into(),
            group: "g".into(),
            consumer: "c1".into(),
            source: StoreError::Unavailable("connection refused".into()),
        };
        let source = std::error::Error::source(&err).unwrap();
        assert!(source.to_string().contains("connection refused"));
    }

    #[test]
    fn produce_error_wraps_store_error_transparently() {
        let err: ProduceError = StoreError::Unavailable("down".into()).into();
        assert_eq!(err.to_string(), "store unavailable: down");
    }
}

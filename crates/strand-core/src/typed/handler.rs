//! Handler trait - Task を処理する Handler の定義
//!
//! # 学習ポイント
//! - ジェネリック trait (Handler<T>)
//! - Object-safe trait (DynHandler)
//! - Type erasure パターン (TypedHandler<T, H> → DynHandler)

use async_trait::async_trait;
use std::marker::PhantomData;

use super::task::Task;
use crate::domain::{EventType, HandlerError, Message, TaskId};

/// Handler は Task を処理する
///
/// # 使用例
/// ```ignore
/// struct UserRegisteredHandler;
///
/// #[async_trait]
/// impl Handler<UserRegistered> for UserRegisteredHandler {
///     async fn handle(&self, task_id: &TaskId, task: UserRegistered) -> Result<(), HandlerError> {
///         println!("welcome {}", task.name);
///         Ok(())
///     }
/// }
/// ```
///
/// Delivery is at-least-once, so implementations must tolerate seeing the
/// same `task_id` more than once.
#[async_trait]
pub trait Handler<T: Task>: Send + Sync {
    async fn handle(&self, task_id: &TaskId, task: T) -> Result<(), HandlerError>;
}

/// DynHandler は object-safe な Handler の抽象化
///
/// TypedHandler<T, H> を DynHandler に変換することで、
/// HashMap<EventType, Arc<dyn DynHandler>> に格納可能にします。
#[async_trait]
pub trait DynHandler: Send + Sync {
    async fn handle_dyn(&self, message: &Message) -> Result<(), HandlerError>;
    fn event_type(&self) -> EventType;
}

pub struct TypedHandler<T: Task, H: Handler<T>> {
    handler: H,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Task, H: Handler<T>> TypedHandler<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Task, H: Handler<T>> DynHandler for TypedHandler<T, H> {
    async fn handle_dyn(&self, message: &Message) -> Result<(), HandlerError> {
        let task: T = serde_json::from_str(&message.payload).map_err(|source| {
            HandlerError::Decode {
                event_type: EventType::new(T::TYPE),
                source,
            }
        })?;
        self.handler.handle(&message.id, task).await
    }

    fn event_type(&self) -> EventType {
        EventType::new(T::TYPE)
    }
}

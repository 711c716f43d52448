//! TypedRegistry - event type → Handler の登録表
//!
//! # 学習ポイント
//! - HashMap での型消去された trait object の管理
//! - Generic methods での登録と型安全性
//! - Arc による共有所有権
//!
//! ディスパッチャ本体（`MessageHandler` 実装）は登録表を引くだけなので、
//! event type を増やしてもディスパッチャのコードは変わりません。

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use super::handler::{DynHandler, Handler, TypedHandler};
use super::task::Task;
use crate::domain::{EventType, HandlerError, Message};
use crate::ports::MessageHandler;

/// TypedRegistry は型付き Handler を登録・管理
///
/// # 使用例
/// ```ignore
/// let mut registry = TypedRegistry::new();
/// registry.register::<UserRegistered, _>(UserRegisteredHandler)?;
///
/// let handler = registry.get(&EventType::new("user.registered.v1"));
/// ```
#[derive(Default)]
pub struct TypedRegistry {
    handlers: HashMap<EventType, Arc<dyn DynHandler>>,
}

/// RegistryError は TypedRegistry の操作エラー
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Handler for event type '{0}' is already registered")]
    AlreadyRegistered(EventType),
}

impl TypedRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register<T: Task, H: Handler<T> + 'static>(
        &mut self,
        handler: H,
    ) -> Result<(), RegistryError> {
        self.register_dyn(Arc::new(TypedHandler::new(handler)))
    }

    /// Register an already type-erased handler under its own event type.
    pub fn register_dyn(&mut self, handler: Arc<dyn DynHandler>) -> Result<(), RegistryError> {
        let event_type = handler.event_type();
        if self.handlers.contains_key(&event_type) {
            return Err(RegistryError::AlreadyRegistered(event_type));
        }
        self.handlers.insert(event_type, handler);
        Ok(())
    }

    pub fn get(&self, event_type: &EventType) -> Option<Arc<dyn DynHandler>> {
        self.handlers.get(event_type).cloned()
    }

    /// Registered event types, sorted.
    pub fn registered_types(&self) -> Vec<EventType> {
        let mut types: Vec<EventType> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }
}

#[async_trait]
impl MessageHandler for TypedRegistry {
    async fn handle(&self, event_type: &EventType, message: &Message) -> Result<(), HandlerError> {
        let handler = self
            .handlers
            .get(event_type)
            .ok_or_else(|| HandlerError::UnknownEventType(event_type.clone()))?;
        handler.handle_dyn(message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskId;
    use crate::typed::handler::fixtures::{AnotherTestTaskHandler, TestTaskHandler};
    use crate::typed::task::fixtures::{AnotherTestTask, TestTask};

    #[test]
    fn test_register_and_get() {
        let mut registry = TypedRegistry::new();
        registry
            .register::<TestTask, _>(TestTaskHandler::default())
            .unwrap();

        let retrieved = registry.get(&EventType::new(TestTask::TYPE));
        assert!(retrieved.is_some());
    }

    #[test]
    fn test_double_registration() {
        let mut registry = TypedRegistry::new();
        registry
            .register::<TestTask, _>(TestTaskHandler::default())
            .unwrap();
        let result = registry.register::<TestTask, _>(TestTaskHandler::default());
        assert!(matches!(result, Err(RegistryError::AlreadyRegistered(_))));
    }

    #[test]
    fn test_registered_types() {
        let mut registry = TypedRegistry::new();
        registry
            .register::<TestTask, _>(TestTaskHandler::default())
            .unwrap();
        registry
            .register::<AnotherTestTask, _>(AnotherTestTaskHandler)
            .unwrap();
        let types = registry.registered_types();
        assert_eq!(
            types,
            vec![
                EventType::new(AnotherTestTask::TYPE),
                EventType::new(TestTask::TYPE)
            ]
        );
    }

    #[tokio::test]
    async fn dispatch_routes_by_event_type() {
        let mut registry = TypedRegistry::new();
        registry
            .register::<TestTask, _>(TestTaskHandler::default())
            .unwrap();

        let msg = Message::new(TaskId::new("t1"), r#"{"value": 7}"#);
        registry
            .handle(&EventType::new(TestTask::TYPE), &msg)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unknown_event_type_fails_deterministically() {
        let registry = TypedRegistry::new();
        let msg = Message::new(TaskId::new("t1"), "{}");

        for _ in 0..2 {
            let err = registry
                .handle(&EventType::new("nobody.listens.v1"), &msg)
                .await
                .unwrap_err();
            assert!(matches!(err, HandlerError::UnknownEventType(ref t) if t.as_str() == "nobody.listens.v1"));
        }
    }
}

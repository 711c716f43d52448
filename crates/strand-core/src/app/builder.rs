//! AppBuilder - ハンドラの登録と起動時検証
//!
//! # 学習ポイント
//! - Builder パターン
//! - 起動時検証（Fail-fast 設計）: 期待する event type が未登録なら build() で失敗
//! - build() 後は TypedRegistry が consumer のディスパッチャになる

use std::sync::Arc;

use crate::domain::EventType;
use crate::ports::{LogStore, MessageHandler};
use crate::typed::{Handler, RegistryError, Task, TypedRegistry};

use super::consumer::{Consumer, ConsumerOptions};
use super::pool::ConsumerPool;

/// # 使用例
/// ```ignore
/// let app = AppBuilder::new()
///     .register::<UserRegistered, _>(UserRegisteredHandler)?
///     .expect_event_types(&[UserRegistered::TYPE])
///     .build()?;
/// let consumer = app.consumer(store, config.consumer_options("consumer_1"));
/// ```
pub struct AppBuilder {
    registry: TypedRegistry,
    expected: Option<Vec<EventType>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing event types: {0:?}. These were expected but have no handler.")]
    MissingEventTypes(Vec<EventType>),
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            registry: TypedRegistry::new(),
            expected: None,
        }
    }

    pub fn register<T: Task, H: Handler<T> + 'static>(
        mut self,
        handler: H,
    ) -> Result<Self, RegistryError> {
        self.registry.register::<T, H>(handler)?;
        Ok(self)
    }

    /// Event types that must have a handler by the time `build()` runs.
    pub fn expect_event_types(mut self, event_types: &[&str]) -> Self {
        self.expected = Some(event_types.iter().copied().map(EventType::from).collect());
        self
    }

    pub fn build(self) -> Result<App, BuildError> {
        if let Some(expected) = &self.expected {
            let registered = self.registry.registered_types();
            let missing: Vec<EventType> = expected
                .iter()
                .filter(|t| !registered.contains(t))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingEventTypes(missing));
            }
        }
        Ok(App {
            registry: Arc::new(self.registry),
        })
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Validated set of handlers, ready to back consumers.
#[derive(Clone)]
pub struct App {
    registry: Arc<TypedRegistry>,
}

impl App {
    pub fn registry(&self) -> &TypedRegistry {
        &self.registry
    }

    pub fn dispatcher(&self) -> Arc<dyn MessageHandler> {
        self.registry.clone()
    }

    pub fn consumer(&self, store: Arc<dyn LogStore>, opts: ConsumerOptions) -> Consumer {
        Consumer::new(store, self.dispatcher(), opts)
    }

    pub fn spawn_pool(
        &self,
        store: Arc<dyn LogStore>,
        options: impl IntoIterator<Item = ConsumerOptions>,
    ) -> ConsumerPool {
        ConsumerPool::spawn(store, self.dispatcher(), options)
    }
}

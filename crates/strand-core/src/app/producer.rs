//! Producer - タスクをキューに追記する
//!
//! リトライはしません。失敗はそのまま呼び出し側に返し、再送するかどうかは
//! 呼び出し側が決めます。

use std::sync::Arc;
use tracing::debug;

use crate::domain::{EntryId, Message, ProduceError, TaskId};
use crate::ports::LogStore;
use crate::typed::Task;

pub struct Producer {
    store: Arc<dyn LogStore>,
    queue: String,
}

impl Producer {
    pub fn new(store: Arc<dyn LogStore>, queue: impl Into<String>) -> Self {
        Self {
            store,
            queue: queue.into(),
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Serialize `message` and append it to the queue.
    pub async fn produce(&self, message: &Message) -> Result<EntryId, ProduceError> {
        let bytes = message.encode()?;
        let entry_id = self.store.append(&self.queue, &bytes).await?;
        debug!(queue = %self.queue, %entry_id, task_id = %message.id, "produced message");
        Ok(entry_id)
    }

    /// Produce a typed task: the task becomes the JSON payload and its
    /// `Task::TYPE` the event type.
    pub async fn produce_task<T: Task>(
        &self,
        task_id: TaskId,
        task: &T,
    ) -> Result<EntryId, ProduceError> {
        let payload = serde_json::to_string(task)?;
        let message = Message::new(task_id, payload).with_event_type(T::TYPE);
        self.produce(&message).await
    }
}

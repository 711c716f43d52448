use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::consumer::{Consumer, ConsumerOptions};
use super::status::ConsumerStats;
use crate::domain::ConsumerError;
use crate::ports::{LogStore, MessageHandler};

/// Handle for a set of consumers sharing one shutdown signal.
/// - `request_shutdown()` (or dropping the pool) stops every consumer between iterations
/// - `shutdown_and_join()` waits for all of them and returns their totals
pub struct ConsumerPool {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<(String, JoinHandle<Result<ConsumerStats, ConsumerError>>)>,
}

/// Final result of one pooled consumer.
#[derive(Debug)]
pub struct ConsumerExit {
    pub consumer: String,
    pub result: Result<ConsumerStats, ConsumerError>,
}

impl ConsumerPool {
    /// Spawn one consumer per options entry. Each one registers itself before
    /// entering its loop.
    pub fn spawn(
        store: Arc<dyn LogStore>,
        handler: Arc<dyn MessageHandler>,
        options: impl IntoIterator<Item = ConsumerOptions>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let joins = options
            .into_iter()
            .map(|opts| {
                let id = opts.id.clone();
                let mut consumer = Consumer::new(Arc::clone(&store), Arc::clone(&handler), opts);
                let rx = shutdown_rx.clone();
                let join = tokio::spawn(async move {
                    consumer.run(rx).await?;
                    Ok(consumer.stats().clone())
                });
                (id, join)
            })
            .collect::<Vec<_>>();

        info!(consumers = joins.len(), "consumer pool started");
        Self { shutdown_tx, joins }
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    /// Ask every consumer to stop. Handlers already running are not cancelled.
    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for all consumers.
    pub async fn shutdown_and_join(self) -> Vec<ConsumerExit> {
        self.request_shutdown();
        let mut exits = Vec::with_capacity(self.joins.len());
        for (consumer, join) in self.joins {
            let result = match join.await {
                Ok(result) => result,
                Err(e) => {
                    error!(%consumer, error = %e, "consumer task panicked");
                    continue;
                }
            };
            if let Err(e) = &result {
                error!(%consumer, error = %e, "consumer exited with error");
            }
            exits.push(ConsumerExit { consumer, result });
        }
        exits
    }
}

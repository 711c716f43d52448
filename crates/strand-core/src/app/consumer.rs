//! Consumer - 配送ループ（read_new / reclaim → handle → ack）
//!
//! # フロー（1 イテレーション）
//! 1. 前回の reclaim から `reclaim_interval` 経過したか判定（タイムスタンプ比較）
//! 2. 経過していれば `reclaim_stale`、そうでなければ `read_new`（同時には行わない）
//! 3. 各エントリを Message にデコード（失敗したら ack 候補から外す）
//! 4. event type で handler にディスパッチ（失敗したら ack 候補から外す）
//! 5. 成功したエントリをまとめて 1 回の `delete` で ack
//! 6. `PollBackoff` で決まる時間だけ待つ
//!
//! ack されなかったエントリは pending のまま残り、後の reclaim で再配送されます。
//! 再試行回数の上限や dead-letter はありません。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::backoff::PollBackoff;
use super::status::{ConsumerState, ConsumerStats, IterationReport, PassKind};
use crate::domain::{
    ConsumerError, EventType, Message, QueueEntry, StartPosition, StoreError,
};
use crate::ports::{LogStore, MessageHandler};

/// Everything a consumer needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    /// Identity inside the group. Must be unique per running consumer.
    pub id: String,
    pub queue: String,
    pub group: String,
    pub start: StartPosition,
    pub batch_size: usize,
    pub reclaim_interval: Duration,
    pub min_idle: Duration,
    pub block_timeout: Duration,
    pub backoff: PollBackoff,
    pub default_event_type: EventType,
    pub poison_warn_after: u32,
}

pub struct Consumer {
    store: Arc<dyn LogStore>,
    handler: Arc<dyn MessageHandler>,
    opts: ConsumerOptions,
    state: ConsumerState,
    last_reclaim_at: Instant,
    empty_streak: u32,
    stats: ConsumerStats,
}

impl Consumer {
    pub fn new(
        store: Arc<dyn LogStore>,
        handler: Arc<dyn MessageHandler>,
        opts: ConsumerOptions,
    ) -> Self {
        Self {
            store,
            handler,
            opts,
            state: ConsumerState::Init,
            last_reclaim_at: Instant::now(),
            empty_streak: 0,
            stats: ConsumerStats::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.opts.id
    }

    pub fn state(&self) -> ConsumerState {
        self.state
    }

    pub fn stats(&self) -> &ConsumerStats {
        &self.stats
    }

    pub fn options(&self) -> &ConsumerOptions {
        &self.opts
    }

    /// Init -> Registered: create the group (idempotent) and register this
    /// consumer's identity. Failure here is fatal for the consumer.
    pub async fn register(&mut self) -> Result<(), ConsumerError> {
        let ConsumerOptions {
            id, queue, group, ..
        } = &self.opts;
        let registration_error = |source: StoreError| ConsumerError::Registration {
            queue: queue.clone(),
            group: group.clone(),
            consumer: id.clone(),
            source,
        };

        match self.store.create_group(queue, group, self.opts.start).await {
            Ok(()) | Err(StoreError::GroupAlreadyExists { .. }) => {}
            Err(e) => return Err(registration_error(e)),
        }
        self.store
            .register_consumer(queue, group, id)
            .await
            .map_err(registration_error)?;

        self.state = ConsumerState::Registered;
        self.last_reclaim_at = Instant::now();
        info!(consumer = %id, %queue, %group, "consumer registered");
        Ok(())
    }

    /// Which pass the next iteration makes, by comparing the time of the last
    /// reclaim pass against the configured interval.
    pub fn next_pass(&self, now: Instant) -> PassKind {
        if now.saturating_duration_since(self.last_reclaim_at) >= self.opts.reclaim_interval {
            PassKind::Reclaim
        } else {
            PassKind::ReadNew
        }
    }

    /// Sleep that should follow the last iteration.
    pub fn next_delay(&self) -> Duration {
        self.opts.backoff.next_delay(self.empty_streak)
    }

    /// One iteration without the trailing sleep.
    pub async fn run_iteration(&mut self) -> IterationReport {
        let pass = self.begin_pass();
        let fetched = self.fetch(pass).await;
        self.finish_pass(pass, fetched).await
    }

    /// Registered -> Running -> ShutDown.
    ///
    /// Registers first if that has not happened yet. The shutdown signal is
    /// observed while waiting for new entries and while sleeping; a batch that
    /// is already being handled is finished and acknowledged first. Dropping
    /// the sender also counts as shutdown.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), ConsumerError> {
        if self.state == ConsumerState::Init {
            self.register().await?;
        }
        self.state = ConsumerState::Running;
        info!(consumer = %self.opts.id, queue = %self.opts.queue, "consumer running");

        loop {
            if shutdown_requested_now(&mut shutdown) {
                break;
            }

            let pass = self.begin_pass();
            let fetched = tokio::select! {
                fetched = self.fetch(pass) => fetched,
                _ = wait_for_shutdown(&mut shutdown) => break,
            };
            self.finish_pass(pass, fetched).await;

            let delay = self.next_delay();
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = wait_for_shutdown(&mut shutdown) => break,
            }
        }

        self.state = ConsumerState::ShutDown;
        info!(
            consumer = %self.opts.id,
            iterations = self.stats.iterations,
            acked = self.stats.acked,
            "consumer shut down"
        );
        Ok(())
    }

    fn begin_pass(&mut self) -> PassKind {
        let now = Instant::now();
        let pass = self.next_pass(now);
        if pass == PassKind::Reclaim {
            self.last_reclaim_at = now;
        }
        pass
    }

    async fn fetch(&self, pass: PassKind) -> Result<Vec<QueueEntry>, StoreError> {
        let ConsumerOptions {
            id, queue, group, ..
        } = &self.opts;
        match pass {
            PassKind::Reclaim => {
                self.store
                    .reclaim_stale(queue, group, id, self.opts.min_idle, self.opts.batch_size)
                    .await
            }
            PassKind::ReadNew => {
                self.store
                    .read_new(queue, group, id, self.opts.batch_size, self.opts.block_timeout)
                    .await
            }
        }
    }

    async fn finish_pass(
        &mut self,
        pass: PassKind,
        fetched: Result<Vec<QueueEntry>, StoreError>,
    ) -> IterationReport {
        let mut report = IterationReport::new(pass);
        match fetched {
            Ok(entries) => {
                report.fetched = entries.len();
                self.process_batch(entries, &mut report).await;
            }
            Err(e) => {
                error!(consumer = %self.opts.id, ?pass, error = %e, "fetch failed, iteration abandoned");
                report.store_error = true;
            }
        }

        if report.is_empty() {
            self.empty_streak = self.empty_streak.saturating_add(1);
        } else {
            self.empty_streak = 0;
        }
        self.stats.record(&report);
        report
    }

    async fn process_batch(&self, entries: Vec<QueueEntry>, report: &mut IterationReport) {
        let consumer = self.opts.id.as_str();
        if entries.is_empty() {
            debug!(consumer, pass = ?report.pass, "no entries");
            return;
        }

        let mut acks = Vec::with_capacity(entries.len());
        for entry in &entries {
            if entry.delivery_count > self.opts.poison_warn_after {
                warn!(
                    consumer,
                    entry_id = %entry.id,
                    delivery_count = entry.delivery_count,
                    "entry keeps failing, possible poison message"
                );
            }

            let message = match Message::decode(&entry.payload) {
                Ok(message) => message,
                Err(e) => {
                    warn!(consumer, entry_id = %entry.id, error = %e, "decode failed, leaving entry pending");
                    report.decode_failures += 1;
                    continue;
                }
            };

            let event_type = message
                .event_type
                .as_ref()
                .unwrap_or(&self.opts.default_event_type);
            match self.handler.handle(event_type, &message).await {
                Ok(()) => {
                    report.handled += 1;
                    acks.push(entry.id);
                }
                Err(e) => {
                    warn!(
                        consumer,
                        entry_id = %entry.id,
                        task_id = %message.id,
                        %event_type,
                        error = %e,
                        "handler failed, leaving entry pending"
                    );
                    report.handler_failures += 1;
                }
            }
        }

        if acks.is_empty() {
            return;
        }

        match self.store.delete(&self.opts.queue, &acks).await {
            Ok(removed) => {
                report.acked = removed;
                info!(consumer, acked = removed, "acknowledged entries");
            }
            Err(e) => {
                error!(consumer, count = acks.len(), error = %e, "ack failed, entries stay pending");
                report.store_error = true;
            }
        }
    }
}

fn shutdown_requested_now(rx: &mut watch::Receiver<bool>) -> bool {
    *rx.borrow_and_update() || rx.has_changed().is_err()
}

/// Resolves once shutdown is signalled or the sender is gone.
pub(crate) async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

//! DelayedScheduler - 遅延タスクを時刻到来後にキューへ昇格させる
//!
//! # 昇格の流れ
//! 1. `pop_ready(set, now, batch)` で期限到来分を取得（スコア昇順）
//! 2. payload をライブキューに `append`
//! 3. TaskId をキーに遅延セットから `remove`
//!
//! # 実装詳細
//! append と remove は別操作です。2 と 3 の間でプロセスが落ちると、
//! claim の期限切れ後にもう一度昇格されます（at-least-once）。
//! consumer 側は冪等である前提です。
//!
//! 削除は payload の一致ではなく TaskId で行うので、同じ内容の遅延タスクが
//! 複数あっても互いを消し合いません。

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::consumer::wait_for_shutdown;
use super::status::PromotionReport;
use crate::domain::{Message, ReadyScore, SchedulerError};
use crate::ports::{Clock, DelaySet, LogStore};

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Name of the delay set.
    pub set_name: String,
    /// Live queue that ready tasks are appended to.
    pub queue: String,
    pub batch_size: usize,
    /// Sleep between passes that did not fill a whole batch.
    pub poll_interval: Duration,
}

pub struct DelayedScheduler {
    delay_set: Arc<dyn DelaySet>,
    store: Arc<dyn LogStore>,
    clock: Arc<dyn Clock>,
    opts: SchedulerOptions,
}

impl DelayedScheduler {
    pub fn new(
        delay_set: Arc<dyn DelaySet>,
        store: Arc<dyn LogStore>,
        clock: Arc<dyn Clock>,
        opts: SchedulerOptions,
    ) -> Self {
        Self {
            delay_set,
            store,
            clock,
            opts,
        }
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.opts
    }

    /// Park `message` until `ready_at`. Scheduling the same task id again
    /// replaces the earlier entry.
    pub async fn schedule(
        &self,
        message: &Message,
        ready_at: DateTime<Utc>,
    ) -> Result<ReadyScore, SchedulerError> {
        let bytes = message.encode()?;
        let score = ReadyScore::from(ready_at);
        self.delay_set
            .insert(&self.opts.set_name, score, message.id.as_str(), &bytes)
            .await?;
        debug!(set = %self.opts.set_name, task_id = %message.id, %score, "scheduled delayed message");
        Ok(score)
    }

    pub async fn schedule_in(
        &self,
        message: &Message,
        delay: Duration,
    ) -> Result<ReadyScore, SchedulerError> {
        let score = ReadyScore::from(self.clock.now()).saturating_add(delay);
        let ready_at = score.to_datetime().unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.schedule(message, ready_at).await
    }

    /// One promotion pass over everything ready at the current time, up to
    /// `batch_size` members.
    pub async fn promote_ready(&self) -> PromotionReport {
        let mut report = PromotionReport::default();
        let set = self.opts.set_name.as_str();
        let now = ReadyScore::from(self.clock.now());

        let ready = match self
            .delay_set
            .pop_ready(set, now, self.opts.batch_size)
            .await
        {
            Ok(ready) => ready,
            Err(e) => {
                error!(%set, error = %e, "pop_ready failed");
                report.store_error = true;
                return report;
            }
        };
        report.ready = ready.len();

        for entry in ready {
            if let Err(e) = self.store.append(&self.opts.queue, &entry.payload).await {
                // 残りは claim が切れたあと再び ready になる
                error!(%set, task_id = %entry.key, error = %e, "append failed, promotion pass stopped");
                report.store_error = true;
                break;
            }
            report.promoted += 1;

            match self.delay_set.remove(set, &entry.key).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(%set, task_id = %entry.key, "already removed by another promoter");
                }
                Err(e) => {
                    warn!(%set, task_id = %entry.key, error = %e, "remove failed, task may be promoted again");
                    report.remove_failures += 1;
                }
            }
        }

        if report.promoted > 0 {
            info!(%set, queue = %self.opts.queue, promoted = report.promoted, "promoted delayed messages");
        }
        report
    }

    /// Promote until shutdown. A pass that filled the batch is followed
    /// immediately by another one.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(set = %self.opts.set_name, "delayed scheduler running");
        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            let report = self.promote_ready().await;
            if report.ready >= self.opts.batch_size && !report.store_error {
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.opts.poll_interval) => {}
                _ = wait_for_shutdown(&mut shutdown) => break,
            }
        }
        info!(set = %self.opts.set_name, "delayed scheduler stopped");
    }
}

//! App - アプリケーション層
//!
//! ports を組み合わせてキューの振る舞いを実装します。
//!
//! # 主要コンポーネント
//! - **Producer**: メッセージをキューに追記
//! - **Consumer**: 配送ループ（read_new / reclaim → handle → ack）
//! - **ConsumerPool**: 複数 consumer の起動と停止
//! - **DelayedScheduler**: 遅延タスクの昇格
//! - **AppBuilder**: ハンドラ登録と起動時検証

pub mod backoff;
pub mod builder;
pub mod consumer;
pub mod pool;
pub mod producer;
pub mod scheduler;
pub mod status;

// 主要な型を再エクスポート
pub use self::backoff::PollBackoff;
pub use self::builder::{App, AppBuilder, BuildError};
pub use self::consumer::{Consumer, ConsumerOptions};
pub use self::pool::{ConsumerExit, ConsumerPool};
pub use self::producer::Producer;
pub use self::scheduler::{DelayedScheduler, SchedulerOptions};
pub use self::status::{ConsumerState, ConsumerStats, IterationReport, PassKind, PromotionReport};

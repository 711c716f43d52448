//! Ports - 抽象化レイヤー
//!
//! 外部システム（ログストア、遅延セット、ドメインハンドラ、時計）への
//! インターフェースです。実装は `impls` か、利用側のクレートに置きます。

pub mod clock;
pub mod delay_set;
pub mod dispatch;
pub mod id_generator;
pub mod log_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::delay_set::DelaySet;
pub use self::dispatch::MessageHandler;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::log_store::LogStore;

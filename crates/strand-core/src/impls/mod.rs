//! Impls - ports の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **InMemoryLogStore**: 開発用のログストア（consumer group 付き）
//! - **InMemoryDelaySet**: 開発用の遅延セット
//!
//! 本番用のストア（Redis streams + sorted set など）は別クレートで
//! `LogStore` / `DelaySet` を実装します。

pub mod inmem_delay;
pub mod inmem_log;

pub use self::inmem_delay::InMemoryDelaySet;
pub use self::inmem_log::InMemoryLogStore;

//! strand-core
//!
//! At-least-once task queue on top of an append-only log with consumer groups,
//! plus a delayed scheduler that promotes tasks into the live queue.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（EntryId, TaskId, Message, QueueEntry, ReadyScore, errors）
//! - **ports**: 抽象化レイヤー（LogStore, DelaySet, MessageHandler, Clock, IdGenerator）
//! - **impls**: 実装（InMemoryLogStore, InMemoryDelaySet。開発・テスト用）
//! - **typed**: 型付き Task API（Task trait, Handler trait, TypedRegistry）
//! - **app**: アプリケーションロジック（Producer, Consumer, ConsumerPool, DelayedScheduler, AppBuilder）
//! - **config**: TOML 設定と環境変数による上書き

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod typed;

pub use self::config::{Config, ConfigError};

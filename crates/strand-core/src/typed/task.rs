//! Task trait - 型付き Task の定義
//!
//! # 学習ポイント
//! - Associated Constants (`const TYPE`)
//! - Trait bounds の組み合わせ (Serialize + DeserializeOwned + Send + Sync + 'static)

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Task は event type と型を対応付ける
///
/// # 使用例
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct UserRegistered {
///     name: String,
/// }
///
/// impl Task for UserRegistered {
///     const TYPE: &'static str = "user.registered.v1";
/// }
/// ```
///
/// The typed value travels as JSON text inside `Message::payload`.
pub trait Task: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Event type tag, `{domain}.{event}.v{major}`.
    const TYPE: &'static str;
}

/// User registration event, the payload the queue was first built around.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRegistered {
    pub id: String,
    pub name: String,
    pub age: u32,
}

impl Task for UserRegistered {
    const TYPE: &'static str = "user.registered.v1";
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct TestTask {
        pub value: i32,
    }

    impl Task for TestTask {
        const TYPE: &'static str = "test.task.create.v1";
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct AnotherTestTask {
        pub name: String,
    }

    impl Task for AnotherTestTask {
        const TYPE: &'static str = "test.task.another.v1";
    }
}

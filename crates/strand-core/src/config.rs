//! Configuration for consumers and the delayed scheduler.
//!
//! Values come from a TOML file (all sections optional) and can then be
//! overridden from the environment. Durations are milliseconds.
//!
//! ```toml
//! [queue]
//! name = "default_queue"
//! group = "default_group"
//!
//! [consumer]
//! batch_size = 10
//! reclaim_interval_ms = 30000
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::app::backoff::PollBackoff;
use crate::app::consumer::ConsumerOptions;
use crate::app::scheduler::SchedulerOptions;
use crate::domain::{EventType, StartPosition};
use crate::typed::{Task, UserRegistered};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {value}")]
    Env { key: &'static str, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub queue: QueueSettings,
    pub consumer: ConsumerSettings,
    pub scheduler: SchedulerSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub name: String,
    pub group: String,
    pub start: StartPosition,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            name: "default_queue".to_string(),
            group: "default_group".to_string(),
            start: StartPosition::Latest,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerSettings {
    pub batch_size: usize,
    /// How often a consumer runs a reclaim pass instead of reading new entries.
    pub reclaim_interval_ms: u64,
    /// Idle time before a pending entry may be reclaimed.
    pub min_idle_ms: u64,
    /// Upper bound for a blocking read of new entries.
    pub block_timeout_ms: u64,
    /// Sleep after an iteration that returned entries.
    pub poll_min_ms: u64,
    /// Sleep cap after consecutive empty iterations.
    pub poll_max_ms: u64,
    pub poll_multiplier: f64,
    /// Event type for messages that carry none.
    pub default_event_type: String,
    /// Delivery count above which an entry is logged as a likely poison message.
    pub poison_warn_after: u32,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            reclaim_interval_ms: 30_000,
            min_idle_ms: 30_000,
            block_timeout_ms: 10_000,
            poll_min_ms: 1_000,
            poll_max_ms: 1_000,
            poll_multiplier: 2.0,
            default_event_type: UserRegistered::TYPE.to_string(),
            poison_warn_after: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub set_name: String,
    pub batch_size: usize,
    pub poll_interval_ms: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            set_name: "delayed_queue".to_string(),
            batch_size: 10,
            poll_interval_ms: 2_000,
        }
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Apply `STRAND_*` environment variables on top of the current values.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = lookup("STRAND_QUEUE") {
            self.queue.name = v;
        }
        if let Some(v) = lookup("STRAND_GROUP") {
            self.queue.group = v;
        }
        let millis = |key: &'static str| -> Result<Option<u64>, ConfigError> {
            lookup(key)
                .map(|v| v.parse().map_err(|_| ConfigError::Env { key, value: v }))
                .transpose()
        };
        if let Some(ms) = millis("STRAND_RECLAIM_INTERVAL_MS")? {
            self.consumer.reclaim_interval_ms = ms;
        }
        if let Some(ms) = millis("STRAND_MIN_IDLE_MS")? {
            self.consumer.min_idle_ms = ms;
        }
        if let Some(ms) = millis("STRAND_BLOCK_TIMEOUT_MS")? {
            self.consumer.block_timeout_ms = ms;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));
        if self.queue.name.is_empty() || self.queue.group.is_empty() {
            return invalid("queue name and group must be non-empty");
        }
        if self.consumer.batch_size == 0 || self.scheduler.batch_size == 0 {
            return invalid("batch sizes must be greater than zero");
        }
        if self.consumer.reclaim_interval_ms == 0 || self.scheduler.poll_interval_ms == 0 {
            return invalid("intervals must be greater than zero");
        }
        if self.consumer.poll_min_ms > self.consumer.poll_max_ms {
            return invalid("poll_min_ms must not exceed poll_max_ms");
        }
        if self.consumer.poll_multiplier < 1.0 {
            return invalid("poll_multiplier must be at least 1.0");
        }
        Ok(())
    }

    /// Options for one consumer with the given identity.
    pub fn consumer_options(&self, consumer_id: impl Into<String>) -> ConsumerOptions {
        let c = &self.consumer;
        ConsumerOptions {
            id: consumer_id.into(),
            queue: self.queue.name.clone(),
            group: self.queue.group.clone(),
            start: self.queue.start,
            batch_size: c.batch_size,
            reclaim_interval: Duration::from_millis(c.reclaim_interval_ms),
            min_idle: Duration::from_millis(c.min_idle_ms),
            block_timeout: Duration::from_millis(c.block_timeout_ms),
            backoff: PollBackoff::new(
                Duration::from_millis(c.poll_min_ms),
                Duration::from_millis(c.poll_max_ms),
                c.poll_multiplier,
            ),
            default_event_type: EventType::new(c.default_event_type.clone()),
            poison_warn_after: c.poison_warn_after,
        }
    }

    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            set_name: self.scheduler.set_name.clone(),
            queue: self.queue.name.clone(),
            batch_size: self.scheduler.batch_size,
            poll_interval: Duration::from_millis(self.scheduler.poll_interval_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_original_deployment() {
        let cfg = Config::default();
        assert_eq!(cfg.queue.name, "default_queue");
        assert_eq!(cfg.queue.group, "default_group");
        assert_eq!(cfg.consumer.batch_size, 10);
        assert_eq!(cfg.consumer.reclaim_interval_ms, 30_000);
        assert_eq!(cfg.consumer.block_timeout_ms, 10_000);
        assert_eq!(cfg.scheduler.set_name, "delayed_queue");
        cfg.validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = Config::from_toml_str(
            r#"
            [queue]
            name = "emails"

            [consumer]
            batch_size = 50
            poll_max_ms = 8000
            "#,
        )
        .unwrap();

        assert_eq!(cfg.queue.name, "emails");
        assert_eq!(cfg.queue.group, "default_group");
        assert_eq!(cfg.consumer.batch_size, 50);
        assert_eq!(cfg.consumer.poll_max_ms, 8_000);
        assert_eq!(cfg.consumer.min_idle_ms, 30_000);
    }

    #[test]
    fn unknown_start_position_is_a_parse_error() {
        let err = Config::from_toml_str("[queue]\nstart = \"middle\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn env_overrides_apply_on_top() {
        let env: HashMap<&str, &str> = [
            ("STRAND_QUEUE", "q2"),
            ("STRAND_MIN_IDLE_MS", "1500"),
        ]
        .into_iter()
        .collect();

        let mut cfg = Config::default();
        cfg.apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(cfg.queue.name, "q2");
        assert_eq!(cfg.consumer.min_idle_ms, 1_500);
        assert_eq!(cfg.queue.group, "default_group");
    }

    #[test]
    fn bad_env_value_is_reported() {
        let mut cfg = Config::default();
        let err = cfg
            .apply_overrides(|k| (k == "STRAND_BLOCK_TIMEOUT_MS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { key: "STRAND_BLOCK_TIMEOUT_MS", .. }));
    }

    #[rstest]
    #[case::zero_batch(|c: &mut Config| c.consumer.batch_size = 0)]
    #[case::zero_reclaim(|c: &mut Config| c.consumer.reclaim_interval_ms = 0)]
    #[case::empty_group(|c: &mut Config| c.queue.group.clear())]
    #[case::min_over_max(|c: &mut Config| c.consumer.poll_min_ms = 5_000)]
    #[case::shrinking_backoff(|c: &mut Config| c.consumer.poll_multiplier = 0.5)]
    fn validate_rejects(#[case] mutate: fn(&mut Config)) {
        let mut cfg = Config::default();
        mutate(&mut cfg);
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn consumer_options_carry_queue_and_durations() {
        let cfg = Config::default();
        let opts = cfg.consumer_options("consumer_1");
        assert_eq!(opts.id, "consumer_1");
        assert_eq!(opts.queue, "default_queue");
        assert_eq!(opts.reclaim_interval, Duration::from_secs(30));
        assert_eq!(opts.block_timeout, Duration::from_secs(10));
        assert_eq!(opts.default_event_type.as_str(), "user.registered.v1");
    }
}

//! Configuration of the Sone core.
//!
//! Every field has a default, so an empty file is a valid configuration:
//!
//! ```toml
//! [subscriptions]
//! recent_update_days = 7
//!
//! [updater]
//! dispatch = "sequential"            # or "task_per_job"
//! # dispatch = { worker_pool = { workers = 4 } }
//! ```

use std::path::Path;

use anyhow::Context;
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SoneConfig {
    pub subscriptions: SubscriptionConfig,
    pub updater: UpdaterConfig,
}

impl SoneConfig {
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        toml::from_str(s).context("could not parse sone config")
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("could not read sone config at {path:?}"))?;
        Self::from_toml_str(&s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// Sones updated within this many days get an immediate background
    /// check when their watch is registered.
    pub recent_update_days: u32,
}

impl SubscriptionConfig {
    pub fn recent_update_window(&self) -> TimeDelta {
        TimeDelta::days(i64::from(self.recent_update_days))
    }
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            recent_update_days: 7,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UpdaterConfig {
    pub dispatch: DispatchPolicy,
}

/// How queued identity graph updates are executed.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPolicy {
    /// One worker runs jobs in queue order.
    #[default]
    Sequential,
    /// Every job runs on its own task as soon as it is dequeued.
    TaskPerJob,
    /// A fixed number of workers share the queue.
    WorkerPool { workers: usize },
}

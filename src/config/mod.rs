//! # Engine Configuration
//!
//! Two kinds of configuration drive a run:
//!
//! - **Core settings** ([`CoreConfig`]): typed engine tunables such as channel
//!   capacities, task group timing, failover limits and the statistics server.
//!   Loaded by [`ConfigManager`] from built-in defaults, an optional core file,
//!   `BATCHSYNC__*` environment variables and the job document's `core` object,
//!   in that order of precedence.
//! - **Job document** ([`Configuration`]): the declarative job description, a
//!   JSON tree addressed by path expressions like `job.content[0].reader.name`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use batchsync_core::config::{ConfigManager, Configuration};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let job = Configuration::from_file("job.json", &Default::default())?;
//! let core = ConfigManager::load(None, job.get_configuration("core").as_ref())?;
//!
//! let channels_per_group = core.config().container.task_group.channel;
//! let reader = job.get_string("job.content[0].reader.name");
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod job;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use job::Configuration;
pub use loader::ConfigManager;

/// Built-in defaults, the lowest-precedence configuration source
pub const DEFAULT_CORE_SETTINGS: &str = r#"{
  "container": {
    "job": { "report_interval_ms": 30000, "sleep_interval_ms": 100 },
    "task_group": {
      "channel": 5,
      "sleep_interval_ms": 100,
      "report_interval_ms": 10000,
      "hang_timeout_ms": 172800000
    },
    "task": { "max_retry_times": 1, "retry_interval_ms": 10000, "max_wait_ms": 60000 }
  },
  "transport": {
    "channel": { "capacity": 512, "byte_capacity": 8388608, "flow_control_interval_ms": 1000 },
    "exchanger": { "buffer_size": 32 }
  },
  "statistics": { "collector": { "max_dirty_number": 10 } },
  "server": { "timeout_secs": 2 }
}"#;

/// Root of the typed core settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub container: ContainerConfig,
    pub transport: TransportConfig,
    pub statistics: StatisticsConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    pub job: JobContainerConfig,
    pub task_group: TaskGroupConfig,
    pub task: TaskFailoverConfig,
}

/// Job-level scheduler timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobContainerConfig {
    pub report_interval_ms: u64,
    pub sleep_interval_ms: u64,
}

impl Default for JobContainerConfig {
    fn default() -> Self {
        Self {
            report_interval_ms: 30_000,
            sleep_interval_ms: 100,
        }
    }
}

/// Task group sizing and supervision timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskGroupConfig {
    /// Channels (concurrent tasks) per task group
    pub channel: usize,
    pub sleep_interval_ms: u64,
    pub report_interval_ms: u64,
    /// A task whose read count stays flat this long is declared hung
    pub hang_timeout_ms: u64,
}

impl Default for TaskGroupConfig {
    fn default() -> Self {
        Self {
            channel: 5,
            sleep_interval_ms: 100,
            report_interval_ms: 10_000,
            hang_timeout_ms: 48 * 60 * 60 * 1000,
        }
    }
}

impl TaskGroupConfig {
    pub fn sleep_interval(&self) -> Duration {
        Duration::from_millis(self.sleep_interval_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }

    pub fn hang_timeout(&self) -> Duration {
        Duration::from_millis(self.hang_timeout_ms)
    }
}

/// Per-task retry policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskFailoverConfig {
    pub max_retry_times: u32,
    pub retry_interval_ms: u64,
    pub max_wait_ms: u64,
}

impl Default for TaskFailoverConfig {
    fn default() -> Self {
        Self {
            max_retry_times: 1,
            retry_interval_ms: 10_000,
            max_wait_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub channel: ChannelConfig,
    pub exchanger: ExchangerConfig,
}

/// Channel capacity and per-channel speed ceilings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Maximum number of queued records
    pub capacity: usize,
    /// Maximum bytes of queued records
    pub byte_capacity: usize,
    pub flow_control_interval_ms: u64,
    pub speed: SpeedConfig,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            capacity: 512,
            byte_capacity: 8 * 1024 * 1024,
            flow_control_interval_ms: 1000,
            speed: SpeedConfig::default(),
        }
    }
}

/// Throughput limits; `None` means unlimited
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedConfig {
    pub byte: Option<u64>,
    pub record: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangerConfig {
    pub buffer_size: usize,
}

impl Default for ExchangerConfig {
    fn default() -> Self {
        Self { buffer_size: 32 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsConfig {
    pub collector: CollectorConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// How many dirty records per task are written to the log
    pub max_dirty_number: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            max_dirty_number: 10,
        }
    }
}

/// Optional statistics endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: None,
            timeout_secs: 2,
        }
    }
}

impl CoreConfig {
    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        let channel = &self.transport.channel;
        if channel.capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "transport.channel.capacity",
                "0",
                "channel capacity must be positive",
            ));
        }
        if channel.byte_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "transport.channel.byte_capacity",
                "0",
                "channel byte capacity must be positive",
            ));
        }
        if channel.flow_control_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "transport.channel.flow_control_interval_ms",
                "0",
                "flow control interval must be positive",
            ));
        }

        let buffer_size = self.transport.exchanger.buffer_size;
        if buffer_size == 0 || buffer_size > channel.capacity {
            return Err(ConfigurationError::invalid_value(
                "transport.exchanger.buffer_size",
                buffer_size.to_string(),
                format!("buffer size must be between 1 and the channel capacity ({})", channel.capacity),
            ));
        }

        if self.container.task_group.channel == 0 {
            return Err(ConfigurationError::invalid_value(
                "container.task_group.channel",
                "0",
                "a task group needs at least one channel",
            ));
        }
        if self.container.task_group.sleep_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "container.task_group.sleep_interval_ms",
                "0",
                "supervision loop needs a positive sleep interval",
            ));
        }

        if let Some(address) = &self.server.address {
            if !(address.starts_with("http://") || address.starts_with("https://")) {
                return Err(ConfigurationError::invalid_value(
                    "server.address",
                    address.clone(),
                    "statistics server address must be an http(s) URL",
                ));
            }
        }

        Ok(())
    }
}

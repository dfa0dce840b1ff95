//! # Task Groups
//!
//! A task group is the unit a scheduler places on a worker thread. Its
//! [`TaskGroupContainer`] runs a fixed set of tasks, each as a
//! [`TaskExecutor`] attempt, under a bounded concurrency and a hang watchdog.

pub mod container;
pub mod executor;
pub mod monitor;
mod runner;

pub use container::TaskGroupContainer;
pub use executor::TaskExecutor;
pub use monitor::TaskMonitor;

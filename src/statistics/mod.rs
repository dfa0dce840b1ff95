//! # Statistics
//!
//! Per-task counters and lifecycle state ([`Communication`]), their immutable
//! snapshots and rollups, progress lines and the dirty-record collector.

pub mod collector;
pub mod communication;
pub mod communicator;
pub mod progress;

pub use collector::{TaskPluginCollector, DIRTY_RECORD_MESSAGE_KEY};
pub use communication::{Communication, CommunicationSnapshot, CommunicationState, Counter};
pub use communicator::{JobCommunicationBoard, TaskGroupCommunicator};
pub use progress::{human_bytes, ProgressReport};

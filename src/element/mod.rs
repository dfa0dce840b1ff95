//! # Record Model
//!
//! Records are ordered lists of typed [`Column`]s. A record is produced by one
//! reader task, moved through exactly one channel and consumed by one writer
//! task; ownership moves with it, nothing is shared.

pub mod column;
pub mod record;

pub use column::{Column, ColumnType};
pub use record::{Record, COLUMN_HEAD_BYTES, RECORD_HEAD_BYTES};

#![allow(dead_code)]

use batchsync_core::config::Configuration;
use batchsync_core::job::{PluginSlice, TaskConfig, LOAD_BALANCE_RESOURCE_MARK};
use proptest::prelude::*;
use serde_json::json;

/// Resource marks drawn from a small pool so tasks collide on hosts
pub fn resource_mark_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["db-a", "db-b", "db-c", "db-d"]).prop_map(str::to_string)
}

/// One task per mark, the mark set on its reader slice
pub fn tasks_with_marks(marks: &[String]) -> Vec<TaskConfig> {
    marks
        .iter()
        .enumerate()
        .map(|(task_id, mark)| TaskConfig {
            task_id,
            reader: PluginSlice::new(
                "memoryreader",
                Configuration::from_value(json!({ LOAD_BALANCE_RESOURCE_MARK: mark })),
            ),
            writer: PluginSlice::new("collectingwriter", Configuration::new()),
            transformer: Vec::new(),
        })
        .collect()
}

/// Task list plus a channel budget no larger than the task count, and a
/// per-group channel setting
pub fn assignment_input_strategy() -> impl Strategy<Value = (Vec<TaskConfig>, usize, usize)> {
    prop::collection::vec(resource_mark_strategy(), 1..40).prop_flat_map(|marks| {
        let task_count = marks.len();
        (Just(tasks_with_marks(&marks)), 1..=task_count, 1usize..8)
    })
}

/// Batches of short text payloads, empty batches included
pub fn text_batches_strategy() -> impl Strategy<Value = Vec<Vec<String>>> {
    prop::collection::vec(prop::collection::vec("[a-z0-9]{0,12}", 0..20), 0..12)
}

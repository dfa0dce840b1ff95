//! Fair placement of tasks onto task groups.
//!
//! Tasks touching the same resource (a database, a host) are spread across
//! groups instead of landing together. With marks `a: [0, 1, 2]`,
//! `b: [3, 4]`, `c: [5, 6, 7]` and four groups the result is:
//!
//! ```text
//! group 0: 0, 4
//! group 1: 3, 6
//! group 2: 5, 2
//! group 3: 1, 7
//! ```

use super::task::TaskConfig;
use crate::error::{Result, SyncError};
use std::collections::HashMap;

/// Tasks and concurrency assigned to one task group
#[derive(Debug, Clone, PartialEq)]
pub struct TaskGroupAssignment {
    pub task_group_id: usize,
    /// Concurrent tasks this group may run
    pub channel: usize,
    pub tasks: Vec<TaskConfig>,
}

/// Distribute `tasks` over `ceil(channel_number / channels_per_group)` groups
///
/// Tasks are bucketed by resource mark, using the reader side unless the
/// writer side declares more distinct marks. Buckets are interleaved one task
/// at a time and dealt round-robin. Channels are split evenly with the
/// remainder going to the lowest group ids.
pub fn assign_fairly(
    tasks: Vec<TaskConfig>,
    channel_number: usize,
    channels_per_group: usize,
) -> Result<Vec<TaskGroupAssignment>> {
    if tasks.is_empty() {
        return Err(SyncError::internal("no tasks to assign"));
    }
    if channel_number == 0 || channels_per_group == 0 {
        return Err(SyncError::configuration(format!(
            "channel number ({channel_number}) and channels per task group ({channels_per_group}) must be positive"
        )));
    }

    let group_count = channel_number.div_ceil(channels_per_group).min(tasks.len());
    let buckets = resource_buckets(&tasks);

    let mut groups: Vec<Vec<TaskConfig>> = vec![Vec::new(); group_count];
    let mut slots: Vec<Option<TaskConfig>> = tasks.into_iter().map(Some).collect();
    let longest = buckets.iter().map(Vec::len).max().unwrap_or(0);
    let mut dealt = 0;
    for round in 0..longest {
        for bucket in &buckets {
            if let Some(task) = bucket.get(round).and_then(|&index| slots[index].take()) {
                groups[dealt % group_count].push(task);
                dealt += 1;
            }
        }
    }

    let per_group = channel_number / group_count;
    let remainder = channel_number % group_count;
    Ok(groups
        .into_iter()
        .enumerate()
        .map(|(task_group_id, tasks)| TaskGroupAssignment {
            task_group_id,
            channel: per_group + usize::from(task_group_id < remainder),
            tasks,
        })
        .collect())
}

/// Task indices grouped by resource mark, in first-seen order
fn resource_buckets(tasks: &[TaskConfig]) -> Vec<Vec<usize>> {
    let reader = bucket_by(tasks, |task| task.reader.resource_mark());
    let writer = bucket_by(tasks, |task| task.writer.resource_mark());
    if reader.len() >= writer.len() {
        reader
    } else {
        writer
    }
}

fn bucket_by(tasks: &[TaskConfig], mark: impl Fn(&TaskConfig) -> Option<String>) -> Vec<Vec<usize>> {
    let mut positions: HashMap<Option<String>, usize> = HashMap::new();
    let mut buckets: Vec<Vec<usize>> = Vec::new();
    for (index, task) in tasks.iter().enumerate() {
        let position = *positions.entry(mark(task)).or_insert_with(|| {
            buckets.push(Vec::new());
            buckets.len() - 1
        });
        buckets[position].push(index);
    }
    buckets
}

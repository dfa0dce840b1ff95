mod common;

use batchsync_core::config::ChannelConfig;
use batchsync_core::element::{Column, Record};
use batchsync_core::job::assign_fairly;
use batchsync_core::statistics::{Communication, Counter};
use batchsync_core::transport::{Channel, ShutdownSignal};
use common::strategies::*;
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

proptest! {
    #[test]
    fn test_assignment_is_a_partition((tasks, channel_number, per_group) in assignment_input_strategy()) {
        let task_count = tasks.len();
        let groups = assign_fairly(tasks, channel_number, per_group).unwrap();

        let mut seen = HashSet::new();
        for group in &groups {
            for task in &group.tasks {
                prop_assert!(seen.insert(task.task_id), "task {} assigned twice", task.task_id);
            }
        }
        prop_assert_eq!(seen.len(), task_count);
    }

    #[test]
    fn test_group_sizes_differ_by_at_most_one((tasks, channel_number, per_group) in assignment_input_strategy()) {
        let groups = assign_fairly(tasks, channel_number, per_group).unwrap();
        let sizes: Vec<usize> = groups.iter().map(|group| group.tasks.len()).collect();
        let largest = *sizes.iter().max().unwrap();
        let smallest = *sizes.iter().min().unwrap();
        prop_assert!(smallest >= 1);
        prop_assert!(largest - smallest <= 1, "unbalanced sizes {:?}", sizes);
    }

    #[test]
    fn test_channels_are_conserved((tasks, channel_number, per_group) in assignment_input_strategy()) {
        let groups = assign_fairly(tasks, channel_number, per_group).unwrap();
        let total: usize = groups.iter().map(|group| group.channel).sum();
        prop_assert_eq!(total, channel_number);
        prop_assert_eq!(groups.len(), channel_number.div_ceil(per_group));
        for (index, group) in groups.iter().enumerate() {
            prop_assert_eq!(group.task_group_id, index);
            prop_assert!(group.channel >= 1);
            prop_assert!(group.channel <= per_group);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_channel_delivers_every_pushed_record(
        batches in text_batches_strategy(),
        capacity in 1usize..16,
        pull_max in 1usize..8,
    ) {
        let comm = Arc::new(Communication::new());
        let settings = ChannelConfig {
            capacity,
            byte_capacity: 256,
            ..ChannelConfig::default()
        };
        let channel = Arc::new(Channel::new(&settings, Arc::clone(&comm), ShutdownSignal::new()));
        let expected: Vec<String> = batches.iter().flatten().cloned().collect();
        let expected_bytes: u64 = expected.iter().map(|text| text.len() as u64).sum();

        let producer = {
            let channel = Arc::clone(&channel);
            thread::spawn(move || -> batchsync_core::Result<()> {
                for batch in batches {
                    let records = batch
                        .into_iter()
                        .map(|text| Record::from_columns([Column::String(text)]))
                        .collect();
                    channel.push_all(records)?;
                }
                channel.terminate()
            })
        };

        let mut pulled: Vec<Record> = Vec::new();
        while channel.pull_all(&mut pulled, pull_max).unwrap() {}
        producer.join().unwrap().unwrap();

        let texts: Vec<String> = pulled
            .iter()
            .map(|record| record.get_column(0).and_then(Column::as_string).unwrap_or_default())
            .collect();
        prop_assert_eq!(&texts, &expected);
        let pulled_bytes: u64 = pulled.iter().map(|record| record.byte_size() as u64).sum();
        prop_assert_eq!(pulled_bytes, expected_bytes);

        let count = expected.len() as u64;
        prop_assert_eq!(comm.get(Counter::ReadSucceedRecords), count);
        prop_assert_eq!(comm.get(Counter::WriteReceivedRecords), count);
        prop_assert_eq!(comm.get(Counter::ReadSucceedBytes), expected_bytes);
        prop_assert_eq!(comm.get(Counter::WriteReceivedBytes), expected_bytes);
        prop_assert_eq!(channel.memory_bytes(), 0);
    }
}

#[test]
fn test_ten_tasks_three_channels_two_per_group() {
    let marks: Vec<String> = (0..10).map(|i| format!("host-{}", i % 3)).collect();
    let groups = assign_fairly(tasks_with_marks(&marks), 3, 2).unwrap();

    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].channel + groups[1].channel, 3);
    assert_eq!(groups[0].tasks.len(), 5);
    assert_eq!(groups[1].tasks.len(), 5);

    let mut ids: Vec<usize> = groups.iter().flat_map(|g| g.tasks.iter().map(|t| t.task_id)).collect();
    ids.sort_unstable();
    assert_eq!(ids, (0..10).collect::<Vec<_>>());
}

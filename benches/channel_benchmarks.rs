use batchsync_core::config::ChannelConfig;
use batchsync_core::element::{Column, Record};
use batchsync_core::error::PluginKind;
use batchsync_core::statistics::{Communication, TaskPluginCollector};
use batchsync_core::transport::{BufferedRecordExchanger, Channel, RecordReceiver, RecordSender, ShutdownSignal};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use std::sync::Arc;
use std::thread;

const RECORDS: u64 = 10_000;

fn sample_record(index: u64) -> Record {
    Record::from_columns([
        Column::Long(index as i64),
        Column::String(format!("customer-{index}")),
        Column::Double(index as f64 * 0.5),
    ])
}

fn new_channel() -> Arc<Channel> {
    Arc::new(Channel::new(
        &ChannelConfig::default(),
        Arc::new(Communication::new()),
        ShutdownSignal::new(),
    ))
}

fn benchmark_batch_cycle(c: &mut Criterion) {
    c.bench_function("channel_push_pull_batch_32", |b| {
        let channel = new_channel();
        let mut out = Vec::with_capacity(32);
        b.iter_batched(
            || (0..32).map(sample_record).collect::<Vec<_>>(),
            |batch| {
                channel.push_all(batch).unwrap();
                out.clear();
                channel.pull_all(&mut out, 32).unwrap();
                black_box(out.len())
            },
            BatchSize::SmallInput,
        );
    });
}

fn benchmark_exchanger_threads(c: &mut Criterion) {
    c.bench_function("exchanger_10k_records_two_threads", |b| {
        b.iter(|| {
            let channel = new_channel();
            let collector = TaskPluginCollector::new(
                PluginKind::Reader,
                0,
                Arc::clone(channel.communication()),
                0,
            );
            let mut sender = BufferedRecordExchanger::new(Arc::clone(&channel), collector.clone(), 32);
            let mut receiver = BufferedRecordExchanger::new(Arc::clone(&channel), collector, 32);

            let producer = thread::spawn(move || {
                for index in 0..RECORDS {
                    sender.send_to_writer(sample_record(index)).unwrap();
                }
                sender.terminate().unwrap();
            });

            let mut received = 0u64;
            while receiver.get_from_reader().unwrap().is_some() {
                received += 1;
            }
            producer.join().unwrap();
            black_box(received)
        });
    });
}

criterion_group!(benches, benchmark_batch_cycle, benchmark_exchanger_threads);
criterion_main!(benches);

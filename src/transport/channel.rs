//! # Record Channel
//!
//! Bounded queue between one reader task and one writer task.
//!
//! ## Capacity
//!
//! A batch is admitted only when both the record-count capacity and the byte
//! capacity (measured in record memory size) have room for it. An empty
//! channel admits any batch so an oversized batch cannot wedge the pipeline.
//!
//! ## Flow control
//!
//! After each push the channel compares the task's read counters with the last
//! checkpoint. Once a flow-control interval has passed it computes the observed
//! byte/s and record/s, and if either exceeds its configured ceiling the
//! producer sleeps long enough to bring the average back under it.
//!
//! ## Cancellation
//!
//! Blocking waits wake up every [`WAIT_SLICE`]. A triggered [`ShutdownSignal`]
//! or a FAILED task communication turns a blocked push or pull into an error,
//! so neither side can hang on a dead peer.

use super::ShutdownSignal;
use crate::config::{ChannelConfig, SpeedConfig};
use crate::element::Record;
use crate::error::{Result, SyncError};
use crate::statistics::{Communication, CommunicationState, Counter};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Upper bound on any single blocking wait inside the channel
pub const WAIT_SLICE: Duration = Duration::from_millis(200);

#[derive(Debug, Default)]
struct QueueState {
    records: VecDeque<Record>,
    memory_bytes: usize,
    terminated: bool,
}

#[derive(Debug)]
struct FlowCheckpoint {
    at: Instant,
    read_bytes: u64,
    read_records: u64,
}

/// Flow-controlled conduit of records for one task
#[derive(Debug)]
pub struct Channel {
    capacity: usize,
    byte_capacity: usize,
    speed: SpeedConfig,
    flow_control_interval: Duration,
    queue: Mutex<QueueState>,
    not_empty: Condvar,
    not_full: Condvar,
    checkpoint: Mutex<FlowCheckpoint>,
    communication: Arc<Communication>,
    shutdown: ShutdownSignal,
}

impl Channel {
    pub fn new(settings: &ChannelConfig, communication: Arc<Communication>, shutdown: ShutdownSignal) -> Self {
        Self {
            capacity: settings.capacity.max(1),
            byte_capacity: settings.byte_capacity.max(1),
            speed: SpeedConfig {
                byte: settings.speed.byte.filter(|limit| *limit > 0),
                record: settings.speed.record.filter(|limit| *limit > 0),
            },
            flow_control_interval: Duration::from_millis(settings.flow_control_interval_ms.max(1)),
            queue: Mutex::new(QueueState::default()),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            checkpoint: Mutex::new(FlowCheckpoint {
                at: Instant::now(),
                read_bytes: 0,
                read_records: 0,
            }),
            communication,
            shutdown,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn byte_capacity(&self) -> usize {
        self.byte_capacity
    }

    pub fn communication(&self) -> &Arc<Communication> {
        &self.communication
    }

    pub fn push(&self, record: Record) -> Result<()> {
        self.push_all(vec![record])
    }

    /// Enqueue a batch, blocking while the channel is full
    pub fn push_all(&self, records: Vec<Record>) -> Result<()> {
        self.ensure_open()?;
        if records.is_empty() {
            return Ok(());
        }

        let count = records.len();
        let memory: usize = records.iter().map(Record::memory_size).sum();
        let payload: u64 = records.iter().map(|r| r.byte_size() as u64).sum();
        let started = Instant::now();

        {
            let mut queue = self.queue.lock();
            loop {
                self.ensure_open()?;
                let fits = queue.records.is_empty()
                    || (queue.memory_bytes + memory <= self.byte_capacity
                        && queue.records.len() + count <= self.capacity);
                if fits {
                    break;
                }
                self.ensure_task_alive()?;
                self.not_full.wait_for(&mut queue, WAIT_SLICE);
            }
            queue.memory_bytes += memory;
            queue.records.extend(records);
        }
        self.not_empty.notify_all();

        self.communication
            .increase(Counter::WaitWriterNanos, started.elapsed().as_nanos() as u64);
        self.stat_push(count as u64, payload)
    }

    /// Dequeue one record; `None` once the producer terminated and the queue drained
    pub fn pull(&self) -> Result<Option<Record>> {
        let mut buffer = Vec::with_capacity(1);
        if self.pull_all(&mut buffer, 1)? {
            Ok(buffer.pop())
        } else {
            Ok(None)
        }
    }

    /// Drain up to `max` records into `out`
    ///
    /// Returns `Ok(false)` at end of stream; otherwise at least one record
    /// was appended.
    pub fn pull_all(&self, out: &mut Vec<Record>, max: usize) -> Result<bool> {
        let started = Instant::now();
        let mut records = 0u64;
        let mut payload = 0u64;

        {
            let mut queue = self.queue.lock();
            loop {
                self.ensure_open()?;
                if !queue.records.is_empty() {
                    break;
                }
                if queue.terminated {
                    return Ok(false);
                }
                self.ensure_task_alive()?;
                self.not_empty.wait_for(&mut queue, WAIT_SLICE);
            }

            let state = &mut *queue;
            let take = max.max(1).min(state.records.len());
            for record in state.records.drain(..take) {
                state.memory_bytes = state.memory_bytes.saturating_sub(record.memory_size());
                records += 1;
                payload += record.byte_size() as u64;
                out.push(record);
            }
        }
        self.not_full.notify_all();

        self.communication
            .increase(Counter::WaitReaderNanos, started.elapsed().as_nanos() as u64);
        self.communication.increase(Counter::WriteReceivedRecords, records);
        self.communication.increase(Counter::WriteReceivedBytes, payload);
        Ok(true)
    }

    /// Producer-side end-of-stream marker
    pub fn terminate(&self) -> Result<()> {
        self.ensure_open()?;
        self.queue.lock().terminated = true;
        self.not_empty.notify_all();
        Ok(())
    }

    pub fn is_terminated(&self) -> bool {
        self.queue.lock().terminated
    }

    pub fn size(&self) -> usize {
        self.queue.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn memory_bytes(&self) -> usize {
        self.queue.lock().memory_bytes
    }

    /// Drop every queued record
    pub fn clear(&self) {
        {
            let mut queue = self.queue.lock();
            queue.records.clear();
            queue.memory_bytes = 0;
        }
        self.not_full.notify_all();
    }

    /// Stop the channel and wake every blocked producer and consumer
    pub fn shutdown(&self) {
        if !self.shutdown.trigger() {
            return;
        }
        debug!("Channel shut down, waking blocked peers");
        self.clear();
        self.not_empty.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_triggered()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.shutdown.is_triggered() {
            return Err(SyncError::shutdown("channel"));
        }
        Ok(())
    }

    fn ensure_task_alive(&self) -> Result<()> {
        if self.communication.state() == CommunicationState::Failed {
            return Err(SyncError::Cancelled {
                reason: "task already failed, abandoning channel wait".to_string(),
            });
        }
        Ok(())
    }

    fn stat_push(&self, records: u64, bytes: u64) -> Result<()> {
        self.communication.increase(Counter::ReadSucceedRecords, records);
        self.communication.increase(Counter::ReadSucceedBytes, bytes);

        if self.speed.byte.is_none() && self.speed.record.is_none() {
            return Ok(());
        }

        let pause = {
            let checkpoint = self.checkpoint.lock();
            let elapsed = checkpoint.at.elapsed();
            if elapsed < self.flow_control_interval {
                return Ok(());
            }
            let elapsed_ms = elapsed.as_millis().max(1) as u64;

            let byte_pause = self.speed.byte.map_or(0, |limit| {
                let delta = self
                    .communication
                    .get(Counter::ReadSucceedBytes)
                    .saturating_sub(checkpoint.read_bytes);
                throttle_ms(delta, elapsed_ms, limit)
            });
            let record_pause = self.speed.record.map_or(0, |limit| {
                let delta = self
                    .communication
                    .get(Counter::ReadSucceedRecords)
                    .saturating_sub(checkpoint.read_records);
                throttle_ms(delta, elapsed_ms, limit)
            });
            byte_pause.max(record_pause)
        };

        if pause > 0 {
            trace!(pause_ms = pause, "Throttling producer");
            self.sleep_interruptibly(Duration::from_millis(pause))?;
        }

        let mut checkpoint = self.checkpoint.lock();
        checkpoint.at = Instant::now();
        checkpoint.read_bytes = self.communication.get(Counter::ReadSucceedBytes);
        checkpoint.read_records = self.communication.get(Counter::ReadSucceedRecords);
        Ok(())
    }

    fn sleep_interruptibly(&self, total: Duration) -> Result<()> {
        let deadline = Instant::now() + total;
        loop {
            self.ensure_open()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            std::thread::sleep((deadline - now).min(WAIT_SLICE));
        }
    }
}

/// Milliseconds to sleep so that `delta` over `elapsed_ms` averages to `limit`/s
pub(crate) fn throttle_ms(delta: u64, elapsed_ms: u64, limit: u64) -> u64 {
    let current_speed = delta.saturating_mul(1000) / elapsed_ms.max(1);
    if current_speed <= limit {
        return 0;
    }
    (current_speed.saturating_mul(elapsed_ms) / limit).saturating_sub(elapsed_ms)
}

//! Worker metrics

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Durations kept for the percentile figures
const DURATION_WINDOW: usize = 1000;

/// Counters shared by every job run of the pool
#[derive(Clone, Default)]
pub struct WorkerMetrics {
    inner: Arc<RwLock<MetricsInner>>,
}

#[derive(Default)]
struct MetricsInner {
    /// Runs started
    jobs_processed: u64,
    /// Runs that completed
    jobs_succeeded: u64,
    /// Jobs given up and dead-lettered
    jobs_failed: u64,
    /// Failed runs that were requeued
    jobs_retried: u64,
    /// Runs cut off by their policy timeout
    jobs_timed_out: u64,
    /// Completed runs by job type
    succeeded_by_type: BTreeMap<&'static str, u64>,
    /// Dead-lettered jobs by job type
    failed_by_type: BTreeMap<&'static str, u64>,
    durations: Vec<Duration>,
    queue_depth: usize,
}

impl WorkerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_started(&self) {
        self.inner.write().jobs_processed += 1;
    }

    pub fn record_succeeded(&self, job_type: &'static str, duration: Duration) {
        let mut inner = self.inner.write();
        inner.jobs_succeeded += 1;
        *inner.succeeded_by_type.entry(job_type).or_default() += 1;
        push_duration(&mut inner.durations, duration);
    }

    pub fn record_retried(&self) {
        self.inner.write().jobs_retried += 1;
    }

    pub fn record_timed_out(&self) {
        self.inner.write().jobs_timed_out += 1;
    }

    pub fn record_failed(&self, job_type: &'static str) {
        let mut inner = self.inner.write();
        inner.jobs_failed += 1;
        *inner.failed_by_type.entry(job_type).or_default() += 1;
    }

    pub fn update_queue_depth(&self, depth: usize) {
        self.inner.write().queue_depth = depth;
    }

    pub fn jobs_processed(&self) -> u64 {
        self.inner.read().jobs_processed
    }

    pub fn jobs_succeeded(&self) -> u64 {
        self.inner.read().jobs_succeeded
    }

    pub fn jobs_failed(&self) -> u64 {
        self.inner.read().jobs_failed
    }

    pub fn jobs_retried(&self) -> u64 {
        self.inner.read().jobs_retried
    }

    pub fn jobs_timed_out(&self) -> u64 {
        self.inner.read().jobs_timed_out
    }

    /// Get metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.read();

        let success_rate = if inner.jobs_processed == 0 {
            0.0
        } else {
            inner.jobs_succeeded as f64 / inner.jobs_processed as f64
        };

        let average_duration = if inner.durations.is_empty() {
            None
        } else {
            let total: Duration = inner.durations.iter().sum();
            Some(total / inner.durations.len() as u32)
        };

        MetricsSnapshot {
            jobs_processed: inner.jobs_processed,
            jobs_succeeded: inner.jobs_succeeded,
            jobs_failed: inner.jobs_failed,
            jobs_retried: inner.jobs_retried,
            jobs_timed_out: inner.jobs_timed_out,
            success_rate,
            average_duration,
            p95_duration: percentile(&inner.durations, 0.95),
            queue_depth: inner.queue_depth,
            failed_by_type: inner.failed_by_type.clone(),
            succeeded_by_type: inner.succeeded_by_type.clone(),
        }
    }
}

fn push_duration(durations: &mut Vec<Duration>, duration: Duration) {
    durations.push(duration);
    if durations.len() > DURATION_WINDOW {
        durations.drain(0..DURATION_WINDOW / 2);
    }
}

fn percentile(durations: &[Duration], quantile: f64) -> Option<Duration> {
    if durations.is_empty() {
        return None;
    }

    let mut sorted = durations.to_vec();
    sorted.sort();
    let index = (sorted.len() as f64 * quantile) as usize;
    Some(sorted[index.min(sorted.len() - 1)])
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub jobs_retried: u64,
    pub jobs_timed_out: u64,
    pub success_rate: f64,
    pub average_duration: Option<Duration>,
    pub p95_duration: Option<Duration>,
    pub queue_depth: usize,
    pub succeeded_by_type: BTreeMap<&'static str, u64>,
    pub failed_by_type: BTreeMap<&'static str, u64>,
}

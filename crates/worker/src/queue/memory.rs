//! In-process job queue, used by `--in-memory` runs and tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

use super::job::{Job, JobPriority};
use super::{JobQueue, QueueResult};

#[derive(Default)]
struct QueueState {
    ready: HashMap<JobPriority, VecDeque<Job>>,
    delayed: Vec<(Instant, Job)>,
    dead: Vec<Job>,
}

/// Job queue held in memory. Delays follow the tokio clock, so paused-time
/// tests can step through backoffs with `tokio::time::advance`.
#[derive(Default)]
pub struct InMemoryJobQueue {
    state: Mutex<QueueState>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs waiting for their delay to pass
    pub fn delayed_len(&self) -> usize {
        self.state.lock().delayed.len()
    }

    /// Jobs ready to run
    pub fn ready_len(&self) -> usize {
        self.state.lock().ready.values().map(VecDeque::len).sum()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn push(&self, job: &Job) -> QueueResult<()> {
        self.state
            .lock()
            .ready
            .entry(job.priority)
            .or_default()
            .push_back(job.clone());
        Ok(())
    }

    async fn push_delayed(&self, job: &Job, delay: Duration) -> QueueResult<()> {
        self.state
            .lock()
            .delayed
            .push((Instant::now() + delay, job.clone()));
        Ok(())
    }

    async fn pop(&self) -> QueueResult<Option<Job>> {
        let mut state = self.state.lock();
        for priority in JobPriority::DRAIN_ORDER {
            if let Some(job) = state.ready.get_mut(&priority).and_then(VecDeque::pop_front) {
                return Ok(Some(job));
            }
        }
        Ok(None)
    }

    async fn promote_due(&self) -> QueueResult<usize> {
        let now = Instant::now();
        let mut state = self.state.lock();

        let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut state.delayed)
            .into_iter()
            .partition(|(ready_at, _)| *ready_at <= now);
        state.delayed = waiting;

        let promoted = due.len();
        for (_, job) in due {
            state.ready.entry(job.priority).or_default().push_back(job);
        }
        Ok(promoted)
    }

    async fn dead_letter(&self, job: &Job) -> QueueResult<()> {
        self.state.lock().dead.push(job.clone());
        Ok(())
    }

    async fn dead_letters(&self, limit: usize) -> QueueResult<Vec<Job>> {
        Ok(self
            .state
            .lock()
            .dead
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn len(&self) -> QueueResult<usize> {
        let state = self.state.lock();
        Ok(state.ready.values().map(VecDeque::len).sum::<usize>() + state.delayed.len())
    }
}

//! Job scheduler with cron-like functionality

use anyhow::Result;
use chrono::{DateTime, Datelike, DurationRound, Timelike, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

use lms_pipeline_common::Clock;

use crate::config::SchedulerConfig;
use crate::queue::job::{Job, JobType};
use crate::queue::JobProducer;

/// One field of a cron expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// `*`
    Any,
    /// A literal value
    Value(u32),
    /// `*/n`
    Every(u32),
}

impl Field {
    fn parse(raw: &str, min: u32, max: u32) -> Result<Self> {
        if raw == "*" {
            return Ok(Self::Any);
        }

        if let Some(step) = raw.strip_prefix("*/") {
            let step: u32 = step.parse()?;
            if step == 0 || step > max {
                anyhow::bail!("Step '{}' out of range", raw);
            }
            return Ok(Self::Every(step));
        }

        let value: u32 = raw.parse()?;
        if !(min..=max).contains(&value) {
            anyhow::bail!("Value {} outside {}..={}", value, min, max);
        }
        Ok(Self::Value(value))
    }

    fn matches(&self, value: u32) -> bool {
        match *self {
            Self::Any => true,
            Self::Value(expected) => value == expected,
            Self::Every(step) => value % step == 0,
        }
    }
}

/// Cron-like schedule expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    /// Minute (0-59)
    pub minute: Field,
    /// Hour (0-23)
    pub hour: Field,
    /// Day of month (1-31)
    pub day: Field,
    /// Month (1-12)
    pub month: Field,
    /// Day of week (0-6, where 0 is Sunday)
    pub day_of_week: Field,
}

impl Schedule {
    /// Create a schedule that runs hourly at a specific minute
    pub fn hourly(minute: u32) -> Self {
        Self {
            minute: Field::Value(minute),
            hour: Field::Any,
            day: Field::Any,
            month: Field::Any,
            day_of_week: Field::Any,
        }
    }

    /// Create a schedule that runs daily at a specific time
    pub fn daily(hour: u32, minute: u32) -> Self {
        Self {
            hour: Field::Value(hour),
            ..Self::hourly(minute)
        }
    }

    /// Check if the schedule matches the given time
    pub fn matches(&self, time: &DateTime<Utc>) -> bool {
        self.minute.matches(time.minute())
            && self.hour.matches(time.hour())
            && self.day.matches(time.day())
            && self.month.matches(time.month())
            && self
                .day_of_week
                .matches(time.weekday().num_days_from_sunday())
    }

    /// Parse a cron-like expression
    /// Format: "minute hour day month day_of_week"
    /// Each field is `*`, a value or `*/n`
    pub fn parse(expr: &str) -> Result<Self> {
        let parts: Vec<&str> = expr.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(anyhow::anyhow!(
                "Invalid cron expression, expected 5 fields"
            ));
        }

        Ok(Self {
            minute: Field::parse(parts[0], 0, 59)?,
            hour: Field::parse(parts[1], 0, 23)?,
            day: Field::parse(parts[2], 1, 31)?,
            month: Field::parse(parts[3], 1, 12)?,
            day_of_week: Field::parse(parts[4], 0, 6)?,
        })
    }
}

/// Scheduled job definition
#[derive(Debug, Clone)]
pub struct ScheduledJob {
    /// Job name
    pub name: String,
    /// Schedule
    pub schedule: Schedule,
    /// Job type to enqueue
    pub job_type: JobType,
}

impl ScheduledJob {
    pub fn new(name: impl Into<String>, schedule: Schedule, job_type: JobType) -> Self {
        Self {
            name: name.into(),
            schedule,
            job_type,
        }
    }
}

/// Job scheduler
pub struct Scheduler {
    producer: JobProducer,
    clock: Arc<dyn Clock>,
    tick_interval: Duration,
    jobs: Vec<ScheduledJob>,
    /// Minute each job last fired in
    last_fired: HashMap<String, DateTime<Utc>>,
}

impl Scheduler {
    /// Scheduler with the pipeline's periodic jobs
    pub fn new(
        config: &SchedulerConfig,
        expiry_lead_days: i64,
        producer: JobProducer,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let jobs = vec![
            ScheduledJob::new(
                "low_stock_sweep",
                Schedule::parse(&config.low_stock)?,
                JobType::LowStockSweep,
            ),
            ScheduledJob::new(
                "near_expiry_sweep",
                Schedule::parse(&config.near_expiry)?,
                JobType::NearExpirySweep {
                    days_ahead: expiry_lead_days,
                },
            ),
            ScheduledJob::new(
                "difficulty_recalibration",
                Schedule::parse(&config.recalibration)?,
                JobType::DifficultyRecalibration { course_id: None },
            ),
        ];

        Ok(Self {
            producer,
            clock,
            tick_interval: Duration::from_secs(config.tick_interval.max(1)),
            jobs,
            last_fired: HashMap::new(),
        })
    }

    /// Add a scheduled job
    pub fn add_job(&mut self, job: ScheduledJob) {
        self.jobs.push(job);
    }

    pub fn jobs(&self) -> &[ScheduledJob] {
        &self.jobs
    }

    /// Enqueue every job due at `now`, each at most once per minute
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Vec<Job> {
        let minute = now
            .duration_trunc(chrono::Duration::minutes(1))
            .unwrap_or(now);
        let mut enqueued = Vec::new();

        for scheduled in &self.jobs {
            if !scheduled.schedule.matches(&minute)
                || self.last_fired.get(&scheduled.name) == Some(&minute)
            {
                continue;
            }

            match self.producer.schedule(scheduled.job_type.clone()).await {
                Ok(job) => {
                    info!(
                        job_name = %scheduled.name,
                        job_id = %job.id,
                        "Enqueued scheduled job"
                    );
                    self.last_fired.insert(scheduled.name.clone(), minute);
                    enqueued.push(job);
                }
                Err(e) => {
                    error!(
                        job_name = %scheduled.name,
                        error = %e,
                        "Failed to enqueue scheduled job"
                    );
                }
            }
        }

        enqueued
    }

    /// Run the scheduler loop until shutdown
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            tick_interval = self.tick_interval.as_secs(),
            num_jobs = self.jobs.len(),
            "Starting scheduler"
        );

        loop {
            let now = self.clock.now();
            let fired = self.tick(now).await;
            if !fired.is_empty() {
                debug!(count = fired.len(), "Scheduler tick enqueued jobs");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.tick_interval) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!("Scheduler stopped");
    }
}

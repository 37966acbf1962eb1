//! LMS Recompute Pipeline Worker
//!
//! Runs the background workers, or enqueues a single job for them.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lms_pipeline_common::{
    config::layered, telemetry::init_from_config, PipelineConfig, SystemClock,
};
use lms_pipeline_domain::{
    inventory::MAX_EXPIRY_LEAD_DAYS, AnswerId, CourseId, EvaluationId, UserId,
};
use lms_pipeline_infrastructure::{HttpPredictionPipeline, HttpScoringGateway, InMemoryStore};
use lms_pipeline_worker::{
    queue::job::JobType, InMemoryJobQueue, JobProducer, JobQueue, RedisJobQueue, WorkerConfig,
    WorkerContext, WorkerPool,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "worker")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "WORKER_CONFIG")]
    config: Option<String>,

    /// Worker pool size
    #[arg(short, long, env = "WORKER_POOL_SIZE")]
    workers: Option<usize>,

    /// Redis connection URL
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Database connection URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Run against an in-process store and queue
    #[arg(long)]
    in_memory: bool,

    /// Enable scheduler
    #[arg(long, env = "WORKER_SCHEDULER_ENABLED")]
    scheduler: Option<bool>,

    /// Print metrics interval (seconds)
    #[arg(long, env = "METRICS_INTERVAL", default_value = "60")]
    metrics_interval: u64,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the worker pool (default)
    Run,
    /// Enqueue one job and exit
    Enqueue {
        #[command(subcommand)]
        job: EnqueueJob,
    },
}

#[derive(Subcommand, Debug)]
enum EnqueueJob {
    /// Score a long answer
    Essay { answer_id: i64 },
    /// Run the prediction pipeline for a student
    Prediction { student_id: i64 },
    /// Recalibrate question difficulties
    Recalibration {
        #[arg(long)]
        course_id: Option<i64>,
    },
    /// Refresh the question analytics of an evaluation
    Analytics { evaluation_id: i64 },
    /// Sweep products under their minimum stock
    LowStock,
    /// Sweep lots close to expiry
    NearExpiry {
        #[arg(long, value_parser = clap::value_parser!(i64).range(1..=MAX_EXPIRY_LEAD_DAYS))]
        days_ahead: Option<i64>,
    },
}

impl EnqueueJob {
    fn into_job_type(self, config: &PipelineConfig) -> JobType {
        match self {
            EnqueueJob::Essay { answer_id } => JobType::EssayAnalysis {
                answer_id: AnswerId::new(answer_id),
            },
            EnqueueJob::Prediction { student_id } => JobType::PredictionDispatch {
                student_id: UserId::new(student_id),
            },
            EnqueueJob::Recalibration { course_id } => JobType::DifficultyRecalibration {
                course_id: course_id.map(CourseId::new),
            },
            EnqueueJob::Analytics { evaluation_id } => JobType::AnalyticsRefresh {
                evaluation_id: EvaluationId::new(evaluation_id),
            },
            EnqueueJob::LowStock => JobType::LowStockSweep,
            EnqueueJob::NearExpiry { days_ahead } => JobType::NearExpirySweep {
                days_ahead: days_ahead.unwrap_or(config.inventory.expiry_lead_days),
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let layers = layered(cli.config.as_deref())?;
    let mut pipeline = PipelineConfig::from_layers(&layers)?;
    let mut config = WorkerConfig::from_layers(&layers)?;

    // Override with CLI arguments
    if let Some(url) = cli.redis_url {
        pipeline.redis.url = url;
    }
    if let Some(url) = cli.database_url {
        pipeline.database.url = url;
    }
    if let Some(workers) = cli.workers {
        config.pool_size = workers;
    }
    if let Some(scheduler_enabled) = cli.scheduler {
        config.scheduler.enabled = scheduler_enabled;
    }
    config.validate()?;

    init_from_config(&pipeline.telemetry)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Enqueue { job } => {
            if cli.in_memory {
                anyhow::bail!("Jobs enqueued into an in-memory queue would be lost on exit");
            }
            let queue = connect_queue(&pipeline, &config).await?;
            let job = JobProducer::new(queue)
                .schedule(job.into_job_type(&pipeline))
                .await?;
            info!(job_id = %job.id, job_type = job.job_type.name(), "Job enqueued");
            Ok(())
        }
        Command::Run => run(pipeline, config, cli.in_memory, cli.metrics_interval).await,
    }
}

async fn connect_queue(pipeline: &PipelineConfig, config: &WorkerConfig) -> Result<Arc<dyn JobQueue>> {
    let queue = RedisJobQueue::connect(&pipeline.redis.url, &config.queue.prefix)
        .await
        .context("Failed to connect to the job queue")?;
    Ok(Arc::new(queue))
}

async fn run(
    pipeline: PipelineConfig,
    config: WorkerConfig,
    in_memory: bool,
    metrics_interval: u64,
) -> Result<()> {
    info!(
        pool_size = config.pool_size,
        scheduler_enabled = config.scheduler.enabled,
        in_memory,
        "Starting LMS pipeline worker"
    );

    let (queue, ctx): (Arc<dyn JobQueue>, WorkerContext) = if in_memory {
        let scoring = Arc::new(HttpScoringGateway::new(&pipeline.services)?);
        let predictions = Arc::new(HttpPredictionPipeline::new(&pipeline.services)?);
        let ctx = WorkerContext::in_memory(
            Arc::new(InMemoryStore::new()),
            scoring,
            predictions,
            Arc::new(SystemClock),
            pipeline,
        );
        let queue: Arc<dyn JobQueue> = Arc::new(InMemoryJobQueue::new());
        (queue, ctx)
    } else {
        let queue = connect_queue(&pipeline, &config).await?;
        (queue, WorkerContext::connect(pipeline).await?)
    };

    let mut pool = WorkerPool::new(config, queue, ctx);

    let shutdown_handle = pool.shutdown_handle();
    let metrics = pool.metrics().clone();

    // Setup graceful shutdown
    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        info!("Received shutdown signal");
        let _ = shutdown_handle.send(()).await;
    });

    // Start metrics reporting
    let metrics_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval.max(1)));
        loop {
            interval.tick().await;
            let snapshot = metrics.snapshot();
            info!(
                jobs_processed = snapshot.jobs_processed,
                jobs_succeeded = snapshot.jobs_succeeded,
                jobs_failed = snapshot.jobs_failed,
                jobs_retried = snapshot.jobs_retried,
                queue_depth = snapshot.queue_depth,
                success_rate = format!("{:.2}%", snapshot.success_rate * 100.0),
                avg_duration_ms = snapshot
                    .average_duration
                    .map(|d| d.as_millis() as u64)
                    .unwrap_or(0),
                "Worker metrics"
            );
        }
    });

    if let Err(e) = pool.start().await {
        error!(error = %e, "Worker pool error");
    }

    metrics_handle.abort();

    info!("Worker shutting down gracefully");

    Ok(())
}

//! Collaborators handed to every worker

use anyhow::{Context, Result};
use std::sync::Arc;

use lms_pipeline_application::{
    AnalyticsPort, AnswerRepositoryPort, AttemptMetricsService, AttemptRepositoryPort,
    InventoryAlertService, PredictionPipeline, QuestionAnalyticsService, QuestionRepositoryPort,
    ScoringGateway, UserRepositoryPort,
};
use lms_pipeline_common::{Clock, PipelineConfig, SystemClock};
use lms_pipeline_infrastructure::{
    DatabasePool, HttpPredictionPipeline, HttpScoringGateway, InMemoryStore, PgGradingRepository,
    PgInventoryRepository, PgQuestionRepository, PgUserRepository,
};

/// Ports, services and settings the workers run against
#[derive(Clone)]
pub struct WorkerContext {
    pub answers: Arc<dyn AnswerRepositoryPort>,
    pub attempts: Arc<dyn AttemptRepositoryPort>,
    pub questions: Arc<dyn QuestionRepositoryPort>,
    pub users: Arc<dyn UserRepositoryPort>,
    pub scoring: Arc<dyn ScoringGateway>,
    pub predictions: Arc<dyn PredictionPipeline>,
    pub analytics: Arc<dyn AnalyticsPort>,
    pub aggregator: Arc<AttemptMetricsService>,
    pub inventory: Arc<InventoryAlertService>,
    pub clock: Arc<dyn Clock>,
    pub config: PipelineConfig,
}

impl WorkerContext {
    /// Context over PostgreSQL and the HTTP services
    pub async fn connect(config: PipelineConfig) -> Result<Self> {
        let pool = DatabasePool::new(&config.database)
            .await
            .context("Failed to connect to the database")?;
        let pg = pool.pool().clone();

        let grading = Arc::new(PgGradingRepository::new(pg.clone()));
        let questions = Arc::new(PgQuestionRepository::new(pg.clone()));
        let users = Arc::new(PgUserRepository::new(pg.clone()));
        let inventory = Arc::new(PgInventoryRepository::new(pg));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let analytics = Arc::new(QuestionAnalyticsService::new(
            grading.clone(),
            grading.clone(),
            questions.clone(),
            questions.clone(),
            users.clone(),
            clock.clone(),
        ));
        let aggregator = Arc::new(AttemptMetricsService::new(
            grading.clone(),
            grading.clone(),
            grading.clone(),
            clock.clone(),
        ));
        let alerts = Arc::new(InventoryAlertService::new(
            inventory.clone(),
            users.clone(),
            inventory,
            clock.clone(),
            config.inventory.clone(),
        ));

        let scoring = Arc::new(
            HttpScoringGateway::new(&config.services).context("Failed to build scoring client")?,
        );
        let predictions = Arc::new(
            HttpPredictionPipeline::new(&config.services)
                .context("Failed to build prediction client")?,
        );

        Ok(Self {
            answers: grading.clone(),
            attempts: grading,
            questions,
            users,
            scoring,
            predictions,
            analytics,
            aggregator,
            inventory: alerts,
            clock,
            config,
        })
    }

    /// Context over an in-memory store
    pub fn in_memory(
        store: Arc<InMemoryStore>,
        scoring: Arc<dyn ScoringGateway>,
        predictions: Arc<dyn PredictionPipeline>,
        clock: Arc<dyn Clock>,
        config: PipelineConfig,
    ) -> Self {
        let analytics = Arc::new(QuestionAnalyticsService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            clock.clone(),
        ));
        let aggregator = Arc::new(AttemptMetricsService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            clock.clone(),
        ));
        let inventory = Arc::new(InventoryAlertService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            clock.clone(),
            config.inventory.clone(),
        ));

        Self {
            answers: store.clone(),
            attempts: store.clone(),
            questions: store.clone(),
            users: store,
            scoring,
            predictions,
            analytics,
            aggregator,
            inventory,
            clock,
            config,
        }
    }

    /// Replace the analytics collaborator
    pub fn with_analytics(mut self, analytics: Arc<dyn AnalyticsPort>) -> Self {
        self.analytics = analytics;
        self
    }

    /// Replace the inventory alerting service
    pub fn with_inventory(mut self, inventory: Arc<InventoryAlertService>) -> Self {
        self.inventory = inventory;
        self
    }
}

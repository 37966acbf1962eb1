//! Prediction pipeline client.

use async_trait::async_trait;
use std::time::Duration;
use tracing::instrument;

use lms_pipeline_application::{ports::PredictionPipeline, ApplicationResult};
use lms_pipeline_common::ServicesConfig;
use lms_pipeline_domain::UserId;

use super::{build_client, endpoint, post_json};
use crate::Result;

const SERVICE: &str = "prediction-pipeline";

/// [`PredictionPipeline`] backed by the ML service
pub struct HttpPredictionPipeline {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpPredictionPipeline {
    pub fn new(config: &ServicesConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.request_timeout_seconds);
        Ok(Self {
            client: build_client(timeout)?,
            base_url: config.prediction_url.clone(),
            timeout,
        })
    }
}

#[async_trait]
impl PredictionPipeline for HttpPredictionPipeline {
    #[instrument(skip(self))]
    async fn run_for_student(&self, student_id: UserId) -> ApplicationResult<serde_json::Value> {
        let url = endpoint(
            &self.base_url,
            &format!("/api/predictions/students/{}", student_id.value()),
        );
        post_json(
            &self.client,
            SERVICE,
            self.timeout,
            &url,
            &serde_json::json!({ "student_id": student_id.value() }),
        )
        .await
    }
}

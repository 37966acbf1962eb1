//! HTTP gateways to the external scoring agent and prediction pipeline.

mod prediction;
mod scoring;

pub use prediction::HttpPredictionPipeline;
pub use scoring::HttpScoringGateway;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use std::time::Duration;
use tracing::{debug, warn};

use lms_pipeline_application::{ApplicationError, ApplicationResult};

use crate::{Error, Result};

const CLIENT_USER_AGENT: &str = concat!("lms-pipeline/", env!("CARGO_PKG_VERSION"));

/// Build a JSON client with a per-request timeout
pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));

    reqwest::Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()
        .map_err(|e| Error::Configuration(format!("Failed to create HTTP client: {}", e)))
}

/// Join a base URL and a path without doubling the slash
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

/// Map a transport failure onto the application taxonomy
pub(crate) fn transport_error(service: &str, timeout: Duration, err: reqwest::Error) -> ApplicationError {
    if err.is_timeout() {
        warn!(service, timeout_ms = timeout.as_millis() as u64, "Request timed out");
        ApplicationError::Timeout {
            service: service.to_string(),
            after_ms: timeout.as_millis() as u64,
        }
    } else {
        warn!(service, error = %err, "Request failed");
        ApplicationError::integration(service, err.to_string())
    }
}

/// POST a JSON body and decode the JSON response; non-2xx is an integration error
pub(crate) async fn post_json<B: serde::Serialize + ?Sized>(
    client: &reqwest::Client,
    service: &str,
    timeout: Duration,
    url: &str,
    body: &B,
) -> ApplicationResult<serde_json::Value> {
    debug!(service, url, "POST");

    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| transport_error(service, timeout, e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ApplicationError::integration(
            service,
            format!("returned status {}: {}", status.as_u16(), body),
        ));
    }

    response
        .json::<serde_json::Value>()
        .await
        .map_err(|e| ApplicationError::integration(service, format!("invalid response body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        assert_eq!(
            endpoint("http://agent:8003/", "/api/analysis/student-solution"),
            "http://agent:8003/api/analysis/student-solution"
        );
        assert_eq!(endpoint("http://ml", "/api/x"), "http://ml/api/x");
    }

    #[test]
    fn test_build_client() {
        assert!(build_client(Duration::from_secs(5)).is_ok());
    }
}

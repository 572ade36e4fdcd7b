//! Dashboard backend API client.
//!
//! This module provides the `DetectionApi` trait abstracting the detection
//! and analytics RPCs the client core consumes, plus the HTTP
//! implementation used against a live backend.

pub mod error;
pub mod types;

pub use error::ApiError;
pub use types::{
    ClassAp, DetectRequest, DetectResponse, Detection, FpsSample, LatencyBucket, ModelResult,
    ModelSelector, ModelVariant, PerClassReport, PrPoint,
};

use async_trait::async_trait;
use std::time::Duration;

/// Unified interface to the dashboard backend's RPC family.
///
/// # Object Safety
///
/// This trait is object-safe and designed to be used as
/// `Arc<dyn DetectionApi>`, so tests and embedders can substitute the
/// transport.
///
/// # Cancellation Safety
///
/// All methods are cancellation-safe. Dropping a future aborts any
/// in-flight HTTP request.
#[async_trait]
pub trait DetectionApi: Send + Sync + 'static {
    /// Run object detection on an input image.
    ///
    /// # Returns
    ///
    /// - `Ok(DetectResponse)` with one slice per requested-and-ready variant
    /// - `Err(ApiError::Upstream)` if the backend rejected the request
    /// - `Err(ApiError::Network)` / `Err(ApiError::Timeout)` on transport failure
    async fn detect(&self, request: &DetectRequest) -> Result<DetectResponse, ApiError>;

    /// Precision-recall curve accumulated for one variant.
    async fn pr_curve(&self, model: ModelVariant) -> Result<Vec<PrPoint>, ApiError>;

    /// Per-class average precision table for one variant.
    async fn per_class_ap(&self, model: ModelVariant) -> Result<Vec<ClassAp>, ApiError>;

    /// Latency distribution histogram for one variant.
    async fn latency_distribution(&self, model: ModelVariant)
        -> Result<Vec<LatencyBucket>, ApiError>;

    /// Throughput history for one variant.
    async fn fps_history(&self, model: ModelVariant) -> Result<Vec<FpsSample>, ApiError>;
}

/// HTTP implementation of [`DetectionApi`] backed by `reqwest`.
pub struct HttpDetectionApi {
    client: reqwest::Client,
    base_url: String,
    timeout_seconds: u64,
}

impl HttpDetectionApi {
    /// Create a client against `base_url` with a per-request deadline.
    pub fn new(base_url: impl Into<String>, timeout_seconds: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout_seconds,
        }
    }

    /// Create a client reusing an existing connection pool (for testing).
    pub fn with_client(
        base_url: impl Into<String>,
        timeout_seconds: u64,
        client: reqwest::Client,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout_seconds,
        }
    }

    /// Base URL this client talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        model: ModelVariant,
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .get(&url)
            .query(&[("model", model.as_str())])
            .send()
            .await
            .map_err(|e| ApiError::from_reqwest(e, self.timeout_seconds))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ApiError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl DetectionApi for HttpDetectionApi {
    async fn detect(&self, request: &DetectRequest) -> Result<DetectResponse, ApiError> {
        let url = format!("{}/api/detect", self.base_url);

        tracing::debug!(
            model = %request.model,
            conf_threshold = request.conf_threshold,
            iou_threshold = request.iou_threshold,
            "Sending detection request"
        );

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| ApiError::from_reqwest(e, self.timeout_seconds))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ApiError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: DetectResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;

        if parsed.is_empty() {
            tracing::warn!("Detection response contained no model result");
        }

        Ok(parsed)
    }

    async fn pr_curve(&self, model: ModelVariant) -> Result<Vec<PrPoint>, ApiError> {
        self.get_json("/api/evaluation/latest/pr-curve", model).await
    }

    async fn per_class_ap(&self, model: ModelVariant) -> Result<Vec<ClassAp>, ApiError> {
        let report: PerClassReport = self
            .get_json("/api/evaluation/latest/per-class", model)
            .await?;
        Ok(report.metrics)
    }

    async fn latency_distribution(
        &self,
        model: ModelVariant,
    ) -> Result<Vec<LatencyBucket>, ApiError> {
        self.get_json("/api/evaluation/latest/stability", model)
            .await
    }

    async fn fps_history(&self, model: ModelVariant) -> Result<Vec<FpsSample>, ApiError> {
        self.get_json("/api/evaluation/latest/fps-history", model)
            .await
    }
}

//! Per-session façade over the client core.
//!
//! `InferenceSession` ties the stream client, request orchestrator,
//! rolling statistics and analytics aggregator into one state object the
//! presentation layer pulls from and subscribes to. One session owns all
//! of its state exclusively; teardown discards everything.

mod error;

pub use error::SessionError;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, watch};

use crate::analytics::{AggregateAnalytics, AnalyticsAggregator};
use crate::api::{
    DetectRequest, DetectResponse, DetectionApi, HttpDetectionApi, ModelResult, ModelVariant,
};
use crate::config::ClientConfig;
use crate::orchestrator::{OrchestratorError, RequestKind, RequestOrchestrator, RequestUpdate};
use crate::stats::{HistogramBucket, RollingHistory, RollingStatistics};
use crate::stream::{
    ConnectionState, EventHistory, EventSource, HttpEventSource, StreamClient, TelemetryEvent,
};

/// One completed inference run for one variant. Immutable once created;
/// owned exclusively by the session's rolling history.
#[derive(Debug, Clone, Serialize)]
pub struct InferenceRecord {
    pub model: ModelVariant,
    pub latency_ms: f64,
    pub throughput_fps: f64,
    pub detection_count: u32,
    pub captured_at: DateTime<Utc>,
}

/// Derived latency statistics for one variant's recent runs.
#[derive(Debug, Clone, Serialize)]
pub struct LatencySummary {
    pub model: ModelVariant,
    pub samples: usize,
    pub mean_ms: f64,
    pub variance: f64,
    pub std_dev_ms: f64,
    pub histogram: Vec<HistogramBucket>,
}

/// Detection counts after applying a display confidence threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VisibleDetections {
    pub threshold: f64,
    pub yolo: Option<usize>,
    pub detr: Option<usize>,
}

/// Session state consumed by presentation layers.
pub struct InferenceSession {
    api: Arc<dyn DetectionApi>,
    orchestrator: Arc<RequestOrchestrator>,
    aggregator: AnalyticsAggregator,
    stream: StreamClient,
    event_history: Arc<EventHistory>,
    records: RollingHistory<InferenceRecord>,
    latency_stats: HashMap<ModelVariant, RollingStatistics>,
    histogram_bins: usize,
    inference_count: AtomicU64,
    last_result: RwLock<Option<DetectResponse>>,
}

impl InferenceSession {
    /// Build a session against a live backend and open its telemetry
    /// stream.
    pub fn connect(config: &ClientConfig) -> Self {
        let api: Arc<dyn DetectionApi> = Arc::new(HttpDetectionApi::new(
            config.api.base_url.clone(),
            config.api.timeout_seconds,
        ));
        let source: Arc<dyn EventSource> =
            Arc::new(HttpEventSource::new(config.api.base_url.clone()));
        Self::with_parts(api, source, config)
    }

    /// Build a session from explicit collaborators (used by tests and
    /// embedders that bring their own transports).
    pub fn with_parts(
        api: Arc<dyn DetectionApi>,
        source: Arc<dyn EventSource>,
        config: &ClientConfig,
    ) -> Self {
        let capacity = config.history.capacity;
        let event_history = Arc::new(EventHistory::new(capacity));
        let stream = StreamClient::connect(source, event_history.clone(), config.stream.clone());
        let orchestrator = Arc::new(RequestOrchestrator::new());
        let aggregator = AnalyticsAggregator::new(api.clone(), orchestrator.clone());

        let latency_stats = ModelVariant::ALL
            .iter()
            .map(|&variant| (variant, RollingStatistics::new(capacity)))
            .collect();

        Self {
            api,
            orchestrator,
            aggregator,
            stream,
            event_history,
            records: RollingHistory::new(capacity),
            latency_stats,
            histogram_bins: config.history.histogram_bins,
            inference_count: AtomicU64::new(0),
            last_result: RwLock::new(None),
        }
    }

    /// Run one inference, superseding any in-flight inference.
    ///
    /// On success: appends one [`InferenceRecord`] per returned model
    /// result, bumps the inference counter, refreshes analytics (awaited,
    /// partial-failure tolerant) and returns the raw response.
    ///
    /// Returns `Ok(None)` when a newer inference superseded this one -
    /// that is not a failure and must not be shown as one. A genuine RPC
    /// failure surfaces as [`SessionError::Inference`] and leaves all
    /// prior state untouched.
    pub async fn run_inference(
        &self,
        request: DetectRequest,
    ) -> Result<Option<DetectResponse>, SessionError> {
        let upload_id = format!("upload_{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);
        tracing::info!(
            upload_id = %upload_id,
            model = %request.model,
            conf_threshold = request.conf_threshold,
            iou_threshold = request.iou_threshold,
            "Running inference"
        );

        let outcome = self
            .orchestrator
            .run(RequestKind::Inference, self.api.detect(&request))
            .await;

        match outcome {
            Ok(response) => {
                let captured_at = Utc::now();
                for (variant, result) in response.results() {
                    self.record_result(variant, result, captured_at);
                }
                self.inference_count.fetch_add(1, Ordering::SeqCst);
                *self.last_result.write().unwrap() = Some(response.clone());

                // Dependent analytics refresh exactly once per completed
                // inference, awaited before resolving.
                self.aggregator.refresh().await;

                Ok(Some(response))
            }
            Err(OrchestratorError::Superseded) => {
                tracing::debug!(upload_id = %upload_id, "Inference superseded");
                Ok(None)
            }
            Err(OrchestratorError::Failed(e)) => {
                metrics::counter!("duolens_inference_failures_total").increment(1);
                Err(SessionError::Inference(e))
            }
        }
    }

    fn record_result(&self, variant: ModelVariant, result: &ModelResult, captured_at: DateTime<Utc>) {
        let throughput_fps = if result.inference_time_ms > 0.0 {
            1000.0 / result.inference_time_ms
        } else {
            0.0
        };

        self.records.push(InferenceRecord {
            model: variant,
            latency_ms: result.inference_time_ms,
            throughput_fps,
            detection_count: result.num_objects,
            captured_at,
        });

        if let Some(stats) = self.latency_stats.get(&variant) {
            stats.push(result.inference_time_ms);
        }

        metrics::histogram!("duolens_inference_latency_ms", "model" => variant.as_str())
            .record(result.inference_time_ms);
    }

    /// Re-filter the most recent raw result by a display confidence
    /// threshold.
    ///
    /// Pure local recomputation over the cached detections: no inference,
    /// no analytics refresh, no network.
    pub fn visible_detections(&self, threshold: f64) -> VisibleDetections {
        let guard = self.last_result.read().unwrap();
        let count = |result: &ModelResult| {
            result
                .detections
                .iter()
                .filter(|d| d.confidence >= threshold)
                .count()
        };

        VisibleDetections {
            threshold,
            yolo: guard.as_ref().and_then(|r| r.yolo.as_ref()).map(count),
            detr: guard.as_ref().and_then(|r| r.detr.as_ref()).map(count),
        }
    }

    /// Most recent raw detection response, if any inference completed.
    pub fn last_result(&self) -> Option<DetectResponse> {
        self.last_result.read().unwrap().clone()
    }

    /// Monotonic count of completed inferences this session.
    pub fn inference_count(&self) -> u64 {
        self.inference_count.load(Ordering::SeqCst)
    }

    /// Completed inference records, oldest first.
    pub fn records(&self) -> Vec<InferenceRecord> {
        self.records.get_all()
    }

    /// Latency statistics over the rolling window for one variant.
    pub fn latency_summary(&self, model: ModelVariant) -> LatencySummary {
        let stats = &self.latency_stats[&model];
        LatencySummary {
            model,
            samples: stats.len(),
            mean_ms: stats.mean(),
            variance: stats.variance(),
            std_dev_ms: stats.std_dev(),
            histogram: stats.auto_histogram(self.histogram_bins),
        }
    }

    /// Latest analytics snapshot.
    pub fn analytics(&self) -> AggregateAnalytics {
        self.aggregator.current()
    }

    /// Watch receiver notified on every analytics republish.
    pub fn subscribe_analytics(&self) -> watch::Receiver<AggregateAnalytics> {
        self.aggregator.subscribe()
    }

    /// Manually refresh analytics outside the inference flow.
    pub async fn refresh_analytics(&self) {
        self.aggregator.refresh().await;
    }

    /// Recorded telemetry events, oldest first.
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.event_history.events()
    }

    /// Inference-only telemetry sub-stream, oldest first.
    pub fn inference_events(&self) -> Vec<TelemetryEvent> {
        self.event_history.inference_events()
    }

    /// Subscribe to live telemetry events (heartbeats excluded).
    pub fn subscribe_events(&self) -> broadcast::Receiver<TelemetryEvent> {
        self.stream.subscribe()
    }

    /// Subscribe to request completion/failure notifications.
    pub fn subscribe_requests(&self) -> broadcast::Receiver<RequestUpdate> {
        self.orchestrator.subscribe()
    }

    /// Current stream connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.stream.state()
    }

    /// Watch receiver tracking connection state transitions.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.stream.state_changes()
    }

    /// Force a fresh stream connection, resetting backoff.
    pub async fn reconnect(&self) {
        self.stream.reconnect().await;
    }

    /// Tear the session down. The stream closes terminally; in-memory
    /// state is discarded with the session.
    pub async fn close(&self) {
        self.stream.close().await;
    }
}

//! Analytics aggregation with partial-failure tolerance.
//!
//! After each completed inference the aggregator fans out the independent
//! analytics sub-fetches (PR curve, per-class AP, latency distribution and
//! FPS history, per variant), waits for all of them to settle, and
//! republishes a unified snapshot. A failed sub-fetch keeps its previous
//! slice; `refresh()` as a whole never fails.

mod types;

pub use types::{merge_per_class, AggregateAnalytics, ClassApComparison, ModelAnalytics};

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

use crate::api::{DetectionApi, ModelVariant};
use crate::orchestrator::{AnalyticsKind, OrchestratorError, RequestKind, RequestOrchestrator};

/// Fans out analytics sub-fetches and merges them into one snapshot.
pub struct AnalyticsAggregator {
    api: Arc<dyn DetectionApi>,
    orchestrator: Arc<RequestOrchestrator>,
    aggregate_tx: watch::Sender<AggregateAnalytics>,
}

impl AnalyticsAggregator {
    pub fn new(api: Arc<dyn DetectionApi>, orchestrator: Arc<RequestOrchestrator>) -> Self {
        let (aggregate_tx, _) = watch::channel(AggregateAnalytics::default());
        Self {
            api,
            orchestrator,
            aggregate_tx,
        }
    }

    /// Latest published snapshot.
    pub fn current(&self) -> AggregateAnalytics {
        self.aggregate_tx.borrow().clone()
    }

    /// Watch receiver notified on every republish.
    pub fn subscribe(&self) -> watch::Receiver<AggregateAnalytics> {
        self.aggregate_tx.subscribe()
    }

    /// Refresh all sub-fetches and republish the merged snapshot.
    ///
    /// Resolves once all sub-fetches have settled - success or failure.
    /// Failed slices keep their previous value (empty sentinel before the
    /// first success); superseded slices are skipped silently. The
    /// per-class comparison is recomputed from whatever tables are current
    /// after the merge.
    pub async fn refresh(&self) {
        let (yolo_pr, detr_pr, yolo_ap, detr_ap, yolo_lat, detr_lat, yolo_fps, detr_fps) = tokio::join!(
            self.fetch(AnalyticsKind::PrCurve, ModelVariant::Yolo, self.api.pr_curve(ModelVariant::Yolo)),
            self.fetch(AnalyticsKind::PrCurve, ModelVariant::Detr, self.api.pr_curve(ModelVariant::Detr)),
            self.fetch(AnalyticsKind::PerClassAp, ModelVariant::Yolo, self.api.per_class_ap(ModelVariant::Yolo)),
            self.fetch(AnalyticsKind::PerClassAp, ModelVariant::Detr, self.api.per_class_ap(ModelVariant::Detr)),
            self.fetch(AnalyticsKind::LatencyDistribution, ModelVariant::Yolo, self.api.latency_distribution(ModelVariant::Yolo)),
            self.fetch(AnalyticsKind::LatencyDistribution, ModelVariant::Detr, self.api.latency_distribution(ModelVariant::Detr)),
            self.fetch(AnalyticsKind::FpsHistory, ModelVariant::Yolo, self.api.fps_history(ModelVariant::Yolo)),
            self.fetch(AnalyticsKind::FpsHistory, ModelVariant::Detr, self.api.fps_history(ModelVariant::Detr)),
        );

        self.aggregate_tx.send_modify(|aggregate| {
            apply_slice(&mut aggregate.yolo.pr_curve, yolo_pr);
            apply_slice(&mut aggregate.detr.pr_curve, detr_pr);
            apply_slice(&mut aggregate.yolo.per_class_ap, yolo_ap);
            apply_slice(&mut aggregate.detr.per_class_ap, detr_ap);
            apply_slice(&mut aggregate.yolo.latency_distribution, yolo_lat);
            apply_slice(&mut aggregate.detr.latency_distribution, detr_lat);
            apply_slice(&mut aggregate.yolo.fps_history, yolo_fps);
            apply_slice(&mut aggregate.detr.fps_history, detr_fps);

            aggregate.per_class =
                merge_per_class(&aggregate.yolo.per_class_ap, &aggregate.detr.per_class_ap);
            aggregate.last_refreshed = Some(chrono::Utc::now());
        });

        tracing::debug!("Analytics snapshot republished");
    }

    /// Run one sub-fetch through its orchestrator slot, settling to
    /// `None` on failure or supersession.
    async fn fetch<T, F>(&self, kind: AnalyticsKind, model: ModelVariant, work: F) -> Option<T>
    where
        F: Future<Output = Result<T, crate::api::ApiError>>,
    {
        let slot = RequestKind::Analytics(kind, model);
        match self.orchestrator.run(slot, work).await {
            Ok(value) => Some(value),
            Err(OrchestratorError::Superseded) => {
                tracing::debug!(kind = %slot, "Analytics sub-fetch superseded");
                None
            }
            Err(OrchestratorError::Failed(e)) => {
                tracing::warn!(kind = %slot, error = %e, "Analytics sub-fetch failed; keeping previous slice");
                metrics::counter!("duolens_analytics_failures_total", "kind" => kind.as_str())
                    .increment(1);
                None
            }
        }
    }
}

fn apply_slice<T>(slot: &mut Vec<T>, update: Option<Vec<T>>) {
    if let Some(value) = update {
        *slot = value;
    }
}

//! Single-in-flight request orchestration.
//!
//! Each request kind holds at most one in-flight operation. Starting a new
//! request of a kind cancels any prior in-flight request of that kind; the
//! superseded request's eventual result is discarded without mutating any
//! state or notifying any subscriber. Distinct kinds never block each
//! other.

mod error;

pub use error::OrchestratorError;

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::api::ModelVariant;

/// The analytics sub-fetch families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalyticsKind {
    PrCurve,
    PerClassAp,
    LatencyDistribution,
    FpsHistory,
}

impl AnalyticsKind {
    pub const ALL: [AnalyticsKind; 4] = [
        AnalyticsKind::PrCurve,
        AnalyticsKind::PerClassAp,
        AnalyticsKind::LatencyDistribution,
        AnalyticsKind::FpsHistory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalyticsKind::PrCurve => "pr_curve",
            AnalyticsKind::PerClassAp => "per_class_ap",
            AnalyticsKind::LatencyDistribution => "latency_distribution",
            AnalyticsKind::FpsHistory => "fps_history",
        }
    }
}

/// Identity of a request slot. One slot per kind, at most one in-flight
/// request per slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// The detection RPC. A session issues at most one at a time.
    Inference,
    /// One analytics sub-fetch for one variant. Each (kind, variant) pair
    /// is its own slot, independent of all others.
    Analytics(AnalyticsKind, ModelVariant),
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestKind::Inference => f.write_str("inference"),
            RequestKind::Analytics(kind, model) => {
                write!(f, "analytics:{}:{}", kind.as_str(), model)
            }
        }
    }
}

/// How an orchestrated request settled. Superseded requests produce no
/// update at all.
#[derive(Debug, Clone)]
pub struct RequestUpdate {
    pub kind: RequestKind,
    pub outcome: RequestOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    Completed,
    Failed(String),
}

struct Slot {
    token: CancellationToken,
    generation: u64,
}

/// Issues cancellable requests, one in flight per [`RequestKind`].
pub struct RequestOrchestrator {
    slots: DashMap<RequestKind, Slot>,
    generations: AtomicU64,
    updates_tx: broadcast::Sender<RequestUpdate>,
}

impl Default for RequestOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestOrchestrator {
    pub fn new() -> Self {
        let (updates_tx, _) = broadcast::channel(64);
        Self {
            slots: DashMap::new(),
            generations: AtomicU64::new(0),
            updates_tx,
        }
    }

    /// Subscribe to completion/failure notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<RequestUpdate> {
        self.updates_tx.subscribe()
    }

    /// Number of slots with an in-flight request.
    pub fn in_flight(&self) -> usize {
        self.slots.len()
    }

    /// Run `work` in the slot for `kind`, cancelling any prior in-flight
    /// request of the same kind first.
    ///
    /// A request superseded while in flight settles as
    /// [`OrchestratorError::Superseded`]: its result (success or failure)
    /// is discarded with no subscriber notification. A genuine failure is
    /// broadcast to subscribers and returned as
    /// [`OrchestratorError::Failed`].
    pub async fn run<T, E, F>(&self, kind: RequestKind, work: F) -> Result<T, OrchestratorError<E>>
    where
        E: std::fmt::Display + std::fmt::Debug,
        F: Future<Output = Result<T, E>>,
    {
        let token = CancellationToken::new();
        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(prior) = self.slots.insert(
            kind,
            Slot {
                token: token.clone(),
                generation,
            },
        ) {
            tracing::debug!(kind = %kind, "Superseding in-flight request");
            metrics::counter!("duolens_requests_superseded_total").increment(1);
            prior.token.cancel();
        }

        let settled = tokio::select! {
            _ = token.cancelled() => Err(OrchestratorError::Superseded),
            result = work => Ok(result),
        };

        match settled {
            Err(superseded) => Err(superseded),
            Ok(result) => {
                // The slot may have been replaced while the executor was
                // finishing; only the current holder may publish.
                let still_current = self
                    .slots
                    .get(&kind)
                    .map(|slot| slot.generation == generation)
                    .unwrap_or(false);

                if !still_current || token.is_cancelled() {
                    Err(OrchestratorError::Superseded)
                } else {
                    self.slots.remove_if(&kind, |_, slot| slot.generation == generation);
                    match result {
                        Ok(value) => {
                            self.notify(kind, RequestOutcome::Completed);
                            Ok(value)
                        }
                        Err(e) => {
                            tracing::warn!(kind = %kind, error = %e, "Request failed");
                            self.notify(kind, RequestOutcome::Failed(e.to_string()));
                            Err(OrchestratorError::Failed(e))
                        }
                    }
                }
            }
        }
    }

    fn notify(&self, kind: RequestKind, outcome: RequestOutcome) {
        // Ignore error if no subscribers are listening
        let _ = self.updates_tx.send(RequestUpdate { kind, outcome });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[derive(Debug, thiserror::Error)]
    #[error("boom")]
    struct Boom;

    #[tokio::test]
    async fn test_single_request_completes() {
        let orchestrator = RequestOrchestrator::new();
        let mut updates = orchestrator.subscribe();

        let result = orchestrator
            .run(RequestKind::Inference, async { Ok::<_, Boom>(42) })
            .await;

        assert_eq!(result.unwrap(), 42);
        let update = updates.recv().await.unwrap();
        assert_eq!(update.kind, RequestKind::Inference);
        assert_eq!(update.outcome, RequestOutcome::Completed);
        assert_eq!(orchestrator.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_failure_is_reported() {
        let orchestrator = RequestOrchestrator::new();
        let mut updates = orchestrator.subscribe();

        let result = orchestrator
            .run(RequestKind::Inference, async { Err::<u32, _>(Boom) })
            .await;

        assert!(matches!(result, Err(OrchestratorError::Failed(Boom))));
        let update = updates.recv().await.unwrap();
        assert_eq!(update.outcome, RequestOutcome::Failed("boom".to_string()));
    }

    #[tokio::test]
    async fn test_second_request_supersedes_first() {
        let orchestrator = Arc::new(RequestOrchestrator::new());
        let mutations = Arc::new(AtomicU32::new(0));
        let (first_started_tx, first_started) = oneshot::channel::<()>();
        let (release_tx, release) = oneshot::channel::<()>();

        let first = {
            let orchestrator = orchestrator.clone();
            let mutations = mutations.clone();
            tokio::spawn(async move {
                let result = orchestrator
                    .run(RequestKind::Inference, async move {
                        first_started_tx.send(()).unwrap();
                        // Block until the test releases us, well after the
                        // second request has taken over the slot.
                        let _ = release.await;
                        Ok::<_, Boom>(1u32)
                    })
                    .await;
                if result.is_ok() {
                    mutations.fetch_add(1, Ordering::SeqCst);
                }
                result
            })
        };

        first_started.await.unwrap();

        let second = orchestrator
            .run(RequestKind::Inference, async { Ok::<_, Boom>(2u32) })
            .await;
        assert_eq!(second.unwrap(), 2);

        let _ = release_tx.send(());
        let first = first.await.unwrap();
        assert!(matches!(first, Err(OrchestratorError::Superseded)));
        assert_eq!(
            mutations.load(Ordering::SeqCst),
            0,
            "Superseded request must not mutate state"
        );
    }

    #[tokio::test]
    async fn test_superseded_request_sends_no_update() {
        let orchestrator = Arc::new(RequestOrchestrator::new());
        let mut updates = orchestrator.subscribe();

        let slow = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .run(RequestKind::Inference, async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        Ok::<_, Boom>(1u32)
                    })
                    .await
            })
        };

        // Let the slow request register its slot before superseding it.
        tokio::task::yield_now().await;

        let fast = orchestrator
            .run(RequestKind::Inference, async { Ok::<_, Boom>(2u32) })
            .await;
        assert_eq!(fast.unwrap(), 2);
        assert!(matches!(
            slow.await.unwrap(),
            Err(OrchestratorError::Superseded)
        ));

        // Exactly one Completed update: the winner's.
        let update = updates.recv().await.unwrap();
        assert_eq!(update.outcome, RequestOutcome::Completed);
        assert!(matches!(
            updates.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_different_kinds_do_not_interfere() {
        let orchestrator = Arc::new(RequestOrchestrator::new());
        let (release_tx, release) = oneshot::channel::<()>();

        let inference = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .run(RequestKind::Inference, async move {
                        let _ = release.await;
                        Ok::<_, Boom>("inference")
                    })
                    .await
            })
        };

        tokio::task::yield_now().await;

        // An analytics refresh of a different kind runs to completion
        // without touching the in-flight inference.
        let analytics = orchestrator
            .run(
                RequestKind::Analytics(AnalyticsKind::PrCurve, ModelVariant::Yolo),
                async { Ok::<_, Boom>("analytics") },
            )
            .await;
        assert_eq!(analytics.unwrap(), "analytics");

        let _ = release_tx.send(());
        assert_eq!(inference.await.unwrap().unwrap(), "inference");
    }

    #[tokio::test]
    async fn test_rapid_supersede_chain_resolves_once() {
        let orchestrator = Arc::new(RequestOrchestrator::new());

        let tasks: Vec<_> = (0..10u32)
            .map(|i| {
                let orchestrator = orchestrator.clone();
                tokio::spawn(async move {
                    orchestrator
                        .run(RequestKind::Inference, async move {
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok::<_, Boom>(i)
                        })
                        .await
                })
            })
            .collect();

        let results: Vec<_> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        let winners = results.iter().filter(|r| r.is_ok()).count();
        let superseded = results
            .iter()
            .filter(|r| matches!(r, Err(OrchestratorError::Superseded)))
            .count();
        assert_eq!(winners, 1, "Exactly one request of the chain may resolve");
        assert_eq!(superseded, 9);
    }

    #[tokio::test]
    async fn test_analytics_slots_are_per_variant() {
        let orchestrator = RequestOrchestrator::new();
        let yolo = RequestKind::Analytics(AnalyticsKind::PrCurve, ModelVariant::Yolo);
        let detr = RequestKind::Analytics(AnalyticsKind::PrCurve, ModelVariant::Detr);
        assert_ne!(yolo, detr);

        let (a, b) = tokio::join!(
            orchestrator.run(yolo, async { Ok::<_, Boom>(1) }),
            orchestrator.run(detr, async { Ok::<_, Boom>(2) }),
        );
        assert_eq!(a.unwrap(), 1);
        assert_eq!(b.unwrap(), 2);
    }
}

//! Telemetry event types and bounded event sinks.

use serde::{Deserialize, Serialize};

use crate::api::ModelVariant;
use crate::stats::RollingHistory;

/// A single record pushed over the telemetry stream.
///
/// The wire format is a JSON object tagged by `type`. Unknown tags and
/// unparseable payloads are dropped by the frame decoder before they get
/// here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// First event after a connection opens.
    Connected {
        #[serde(default)]
        inference_count: u64,
    },
    /// Keep-alive. Carries no business data and is never stored.
    Heartbeat {
        #[serde(default)]
        inference_count: u64,
    },
    /// One iteration of an inference or profiling run completed.
    InferenceIteration {
        model: ModelVariant,
        #[serde(default)]
        iteration: u32,
        #[serde(default)]
        total: u32,
        latency_ms: f64,
        #[serde(default)]
        num_detections: u32,
        #[serde(default)]
        timestamp: f64,
        #[serde(default)]
        log: Option<String>,
    },
    /// Periodic progress while the backend profiles in the background.
    ProfilingUpdate {
        model: ModelVariant,
        #[serde(default)]
        iteration: u32,
        #[serde(default)]
        total: u32,
        #[serde(default)]
        avg_latency: f64,
        #[serde(default)]
        log: Option<String>,
    },
    /// A full inference request finished across all requested variants.
    InferenceComplete {
        #[serde(default)]
        count: u64,
        #[serde(default)]
        models: Vec<String>,
        #[serde(default)]
        timestamp: f64,
    },
    /// Free-form log line from the backend.
    Log {
        message: String,
        #[serde(default)]
        timestamp: f64,
    },
}

impl TelemetryEvent {
    /// Short tag for logging and display.
    pub fn kind(&self) -> &'static str {
        match self {
            TelemetryEvent::Connected { .. } => "connected",
            TelemetryEvent::Heartbeat { .. } => "heartbeat",
            TelemetryEvent::InferenceIteration { .. } => "inference_iteration",
            TelemetryEvent::ProfilingUpdate { .. } => "profiling_update",
            TelemetryEvent::InferenceComplete { .. } => "inference_complete",
            TelemetryEvent::Log { .. } => "log",
        }
    }

    /// Liveness-only events are dropped at the sink.
    pub fn is_heartbeat(&self) -> bool {
        matches!(self, TelemetryEvent::Heartbeat { .. })
    }

    /// Events belonging to the inference-only derived sub-stream.
    pub fn is_inference(&self) -> bool {
        matches!(
            self,
            TelemetryEvent::InferenceIteration { .. } | TelemetryEvent::InferenceComplete { .. }
        )
    }

    /// Variant the event refers to, when it is variant-specific.
    pub fn model(&self) -> Option<ModelVariant> {
        match self {
            TelemetryEvent::InferenceIteration { model, .. }
            | TelemetryEvent::ProfilingUpdate { model, .. } => Some(*model),
            _ => None,
        }
    }
}

/// Bounded sinks for stream events.
///
/// Holds the full event history plus the inference-only derived
/// sub-stream, both capacity-bounded. Heartbeats are rejected here so the
/// no-heartbeats-in-history invariant holds regardless of caller.
pub struct EventHistory {
    events: RollingHistory<TelemetryEvent>,
    inference_events: RollingHistory<TelemetryEvent>,
}

impl EventHistory {
    /// Create sinks bounded to `capacity` entries each.
    pub fn new(capacity: usize) -> Self {
        Self {
            events: RollingHistory::new(capacity),
            inference_events: RollingHistory::new(capacity),
        }
    }

    /// Append an event to the history and any matching sub-stream.
    pub fn record(&self, event: &TelemetryEvent) {
        if event.is_heartbeat() {
            return;
        }
        self.events.push(event.clone());
        if event.is_inference() {
            self.inference_events.push(event.clone());
        }
    }

    /// All recorded events, oldest first.
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.get_all()
    }

    /// Recorded inference events only, oldest first.
    pub fn inference_events(&self) -> Vec<TelemetryEvent> {
        self.inference_events.get_all()
    }

    /// Number of events in the main history.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

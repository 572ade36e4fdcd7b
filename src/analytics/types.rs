//! Aggregate analytics state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::api::{ClassAp, FpsSample, LatencyBucket, PrPoint};

/// Latest known analytics slices for one model variant.
///
/// Empty vectors are the "no data yet" sentinel; a failed refresh leaves a
/// slice at its previous value rather than clearing it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelAnalytics {
    pub pr_curve: Vec<PrPoint>,
    pub per_class_ap: Vec<ClassAp>,
    pub latency_distribution: Vec<LatencyBucket>,
    pub fps_history: Vec<FpsSample>,
}

/// Per-class AP for both variants, joined on class label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassApComparison {
    pub class: String,
    pub primary_ap: f64,
    pub secondary_ap: f64,
}

/// Unified analytics snapshot republished after every refresh.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregateAnalytics {
    pub yolo: ModelAnalytics,
    pub detr: ModelAnalytics,
    /// Joined per-class AP table, driven by the primary (Yolo) variant.
    pub per_class: Vec<ClassApComparison>,
    /// When the last refresh settled, regardless of partial failures.
    pub last_refreshed: Option<DateTime<Utc>>,
}

/// Join two per-class AP tables on class label.
///
/// The primary table drives the result: every class it contains appears
/// once, with the secondary AP defaulting to 0 when that class is missing
/// from the secondary table. Classes present only in the secondary table
/// are excluded - the comparison view answers "how does the secondary
/// variant do on what the primary detects", not the union.
pub fn merge_per_class(primary: &[ClassAp], secondary: &[ClassAp]) -> Vec<ClassApComparison> {
    let secondary_by_class: HashMap<&str, f64> = secondary
        .iter()
        .map(|entry| (entry.class.as_str(), entry.ap))
        .collect();

    primary
        .iter()
        .map(|entry| ClassApComparison {
            class: entry.class.clone(),
            primary_ap: entry.ap,
            secondary_ap: secondary_by_class
                .get(entry.class.as_str())
                .copied()
                .unwrap_or(0.0),
        })
        .collect()
}

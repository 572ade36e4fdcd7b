//! Request and response types for the dashboard backend API.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The two detector variants compared by the dashboard.
///
/// Yolo is the primary variant: derived views (per-class comparison) are
/// driven by its result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelVariant {
    #[serde(rename = "yolov5")]
    Yolo,
    #[serde(rename = "detr")]
    Detr,
}

impl ModelVariant {
    /// Both variants, primary first.
    pub const ALL: [ModelVariant; 2] = [ModelVariant::Yolo, ModelVariant::Detr];

    /// Wire name used in query parameters and response keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelVariant::Yolo => "yolov5",
            ModelVariant::Detr => "detr",
        }
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ModelVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "yolov5" | "yolo" => Ok(ModelVariant::Yolo),
            "detr" => Ok(ModelVariant::Detr),
            _ => Err(format!("Unknown model variant: {}", s)),
        }
    }
}

/// Which variant(s) an inference request should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ModelSelector {
    #[serde(rename = "yolov5")]
    Yolo,
    #[serde(rename = "detr")]
    Detr,
    #[default]
    #[serde(rename = "both")]
    Both,
}

impl fmt::Display for ModelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModelSelector::Yolo => "yolov5",
            ModelSelector::Detr => "detr",
            ModelSelector::Both => "both",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for ModelSelector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "yolov5" | "yolo" => Ok(ModelSelector::Yolo),
            "detr" => Ok(ModelSelector::Detr),
            "both" => Ok(ModelSelector::Both),
            _ => Err(format!("Unknown model selector: {}", s)),
        }
    }
}

/// Detection request body for `POST /api/detect`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectRequest {
    /// Base64-encoded input image (optionally a data URL)
    pub image: String,
    /// Which variant(s) to run
    #[serde(default)]
    pub model: ModelSelector,
    /// Minimum confidence for returned detections
    #[serde(default = "default_conf_threshold")]
    pub conf_threshold: f64,
    /// IoU threshold for non-max suppression
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f64,
}

fn default_conf_threshold() -> f64 {
    0.5
}

fn default_iou_threshold() -> f64 {
    0.45
}

impl DetectRequest {
    /// Request running both variants with default thresholds.
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            model: ModelSelector::Both,
            conf_threshold: default_conf_threshold(),
            iou_threshold: default_iou_threshold(),
        }
    }
}

/// A single detected object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Class label, e.g. "dog"
    pub class: String,
    /// Detector confidence in [0, 1]
    pub confidence: f64,
    /// Pixel box as [x1, y1, x2, y2]
    pub bbox: [f64; 4],
}

/// Per-variant slice of a detection response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResult {
    pub detections: Vec<Detection>,
    pub inference_time_ms: f64,
    pub num_objects: u32,
    pub avg_confidence: f64,
    /// Base64 overlay rendered by the backend; opaque to the client core
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_with_boxes: Option<String>,
}

/// Response from `POST /api/detect`, keyed by variant wire name.
///
/// Either slice may be absent: the backend omits variants that were not
/// requested or are still loading.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectResponse {
    #[serde(rename = "yolov5", skip_serializing_if = "Option::is_none")]
    pub yolo: Option<ModelResult>,
    #[serde(rename = "detr", skip_serializing_if = "Option::is_none")]
    pub detr: Option<ModelResult>,
}

impl DetectResponse {
    /// Slice for a given variant, if present.
    pub fn get(&self, variant: ModelVariant) -> Option<&ModelResult> {
        match variant {
            ModelVariant::Yolo => self.yolo.as_ref(),
            ModelVariant::Detr => self.detr.as_ref(),
        }
    }

    /// All present (variant, result) slices, primary first.
    pub fn results(&self) -> impl Iterator<Item = (ModelVariant, &ModelResult)> {
        ModelVariant::ALL
            .iter()
            .filter_map(move |&v| self.get(v).map(|r| (v, r)))
    }

    /// True when the backend returned no variant at all.
    pub fn is_empty(&self) -> bool {
        self.yolo.is_none() && self.detr.is_none()
    }
}

/// One point of a precision-recall curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrPoint {
    pub recall: f64,
    pub precision: f64,
}

/// Average precision for one class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassAp {
    pub class: String,
    pub ap: f64,
}

/// Envelope for `GET /api/evaluation/latest/per-class`.
#[derive(Debug, Clone, Deserialize)]
pub struct PerClassReport {
    pub model: String,
    pub run_id: String,
    pub metrics: Vec<ClassAp>,
}

/// One bucket of the backend's latency distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyBucket {
    /// Bucket range label, e.g. "8.2-10.4"
    pub bin: String,
    pub count: u64,
    /// Bucket midpoint in milliseconds
    pub ms: f64,
}

/// One sample of throughput history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FpsSample {
    /// Monotonic sample index (the backend's inference counter)
    pub time: u64,
    pub fps: f64,
    pub latency_ms: f64,
}

//! Output formatting helpers for CLI commands

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};

use crate::analytics::{AggregateAnalytics, ClassApComparison};
use crate::api::{DetectResponse, LatencyBucket, ModelResult, ModelVariant};
use crate::stream::{ConnectionState, TelemetryEvent};

/// Format a connection state with color.
pub fn format_state(state: ConnectionState) -> String {
    match state {
        ConnectionState::Connected => "Connected".green().to_string(),
        ConnectionState::Connecting => "Connecting".yellow().to_string(),
        ConnectionState::Reconnecting => "Reconnecting".yellow().to_string(),
        ConnectionState::Failed => "Failed".red().to_string(),
        ConnectionState::Disconnected => "Disconnected".dimmed().to_string(),
    }
}

/// Format one telemetry event as a single display line.
pub fn format_event_line(event: &TelemetryEvent) -> String {
    match event {
        TelemetryEvent::Connected { inference_count } => format!(
            "{} stream open, {} inferences so far",
            "connected".green(),
            inference_count
        ),
        TelemetryEvent::Heartbeat { .. } => "heartbeat".dimmed().to_string(),
        TelemetryEvent::InferenceIteration {
            model,
            iteration,
            total,
            latency_ms,
            num_detections,
            ..
        } => format!(
            "{} [{}] {}/{}: {} objects, {:.1}ms",
            "iteration".cyan(),
            model,
            iteration,
            total,
            num_detections,
            latency_ms
        ),
        TelemetryEvent::ProfilingUpdate {
            model,
            iteration,
            total,
            avg_latency,
            ..
        } => format!(
            "{} [{}] {}/{} runs, avg {:.1}ms",
            "profiling".blue(),
            model,
            iteration,
            total,
            avg_latency
        ),
        TelemetryEvent::InferenceComplete { count, models, .. } => format!(
            "{} #{} ({})",
            "complete".green().bold(),
            count,
            models.join(", ")
        ),
        TelemetryEvent::Log { message, .. } => format!("{} {}", "log".dimmed(), message),
    }
}

/// Format a detection response as a per-variant summary table.
pub fn format_result_summary(response: &DetectResponse) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Model", "Objects", "Latency", "Avg Conf", "FPS"]);

    for (variant, result) in response.results() {
        let fps = if result.inference_time_ms > 0.0 {
            1000.0 / result.inference_time_ms
        } else {
            0.0
        };
        table.add_row(vec![
            Cell::new(variant.as_str()),
            Cell::new(result.num_objects),
            Cell::new(format!("{:.1}ms", result.inference_time_ms)),
            Cell::new(format!("{:.3}", result.avg_confidence)),
            Cell::new(format!("{:.1}", fps)),
        ]);
    }

    table.to_string()
}

/// Format one variant's detections.
pub fn format_detections_table(variant: ModelVariant, result: &ModelResult) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        format!("{} class", variant),
        "Confidence".to_string(),
        "Box".to_string(),
    ]);

    for detection in &result.detections {
        let [x1, y1, x2, y2] = detection.bbox;
        table.add_row(vec![
            Cell::new(&detection.class),
            Cell::new(format!("{:.3}", detection.confidence)),
            Cell::new(format!("({:.0},{:.0})-({:.0},{:.0})", x1, y1, x2, y2)),
        ]);
    }

    table.to_string()
}

/// Format the joined per-class AP comparison.
pub fn format_per_class_table(rows: &[ClassApComparison]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Class", "YOLOv5 AP", "DETR AP"]);

    for row in rows {
        table.add_row(vec![
            Cell::new(&row.class),
            Cell::new(format!("{:.4}", row.primary_ap)),
            Cell::new(format!("{:.4}", row.secondary_ap)),
        ]);
    }

    table.to_string()
}

/// Format a latency distribution.
pub fn format_latency_table(buckets: &[LatencyBucket]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Bucket (ms)", "Count"]);

    for bucket in buckets {
        table.add_row(vec![Cell::new(&bucket.bin), Cell::new(bucket.count)]);
    }

    table.to_string()
}

/// Format the full analytics snapshot.
pub fn format_analytics(snapshot: &AggregateAnalytics) -> String {
    let mut output = String::new();

    if snapshot.per_class.is_empty()
        && snapshot.yolo.latency_distribution.is_empty()
        && snapshot.detr.latency_distribution.is_empty()
    {
        output.push_str("No analytics yet - run an inference first.\n");
        return output;
    }

    if !snapshot.per_class.is_empty() {
        output.push_str(&format!("{}\n", "Per-class AP".bold()));
        output.push_str(&format_per_class_table(&snapshot.per_class));
        output.push('\n');
    }

    for variant in ModelVariant::ALL {
        let model = match variant {
            ModelVariant::Yolo => &snapshot.yolo,
            ModelVariant::Detr => &snapshot.detr,
        };
        if !model.latency_distribution.is_empty() {
            output.push_str(&format!(
                "\n{} latency distribution\n",
                variant.as_str().bold()
            ));
            output.push_str(&format_latency_table(&model.latency_distribution));
            output.push('\n');
        }
        if let Some(last) = model.fps_history.last() {
            output.push_str(&format!(
                "{} throughput: {:.1} fps over {} samples\n",
                variant,
                last.fps,
                model.fps_history.len()
            ));
        }
    }

    if let Some(at) = snapshot.last_refreshed {
        output.push_str(&format!("\nRefreshed at {}\n", at.to_rfc3339()));
    }

    output
}

/// Format analytics as JSON.
pub fn format_analytics_json(snapshot: &AggregateAnalytics) -> String {
    serde_json::to_string_pretty(snapshot).unwrap_or_else(|_| "{}".to_string())
}

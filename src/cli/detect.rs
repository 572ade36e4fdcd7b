//! Detect command implementation

use anyhow::{Context, Result};
use base64::Engine;

use crate::api::DetectRequest;
use crate::cli::output::{format_detections_table, format_per_class_table, format_result_summary};
use crate::cli::DetectArgs;
use crate::config::ClientConfig;
use crate::session::InferenceSession;

/// Run one inference through a full session and print the results.
pub async fn run_detect(config: &ClientConfig, args: &DetectArgs) -> Result<()> {
    let model = args
        .model
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    let bytes = std::fs::read(&args.image)
        .with_context(|| format!("Failed to read image {}", args.image.display()))?;
    let image = base64::engine::general_purpose::STANDARD.encode(&bytes);

    let session = InferenceSession::connect(config);

    let request = DetectRequest {
        image,
        model,
        conf_threshold: args.conf_threshold,
        iou_threshold: args.iou_threshold,
    };

    let outcome = session.run_inference(request).await;
    let response = match &outcome {
        Ok(Some(response)) => response,
        // A one-shot CLI run cannot be superseded, but the contract allows it.
        Ok(None) => {
            session.close().await;
            return Ok(());
        }
        Err(e) => {
            session.close().await;
            anyhow::bail!("{}", e);
        }
    };

    println!("{}", format_result_summary(response));
    for (variant, result) in response.results() {
        if !result.detections.is_empty() {
            println!("{}", format_detections_table(variant, result));
        }
    }

    let analytics = session.analytics();
    if !analytics.per_class.is_empty() {
        println!("{}", format_per_class_table(&analytics.per_class));
    }

    session.close().await;
    Ok(())
}

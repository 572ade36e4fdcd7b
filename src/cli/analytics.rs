//! Analytics command implementation

use std::sync::Arc;

use anyhow::Result;

use crate::analytics::AnalyticsAggregator;
use crate::api::HttpDetectionApi;
use crate::cli::output::{format_analytics, format_analytics_json};
use crate::cli::AnalyticsArgs;
use crate::config::ClientConfig;
use crate::orchestrator::RequestOrchestrator;

/// Fetch every analytics slice once and print the merged snapshot.
pub async fn run_analytics(config: &ClientConfig, args: &AnalyticsArgs) -> Result<()> {
    let api = Arc::new(HttpDetectionApi::new(
        config.api.base_url.clone(),
        config.api.timeout_seconds,
    ));
    let aggregator = AnalyticsAggregator::new(api, Arc::new(RequestOrchestrator::new()));

    aggregator.refresh().await;
    let snapshot = aggregator.current();

    if args.json {
        println!("{}", format_analytics_json(&snapshot));
    } else {
        print!("{}", format_analytics(&snapshot));
    }

    Ok(())
}

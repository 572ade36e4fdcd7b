//! Watch command implementation

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast::error::RecvError;

use crate::cli::output::{format_event_line, format_state};
use crate::cli::WatchArgs;
use crate::config::ClientConfig;
use crate::stream::{EventHistory, HttpEventSource, StreamClient};

/// Tail the backend's telemetry stream until Ctrl-C.
pub async fn run_watch(config: &ClientConfig, args: &WatchArgs) -> Result<()> {
    let source = Arc::new(HttpEventSource::new(config.api.base_url.clone()));
    println!("Watching {} (Ctrl-C to stop)", source.url());

    let sink = Arc::new(EventHistory::new(config.history.capacity));
    let client = StreamClient::connect(source, sink, config.stream.clone());

    let mut events = client.subscribe();
    let mut states = client.state_changes();
    // The initial Disconnected state is not worth printing.
    states.mark_unchanged();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("Stopping");
                break;
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                println!("[{}]", format_state(state));
            }
            event = events.recv() => match event {
                Ok(event) => {
                    if args.json {
                        println!("{}", serde_json::to_string(&event)?);
                    } else {
                        println!("{}", format_event_line(&event));
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    eprintln!("Warning: dropped {} events (consumer too slow)", missed);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    client.close().await;
    Ok(())
}

//! Resilient telemetry stream client.
//!
//! Maintains one long-lived server-push connection: connect, parse,
//! dispatch, detect failure, and reconnect with bounded exponential
//! backoff. Connection state is observable through a watch channel and
//! events fan out to subscribers while also landing in bounded history
//! sinks.

mod config;
mod error;
mod event;
mod source;

pub use config::StreamConfig;
pub use error::StreamError;
pub use event::{EventHistory, TelemetryEvent};
pub use source::{parse_sse_frame, EventSource, EventStream, HttpEventSource};

use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Connection lifecycle of a [`StreamClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected and not trying to be.
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// Live and receiving events.
    Connected,
    /// Lost the connection; a retry is scheduled.
    Reconnecting,
    /// Retries exhausted; only an explicit `reconnect()` resumes.
    Failed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

enum StreamCommand {
    Reconnect,
}

/// Handle to the background stream task.
///
/// Constructed with [`StreamClient::connect`]; lives until [`close`]
/// (terminal) or drop. One instance owns the connection state; readers
/// observe it but never mutate it.
///
/// [`close`]: StreamClient::close
pub struct StreamClient {
    state_rx: watch::Receiver<ConnectionState>,
    events_tx: broadcast::Sender<TelemetryEvent>,
    command_tx: mpsc::Sender<StreamCommand>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StreamClient {
    /// Spawn the connect/read/retry loop against `source`, recording
    /// non-heartbeat events into `sink`.
    pub fn connect(
        source: Arc<dyn EventSource>,
        sink: Arc<EventHistory>,
        config: StreamConfig,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (events_tx, _) = broadcast::channel(256);
        let (command_tx, command_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_loop(
            source,
            sink,
            config,
            state_tx,
            events_tx.clone(),
            command_rx,
            cancel.clone(),
        ));

        Self {
            state_rx,
            events_tx,
            command_tx,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch receiver tracking state transitions.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Subscribe to dispatched events (heartbeats excluded).
    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryEvent> {
        self.events_tx.subscribe()
    }

    /// Force a fresh connection attempt immediately.
    ///
    /// Cancels any pending retry timer and resets the attempt counter -
    /// this is the only path that resets backoff state. Works from any
    /// non-terminal state, including `Failed`.
    pub async fn reconnect(&self) {
        let _ = self.command_tx.send(StreamCommand::Reconnect).await;
    }

    /// Tear the connection down. Terminal: the task exits and no retry
    /// will ever be scheduled again.
    pub async fn close(&self) {
        self.cancel.cancel();
        let task = self.task.lock().unwrap().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_loop(
    source: Arc<dyn EventSource>,
    sink: Arc<EventHistory>,
    config: StreamConfig,
    state_tx: watch::Sender<ConnectionState>,
    events_tx: broadcast::Sender<TelemetryEvent>,
    mut command_rx: mpsc::Receiver<StreamCommand>,
    cancel: CancellationToken,
) {
    let mut attempts: u32 = 0;

    'connect: loop {
        let _ = state_tx.send(ConnectionState::Connecting);

        let opened = tokio::select! {
            _ = cancel.cancelled() => break 'connect,
            cmd = command_rx.recv() => match cmd {
                Some(StreamCommand::Reconnect) => {
                    attempts = 0;
                    let _ = state_tx.send(ConnectionState::Disconnected);
                    continue 'connect;
                }
                None => break 'connect,
            },
            opened = source.open() => opened,
        };

        match opened {
            Ok(mut stream) => {
                let _ = state_tx.send(ConnectionState::Connected);
                metrics::counter!("duolens_stream_connects_total").increment(1);
                tracing::info!("Telemetry stream connected");

                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break 'connect,
                        cmd = command_rx.recv() => match cmd {
                            Some(StreamCommand::Reconnect) => {
                                attempts = 0;
                                let _ = state_tx.send(ConnectionState::Disconnected);
                                continue 'connect;
                            }
                            None => break 'connect,
                        },
                        item = stream.next() => match item {
                            Some(Ok(event)) => dispatch(&sink, &events_tx, event),
                            Some(Err(e)) => {
                                tracing::warn!(error = %e, "Telemetry stream transport error");
                                break;
                            }
                            None => {
                                tracing::warn!("Telemetry stream closed by server");
                                break;
                            }
                        },
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, attempt = attempts, "Failed to open telemetry stream");
            }
        }

        // Connection lost or never opened.
        attempts += 1;
        if attempts >= config.max_attempts {
            let _ = state_tx.send(ConnectionState::Failed);
            metrics::counter!("duolens_stream_exhausted_total").increment(1);
            tracing::error!(
                attempts,
                "Reconnect attempts exhausted; waiting for explicit reconnect"
            );

            tokio::select! {
                _ = cancel.cancelled() => break 'connect,
                cmd = command_rx.recv() => match cmd {
                    Some(StreamCommand::Reconnect) => {
                        attempts = 0;
                        let _ = state_tx.send(ConnectionState::Disconnected);
                        continue 'connect;
                    }
                    None => break 'connect,
                },
            }
        }

        let delay = config.backoff_delay(attempts - 1);
        let _ = state_tx.send(ConnectionState::Reconnecting);
        metrics::counter!("duolens_stream_reconnects_total").increment(1);
        tracing::info!(
            attempt = attempts,
            delay_ms = delay.as_millis() as u64,
            "Scheduling reconnect"
        );

        // A Reconnect command here drops the pending timer with the select,
        // so a manual reconnect can never race a scheduled retry.
        tokio::select! {
            _ = cancel.cancelled() => break 'connect,
            cmd = command_rx.recv() => match cmd {
                Some(StreamCommand::Reconnect) => {
                    attempts = 0;
                    let _ = state_tx.send(ConnectionState::Disconnected);
                }
                None => break 'connect,
            },
            _ = tokio::time::sleep(delay) => {}
        }
    }

    let _ = state_tx.send(ConnectionState::Disconnected);
    tracing::info!("Telemetry stream client stopped");
}

fn dispatch(
    sink: &EventHistory,
    events_tx: &broadcast::Sender<TelemetryEvent>,
    event: TelemetryEvent,
) {
    if event.is_heartbeat() {
        tracing::trace!("Heartbeat");
        return;
    }

    metrics::counter!("duolens_stream_events_total", "kind" => event.kind()).increment(1);
    sink.record(&event);
    // Ignore error if no subscribers are listening
    let _ = events_tx.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Scripted source: each `open()` pops the next step.
    struct ScriptedSource {
        steps: Mutex<VecDeque<ScriptStep>>,
    }

    enum ScriptStep {
        Fail,
        /// Deliver these items, then end the stream (server close).
        Deliver(Vec<Result<TelemetryEvent, StreamError>>),
        /// Deliver these items, then stay open forever.
        DeliverAndHold(Vec<Result<TelemetryEvent, StreamError>>),
    }

    impl ScriptedSource {
        fn new(steps: Vec<ScriptStep>) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into()),
            })
        }
    }

    #[async_trait::async_trait]
    impl EventSource for ScriptedSource {
        async fn open(&self) -> Result<EventStream, StreamError> {
            let step = self.steps.lock().unwrap().pop_front();
            match step {
                Some(ScriptStep::Fail) | None => {
                    Err(StreamError::Connect("connection refused".to_string()))
                }
                Some(ScriptStep::Deliver(items)) => {
                    Ok(Box::pin(futures_util::stream::iter(items)))
                }
                Some(ScriptStep::DeliverAndHold(items)) => {
                    let head = futures_util::stream::iter(items);
                    let tail = futures_util::stream::pending();
                    Ok(Box::pin(head.chain(tail)))
                }
            }
        }
    }

    fn test_config(max_attempts: u32) -> StreamConfig {
        StreamConfig {
            base_delay_ms: 1000,
            growth_factor: 2.0,
            max_delay_ms: 30_000,
            max_attempts,
        }
    }

    fn log_event(message: &str) -> TelemetryEvent {
        TelemetryEvent::Log {
            message: message.to_string(),
            timestamp: 0.0,
        }
    }

    async fn wait_for_state(client: &StreamClient, wanted: ConnectionState) {
        let mut rx = client.state_changes();
        rx.wait_for(|s| *s == wanted).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_are_recorded_and_broadcast() {
        let source = ScriptedSource::new(vec![ScriptStep::DeliverAndHold(vec![
            Ok(TelemetryEvent::Connected { inference_count: 0 }),
            Ok(TelemetryEvent::Heartbeat { inference_count: 0 }),
            Ok(log_event("warmup done")),
        ])]);
        let sink = Arc::new(EventHistory::new(10));
        let client = StreamClient::connect(source, sink.clone(), test_config(3));
        let mut events = client.subscribe();

        wait_for_state(&client, ConnectionState::Connected).await;

        // Heartbeat is dropped: subscribers see connected then log.
        assert_eq!(events.recv().await.unwrap().kind(), "connected");
        assert_eq!(events.recv().await.unwrap().kind(), "log");

        let kinds: Vec<_> = sink.events().iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec!["connected", "log"]);

        client.close().await;
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_schedule_then_failed() {
        // Every open() fails; with max_attempts = 3 the client should wait
        // 1s then 2s, then give up on the third consecutive failure.
        let source = ScriptedSource::new(vec![]);
        let sink = Arc::new(EventHistory::new(10));
        let started = tokio::time::Instant::now();
        let client = StreamClient::connect(source, sink, test_config(3));

        wait_for_state(&client, ConnectionState::Failed).await;
        let elapsed = started.elapsed();

        // 1s + 2s of scheduled retries; no third timer.
        assert!(elapsed >= Duration::from_secs(3), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(4), "elapsed {:?}", elapsed);

        // No further automatic retry: state stays Failed.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(client.state(), ConnectionState::Failed);

        client.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_doubles_across_failures() {
        // Three consecutive failures schedule retries at 1s, 2s and 4s;
        // the fourth attempt connects.
        let source = ScriptedSource::new(vec![
            ScriptStep::Fail,
            ScriptStep::Fail,
            ScriptStep::Fail,
            ScriptStep::DeliverAndHold(vec![Ok(TelemetryEvent::Connected {
                inference_count: 0,
            })]),
        ]);
        let sink = Arc::new(EventHistory::new(10));
        let started = tokio::time::Instant::now();
        let client = StreamClient::connect(source, sink, test_config(10));

        wait_for_state(&client, ConnectionState::Connected).await;
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(7), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(8), "elapsed {:?}", elapsed);

        client.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_resets_attempts_after_failed() {
        let source = ScriptedSource::new(vec![
            // Exhaust two attempts straight to Failed...
            ScriptStep::Fail,
            ScriptStep::Fail,
            // ...then succeed once reconnect() is called.
            ScriptStep::DeliverAndHold(vec![Ok(TelemetryEvent::Connected {
                inference_count: 4,
            })]),
        ]);
        let sink = Arc::new(EventHistory::new(10));
        let client = StreamClient::connect(source, sink, test_config(2));

        wait_for_state(&client, ConnectionState::Failed).await;

        client.reconnect().await;
        wait_for_state(&client, ConnectionState::Connected).await;

        client.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_close_triggers_reconnect() {
        let source = ScriptedSource::new(vec![
            ScriptStep::Deliver(vec![Ok(log_event("first epoch"))]),
            ScriptStep::DeliverAndHold(vec![Ok(log_event("second epoch"))]),
        ]);
        let sink = Arc::new(EventHistory::new(10));
        let client = StreamClient::connect(source, sink.clone(), test_config(5));
        let mut events = client.subscribe();

        // First connection delivers one event, then the server closes;
        // the client schedules a retry and reconnects. Receiving the
        // second epoch's event proves the retry went through.
        let first = events.recv().await.unwrap();
        let second = events.recv().await.unwrap();
        assert_eq!(first.kind(), "log");
        assert_eq!(second.kind(), "log");

        assert_eq!(sink.events().len(), 2);
        client.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_is_retried() {
        let source = ScriptedSource::new(vec![
            ScriptStep::Deliver(vec![
                Ok(log_event("before drop")),
                Err(StreamError::Transport("reset by peer".to_string())),
            ]),
            ScriptStep::DeliverAndHold(vec![Ok(log_event("after drop"))]),
        ]);
        let sink = Arc::new(EventHistory::new(10));
        let client = StreamClient::connect(source, sink.clone(), test_config(5));
        let mut events = client.subscribe();

        events.recv().await.unwrap();
        events.recv().await.unwrap();

        assert_eq!(sink.events().len(), 2);
        client.close().await;
    }
}

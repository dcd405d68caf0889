//! # Stream protocol
//! Frames one engine run as an ordered event sequence: `connected` first
//! (sequence 0), interleaved progress events, exactly one terminal
//! (`completed` or `error`). Heartbeats are injected whenever the engine
//! stays quiet past the configured idle interval so the transport
//! connection survives slow phases; they carry sequence numbers like any
//! event but never affect completion logic.

pub mod sse;

use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use crate::engine::EngineEvent;

/// One framed event on the wire: type + monotonically increasing sequence +
/// wall-clock timestamp + payload. The same fields are mirrored into the
/// JSON body so SSE clients that ignore framing lines lose nothing.
#[derive(Debug, Clone, Serialize)]
pub struct StreamEvent {
    pub event_type: String,
    pub sequence: u64,
    pub data: Value,
}

impl StreamEvent {
    fn new(event_type: &str, sequence: u64, mut data: Value) -> Self {
        let timestamp = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;
        if let Value::Object(map) = &mut data {
            map.insert("type".to_string(), json!(event_type));
            map.insert("sequence".to_string(), json!(sequence));
            map.insert("timestamp".to_string(), json!(timestamp));
        }
        Self {
            event_type: event_type.to_string(),
            sequence,
            data,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.event_type == "completed" || self.event_type == "error"
    }

    /// Render as one SSE block. The initial `connected` frame carries a
    /// client retry directive.
    pub fn to_sse(&self) -> String {
        let retry = (self.event_type == "connected").then_some(sse::RETRY_MS);
        sse::format_event(&self.event_type, &self.data, Some(self.sequence), retry)
    }
}

pub struct StreamProtocol {
    heartbeat_interval: Duration,
}

impl StreamProtocol {
    pub fn new(heartbeat_interval: Duration) -> Self {
        Self { heartbeat_interval }
    }

    /// Wrap an engine event channel into the framed, heartbeat-injected
    /// stream. Dropping the returned stream tears the whole pipeline down:
    /// the pump stops, its engine receiver drops, and the engine's next
    /// send aborts the run.
    pub fn stream(self, events: mpsc::Receiver<EngineEvent>) -> ReceiverStream<StreamEvent> {
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move { self.pump(events, tx).await });
        ReceiverStream::new(rx)
    }

    async fn pump(self, mut events: mpsc::Receiver<EngineEvent>, tx: mpsc::Sender<StreamEvent>) {
        let mut seq = 0u64;

        if emit(
            &tx,
            &mut seq,
            "connected",
            json!({"message": "Research pipeline connected"}),
        )
        .await
        .is_err()
        {
            return;
        }

        let mut saw_complete = false;
        loop {
            match timeout(self.heartbeat_interval, events.recv()).await {
                // Idle gap: keep the connection alive.
                Err(_) => {
                    let sent = emit(
                        &tx,
                        &mut seq,
                        "heartbeat",
                        json!({"message": "Connection alive"}),
                    )
                    .await;
                    if sent.is_err() {
                        notify_disconnected(&tx, seq);
                        return;
                    }
                }
                // Engine channel closed: exactly one terminal frame.
                Ok(None) => {
                    if saw_complete {
                        let payload = json!({
                            "message": "Research pipeline completed successfully",
                            "total_events": seq,
                        });
                        let _ = emit(&tx, &mut seq, "completed", payload).await;
                    } else {
                        let _ = emit(
                            &tx,
                            &mut seq,
                            "error",
                            json!({
                                "message": "pipeline ended before reporting completion",
                                "recoverable": false,
                            }),
                        )
                        .await;
                    }
                    return;
                }
                Ok(Some(event)) => {
                    saw_complete |= event.is_pipeline_complete();
                    let name = event.name();
                    match serde_json::to_value(&event) {
                        Ok(data) => {
                            if emit(&tx, &mut seq, name, data).await.is_err() {
                                notify_disconnected(&tx, seq);
                                return;
                            }
                        }
                        Err(err) => {
                            // Formatting faults end the stream gracefully,
                            // never as an unhandled failure.
                            let _ = emit(
                                &tx,
                                &mut seq,
                                "error",
                                json!({
                                    "message": format!("failed to encode event: {err}"),
                                    "recoverable": false,
                                }),
                            )
                            .await;
                            return;
                        }
                    }
                }
            }
        }
    }
}

async fn emit(
    tx: &mpsc::Sender<StreamEvent>,
    seq: &mut u64,
    event_type: &str,
    data: Value,
) -> Result<(), ()> {
    let event = StreamEvent::new(event_type, *seq, data);
    *seq += 1;
    tx.send(event).await.map_err(|_| ())
}

/// Best-effort disconnect notice; the consumer is usually gone already.
fn notify_disconnected(tx: &mpsc::Sender<StreamEvent>, seq: u64) {
    debug!("stream consumer went away");
    let event = StreamEvent::new("disconnected", seq, json!({"message": "Client disconnected"}));
    let _ = tx.try_send(event);
}

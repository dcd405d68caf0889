//! Server-Sent Events line framing. Small and dependency-free on purpose:
//! the protocol layer owns sequencing and payloads, this module only turns
//! them into `id:`/`retry:`/`event:`/`data:` blocks.

use serde_json::Value;

/// Retry directive attached to the initial `connected` frame.
pub const RETRY_MS: u64 = 1000;

/// Format one SSE event block, terminated by the required blank line.
pub fn format_event(
    event_type: &str,
    data: &Value,
    event_id: Option<u64>,
    retry_ms: Option<u64>,
) -> String {
    let mut lines = Vec::with_capacity(5);
    if let Some(id) = event_id {
        lines.push(format!("id: {id}"));
    }
    if let Some(retry) = retry_ms {
        lines.push(format!("retry: {retry}"));
    }
    lines.push(format!("event: {event_type}"));
    lines.push(format!("data: {data}"));
    lines.push(String::new());
    lines.join("\n") + "\n"
}

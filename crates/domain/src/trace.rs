use serde::Serialize;

/// Structured trace events emitted across all open-live crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    ControlPlaneCall {
        endpoint: String,
        /// Business-level `code` from the response body, when present.
        code: Option<i64>,
        duration_ms: u64,
    },
    SessionStarted {
        game_id: String,
    },
    SessionEnded {
        game_id: String,
        reason: String,
    },
    SocketOpened {
        url: String,
    },
    SocketClosed {
        reason: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "ol_event");
    }
}

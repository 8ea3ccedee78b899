//! Observer sink fan-out.
//!
//! Each observer connection registers an unbounded sender of pre-serialized
//! payloads; broadcasting serializes the state once and pushes it to every
//! sink for the session. A send failure means the receiving task is gone,
//! so the sink is pruned. Sends never block the controller.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

use crate::runtime::state::SessionStateView;

/// Identifier handed back on attach so the connection can detach itself.
pub type SinkId = u64;

struct Sink {
    id: SinkId,
    tx: mpsc::UnboundedSender<String>,
}

/// Per-session observer sink registry.
#[derive(Default)]
pub struct Broadcaster {
    sinks: DashMap<String, Vec<Sink>>,
    next_sink_id: AtomicU64,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink for a session; returns its id and the payload
    /// receiver the connection task should drain.
    pub fn attach(&self, session_id: &str) -> (SinkId, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_sink_id.fetch_add(1, Ordering::Relaxed);
        self.sinks
            .entry(session_id.to_string())
            .or_default()
            .push(Sink { id, tx });
        (id, rx)
    }

    pub fn detach(&self, session_id: &str, sink_id: SinkId) {
        if let Some(mut sinks) = self.sinks.get_mut(session_id) {
            sinks.retain(|sink| sink.id != sink_id);
        }
    }

    /// Serialize the state once and push it to every sink of the session.
    /// Sinks whose receiver has gone away are dropped.
    pub fn broadcast(&self, session_id: &str, state: &SessionStateView) {
        let Some(mut sinks) = self.sinks.get_mut(session_id) else {
            return;
        };
        if sinks.is_empty() {
            return;
        }

        let payload =
            match serde_json::to_string(&serde_json::json!({ "type": "state", "state": state })) {
                Ok(payload) => payload,
                Err(e) => {
                    debug!(session_id, error = %e, "Failed to serialize state payload");
                    return;
                }
            };

        let before = sinks.len();
        sinks.retain(|sink| sink.tx.send(payload.clone()).is_ok());
        let dropped = before - sinks.len();
        if dropped > 0 {
            debug!(session_id, dropped, "Pruned dead observer sinks");
        }
    }

    pub fn sink_count(&self, session_id: &str) -> usize {
        self.sinks
            .get(session_id)
            .map(|sinks| sinks.len())
            .unwrap_or(0)
    }

    /// Drop every sink of a session (cancel/reset path).
    pub fn clear_session(&self, session_id: &str) {
        self.sinks.remove(session_id);
    }
}

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use ante_core::action::Verb;
use ante_core::state::GameOverStats;
use ante_core::store::TurnEntry;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Buffered messages per observer before it counts as stalled.
const OBSERVER_BUFFER: usize = 256;

/// Everything pushed to observers. Serialized with a `type` tag.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObserverMessage {
    /// Sent once to each new observer: recent entries across runs.
    History { data: Vec<TurnEntry> },
    StateUpdate {
        run_id: String,
        turn: u64,
        timestamp: DateTime<Utc>,
        game_state: Value,
        state_string: String,
        prompt: String,
    },
    DecisionResponse {
        run_id: String,
        turn: u64,
        timestamp: DateTime<Utc>,
        action: Verb,
        positions: Vec<i64>,
        reasoning: String,
    },
    Reflection {
        run_id: String,
        timestamp: DateTime<Utc>,
        reflection: String,
        #[serde(flatten)]
        stats: Option<GameOverStats>,
    },
}

impl ObserverMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ObserverMessage::History { .. } => "history",
            ObserverMessage::StateUpdate { .. } => "state_update",
            ObserverMessage::DecisionResponse { .. } => "decision_response",
            ObserverMessage::Reflection { .. } => "reflection",
        }
    }
}

struct Observer {
    id: u64,
    tx: mpsc::Sender<ObserverMessage>,
}

/// Fan-out to connected observers. A send that fails (the observer went
/// away or stopped reading) drops that observer; nobody else is affected.
#[derive(Default)]
pub struct ObserverHub {
    next_id: AtomicU64,
    observers: Mutex<Vec<Observer>>,
}

impl ObserverHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer, optionally seeding its queue with a first message.
    pub fn subscribe(&self, first: Option<ObserverMessage>) -> mpsc::Receiver<ObserverMessage> {
        let (tx, rx) = mpsc::channel(OBSERVER_BUFFER);
        if let Some(msg) = first {
            // Fresh channel with spare capacity; cannot fail.
            let _ = tx.try_send(msg);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut observers) = self.observers.lock() {
            observers.push(Observer { id, tx });
        }
        debug!(observer = id, "observer connected");
        rx
    }

    pub fn observer_count(&self) -> usize {
        self.observers.lock().map(|o| o.len()).unwrap_or(0)
    }

    pub fn publish(&self, msg: ObserverMessage) {
        let Ok(mut observers) = self.observers.lock() else {
            return;
        };
        observers.retain(|o| match o.tx.try_send(msg.clone()) {
            Ok(()) => true,
            Err(e) => {
                warn!(observer = o.id, kind = msg.kind(), error = %e, "dropping observer");
                false
            }
        });
    }
}

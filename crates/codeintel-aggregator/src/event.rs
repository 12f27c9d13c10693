//! Events consumed by the aggregator's event loop
//!
//! Provider readiness, partial responses and deadline expiry all travel
//! through one unbounded channel so that they are processed one at a time,
//! in arrival order.

use tokio::sync::mpsc;
use tracing::debug;

use crate::types::{ProviderResponse, RequestId};

/// Event processed by the aggregator
#[derive(Debug, Clone, PartialEq)]
pub enum AggregatorEvent {
    /// A provider raised its readiness signal
    ProviderReady {
        /// Provider identifier
        provider_id: String,
    },
    /// A provider answered an aggregate request
    Response {
        /// Provider identifier
        provider_id: String,
        /// Aggregate request the answer belongs to
        request_id: RequestId,
        /// The answer
        response: ProviderResponse,
    },
    /// The deadline of an aggregate request expired
    Timeout {
        /// Aggregate request whose deadline fired
        request_id: RequestId,
    },
}

/// Sending half of the event channel
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<AggregatorEvent>,
}

impl EventSender {
    /// Post an event; dropped silently once the event loop is gone
    pub fn post(&self, event: AggregatorEvent) {
        if let Err(e) = self.tx.send(event) {
            debug!(event = ?e.0, "Event loop closed, dropping event");
        }
    }
}

/// Create the event channel
pub fn channel() -> (EventSender, mpsc::UnboundedReceiver<AggregatorEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, rx)
}

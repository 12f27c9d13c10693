//! One-shot request deadlines

use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::event::{AggregatorEvent, EventSender};
use crate::types::RequestId;

/// How a deadline was armed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    /// A timer will post the timeout after the given delay
    Armed(Duration),
    /// The request counts as timed out from the start
    Immediate,
}

/// Arms one timeout per aggregate request
///
/// Each deadline posts exactly one [`AggregatorEvent::Timeout`]. Timers are
/// never re-armed; a deadline firing for a request that already resolved is
/// ignored by the ledger.
#[derive(Debug, Clone)]
pub struct TimeoutScheduler {
    events: EventSender,
}

impl TimeoutScheduler {
    /// Create a scheduler posting to `events`
    pub fn new(events: EventSender) -> Self {
        Self { events }
    }

    /// Arm the deadline of `request_id`
    ///
    /// A zero `duration` means "do not wait": the timeout is posted right
    /// away, ahead of any provider response. Outside a Tokio runtime the
    /// deadline degrades to immediate as well.
    pub fn arm(&self, request_id: RequestId, duration: Duration) -> Deadline {
        if duration.is_zero() {
            self.events.post(AggregatorEvent::Timeout { request_id });
            return Deadline::Immediate;
        }

        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(request_id, "No async runtime available, request times out immediately");
                self.events.post(AggregatorEvent::Timeout { request_id });
                return Deadline::Immediate;
            }
        };

        let events = self.events.clone();
        handle.spawn(async move {
            tokio::time::sleep(duration).await;
            debug!(request_id, "Request deadline reached");
            events.post(AggregatorEvent::Timeout { request_id });
        });
        Deadline::Armed(duration)
    }
}

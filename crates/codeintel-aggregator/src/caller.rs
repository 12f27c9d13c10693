//! Caller handles: where merged answers are delivered

use std::fmt;
use std::sync::{Arc, Weak};

use serde_json::Value;
use tracing::debug;

use crate::error::{AggregatorError, AggregatorResult};
use crate::types::{MergedResponse, RequestType};

/// Receiver of merged answers, typically an editor view
pub trait ResponseHandler: Send + Sync {
    /// Deliver the merged answer of one aggregate request
    ///
    /// Return [`AggregatorError::TargetGone`] when the underlying view has
    /// been destroyed; the aggregator treats any error as a dropped delivery.
    fn handle_response(
        &self,
        request_type: RequestType,
        response: MergedResponse,
    ) -> AggregatorResult<()>;
}

/// Non-owning reference to a [`ResponseHandler`]
///
/// The aggregator never keeps a view alive: once the last strong reference
/// is dropped, deliveries become no-ops. Two handles compare equal when they
/// point at the same handler.
#[derive(Clone)]
pub struct CallerHandle {
    target: Weak<dyn ResponseHandler>,
    key: usize,
}

impl CallerHandle {
    /// Create a handle for a concrete handler
    pub fn new<H: ResponseHandler + 'static>(handler: &Arc<H>) -> Self {
        let key = Arc::as_ptr(handler) as *const () as usize;
        let weak: Weak<H> = Arc::downgrade(handler);
        let target: Weak<dyn ResponseHandler> = weak;
        Self { target, key }
    }

    /// Create a handle for a type-erased handler
    pub fn from_dyn(handler: &Arc<dyn ResponseHandler>) -> Self {
        let key = Arc::as_ptr(handler) as *const () as usize;
        Self {
            target: Arc::downgrade(handler),
            key,
        }
    }

    /// Whether the handler still exists
    pub fn is_alive(&self) -> bool {
        self.target.strong_count() > 0
    }

    /// Whether both handles refer to the same handler
    pub fn same_target(&self, other: &CallerHandle) -> bool {
        self.key == other.key
    }

    /// Deliver an answer; returns whether the handler accepted it
    pub(crate) fn deliver(&self, request_type: RequestType, response: MergedResponse) -> bool {
        let Some(handler) = self.target.upgrade() else {
            debug!(%request_type, "Response target dropped, discarding answer");
            return false;
        };

        match handler.handle_response(request_type, response) {
            Ok(()) => true,
            Err(AggregatorError::TargetGone) => {
                debug!(%request_type, "Response target gone, discarding answer");
                false
            }
            Err(e) => {
                debug!(%request_type, error = %e, "Response handler rejected answer");
                false
            }
        }
    }
}

impl PartialEq for CallerHandle {
    fn eq(&self, other: &Self) -> bool {
        self.same_target(other)
    }
}

impl Eq for CallerHandle {}

impl fmt::Debug for CallerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallerHandle")
            .field("key", &format_args!("{:#x}", self.key))
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Aggregate request as issued by the editor layer
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Where the merged answer goes
    pub caller: CallerHandle,
    /// Request body forwarded to providers
    pub params: Value,
}

impl CompletionRequest {
    /// Create a request
    pub fn new(caller: CallerHandle, params: Value) -> Self {
        Self { caller, params }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<RequestType>>,
    }

    impl ResponseHandler for Recorder {
        fn handle_response(
            &self,
            request_type: RequestType,
            _response: MergedResponse,
        ) -> AggregatorResult<()> {
            self.seen.lock().push(request_type);
            Ok(())
        }
    }

    struct ClosedView;

    impl ResponseHandler for ClosedView {
        fn handle_response(
            &self,
            _request_type: RequestType,
            _response: MergedResponse,
        ) -> AggregatorResult<()> {
            Err(AggregatorError::TargetGone)
        }
    }

    #[test]
    fn test_deliver_to_live_handler() {
        let recorder = Arc::new(Recorder::default());
        let handle = CallerHandle::new(&recorder);

        assert!(handle.deliver(RequestType::Hover, MergedResponse::Single(Value::Null)));
        assert_eq!(*recorder.seen.lock(), vec![RequestType::Hover]);
    }

    #[test]
    fn test_deliver_to_dropped_handler() {
        let recorder = Arc::new(Recorder::default());
        let handle = CallerHandle::new(&recorder);
        drop(recorder);

        assert!(!handle.is_alive());
        assert!(!handle.deliver(RequestType::Hover, MergedResponse::Single(Value::Null)));
    }

    #[test]
    fn test_deliver_to_closed_view() {
        let view = Arc::new(ClosedView);
        let handle = CallerHandle::new(&view);

        assert!(!handle.deliver(RequestType::Hover, MergedResponse::Single(Value::Null)));
    }

    #[test]
    fn test_handle_identity() {
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());

        assert_eq!(CallerHandle::new(&first), CallerHandle::new(&first));
        assert_ne!(CallerHandle::new(&first), CallerHandle::new(&second));

        let erased: Arc<dyn ResponseHandler> = first.clone();
        assert_eq!(CallerHandle::from_dyn(&erased), CallerHandle::new(&first));
    }
}

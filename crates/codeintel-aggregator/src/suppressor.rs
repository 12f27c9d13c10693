//! Stale-request suppression
//!
//! For request types where only the latest answer matters (completion by
//! default), a resolving request is dropped when a newer request of the same
//! type from the same caller is still pending, or has already been delivered.

use std::collections::HashSet;

use crate::caller::CallerHandle;
use crate::ledger::{PendingRequest, RequestLedger};
use crate::types::{RequestId, RequestType};

/// Whether `request` has been superseded by a newer pending request
pub fn is_superseded(
    ledger: &RequestLedger,
    request: &PendingRequest,
    skip_intermediate: &HashSet<RequestType>,
) -> bool {
    if !skip_intermediate.contains(&request.request_type) {
        return false;
    }

    ledger.pending().any(|other| {
        other.id > request.id
            && other.request_type == request.request_type
            && other.caller.same_target(&request.caller)
    })
}

/// Highest delivered request id per caller and request type
#[derive(Debug, Default)]
pub struct DeliveryWatermarks {
    marks: Vec<(CallerHandle, RequestType, RequestId)>,
}

impl DeliveryWatermarks {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember that `request` was delivered
    pub fn record(&mut self, request: &PendingRequest) {
        self.marks.retain(|(caller, _, _)| caller.is_alive());

        let existing = self.marks.iter_mut().find(|(caller, request_type, _)| {
            *request_type == request.request_type && caller.same_target(&request.caller)
        });
        match existing {
            Some((_, _, id)) => *id = (*id).max(request.id),
            None => self
                .marks
                .push((request.caller.clone(), request.request_type, request.id)),
        }
    }

    /// Whether a newer request for the same caller was already delivered
    pub fn is_outdated(&self, request: &PendingRequest) -> bool {
        self.marks.iter().any(|(caller, request_type, id)| {
            *request_type == request.request_type
                && *id > request.id
                && caller.same_target(&request.caller)
        })
    }

    /// Number of tracked callers
    pub fn len(&self) -> usize {
        self.marks.len()
    }

    /// Whether nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caller::{CallerHandle, ResponseHandler};
    use crate::error::AggregatorResult;
    use crate::types::MergedResponse;
    use std::sync::Arc;

    struct NullView;

    impl ResponseHandler for NullView {
        fn handle_response(&self, _: RequestType, _: MergedResponse) -> AggregatorResult<()> {
            Ok(())
        }
    }

    fn skip_completion() -> HashSet<RequestType> {
        [RequestType::Completion].into_iter().collect()
    }

    #[test]
    fn test_newer_request_from_same_caller_supersedes() {
        let view = Arc::new(NullView);
        let mut ledger = RequestLedger::new();
        let older = ledger.open("python", RequestType::Completion, CallerHandle::new(&view));
        let _newer = ledger.open("python", RequestType::Completion, CallerHandle::new(&view));

        let request = ledger.close(older).unwrap();
        assert!(is_superseded(&ledger, &request, &skip_completion()));
    }

    #[test]
    fn test_newest_request_is_not_superseded() {
        let view = Arc::new(NullView);
        let mut ledger = RequestLedger::new();
        let _older = ledger.open("python", RequestType::Completion, CallerHandle::new(&view));
        let newer = ledger.open("python", RequestType::Completion, CallerHandle::new(&view));

        let request = ledger.close(newer).unwrap();
        assert!(!is_superseded(&ledger, &request, &skip_completion()));
    }

    #[test]
    fn test_other_callers_do_not_supersede() {
        let first = Arc::new(NullView);
        let second = Arc::new(NullView);
        let mut ledger = RequestLedger::new();
        let older = ledger.open("python", RequestType::Completion, CallerHandle::new(&first));
        let _other = ledger.open("python", RequestType::Completion, CallerHandle::new(&second));

        let request = ledger.close(older).unwrap();
        assert!(!is_superseded(&ledger, &request, &skip_completion()));
    }

    #[test]
    fn test_other_request_types_do_not_supersede() {
        let view = Arc::new(NullView);
        let mut ledger = RequestLedger::new();
        let older = ledger.open("python", RequestType::Completion, CallerHandle::new(&view));
        let _hover = ledger.open("python", RequestType::Hover, CallerHandle::new(&view));

        let request = ledger.close(older).unwrap();
        assert!(!is_superseded(&ledger, &request, &skip_completion()));
    }

    #[test]
    fn test_unflagged_types_always_deliver() {
        let view = Arc::new(NullView);
        let mut ledger = RequestLedger::new();
        let older = ledger.open("python", RequestType::Hover, CallerHandle::new(&view));
        let _newer = ledger.open("python", RequestType::Hover, CallerHandle::new(&view));

        let request = ledger.close(older).unwrap();
        assert!(!is_superseded(&ledger, &request, &skip_completion()));
    }

    #[test]
    fn test_watermark_drops_older_after_newer_delivery() {
        let view = Arc::new(NullView);
        let mut ledger = RequestLedger::new();
        let older = ledger.open("python", RequestType::Completion, CallerHandle::new(&view));
        let newer = ledger.open("python", RequestType::Completion, CallerHandle::new(&view));
        let mut marks = DeliveryWatermarks::new();

        let newer = ledger.close(newer).unwrap();
        assert!(!marks.is_outdated(&newer));
        marks.record(&newer);

        let older = ledger.close(older).unwrap();
        assert!(marks.is_outdated(&older));
    }

    #[test]
    fn test_watermark_is_per_caller() {
        let first = Arc::new(NullView);
        let second = Arc::new(NullView);
        let mut ledger = RequestLedger::new();
        let older = ledger.open("python", RequestType::Completion, CallerHandle::new(&first));
        let newer = ledger.open("python", RequestType::Completion, CallerHandle::new(&second));
        let mut marks = DeliveryWatermarks::new();

        marks.record(&ledger.close(newer).unwrap());

        assert!(!marks.is_outdated(&ledger.close(older).unwrap()));
    }

    #[test]
    fn test_watermarks_forget_dropped_callers() {
        let mut ledger = RequestLedger::new();
        let mut marks = DeliveryWatermarks::new();

        let gone = Arc::new(NullView);
        let id = ledger.open("python", RequestType::Completion, CallerHandle::new(&gone));
        marks.record(&ledger.close(id).unwrap());
        assert_eq!(marks.len(), 1);
        drop(gone);

        let alive = Arc::new(NullView);
        let id = ledger.open("python", RequestType::Completion, CallerHandle::new(&alive));
        marks.record(&ledger.close(id).unwrap());
        assert_eq!(marks.len(), 1);
    }
}

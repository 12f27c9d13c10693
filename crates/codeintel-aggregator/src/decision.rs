//! Completion-ready decision engine
//!
//! Before the deadline a request resolves only once every provider it waits
//! for has answered. After the deadline it resolves as soon as one of them
//! has produced a non-empty answer, so a slow or dead provider can never
//! block the caller forever.

use std::collections::BTreeSet;

use crate::ledger::PendingRequest;

/// Outcome of evaluating a pending request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Keep waiting
    Wait,
    /// Every awaited provider answered
    AllReturned,
    /// Deadline passed and at least one awaited provider answered non-empty
    Degraded,
}

impl Decision {
    /// Whether the request should resolve now
    pub fn is_ready(&self) -> bool {
        !matches!(self, Decision::Wait)
    }
}

/// Providers a request waits for
///
/// The configured wait policy for the request type restricted to running
/// providers, or every running provider when no policy is configured.
pub fn wait_set(policy: Option<&BTreeSet<String>>, running: &[String]) -> BTreeSet<String> {
    match policy {
        Some(sources) => running
            .iter()
            .filter(|id| sources.contains(*id))
            .cloned()
            .collect(),
        None => running.iter().cloned().collect(),
    }
}

/// Decide whether `request` can resolve given the providers it waits for
pub fn evaluate(request: &PendingRequest, wait_for: &BTreeSet<String>) -> Decision {
    let all_returned = wait_for
        .iter()
        .all(|id| request.responses.contains_key(id));

    if all_returned {
        return Decision::AllReturned;
    }

    if request.timed_out {
        let any_nonempty = wait_for
            .iter()
            .filter_map(|id| request.responses.get(id))
            .any(|response| !response.is_empty());
        if any_nonempty {
            return Decision::Degraded;
        }
    }

    Decision::Wait
}

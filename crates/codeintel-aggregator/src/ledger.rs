//! Request ledger
//!
//! Tracks every in-flight aggregate request and the partial responses it has
//! collected. An entry lives from `open` until a resolution decision is made;
//! once closed, its identifier is never reused and late responses for it are
//! discarded.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::caller::CallerHandle;
use crate::types::{ProviderResponse, RequestId, RequestType};

/// An aggregate request awaiting resolution
#[derive(Debug, Clone)]
pub struct PendingRequest {
    /// Request identifier
    pub id: RequestId,
    /// Programming language of the document
    pub language: String,
    /// Request type
    pub request_type: RequestType,
    /// Where the merged answer goes
    pub caller: CallerHandle,
    /// Partial responses keyed by provider id
    pub responses: HashMap<String, ProviderResponse>,
    /// Whether the deadline has fired
    pub timed_out: bool,
    /// Providers the request was forwarded to
    pub forwarded: BTreeSet<String>,
}

/// Ledger of in-flight aggregate requests
#[derive(Debug, Default)]
pub struct RequestLedger {
    next_id: RequestId,
    requests: HashMap<RequestId, PendingRequest>,
}

impl RequestLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new request and return its identifier
    pub fn open(
        &mut self,
        language: impl Into<String>,
        request_type: RequestType,
        caller: CallerHandle,
    ) -> RequestId {
        let id = self.next_id;
        self.next_id += 1;

        self.requests.insert(
            id,
            PendingRequest {
                id,
                language: language.into(),
                request_type,
                caller,
                responses: HashMap::new(),
                timed_out: false,
                forwarded: BTreeSet::new(),
            },
        );
        debug!(request_id = id, %request_type, "Request opened");
        id
    }

    /// Store a provider's answer; returns `false` for unknown requests
    pub fn record_partial(
        &mut self,
        id: RequestId,
        provider_id: &str,
        response: ProviderResponse,
    ) -> bool {
        match self.requests.get_mut(&id) {
            Some(request) => {
                debug!(request_id = id, provider = %provider_id, "Got response");
                request.responses.insert(provider_id.to_string(), response);
                true
            }
            None => {
                debug!(request_id = id, provider = %provider_id, "Late response discarded");
                false
            }
        }
    }

    /// Remember which providers a request went out to
    pub fn record_forwarded(&mut self, id: RequestId, providers: impl IntoIterator<Item = String>) {
        if let Some(request) = self.requests.get_mut(&id) {
            request.forwarded.extend(providers);
        }
    }

    /// Flag a request as timed out; returns `false` for unknown requests
    pub fn mark_timed_out(&mut self, id: RequestId) -> bool {
        match self.requests.get_mut(&id) {
            Some(request) => {
                debug!(request_id = id, "Request timed out");
                request.timed_out = true;
                true
            }
            None => false,
        }
    }

    /// Stop tracking a request; idempotent
    pub fn close(&mut self, id: RequestId) -> Option<PendingRequest> {
        let removed = self.requests.remove(&id);
        if removed.is_some() {
            debug!(request_id = id, "Request removed");
        }
        removed
    }

    /// Look up a pending request
    pub fn get(&self, id: RequestId) -> Option<&PendingRequest> {
        self.requests.get(&id)
    }

    /// Whether a request is still pending
    pub fn contains(&self, id: RequestId) -> bool {
        self.requests.contains_key(&id)
    }

    /// All pending requests, in no particular order
    pub fn pending(&self) -> impl Iterator<Item = &PendingRequest> {
        self.requests.values()
    }

    /// Number of pending requests
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

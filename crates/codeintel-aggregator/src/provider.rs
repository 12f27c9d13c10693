//! Provider capability interface
//!
//! Every backend (language server, fallback tokenizer, inference service)
//! implements [`CompletionProvider`]. Providers never call back into the
//! aggregator directly: they consume the one-shot [`ReadySignal`] and
//! [`ResponseSlot`] handles they are given, which post events to the
//! aggregator's event loop.

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;

use crate::caller::CallerHandle;
use crate::error::AggregatorResult;
use crate::event::{AggregatorEvent, EventSender};
use crate::types::{
    NotificationType, ProviderResponse, RequestId, RequestType, WorkspaceUpdateKind,
};

/// Request forwarded to a single provider
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    /// Aggregate request identifier
    pub request_id: RequestId,
    /// Programming language of the document
    pub language: String,
    /// Request type
    pub request_type: RequestType,
    /// Request body
    pub params: Value,
}

/// One-shot handle a provider uses to answer a request
#[derive(Debug)]
pub struct ResponseSlot {
    provider_id: String,
    request_id: RequestId,
    events: EventSender,
}

impl ResponseSlot {
    pub(crate) fn new(provider_id: impl Into<String>, request_id: RequestId, events: EventSender) -> Self {
        Self {
            provider_id: provider_id.into(),
            request_id,
            events,
        }
    }

    /// Aggregate request this slot answers
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Provider this slot belongs to
    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    /// Post the answer
    pub fn send(self, response: ProviderResponse) {
        self.events.post(AggregatorEvent::Response {
            provider_id: self.provider_id,
            request_id: self.request_id,
            response,
        });
    }

    /// Answer with "nothing to contribute"
    pub fn send_empty(self) {
        self.send(ProviderResponse::empty());
    }
}

/// One-shot readiness signal handed to [`CompletionProvider::start`]
#[derive(Debug)]
pub struct ReadySignal {
    provider_id: String,
    events: EventSender,
}

impl ReadySignal {
    pub(crate) fn new(provider_id: impl Into<String>, events: EventSender) -> Self {
        Self {
            provider_id: provider_id.into(),
            events,
        }
    }

    /// Provider this signal belongs to
    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    /// Report the provider as usable
    pub fn raise(self) {
        self.events.post(AggregatorEvent::ProviderReady {
            provider_id: self.provider_id,
        });
    }
}

/// Completion / introspection backend
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Unique provider identifier
    fn id(&self) -> &str;

    /// Begin initialization without blocking; raise `ready` once usable
    fn start(&self, ready: ReadySignal);

    /// Best-effort stop
    async fn shutdown(&self) -> AggregatorResult<()>;

    /// Process a request asynchronously and answer through `reply`
    ///
    /// A provider that cannot answer may drop the slot; the request deadline
    /// then resolves the aggregate request without it.
    fn send_request(&self, request: ProviderRequest, reply: ResponseSlot);

    /// Whether this provider supports `language` right now
    fn start_client(&self, language: &str) -> bool;

    /// Stop serving `language`
    fn stop_client(&self, _language: &str) {}

    /// Fire-and-forget notification for one language
    fn send_notification(&self, _language: &str, _notification: NotificationType, _payload: &Value) {}

    /// Fire-and-forget notification for every language
    fn broadcast_notification(&self, _notification: NotificationType, _payload: &Value) {}

    /// Register a file so the provider can track it
    fn register_file(&self, _language: &str, _filename: &Path, _caller: &CallerHandle) {}

    /// Project folder added or removed
    fn project_path_update(&self, _path: &Path, _kind: WorkspaceUpdateKind) {}

    /// Configuration changed
    fn update_configuration(&self) {}
}

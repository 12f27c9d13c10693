//! Completion request aggregator
//!
//! Fans each request out to every running provider, collects the partial
//! answers through the event loop, and delivers one merged answer per request
//! once the decision engine says it is ready.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::caller::{CallerHandle, CompletionRequest};
use crate::config::{AggregatorConfig, ConfigManager};
use crate::decision::{self, Decision};
use crate::error::{AggregatorError, AggregatorResult};
use crate::event::{self, AggregatorEvent, EventSender};
use crate::ledger::{PendingRequest, RequestLedger};
use crate::merger;
use crate::provider::{CompletionProvider, ProviderRequest, ResponseSlot};
use crate::registry::{ProviderRegistry, ShutdownReport};
use crate::scheduler::TimeoutScheduler;
use crate::suppressor::{self, DeliveryWatermarks};
use crate::types::{
    MergedResponse, NotificationType, ProviderStatus, RequestId, RequestType, WorkspaceUpdateKind,
};

const READY_CHANNEL_CAPACITY: usize = 64;

/// Answer ready to be handed to its caller once the state lock is released
struct Delivery {
    request_id: RequestId,
    caller: CallerHandle,
    request_type: RequestType,
    response: MergedResponse,
}

struct AggregatorState {
    registry: ProviderRegistry,
    ledger: RequestLedger,
    config: AggregatorConfig,
    watermarks: DeliveryWatermarks,
    language_status: HashMap<String, HashMap<String, bool>>,
}

impl AggregatorState {
    /// Run the decision engine for one request and close it if ready
    fn resolve(&mut self, request_id: RequestId) -> Option<Delivery> {
        let request = self.ledger.get(request_id)?;

        // A provider that became ready after fan-out never saw the request
        let running: Vec<String> = self
            .registry
            .running_ids()
            .into_iter()
            .filter(|id| request.forwarded.contains(id))
            .collect();
        let wait_for = decision::wait_set(self.config.wait_policy(request.request_type), &running);
        let decision = decision::evaluate(request, &wait_for);
        if decision == Decision::Wait {
            return None;
        }

        let request = self.ledger.close(request_id)?;
        debug!(request_id, ?decision, "Request resolved");

        if !self
            .config
            .skip_intermediate_requests
            .contains(&request.request_type)
        {
            return Some(self.gather(request));
        }

        if suppressor::is_superseded(&self.ledger, &request, &self.config.skip_intermediate_requests)
            || self.watermarks.is_outdated(&request)
        {
            debug!(request_id, "Skipping intermediate request");
            return None;
        }

        self.watermarks.record(&request);
        Some(self.gather(request))
    }

    fn gather(&self, request: PendingRequest) -> Delivery {
        let priorities = self
            .config
            .priority_for(request.request_type, &self.registry.names());
        let response = merger::gather(request.request_type, &priorities, &request.responses);

        Delivery {
            request_id: request.id,
            caller: request.caller,
            request_type: request.request_type,
            response,
        }
    }
}

struct Inner {
    state: Mutex<AggregatorState>,
    events: EventSender,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<AggregatorEvent>>>,
    scheduler: TimeoutScheduler,
    ready_tx: broadcast::Sender<String>,
}

/// Aggregates completion and introspection requests across providers
///
/// Cheap to clone; clones share the same providers, ledger and event loop.
///
/// # Example
///
/// ```ignore
/// let aggregator = CompletionAggregator::new(AggregatorConfig::default());
/// aggregator.register_provider(Arc::new(my_lsp_provider))?;
/// aggregator.spawn();
/// aggregator.start_providers();
///
/// let id = aggregator.send_request(
///     "python",
///     RequestType::Completion,
///     CompletionRequest::new(CallerHandle::new(&view), params),
/// );
/// ```
#[derive(Clone)]
pub struct CompletionAggregator {
    inner: Arc<Inner>,
}

impl CompletionAggregator {
    /// Create an aggregator with no providers
    pub fn new(config: AggregatorConfig) -> Self {
        let (events, receiver) = event::channel();
        let (ready_tx, _) = broadcast::channel(READY_CHANNEL_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(AggregatorState {
                    registry: ProviderRegistry::new(events.clone()),
                    ledger: RequestLedger::new(),
                    config,
                    watermarks: DeliveryWatermarks::new(),
                    language_status: HashMap::new(),
                }),
                scheduler: TimeoutScheduler::new(events.clone()),
                events,
                receiver: Mutex::new(Some(receiver)),
                ready_tx,
            }),
        }
    }

    /// Create an aggregator from a YAML or JSON configuration file
    pub async fn from_config_file(path: impl AsRef<Path>) -> AggregatorResult<Self> {
        let config = ConfigManager::load_from_file(path).await?;
        Ok(Self::new(config))
    }

    /// Register a provider
    ///
    /// The provider starts out stopped and is recorded as not serving any of
    /// the languages seen so far.
    pub fn register_provider(&self, provider: Arc<dyn CompletionProvider>) -> AggregatorResult<()> {
        let id = provider.id().to_string();
        let mut state = self.inner.state.lock();
        state.registry.register(provider)?;
        for clients in state.language_status.values_mut() {
            clients.insert(id.clone(), false);
        }
        info!(provider = %id, "Registered completion provider");
        Ok(())
    }

    /// Start every stopped provider
    ///
    /// Providers become running only when their readiness signal is
    /// processed by the event loop.
    pub fn start_providers(&self) {
        self.inner.state.lock().registry.start_all();
    }

    /// Stop every running provider, each bounded by the configured timeout
    pub async fn shutdown_providers(&self) -> ShutdownReport {
        let shutdown = {
            let mut state = self.inner.state.lock();
            let timeout = state.config.shutdown_timeout();
            state.registry.shutdown_all(timeout)
        };
        shutdown.await
    }

    /// Spawn the event loop on the current Tokio runtime
    ///
    /// Returns `None` if the loop was already spawned. The loop ends once
    /// every handle to the aggregator is dropped.
    pub fn spawn(&self) -> Option<JoinHandle<()>> {
        let receiver = self.inner.receiver.lock().take()?;
        let inner = Arc::downgrade(&self.inner);
        Some(tokio::spawn(run_event_loop(inner, receiver)))
    }

    /// Process every event already queued, without waiting
    ///
    /// Returns the number of events handled, or zero once the event loop
    /// has been spawned.
    pub fn process_pending_events(&self) -> usize {
        let mut handled = 0;
        loop {
            let event = {
                let mut receiver = self.inner.receiver.lock();
                match receiver.as_mut().map(|rx| rx.try_recv()) {
                    Some(Ok(event)) => event,
                    _ => break,
                }
            };
            self.inner.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Process one event
    pub fn handle_event(&self, event: AggregatorEvent) {
        self.inner.handle_event(event);
    }

    /// Fan a request out to every running provider
    ///
    /// Never fails: the merged answer, if any, reaches the caller's
    /// [`ResponseHandler`](crate::caller::ResponseHandler).
    pub fn send_request(
        &self,
        language: &str,
        request_type: RequestType,
        request: CompletionRequest,
    ) -> RequestId {
        let (request_id, wait_for, providers) = {
            let mut state = self.inner.state.lock();
            let request_id = state
                .ledger
                .open(language, request_type, request.caller.clone());
            let providers = state.registry.running();
            state
                .ledger
                .record_forwarded(request_id, providers.iter().map(|p| p.id().to_string()));
            (request_id, state.config.wait_for(), providers)
        };

        // Armed before fan-out so an immediate deadline precedes any answer
        self.inner.scheduler.arm(request_id, wait_for);

        debug!(
            request_id,
            %request_type,
            providers = providers.len(),
            "Forwarding request to running providers"
        );
        for provider in providers {
            let reply = ResponseSlot::new(provider.id(), request_id, self.inner.events.clone());
            provider.send_request(
                ProviderRequest {
                    request_id,
                    language: language.to_string(),
                    request_type,
                    params: request.params.clone(),
                },
                reply,
            );
        }

        request_id
    }

    /// Send a notification to every running provider for one language
    pub fn send_notification(
        &self,
        language: &str,
        notification: NotificationType,
        payload: &Value,
    ) {
        for provider in self.running_providers() {
            provider.send_notification(language, notification, payload);
        }
    }

    /// Send a notification to every running provider for all languages
    pub fn broadcast_notification(&self, notification: NotificationType, payload: &Value) {
        for provider in self.running_providers() {
            provider.broadcast_notification(notification, payload);
        }
    }

    /// Register a file with every running provider
    pub fn register_file(&self, language: &str, filename: &Path, caller: &CallerHandle) {
        for provider in self.running_providers() {
            provider.register_file(language, filename, caller);
        }
    }

    /// Forward a project folder change to every running provider
    pub fn project_path_update(&self, path: &Path, kind: WorkspaceUpdateKind) {
        debug!(path = %path.display(), ?kind, "Project path update");
        for provider in self.running_providers() {
            provider.project_path_update(path, kind);
        }
    }

    /// Replace the whole configuration
    ///
    /// A new deadline applies to requests opened afterwards. Running
    /// providers are told the configuration changed.
    pub fn update_configuration(&self, config: AggregatorConfig) -> AggregatorResult<()> {
        ConfigManager::validate_config(&config)?;
        self.inner.state.lock().config = config;
        info!("Aggregator configuration updated");

        for provider in self.running_providers() {
            provider.update_configuration();
        }
        Ok(())
    }

    /// Current configuration
    pub fn config(&self) -> AggregatorConfig {
        self.inner.state.lock().config.clone()
    }

    /// Start the clients of every running provider for `language`
    ///
    /// Returns whether at least one provider supports the language.
    pub fn start_provider_clients(&self, language: &str) -> bool {
        let providers = self.running_providers();

        let mut started = false;
        let mut clients = HashMap::new();
        for provider in providers {
            let client_started = provider.start_client(language);
            debug!(provider = %provider.id(), language, client_started, "Starting provider client");
            started |= client_started;
            clients.insert(provider.id().to_string(), client_started);
        }

        self.inner
            .state
            .lock()
            .language_status
            .entry(language.to_string())
            .or_default()
            .extend(clients);
        started
    }

    /// Stop the clients of every running provider for `language`
    pub fn stop_provider_clients(&self, language: &str) {
        for provider in self.running_providers() {
            provider.stop_client(language);
        }
        self.inner.state.lock().language_status.remove(language);
    }

    /// Which providers serve `language`
    pub fn language_status(&self, language: &str) -> Option<HashMap<String, bool>> {
        self.inner.state.lock().language_status.get(language).cloned()
    }

    /// Make `provider_id` part of the wait policy of each request type
    pub fn set_wait_policy(&self, provider_id: &str, request_types: &[RequestType]) -> AggregatorResult<()> {
        let mut state = self.inner.state.lock();
        if !state.registry.contains(provider_id) {
            return Err(AggregatorError::unknown_provider(provider_id));
        }
        state.config.add_wait_source(provider_id, request_types);
        debug!(provider = %provider_id, ?request_types, "Wait policy updated");
        Ok(())
    }

    /// Give `provider_id` the highest priority for a request type
    pub fn set_top_priority(&self, provider_id: &str, request_type: RequestType) -> AggregatorResult<()> {
        let mut state = self.inner.state.lock();
        if !state.registry.contains(provider_id) {
            return Err(AggregatorError::unknown_provider(provider_id));
        }
        let registered = state.registry.names();
        state.config.promote(provider_id, request_type, &registered);
        debug!(provider = %provider_id, %request_type, "Priority updated");
        Ok(())
    }

    /// Effective priority order for a request type
    pub fn priority_order(&self, request_type: RequestType) -> Vec<String> {
        let state = self.inner.state.lock();
        state.config.priority_for(request_type, &state.registry.names())
    }

    /// Look up a provider
    pub fn get_provider(&self, provider_id: &str) -> Option<Arc<dyn CompletionProvider>> {
        self.inner.state.lock().registry.get(provider_id)
    }

    /// Registered provider ids in registration order
    pub fn provider_ids(&self) -> Vec<String> {
        self.inner.state.lock().registry.names()
    }

    /// Lifecycle state of a provider
    pub fn provider_status(&self, provider_id: &str) -> Option<ProviderStatus> {
        self.inner.state.lock().registry.status(provider_id)
    }

    /// Observe providers as they become ready
    pub fn subscribe_provider_ready(&self) -> broadcast::Receiver<String> {
        self.inner.ready_tx.subscribe()
    }

    /// Number of requests still awaiting resolution
    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().ledger.len()
    }

    fn running_providers(&self) -> Vec<Arc<dyn CompletionProvider>> {
        self.inner.state.lock().registry.running()
    }
}

impl Inner {
    fn handle_event(&self, event: AggregatorEvent) {
        let delivery = match event {
            AggregatorEvent::ProviderReady { provider_id } => {
                let became_running = self.state.lock().registry.mark_running(&provider_id);
                if became_running {
                    // No subscribers is fine
                    let _ = self.ready_tx.send(provider_id);
                }
                None
            }
            AggregatorEvent::Response {
                provider_id,
                request_id,
                response,
            } => {
                let mut state = self.state.lock();
                if state.ledger.record_partial(request_id, &provider_id, response) {
                    state.resolve(request_id)
                } else {
                    None
                }
            }
            AggregatorEvent::Timeout { request_id } => {
                let mut state = self.state.lock();
                if state.ledger.mark_timed_out(request_id) {
                    state.resolve(request_id)
                } else {
                    None
                }
            }
        };

        if let Some(delivery) = delivery {
            if delivery.caller.deliver(delivery.request_type, delivery.response) {
                debug!(request_id = delivery.request_id, "Response delivered");
            }
        }
    }
}

async fn run_event_loop(inner: Weak<Inner>, mut receiver: mpsc::UnboundedReceiver<AggregatorEvent>) {
    debug!("Aggregator event loop started");
    while let Some(event) = receiver.recv().await {
        match inner.upgrade() {
            Some(inner) => inner.handle_event(event),
            None => break,
        }
    }
    debug!("Aggregator event loop stopped");
}

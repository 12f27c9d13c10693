//! Provider registry
//!
//! Holds every registered provider in registration order together with its
//! lifecycle state. Registration order doubles as the default priority.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::error::{AggregatorError, AggregatorResult};
use crate::event::EventSender;
use crate::provider::{CompletionProvider, ReadySignal};
use crate::types::ProviderStatus;

struct ProviderEntry {
    provider: Arc<dyn CompletionProvider>,
    status: ProviderStatus,
}

impl ProviderEntry {
    fn id(&self) -> &str {
        self.provider.id()
    }
}

/// Outcome of [`ProviderRegistry::shutdown_all`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Providers that stopped cleanly
    pub stopped: Vec<String>,
    /// Providers whose shutdown failed or timed out, with the reason
    pub failed: Vec<(String, String)>,
}

/// Registry of completion providers
pub struct ProviderRegistry {
    entries: Vec<ProviderEntry>,
    events: EventSender,
}

impl ProviderRegistry {
    /// Create an empty registry whose readiness signals post to `events`
    pub fn new(events: EventSender) -> Self {
        Self {
            entries: Vec::new(),
            events,
        }
    }

    /// Register a provider under its identifier
    pub fn register(&mut self, provider: Arc<dyn CompletionProvider>) -> AggregatorResult<()> {
        let id = provider.id().to_string();
        if self.contains(&id) {
            return Err(AggregatorError::duplicate_provider(id));
        }

        debug!(provider = %id, "Registering completion provider");
        self.entries.push(ProviderEntry {
            provider,
            status: ProviderStatus::Stopped,
        });
        Ok(())
    }

    /// Start every stopped provider without waiting for readiness
    pub fn start_all(&self) {
        for entry in self.entries.iter().filter(|e| e.status == ProviderStatus::Stopped) {
            debug!(provider = %entry.id(), "Starting completion provider");
            entry
                .provider
                .start(ReadySignal::new(entry.id(), self.events.clone()));
        }
    }

    /// Stop every running provider
    ///
    /// Providers are marked stopped immediately; the returned future performs
    /// the actual shutdowns concurrently, each bounded by `timeout`, so one
    /// slow or failing provider never holds up the others.
    pub fn shutdown_all(
        &mut self,
        timeout: Duration,
    ) -> impl Future<Output = ShutdownReport> + Send + 'static {
        let targets: Vec<Arc<dyn CompletionProvider>> = self
            .entries
            .iter_mut()
            .filter(|e| e.status == ProviderStatus::Running)
            .map(|e| {
                e.status = ProviderStatus::Stopped;
                e.provider.clone()
            })
            .collect();

        async move {
            let outcomes = join_all(targets.into_iter().map(|provider| async move {
                let id = provider.id().to_string();
                let outcome = match tokio::time::timeout(timeout, provider.shutdown()).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err(format!("shutdown timed out after {}ms", timeout.as_millis())),
                };
                (id, outcome)
            }))
            .await;

            let mut report = ShutdownReport::default();
            for (id, outcome) in outcomes {
                match outcome {
                    Ok(()) => {
                        info!(provider = %id, "Completion provider shut down");
                        report.stopped.push(id);
                    }
                    Err(reason) => {
                        warn!(provider = %id, reason = %reason, "Completion provider shutdown failed");
                        report.failed.push((id, reason));
                    }
                }
            }
            report
        }
    }

    /// Transition a provider to running; returns whether the state changed
    pub fn mark_running(&mut self, id: &str) -> bool {
        match self.entries.iter_mut().find(|e| e.id() == id) {
            Some(entry) if entry.status == ProviderStatus::Stopped => {
                entry.status = ProviderStatus::Running;
                info!(provider = %id, "Completion provider ready");
                true
            }
            Some(_) => false,
            None => {
                debug!(provider = %id, "Readiness from unregistered provider ignored");
                false
            }
        }
    }

    /// Provider identifiers in registration order
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.id().to_string()).collect()
    }

    /// Identifiers of running providers in registration order
    pub fn running_ids(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.status == ProviderStatus::Running)
            .map(|e| e.id().to_string())
            .collect()
    }

    /// Running providers in registration order
    pub fn running(&self) -> Vec<Arc<dyn CompletionProvider>> {
        self.entries
            .iter()
            .filter(|e| e.status == ProviderStatus::Running)
            .map(|e| e.provider.clone())
            .collect()
    }

    /// Look up a provider
    pub fn get(&self, id: &str) -> Option<Arc<dyn CompletionProvider>> {
        self.entries
            .iter()
            .find(|e| e.id() == id)
            .map(|e| e.provider.clone())
    }

    /// Lifecycle state of a provider
    pub fn status(&self, id: &str) -> Option<ProviderStatus> {
        self.entries.iter().find(|e| e.id() == id).map(|e| e.status)
    }

    /// Whether a provider is registered
    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.id() == id)
    }

    /// Whether a provider is registered and running
    pub fn is_running(&self, id: &str) -> bool {
        self.status(id) == Some(ProviderStatus::Running)
    }

    /// Number of registered providers
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no provider is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{self, AggregatorEvent};
    use crate::provider::{ProviderRequest, ResponseSlot};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Mock provider for testing
    struct MockProvider {
        name: String,
        starts: AtomicUsize,
        fail_shutdown: bool,
        hang_shutdown: bool,
    }

    impl MockProvider {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                starts: AtomicUsize::new(0),
                fail_shutdown: false,
                hang_shutdown: false,
            }
        }
    }

    #[async_trait]
    impl CompletionProvider for MockProvider {
        fn id(&self) -> &str {
            &self.name
        }

        fn start(&self, ready: ReadySignal) {
            self.starts.fetch_add(1, Ordering::SeqCst);
            ready.raise();
        }

        async fn shutdown(&self) -> AggregatorResult<()> {
            if self.hang_shutdown {
                futures::future::pending::<()>().await;
            }
            if self.fail_shutdown {
                return Err(AggregatorError::provider_error("process already dead"));
            }
            Ok(())
        }

        fn send_request(&self, _request: ProviderRequest, reply: ResponseSlot) {
            reply.send_empty();
        }

        fn start_client(&self, _language: &str) -> bool {
            true
        }
    }

    #[test]
    fn test_register_and_names_keep_order() {
        let (tx, _rx) = event::channel();
        let mut registry = ProviderRegistry::new(tx);

        registry.register(Arc::new(MockProvider::new("lsp"))).unwrap();
        registry.register(Arc::new(MockProvider::new("fallback"))).unwrap();
        registry.register(Arc::new(MockProvider::new("kite"))).unwrap();

        assert_eq!(registry.names(), vec!["lsp", "fallback", "kite"]);
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.status("lsp"), Some(ProviderStatus::Stopped));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let (tx, _rx) = event::channel();
        let mut registry = ProviderRegistry::new(tx);

        registry.register(Arc::new(MockProvider::new("lsp"))).unwrap();
        let result = registry.register(Arc::new(MockProvider::new("lsp")));

        assert!(matches!(result, Err(AggregatorError::DuplicateProvider(id)) if id == "lsp"));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_start_all_posts_readiness() {
        let (tx, mut rx) = event::channel();
        let mut registry = ProviderRegistry::new(tx);
        registry.register(Arc::new(MockProvider::new("lsp"))).unwrap();

        registry.start_all();

        // Readiness is observed, not assumed
        assert!(!registry.is_running("lsp"));
        assert_eq!(
            rx.recv().await,
            Some(AggregatorEvent::ProviderReady {
                provider_id: "lsp".to_string()
            })
        );
    }

    #[test]
    fn test_start_all_skips_running_providers() {
        let (tx, _rx) = event::channel();
        let mut registry = ProviderRegistry::new(tx);
        let lsp = Arc::new(MockProvider::new("lsp"));
        registry.register(lsp.clone()).unwrap();

        registry.start_all();
        registry.mark_running("lsp");
        registry.start_all();

        assert_eq!(lsp.starts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_mark_running() {
        let (tx, _rx) = event::channel();
        let mut registry = ProviderRegistry::new(tx);
        registry.register(Arc::new(MockProvider::new("lsp"))).unwrap();
        registry.register(Arc::new(MockProvider::new("fallback"))).unwrap();

        assert!(registry.mark_running("fallback"));
        assert!(!registry.mark_running("fallback"));
        assert!(!registry.mark_running("unknown"));

        assert_eq!(registry.running_ids(), vec!["fallback"]);
        assert_eq!(registry.running().len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_all_is_independent_per_provider() {
        let (tx, _rx) = event::channel();
        let mut registry = ProviderRegistry::new(tx);

        let mut broken = MockProvider::new("kite");
        broken.fail_shutdown = true;
        registry.register(Arc::new(MockProvider::new("lsp"))).unwrap();
        registry.register(Arc::new(broken)).unwrap();
        registry.register(Arc::new(MockProvider::new("fallback"))).unwrap();
        registry.mark_running("lsp");
        registry.mark_running("kite");

        let report = registry.shutdown_all(Duration::from_secs(1)).await;

        assert_eq!(report.stopped, vec!["lsp"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "kite");
        assert!(registry.running_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_all_bounds_hanging_provider() {
        let (tx, _rx) = event::channel();
        let mut registry = ProviderRegistry::new(tx);

        let mut hanging = MockProvider::new("kite");
        hanging.hang_shutdown = true;
        registry.register(Arc::new(hanging)).unwrap();
        registry.register(Arc::new(MockProvider::new("lsp"))).unwrap();
        registry.mark_running("kite");
        registry.mark_running("lsp");

        let report = registry.shutdown_all(Duration::from_millis(500)).await;

        assert_eq!(report.stopped, vec!["lsp"]);
        assert_eq!(report.failed[0].0, "kite");
        assert!(report.failed[0].1.contains("timed out"));
    }
}

//! Scripted providers and scenario replay
//!
//! A [`ScriptedProvider`] answers every request type from a fixed table after
//! a fixed delay. A [`Scenario`] wires a set of them into an aggregator, issues
//! one request and reports what the caller received and when.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::aggregator::CompletionAggregator;
use crate::caller::{CallerHandle, CompletionRequest, ResponseHandler};
use crate::config::AggregatorConfig;
use crate::error::{AggregatorError, AggregatorResult};
use crate::provider::{CompletionProvider, ProviderRequest, ReadySignal, ResponseSlot};
use crate::types::{MergedResponse, ProviderResponse, RequestType};

fn default_give_up_after_ms() -> u64 {
    5000
}

/// Canned answer for one request type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptedResponse {
    /// Delay before answering, in milliseconds
    #[serde(default)]
    pub delay_ms: u64,
    /// Answer payload
    #[serde(default)]
    pub params: Value,
}

/// Behaviour of one scripted provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptedProviderConfig {
    /// Provider identifier
    pub id: String,
    /// Startup delay in milliseconds; `None` never becomes ready
    #[serde(default = "ready_immediately")]
    pub ready_after_ms: Option<u64>,
    /// Supported languages (empty = all)
    #[serde(default)]
    pub languages: Vec<String>,
    /// Answers per request type; unlisted types are never answered
    #[serde(default)]
    pub responses: HashMap<RequestType, ScriptedResponse>,
}

fn ready_immediately() -> Option<u64> {
    Some(0)
}

impl ScriptedProviderConfig {
    /// Provider that is ready at once and answers nothing
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ready_after_ms: ready_immediately(),
            languages: Vec::new(),
            responses: HashMap::new(),
        }
    }

    /// Answer `request_type` with `params` after `delay_ms`
    pub fn respond(mut self, request_type: RequestType, delay_ms: u64, params: Value) -> Self {
        self.responses
            .insert(request_type, ScriptedResponse { delay_ms, params });
        self
    }
}

/// Provider driven by a [`ScriptedProviderConfig`]
pub struct ScriptedProvider {
    config: ScriptedProviderConfig,
}

impl ScriptedProvider {
    /// Create a scripted provider
    pub fn new(config: ScriptedProviderConfig) -> Self {
        Self { config }
    }

    fn after(delay: Duration, action: impl FnOnce() + Send + 'static) {
        match Handle::try_current() {
            Ok(handle) if !delay.is_zero() => {
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    action();
                });
            }
            Ok(_) => action(),
            Err(_) => {
                warn!("No async runtime available, acting without delay");
                action();
            }
        }
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn start(&self, ready: ReadySignal) {
        match self.config.ready_after_ms {
            Some(ms) => Self::after(Duration::from_millis(ms), move || ready.raise()),
            None => debug!(provider = %self.config.id, "Scripted provider never becomes ready"),
        }
    }

    async fn shutdown(&self) -> AggregatorResult<()> {
        Ok(())
    }

    fn send_request(&self, request: ProviderRequest, reply: ResponseSlot) {
        match self.config.responses.get(&request.request_type) {
            Some(scripted) => {
                let response = ProviderResponse::new(scripted.params.clone());
                Self::after(Duration::from_millis(scripted.delay_ms), move || {
                    reply.send(response)
                });
            }
            None => debug!(
                provider = %self.config.id,
                request_id = request.request_id,
                "No scripted answer, staying silent"
            ),
        }
    }

    fn start_client(&self, language: &str) -> bool {
        self.config.languages.is_empty() || self.config.languages.iter().any(|l| l == language)
    }
}

/// Response handler forwarding every delivery into a channel
pub struct ChannelResponder {
    tx: mpsc::UnboundedSender<(RequestType, MergedResponse)>,
}

impl ChannelResponder {
    /// Create a responder and the receiving end of its channel
    pub fn channel() -> (Arc<Self>, mpsc::UnboundedReceiver<(RequestType, MergedResponse)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl ResponseHandler for ChannelResponder {
    fn handle_response(&self, request_type: RequestType, response: MergedResponse) -> AggregatorResult<()> {
        self.tx
            .send((request_type, response))
            .map_err(|_| AggregatorError::TargetGone)
    }
}

/// One request replayed against scripted providers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Document language
    #[serde(default = "default_language")]
    pub language: String,
    /// Request type to issue
    pub request_type: RequestType,
    /// Request body
    #[serde(default)]
    pub params: Value,
    /// How long to wait for a delivery before giving up, in milliseconds
    #[serde(default = "default_give_up_after_ms")]
    pub give_up_after_ms: u64,
    /// Providers in registration order
    pub providers: Vec<ScriptedProviderConfig>,
}

fn default_language() -> String {
    "python".to_string()
}

/// What the caller saw during a replay
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayOutcome {
    /// Delivered answer, if any arrived in time
    pub response: Option<MergedResponse>,
    /// Time from sending the request to delivery (or giving up)
    pub elapsed: Duration,
    /// Requests still tracked after the replay
    pub pending: usize,
}

impl Scenario {
    /// Load a scenario from a YAML file
    pub async fn load(path: impl AsRef<Path>) -> AggregatorResult<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;
        let scenario: Scenario = serde_yaml::from_str(&content)?;
        debug!(path = %path.display(), providers = scenario.providers.len(), "Loaded scenario");
        Ok(scenario)
    }

    /// Run the scenario with `config`
    ///
    /// Waits for every provider that is scripted to become ready, issues the
    /// request, then waits for one delivery.
    pub async fn replay(&self, config: AggregatorConfig) -> AggregatorResult<ReplayOutcome> {
        let aggregator = CompletionAggregator::new(config);
        for provider in &self.providers {
            aggregator.register_provider(Arc::new(ScriptedProvider::new(provider.clone())))?;
        }

        let mut ready = aggregator.subscribe_provider_ready();
        let expected = self
            .providers
            .iter()
            .filter(|p| p.ready_after_ms.is_some())
            .count();
        let _event_loop = aggregator.spawn();
        aggregator.start_providers();

        let give_up = Duration::from_millis(self.give_up_after_ms);
        let startup = tokio::time::timeout(give_up, async {
            let mut seen = 0;
            while seen < expected {
                if ready.recv().await.is_err() {
                    break;
                }
                seen += 1;
            }
        })
        .await;
        if startup.is_err() {
            warn!("Not every scripted provider became ready in time");
        }
        aggregator.start_provider_clients(&self.language);

        let (responder, mut deliveries) = ChannelResponder::channel();
        let started = Instant::now();
        let request_id = aggregator.send_request(
            &self.language,
            self.request_type,
            CompletionRequest::new(CallerHandle::new(&responder), self.params.clone()),
        );

        let response = match tokio::time::timeout(give_up, deliveries.recv()).await {
            Ok(Some((_, response))) => Some(response),
            _ => {
                warn!(request_id, "No response delivered");
                None
            }
        };
        let elapsed = started.elapsed();
        info!(request_id, elapsed_ms = elapsed.as_millis() as u64, "Replay finished");

        Ok(ReplayOutcome {
            response,
            elapsed,
            pending: aggregator.pending_count(),
        })
    }
}

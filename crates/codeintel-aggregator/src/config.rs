//! Aggregator configuration
//!
//! Holds the per-request-type routing tables (wait policy and priority
//! order) and the timing knobs, and loads them from YAML or JSON files.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AggregatorError, AggregatorResult};
use crate::types::RequestType;

fn default_wait_for_ms() -> u64 {
    300
}

fn default_shutdown_timeout_ms() -> u64 {
    5000
}

fn default_skip_intermediate_requests() -> HashSet<RequestType> {
    [RequestType::Completion].into_iter().collect()
}

/// Aggregator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Per-request deadline in milliseconds (0 = do not wait)
    #[serde(default = "default_wait_for_ms")]
    pub wait_for_ms: u64,
    /// Upper bound for each provider's shutdown in milliseconds
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
    /// Request types for which only the newest request per caller is delivered
    #[serde(default = "default_skip_intermediate_requests")]
    pub skip_intermediate_requests: HashSet<RequestType>,
    /// Providers each request type waits for (absent = every running provider)
    #[serde(default)]
    pub wait_for_source: HashMap<RequestType, BTreeSet<String>>,
    /// Provider priority per request type, highest first (absent = registration order)
    #[serde(default)]
    pub source_priority: HashMap<RequestType, Vec<String>>,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            wait_for_ms: default_wait_for_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            skip_intermediate_requests: default_skip_intermediate_requests(),
            wait_for_source: HashMap::new(),
            source_priority: HashMap::new(),
        }
    }
}

impl AggregatorConfig {
    /// Per-request deadline
    pub fn wait_for(&self) -> Duration {
        Duration::from_millis(self.wait_for_ms)
    }

    /// Provider shutdown bound
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Configured wait policy for a request type
    pub fn wait_policy(&self, request_type: RequestType) -> Option<&BTreeSet<String>> {
        self.wait_for_source.get(&request_type)
    }

    /// Effective priority order for a request type
    ///
    /// The configured order, followed by any registered provider it does not
    /// mention (in registration order). Without a configured order this is
    /// the registration order.
    pub fn priority_for(&self, request_type: RequestType, registered: &[String]) -> Vec<String> {
        match self.source_priority.get(&request_type) {
            Some(configured) => {
                let mut order = configured.clone();
                for id in registered {
                    if !order.contains(id) {
                        order.push(id.clone());
                    }
                }
                order
            }
            None => registered.to_vec(),
        }
    }

    /// Add `provider_id` to the wait policy of each request type
    pub fn add_wait_source(&mut self, provider_id: &str, request_types: &[RequestType]) {
        for request_type in request_types {
            self.wait_for_source
                .entry(*request_type)
                .or_default()
                .insert(provider_id.to_string());
        }
    }

    /// Move `provider_id` to the front of a request type's priority order
    pub fn promote(&mut self, provider_id: &str, request_type: RequestType, registered: &[String]) {
        let mut order = self
            .source_priority
            .get(&request_type)
            .cloned()
            .unwrap_or_else(|| registered.to_vec());
        order.retain(|id| id != provider_id);
        order.insert(0, provider_id.to_string());
        self.source_priority.insert(request_type, order);
    }

    /// Provider ids named anywhere in the routing tables
    pub fn referenced_providers(&self) -> BTreeSet<String> {
        self.wait_for_source
            .values()
            .flatten()
            .chain(self.source_priority.values().flatten())
            .cloned()
            .collect()
    }
}

/// Configuration loader for the aggregator
pub struct ConfigManager;

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManager {
    /// Create a new configuration manager
    pub fn new() -> Self {
        ConfigManager
    }

    /// Load configuration from a YAML file
    pub async fn load_from_yaml_file(file_path: impl AsRef<Path>) -> AggregatorResult<AggregatorConfig> {
        let path = file_path.as_ref();
        debug!("Loading aggregator configuration from YAML: {}", path.display());

        let content = Self::read(path).await?;
        let config: AggregatorConfig = serde_yaml::from_str(&content).map_err(|e| {
            AggregatorError::config_error(format!(
                "Failed to parse YAML configuration: {}. Please check the file format.",
                e
            ))
        })?;

        Self::validate_config(&config)?;
        info!("Loaded aggregator configuration from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub async fn load_from_json_file(file_path: impl AsRef<Path>) -> AggregatorResult<AggregatorConfig> {
        let path = file_path.as_ref();
        debug!("Loading aggregator configuration from JSON: {}", path.display());

        let content = Self::read(path).await?;
        let config: AggregatorConfig = serde_json::from_str(&content).map_err(|e| {
            AggregatorError::config_error(format!(
                "Failed to parse JSON configuration: {}. Please check the file format.",
                e
            ))
        })?;

        Self::validate_config(&config)?;
        info!("Loaded aggregator configuration from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a file (auto-detect format)
    pub async fn load_from_file(file_path: impl AsRef<Path>) -> AggregatorResult<AggregatorConfig> {
        let path = file_path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::load_from_yaml_file(path).await,
            Some("json") => Self::load_from_json_file(path).await,
            _ => Err(AggregatorError::config_error(
                "Unsupported configuration file format. Use .yaml, .yml, or .json",
            )),
        }
    }

    /// Validate configuration
    pub fn validate_config(config: &AggregatorConfig) -> AggregatorResult<()> {
        for (request_type, order) in &config.source_priority {
            let unique: HashSet<&String> = order.iter().collect();
            if unique.len() != order.len() {
                return Err(AggregatorError::config_validation_error(format!(
                    "Priority order for '{}' lists a provider more than once",
                    request_type
                )));
            }
        }

        for id in config.referenced_providers() {
            if id.trim().is_empty() {
                return Err(AggregatorError::config_validation_error(
                    "Provider ids in wait_for_source and source_priority must not be empty",
                ));
            }
        }

        Ok(())
    }

    async fn read(path: &Path) -> AggregatorResult<String> {
        tokio::fs::read_to_string(path).await.map_err(|e| {
            AggregatorError::config_error(format!(
                "Failed to read configuration file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}

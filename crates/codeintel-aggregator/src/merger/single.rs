//! Single-answer merging (hover, signature help, definitions, ...)

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use crate::types::{ProviderResponse, RequestType};

/// Picks one provider's answer for non-completion requests
pub struct SingleAnswerMerger;

impl SingleAnswerMerger {
    /// Create a new single-answer merger
    pub fn new() -> Self {
        Self
    }

    /// Return the first non-empty answer in priority order
    ///
    /// Falls back to the request type's default empty value when no
    /// provider produced anything usable.
    pub fn merge(
        request_type: RequestType,
        priorities: &[String],
        responses: &HashMap<String, ProviderResponse>,
    ) -> Value {
        for source in priorities {
            if let Some(response) = responses.get(source) {
                if !response.is_empty() {
                    debug!(%request_type, provider = %source, "Selected answer");
                    return response.params.clone();
                }
            }
        }

        request_type.default_empty()
    }
}

impl Default for SingleAnswerMerger {
    fn default() -> Self {
        Self::new()
    }
}

//! Completion merging

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracing::{debug, warn};

use crate::types::{
    CompletionItem, CompletionList, MergeStats, ProviderResponse, RankedCompletionItem, SortKey,
};

/// Merges completion lists from several providers
pub struct CompletionMerger;

impl CompletionMerger {
    /// Create a new completion merger
    pub fn new() -> Self {
        Self
    }

    /// Merge completion lists in priority order
    ///
    /// # Arguments
    ///
    /// * `priorities` - Provider ids, highest priority first
    /// * `responses` - Partial responses keyed by provider id
    ///
    /// # Returns
    ///
    /// Items deduplicated on their trimmed label (the higher-priority
    /// provider's item wins) with sort keys stamped `(priority, sortText)`
    pub fn merge(
        priorities: &[String],
        responses: &HashMap<String, ProviderResponse>,
    ) -> CompletionList {
        let mut stats = MergeStats {
            kept: responses.keys().map(|id| (id.clone(), 0)).collect(),
        };
        let mut items = Vec::new();
        let mut seen_labels = HashSet::new();

        for (priority, source) in priorities.iter().enumerate() {
            let Some(response) = responses.get(source) else {
                continue;
            };

            for item in Self::items_of(source, &response.params) {
                let dedupe_key = item.label.trim().to_string();
                if !seen_labels.insert(dedupe_key) {
                    continue;
                }

                items.push(RankedCompletionItem {
                    label: item.label,
                    sort_text: SortKey(priority, item.sort_text),
                    extra: item.extra,
                });
                *stats.kept.entry(source.clone()).or_insert(0) += 1;
            }
        }

        debug!(stats = ?stats.kept, "Completion merge statistics");
        CompletionList { items, stats }
    }

    /// Parse a provider's completion payload, skipping malformed items
    fn items_of(source: &str, params: &Value) -> Vec<CompletionItem> {
        let raw = match params {
            Value::Array(raw) => raw,
            Value::Null => return Vec::new(),
            other => {
                warn!(provider = %source, payload = %other, "Completion payload is not a list");
                return Vec::new();
            }
        };

        raw.iter()
            .filter_map(|value| match serde_json::from_value::<CompletionItem>(value.clone()) {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!(provider = %source, error = %e, "Skipping malformed completion item");
                    None
                }
            })
            .collect()
    }
}

impl Default for CompletionMerger {
    fn default() -> Self {
        Self::new()
    }
}

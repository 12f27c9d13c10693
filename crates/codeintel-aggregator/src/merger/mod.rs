//! Response merging from multiple providers

pub mod completion;
pub mod single;

pub use completion::CompletionMerger;
pub use single::SingleAnswerMerger;

use std::collections::HashMap;

use crate::types::{MergedResponse, ProviderResponse, RequestType};

/// Build the final answer for a request type
///
/// Completion requests get the deduplicating list merge; every other type
/// takes the first non-empty answer in priority order.
pub fn gather(
    request_type: RequestType,
    priorities: &[String],
    responses: &HashMap<String, ProviderResponse>,
) -> MergedResponse {
    match request_type {
        RequestType::Completion => {
            MergedResponse::Completions(CompletionMerger::merge(priorities, responses))
        }
        other => MergedResponse::Single(SingleAnswerMerger::merge(other, priorities, responses)),
    }
}

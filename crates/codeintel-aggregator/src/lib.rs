//! Completion request aggregation for code intelligence
//!
//! This crate fans a single editor request (completion, hover, signature
//! help, ...) out to several independent providers, collects their answers as
//! they arrive, and hands the caller one merged answer as soon as enough
//! information exists.
//!
//! # Features
//!
//! - **Readiness-Aware Fan-Out**: Requests only reach providers that reported ready
//! - **Deadline Degradation**: Wait for every awaited provider, or for the first
//!   useful answer once the deadline passes
//! - **Priority Merging**: Completion lists are deduplicated by label and stamped
//!   with provider priority; other requests take the best single answer
//! - **Stale Suppression**: Only the newest completion per caller is delivered
//! - **Weak Delivery**: Callers are never kept alive by in-flight requests
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      CompletionAggregator                         │
//! │                                                                   │
//! │  send_request ──► RequestLedger ──► TimeoutScheduler              │
//! │       │                ▲                   │                      │
//! │       ▼                │                   ▼                      │
//! │  ProviderRegistry      │            ┌─────────────┐               │
//! │  (running providers)   └────────────┤ event loop  │◄── ReadySignal │
//! │       │                             └──────┬──────┘◄── ResponseSlot│
//! │       ▼                                    ▼                      │
//! │  CompletionProvider ...        decision ─► suppressor ─► merger   │
//! │                                                     │             │
//! │                                                     ▼             │
//! │                                          ResponseHandler (weak)   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! - `aggregator`: Orchestration and the event loop
//! - `registry`: Provider registration and lifecycle
//! - `provider`: Provider capability trait and one-shot handles
//! - `ledger`: In-flight request tracking
//! - `scheduler`: Per-request deadlines
//! - `decision`: When a request may resolve
//! - `merger`: Completion and single-answer merging
//! - `suppressor`: Stale-request suppression
//! - `caller`: Weak caller handles and response delivery
//! - `config`: Configuration and file loading
//! - `scripted`: Scripted providers and scenario replay
//! - `error`: Error types and result types
//! - `types`: Core data structures

pub mod aggregator;
pub mod caller;
pub mod config;
pub mod decision;
pub mod error;
pub mod event;
pub mod ledger;
pub mod merger;
pub mod provider;
pub mod registry;
pub mod scheduler;
pub mod scripted;
pub mod suppressor;
pub mod types;

// Re-export public API
pub use aggregator::CompletionAggregator;
pub use caller::{CallerHandle, CompletionRequest, ResponseHandler};
pub use config::{AggregatorConfig, ConfigManager};
pub use decision::Decision;
pub use error::{AggregatorError, AggregatorResult};
pub use event::AggregatorEvent;
pub use ledger::{PendingRequest, RequestLedger};
pub use merger::{CompletionMerger, SingleAnswerMerger};
pub use provider::{CompletionProvider, ProviderRequest, ReadySignal, ResponseSlot};
pub use registry::{ProviderRegistry, ShutdownReport};
pub use scheduler::{Deadline, TimeoutScheduler};
pub use scripted::{
    ChannelResponder, ReplayOutcome, Scenario, ScriptedProvider, ScriptedProviderConfig,
    ScriptedResponse,
};
pub use suppressor::DeliveryWatermarks;
pub use types::{
    CompletionItem, CompletionList, MergeStats, MergedResponse, NotificationType,
    ProviderResponse, ProviderStatus, RankedCompletionItem, RequestId, RequestType, SortKey,
    WorkspaceUpdateKind,
};

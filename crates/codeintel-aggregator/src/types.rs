//! Core data types shared by the aggregation engine

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AggregatorError;

/// Identifier of an aggregate request, unique for the process lifetime
pub type RequestId = u64;

/// Request types routed through the aggregator
///
/// Serialized as the Language Server Protocol method name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RequestType {
    /// `textDocument/completion`
    #[serde(rename = "textDocument/completion")]
    Completion,
    /// `completionItem/resolve`
    #[serde(rename = "completionItem/resolve")]
    CompletionResolve,
    /// `textDocument/hover`
    #[serde(rename = "textDocument/hover")]
    Hover,
    /// `textDocument/signatureHelp`
    #[serde(rename = "textDocument/signatureHelp")]
    SignatureHelp,
    /// `textDocument/references`
    #[serde(rename = "textDocument/references")]
    References,
    /// `textDocument/documentHighlight`
    #[serde(rename = "textDocument/documentHighlight")]
    DocumentHighlight,
    /// `textDocument/documentSymbol`
    #[serde(rename = "textDocument/documentSymbol")]
    DocumentSymbol,
    /// `textDocument/definition`
    #[serde(rename = "textDocument/definition")]
    Definition,
    /// `textDocument/foldingRange`
    #[serde(rename = "textDocument/foldingRange")]
    FoldingRange,
    /// `textDocument/formatting`
    #[serde(rename = "textDocument/formatting")]
    Formatting,
    /// `textDocument/rangeFormatting`
    #[serde(rename = "textDocument/rangeFormatting")]
    RangeFormatting,
    /// `textDocument/codeAction`
    #[serde(rename = "textDocument/codeAction")]
    CodeAction,
    /// `textDocument/rename`
    #[serde(rename = "textDocument/rename")]
    Rename,
    /// `workspace/symbol`
    #[serde(rename = "workspace/symbol")]
    WorkspaceSymbol,
}

impl RequestType {
    /// Every request type known to the aggregator
    pub const ALL: [RequestType; 14] = [
        RequestType::Completion,
        RequestType::CompletionResolve,
        RequestType::Hover,
        RequestType::SignatureHelp,
        RequestType::References,
        RequestType::DocumentHighlight,
        RequestType::DocumentSymbol,
        RequestType::Definition,
        RequestType::FoldingRange,
        RequestType::Formatting,
        RequestType::RangeFormatting,
        RequestType::CodeAction,
        RequestType::Rename,
        RequestType::WorkspaceSymbol,
    ];

    /// LSP method name
    pub fn method(&self) -> &'static str {
        match self {
            RequestType::Completion => "textDocument/completion",
            RequestType::CompletionResolve => "completionItem/resolve",
            RequestType::Hover => "textDocument/hover",
            RequestType::SignatureHelp => "textDocument/signatureHelp",
            RequestType::References => "textDocument/references",
            RequestType::DocumentHighlight => "textDocument/documentHighlight",
            RequestType::DocumentSymbol => "textDocument/documentSymbol",
            RequestType::Definition => "textDocument/definition",
            RequestType::FoldingRange => "textDocument/foldingRange",
            RequestType::Formatting => "textDocument/formatting",
            RequestType::RangeFormatting => "textDocument/rangeFormatting",
            RequestType::CodeAction => "textDocument/codeAction",
            RequestType::Rename => "textDocument/rename",
            RequestType::WorkspaceSymbol => "workspace/symbol",
        }
    }

    /// Answer delivered when no provider produced a usable payload
    ///
    /// List-shaped results get an empty array, everything else `null`.
    pub fn default_empty(&self) -> Value {
        match self {
            RequestType::Completion
            | RequestType::References
            | RequestType::DocumentHighlight
            | RequestType::DocumentSymbol
            | RequestType::FoldingRange
            | RequestType::Formatting
            | RequestType::RangeFormatting
            | RequestType::CodeAction
            | RequestType::WorkspaceSymbol => Value::Array(Vec::new()),
            RequestType::CompletionResolve
            | RequestType::Hover
            | RequestType::SignatureHelp
            | RequestType::Definition
            | RequestType::Rename => Value::Null,
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method())
    }
}

impl FromStr for RequestType {
    type Err = AggregatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RequestType::ALL
            .iter()
            .copied()
            .find(|t| t.method() == s)
            .ok_or_else(|| AggregatorError::config_error(format!("Unknown request type: {}", s)))
    }
}

/// Fire-and-forget notification types forwarded to providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationType {
    /// `textDocument/didOpen`
    #[serde(rename = "textDocument/didOpen")]
    DidOpen,
    /// `textDocument/didChange`
    #[serde(rename = "textDocument/didChange")]
    DidChange,
    /// `textDocument/willSave`
    #[serde(rename = "textDocument/willSave")]
    WillSave,
    /// `textDocument/didSave`
    #[serde(rename = "textDocument/didSave")]
    DidSave,
    /// `textDocument/didClose`
    #[serde(rename = "textDocument/didClose")]
    DidClose,
    /// `textDocument/cursorEvent`
    #[serde(rename = "textDocument/cursorEvent")]
    CursorEvent,
    /// `workspace/didChangeConfiguration`
    #[serde(rename = "workspace/didChangeConfiguration")]
    ConfigurationChange,
    /// `workspace/didChangeWorkspaceFolders`
    #[serde(rename = "workspace/didChangeWorkspaceFolders")]
    WorkspaceFoldersChange,
    /// `workspace/didChangeWatchedFiles`
    #[serde(rename = "workspace/didChangeWatchedFiles")]
    WatchedFilesUpdate,
}

impl NotificationType {
    /// LSP method name
    pub fn method(&self) -> &'static str {
        match self {
            NotificationType::DidOpen => "textDocument/didOpen",
            NotificationType::DidChange => "textDocument/didChange",
            NotificationType::WillSave => "textDocument/willSave",
            NotificationType::DidSave => "textDocument/didSave",
            NotificationType::DidClose => "textDocument/didClose",
            NotificationType::CursorEvent => "textDocument/cursorEvent",
            NotificationType::ConfigurationChange => "workspace/didChangeConfiguration",
            NotificationType::WorkspaceFoldersChange => "workspace/didChangeWorkspaceFolders",
            NotificationType::WatchedFilesUpdate => "workspace/didChangeWatchedFiles",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method())
    }
}

/// Kind of project path update forwarded to providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceUpdateKind {
    /// A folder was added to the workspace
    Addition,
    /// A folder was removed from the workspace
    Deletion,
}

/// Lifecycle state of a registered provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    /// Registered but not (yet) usable
    Stopped,
    /// Raised its readiness signal; receives forwarded requests
    Running,
}

/// One provider's answer to one aggregate request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// Request-type dependent payload
    #[serde(default)]
    pub params: Value,
}

impl ProviderResponse {
    /// Create a response with the given payload
    pub fn new(params: Value) -> Self {
        Self { params }
    }

    /// Response meaning "nothing to contribute"
    pub fn empty() -> Self {
        Self { params: Value::Null }
    }

    /// Whether the payload carries no usable answer
    pub fn is_empty(&self) -> bool {
        is_empty_payload(&self.params)
    }
}

/// Whether a payload counts as empty: `null`, `""`, `[]` or `{}`
pub fn is_empty_payload(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Completion item as produced by a provider
///
/// Only `label` and `sortText` are interpreted; every other field is carried
/// through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionItem {
    /// Display label, also the deduplication key once trimmed
    pub label: String,
    /// Provider-local sort tiebreak
    #[serde(rename = "sortText", default)]
    pub sort_text: String,
    /// Remaining protocol fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CompletionItem {
    /// Create an item with a label and sort text
    pub fn new(label: impl Into<String>, sort_text: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            sort_text: sort_text.into(),
            extra: Map::new(),
        }
    }
}

/// Sort key stamped on merged completion items: `(priority, original sortText)`
///
/// Orders by provider priority first, so items of a higher-priority provider
/// sort before those of lower-priority providers. On the wire it is the JSON
/// array `[priority, sortText]`, which clients compare element by element;
/// `Display` renders `(priority,sortText)` for logs only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SortKey(pub usize, pub String);

impl SortKey {
    /// Priority of the provider the item came from
    pub fn priority(&self) -> usize {
        self.0
    }

    /// The provider's original sort text
    pub fn original(&self) -> &str {
        &self.1
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.0, self.1)
    }
}

/// Completion item after merging
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCompletionItem {
    /// Display label
    pub label: String,
    /// Priority-stamped sort key
    #[serde(rename = "sortText")]
    pub sort_text: SortKey,
    /// Remaining protocol fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Number of items each provider contributed to a merged completion list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStats {
    /// Kept items per provider id
    pub kept: BTreeMap<String, usize>,
}

impl MergeStats {
    /// Items kept from one provider
    pub fn kept_from(&self, provider_id: &str) -> usize {
        self.kept.get(provider_id).copied().unwrap_or(0)
    }

    /// Total items kept
    pub fn total(&self) -> usize {
        self.kept.values().sum()
    }
}

/// Merged completion list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionList {
    /// Deduplicated, priority-stamped items
    pub items: Vec<RankedCompletionItem>,
    /// Per-provider contribution
    #[serde(skip)]
    pub stats: MergeStats,
}

/// Final answer handed to the caller of an aggregate request
#[derive(Debug, Clone, PartialEq)]
pub enum MergedResponse {
    /// Result of the completion-list merge
    Completions(CompletionList),
    /// Result of the single-answer merge
    Single(Value),
}

impl MergedResponse {
    /// Completion list, if this is a completion answer
    pub fn as_completions(&self) -> Option<&CompletionList> {
        match self {
            MergedResponse::Completions(list) => Some(list),
            MergedResponse::Single(_) => None,
        }
    }

    /// Single payload, if this is a non-completion answer
    pub fn as_single(&self) -> Option<&Value> {
        match self {
            MergedResponse::Single(value) => Some(value),
            MergedResponse::Completions(_) => None,
        }
    }

    /// Wire form: `{"params": ...}`
    pub fn to_value(&self) -> Value {
        let params = match self {
            MergedResponse::Completions(list) => {
                serde_json::to_value(&list.items).unwrap_or_else(|_| Value::Array(Vec::new()))
            }
            MergedResponse::Single(value) => value.clone(),
        };
        serde_json::json!({ "params": params })
    }
}

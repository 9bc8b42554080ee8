//! Execution pipeline: request, result, and stage types
//!
//! One invocation walks a fixed stage order with two absorbing terminals.
//! Validation blocks and technical failures end the walk early; per-tool and
//! per-source trouble never does.

use crate::collaborators::{CollaboratorSet, KnowledgeHit, Validator, ValidationStage, Violation};
use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

mod turn;

pub(crate) use turn::TurnPipeline;

/// Pipeline states, linear with two absorbing terminals
///
/// `Blocked` and `Error` are reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStage {
    Init,
    InputValidation,
    KnowledgeRetrieval,
    ToolExecution,
    Generation,
    OutputValidation,
    ContextCommit,
    Complete,
    Blocked,
    Error,
}

impl TurnStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnStage::Init => "init",
            TurnStage::InputValidation => "input_validation",
            TurnStage::KnowledgeRetrieval => "knowledge_retrieval",
            TurnStage::ToolExecution => "tool_execution",
            TurnStage::Generation => "generation",
            TurnStage::OutputValidation => "output_validation",
            TurnStage::ContextCommit => "context_commit",
            TurnStage::Complete => "complete",
            TurnStage::Blocked => "blocked",
            TurnStage::Error => "error",
        }
    }
}

impl std::fmt::Display for TurnStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Terminal classification of one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    Success,
    Blocked,
    Error,
}

/// One requested tool call with its declared inputs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    #[serde(default)]
    pub inputs: HashMap<String, serde_json::Value>,
}

impl ToolInvocation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: HashMap::new(),
        }
    }

    pub fn with_input(mut self, key: &str, value: serde_json::Value) -> Self {
        self.inputs.insert(key.to_string(), value);
        self
    }
}

/// Everything one invocation needs beyond the agent's static state
pub struct ExecutionRequest {
    pub prompt: String,
    /// Explicit retrieval query; the prompt is used when absent
    pub knowledge_query: Option<String>,
    pub tools: Vec<ToolInvocation>,
    /// Bind requested-but-unbound tools to the agent before executing
    pub auto_bind_tools: bool,
    pub trace: bool,
    /// When false, the public entry point collapses the result to a string
    pub return_full: bool,
    pub metadata: HashMap<String, serde_json::Value>,
    /// Per-call collaborator overrides, highest precedence
    pub overrides: CollaboratorSet,
    /// Ad-hoc validator list; resolved as a single mechanism
    pub validators: Vec<Arc<dyn Validator>>,
    pub cancellation: Option<CancellationToken>,
}

impl ExecutionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            knowledge_query: None,
            tools: Vec::new(),
            auto_bind_tools: false,
            trace: true,
            return_full: true,
            metadata: HashMap::new(),
            overrides: CollaboratorSet::new(),
            validators: Vec::new(),
            cancellation: None,
        }
    }

    pub fn with_knowledge_query(mut self, query: impl Into<String>) -> Self {
        self.knowledge_query = Some(query.into());
        self
    }

    pub fn with_tool(mut self, tool: ToolInvocation) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_auto_bind_tools(mut self, auto_bind: bool) -> Self {
        self.auto_bind_tools = auto_bind;
        self
    }

    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    pub fn with_return_full(mut self, return_full: bool) -> Self {
        self.return_full = return_full;
        self
    }

    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn with_overrides(mut self, overrides: CollaboratorSet) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_validators(mut self, validators: Vec<Arc<dyn Validator>>) -> Self {
        self.validators = validators;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

impl std::fmt::Debug for ExecutionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionRequest")
            .field("prompt", &self.prompt)
            .field("knowledge_query", &self.knowledge_query)
            .field("tools", &self.tools)
            .field("auto_bind_tools", &self.auto_bind_tools)
            .field("trace", &self.trace)
            .field("return_full", &self.return_full)
            .field("ad_hoc_validators", &self.validators.len())
            .finish()
    }
}

/// Guardrail verdict attached to the result whenever a validation stage ran
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailReport {
    pub stage: ValidationStage,
    /// Which mechanism produced the verdict
    pub mechanism: String,
    pub is_valid: bool,
    pub violations: Vec<Violation>,
}

/// Per-tool terminal status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Succeeded,
    Denied,
    Failed,
}

/// Recorded outcome of one requested tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRecord {
    pub name: String,
    pub status: ToolStatus,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// Technical failure surfaced in an error result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

/// Structured outcome of one invocation
///
/// Always well-formed: `blocked` (policy/safety decision) is always
/// distinguishable from `error` (technical failure) and `success`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: TurnStatus,
    /// Present only on success
    pub response: Option<String>,
    pub guardrail_report: Option<GuardrailReport>,
    pub tool_results: Vec<ToolRecord>,
    pub knowledge_results: Vec<KnowledgeHit>,
    pub trace_id: Option<Uuid>,
    pub latency_seconds: f64,
    pub error: Option<ErrorInfo>,
}

impl ExecutionResult {
    /// Collapse to the bare response or a one-line status string
    pub fn into_text(self) -> String {
        match self.status {
            TurnStatus::Success => self.response.unwrap_or_default(),
            TurnStatus::Blocked => {
                let detail = self
                    .guardrail_report
                    .map(|report| {
                        report
                            .violations
                            .iter()
                            .map(|v| v.message.clone())
                            .collect::<Vec<_>>()
                            .join("; ")
                    })
                    .unwrap_or_default();
                if detail.is_empty() {
                    "Blocked by guardrails".to_string()
                } else {
                    format!("Blocked by guardrails: {detail}")
                }
            }
            TurnStatus::Error => {
                let message = self
                    .error
                    .map(|e| e.message)
                    .unwrap_or_else(|| "unknown failure".to_string());
                format!("Error: {message}")
            }
        }
    }
}

/// What the public entry point hands back, shaped by `return_full`
#[derive(Debug)]
pub enum ExecutionOutput {
    /// Collapsed form: the response string, or a blocked/error one-liner
    Text(String),
    /// Full structured result
    Full(Box<ExecutionResult>),
}

impl ExecutionOutput {
    /// The textual form regardless of shape
    pub fn into_text(self) -> String {
        match self {
            ExecutionOutput::Text(text) => text,
            ExecutionOutput::Full(result) => result.into_text(),
        }
    }

    /// The full result when present
    pub fn into_full(self) -> Option<ExecutionResult> {
        match self {
            ExecutionOutput::Text(_) => None,
            ExecutionOutput::Full(result) => Some(*result),
        }
    }
}

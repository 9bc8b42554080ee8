//! Collaborator contracts consumed by the execution pipeline
//!
//! Each stage talks to exactly one collaborator through a narrow trait. The
//! engine never inspects collaborator internals: validators detect whatever
//! they detect, generators call whatever model they call. Soft failures
//! (per-source retrieval, per-tool denial) are data in the returned types,
//! not errors crossing the pipeline boundary.

use crate::error::{EngineError, EngineResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;
use uuid::Uuid;

pub mod facade;

pub use facade::{CollaboratorSet, ResolvedCollaborators};

/// Which validation stage a report belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStage {
    Input,
    Output,
}

/// Contextual fields handed to a validator alongside the text
#[derive(Debug, Clone, Serialize)]
pub struct ValidationContext {
    pub agent_id: String,
    pub stage: ValidationStage,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// A single rule violation reported by a validator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub rule: String,
    pub message: String,
}

/// Outcome of one validator invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    #[serde(default)]
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            violations: Vec::new(),
        }
    }

    pub fn invalid(violations: Vec<Violation>) -> Self {
        Self {
            is_valid: false,
            violations,
        }
    }
}

/// Guardrail mechanism: one required validation method, no shape-sniffing
///
/// Implementations must not mutate the context window.
#[async_trait]
pub trait Validator: Send + Sync {
    /// Mechanism tag reported alongside any block
    fn name(&self) -> &str;

    async fn validate(
        &self,
        text: &str,
        context: &ValidationContext,
    ) -> EngineResult<ValidationReport>;
}

/// Treats an ad-hoc list of validators as a single mechanism
///
/// Runs every member and aggregates violations; the set is valid only if all
/// members are. The members are one mechanism, never combined with another.
pub struct ValidatorSet {
    validators: Vec<Arc<dyn Validator>>,
}

impl ValidatorSet {
    pub fn new(validators: Vec<Arc<dyn Validator>>) -> Self {
        Self { validators }
    }
}

#[async_trait]
impl Validator for ValidatorSet {
    fn name(&self) -> &str {
        "validator_set"
    }

    async fn validate(
        &self,
        text: &str,
        context: &ValidationContext,
    ) -> EngineResult<ValidationReport> {
        let mut violations = Vec::new();
        for validator in &self.validators {
            let report = validator.validate(text, context).await?;
            violations.extend(report.violations);
        }
        Ok(ValidationReport {
            is_valid: violations.is_empty(),
            violations,
        })
    }
}

/// One retrieved knowledge item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeHit {
    pub content: String,
    pub source: Option<String>,
    pub score: Option<f64>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Knowledge retriever
///
/// Implementations are expected to tolerate individual source failures
/// internally and return partial or empty results rather than an error; an
/// error from this trait is still absorbed by the retrieval stage.
#[async_trait]
pub trait KnowledgeSource: Send + Sync {
    async fn retrieve(&self, query: &str) -> EngineResult<Vec<KnowledgeHit>>;
}

/// Permission decision for one action on one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub reason: Option<String>,
}

/// Policy engine consulted before each tool execution
#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        actor: &str,
        action: &str,
        resource: &str,
        context: &HashMap<String, serde_json::Value>,
    ) -> EngineResult<PolicyDecision>;
}

/// Structured outcome of one tool execution
///
/// Failure is represented here, never as an error crossing the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub is_success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl ToolOutcome {
    pub fn success(data: serde_json::Value) -> Self {
        Self {
            is_success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure<S: Into<String>>(message: S) -> Self {
        Self {
            is_success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Tool execution backend
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(
        &self,
        tool_name: &str,
        agent_id: &str,
        inputs: &HashMap<String, serde_json::Value>,
    ) -> ToolOutcome;
}

/// Generation parameters forwarded to the model client
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Language-model client
///
/// `Ok(None)` and `Ok(Some(""))` both count as an empty response.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> EngineResult<Option<String>>;
}

/// Handle for one top-level trace
#[derive(Debug, Clone)]
pub struct TraceHandle {
    pub id: Uuid,
    pub name: String,
}

/// Terminal status of a trace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceStatus {
    Ok,
    Error,
}

/// Scoped span: closed when dropped, so early returns still close it
pub trait SpanGuard: Send {}

/// Tracing backend
pub trait Tracer: Send + Sync {
    fn start_trace(&self, name: &str) -> TraceHandle;

    fn span(
        &self,
        trace: &TraceHandle,
        name: &str,
        attributes: &[(&str, String)],
    ) -> Box<dyn SpanGuard>;

    fn end_trace(&self, trace: &TraceHandle, status: TraceStatus, error: Option<&EngineError>);
}

/// Structured event delivered to the monitor at turn completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorEvent {
    pub event_type: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl MonitorEvent {
    pub fn new(event_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            message: message.into(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

/// Metrics and event sink
#[async_trait]
pub trait Monitor: Send + Sync {
    async fn record_metric(&self, name: &str, value: f64);
    async fn log_event(&self, event: MonitorEvent);
}

/// Tracer that emits structured `tracing` events
pub struct LogTracer;

struct LogSpan {
    trace_id: Uuid,
    name: String,
    started: Instant,
}

impl SpanGuard for LogSpan {}

impl Drop for LogSpan {
    fn drop(&mut self) {
        debug!(
            trace_id = %self.trace_id,
            span = %self.name,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Span closed"
        );
    }
}

impl Tracer for LogTracer {
    fn start_trace(&self, name: &str) -> TraceHandle {
        let handle = TraceHandle {
            id: Uuid::new_v4(),
            name: name.to_string(),
        };
        debug!(trace_id = %handle.id, trace = %handle.name, "Trace started");
        handle
    }

    fn span(
        &self,
        trace: &TraceHandle,
        name: &str,
        attributes: &[(&str, String)],
    ) -> Box<dyn SpanGuard> {
        debug!(
            trace_id = %trace.id,
            span = name,
            attributes = ?attributes,
            "Span opened"
        );
        Box::new(LogSpan {
            trace_id: trace.id,
            name: name.to_string(),
            started: Instant::now(),
        })
    }

    fn end_trace(&self, trace: &TraceHandle, status: TraceStatus, error: Option<&EngineError>) {
        match (status, error) {
            (TraceStatus::Ok, _) => {
                debug!(trace_id = %trace.id, trace = %trace.name, "Trace completed")
            }
            (TraceStatus::Error, Some(e)) => {
                debug!(trace_id = %trace.id, trace = %trace.name, error = %e, "Trace failed")
            }
            (TraceStatus::Error, None) => {
                debug!(trace_id = %trace.id, trace = %trace.name, "Trace ended with error status")
            }
        }
    }
}

/// Tracer that records nothing
pub struct NoopTracer;

struct NoopSpan;

impl SpanGuard for NoopSpan {}

impl Tracer for NoopTracer {
    fn start_trace(&self, name: &str) -> TraceHandle {
        TraceHandle {
            id: Uuid::new_v4(),
            name: name.to_string(),
        }
    }

    fn span(&self, _: &TraceHandle, _: &str, _: &[(&str, String)]) -> Box<dyn SpanGuard> {
        Box::new(NoopSpan)
    }

    fn end_trace(&self, _: &TraceHandle, _: TraceStatus, _: Option<&EngineError>) {}
}

/// Monitor that forwards metrics and events to structured logging
pub struct LogMonitor;

#[async_trait]
impl Monitor for LogMonitor {
    async fn record_metric(&self, name: &str, value: f64) {
        debug!(metric = name, value = value, "Metric recorded");
    }

    async fn log_event(&self, event: MonitorEvent) {
        debug!(
            event_type = %event.event_type,
            message = %event.message,
            "Monitor event"
        );
    }
}

/// Monitor that discards everything
pub struct NoopMonitor;

#[async_trait]
impl Monitor for NoopMonitor {
    async fn record_metric(&self, _name: &str, _value: f64) {}
    async fn log_event(&self, _event: MonitorEvent) {}
}

//! Mock collaborator implementations
//!
//! Every mock records enough of what it saw for behavioral assertions:
//! call counts, execution order, received prompts, trace lifecycles.

use crate::collaborators::{
    Generator, GenerationOptions, KnowledgeHit, KnowledgeSource, Monitor, MonitorEvent,
    PolicyDecision, PolicyEvaluator, SpanGuard, ToolExecutor, ToolOutcome, TraceHandle,
    TraceStatus, Tracer, ValidationContext, ValidationReport, Validator, Violation,
};
use crate::error::{EngineError, EngineResult};
use crate::pipeline::TurnStage;
use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

fn lock<'a, T>(mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

enum ValidatorMode {
    Allow,
    Block { rule: String, message: String },
    Fail,
}

/// Mock validator with configurable verdicts
pub struct MockValidator {
    name: String,
    mode: ValidatorMode,
    calls: AtomicUsize,
}

impl MockValidator {
    pub fn allow_all() -> Self {
        Self {
            name: "mock_validator".to_string(),
            mode: ValidatorMode::Allow,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn block_with(rule: &str, message: &str) -> Self {
        Self {
            name: "mock_validator".to_string(),
            mode: ValidatorMode::Block {
                rule: rule.to_string(),
                message: message.to_string(),
            },
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            name: "mock_validator".to_string(),
            mode: ValidatorMode::Fail,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Validator for MockValidator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn validate(
        &self,
        _text: &str,
        _context: &ValidationContext,
    ) -> EngineResult<ValidationReport> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.mode {
            ValidatorMode::Allow => Ok(ValidationReport::valid()),
            ValidatorMode::Block { rule, message } => {
                Ok(ValidationReport::invalid(vec![Violation {
                    rule: rule.clone(),
                    message: message.clone(),
                }]))
            }
            ValidatorMode::Fail => Err(EngineError::stage_failure(
                TurnStage::InputValidation,
                "mock validator failure",
            )),
        }
    }
}

/// Mock knowledge source returning fixed hits
pub struct MockKnowledge {
    hits: Vec<KnowledgeHit>,
    should_fail: bool,
    queries: Mutex<Vec<String>>,
}

impl MockKnowledge {
    pub fn with_hits(hits: Vec<KnowledgeHit>) -> Self {
        Self {
            hits,
            should_fail: false,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn empty() -> Self {
        Self::with_hits(Vec::new())
    }

    pub fn failing() -> Self {
        Self {
            hits: Vec::new(),
            should_fail: true,
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Convenience constructor for a bare content hit
    pub fn hit(content: &str) -> KnowledgeHit {
        KnowledgeHit {
            content: content.to_string(),
            source: None,
            score: None,
            metadata: HashMap::new(),
        }
    }

    pub fn received_queries(&self) -> Vec<String> {
        lock(&self.queries).clone()
    }
}

#[async_trait]
impl KnowledgeSource for MockKnowledge {
    async fn retrieve(&self, query: &str) -> EngineResult<Vec<KnowledgeHit>> {
        lock(&self.queries).push(query.to_string());
        if self.should_fail {
            return Err(EngineError::stage_failure(
                TurnStage::KnowledgeRetrieval,
                "mock retrieval failure",
            ));
        }
        Ok(self.hits.clone())
    }
}

/// Mock policy evaluator denying a fixed set of resources
pub struct MockPolicy {
    denied: HashSet<String>,
    should_fail: bool,
    evaluated: Mutex<Vec<String>>,
}

impl MockPolicy {
    pub fn allow_all() -> Self {
        Self {
            denied: HashSet::new(),
            should_fail: false,
            evaluated: Mutex::new(Vec::new()),
        }
    }

    pub fn denying(resources: &[&str]) -> Self {
        Self {
            denied: resources.iter().map(|s| s.to_string()).collect(),
            should_fail: false,
            evaluated: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            denied: HashSet::new(),
            should_fail: true,
            evaluated: Mutex::new(Vec::new()),
        }
    }

    pub fn evaluated_resources(&self) -> Vec<String> {
        lock(&self.evaluated).clone()
    }
}

#[async_trait]
impl PolicyEvaluator for MockPolicy {
    async fn evaluate(
        &self,
        _actor: &str,
        _action: &str,
        resource: &str,
        _context: &HashMap<String, serde_json::Value>,
    ) -> EngineResult<PolicyDecision> {
        lock(&self.evaluated).push(resource.to_string());
        if self.should_fail {
            return Err(EngineError::stage_failure(
                TurnStage::ToolExecution,
                "mock policy failure",
            ));
        }
        if self.denied.contains(resource) {
            Ok(PolicyDecision {
                allowed: false,
                reason: Some(format!("{resource} is denied by test policy")),
            })
        } else {
            Ok(PolicyDecision {
                allowed: true,
                reason: None,
            })
        }
    }
}

/// Mock tool executor with per-tool outcomes and execution-order recording
pub struct MockToolExecutor {
    outcomes: HashMap<String, ToolOutcome>,
    executed: Mutex<Vec<String>>,
}

impl MockToolExecutor {
    /// Succeeds for every tool with an echo of its name
    pub fn succeeding() -> Self {
        Self {
            outcomes: HashMap::new(),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn with_outcome(mut self, tool_name: &str, outcome: ToolOutcome) -> Self {
        self.outcomes.insert(tool_name.to_string(), outcome);
        self
    }

    pub fn executed_tools(&self) -> Vec<String> {
        lock(&self.executed).clone()
    }
}

#[async_trait]
impl ToolExecutor for MockToolExecutor {
    async fn execute(
        &self,
        tool_name: &str,
        _agent_id: &str,
        _inputs: &HashMap<String, serde_json::Value>,
    ) -> ToolOutcome {
        lock(&self.executed).push(tool_name.to_string());
        self.outcomes
            .get(tool_name)
            .cloned()
            .unwrap_or_else(|| ToolOutcome::success(json!({ "tool": tool_name })))
    }
}

enum GeneratorMode {
    Respond(String),
    Empty,
    Fail,
}

/// Mock generator with call counting and prompt capture
pub struct MockGenerator {
    mode: GeneratorMode,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
}

impl MockGenerator {
    pub fn single_response(response: &str) -> Self {
        Self {
            mode: GeneratorMode::Respond(response.to_string()),
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn empty() -> Self {
        Self {
            mode: GeneratorMode::Empty,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn failing() -> Self {
        Self {
            mode: GeneratorMode::Fail,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        lock(&self.last_prompt).clone()
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn generate(
        &self,
        prompt: &str,
        _options: &GenerationOptions,
    ) -> EngineResult<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_prompt) = Some(prompt.to_string());
        match &self.mode {
            GeneratorMode::Respond(response) => Ok(Some(response.clone())),
            GeneratorMode::Empty => Ok(None),
            GeneratorMode::Fail => Err(EngineError::stage_failure(
                TurnStage::Generation,
                "mock generator failure",
            )),
        }
    }
}

/// One recorded trace lifecycle
#[derive(Debug, Clone)]
pub struct RecordedTrace {
    pub id: Uuid,
    pub name: String,
    pub status: Option<TraceStatus>,
    pub error_message: Option<String>,
}

/// Tracer that records traces and span names for assertions
#[derive(Default)]
pub struct RecordingTracer {
    traces: Mutex<Vec<RecordedTrace>>,
    spans: Mutex<Vec<String>>,
}

struct RecordingSpan;

impl SpanGuard for RecordingSpan {}

impl RecordingTracer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn traces(&self) -> Vec<RecordedTrace> {
        lock(&self.traces).clone()
    }

    pub fn span_names(&self) -> Vec<String> {
        lock(&self.spans).clone()
    }
}

impl Tracer for RecordingTracer {
    fn start_trace(&self, name: &str) -> TraceHandle {
        let handle = TraceHandle {
            id: Uuid::new_v4(),
            name: name.to_string(),
        };
        lock(&self.traces).push(RecordedTrace {
            id: handle.id,
            name: handle.name.clone(),
            status: None,
            error_message: None,
        });
        handle
    }

    fn span(
        &self,
        _trace: &TraceHandle,
        name: &str,
        _attributes: &[(&str, String)],
    ) -> Box<dyn SpanGuard> {
        lock(&self.spans).push(name.to_string());
        Box::new(RecordingSpan)
    }

    fn end_trace(&self, trace: &TraceHandle, status: TraceStatus, error: Option<&EngineError>) {
        let mut traces = lock(&self.traces);
        if let Some(recorded) = traces.iter_mut().find(|t| t.id == trace.id) {
            recorded.status = Some(status);
            recorded.error_message = error.map(|e| e.to_string());
        }
    }
}

/// Monitor that records metrics and events for assertions
#[derive(Default)]
pub struct RecordingMonitor {
    metrics: Mutex<Vec<(String, f64)>>,
    events: Mutex<Vec<MonitorEvent>>,
}

impl RecordingMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metrics(&self) -> Vec<(String, f64)> {
        lock(&self.metrics).clone()
    }

    pub fn events(&self) -> Vec<MonitorEvent> {
        lock(&self.events).clone()
    }
}

#[async_trait]
impl Monitor for RecordingMonitor {
    async fn record_metric(&self, name: &str, value: f64) {
        lock(&self.metrics).push((name.to_string(), value));
    }

    async fn log_event(&self, event: MonitorEvent) {
        lock(&self.events).push(event);
    }
}

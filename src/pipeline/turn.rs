//! Stage machine for one agent turn
//!
//! Stages run in fixed order on the calling task, each reading or writing
//! the context window. Validation failures and technical errors terminate
//! the walk; per-tool denial/failure and per-source retrieval trouble are
//! recorded and the walk continues. Cancellation is checked before every
//! stage. No error leaves `run` — the caller always gets a well-formed
//! result.

use crate::collaborators::{
    GenerationOptions, KnowledgeHit, MonitorEvent, ResolvedCollaborators, SpanGuard, ToolExecutor,
    TraceHandle, TraceStatus, ValidationContext, ValidationStage,
};
use crate::context::{ContextType, ContextWindow};
use crate::error::{sanitize_error_message, EngineError, EngineResult};
use crate::ledger::PerformanceLedger;
use crate::pipeline::{
    ErrorInfo, ExecutionRequest, ExecutionResult, GuardrailReport, ToolInvocation, ToolRecord,
    ToolStatus, TurnStage, TurnStatus,
};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Importance assigned to retrieved knowledge items
const KNOWLEDGE_IMPORTANCE: f64 = 0.7;
/// Importance assigned to successful tool result items
const TOOL_RESULT_IMPORTANCE: f64 = 0.6;
/// Importance assigned to the committed user prompt
const USER_IMPORTANCE: f64 = 0.5;
/// Importance assigned to the committed assistant response
const ASSISTANT_IMPORTANCE: f64 = 0.6;
/// How many knowledge hits / tool results the generation prompt previews
const PREVIEW_ITEMS: usize = 3;
/// Character cap per previewed entry
const PREVIEW_CHARS: usize = 240;

enum StageFlow {
    Completed(String),
    Blocked,
}

/// One invocation's walk through the stage order
pub(crate) struct TurnPipeline<'a> {
    agent_id: &'a str,
    window: &'a ContextWindow,
    ledger: &'a PerformanceLedger,
    bound_tools: &'a Mutex<HashSet<String>>,
    options: GenerationOptions,
    collaborators: ResolvedCollaborators,
    request: ExecutionRequest,
    knowledge_results: Vec<KnowledgeHit>,
    tool_results: Vec<ToolRecord>,
    guardrail_report: Option<GuardrailReport>,
}

impl<'a> TurnPipeline<'a> {
    pub(crate) fn new(
        agent_id: &'a str,
        window: &'a ContextWindow,
        ledger: &'a PerformanceLedger,
        bound_tools: &'a Mutex<HashSet<String>>,
        options: GenerationOptions,
        collaborators: ResolvedCollaborators,
        request: ExecutionRequest,
    ) -> Self {
        Self {
            agent_id,
            window,
            ledger,
            bound_tools,
            options,
            collaborators,
            request,
            knowledge_results: Vec::new(),
            tool_results: Vec::new(),
            guardrail_report: None,
        }
    }

    /// Run the turn to a terminal state and assemble the result
    pub(crate) async fn run(mut self) -> ExecutionResult {
        let started = Instant::now();
        self.ledger.task_started();

        let trace = if self.request.trace {
            self.collaborators
                .tracer
                .as_ref()
                .map(|tracer| tracer.start_trace("agent_turn"))
        } else {
            None
        };

        let trace_id = trace
            .as_ref()
            .map(|t| t.id.to_string())
            .unwrap_or_else(|| "untraced".to_string());
        info!(
            agent_id = %self.agent_id,
            trace_id = %trace_id,
            tool_count = self.request.tools.len(),
            "Starting agent turn"
        );

        let flow = self.run_stages(&trace, started).await;
        let latency = started.elapsed();

        let (status, response, error) = match flow {
            Ok(StageFlow::Completed(response)) => {
                self.close_trace(&trace, TraceStatus::Ok, None);
                info!(
                    agent_id = %self.agent_id,
                    latency_ms = latency.as_millis() as u64,
                    response_length = response.len(),
                    "Agent turn completed"
                );
                (TurnStatus::Success, Some(response), None)
            }
            Ok(StageFlow::Blocked) => {
                self.close_trace(&trace, TraceStatus::Error, None);
                info!(agent_id = %self.agent_id, "Agent turn blocked by guardrails");
                (TurnStatus::Blocked, None, None)
            }
            Err(e) => {
                self.ledger
                    .record_error(e.kind(), sanitize_error_message(&e.to_string()));
                self.close_trace(&trace, TraceStatus::Error, Some(&e));
                warn!(agent_id = %self.agent_id, error = %e, "Agent turn failed");
                (
                    TurnStatus::Error,
                    None,
                    Some(ErrorInfo {
                        kind: e.kind(),
                        message: e.to_string(),
                    }),
                )
            }
        };

        self.ledger.task_completed(latency, status);

        ExecutionResult {
            status,
            response,
            guardrail_report: self.guardrail_report,
            tool_results: self.tool_results,
            knowledge_results: self.knowledge_results,
            trace_id: trace.map(|t| t.id),
            latency_seconds: latency.as_secs_f64(),
            error,
        }
    }

    async fn run_stages(
        &mut self,
        trace: &Option<TraceHandle>,
        started: Instant,
    ) -> EngineResult<StageFlow> {
        let prompt = self.request.prompt.clone();

        self.check_cancelled(TurnStage::InputValidation)?;
        if !self.validation(trace, ValidationStage::Input, &prompt).await? {
            return Ok(StageFlow::Blocked);
        }

        self.check_cancelled(TurnStage::KnowledgeRetrieval)?;
        self.knowledge_retrieval(trace).await;

        self.check_cancelled(TurnStage::ToolExecution)?;
        self.tool_execution(trace).await;

        self.check_cancelled(TurnStage::Generation)?;
        let response = self.generation(trace).await?;

        self.check_cancelled(TurnStage::OutputValidation)?;
        if !self
            .validation(trace, ValidationStage::Output, &response)
            .await?
        {
            return Ok(StageFlow::Blocked);
        }

        self.check_cancelled(TurnStage::ContextCommit)?;
        self.context_commit(trace, &response, started).await;

        Ok(StageFlow::Completed(response))
    }

    /// Run the resolved validator against `text`, recording the report
    ///
    /// Returns whether the turn may continue. Skipped (and permissive) when
    /// no validator resolved.
    async fn validation(
        &mut self,
        trace: &Option<TraceHandle>,
        stage: ValidationStage,
        text: &str,
    ) -> EngineResult<bool> {
        let Some(validator) = self.collaborators.validator.clone() else {
            return Ok(true);
        };

        let turn_stage = match stage {
            ValidationStage::Input => TurnStage::InputValidation,
            ValidationStage::Output => TurnStage::OutputValidation,
        };
        let _span = self.stage_span(trace, turn_stage);

        let context = ValidationContext {
            agent_id: self.agent_id.to_string(),
            stage,
            metadata: self.request.metadata.clone(),
        };
        let report = validator
            .validate(text, &context)
            .await
            .map_err(|e| EngineError::stage_failure(turn_stage, e.to_string()))?;

        let is_valid = report.is_valid;
        if !is_valid {
            info!(
                agent_id = %self.agent_id,
                stage = %turn_stage,
                mechanism = validator.name(),
                violation_count = report.violations.len(),
                "Validation blocked the turn"
            );
        }
        self.guardrail_report = Some(GuardrailReport {
            stage,
            mechanism: validator.name().to_string(),
            is_valid,
            violations: report.violations,
        });
        Ok(is_valid)
    }

    /// Query the knowledge source and append hits to the window
    ///
    /// Never terminates the turn: a failing retriever yields no results.
    async fn knowledge_retrieval(&mut self, trace: &Option<TraceHandle>) {
        let Some(source) = self.collaborators.knowledge.clone() else {
            return;
        };
        let _span = self.stage_span(trace, TurnStage::KnowledgeRetrieval);

        let query = self
            .request
            .knowledge_query
            .clone()
            .unwrap_or_else(|| self.request.prompt.clone());

        let hits = match source.retrieve(&query).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(
                    agent_id = %self.agent_id,
                    error = %e,
                    "Knowledge retrieval failed, continuing without results"
                );
                Vec::new()
            }
        };

        for hit in &hits {
            let mut metadata = HashMap::new();
            if let Some(source_name) = &hit.source {
                metadata.insert("source".to_string(), json!(source_name));
            }
            self.window.add(
                hit.content.clone(),
                ContextType::Knowledge,
                KNOWLEDGE_IMPORTANCE,
                metadata,
            );
        }

        debug!(
            agent_id = %self.agent_id,
            hit_count = hits.len(),
            "Knowledge retrieval completed"
        );
        self.knowledge_results = hits;
    }

    /// Execute requested tools in declared order, one after another
    ///
    /// Denial and failure are per-tool records; the stage never aborts the
    /// pipeline. Skipped when no executor resolved.
    async fn tool_execution(&mut self, trace: &Option<TraceHandle>) {
        if self.request.tools.is_empty() {
            return;
        }
        let Some(executor) = self.collaborators.tools.clone() else {
            warn!(
                agent_id = %self.agent_id,
                "Tool invocations requested but no executor resolved, skipping stage"
            );
            return;
        };
        let _span = self.stage_span(trace, TurnStage::ToolExecution);

        let invocations = self.request.tools.clone();
        for invocation in &invocations {
            let record = self.run_single_tool(&executor, invocation).await;
            if record.status == ToolStatus::Succeeded {
                if let Some(output) = &record.output {
                    let mut metadata = HashMap::new();
                    metadata.insert("tool".to_string(), json!(record.name));
                    self.window.add(
                        format!("{}: {output}", record.name),
                        ContextType::ToolResult,
                        TOOL_RESULT_IMPORTANCE,
                        metadata,
                    );
                }
            }
            self.tool_results.push(record);
        }
    }

    async fn run_single_tool(
        &self,
        executor: &Arc<dyn ToolExecutor>,
        invocation: &ToolInvocation,
    ) -> ToolRecord {
        let bound = self.lock_bound_tools().contains(&invocation.name);
        if !bound {
            if self.request.auto_bind_tools {
                self.lock_bound_tools().insert(invocation.name.clone());
                debug!(
                    agent_id = %self.agent_id,
                    tool = %invocation.name,
                    "Auto-bound tool to agent"
                );
            } else {
                return ToolRecord {
                    name: invocation.name.clone(),
                    status: ToolStatus::Failed,
                    output: None,
                    error: Some("tool is not bound to the agent".to_string()),
                };
            }
        }

        if let Some(policy) = &self.collaborators.policy {
            match policy
                .evaluate(
                    self.agent_id,
                    "tool:execute",
                    &invocation.name,
                    &self.request.metadata,
                )
                .await
            {
                Ok(decision) if !decision.allowed => {
                    info!(
                        agent_id = %self.agent_id,
                        tool = %invocation.name,
                        reason = decision.reason.as_deref().unwrap_or("unspecified"),
                        "Tool execution denied by policy"
                    );
                    return ToolRecord {
                        name: invocation.name.clone(),
                        status: ToolStatus::Denied,
                        output: None,
                        error: Some(
                            decision
                                .reason
                                .unwrap_or_else(|| "denied by policy".to_string()),
                        ),
                    };
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        agent_id = %self.agent_id,
                        tool = %invocation.name,
                        error = %e,
                        "Policy evaluation failed, tool recorded as failed"
                    );
                    return ToolRecord {
                        name: invocation.name.clone(),
                        status: ToolStatus::Failed,
                        output: None,
                        error: Some(format!("policy evaluation failed: {e}")),
                    };
                }
            }
        }

        let outcome = executor
            .execute(&invocation.name, self.agent_id, &invocation.inputs)
            .await;
        if outcome.is_success {
            ToolRecord {
                name: invocation.name.clone(),
                status: ToolStatus::Succeeded,
                output: outcome.data,
                error: None,
            }
        } else {
            ToolRecord {
                name: invocation.name.clone(),
                status: ToolStatus::Failed,
                output: outcome.data,
                error: outcome
                    .error
                    .or_else(|| Some("tool execution failed".to_string())),
            }
        }
    }

    /// Invoke the generator on the composed model input
    async fn generation(&mut self, trace: &Option<TraceHandle>) -> EngineResult<String> {
        let Some(generator) = self.collaborators.generator.clone() else {
            return Err(EngineError::missing_collaborator("generator"));
        };
        let _span = self.stage_span(trace, TurnStage::Generation);

        let prompt = self.compose_prompt();
        let response = generator
            .generate(&prompt, &self.options)
            .await
            .map_err(|e| EngineError::stage_failure(TurnStage::Generation, e.to_string()))?;

        match response {
            Some(text) if !text.trim().is_empty() => {
                debug!(
                    agent_id = %self.agent_id,
                    response_length = text.len(),
                    "Generation completed"
                );
                Ok(text)
            }
            _ => Err(EngineError::GenerationEmpty),
        }
    }

    /// Compose the model input: window digest, previews, then the raw prompt
    fn compose_prompt(&self) -> String {
        let mut sections = Vec::new();

        let summary = self.window.summary(None);
        if !summary.is_empty() {
            sections.push(format!("Conversation context:\n{summary}"));
        }

        if !self.knowledge_results.is_empty() {
            let preview = self
                .knowledge_results
                .iter()
                .take(PREVIEW_ITEMS)
                .map(|hit| format!("- {}", truncate(&hit.content, PREVIEW_CHARS)))
                .collect::<Vec<_>>()
                .join("\n");
            sections.push(format!("Relevant knowledge:\n{preview}"));
        }

        if !self.tool_results.is_empty() {
            let preview = self
                .tool_results
                .iter()
                .take(PREVIEW_ITEMS)
                .map(|record| match record.status {
                    ToolStatus::Succeeded => {
                        let data = record
                            .output
                            .as_ref()
                            .map(|v| v.to_string())
                            .unwrap_or_default();
                        format!("- {}: {}", record.name, truncate(&data, PREVIEW_CHARS))
                    }
                    ToolStatus::Denied => format!("- {}: denied", record.name),
                    ToolStatus::Failed => format!("- {}: failed", record.name),
                })
                .collect::<Vec<_>>()
                .join("\n");
            sections.push(format!("Tool results:\n{preview}"));
        }

        sections.push(self.request.prompt.clone());
        sections.join("\n\n")
    }

    /// Commit the exchange to the window and notify the monitor
    async fn context_commit(
        &mut self,
        trace: &Option<TraceHandle>,
        response: &str,
        started: Instant,
    ) {
        let _span = self.stage_span(trace, TurnStage::ContextCommit);

        self.window.add(
            self.request.prompt.clone(),
            ContextType::User,
            USER_IMPORTANCE,
            HashMap::new(),
        );
        self.window.add(
            response.to_string(),
            ContextType::Assistant,
            ASSISTANT_IMPORTANCE,
            HashMap::new(),
        );

        if let Some(monitor) = &self.collaborators.monitor {
            let latency = started.elapsed().as_secs_f64();
            monitor.record_metric("turn_latency_seconds", latency).await;
            let event = MonitorEvent::new(
                "turn_completed",
                format!("Agent {} completed a turn", self.agent_id),
            )
            .with_metadata("agent_id", json!(self.agent_id))
            .with_metadata("latency_seconds", json!(latency))
            .with_metadata("tool_count", json!(self.tool_results.len()))
            .with_metadata("knowledge_count", json!(self.knowledge_results.len()));
            monitor.log_event(event).await;
        }
    }

    fn check_cancelled(&self, next: TurnStage) -> EngineResult<()> {
        if let Some(token) = &self.request.cancellation {
            if token.is_cancelled() {
                return Err(EngineError::Cancelled { stage: next });
            }
        }
        Ok(())
    }

    fn stage_span(
        &self,
        trace: &Option<TraceHandle>,
        stage: TurnStage,
    ) -> Option<Box<dyn SpanGuard>> {
        match (trace, &self.collaborators.tracer) {
            (Some(trace), Some(tracer)) => Some(tracer.span(
                trace,
                stage.as_str(),
                &[
                    ("agent_id", self.agent_id.to_string()),
                    ("trace_id", trace.id.to_string()),
                ],
            )),
            _ => None,
        }
    }

    fn close_trace(
        &self,
        trace: &Option<TraceHandle>,
        status: TraceStatus,
        error: Option<&EngineError>,
    ) {
        if let (Some(trace), Some(tracer)) = (trace, &self.collaborators.tracer) {
            tracer.end_trace(trace, status, error);
        }
    }

    fn lock_bound_tools(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.bound_tools.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}

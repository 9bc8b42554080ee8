//! Agent: the public entry point for turn execution
//!
//! Owns the per-agent state a turn needs — context window, performance
//! ledger, bound tool set, static collaborators — and wires each invocation
//! through the facade into the stage machine. Process-wide defaults are
//! plain values handed in by the composition root.

use crate::collaborators::{facade, CollaboratorSet, GenerationOptions};
use crate::config::AgentConfig;
use crate::context::ContextWindow;
use crate::ledger::PerformanceLedger;
use crate::pipeline::{ExecutionOutput, ExecutionRequest, ExecutionResult, TurnPipeline};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// A conversational agent executing one turn at a time
///
/// Cheap to share: all invocation-visible state is behind `Arc`s or interior
/// locks, so concurrent `execute` calls from separate tasks are safe.
pub struct Agent {
    config: AgentConfig,
    window: Arc<ContextWindow>,
    ledger: Arc<PerformanceLedger>,
    collaborators: CollaboratorSet,
    defaults: Arc<CollaboratorSet>,
    bound_tools: Mutex<HashSet<String>>,
}

impl Agent {
    /// Create an agent with no static collaborators and empty defaults
    pub fn new(config: AgentConfig) -> Self {
        Self::with_collaborators(config, CollaboratorSet::new(), Arc::new(CollaboratorSet::new()))
    }

    /// Create an agent with a static collaborator set and shared defaults
    pub fn with_collaborators(
        config: AgentConfig,
        collaborators: CollaboratorSet,
        defaults: Arc<CollaboratorSet>,
    ) -> Self {
        let window = Arc::new(ContextWindow::new(config.context.max_tokens));
        let ledger = Arc::new(PerformanceLedger::new(config.ledger.max_error_records));
        let bound_tools = Mutex::new(config.agent.tools.iter().cloned().collect());
        Self {
            config,
            window,
            ledger,
            collaborators,
            defaults,
            bound_tools,
        }
    }

    /// Execute one turn, honoring the request's `return_full` flag
    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionOutput {
        let return_full = request.return_full;
        let result = self.execute_full(request).await;
        if return_full {
            ExecutionOutput::Full(Box::new(result))
        } else {
            ExecutionOutput::Text(result.into_text())
        }
    }

    /// Execute one turn and always return the full structured result
    pub async fn execute_full(&self, request: ExecutionRequest) -> ExecutionResult {
        let resolved = facade::resolve(
            &request.overrides,
            &request.validators,
            &self.collaborators,
            &self.defaults,
        );

        let options = GenerationOptions {
            temperature: self.config.generation.temperature,
            max_tokens: self.config.generation.max_tokens,
            metadata: Default::default(),
        };

        TurnPipeline::new(
            &self.config.agent.id,
            &self.window,
            &self.ledger,
            &self.bound_tools,
            options,
            resolved,
            request,
        )
        .run()
        .await
    }

    /// The agent's context window
    pub fn context(&self) -> &ContextWindow {
        &self.window
    }

    /// The agent's performance ledger
    pub fn ledger(&self) -> &PerformanceLedger {
        &self.ledger
    }

    /// The agent's static configuration
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Bind a tool name to the agent
    pub fn bind_tool(&self, name: impl Into<String>) {
        self.lock_bound_tools().insert(name.into());
    }

    /// Names of tools currently bound to the agent
    pub fn bound_tools(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock_bound_tools().iter().cloned().collect();
        names.sort();
        names
    }

    fn lock_bound_tools(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.bound_tools.lock().unwrap_or_else(|e| e.into_inner())
    }
}

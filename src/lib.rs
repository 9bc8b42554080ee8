//! agentcore - single-turn agent execution engine
//!
//! An in-process engine for executing one conversational agent turn: input
//! validation, optional knowledge retrieval, optional tool invocation,
//! generation, output validation, and commitment into a token-budgeted
//! context window - observed through tracing spans and a per-agent
//! performance ledger.
//!
//! # Overview
//!
//! This crate provides:
//! - A staged execution pipeline with short-circuit semantics
//! - A bounded, importance-weighted context window with deterministic eviction
//! - Per-invocation collaborator resolution with a fixed precedence order
//! - A per-agent performance ledger with a bounded error log
//! - An in-process tool registry with JSON Schema input validation
//!
//! # Quick Start
//!
//! ```rust
//! use agentcore::{Agent, AgentConfig, CollaboratorSet, ExecutionRequest};
//! use agentcore::testing::mocks::MockGenerator;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let config = AgentConfig::with_id("example-agent");
//! let collaborators = CollaboratorSet::new()
//!     .with_generator(Arc::new(MockGenerator::single_response("hello back")));
//! let agent = Agent::with_collaborators(config, collaborators, Arc::new(CollaboratorSet::new()));
//!
//! let result = agent.execute_full(ExecutionRequest::new("hello")).await;
//! assert_eq!(result.response.as_deref(), Some("hello back"));
//! # });
//! ```

pub mod agent;
pub mod collaborators;
pub mod config;
pub mod context;
pub mod error;
pub mod ledger;
pub mod observability;
pub mod pipeline;
pub mod testing;
pub mod tools;

pub use agent::Agent;
pub use collaborators::{
    CollaboratorSet, GenerationOptions, Generator, KnowledgeHit, KnowledgeSource, LogMonitor,
    LogTracer, Monitor, MonitorEvent, NoopMonitor, NoopTracer, PolicyDecision, PolicyEvaluator,
    ToolExecutor, ToolOutcome, TraceHandle, TraceStatus, Tracer, ValidationContext,
    ValidationReport, ValidationStage, Validator, ValidatorSet, Violation,
};
pub use config::AgentConfig;
pub use context::{ContextItem, ContextType, ContextWindow, WindowStats};
pub use error::{EngineError, EngineResult, ErrorKind};
pub use ledger::{ErrorRecord, LedgerSnapshot, PerformanceLedger};
pub use pipeline::{
    ErrorInfo, ExecutionOutput, ExecutionRequest, ExecutionResult, GuardrailReport,
    ToolInvocation, ToolRecord, ToolStatus, TurnStage, TurnStatus,
};
pub use tools::{Tool, ToolDescription, ToolError, ToolRegistry};

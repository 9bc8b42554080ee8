//! In-process tool registry
//!
//! Named tools declare a JSON Schema for their inputs; the registry validates
//! inputs against that schema before dispatch. As the pipeline's executor it
//! folds every failure mode — unknown tool, schema violation, execution
//! error — into the returned outcome rather than raising.

use crate::collaborators::{ToolExecutor, ToolOutcome};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Tool description with a JSON Schema for its parameters
#[derive(Debug, Clone)]
pub struct ToolDescription {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// One invocable tool
#[async_trait]
pub trait Tool: Send + Sync {
    /// Declared name, description, and parameter schema
    fn describe(&self) -> ToolDescription;

    /// Execute with inputs already validated against the declared schema
    async fn execute(&self, inputs: &Value) -> Result<Value, ToolError>;
}

/// Tool system errors
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Input validation failed: {0}")]
    ValidationError(String),
    #[error("Schema error: {0}")]
    SchemaError(String),
    #[error("Tool execution failed: {0}")]
    ExecutionError(String),
}

/// Registry of named tools usable as the process-default executor
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its declared name, replacing any previous one
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.describe().name;
        self.tools.insert(name, tool);
    }

    /// Names of all registered tools
    pub fn list_tools(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// Description of one tool, if registered
    pub fn describe_tool(&self, tool_name: &str) -> Option<ToolDescription> {
        self.tools.get(tool_name).map(|tool| tool.describe())
    }

    /// Execute a tool after validating inputs against its schema
    pub async fn execute_tool(&self, tool_name: &str, inputs: &Value) -> Result<Value, ToolError> {
        let tool = self
            .tools
            .get(tool_name)
            .ok_or_else(|| ToolError::UnknownTool(tool_name.to_string()))?;

        self.validate_inputs(tool_name, inputs)?;

        tool.execute(inputs).await
    }

    /// Validate inputs against the tool's declared schema
    fn validate_inputs(&self, tool_name: &str, inputs: &Value) -> Result<(), ToolError> {
        let tool = self
            .tools
            .get(tool_name)
            .ok_or_else(|| ToolError::UnknownTool(tool_name.to_string()))?;

        let description = tool.describe();
        let validator = jsonschema::validator_for(&description.parameters)
            .map_err(|e| ToolError::SchemaError(format!("Schema compilation error: {e}")))?;

        validator.validate(inputs).map_err(|errors| {
            let error_messages: Vec<String> = errors
                .map(|e| format!("At '{}': {e}", e.instance_path))
                .collect();
            ToolError::ValidationError(error_messages.join("; "))
        })
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    async fn execute(
        &self,
        tool_name: &str,
        _agent_id: &str,
        inputs: &HashMap<String, Value>,
    ) -> ToolOutcome {
        let inputs = Value::Object(inputs.clone().into_iter().collect());
        match self.execute_tool(tool_name, &inputs).await {
            Ok(data) => ToolOutcome::success(data),
            Err(e) => ToolOutcome::failure(e.to_string()),
        }
    }
}

pub mod create_vm;
pub mod delete_vm;
pub mod generate_artifact;
pub mod search_web;
pub mod update_vm;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use toll_types::message::{ToolCall, ToolResult};

use crate::llm::ToolDefinition;

/// Implemented by every tool an agent can call.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;

    /// Whether a human must approve each call before it runs.
    fn requires_approval(&self) -> bool {
        false
    }

    async fn execute(&self, input: &Value) -> Result<Value>;
}

/// Registry of available tools.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Box<dyn ToolExecutor>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: vec![] }
    }

    /// Azure VM lifecycle tools. Every one of them is approval-gated.
    pub fn with_vm_tools() -> Self {
        let mut reg = Self::new();
        reg.register(Box::new(create_vm::CreateVm));
        reg.register(Box::new(update_vm::UpdateVm));
        reg.register(Box::new(delete_vm::DeleteVm));
        reg
    }

    pub fn register(&mut self, tool: Box<dyn ToolExecutor>) {
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn ToolExecutor> {
        self.tools.iter().find(|t| t.name() == name).map(|t| t.as_ref())
    }

    /// Unknown tools never require approval; calling them fails instead.
    pub fn requires_approval(&self, name: &str) -> bool {
        self.get(name).is_some_and(|t| t.requires_approval())
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Execute a tool call, returning a ToolResult.
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        let Some(tool) = self.get(&call.name) else {
            return ToolResult::error(call, format!("Unknown tool: {}", call.name));
        };

        match tool.execute(&call.input).await {
            Ok(output) => ToolResult::success(call, output),
            Err(e) => {
                warn!(tool = %call.name, error = %e, "tool returned error");
                ToolResult::error(call, e.to_string())
            }
        }
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }
}

/// Required string argument.
pub(crate) fn str_arg<'a>(input: &'a Value, key: &str) -> Result<&'a str> {
    input[key]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("missing '{key}' parameter"))
}

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use super::str_arg;

/// Hands long-form content to the client's artifact panel. The result is the
/// input itself; rendering happens client-side.
pub struct GenerateArtifact;

#[async_trait]
impl super::ToolExecutor for GenerateArtifact {
    fn name(&self) -> &str {
        "generate_artifact"
    }

    fn description(&self) -> &str {
        "Use this tool to display code, documents, or long-form content (like essays or poems) in a dedicated UI container on the right side of the screen."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string", "description": "The title of the artifact" },
                "description": { "type": "string", "description": "A short summary of the content" },
                "content": { "type": "string", "description": "The main body of the artifact (text or code)" },
                "language": { "type": "string", "description": "The programming language for highlighting (e.g., 'markdown', 'typescript', 'text')" }
            },
            "required": ["title", "description", "content"]
        })
    }

    async fn execute(&self, input: &Value) -> Result<Value> {
        str_arg(input, "title")?;
        str_arg(input, "content")?;
        Ok(input.clone())
    }
}

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use super::str_arg;

pub struct DeleteVm;

#[async_trait]
impl super::ToolExecutor for DeleteVm {
    fn name(&self) -> &str {
        "delete_vm"
    }

    fn description(&self) -> &str {
        "Delete a virtual machine in Azure."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "The name of the virtual machine to delete" }
            },
            "required": ["name"]
        })
    }

    fn requires_approval(&self) -> bool {
        true
    }

    async fn execute(&self, input: &Value) -> Result<Value> {
        let name = str_arg(input, "name")?;

        info!(vm = name, "deleting VM");
        Ok(json!({
            "status": "success",
            "message": format!("VM {name} deleted successfully."),
        }))
    }
}

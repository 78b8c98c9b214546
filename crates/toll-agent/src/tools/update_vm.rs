use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use super::str_arg;

pub struct UpdateVm;

#[async_trait]
impl super::ToolExecutor for UpdateVm {
    fn name(&self) -> &str {
        "update_vm"
    }

    fn description(&self) -> &str {
        "Update an existing virtual machine's configuration in Azure."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "The name of the virtual machine to update" },
                "size": { "type": "string", "description": "The new size for the VM" }
            },
            "required": ["name", "size"]
        })
    }

    fn requires_approval(&self) -> bool {
        true
    }

    async fn execute(&self, input: &Value) -> Result<Value> {
        let name = str_arg(input, "name")?;
        let size = str_arg(input, "size")?;

        info!(vm = name, size, "updating VM");
        Ok(json!({
            "status": "success",
            "message": format!("VM {name} updated to size {size} successfully."),
        }))
    }
}

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use super::str_arg;

pub struct CreateVm;

#[async_trait]
impl super::ToolExecutor for CreateVm {
    fn name(&self) -> &str {
        "create_vm"
    }

    fn description(&self) -> &str {
        "Create a new virtual machine in Azure."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "The name of the virtual machine" },
                "image": { "type": "string", "description": "The OS image for the VM (e.g., 'Ubuntu', 'Windows')" },
                "size": { "type": "string", "description": "The size of the VM (e.g., 'Standard_DS1_v2')" }
            },
            "required": ["name", "image", "size"]
        })
    }

    fn requires_approval(&self) -> bool {
        true
    }

    async fn execute(&self, input: &Value) -> Result<Value> {
        let name = str_arg(input, "name")?;
        let image = str_arg(input, "image")?;
        let size = str_arg(input, "size")?;

        info!(vm = name, image, size, "creating VM");
        let suffix = Uuid::new_v4().simple().to_string();
        Ok(json!({
            "status": "success",
            "message": format!("VM {name} created successfully."),
            "vmId": format!("vm-{}", &suffix[..9]),
        }))
    }
}

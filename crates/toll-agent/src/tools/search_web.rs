use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use super::str_arg;

const SEARCH_URL: &str = "https://api.parallel.ai/v1beta/search";

pub struct SearchWeb {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl SearchWeb {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
        }
    }

    /// Reads the key from `PARALLEL_API_KEY`.
    pub fn from_env() -> Self {
        Self::new(std::env::var("PARALLEL_API_KEY").ok())
    }
}

#[async_trait]
impl super::ToolExecutor for SearchWeb {
    fn name(&self) -> &str {
        "search_web"
    }

    fn description(&self) -> &str {
        "Search the web and provide information."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "The search query" }
            },
            "required": ["query"]
        })
    }

    fn requires_approval(&self) -> bool {
        true
    }

    async fn execute(&self, input: &Value) -> Result<Value> {
        let query = str_arg(input, "query")?;
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("PARALLEL_API_KEY is not set"))?;

        info!(query, "searching the web");
        let response = self
            .client
            .post(SEARCH_URL)
            .header("x-api-key", api_key)
            .header("parallel-beta", "search-extract-2025-10-10")
            .json(&json!({
                "objective": query,
                "search_queries": [query],
                "max_results": 10,
                "excerpts": { "max_chars_per_result": 10000 },
            }))
            .send()
            .await
            .context("Failed to reach search API")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Search API error ({}): {}", status, body);
        }

        let data: Value = response
            .json()
            .await
            .context("Failed to parse search API response")?;
        let results = data.get("results").cloned().unwrap_or(data);
        Ok(json!({ "status": "success", "results": results }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolExecutor;

    #[tokio::test]
    async fn fails_without_api_key() {
        let err = SearchWeb::new(None)
            .execute(&json!({"query": "vm sizes"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("PARALLEL_API_KEY"));
    }
}

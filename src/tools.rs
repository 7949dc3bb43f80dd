//! Tool collaborators
//!
//! Tools are stateless singletons; everything per-call arrives through the
//! arguments and the cancellation token.

pub mod product_search;
mod read_results;

pub use product_search::ProductSearchTool;
pub use read_results::ReadResultsTool;

use crate::config::Config;
use crate::reasoner::ToolDefinition;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Result from tool execution. `output` is the raw output string handed back
/// to the conversation; rendering happens in the tool executor node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    pub output: String,
}

impl ToolOutput {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: message.into(),
        }
    }
}

/// Trait for tools the dialogue graph can invoke
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name, as referenced by tool-call requests
    fn name(&self) -> &str;

    /// Tool description for the reasoner
    fn description(&self) -> String;

    /// JSON schema for tool arguments
    fn input_schema(&self) -> Value;

    /// Execute the tool. Long-running tools should monitor `cancel` and
    /// stop gracefully when it fires.
    async fn run(&self, args: &Map<String, Value>, cancel: CancellationToken) -> ToolOutput;
}

/// Collection of tools available to conversations
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Standard registry: storefront search plus saved-result reads
    pub fn standard(config: &Config) -> Self {
        Self {
            tools: vec![
                Arc::new(ProductSearchTool::new(
                    config.results_path.clone(),
                    config.cookies_path.clone(),
                )),
                Arc::new(ReadResultsTool::new(config.results_path.clone())),
            ],
        }
    }

    /// Registry over an explicit tool list (used by tests and embeddings)
    pub fn with_tools(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self { tools }
    }

    /// Tool definitions advertised to the reasoner
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    /// Execute a tool by name. `None` when no tool carries that name.
    pub async fn execute(
        &self,
        name: &str,
        args: &Map<String, Value>,
        cancel: CancellationToken,
    ) -> Option<ToolOutput> {
        for tool in &self.tools {
            if tool.name() == name {
                return Some(tool.run(args, cancel).await);
            }
        }
        None
    }
}

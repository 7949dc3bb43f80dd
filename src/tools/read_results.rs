//! Read back previously persisted search results

use super::{Tool, ToolOutput};
use crate::products;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Deserialize)]
struct ReadResultsInput {
    #[serde(default)]
    path: Option<String>,
}

/// Tool returning the saved product records as raw JSON
pub struct ReadResultsTool {
    default_path: PathBuf,
}

impl ReadResultsTool {
    pub fn new(default_path: PathBuf) -> Self {
        Self { default_path }
    }
}

#[async_trait]
impl Tool for ReadResultsTool {
    fn name(&self) -> &str {
        "read_results"
    }

    fn description(&self) -> String {
        "Read the product records saved by the most recent product_search call. \
         Returns the raw JSON array."
            .to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path of the results file (defaults to the configured one)"
                }
            }
        })
    }

    async fn run(&self, args: &Map<String, Value>, _cancel: CancellationToken) -> ToolOutput {
        let input: ReadResultsInput = match serde_json::from_value(Value::Object(args.clone())) {
            Ok(input) => input,
            Err(e) => return ToolOutput::error(format!("Invalid input: {e}")),
        };

        let path = input
            .path
            .map_or_else(|| self.default_path.clone(), PathBuf::from);

        match products::load_results(&path) {
            Ok(records) => match serde_json::to_string(&records) {
                Ok(raw) => ToolOutput::success(raw),
                Err(e) => ToolOutput::error(format!("Could not serialize results: {e}")),
            },
            Err(e) => ToolOutput::error(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::products::{save_results, ProductRecord};

    #[tokio::test]
    async fn reads_saved_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        let records = vec![ProductRecord {
            title: "Phone".to_string(),
            price: "199.00".to_string(),
            image_url: String::new(),
            purchase_link: String::new(),
            image_text: String::new(),
        }];
        save_results(&path, &records).unwrap();

        let tool = ReadResultsTool::new(path);
        let output = tool.run(&Map::new(), CancellationToken::new()).await;
        assert!(output.success);
        assert!(output.output.contains("Phone"));
    }

    #[tokio::test]
    async fn missing_file_is_a_tool_error() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ReadResultsTool::new(dir.path().join("absent.json"));
        let output = tool.run(&Map::new(), CancellationToken::new()).await;
        assert!(!output.success);
    }
}

//! Shared mock collaborators for graph and stream tests

use crate::message::ModelResponse;
use crate::products::ProductRecord;
use crate::reasoner::{Reasoner, ReasonerError, ReasonerRequest};
use crate::tools::{Tool, ToolOutput};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Reasoner that replays a scripted sequence of replies. Exhausting the
/// script is an error reply.
pub struct ScriptedReasoner {
    replies: Mutex<VecDeque<Result<ModelResponse, ReasonerError>>>,
    /// Virtual time consumed per call (used with paused-clock tests)
    delay: Duration,
}

impl ScriptedReasoner {
    pub fn new(replies: Vec<Result<ModelResponse, ReasonerError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Reasoner for ScriptedReasoner {
    async fn respond(&self, _request: &ReasonerRequest) -> Result<ModelResponse, ReasonerError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.replies
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or_else(|| Err(ReasonerError::unknown("scripted replies exhausted")))
    }

    fn model_id(&self) -> &str {
        "scripted"
    }
}

/// Tool returning a fixed raw output
pub struct StaticTool {
    name: String,
    output: String,
    delay: Duration,
}

impl StaticTool {
    pub fn new(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            output: output.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Tool for StaticTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        "static test tool".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }

    async fn run(&self, _args: &Map<String, Value>, _cancel: CancellationToken) -> ToolOutput {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        ToolOutput::success(self.output.clone())
    }
}

/// Tool that never resolves until cancelled
pub struct HangingTool {
    name: String,
}

impl HangingTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Tool for HangingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        "hangs forever".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }

    async fn run(&self, _args: &Map<String, Value>, cancel: CancellationToken) -> ToolOutput {
        cancel.cancelled().await;
        ToolOutput::error("cancelled")
    }
}

/// Raw JSON array of `n` sample product records, as the search tool emits
pub fn search_records_json(n: usize) -> String {
    let records: Vec<ProductRecord> = (0..n)
        .map(|i| ProductRecord {
            title: format!("Phone {i}"),
            price: format!("{}99.00", i + 1),
            image_url: format!("https://img.example/{i}.jpg"),
            purchase_link: format!("https://shop.example/item/{i}"),
            image_text: String::new(),
        })
        .collect();
    serde_json::to_string(&records).expect("records serialize")
}

//! Node implementations and step-by-step graph execution

use super::route::{route, NextNode};
use super::state::{ConversationState, GraphNode, StepRecord};
use crate::message::{normalize_all, tool_requests, truncate_chars, RawMessage};
use crate::products;
use crate::prompt::{SYSTEM_PREAMBLE, WELCOME_MSG};
use crate::reasoner::{Reasoner, ReasonerRequest};
use crate::tools::{ToolOutput, ToolRegistry};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Ceiling on node executions within one turn; cycles that never terminate
/// become a graph error instead of spinning forever.
pub const MAX_STEPS: u32 = 100;

/// Characters of a collaborator failure surfaced to the user
const ERROR_CONTENT_LIMIT: usize = 200;

/// Errors raised by graph execution itself. Collaborator failures are not
/// errors — nodes absorb them into terminal assistant messages.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Dialogue exceeded {0} steps without terminating")]
    StepLimit(u32),
}

/// The four-node dialogue graph and its collaborators
pub struct DialogueGraph {
    reasoner: Arc<dyn Reasoner>,
    tools: ToolRegistry,
}

impl DialogueGraph {
    pub fn new(reasoner: Arc<dyn Reasoner>, tools: ToolRegistry) -> Self {
        Self { reasoner, tools }
    }

    /// Begin executing from `initial`. Steps are produced lazily, one per
    /// `next_step` call, starting at the reasoner node.
    pub fn execute(self: &Arc<Self>, initial: ConversationState) -> GraphExecution {
        GraphExecution {
            graph: Arc::clone(self),
            state: initial,
            next: Some(GraphNode::Reasoner),
            steps_taken: 0,
            cancel: CancellationToken::new(),
        }
    }

    async fn reason(&self, prev: &ConversationState) -> (ConversationState, StepRecord) {
        if prev.finished {
            return (
                prev.clone(),
                StepRecord::for_node(GraphNode::Reasoner).finished(true),
            );
        }

        if prev.messages.is_empty() {
            let welcome = RawMessage::assistant(WELCOME_MSG);
            let mut state = prev.appending(vec![welcome.clone()]);
            state.finished = true;
            let record = StepRecord::for_node(GraphNode::Reasoner)
                .with_chat_message(welcome)
                .finished(true);
            return (state, record);
        }

        let request = ReasonerRequest {
            system: SYSTEM_PREAMBLE.to_string(),
            messages: normalize_all(&prev.messages),
            tools: self.tools.definitions(),
        };

        match self.reasoner.respond(&request).await {
            Ok(response) => {
                let raw = RawMessage::Response(response);
                let calls = tool_requests(&raw);
                let work_remains = !calls.is_empty();

                let mut state = prev.appending(vec![raw.clone()]);
                state.finished = !work_remains;
                let record = StepRecord::for_node(GraphNode::Reasoner)
                    .with_chat_message(raw)
                    .with_tool_calls(calls)
                    .finished(!work_remains);
                (state, record)
            }
            Err(e) => {
                tracing::error!(error = %e, "Reasoner call failed");
                let message = RawMessage::assistant(format!(
                    "Sorry, something went wrong while handling your request: {}",
                    truncate_chars(&e.to_string(), ERROR_CONTENT_LIMIT)
                ));
                let mut state = prev.appending(vec![message.clone()]);
                state.finished = true;
                let record = StepRecord::for_node(GraphNode::Reasoner)
                    .with_chat_message(message)
                    .finished(true);
                (state, record)
            }
        }
    }

    async fn run_tools(
        &self,
        prev: &ConversationState,
        cancel: &CancellationToken,
    ) -> (ConversationState, StepRecord) {
        let calls = prev.last_message().map(tool_requests).unwrap_or_default();

        if calls.is_empty() {
            let message =
                RawMessage::assistant("Tool execution was requested but no tool calls were found.");
            let mut state = prev.appending(vec![message.clone()]);
            state.finished = true;
            let record = StepRecord::for_node(GraphNode::Tools)
                .with_messages(vec![message])
                .finished(true);
            return (state, record);
        }

        let mut outputs = Vec::new();
        for call in &calls {
            let start = std::time::Instant::now();
            let rendered = match self
                .tools
                .execute(&call.name, &call.args, cancel.child_token())
                .await
            {
                None => {
                    tracing::warn!(tool = %call.name, "No such tool");
                    format!("Error: no tool named '{}' is available.", call.name)
                }
                Some(output) => {
                    tracing::info!(
                        tool = %call.name,
                        duration_ms = %start.elapsed().as_millis(),
                        success = output.success,
                        "Tool finished"
                    );
                    render_tool_result(&call.name, &output)
                }
            };
            outputs.push(RawMessage::assistant(rendered));
        }

        let mut state = prev.appending(outputs.clone());
        state.finished = true;
        let record = StepRecord::for_node(GraphNode::Tools)
            .with_messages(outputs)
            .finished(true);
        (state, record)
    }

    fn take_human_input(&self, prev: &ConversationState) -> (ConversationState, StepRecord) {
        let text = prev.query.last().cloned().unwrap_or_default();
        let message = RawMessage::user(text);
        let state = prev.appending(vec![message.clone()]);
        let record = StepRecord::for_node(GraphNode::Human)
            .with_messages(vec![message])
            .finished(state.finished);
        (state, record)
    }
}

/// Human-readable rendering of one tool result. Product searches render as a
/// table; anything else (and anything that fails to render) becomes an
/// excerpt of the raw output.
fn render_tool_result(name: &str, output: &ToolOutput) -> String {
    if !output.success {
        return format!(
            "Tool '{name}' failed: {}",
            truncate_chars(&output.output, ERROR_CONTENT_LIMIT)
        );
    }
    if name == "product_search" {
        if let Some(rendered) = products::render_search_results(&output.output) {
            return rendered;
        }
    }
    products::raw_excerpt(name, &output.output)
}

/// One lazy execution of the dialogue graph.
///
/// Pull-based: each `next_step` call runs exactly one node against the
/// current state and returns its delta. `None` once the route terminates.
pub struct GraphExecution {
    graph: Arc<DialogueGraph>,
    state: ConversationState,
    next: Option<GraphNode>,
    steps_taken: u32,
    cancel: CancellationToken,
}

impl GraphExecution {
    pub async fn next_step(&mut self) -> Result<Option<StepRecord>, GraphError> {
        let Some(node) = self.next else {
            return Ok(None);
        };

        self.steps_taken += 1;
        if self.steps_taken > MAX_STEPS {
            return Err(GraphError::StepLimit(MAX_STEPS));
        }

        let (state, record) = match node {
            GraphNode::Reasoner => self.graph.reason(&self.state).await,
            GraphNode::Tools => self.graph.run_tools(&self.state, &self.cancel).await,
            GraphNode::Human => self.graph.take_human_input(&self.state),
        };
        self.state = state;

        self.next = match node {
            GraphNode::Reasoner => match route(&self.state) {
                NextNode::Tools => Some(GraphNode::Tools),
                NextNode::Human => Some(GraphNode::Human),
                NextNode::Terminal => None,
            },
            GraphNode::Tools | GraphNode::Human => Some(GraphNode::Reasoner),
        };

        Ok(Some(record))
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    /// Token wired into every tool invocation of this execution
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

//! Conversation and step state types

use crate::message::{RawMessage, ToolCallRequest};
use serde::{Deserialize, Serialize};

/// Conversation state threaded through node executions.
///
/// `messages` is append-only and heterogeneous — nodes append whatever raw
/// shape they produce and never reorder. A fresh copy is created at every
/// node; state is never mutated in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    #[serde(default)]
    pub messages: Vec<RawMessage>,
    #[serde(default)]
    pub query: Vec<String>,
    #[serde(default)]
    pub finished: bool,
}

impl ConversationState {
    /// Seed a new turn from prior history plus the user's latest input
    pub fn new_turn(mut history: Vec<RawMessage>, query: impl Into<String>) -> Self {
        let query = query.into();
        history.push(RawMessage::user(query.clone()));
        Self {
            messages: history,
            query: vec![query],
            finished: false,
        }
    }

    pub fn last_message(&self) -> Option<&RawMessage> {
        self.messages.last()
    }

    /// Fresh state with `delta` appended; `finished` is carried over
    pub fn appending(&self, delta: Vec<RawMessage>) -> Self {
        let mut messages = self.messages.clone();
        messages.extend(delta);
        Self {
            messages,
            query: self.query.clone(),
            finished: self.finished,
        }
    }
}

/// Node identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphNode {
    Reasoner,
    Tools,
    Human,
}

/// Delta nested under the reasoner's node key in the step shape
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatDelta {
    #[serde(default)]
    pub messages: Vec<RawMessage>,
    #[serde(default)]
    pub output: Vec<RawMessage>,
}

/// One step: the delta produced by a single node execution.
///
/// The shape mirrors the historical trace format, which scattered messages
/// over several locations: top-level `messages`, the nested chat delta, and
/// three generically named output fields. Live nodes populate `messages` and
/// `chat`; the interpreter reads every location so recorded traces in the
/// older shape classify identically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<GraphNode>,
    #[serde(default)]
    pub messages: Vec<RawMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat: Option<ChatDelta>,
    #[serde(default)]
    pub output: Vec<RawMessage>,
    #[serde(default)]
    pub response: Vec<RawMessage>,
    #[serde(default)]
    pub result: Vec<RawMessage>,
    /// In-flight marker: requests the reasoner has issued but no tool has
    /// resolved yet
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(default)]
    pub finished: bool,
}

impl StepRecord {
    pub fn for_node(node: GraphNode) -> Self {
        Self {
            node: Some(node),
            ..Self::default()
        }
    }

    pub fn with_messages(mut self, messages: Vec<RawMessage>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_chat_message(mut self, message: RawMessage) -> Self {
        self.chat
            .get_or_insert_with(ChatDelta::default)
            .messages
            .push(message);
        self
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCallRequest>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    pub fn finished(mut self, finished: bool) -> Self {
        self.finished = finished;
        self
    }

    /// Every raw message in the record, in source-then-position order:
    /// top-level, chat messages, chat output, then the generic fields.
    pub fn raw_messages(&self) -> impl Iterator<Item = &RawMessage> {
        let (chat_messages, chat_output) = match &self.chat {
            Some(delta) => (delta.messages.as_slice(), delta.output.as_slice()),
            None => (&[][..], &[][..]),
        };
        self.messages
            .iter()
            .chain(chat_messages)
            .chain(chat_output)
            .chain(&self.output)
            .chain(&self.response)
            .chain(&self.result)
    }
}

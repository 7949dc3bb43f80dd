//! Conditional routing after a reasoning step

use super::state::ConversationState;
use crate::message::tool_requests;

/// Where the graph goes after the reasoner node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextNode {
    Tools,
    Human,
    Terminal,
}

/// Pure routing predicate, evaluated once per node transition.
///
/// A finished conversation terminates regardless of message content.
/// Otherwise the last message decides: any tool-call request (detected via
/// the shared extractor, canonical shape first) routes to the tool executor;
/// everything else waits for the human.
pub fn route(state: &ConversationState) -> NextNode {
    if state.finished {
        return NextNode::Terminal;
    }

    match state.last_message() {
        Some(last) if !tool_requests(last).is_empty() => NextNode::Tools,
        _ => NextNode::Human,
    }
}

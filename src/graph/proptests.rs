//! Property-based tests for routing and normalization invariants

use super::route::{route, NextNode};
use super::state::ConversationState;
use crate::message::{
    normalize, ChatMessage, LegacyFunctionCall, ModelResponse, RawMessage, Role, ToolCallRequest,
};
use proptest::collection::vec;
use proptest::prelude::*;
use serde_json::Map;

fn arb_role() -> impl Strategy<Value = Role> {
    prop_oneof![Just(Role::User), Just(Role::Assistant), Just(Role::Tool)]
}

fn arb_tool_call() -> impl Strategy<Value = ToolCallRequest> {
    "[a-z_]{1,12}".prop_map(|name| ToolCallRequest::new(name, Map::new()))
}

fn arb_record() -> impl Strategy<Value = RawMessage> {
    (arb_role(), "[a-zA-Z0-9 ]{0,60}", vec(arb_tool_call(), 0..3)).prop_map(
        |(role, content, tool_calls)| {
            RawMessage::Record(ChatMessage {
                role,
                content,
                tool_calls,
            })
        },
    )
}

fn arb_response() -> impl Strategy<Value = RawMessage> {
    (
        "[a-zA-Z0-9 ]{0,60}",
        vec(arb_tool_call(), 0..2),
        proptest::option::of(("[a-z_]{1,10}", "[a-z{}\" :]{0,20}")),
    )
        .prop_map(|(content, tool_calls, legacy)| {
            RawMessage::Response(ModelResponse {
                content,
                tool_calls,
                function_call: legacy.map(|(name, arguments)| LegacyFunctionCall {
                    name,
                    arguments,
                }),
            })
        })
}

fn arb_pair() -> impl Strategy<Value = RawMessage> {
    ("[a-zA-Z]{0,10}", "[a-zA-Z0-9 ]{0,60}")
        .prop_map(|(role, content)| RawMessage::Pair(role, content))
}

fn arb_raw_message() -> impl Strategy<Value = RawMessage> {
    prop_oneof![arb_record(), arb_response(), arb_pair()]
}

proptest! {
    /// Normalization yields a trimmed, non-empty utterance or nothing. The
    /// role is `SpeakerRole` by construction, so a `tool` role can never
    /// escape this layer.
    #[test]
    fn normalizer_output_is_trimmed_and_nonempty(raw in arb_raw_message()) {
        if let Some(utterance) = normalize(&raw) {
            prop_assert!(!utterance.content.is_empty());
            prop_assert_eq!(utterance.content.trim(), utterance.content.as_str());
        }
    }

    /// A finished state terminates regardless of message content.
    #[test]
    fn finished_state_always_routes_terminal(messages in vec(arb_raw_message(), 0..5)) {
        let state = ConversationState { messages, query: vec![], finished: true };
        prop_assert_eq!(route(&state), NextNode::Terminal);
    }

    /// An unfinished state whose last message carries a tool call always
    /// routes to the tool executor.
    #[test]
    fn trailing_tool_call_always_routes_to_tools(
        mut messages in vec(arb_raw_message(), 0..4),
        call in arb_tool_call(),
    ) {
        messages.push(RawMessage::Record(ChatMessage {
            role: Role::Assistant,
            content: String::new(),
            tool_calls: vec![call],
        }));
        let state = ConversationState { messages, query: vec![], finished: false };
        prop_assert_eq!(route(&state), NextNode::Tools);
    }

    /// Plain trailing content waits for the human.
    #[test]
    fn trailing_plain_content_routes_to_human(
        mut messages in vec(arb_raw_message(), 0..4),
        content in "[a-zA-Z0-9 ]{1,60}",
    ) {
        messages.push(RawMessage::assistant(content));
        let state = ConversationState { messages, query: vec![], finished: false };
        prop_assert_eq!(route(&state), NextNode::Human);
    }
}

//! Message normalization
//!
//! Conversation messages arrive in several incompatible wire shapes: the
//! canonical tagged record, a model-response object, or a bare (role, content)
//! pair. Everything downstream works against the normalized form produced
//! here; unrecognized shapes are dropped, never escalated.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Maximum characters of tool output surfaced when re-tagging a tool-role
/// message as assistant content.
pub const TOOL_CONTENT_LIMIT: usize = 120;

/// Role carried by a canonical message record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Role {
    User,
    Assistant,
    Tool,
    /// Anything else on the wire; normalization drops these
    Unknown,
}

impl From<String> for Role {
    fn from(role: String) -> Self {
        match role.trim().to_ascii_lowercase().as_str() {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            "tool" => Role::Tool,
            _ => Role::Unknown,
        }
    }
}

/// Role visible to external consumers after normalization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeakerRole {
    User,
    Assistant,
}

/// A tool invocation requested by the reasoner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl ToolCallRequest {
    pub fn new(name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

/// Legacy single-call side-channel some providers still emit instead of a
/// tool-call list. `arguments` is a JSON-encoded object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyFunctionCall {
    pub name: String,
    pub arguments: String,
}

/// Canonical tagged message record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
}

/// Assistant-shaped response object as produced by a reasoning collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<LegacyFunctionCall>,
}

impl ModelResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: vec![],
            function_call: None,
        }
    }

    pub fn with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            content: content.into(),
            tool_calls,
            function_call: None,
        }
    }
}

/// One raw conversation message in any of the supported wire shapes.
///
/// Untagged: a record is recognized by its `role` field, a response object by
/// `content` without `role`, and a pair by being a two-element array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawMessage {
    Record(ChatMessage),
    Response(ModelResponse),
    Pair(String, String),
}

impl RawMessage {
    pub fn user(content: impl Into<String>) -> Self {
        RawMessage::Record(ChatMessage {
            role: Role::User,
            content: content.into(),
            tool_calls: vec![],
        })
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        RawMessage::Record(ChatMessage {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: vec![],
        })
    }
}

/// A normalized message: recognized role, non-empty trimmed content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub role: SpeakerRole,
    pub content: String,
}

/// Truncate to at most `max` characters, appending an ellipsis marker when
/// truncation occurred. Counts chars, not bytes, so multibyte content is safe.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let truncated: String = s.chars().take(max).collect();
    format!("{truncated}…")
}

/// Normalize one raw message to `(role, content)` with role in
/// {user, assistant}, or nothing.
///
/// Tool-role records are re-tagged as assistant with truncated content.
/// Unrecognized roles and content that is empty after trimming are dropped.
pub fn normalize(raw: &RawMessage) -> Option<Utterance> {
    let (role, content) = match raw {
        RawMessage::Record(record) => match record.role {
            Role::User => (SpeakerRole::User, record.content.clone()),
            Role::Assistant => (SpeakerRole::Assistant, record.content.clone()),
            Role::Tool => (
                SpeakerRole::Assistant,
                truncate_chars(&record.content, TOOL_CONTENT_LIMIT),
            ),
            Role::Unknown => return None,
        },
        RawMessage::Response(response) => (SpeakerRole::Assistant, response.content.clone()),
        RawMessage::Pair(role, content) => {
            let role = match role.trim().to_ascii_lowercase().as_str() {
                "user" => SpeakerRole::User,
                "assistant" => SpeakerRole::Assistant,
                _ => return None,
            };
            (role, content.clone())
        }
    };

    let content = content.trim();
    if content.is_empty() {
        return None;
    }
    Some(Utterance {
        role,
        content: content.to_string(),
    })
}

/// Normalize an ordered sequence of raw messages, concatenating results in
/// source order. Duplicates are kept — deduplication happens in the stream
/// consumer, not here.
pub fn normalize_all<'a>(raw: impl IntoIterator<Item = &'a RawMessage>) -> Vec<Utterance> {
    raw.into_iter().filter_map(normalize).collect()
}

/// Extract tool-call requests from a raw message.
///
/// This is the single detector shared by the routing predicate and the tool
/// executor node. Canonical-record detection takes precedence over response
/// object attributes; the legacy function-call side-channel is consulted last,
/// and an unparseable argument payload drops the call silently.
pub fn tool_requests(raw: &RawMessage) -> Vec<ToolCallRequest> {
    match raw {
        RawMessage::Record(record) => record.tool_calls.clone(),
        RawMessage::Response(response) => {
            if !response.tool_calls.is_empty() {
                return response.tool_calls.clone();
            }
            if let Some(call) = &response.function_call {
                if let Ok(args) = serde_json::from_str::<Map<String, Value>>(&call.arguments) {
                    return vec![ToolCallRequest::new(call.name.clone(), args)];
                }
            }
            vec![]
        }
        RawMessage::Pair(..) => vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_canonical_record() {
        let raw = RawMessage::user("  hello  ");
        let utterance = normalize(&raw).unwrap();
        assert_eq!(utterance.role, SpeakerRole::User);
        assert_eq!(utterance.content, "hello");
    }

    #[test]
    fn normalizes_response_object_as_assistant() {
        let raw = RawMessage::Response(ModelResponse::text("here are some phones"));
        let utterance = normalize(&raw).unwrap();
        assert_eq!(utterance.role, SpeakerRole::Assistant);
    }

    #[test]
    fn normalizes_pair_case_insensitively() {
        let raw = RawMessage::Pair("User".to_string(), "hi".to_string());
        assert_eq!(normalize(&raw).unwrap().role, SpeakerRole::User);
    }

    #[test]
    fn retags_tool_role_as_assistant_with_truncation() {
        let long = "x".repeat(200);
        let raw = RawMessage::Record(ChatMessage {
            role: Role::Tool,
            content: long,
            tool_calls: vec![],
        });
        let utterance = normalize(&raw).unwrap();
        assert_eq!(utterance.role, SpeakerRole::Assistant);
        assert_eq!(utterance.content.chars().count(), TOOL_CONTENT_LIMIT + 1);
        assert!(utterance.content.ends_with('…'));
    }

    #[test]
    fn short_tool_content_is_not_truncated() {
        let raw = RawMessage::Record(ChatMessage {
            role: Role::Tool,
            content: "3 results".to_string(),
            tool_calls: vec![],
        });
        assert_eq!(normalize(&raw).unwrap().content, "3 results");
    }

    #[test]
    fn drops_unknown_roles_and_empty_content() {
        let unknown: RawMessage = serde_json::from_value(json!({
            "role": "system",
            "content": "preamble"
        }))
        .unwrap();
        assert_eq!(normalize(&unknown), None);

        assert_eq!(normalize(&RawMessage::user("   ")), None);
        assert_eq!(
            normalize(&RawMessage::Pair("narrator".to_string(), "hm".to_string())),
            None
        );
    }

    #[test]
    fn wire_shapes_deserialize_to_expected_variants() {
        let record: RawMessage =
            serde_json::from_value(json!({"role": "user", "content": "hi"})).unwrap();
        assert!(matches!(record, RawMessage::Record(_)));

        let response: RawMessage =
            serde_json::from_value(json!({"content": "hello there"})).unwrap();
        assert!(matches!(response, RawMessage::Response(_)));

        let pair: RawMessage = serde_json::from_value(json!(["assistant", "hi"])).unwrap();
        assert!(matches!(pair, RawMessage::Pair(..)));
    }

    #[test]
    fn extracts_tool_calls_from_canonical_record() {
        let raw = RawMessage::Record(ChatMessage {
            role: Role::Assistant,
            content: String::new(),
            tool_calls: vec![ToolCallRequest::new("product_search", Map::new())],
        });
        let calls = tool_requests(&raw);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "product_search");
    }

    #[test]
    fn canonical_detection_takes_precedence_over_side_channel() {
        // A record shape never consults the legacy side-channel.
        let raw = RawMessage::Response(ModelResponse {
            content: String::new(),
            tool_calls: vec![ToolCallRequest::new("from_list", Map::new())],
            function_call: Some(LegacyFunctionCall {
                name: "from_legacy".to_string(),
                arguments: "{}".to_string(),
            }),
        });
        let calls = tool_requests(&raw);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "from_list");
    }

    #[test]
    fn extracts_legacy_function_call() {
        let raw = RawMessage::Response(ModelResponse {
            content: String::new(),
            tool_calls: vec![],
            function_call: Some(LegacyFunctionCall {
                name: "product_search".to_string(),
                arguments: r#"{"keyword": "phone"}"#.to_string(),
            }),
        });
        let calls = tool_requests(&raw);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].args["keyword"], json!("phone"));
    }

    #[test]
    fn unparseable_legacy_arguments_drop_the_call() {
        let raw = RawMessage::Response(ModelResponse {
            content: String::new(),
            tool_calls: vec![],
            function_call: Some(LegacyFunctionCall {
                name: "product_search".to_string(),
                arguments: "not json".to_string(),
            }),
        });
        assert!(tool_requests(&raw).is_empty());
    }

    #[test]
    fn batch_normalization_keeps_order_and_duplicates() {
        let raws = vec![
            RawMessage::user("first"),
            RawMessage::assistant("second"),
            RawMessage::assistant("second"),
        ];
        let utterances = normalize_all(&raws);
        assert_eq!(
            utterances.iter().map(|u| u.content.as_str()).collect::<Vec<_>>(),
            vec!["first", "second", "second"]
        );
    }
}

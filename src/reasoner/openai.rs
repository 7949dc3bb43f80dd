//! OpenAI-compatible chat-completions provider
//!
//! Works against any endpoint speaking the chat-completions protocol
//! (OpenRouter, vLLM, OpenAI itself). Tool calls arrive either as the
//! modern `tool_calls` list or the legacy `function_call` side-channel;
//! the latter is passed through untouched for the shared extractor.

use super::{Reasoner, ReasonerError, ReasonerRequest};
use crate::message::{LegacyFunctionCall, ModelResponse, SpeakerRole, ToolCallRequest};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Chat-completions client for an OpenAI-compatible endpoint
pub struct OpenAiCompatReasoner {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl OpenAiCompatReasoner {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_key,
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn translate_request(&self, request: &ReasonerRequest) -> WireRequest {
        let mut messages = vec![WireMessage {
            role: "system".to_string(),
            content: Some(request.system.clone()),
        }];
        messages.extend(request.messages.iter().map(|m| WireMessage {
            role: match m.role {
                SpeakerRole::User => "user".to_string(),
                SpeakerRole::Assistant => "assistant".to_string(),
            },
            content: Some(m.content.clone()),
        }));

        let tools: Vec<WireTool> = request
            .tools
            .iter()
            .map(|t| WireTool {
                r#type: "function".to_string(),
                function: WireFunctionDef {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.input_schema.clone(),
                },
            })
            .collect();

        WireRequest {
            model: self.model.clone(),
            messages,
            tools: if tools.is_empty() { None } else { Some(tools) },
        }
    }

    fn classify_error(&self, status: reqwest::StatusCode, body: &str) -> ReasonerError {
        match status.as_u16() {
            401 | 403 => ReasonerError::auth(format!("Authentication failed: {body}")),
            429 => ReasonerError::rate_limit(format!("Rate limited: {body}")),
            400 => ReasonerError::invalid_request(format!("Invalid request: {body}")),
            500..=599 => ReasonerError::server_error(format!("Server error: {body}")),
            _ => ReasonerError::unknown(format!("HTTP {status}: {body}")),
        }
    }
}

#[async_trait]
impl Reasoner for OpenAiCompatReasoner {
    async fn respond(&self, request: &ReasonerRequest) -> Result<ModelResponse, ReasonerError> {
        let Some(api_key) = &self.api_key else {
            return Err(ReasonerError::auth(
                "No API key configured. Set SHOPGRAPH_API_KEY or OPENROUTER_API_KEY.",
            ));
        };

        let wire_request = self.translate_request(request);

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&wire_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ReasonerError::network(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    ReasonerError::network(format!("Connection failed: {e}"))
                } else {
                    ReasonerError::unknown(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ReasonerError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(self.classify_error(status, &body));
        }

        let wire_response: WireResponse = serde_json::from_str(&body).map_err(|e| {
            ReasonerError::unknown(format!("Failed to parse response: {e} - body: {body}"))
        })?;

        normalize_response(wire_response)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Convert the wire response into the provider-neutral shape.
///
/// Tool-call arguments arrive as JSON-encoded strings; calls whose payloads
/// do not parse as an object are dropped with a warning. The legacy
/// `function_call` side-channel is carried verbatim.
fn normalize_response(response: WireResponse) -> Result<ModelResponse, ReasonerError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ReasonerError::invalid_request("Response carried no choices"))?;

    let message = choice.message;
    let tool_calls: Vec<ToolCallRequest> = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .filter_map(|call| {
            match serde_json::from_str::<Map<String, Value>>(&call.function.arguments) {
                Ok(args) => Some(ToolCallRequest::new(call.function.name, args)),
                Err(e) => {
                    tracing::warn!(
                        tool = %call.function.name,
                        error = %e,
                        "Dropping tool call with unparseable arguments"
                    );
                    None
                }
            }
        })
        .collect();

    let function_call = message.function_call.map(|f| LegacyFunctionCall {
        name: f.name,
        arguments: f.arguments,
    });

    Ok(ModelResponse {
        content: message.content.unwrap_or_default(),
        tool_calls,
        function_call,
    })
}

// Chat-completions wire types

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct WireTool {
    r#type: String,
    function: WireFunctionDef,
}

#[derive(Debug, Serialize)]
struct WireFunctionDef {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
}

#[derive(Debug, Deserialize)]
struct WireResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
    function_call: Option<WireFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    function: WireFunctionCall,
}

#[derive(Debug, Deserialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> WireResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn parses_plain_text_response() {
        let wire = parse(json!({
            "choices": [{"message": {"content": "Here are three options."}}]
        }));
        let response = normalize_response(wire).unwrap();
        assert_eq!(response.content, "Here are three options.");
        assert!(response.tool_calls.is_empty());
        assert!(response.function_call.is_none());
    }

    #[test]
    fn parses_tool_calls_with_encoded_arguments() {
        let wire = parse(json!({
            "choices": [{"message": {
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": "product_search", "arguments": "{\"keyword\": \"phone\"}"}
                }]
            }}]
        }));
        let response = normalize_response(wire).unwrap();
        assert_eq!(response.content, "");
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].name, "product_search");
        assert_eq!(response.tool_calls[0].args["keyword"], json!("phone"));
    }

    #[test]
    fn unparseable_tool_call_arguments_are_dropped() {
        let wire = parse(json!({
            "choices": [{"message": {
                "content": "partial",
                "tool_calls": [{
                    "function": {"name": "product_search", "arguments": "oops"}
                }]
            }}]
        }));
        let response = normalize_response(wire).unwrap();
        assert!(response.tool_calls.is_empty());
    }

    #[test]
    fn legacy_function_call_passes_through_unparsed() {
        let wire = parse(json!({
            "choices": [{"message": {
                "content": "",
                "function_call": {"name": "product_search", "arguments": "{\"keyword\": \"tv\"}"}
            }}]
        }));
        let response = normalize_response(wire).unwrap();
        let legacy = response.function_call.unwrap();
        assert_eq!(legacy.name, "product_search");
        assert_eq!(legacy.arguments, "{\"keyword\": \"tv\"}");
    }

    #[test]
    fn empty_choices_is_an_error() {
        let wire = parse(json!({"choices": []}));
        assert!(normalize_response(wire).is_err());
    }

    #[test]
    fn request_serializes_function_schema() {
        let reasoner = OpenAiCompatReasoner::new("https://example.test/v1", "test-model", None);
        let request = ReasonerRequest {
            system: "preamble".to_string(),
            messages: vec![],
            tools: vec![crate::reasoner::ToolDefinition {
                name: "product_search".to_string(),
                description: "search".to_string(),
                input_schema: json!({"type": "object"}),
            }],
        };
        let wire = reasoner.translate_request(&request);
        let value = serde_json::to_value(&wire).unwrap();
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["tools"][0]["type"], "function");
        assert_eq!(value["tools"][0]["function"]["name"], "product_search");
    }
}

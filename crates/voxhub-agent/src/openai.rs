//! Chat model over an OpenAI-compatible `POST {base}/chat/completions`.
//!
//! Wire types mirror the OpenAI API; tool call arguments travel as JSON
//! strings and are parsed into values at this boundary.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use voxhub_core::{
    ChatMessage, ChatModel, ChatReply, ChatRequest, ChatRole, ProviderError, ProviderSettings,
    ToolCall, ToolSpec,
};

const PROVIDER: &str = "llm";

#[derive(Debug, Clone)]
pub struct OpenAiChatConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
}

impl OpenAiChatConfig {
    #[must_use]
    pub fn from_settings(settings: &ProviderSettings) -> Self {
        Self {
            base_url: settings.llm_base_url.clone(),
            api_key: settings.api_key.clone(),
            model: settings.llm_model.clone(),
            timeout: Duration::from_secs(120),
        }
    }
}

// ── Wire types ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolDefinition<'a>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: ChatRole,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ToolDefinition<'a> {
    r#type: &'static str,
    function: FunctionDefinition<'a>,
}

#[derive(Debug, Serialize)]
struct FunctionDefinition<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(default = "function_type")]
    r#type: String,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    /// JSON string of arguments.
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: WireMessage,
}

fn function_type() -> String {
    "function".to_string()
}

// ── Mapping ─────────────────────────────────────────────────────────────────

impl From<&ChatMessage> for WireMessage {
    fn from(message: &ChatMessage) -> Self {
        let tool_calls = (!message.tool_calls.is_empty()).then(|| {
            message
                .tool_calls
                .iter()
                .map(|call| WireToolCall {
                    id: call.id.clone(),
                    r#type: function_type(),
                    function: WireFunctionCall {
                        name: call.name.clone(),
                        arguments: call.arguments.to_string(),
                    },
                })
                .collect()
        });
        Self {
            role: message.role,
            content: message.content.clone(),
            tool_calls,
            tool_call_id: message.tool_call_id.clone(),
        }
    }
}

impl<'a> From<&'a ToolSpec> for ToolDefinition<'a> {
    fn from(spec: &'a ToolSpec) -> Self {
        Self {
            r#type: "function",
            function: FunctionDefinition {
                name: &spec.name,
                description: &spec.description,
                parameters: &spec.input_schema,
            },
        }
    }
}

fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(serde_json::Map::new());
    }
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Tool arguments are not valid JSON, passing as string");
        Value::String(raw.to_string())
    })
}

fn into_reply(message: WireMessage) -> ChatReply {
    let calls: Vec<ToolCall> = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| ToolCall {
            id: call.id,
            arguments: parse_arguments(&call.function.arguments),
            name: call.function.name,
        })
        .collect();

    if calls.is_empty() {
        ChatReply::Text(message.content.unwrap_or_default())
    } else {
        ChatReply::ToolCalls {
            content: message.content.filter(|c| !c.is_empty()),
            calls,
        }
    }
}

// ── Client ──────────────────────────────────────────────────────────────────

pub struct OpenAiChat {
    client: reqwest::Client,
    config: OpenAiChatConfig,
}

impl OpenAiChat {
    pub fn new(config: OpenAiChatConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::request(PROVIDER, e))?;
        Ok(Self { client, config })
    }

    fn url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(&self, request: ChatRequest) -> Result<ChatReply, ProviderError> {
        let body = CompletionRequest {
            model: request.model.as_deref().unwrap_or(&self.config.model),
            messages: request.messages.iter().map(WireMessage::from).collect(),
            tools: request.tools.iter().map(ToolDefinition::from).collect(),
        };

        let mut http = self.client.post(self.url()).json(&body);
        if let Some(key) = &self.config.api_key {
            http = http.bearer_auth(key);
        }

        let response = http
            .send()
            .await
            .map_err(|e| ProviderError::request(PROVIDER, e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                provider: PROVIDER.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::decode(PROVIDER, e))?;
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::decode(PROVIDER, "response has no choices"))?;

        Ok(into_reply(choice.message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serializes_tools_and_history() {
        let spec = ToolSpec::without_arguments("exit_intent", "Stop talking");
        let messages = [
            ChatMessage::system("Be brief."),
            ChatMessage::assistant_tool_calls(
                None,
                vec![ToolCall {
                    id: "c1".into(),
                    name: "exit_intent".into(),
                    arguments: json!({}),
                }],
            ),
            ChatMessage::tool_result("c1", "Goodbye"),
        ];
        let body = CompletionRequest {
            model: "gpt-4o-mini",
            messages: messages.iter().map(WireMessage::from).collect(),
            tools: vec![ToolDefinition::from(&spec)],
        };

        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["tools"][0]["type"], "function");
        assert_eq!(value["tools"][0]["function"]["name"], "exit_intent");
        assert_eq!(value["messages"][1]["tool_calls"][0]["function"]["arguments"], "{}");
        assert_eq!(value["messages"][2]["role"], "tool");
        assert_eq!(value["messages"][2]["tool_call_id"], "c1");
        assert!(value["messages"][0].get("tool_calls").is_none());
    }

    #[test]
    fn response_with_tool_calls_parses_arguments() {
        let response: CompletionResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "self.audio_speaker.set_volume", "arguments": "{\"volume\":30}"}
                    }]
                }
            }]
        }))
        .unwrap();

        let reply = into_reply(response.choices.into_iter().next().unwrap().message);
        match reply {
            ChatReply::ToolCalls { content, calls } => {
                assert!(content.is_none());
                assert_eq!(calls[0].arguments, json!({"volume": 30}));
            }
            ChatReply::Text(_) => panic!("expected tool calls"),
        }
    }

    #[test]
    fn plain_text_response() {
        let response: CompletionResponse = serde_json::from_value(json!({
            "choices": [{"message": {"role": "assistant", "content": "Hello there.\nHow can I help?"}}]
        }))
        .unwrap();
        let reply = into_reply(response.choices.into_iter().next().unwrap().message);
        assert_eq!(reply, ChatReply::Text("Hello there.\nHow can I help?".into()));
    }

    #[test]
    fn blank_arguments_become_empty_object() {
        assert_eq!(parse_arguments(""), json!({}));
        assert_eq!(parse_arguments("not json"), json!("not json"));
    }
}

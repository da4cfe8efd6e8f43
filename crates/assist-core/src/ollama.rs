//! Ollama chat client

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::chat::{CompletionRequest, CompletionResponse, Role, ToolCall, ToolDescriptor};
use crate::completion::{http_client, CompletionService};
use crate::error::{AgentError, AgentResult};

/// Ollama `/api/chat` client
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> AgentResult<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: http_client(timeout_secs)?,
        })
    }

    /// Check if Ollama is running
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);

        match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn translate_request(request: &CompletionRequest) -> ChatRequest {
        let mut messages = Vec::with_capacity(request.transcript.len() + request.exchanges.len() * 2 + 1);

        if !request.system.is_empty() {
            messages.push(ChatMessage::plain("system", &request.system));
        }

        for turn in &request.transcript {
            let role = match turn.role {
                Role::User => "user",
                Role::Agent => "assistant",
            };
            messages.push(ChatMessage::plain(role, &turn.text));
        }

        for exchange in &request.exchanges {
            messages.push(ChatMessage {
                role: "assistant".to_string(),
                content: String::new(),
                tool_calls: vec![OllamaToolCall {
                    function: OllamaFunctionCall {
                        name: exchange.call.name.clone(),
                        arguments: serde_json::json!({ "input": exchange.call.input }),
                    },
                }],
            });
            messages.push(ChatMessage::plain("tool", &exchange.output));
        }

        let tools = request
            .tools
            .iter()
            .map(|t| OllamaToolDefinition {
                tool_type: "function".to_string(),
                function: OllamaFunctionDefinition {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters_schema(),
                },
            })
            .collect();

        ChatRequest {
            model: request.model.clone(),
            messages,
            tools,
            stream: false,
            options: ChatOptions {
                temperature: request.temperature,
            },
        }
    }

    fn normalize_response(resp: ChatResponse, tools: &[ToolDescriptor]) -> AgentResult<CompletionResponse> {
        let message = resp
            .message
            .ok_or_else(|| AgentError::malformed("Response has no message"))?;

        // Native tool calls first, then JSON embedded in the content
        let tool_call = message
            .tool_calls
            .into_iter()
            .next()
            .map(|c| ToolCall::from_json_args(c.function.name, &c.function.arguments))
            .or_else(|| parse_json_tool_call(&message.content, tools));

        if tool_call.is_some() {
            return Ok(CompletionResponse {
                text: String::new(),
                tool_call,
            });
        }

        let text = message.content.trim().to_string();
        if text.is_empty() {
            return Err(AgentError::malformed("Response contained no text"));
        }

        Ok(CompletionResponse::text(text))
    }
}

#[async_trait]
impl CompletionService for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    #[instrument(skip(self, request), fields(model = %request.model, turns = request.transcript.len()))]
    async fn complete(&self, request: &CompletionRequest) -> AgentResult<CompletionResponse> {
        let url = format!("{}/api/chat", self.base_url);
        let body = Self::translate_request(request);

        let response = self.client.post(&url).json(&body).send().await?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AgentError::network(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            let message = serde_json::from_str::<OllamaErrorResponse>(&text)
                .map(|e| e.error)
                .unwrap_or(text);
            return Err(AgentError::from_status(status.as_u16(), message));
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| AgentError::malformed(format!("Failed to parse response: {}", e)))?;

        debug!(
            prompt_tokens = parsed.prompt_eval_count,
            completion_tokens = parsed.eval_count,
            "Ollama usage"
        );

        Self::normalize_response(parsed, &request.tools)
    }
}

/// Parse a JSON tool call from content text
///
/// Many models write the call into the content instead of using native
/// `tool_calls`. Supports raw JSON, fenced code blocks, and an object
/// embedded in surrounding prose. Only names in `tools` count, so JSON that
/// merely has a `name` field stays part of the reply.
fn parse_json_tool_call(content: &str, tools: &[ToolDescriptor]) -> Option<ToolCall> {
    let content = content.trim();
    if content.is_empty() {
        return None;
    }

    let json_content = extract_json_from_markdown(content).unwrap_or(content);

    try_parse_single_tool_call(json_content, tools).or_else(|| extract_json_object(content, tools))
}

/// Extract JSON content from markdown code blocks
fn extract_json_from_markdown(content: &str) -> Option<&str> {
    let patterns = ["```json\n", "```JSON\n", "```\n"];

    for pattern in patterns {
        if let Some(start) = content.find(pattern) {
            let json_start = start + pattern.len();
            if let Some(end) = content[json_start..].find("```") {
                return Some(content[json_start..json_start + end].trim());
            }
        }
    }

    None
}

fn try_parse_single_tool_call(content: &str, tools: &[ToolDescriptor]) -> Option<ToolCall> {
    #[derive(Deserialize)]
    struct ToolCallJson {
        name: String,
        #[serde(default)]
        arguments: serde_json::Value,
    }

    let parsed: ToolCallJson = serde_json::from_str(content).ok()?;

    if !tools.iter().any(|t| t.name == parsed.name) {
        return None;
    }

    Some(ToolCall::from_json_args(parsed.name, &parsed.arguments))
}

/// Find the first balanced `{...}` in prose that parses as a tool call
fn extract_json_object(content: &str, tools: &[ToolDescriptor]) -> Option<ToolCall> {
    let mut depth = 0usize;
    let mut start = None;

    for (i, c) in content.char_indices() {
        match c {
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        if let Some(call) = try_parse_single_tool_call(&content[s..=i], tools) {
                            return Some(call);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    None
}

// Ollama API types

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OllamaToolDefinition>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<OllamaToolCall>,
}

impl ChatMessage {
    fn plain(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
            tool_calls: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaToolCall {
    function: OllamaFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaFunctionCall {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct OllamaToolDefinition {
    #[serde(rename = "type")]
    tool_type: String,
    function: OllamaFunctionDefinition,
}

#[derive(Debug, Serialize)]
struct OllamaFunctionDefinition {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ChatMessage>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct OllamaErrorResponse {
    error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{ToolDescriptor, ToolExchange, Turn};
    use serde_json::json;

    fn tools() -> Vec<ToolDescriptor> {
        ["get_current_time", "say_hello"]
            .into_iter()
            .map(|name| ToolDescriptor {
                name: name.into(),
                description: String::new(),
            })
            .collect()
    }

    fn response(message: serde_json::Value) -> ChatResponse {
        serde_json::from_value(json!({ "message": message, "done": true })).unwrap()
    }

    #[test]
    fn test_translate_request_roles() {
        let request = CompletionRequest {
            model: "llama3.2".into(),
            temperature: 0.2,
            system: "sys".into(),
            tools: vec![ToolDescriptor {
                name: "get_current_time".into(),
                description: "Returns the current date and time.".into(),
            }],
            transcript: vec![Turn::user("what time is it"), Turn::agent("Let me check.")],
            exchanges: vec![ToolExchange {
                call: ToolCall::new("get_current_time", ""),
                output: "2024-01-01 12:00:00".into(),
            }],
        };

        let body = serde_json::to_value(OllamaClient::translate_request(&request)).unwrap();
        let roles: Vec<&str> = body["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, ["system", "user", "assistant", "assistant", "tool"]);
        assert_eq!(body["messages"][3]["tool_calls"][0]["function"]["name"], "get_current_time");
        assert_eq!(body["stream"], false);
        assert_eq!(body["tools"][0]["type"], "function");
    }

    #[test]
    fn test_native_tool_call() {
        let resp = response(json!({
            "role": "assistant",
            "content": "",
            "tool_calls": [{"function": {"name": "say_hello", "arguments": {"input": "Aya"}}}]
        }));
        let out = OllamaClient::normalize_response(resp, &tools()).unwrap();
        assert_eq!(out.tool_call, Some(ToolCall::new("say_hello", "Aya")));
    }

    #[test]
    fn test_plain_reply() {
        let resp = response(json!({"role": "assistant", "content": " Hi there! "}));
        let out = OllamaClient::normalize_response(resp, &tools()).unwrap();
        assert_eq!(out, CompletionResponse::text("Hi there!"));
    }

    #[test]
    fn test_empty_reply_is_malformed() {
        let resp = response(json!({"role": "assistant", "content": "  "}));
        assert!(OllamaClient::normalize_response(resp, &tools()).is_err());
    }

    #[test]
    fn test_parse_json_tool_call_raw() {
        let call = parse_json_tool_call(r#"{"name": "say_hello", "arguments": {"input": "Aya"}}"#, &tools()).unwrap();
        assert_eq!(call, ToolCall::new("say_hello", "Aya"));
    }

    #[test]
    fn test_parse_json_tool_call_markdown() {
        let content = "```json\n{\"name\": \"get_current_time\", \"arguments\": {}}\n```";
        let call = parse_json_tool_call(content, &tools()).unwrap();
        assert_eq!(call.name, "get_current_time");
    }

    #[test]
    fn test_parse_json_tool_call_with_text() {
        let content = r#"Sure, let me greet you.
{"name": "say_hello", "arguments": {"name": "Aya"}}
One moment."#;
        let call = parse_json_tool_call(content, &tools()).unwrap();
        assert_eq!(call, ToolCall::new("say_hello", "Aya"));
    }

    #[test]
    fn test_parse_json_tool_call_no_match() {
        assert!(parse_json_tool_call("Just a regular reply.", &tools()).is_none());
        assert!(parse_json_tool_call(r#"{"answer": 42}"#, &tools()).is_none());
        assert!(parse_json_tool_call("} stray brace {", &tools()).is_none());
    }

    #[test]
    fn test_json_reply_with_unregistered_name_is_text() {
        let content = r#"Here is the record: {"name": "Aya", "age": 30}"#;
        assert!(parse_json_tool_call(content, &tools()).is_none());

        let resp = response(json!({"role": "assistant", "content": content}));
        let out = OllamaClient::normalize_response(resp, &tools()).unwrap();
        assert_eq!(out, CompletionResponse::text(content));
    }

    #[test]
    fn test_registered_call_found_after_unrelated_object() {
        let content = r#"Record {"name": "Aya"} then {"name": "say_hello", "arguments": {"input": "Aya"}}"#;
        let call = parse_json_tool_call(content, &tools()).unwrap();
        assert_eq!(call, ToolCall::new("say_hello", "Aya"));
        assert!(parse_json_tool_call(content, &[]).is_none());
    }

    #[tokio::test]
    async fn test_health_check_unreachable() {
        let client = OllamaClient::new("http://127.0.0.1:1", 5).unwrap();
        assert!(!client.health_check().await);
    }
}

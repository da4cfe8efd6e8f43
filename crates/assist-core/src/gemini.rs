//! Google Gemini completion client

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::chat::{CompletionRequest, CompletionResponse, Role, ToolCall};
use crate::completion::{http_client, CompletionService};
use crate::error::{AgentError, AgentResult};

/// Gemini `generateContent` client
#[derive(Debug, Clone)]
pub struct GeminiClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout_secs: u64) -> AgentResult<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: http_client(timeout_secs)?,
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }

    fn translate_request(request: &CompletionRequest) -> GeminiRequest {
        let mut contents: Vec<GeminiContent> = request
            .transcript
            .iter()
            .map(|turn| GeminiContent {
                role: Some(
                    match turn.role {
                        Role::User => "user",
                        Role::Agent => "model",
                    }
                    .to_string(),
                ),
                parts: vec![GeminiPart::Text {
                    text: turn.text.clone(),
                }],
            })
            .collect();

        // Tool round-trips of the current turn follow the transcript
        for exchange in &request.exchanges {
            contents.push(GeminiContent {
                role: Some("model".to_string()),
                parts: vec![GeminiPart::FunctionCall {
                    function_call: GeminiFunctionCall {
                        name: exchange.call.name.clone(),
                        args: serde_json::json!({ "input": exchange.call.input }),
                    },
                }],
            });
            contents.push(GeminiContent {
                role: Some("user".to_string()),
                parts: vec![GeminiPart::FunctionResponse {
                    function_response: GeminiFunctionResponse {
                        name: exchange.call.name.clone(),
                        response: serde_json::json!({ "result": exchange.output }),
                    },
                }],
            });
        }

        let system_instruction = if request.system.is_empty() {
            None
        } else {
            Some(GeminiContent {
                role: None,
                parts: vec![GeminiPart::Text {
                    text: request.system.clone(),
                }],
            })
        };

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(vec![GeminiTool {
                function_declarations: request
                    .tools
                    .iter()
                    .map(|t| GeminiFunctionDeclaration {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.parameters_schema(),
                    })
                    .collect(),
            }])
        };

        GeminiRequest {
            contents,
            system_instruction,
            tools,
            generation_config: GeminiGenerationConfig {
                temperature: request.temperature,
            },
        }
    }

    fn normalize_response(resp: GeminiResponse) -> AgentResult<CompletionResponse> {
        let candidate = resp
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::malformed("No candidates in response"))?;

        let parts = match candidate.content {
            Some(content) => content.parts,
            None => {
                return Err(AgentError::malformed(format!(
                    "Empty candidate (finish reason: {})",
                    candidate.finish_reason.as_deref().unwrap_or("unknown")
                )))
            }
        };

        let mut text = String::new();
        let mut tool_call = None;

        for part in parts {
            match part {
                GeminiPart::Text { text: t } => text.push_str(&t),
                GeminiPart::FunctionCall { function_call } => {
                    // One directive per round; later ones are re-requested
                    if tool_call.is_none() {
                        tool_call = Some(ToolCall::from_json_args(function_call.name, &function_call.args));
                    }
                }
                GeminiPart::FunctionResponse { .. } => {}
            }
        }

        if text.trim().is_empty() && tool_call.is_none() {
            return Err(AgentError::malformed("Response contained no text"));
        }

        Ok(CompletionResponse {
            text: text.trim().to_string(),
            tool_call,
        })
    }
}

#[async_trait]
impl CompletionService for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    #[instrument(skip(self, request), fields(model = %request.model, turns = request.transcript.len()))]
    async fn complete(&self, request: &CompletionRequest) -> AgentResult<CompletionResponse> {
        let body = Self::translate_request(request);

        let response = self
            .client
            .post(self.endpoint(&request.model))
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AgentError::network(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            let message = serde_json::from_str::<GeminiErrorResponse>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            return Err(AgentError::from_status(status.as_u16(), message));
        }

        let parsed: GeminiResponse = serde_json::from_str(&text)
            .map_err(|e| AgentError::malformed(format!("Failed to parse response: {}", e)))?;

        if let Some(usage) = &parsed.usage_metadata {
            debug!(
                prompt_tokens = usage.prompt_token_count,
                completion_tokens = usage.candidates_token_count,
                "Gemini usage"
            );
        }

        Self::normalize_response(parsed)
    }
}

// Gemini API types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GeminiTool>>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: GeminiFunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: GeminiFunctionResponse,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionCall {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionResponse {
    name: String,
    response: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    function_declarations: Vec<GeminiFunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct GeminiFunctionDeclaration {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: GeminiError,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{ToolDescriptor, ToolExchange, Turn};
    use crate::error::RemoteErrorKind;
    use serde_json::json;

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "gemini-1.5-flash".into(),
            temperature: 0.2,
            system: "Be nice.".into(),
            tools: vec![ToolDescriptor {
                name: "say_hello".into(),
                description: "Greets the user by name.".into(),
            }],
            transcript: vec![Turn::user("hello aya"), Turn::agent("Hi!"), Turn::user("greet me")],
            exchanges: vec![ToolExchange {
                call: ToolCall::new("say_hello", "Aya"),
                output: "Hello, Aya! How can I help you today?".into(),
            }],
        }
    }

    #[test]
    fn test_translate_request_shape() {
        let body = serde_json::to_value(GeminiClient::translate_request(&request())).unwrap();

        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 5);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[1]["parts"][0]["text"], "Hi!");
        assert_eq!(contents[3]["parts"][0]["functionCall"]["name"], "say_hello");
        assert_eq!(contents[3]["parts"][0]["functionCall"]["args"]["input"], "Aya");
        assert_eq!(
            contents[4]["parts"][0]["functionResponse"]["response"]["result"],
            "Hello, Aya! How can I help you today?"
        );

        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Be nice.");
        assert!(body["systemInstruction"].get("role").is_none());
        assert_eq!(body["tools"][0]["functionDeclarations"][0]["name"], "say_hello");
        assert!((body["generationConfig"]["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_translate_request_without_tools() {
        let mut req = request();
        req.tools.clear();
        req.system.clear();
        let body = serde_json::to_value(GeminiClient::translate_request(&req)).unwrap();
        assert!(body.get("tools").is_none());
        assert!(body.get("systemInstruction").is_none());
    }

    #[test]
    fn test_normalize_text_response() {
        let raw = json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "It is noon. "}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 4}
        });
        let parsed: GeminiResponse = serde_json::from_value(raw).unwrap();
        let resp = GeminiClient::normalize_response(parsed).unwrap();
        assert_eq!(resp, CompletionResponse::text("It is noon."));
    }

    #[test]
    fn test_normalize_function_call() {
        let raw = json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"functionCall": {"name": "get_current_time", "args": {}}}
                ]}
            }]
        });
        let parsed: GeminiResponse = serde_json::from_value(raw).unwrap();
        let resp = GeminiClient::normalize_response(parsed).unwrap();
        assert_eq!(resp.tool_call, Some(ToolCall::new("get_current_time", "")));
    }

    #[test]
    fn test_normalize_rejects_empty() {
        let parsed: GeminiResponse = serde_json::from_value(json!({"candidates": []})).unwrap();
        assert!(matches!(
            GeminiClient::normalize_response(parsed),
            Err(AgentError::RemoteCall { .. })
        ));

        let blocked: GeminiResponse =
            serde_json::from_value(json!({"candidates": [{"finishReason": "SAFETY"}]})).unwrap();
        let err = GeminiClient::normalize_response(blocked).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_endpoint() {
        let client = GeminiClient::new("https://example.test/", "k", 5).unwrap();
        assert_eq!(
            client.endpoint("gemini-1.5-flash"),
            "https://example.test/v1beta/models/gemini-1.5-flash:generateContent"
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        let client = GeminiClient::new("http://127.0.0.1:1", "test-key", 5).unwrap();
        let err = client.complete(&request()).await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::RemoteCall {
                kind: RemoteErrorKind::Network,
                ..
            }
        ));
    }
}

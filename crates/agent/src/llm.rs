use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::warn;

use rolodex_core::config::LlmConfig;

use crate::conversation::{ToolCall, Turn};
use crate::tools::ToolSpec;

#[derive(Clone, Debug, PartialEq)]
pub enum ModelReply {
    Text(String),
    ToolCalls(Vec<ToolCall>),
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm transport failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("llm returned status {status}: {body}")]
    Api { status: u16, body: String },
    #[error("llm response could not be decoded: {0}")]
    Decode(String),
    #[error("llm returned an empty response")]
    Empty,
}

impl LlmError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Http(error) => error.is_timeout() || error.is_connect(),
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Decode(_) | Self::Empty => false,
        }
    }
}

/// The language-model collaborator: full conversation in, either a direct
/// reply or a list of requested tool invocations out.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        system_directive: &str,
        turns: &[Turn],
        tools: &[ToolSpec],
    ) -> Result<ModelReply, LlmError>;
}

/// Gemini `generateContent` REST client with bounded retries for
/// transient transport failures.
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: SecretString,
    max_retries: u32,
}

impl GeminiClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            max_retries: config.max_retries,
        })
    }

    async fn send(&self, request: &GenerateContentRequest) -> Result<ModelReply, LlmError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status: status.as_u16(), body });
        }

        let payload = response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|error| LlmError::Decode(error.to_string()))?;
        reply_from_response(payload)
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn complete(
        &self,
        system_directive: &str,
        turns: &[Turn],
        tools: &[ToolSpec],
    ) -> Result<ModelReply, LlmError> {
        let request = GenerateContentRequest {
            system_instruction: ContentPayload {
                role: None,
                parts: vec![PartPayload::text(system_directive)],
            },
            contents: contents_from_turns(turns),
            tools: vec![ToolsPayload { function_declarations: declarations_from_specs(tools) }],
        };

        let mut attempt = 0;
        loop {
            match self.send(&request).await {
                Ok(reply) => return Ok(reply),
                Err(error) if error.is_transient() && attempt < self.max_retries => {
                    let delay = backoff(attempt);
                    warn!(
                        attempt,
                        max_retries = self.max_retries,
                        error = %error,
                        "transient llm failure; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

fn backoff(attempt: u32) -> Duration {
    let exponent = attempt.min(8);
    Duration::from_millis(250_u64.saturating_mul(1 << exponent)).min(Duration::from_secs(5))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    system_instruction: ContentPayload,
    contents: Vec<ContentPayload>,
    tools: Vec<ToolsPayload>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ContentPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<PartPayload>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCallPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponsePayload>,
}

impl PartPayload {
    fn text(value: &str) -> Self {
        Self { text: Some(value.to_string()), ..Self::default() }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionCallPayload {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionResponsePayload {
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolsPayload {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters: Value,
}

fn contents_from_turns(turns: &[Turn]) -> Vec<ContentPayload> {
    turns
        .iter()
        .map(|turn| match turn {
            Turn::User { text } => ContentPayload {
                role: Some("user".to_string()),
                parts: vec![PartPayload::text(text)],
            },
            Turn::ModelReply { text } => ContentPayload {
                role: Some("model".to_string()),
                parts: vec![PartPayload::text(text)],
            },
            Turn::ModelToolCalls { calls } => ContentPayload {
                role: Some("model".to_string()),
                parts: calls
                    .iter()
                    .map(|call| PartPayload {
                        function_call: Some(FunctionCallPayload {
                            name: call.name.clone(),
                            args: call.args.clone(),
                        }),
                        ..PartPayload::default()
                    })
                    .collect(),
            },
            Turn::ToolResults { outcomes } => ContentPayload {
                role: Some("tool".to_string()),
                parts: outcomes
                    .iter()
                    .map(|outcome| PartPayload {
                        function_response: Some(FunctionResponsePayload {
                            name: outcome.tool.clone(),
                            response: json!({ "ok": outcome.ok, "result": outcome.message }),
                        }),
                        ..PartPayload::default()
                    })
                    .collect(),
            },
        })
        .collect()
}

fn declarations_from_specs(tools: &[ToolSpec]) -> Vec<FunctionDeclaration> {
    tools
        .iter()
        .map(|spec| FunctionDeclaration {
            name: spec.name.to_string(),
            description: spec.description.to_string(),
            parameters: spec.parameters_schema(),
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ContentPayload>,
}

fn reply_from_response(response: GenerateContentResponse) -> Result<ModelReply, LlmError> {
    let content = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .ok_or(LlmError::Empty)?;

    let mut calls = Vec::new();
    let mut text_parts = Vec::new();
    for part in content.parts {
        if let Some(call) = part.function_call {
            calls.push(ToolCall { name: call.name, args: call.args });
        } else if let Some(text) = part.text {
            text_parts.push(text);
        }
    }

    if !calls.is_empty() {
        return Ok(ModelReply::ToolCalls(calls));
    }

    let text = text_parts.join("");
    if text.is_empty() {
        return Err(LlmError::Empty);
    }
    Ok(ModelReply::Text(text))
}

#[cfg(test)]
mod tests {
    use serde_json::{from_value, json, to_value};

    use crate::conversation::{ToolCall, ToolResultRecord, Turn};

    use super::{
        contents_from_turns, reply_from_response, GenerateContentResponse, LlmError, ModelReply,
    };

    #[test]
    fn turns_map_to_gemini_roles_and_part_kinds() {
        let turns = vec![
            Turn::User { text: "register John".to_string() },
            Turn::ModelToolCalls {
                calls: vec![ToolCall {
                    name: "manage_customer".to_string(),
                    args: json!({"name": "John", "phone": "555-0100"}),
                }],
            },
            Turn::ToolResults {
                outcomes: vec![ToolResultRecord {
                    tool: "manage_customer".to_string(),
                    ok: true,
                    message: "Registered customer `John` (id 1).".to_string(),
                }],
            },
            Turn::ModelReply { text: "Done.".to_string() },
        ];

        let contents = to_value(contents_from_turns(&turns)).expect("serialize contents");

        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[1]["parts"][0]["functionCall"]["name"], "manage_customer");
        assert_eq!(contents[2]["role"], "tool");
        assert_eq!(
            contents[2]["parts"][0]["functionResponse"]["response"]["result"],
            "Registered customer `John` (id 1)."
        );
        assert_eq!(contents[3]["parts"][0]["text"], "Done.");
    }

    #[test]
    fn function_call_parts_decode_to_tool_calls() {
        let response: GenerateContentResponse = from_value(json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{
                        "functionCall": {
                            "name": "set_reminder",
                            "args": {"text": "call back", "due_at": "2026-08-10 09:30"}
                        }
                    }]
                }
            }]
        }))
        .expect("decode response");

        let reply = reply_from_response(response).expect("reply");
        let ModelReply::ToolCalls(calls) = reply else {
            panic!("expected tool calls");
        };
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "set_reminder");
        assert_eq!(calls[0].args["text"], "call back");
    }

    #[test]
    fn text_parts_decode_to_a_direct_reply() {
        let response: GenerateContentResponse = from_value(json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{"text": "John is "}, {"text": "registered."}]
                }
            }]
        }))
        .expect("decode response");

        assert_eq!(
            reply_from_response(response).expect("reply"),
            ModelReply::Text("John is registered.".to_string())
        );
    }

    #[test]
    fn missing_candidates_are_an_empty_reply_error() {
        let response: GenerateContentResponse =
            from_value(json!({"candidates": []})).expect("decode response");
        assert!(matches!(reply_from_response(response), Err(LlmError::Empty)));
    }

    #[test]
    fn only_server_side_failures_are_transient() {
        let server = LlmError::Api { status: 503, body: "overloaded".to_string() };
        let throttled = LlmError::Api { status: 429, body: "slow down".to_string() };
        let client_side = LlmError::Api { status: 400, body: "bad request".to_string() };

        assert!(server.is_transient());
        assert!(throttled.is_transient());
        assert!(!client_side.is_transient());
        assert!(!LlmError::Empty.is_transient());
    }
}

use async_trait::async_trait;
use reqwest::{self, header};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::api::error::ApiError;
use crate::api::provider::{CompletionResponse, Provider};
use crate::conversation::{AssistantContent, Message, MessageData, UserContent};
use datapilot_tools::{ToolCall, ToolSchema};

const PROVIDER_NAME: &str = "openai";
const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const HTTP_TIMEOUT_SECS: u64 = 300;

/// OpenAI-compatible chat-completions client. Works against any endpoint
/// speaking the same wire format when a base URL override is supplied.
pub struct OpenAIClient {
    http_client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl OpenAIClient {
    pub fn new(model: String, api_key: String, base_url: Option<String>) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        Self {
            http_client,
            base_url: base_url.unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            model,
            api_key,
        }
    }

    fn convert_message(&self, message: &Message) -> Vec<OpenAIMessage> {
        match &message.data {
            MessageData::User { content } => {
                let text = content
                    .iter()
                    .map(|c| match c {
                        UserContent::Text { text } => text.as_str(),
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                vec![OpenAIMessage::User { content: text }]
            }
            MessageData::Assistant { content } => {
                let mut text_parts = Vec::new();
                let mut tool_calls = Vec::new();
                for block in content {
                    match block {
                        AssistantContent::Text { text } => text_parts.push(text.clone()),
                        AssistantContent::ToolCall { tool_call } => {
                            tool_calls.push(OpenAIToolCall {
                                id: tool_call.id.clone(),
                                call_type: "function".to_string(),
                                function: OpenAIFunctionCall {
                                    name: tool_call.name.clone(),
                                    arguments: tool_call.parameters.to_string(),
                                },
                            });
                        }
                    }
                }
                vec![OpenAIMessage::Assistant {
                    content: if text_parts.is_empty() {
                        None
                    } else {
                        Some(text_parts.join(""))
                    },
                    tool_calls: if tool_calls.is_empty() {
                        None
                    } else {
                        Some(tool_calls)
                    },
                }]
            }
            MessageData::Tool {
                tool_use_id,
                result,
            } => vec![OpenAIMessage::Tool {
                content: result.llm_format(),
                tool_call_id: tool_use_id.clone(),
            }],
        }
    }

    fn parse_response(&self, body: &str) -> Result<CompletionResponse, ApiError> {
        let parsed: OpenAIResponse = serde_json::from_str(body).map_err(|e| {
            error!(target: "openai", "failed to parse response: {e}");
            ApiError::ResponseParsingError {
                provider: PROVIDER_NAME.to_string(),
                details: e.to_string(),
            }
        })?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::NoChoices {
                provider: PROVIDER_NAME.to_string(),
            })?;

        let mut content = Vec::new();
        if let Some(text) = choice.message.content {
            if !text.is_empty() {
                content.push(AssistantContent::Text { text });
            }
        }
        for call in choice.message.tool_calls.unwrap_or_default() {
            let parameters =
                serde_json::from_str(&call.function.arguments).map_err(|e| {
                    ApiError::ResponseParsingError {
                        provider: PROVIDER_NAME.to_string(),
                        details: format!(
                            "tool call '{}' has unparseable arguments: {e}",
                            call.function.name
                        ),
                    }
                })?;
            content.push(AssistantContent::ToolCall {
                tool_call: ToolCall {
                    name: call.function.name,
                    parameters,
                    id: call.id,
                },
            });
        }

        Ok(CompletionResponse { content })
    }
}

#[async_trait]
impl Provider for OpenAIClient {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn complete(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
        tools: Option<Vec<ToolSchema>>,
        token: CancellationToken,
    ) -> Result<CompletionResponse, ApiError> {
        let mut openai_messages = Vec::new();

        if let Some(system_content) = system {
            openai_messages.push(OpenAIMessage::System {
                content: system_content,
            });
        }
        for message in &messages {
            openai_messages.extend(self.convert_message(message));
        }

        let openai_tools = tools.map(|tools| {
            tools
                .into_iter()
                .map(|tool| OpenAITool {
                    tool_type: "function".to_string(),
                    function: OpenAIFunction {
                        name: tool.name,
                        description: tool.description,
                        parameters: serde_json::json!({
                            "type": tool.input_schema.schema_type,
                            "properties": tool.input_schema.properties,
                            "required": tool.input_schema.required
                        }),
                    },
                })
                .collect::<Vec<_>>()
        });

        let request = OpenAIRequest {
            model: self.model.clone(),
            messages: openai_messages,
            temperature: Some(0.0),
            stream: Some(false),
            tools: openai_tools,
        };

        let response = self
            .http_client
            .post(&self.base_url)
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", self.api_key),
            )
            .json(&request)
            .send()
            .await
            .map_err(ApiError::Network)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(target: "openai", "API error status={status} body={body}");
            return Err(match status.as_u16() {
                401 | 403 => ApiError::AuthenticationFailed {
                    provider: PROVIDER_NAME.to_string(),
                    details: body,
                },
                429 => ApiError::RateLimited {
                    provider: PROVIDER_NAME.to_string(),
                    details: body,
                },
                code => ApiError::ServerError {
                    provider: PROVIDER_NAME.to_string(),
                    status_code: code,
                    details: body,
                },
            });
        }

        let body_text = tokio::select! {
            () = token.cancelled() => {
                return Err(ApiError::Cancelled { provider: PROVIDER_NAME.to_string() });
            }
            text = response.text() => {
                text?
            }
        };

        self.parse_response(&body_text)
    }
}

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
enum OpenAIMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<OpenAIToolCall>>,
    },
    Tool {
        content: String,
        tool_call_id: String,
    },
}

#[derive(Debug, Serialize)]
struct OpenAITool {
    #[serde(rename = "type")]
    tool_type: String,
    function: OpenAIFunction,
}

#[derive(Debug, Serialize)]
struct OpenAIFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: String,
    function: OpenAIFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAIToolCall>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OpenAIClient {
        OpenAIClient::new("test-model".to_string(), "sk-test".to_string(), None)
    }

    #[test]
    fn parses_text_and_tool_calls() {
        let body = serde_json::json!({
            "choices": [{
                "message": {
                    "content": "<think>inspect first</think>",
                    "tool_calls": [{
                        "id": "call_0",
                        "type": "function",
                        "function": {
                            "name": "execute_code",
                            "arguments": "{\"code\": \"print(len(df))\"}"
                        }
                    }]
                }
            }]
        })
        .to_string();

        let response = client().parse_response(&body).unwrap();
        assert_eq!(response.extract_text(), "<think>inspect first</think>");
        let calls = response.extract_tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "execute_code");
        assert_eq!(calls[0].parameters["code"], "print(len(df))");
    }

    #[test]
    fn empty_choices_is_an_error() {
        let err = client()
            .parse_response(&serde_json::json!({"choices": []}).to_string())
            .unwrap_err();
        assert!(matches!(err, ApiError::NoChoices { .. }));
    }

    #[test]
    fn garbage_arguments_fail_parsing() {
        let body = serde_json::json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_0",
                        "type": "function",
                        "function": {"name": "execute_code", "arguments": "not json"}
                    }]
                }
            }]
        })
        .to_string();
        let err = client().parse_response(&body).unwrap_err();
        assert!(matches!(err, ApiError::ResponseParsingError { .. }));
    }
}

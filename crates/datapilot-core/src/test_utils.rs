//! Test helpers shared across crate boundaries.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::api::{ApiError, CompletionResponse, Provider};
use crate::conversation::{AssistantContent, Message};
use datapilot_tools::{ToolCall, ToolSchema};

/// Scripted provider: returns canned completions in order, then errors.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<CompletionResponse>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<CompletionResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
        }
    }

    /// A provider that answers every turn with the same response.
    pub fn repeating(response: CompletionResponse, times: usize) -> Self {
        Self::new(vec![response; times])
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn complete(
        &self,
        _messages: Vec<Message>,
        _system: Option<String>,
        _tools: Option<Vec<ToolSchema>>,
        _token: CancellationToken,
    ) -> Result<CompletionResponse, ApiError> {
        let next = self
            .responses
            .lock()
            .ok()
            .and_then(|mut responses| responses.pop_front());
        next.ok_or(ApiError::NoChoices {
            provider: "scripted".to_string(),
        })
    }
}

/// Provider whose every call fails with a non-retryable transport error.
pub struct FailingProvider;

#[async_trait]
impl Provider for FailingProvider {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn complete(
        &self,
        _messages: Vec<Message>,
        _system: Option<String>,
        _tools: Option<Vec<ToolSchema>>,
        _token: CancellationToken,
    ) -> Result<CompletionResponse, ApiError> {
        Err(ApiError::AuthenticationFailed {
            provider: "failing".to_string(),
            details: "no credentials".to_string(),
        })
    }
}

/// Plain-text assistant turn.
pub fn text_response(text: &str) -> CompletionResponse {
    CompletionResponse {
        content: vec![AssistantContent::Text {
            text: text.to_string(),
        }],
    }
}

/// Assistant turn requesting one tool call.
pub fn tool_response(id: &str, name: &str, parameters: serde_json::Value) -> CompletionResponse {
    CompletionResponse {
        content: vec![AssistantContent::ToolCall {
            tool_call: ToolCall {
                name: name.to_string(),
                parameters,
                id: id.to_string(),
            },
        }],
    }
}

/// Assistant turn with text plus one tool call.
pub fn text_and_tool_response(
    text: &str,
    id: &str,
    name: &str,
    parameters: serde_json::Value,
) -> CompletionResponse {
    CompletionResponse {
        content: vec![
            AssistantContent::Text {
                text: text.to_string(),
            },
            AssistantContent::ToolCall {
                tool_call: ToolCall {
                    name: name.to_string(),
                    parameters,
                    id: id.to_string(),
                },
            },
        ],
    }
}

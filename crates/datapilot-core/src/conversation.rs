//! Message types for the agent transcript.
//!
//! - `Message` - one transcript entry with metadata
//! - `MessageData` - role-specific content (User, Assistant, Tool)
//! - tag helpers for the `<plan>` / `<think>` / `<solution>` conventions

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use strum_macros::Display;

use datapilot_tools::ToolCall;
pub use datapilot_tools::result::ToolResult;

/// Role in the conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Copy, Display)]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// Content that can be sent by a user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserContent {
    Text { text: String },
}

/// Content that can be sent by an assistant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssistantContent {
    Text { text: String },
    ToolCall { tool_call: ToolCall },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub timestamp: u64,
    pub id: String,
    pub parent_message_id: Option<String>,
    pub data: MessageData,
}

/// A message in the conversation, with role-specific content
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum MessageData {
    User {
        content: Vec<UserContent>,
    },
    Assistant {
        content: Vec<AssistantContent>,
    },
    Tool {
        tool_use_id: String,
        result: ToolResult,
    },
}

impl Message {
    pub fn role(&self) -> Role {
        match &self.data {
            MessageData::User { .. } => Role::User,
            MessageData::Assistant { .. } => Role::Assistant,
            MessageData::Tool { .. } => Role::Tool,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Helper to get current timestamp
    pub fn current_timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }

    /// Helper to generate unique IDs
    pub fn generate_id(prefix: &str) -> String {
        format!("{}_{}", prefix, uuid::Uuid::now_v7())
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            timestamp: Self::current_timestamp(),
            id: Self::generate_id("user"),
            parent_message_id: None,
            data: MessageData::User {
                content: vec![UserContent::Text { text: text.into() }],
            },
        }
    }

    pub fn assistant(content: Vec<AssistantContent>, parent: Option<String>) -> Self {
        Self {
            timestamp: Self::current_timestamp(),
            id: Self::generate_id("assistant"),
            parent_message_id: parent,
            data: MessageData::Assistant { content },
        }
    }

    pub fn tool(tool_use_id: String, result: ToolResult, parent: Option<String>) -> Self {
        Self {
            timestamp: Self::current_timestamp(),
            id: Self::generate_id("tool"),
            parent_message_id: parent,
            data: MessageData::Tool {
                tool_use_id,
                result,
            },
        }
    }

    /// Extract text content from the message
    pub fn extract_text(&self) -> String {
        match &self.data {
            MessageData::User { content } => content
                .iter()
                .map(|c| match c {
                    UserContent::Text { text } => text.as_str(),
                })
                .collect::<Vec<_>>()
                .join(""),
            MessageData::Assistant { content } => content
                .iter()
                .filter_map(|c| match c {
                    AssistantContent::Text { text } => Some(text.as_str()),
                    AssistantContent::ToolCall { .. } => None,
                })
                .collect::<Vec<_>>()
                .join(""),
            MessageData::Tool { result, .. } => result.llm_format(),
        }
    }

    pub fn tool_calls(&self) -> Vec<ToolCall> {
        match &self.data {
            MessageData::Assistant { content } => content
                .iter()
                .filter_map(|c| match c {
                    AssistantContent::ToolCall { tool_call } => Some(tool_call.clone()),
                    AssistantContent::Text { .. } => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

static PLAN_RE: Lazy<Regex> = Lazy::new(|| tag_regex("plan"));
static THINK_RE: Lazy<Regex> = Lazy::new(|| tag_regex("think"));
static SOLUTION_RE: Lazy<Regex> = Lazy::new(|| tag_regex("solution"));

#[allow(clippy::expect_used)]
fn tag_regex(tag: &str) -> Regex {
    // The pattern is static up to the tag name; a failure here is a bug.
    Regex::new(&format!(r"(?is)<{tag}>(.*?)</\s*{tag}\s*>")).expect("valid tag pattern")
}

fn extract_with(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// Body of the first `<plan>` block, if present.
pub fn extract_plan(text: &str) -> Option<String> {
    extract_with(&PLAN_RE, text)
}

/// Body of the first `<think>` block, if present.
pub fn extract_think(text: &str) -> Option<String> {
    extract_with(&THINK_RE, text)
}

/// Body of the first `<solution>` block, if present.
pub fn extract_solution(text: &str) -> Option<String> {
    extract_with(&SOLUTION_RE, text)
}

/// Whether the assistant text carries the terminal solution marker.
pub fn has_solution_marker(text: &str) -> bool {
    text.to_lowercase().contains("<solution>")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_solution_body() {
        let text = "<think>done</think>\n<solution>\n## Summary\nAll good.\n</solution>";
        assert_eq!(
            extract_solution(text).as_deref(),
            Some("## Summary\nAll good.")
        );
        assert!(has_solution_marker(text));
    }

    #[test]
    fn solution_marker_is_case_insensitive() {
        assert!(has_solution_marker("<SOLUTION>x</SOLUTION>"));
        assert_eq!(extract_solution("<Solution>x</Solution>").as_deref(), Some("x"));
    }

    #[test]
    fn missing_tags_yield_none() {
        assert!(extract_plan("no tags here").is_none());
        assert!(extract_think("<plan>p</plan>").is_none());
    }

    #[test]
    fn tool_calls_filtered_from_assistant_content() {
        let call = ToolCall {
            name: "execute_code".to_string(),
            parameters: serde_json::json!({"code": "print(1)"}),
            id: "call_1".to_string(),
        };
        let msg = Message::assistant(
            vec![
                AssistantContent::Text {
                    text: "running".to_string(),
                },
                AssistantContent::ToolCall {
                    tool_call: call.clone(),
                },
            ],
            None,
        );
        assert_eq!(msg.tool_calls(), vec![call]);
        assert_eq!(msg.extract_text(), "running");
    }
}

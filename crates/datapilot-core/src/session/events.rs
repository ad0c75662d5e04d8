//! Typed progress events emitted while a run executes.
//!
//! The engine only produces these on a channel; transporting them (terminal,
//! WebSocket, whatever) is the consumer's concern.

use serde::{Deserialize, Serialize};
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RunStage {
    Starting,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Status {
        stage: RunStage,
    },
    /// Advisory plan extracted from assistant text; never enforced.
    Plan {
        content: String,
    },
    Thinking {
        content: String,
    },
    ExecutingTool {
        tool_call_id: String,
        name: String,
    },
    /// One finished execution record.
    Code {
        index: u64,
        code: String,
        stdout: String,
        error: Option<String>,
        success: bool,
    },
    Figure {
        sequence: u64,
        record_index: u64,
        svg: String,
    },
    Solution {
        content: String,
    },
}

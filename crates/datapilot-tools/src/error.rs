use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tools::{
    DESCRIBE_DATASET_TOOL_NAME, EXECUTE_CODE_TOOL_NAME,
    describe_dataset::DescribeDatasetError, execute_code::ExecuteCodeError,
};

#[derive(Error, Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid parameters for {tool_name}: {message}")]
    InvalidParams { tool_name: String, message: String },

    #[error("{0}")]
    Execution(ToolExecutionError),

    #[error("{0} was cancelled")]
    Cancelled(String),

    #[error("Unexpected error: {0}")]
    InternalError(String),
}

impl ToolError {
    pub fn invalid_params<T: Into<String>, M: Into<String>>(tool_name: T, message: M) -> Self {
        ToolError::InvalidParams {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "tool", content = "error", rename_all = "snake_case")]
pub enum ToolExecutionError {
    #[error("{0}")]
    DescribeDataset(DescribeDatasetError),
    #[error("{0}")]
    ExecuteCode(ExecuteCodeError),
}

impl ToolExecutionError {
    pub fn tool_name(&self) -> &str {
        match self {
            ToolExecutionError::DescribeDataset(_) => DESCRIBE_DATASET_TOOL_NAME,
            ToolExecutionError::ExecuteCode(_) => EXECUTE_CODE_TOOL_NAME,
        }
    }
}

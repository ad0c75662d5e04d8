use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ToolSpec;
use crate::error::ToolExecutionError;
use crate::result::ExecutionResult;

pub const EXECUTE_CODE_TOOL_NAME: &str = "execute_code";

pub struct ExecuteCodeToolSpec;

impl ToolSpec for ExecuteCodeToolSpec {
    type Params = ExecuteCodeParams;
    type Result = ExecutionResult;
    type Error = ExecuteCodeError;

    const NAME: &'static str = EXECUTE_CODE_TOOL_NAME;
    const DISPLAY_NAME: &'static str = "Execute Code";
    const DESCRIPTION: &'static str = "Execute Python code in a persistent namespace. Variables \
        and imports persist across calls. The dataset is available as a Frame in the variable \
        'df' (or 'df_<name>' when several datasets are bound). Figures rendered with plt.show() \
        are captured automatically. Use this tool for exploration, cleaning, feature work, \
        modeling, and visualization.";

    fn execution_error(error: Self::Error) -> ToolExecutionError {
        ToolExecutionError::ExecuteCode(error)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Error)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ExecuteCodeError {
    #[error("execution context is gone: {message}")]
    ContextLost { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExecuteCodeParams {
    /// Python source to run against the session's persistent namespace
    pub code: String,
}

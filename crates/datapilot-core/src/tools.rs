//! Tool registry and dispatch over the current session.
//!
//! Every failure mode is folded into the returned [`ToolResult`] so the model
//! always gets a result entry it can react to.

use tracing::{debug, error};

use crate::datasets::DatasetError;
use crate::sandbox::SandboxError;
use crate::session::Session;
use datapilot_tools::result::{ExecutionResult, ToolResult};
use datapilot_tools::tools::describe_dataset::{
    DescribeDatasetError, DescribeDatasetParams, DescribeDatasetToolSpec,
};
use datapilot_tools::tools::execute_code::{
    ExecuteCodeError, ExecuteCodeParams, ExecuteCodeToolSpec,
};
use datapilot_tools::{ToolCall, ToolError, ToolSchema, ToolSpec};

/// Schemas advertised to the model, in a stable order.
pub fn schemas() -> Vec<ToolSchema> {
    vec![
        DescribeDatasetToolSpec::schema(),
        ExecuteCodeToolSpec::schema(),
    ]
}

/// Execute one tool call against the session. Never returns `Err`: unknown
/// tools, bad parameters and execution failures all become error results.
pub async fn dispatch(session: &mut Session, call: &ToolCall) -> ToolResult {
    debug!(target: "tools", tool = %call.name, id = %call.id, "dispatching tool call");
    match call.name.as_str() {
        DescribeDatasetToolSpec::NAME => {
            let params: DescribeDatasetParams = match serde_json::from_value(call.parameters.clone())
            {
                Ok(params) => params,
                Err(e) => {
                    return ToolError::invalid_params(DescribeDatasetToolSpec::NAME, e.to_string())
                        .into();
                }
            };
            describe_dataset(session, &params)
        }
        ExecuteCodeToolSpec::NAME => {
            let params: ExecuteCodeParams = match serde_json::from_value(call.parameters.clone()) {
                Ok(params) => params,
                Err(e) => {
                    return ToolError::invalid_params(ExecuteCodeToolSpec::NAME, e.to_string())
                        .into();
                }
            };
            execute_code(session, &params).await
        }
        other => ToolError::UnknownTool(other.to_string()).into(),
    }
}

fn describe_dataset(session: &Session, params: &DescribeDatasetParams) -> ToolResult {
    match session.describe_dataset(&params.identifier) {
        Ok(summary) => summary.into(),
        Err(err) => {
            let tool_err = match err {
                DatasetError::NotFound {
                    identifier,
                    available,
                } => DescribeDatasetError::NotFound {
                    identifier,
                    available: available.join(", "),
                },
                DatasetError::Load { message, .. } => DescribeDatasetError::Load { message },
            };
            ToolError::Execution(DescribeDatasetToolSpec::execution_error(tool_err)).into()
        }
    }
}

async fn execute_code(session: &mut Session, params: &ExecuteCodeParams) -> ToolResult {
    match session.execute_fragment(&params.code).await {
        Ok(record) => ExecutionResult {
            stdout: record.stdout.clone(),
            error: record.error.clone(),
            figures_captured: record.figures.len() as u32,
            success: record.success,
            duration_ms: record.duration.as_millis() as u64,
        }
        .into(),
        Err(err @ SandboxError::ContextLost(_)) => {
            error!(target: "tools", "execution context lost: {err}");
            ToolError::Execution(ExecuteCodeToolSpec::execution_error(
                ExecuteCodeError::ContextLost {
                    message: err.to_string(),
                },
            ))
            .into()
        }
        Err(err) => ToolError::InternalError(err.to_string()).into(),
    }
}

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ToolSpec;
use crate::error::ToolExecutionError;
use crate::result::DatasetSummaryResult;

pub const DESCRIBE_DATASET_TOOL_NAME: &str = "describe_dataset";

pub struct DescribeDatasetToolSpec;

impl ToolSpec for DescribeDatasetToolSpec {
    type Params = DescribeDatasetParams;
    type Result = DatasetSummaryResult;
    type Error = DescribeDatasetError;

    const NAME: &'static str = DESCRIBE_DATASET_TOOL_NAME;
    const DISPLAY_NAME: &'static str = "Describe Dataset";
    const DESCRIPTION: &'static str = "Get comprehensive information about a dataset including \
        columns, types, missing values, numeric statistics, and a row preview. Use this tool \
        first to understand the structure of the dataset before performing any analysis.";

    fn execution_error(error: Self::Error) -> ToolExecutionError {
        ToolExecutionError::DescribeDataset(error)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Error)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum DescribeDatasetError {
    #[error("dataset '{identifier}' not found; available: {available}")]
    NotFound {
        identifier: String,
        available: String,
    },

    #[error("failed to load dataset: {message}")]
    Load { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DescribeDatasetParams {
    /// Catalog name or filesystem path of the dataset to describe
    pub identifier: String,
}

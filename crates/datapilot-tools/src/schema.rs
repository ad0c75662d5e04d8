use schemars::JsonSchema;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::error::Error as StdError;

use crate::error::ToolExecutionError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSchema {
    pub properties: serde_json::Map<String, Value>,
    pub required: Vec<String>,
    #[serde(rename = "type")]
    pub schema_type: String,
}

impl From<schemars::Schema> for InputSchema {
    fn from(schema: schemars::Schema) -> Self {
        let value = serde_json::to_value(&schema).unwrap_or_else(|_| Value::Null);
        Self::from_value(&value)
    }
}

impl InputSchema {
    fn from_value(schema: &Value) -> Self {
        let obj = schema.as_object();
        let schema_type = obj
            .and_then(|o| o.get("type"))
            .and_then(|v| v.as_str())
            .unwrap_or("object")
            .to_string();
        let properties = obj
            .and_then(|o| o.get("properties"))
            .and_then(|v| v.as_object())
            .cloned()
            .unwrap_or_default();
        let required = obj
            .and_then(|o| o.get("required"))
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            properties,
            required,
            schema_type,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    pub description: String,
    pub input_schema: InputSchema,
}

/// Static description of a tool: its wire name, parameter type and the
/// conversion from its typed failure into the shared execution-error enum.
pub trait ToolSpec {
    type Params: DeserializeOwned + JsonSchema + Send;
    type Result: Into<crate::result::ToolResult> + Send;
    type Error: StdError + Send + Sync + 'static;

    const NAME: &'static str;
    const DISPLAY_NAME: &'static str;
    const DESCRIPTION: &'static str;

    fn execution_error(error: Self::Error) -> ToolExecutionError;

    fn schema() -> ToolSchema {
        ToolSchema {
            name: Self::NAME.to_string(),
            display_name: Self::DISPLAY_NAME.to_string(),
            description: Self::DESCRIPTION.to_string(),
            input_schema: schemars::schema_for!(Self::Params).into(),
        }
    }
}

/// One invocation request produced by the model, correlated by `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub parameters: Value,
    pub id: String,
}

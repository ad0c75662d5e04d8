pub mod error;
pub mod result;
pub mod schema;
pub mod tools;

pub use error::ToolError;
pub use result::{ToolOutput, ToolResult};
pub use schema::{InputSchema, ToolCall, ToolSchema, ToolSpec};

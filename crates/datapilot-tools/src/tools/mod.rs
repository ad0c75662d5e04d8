pub mod describe_dataset;
pub mod execute_code;

pub use describe_dataset::DESCRIBE_DATASET_TOOL_NAME;
pub use execute_code::EXECUTE_CODE_TOOL_NAME;

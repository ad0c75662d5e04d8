use crate::error::ToolError;
use serde::{Deserialize, Serialize};

/// Core enum for all tool results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ToolResult {
    // One variant per built-in tool
    DatasetSummary(DatasetSummaryResult),
    Execution(ExecutionResult),

    // Failure (any tool)
    Error(ToolError),
}

/// Per-column description for the describe_dataset tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub name: String,
    pub dtype: String,
    pub missing: u64,
}

/// Descriptive statistics for one numeric column
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumericColumnSummary {
    pub column: String,
    pub count: u64,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

/// Result for the describe_dataset tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSummaryResult {
    pub name: String,
    pub path: String,
    pub rows: u64,
    pub columns: Vec<ColumnSummary>,
    pub numeric: Vec<NumericColumnSummary>,
    pub preview_header: Vec<String>,
    pub preview_rows: Vec<Vec<String>>,
}

/// Result for one executed code fragment. Figure payloads are kept
/// out-of-band in the session history; only the count travels back to
/// the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub stdout: String,
    pub error: Option<String>,
    pub figures_captured: u32,
    pub success: bool,
    pub duration_ms: u64,
}

// Trait for typed tool outputs
pub trait ToolOutput: Serialize + Send + Sync + 'static {}

impl ToolOutput for DatasetSummaryResult {}
impl ToolOutput for ExecutionResult {}
impl ToolOutput for ToolResult {}

impl From<DatasetSummaryResult> for ToolResult {
    fn from(r: DatasetSummaryResult) -> Self {
        Self::DatasetSummary(r)
    }
}

impl From<ExecutionResult> for ToolResult {
    fn from(r: ExecutionResult) -> Self {
        Self::Execution(r)
    }
}

impl From<ToolError> for ToolResult {
    fn from(e: ToolError) -> Self {
        Self::Error(e)
    }
}

impl ToolResult {
    /// Format the result for LLM consumption
    pub fn llm_format(&self) -> String {
        match self {
            ToolResult::DatasetSummary(r) => {
                let mut output = Vec::new();
                output.push(format!("Dataset: {}", r.name));
                output.push(format!(
                    "Shape: {} rows \u{d7} {} columns",
                    r.rows,
                    r.columns.len()
                ));
                output.push("\nColumns and Types:".to_string());
                for col in &r.columns {
                    let missing_pct = if r.rows > 0 {
                        col.missing as f64 / r.rows as f64 * 100.0
                    } else {
                        0.0
                    };
                    output.push(format!(
                        "  - {}: {} (missing: {}, {missing_pct:.1}%)",
                        col.name, col.dtype, col.missing
                    ));
                }
                if !r.numeric.is_empty() {
                    output.push("\nNumeric Columns Summary:".to_string());
                    for s in &r.numeric {
                        output.push(format!(
                            "  {}: count={}, mean={:.4}, std={:.4}, min={:.4}, max={:.4}",
                            s.column, s.count, s.mean, s.std_dev, s.min, s.max
                        ));
                    }
                }
                if !r.preview_rows.is_empty() {
                    output.push(format!("\nFirst {} rows:", r.preview_rows.len()));
                    output.push(format!("  {}", r.preview_header.join(" | ")));
                    for row in &r.preview_rows {
                        output.push(format!("  {}", row.join(" | ")));
                    }
                }
                output.join("\n")
            }
            ToolResult::Execution(r) => {
                const MAX_STDOUT_CHARS: usize = 24 * 1024;
                const MAX_STDOUT_LINES: usize = 400;

                let mut parts = Vec::new();
                if !r.stdout.is_empty() {
                    let stdout = truncate_output(&r.stdout, MAX_STDOUT_CHARS, MAX_STDOUT_LINES);
                    parts.push(format!("Output:\n{stdout}"));
                }
                if let Some(error) = &r.error {
                    if !error.is_empty() {
                        parts.push(format!("Error:\n{error}"));
                    }
                }
                if r.figures_captured > 0 {
                    parts.push(format!("Generated {} figure(s)", r.figures_captured));
                }
                if parts.is_empty() {
                    parts.push("Execution completed successfully (no output)".to_string());
                }
                parts.join("\n\n")
            }
            ToolResult::Error(e) => format!("Error: {e}"),
        }
    }

    /// Get the variant name as a string for metadata
    pub fn variant_name(&self) -> &'static str {
        match self {
            ToolResult::DatasetSummary(_) => "DatasetSummary",
            ToolResult::Execution(_) => "Execution",
            ToolResult::Error(_) => "Error",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ToolResult::Error(_))
    }
}

// Keeps both ends of an oversized output so the model still sees the tail.
fn truncate_output(s: &str, max_chars: usize, max_lines: usize) -> String {
    let lines: Vec<&str> = s.lines().collect();
    let char_count = s.len();

    if lines.len() <= max_lines && char_count <= max_chars {
        return s.to_string();
    }

    let head_lines = max_lines / 2;
    let tail_lines = max_lines - head_lines;
    let mut result = String::new();

    for line in lines.iter().take(head_lines) {
        result.push_str(line);
        result.push('\n');
    }

    let omitted_lines = lines.len().saturating_sub(max_lines);
    result.push_str(&format!(
        "\n[... {omitted_lines} lines omitted ({char_count} total chars) ...]\n\n"
    ));

    if tail_lines > 0 && lines.len() > head_lines {
        for line in lines.iter().skip(lines.len().saturating_sub(tail_lines)) {
            result.push_str(line);
            result.push('\n');
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn execution(stdout: &str, error: Option<&str>, figures: u32) -> ToolResult {
        ToolResult::Execution(ExecutionResult {
            stdout: stdout.to_string(),
            error: error.map(str::to_string),
            figures_captured: figures,
            success: error.is_none(),
            duration_ms: 12,
        })
    }

    #[test]
    fn execution_format_with_output_and_figures() {
        let formatted = execution("row count: 42", None, 2).llm_format();
        assert!(formatted.contains("Output:\nrow count: 42"));
        assert!(formatted.contains("Generated 2 figure(s)"));
    }

    #[test]
    fn execution_format_empty_run() {
        let formatted = execution("", None, 0).llm_format();
        assert_eq!(formatted, "Execution completed successfully (no output)");
    }

    #[test]
    fn execution_format_surfaces_error() {
        let formatted = execution("", Some("ZeroDivisionError: division by zero"), 0).llm_format();
        assert!(formatted.starts_with("Error:\nZeroDivisionError"));
    }

    #[test]
    fn long_stdout_is_truncated_with_marker() {
        let big: String = (0..2000).map(|i| format!("line {i}\n")).collect();
        let formatted = execution(&big, None, 0).llm_format();
        assert!(formatted.contains("lines omitted"));
        assert!(formatted.contains("line 0"));
        assert!(formatted.contains("line 1999"));
    }
}

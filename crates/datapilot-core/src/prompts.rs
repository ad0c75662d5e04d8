//! System prompt assembly for the analysis agent.

use crate::datasets::DatasetBinding;

/// Marker the model emits around its final answer.
pub const SOLUTION_MARKER: &str = "<solution>";

const PLANNING_INSTRUCTIONS: &str = r"**PLANNING:**
Before starting execution, lay out a short plan:

<plan>
## High-Level Strategy
[Overall approach to solve the task]

## Steps
1. [Data exploration: what to inspect and check]
2. [Cleaning / preprocessing]
3. [Feature work, if relevant]
4. [Modeling or analysis: methods and metrics]
5. [Evaluation and presentation of results]
</plan>

Follow the plan step by step, updating it as you learn more about the data.
";

/// Build the system instruction describing tools, bindings and output
/// conventions.
pub fn system_prompt(bindings: &[DatasetBinding], planning_mode: bool) -> String {
    let mut dataset_lines = Vec::new();
    for binding in bindings {
        dataset_lines.push(format!(
            "- `{}`: Frame loaded from {} ({} rows); source path in `{}`",
            binding.var_name,
            binding.table.path.display(),
            binding.table.row_count(),
            binding.path_var_name,
        ));
    }

    let planning = if planning_mode {
        PLANNING_INSTRUCTIONS
    } else {
        ""
    };

    format!(
        r#"You are an expert data analyst. Your goal is to solve the user's data-analysis or modeling task end to end, with executed code.

**Datasets bound in your environment:**
{datasets}

**Execution Environment:**
- You have a persistent Python environment: variables and imports carry over between execute_code calls.
- Each dataset is a `Frame`: `.columns`, `.rows`, `len(df)`, `df.shape`, `df.col(name)`, `df.head(n)`, `df.records()`.
- A plotting facade `plt` is available: `plt.plot`, `plt.scatter`, `plt.bar`, `plt.hist`, `plt.title`, `plt.xlabel`, `plt.ylabel`, then `plt.show()`. Every `plt.show()` is captured as a figure.
- Standard-library modules (math, statistics, json, re, collections, ...) may be imported. Network and process access is blocked.
{planning}
**Workflow Instructions:**
At each turn, reason first, then either use a tool or finish:

1) Use tools to interact with the environment:
   - `describe_dataset` to inspect a dataset's structure
   - `execute_code` to run code and see results

2) When the task is complete, provide the final solution inside <solution> tags.

**Response Format:**

<think>
[Your reasoning about what to do next and why]
</think>

Then EITHER call a tool OR provide:

<solution>
## Summary
## Key Findings
## Approach
## Results
## Recommendations
</solution>

**Code Guidelines:**
- Keep fragments small and decomposed into steps; print what matters.
- Check data quality (missing values, outliers) before modeling.
- Create figures to support insights.
- If a fragment fails, read the error and fix it in the next fragment.

Begin by understanding the dataset, then proceed with systematic analysis."#,
        datasets = dataset_lines.join("\n"),
        planning = planning,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planning_section_is_optional() {
        assert!(system_prompt(&[], true).contains("<plan>"));
        assert!(!system_prompt(&[], false).contains("<plan>"));
    }
}

//! Deterministic notebook generation from execution history.
//!
//! Rendering is a pure function of the records: same history in, byte-equal
//! document out. Each record becomes one code cell with its captured outputs;
//! section headings come from a keyword classifier over the code text.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::Display;

use crate::session::{ExecutionHistory, ExecutionRecord};

pub const NBFORMAT: u32 = 4;
pub const NBFORMAT_MINOR: u32 = 5;

/// Inferred section label for a code fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Section {
    #[strum(serialize = "Setup")]
    Setup,
    #[strum(serialize = "Data Exploration")]
    Exploration,
    #[strum(serialize = "Data Cleaning")]
    Cleaning,
    #[strum(serialize = "Visualization")]
    Visualization,
    #[strum(serialize = "Feature Engineering")]
    Features,
    #[strum(serialize = "Modeling")]
    Modeling,
    #[strum(serialize = "Evaluation")]
    Evaluation,
    #[strum(serialize = "Analysis")]
    Analysis,
}

// Keyword table checked in priority order; first hit wins.
const SECTION_KEYWORDS: &[(Section, &[&str])] = &[
    (
        Section::Modeling,
        &["fit(", "predict", "model", "train(", "regress", "classif", "cluster"],
    ),
    (
        Section::Evaluation,
        &["accuracy", "rmse", "mse", "r2", "score", "confusion", "metric", "evaluat"],
    ),
    (
        Section::Features,
        &["feature", "encode", "normalize", "standardize", "scale"],
    ),
    (
        Section::Cleaning,
        &["dropna", "fillna", "missing", "clean", "outlier", "dedup"],
    ),
    (
        Section::Visualization,
        &["plt.", "plot", "hist", "scatter", "chart", "figure"],
    ),
    (
        Section::Exploration,
        &["head(", "describe", "shape", "columns", "summary", "explore"],
    ),
    (Section::Setup, &["import "]),
];

/// Classify one fragment. Pure and total: unmatched code is `Analysis`.
pub fn classify(code: &str) -> Section {
    let lowered = code.to_lowercase();
    for (section, keywords) in SECTION_KEYWORDS {
        if keywords.iter().any(|kw| lowered.contains(kw)) {
            return *section;
        }
    }
    Section::Analysis
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notebook {
    pub cells: Vec<Cell>,
    pub metadata: Value,
    pub nbformat: u32,
    pub nbformat_minor: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cell_type", rename_all = "lowercase")]
pub enum Cell {
    Markdown {
        id: String,
        metadata: Value,
        source: Vec<String>,
    },
    Code {
        id: String,
        metadata: Value,
        execution_count: Option<u64>,
        outputs: Vec<Output>,
        source: Vec<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "output_type", rename_all = "snake_case")]
pub enum Output {
    Stream {
        name: String,
        text: Vec<String>,
    },
    Error {
        ename: String,
        evalue: String,
        traceback: Vec<String>,
    },
    DisplayData {
        data: Value,
        metadata: Value,
    },
}

impl Notebook {
    pub fn to_json_string(&self) -> serde_json::Result<String> {
        let mut rendered = serde_json::to_string_pretty(self)?;
        rendered.push('\n');
        Ok(rendered)
    }
}

/// Render the history into a notebook document.
pub fn generate(
    history: &ExecutionHistory,
    dataset_name: &str,
    goal: &str,
    solution: Option<&str>,
) -> Notebook {
    let mut builder = NotebookBuilder::default();

    builder.markdown(format!(
        "# Analysis: {dataset_name}\n\n**Goal:** {goal}"
    ));

    let mut current_section: Option<Section> = None;
    for record in history.records() {
        let section = classify(&record.code);
        if current_section != Some(section) {
            builder.markdown(format!("## {section}"));
            current_section = Some(section);
        }
        builder.code(record);
    }

    if let Some(solution) = solution {
        builder.markdown(format!("## Solution\n\n{solution}"));
    }

    Notebook {
        cells: builder.cells,
        metadata: serde_json::json!({
            "kernelspec": {
                "display_name": "Python 3",
                "language": "python",
                "name": "python3"
            },
            "language_info": {
                "name": "python"
            }
        }),
        nbformat: NBFORMAT,
        nbformat_minor: NBFORMAT_MINOR,
    }
}

#[derive(Default)]
struct NotebookBuilder {
    cells: Vec<Cell>,
}

impl NotebookBuilder {
    // Cell ids derive from position, keeping regeneration byte-identical.
    fn next_id(&self) -> String {
        format!("cell-{}", self.cells.len())
    }

    fn markdown(&mut self, text: String) {
        let cell = Cell::Markdown {
            id: self.next_id(),
            metadata: serde_json::json!({}),
            source: source_lines(&text),
        };
        self.cells.push(cell);
    }

    fn code(&mut self, record: &ExecutionRecord) {
        let mut outputs = Vec::new();
        if !record.stdout.is_empty() {
            outputs.push(Output::Stream {
                name: "stdout".to_string(),
                text: source_lines(&record.stdout),
            });
        }
        if let Some(error) = &record.error {
            if !error.is_empty() {
                let (ename, evalue) = split_error(error);
                outputs.push(Output::Error {
                    ename,
                    evalue,
                    traceback: source_lines(error),
                });
            }
        }
        for figure in &record.figures {
            outputs.push(Output::DisplayData {
                data: serde_json::json!({
                    "image/svg+xml": source_lines(&figure.svg),
                }),
                metadata: serde_json::json!({}),
            });
        }

        let cell = Cell::Code {
            id: self.next_id(),
            metadata: serde_json::json!({}),
            execution_count: Some(record.index + 1),
            outputs,
            source: source_lines(&record.code),
        };
        self.cells.push(cell);
    }
}

// nbformat convention: every line keeps its newline except an unterminated
// final line.
fn source_lines(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let mut lines: Vec<String> = text.split('\n').map(|l| format!("{l}\n")).collect();
    if text.ends_with('\n') {
        lines.pop();
    } else if let Some(last) = lines.last_mut() {
        *last = last.trim_end_matches('\n').to_string();
    }
    lines
}

// "ZeroDivisionError: division by zero" -> (ename, evalue); falls back to a
// generic name when the text has no parseable head line.
fn split_error(error: &str) -> (String, String) {
    let last_line = error
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("");
    if let Some((name, value)) = last_line.split_once(':') {
        let name = name.trim();
        if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return (name.to_string(), value.trim().to_string());
        }
    }
    ("ExecutionError".to_string(), last_line.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{ExecutionOutcome, RenderedFigure};
    use rstest::rstest;
    use std::time::Duration;

    #[rstest]
    #[case("import math\nimport json", Section::Setup)]
    #[case("print(df.head())", Section::Exploration)]
    #[case("rows = [r for r in df.rows if r[1] is not None]  # drop missing", Section::Cleaning)]
    #[case("plt.hist(values)\nplt.show()", Section::Visualization)]
    #[case("x_scaled = [v / max_v for v in x]  # normalize", Section::Features)]
    #[case("model = fit(x, y)", Section::Modeling)]
    #[case("print('rmse', rmse)", Section::Evaluation)]
    #[case("total = sum(v for v in values)", Section::Analysis)]
    fn classifier_cases(#[case] code: &str, #[case] expected: Section) {
        assert_eq!(classify(code), expected);
    }

    fn history_with(records: &[(&str, Option<&str>, usize)]) -> ExecutionHistory {
        let mut history = ExecutionHistory::new();
        let mut seq = 0_u64;
        for (code, error, figures) in records {
            let rendered = (0..*figures)
                .map(|_| {
                    let figure = RenderedFigure {
                        sequence: seq,
                        svg: "<svg xmlns=\"http://www.w3.org/2000/svg\"/>\n".to_string(),
                    };
                    seq += 1;
                    figure
                })
                .collect();
            history.push_outcome(code, ExecutionOutcome {
                stdout: "out\n".to_string(),
                error: error.map(str::to_string),
                figures: rendered,
                success: error.is_none(),
                duration: Duration::from_millis(3),
            });
        }
        history
    }

    #[test]
    fn regeneration_is_byte_identical() {
        let history = history_with(&[
            ("import math", None, 0),
            ("print(df.head())", None, 0),
            ("plt.plot(x, y)\nplt.show()", None, 1),
        ]);
        let a = generate(&history, "sales", "trend analysis", Some("done"))
            .to_json_string()
            .unwrap();
        let b = generate(&history, "sales", "trend analysis", Some("done"))
            .to_json_string()
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn consecutive_records_share_a_heading() {
        let history = history_with(&[
            ("print(df.head())", None, 0),
            ("print(df.describe())", None, 0),
            ("plt.plot(x, y)\nplt.show()", None, 0),
        ]);
        let notebook = generate(&history, "sales", "goal", None);
        let headings: Vec<String> = notebook
            .cells
            .iter()
            .filter_map(|cell| match cell {
                Cell::Markdown { source, .. } => source.first().cloned(),
                Cell::Code { .. } => None,
            })
            .filter(|line| line.starts_with("## "))
            .collect();
        assert_eq!(headings, vec!["## Data Exploration", "## Visualization"]);
    }

    #[test]
    fn outputs_map_to_nbformat_kinds() {
        let history = history_with(&[(
            "plt.plot(x)\nplt.show()",
            Some("Traceback (most recent call last):\nZeroDivisionError: division by zero"),
            1,
        )]);
        let notebook = generate(&history, "sales", "goal", None);
        let Some(Cell::Code {
            outputs,
            execution_count,
            ..
        }) = notebook
            .cells
            .iter()
            .find(|c| matches!(c, Cell::Code { .. }))
        else {
            panic!("expected a code cell");
        };
        assert_eq!(*execution_count, Some(1));
        assert!(matches!(&outputs[0], Output::Stream { name, .. } if name == "stdout"));
        assert!(
            matches!(&outputs[1], Output::Error { ename, .. } if ename == "ZeroDivisionError")
        );
        assert!(matches!(&outputs[2], Output::DisplayData { data, .. }
            if data.get("image/svg+xml").is_some()));
    }

    #[test]
    fn code_is_preserved_verbatim() {
        let code = "x = 1\nif x:\n    print('yes')";
        let history = history_with(&[(code, None, 0)]);
        let notebook = generate(&history, "d", "g", None);
        let Some(Cell::Code { source, .. }) = notebook
            .cells
            .iter()
            .find(|c| matches!(c, Cell::Code { .. }))
        else {
            panic!("expected a code cell");
        };
        assert_eq!(source.concat(), code);
    }

    #[test]
    fn empty_history_has_title_only() {
        let history = ExecutionHistory::new();
        let notebook = generate(&history, "sales", "goal", None);
        assert_eq!(notebook.cells.len(), 1);
        assert_eq!(notebook.nbformat, 4);
    }

    #[test]
    fn source_lines_round_trip() {
        assert_eq!(source_lines("a\nb"), vec!["a\n", "b"]);
        assert_eq!(source_lines("a\n"), vec!["a\n"]);
        assert!(source_lines("").is_empty());
    }
}

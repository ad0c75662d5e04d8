//! Filesystem layout for a finished run.
//!
//! Other tooling depends on these names: `figure_NNN.svg` per captured
//! figure (sequence-ordered), one notebook, one plain-text transcript log.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::info;

use crate::conversation::{Message, MessageData};
use crate::notebook::Notebook;
use crate::session::ExecutionHistory;

#[derive(Debug, Clone)]
pub struct RunArtifacts {
    pub run_dir: PathBuf,
    pub notebook_path: PathBuf,
    pub figure_paths: Vec<PathBuf>,
    pub transcript_path: PathBuf,
}

/// `YYYYmmdd_HHMMSS_<dataset>`, matching the artifact directory contract.
pub fn run_id(dataset_name: &str, at: DateTime<Local>) -> String {
    format!("{}_{}", at.format("%Y%m%d_%H%M%S"), dataset_name)
}

/// Write every artifact for a run under `<artifacts_dir>/<run_id>/`.
pub fn write_run(
    artifacts_dir: &Path,
    run_id: &str,
    dataset_name: &str,
    history: &ExecutionHistory,
    notebook: &Notebook,
    transcript: &[Message],
) -> crate::Result<RunArtifacts> {
    let run_dir = artifacts_dir.join(run_id);
    std::fs::create_dir_all(&run_dir)?;

    let mut figure_paths = Vec::new();
    for figure in history.figures() {
        let path = run_dir.join(format!("figure_{:03}.svg", figure.sequence + 1));
        std::fs::write(&path, &figure.svg)?;
        figure_paths.push(path);
    }

    let notebook_path = run_dir.join(format!("{dataset_name}_notebook.ipynb"));
    std::fs::write(&notebook_path, notebook.to_json_string()?)?;

    let transcript_path = run_dir.join("transcript.log");
    std::fs::write(&transcript_path, render_transcript(run_id, dataset_name, transcript))?;

    info!(
        target: "artifacts",
        run = run_id,
        figures = figure_paths.len(),
        "artifacts written to {}",
        run_dir.display()
    );

    Ok(RunArtifacts {
        run_dir,
        notebook_path,
        figure_paths,
        transcript_path,
    })
}

fn render_transcript(run_id: &str, dataset_name: &str, transcript: &[Message]) -> String {
    let rule = "=".repeat(80);
    let divider = "-".repeat(80);

    let mut out = String::new();
    out.push_str("datapilot run\n");
    out.push_str(&rule);
    out.push('\n');
    out.push_str(&format!("Run ID: {run_id}\n"));
    out.push_str(&format!("Dataset: {dataset_name}\n"));
    out.push_str(&rule);
    out.push_str("\n\n");

    for message in transcript {
        match &message.data {
            MessageData::User { .. } => {
                out.push_str(&format!("[USER]\n{}\n\n", message.extract_text()));
            }
            MessageData::Assistant { .. } => {
                out.push_str(&format!("[ASSISTANT]\n{}\n\n", message.extract_text()));
                let calls = message.tool_calls();
                if !calls.is_empty() {
                    out.push_str("[TOOL CALLS]\n");
                    for call in calls {
                        out.push_str(&format!("  - {} {}\n", call.name, call.parameters));
                    }
                    out.push('\n');
                }
            }
            MessageData::Tool { tool_use_id, result } => {
                out.push_str(&format!(
                    "[TOOL {tool_use_id}]\n{}\n\n",
                    result.llm_format()
                ));
            }
        }
        out.push_str(&divider);
        out.push_str("\n\n");
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notebook;
    use crate::sandbox::{ExecutionOutcome, RenderedFigure};
    use chrono::TimeZone;
    use std::time::Duration;

    fn sample_history() -> ExecutionHistory {
        let mut history = ExecutionHistory::new();
        history.push_outcome("plt.plot([1, 2])\nplt.show()", ExecutionOutcome {
            stdout: String::new(),
            error: None,
            figures: vec![
                RenderedFigure {
                    sequence: 0,
                    svg: "<svg xmlns=\"http://www.w3.org/2000/svg\"/>\n".to_string(),
                },
                RenderedFigure {
                    sequence: 1,
                    svg: "<svg xmlns=\"http://www.w3.org/2000/svg\"/>\n".to_string(),
                },
            ],
            success: true,
            duration: Duration::from_millis(4),
        });
        history
    }

    #[test]
    fn run_id_is_timestamp_plus_dataset() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 30, 5).unwrap();
        assert_eq!(run_id("sales", at), "20240309_143005_sales");
    }

    #[test]
    fn writes_figures_notebook_and_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let history = sample_history();
        let nb = notebook::generate(&history, "sales", "goal", None);
        let transcript = vec![Message::user("analyze sales")];

        let artifacts = write_run(
            dir.path(),
            "20240309_143005_sales",
            "sales",
            &history,
            &nb,
            &transcript,
        )
        .unwrap();

        assert!(artifacts.notebook_path.ends_with("sales_notebook.ipynb"));
        assert!(artifacts.notebook_path.exists());
        assert!(artifacts.transcript_path.exists());
        assert_eq!(artifacts.figure_paths.len(), 2);
        assert!(artifacts.run_dir.join("figure_001.svg").exists());
        assert!(artifacts.run_dir.join("figure_002.svg").exists());

        let log = std::fs::read_to_string(&artifacts.transcript_path).unwrap();
        assert!(log.contains("[USER]\nanalyze sales"));
    }
}

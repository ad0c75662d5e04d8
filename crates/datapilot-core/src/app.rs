//! End-to-end orchestration: session setup, the agent loop, artifact output.

use chrono::Local;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::agent::{AgentExecutor, AgentOutcome, AgentRunRequest, StopReason};
use crate::api::Client;
use crate::artifacts::{self, RunArtifacts};
use crate::config::Config;
use crate::notebook;
use crate::session::{Session, SessionEvent};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub goal: String,
    pub datasets: Vec<String>,
    pub planning_mode: bool,
}

#[derive(Debug)]
pub struct RunReport {
    pub run_id: String,
    pub solution: Option<String>,
    pub stop_reason: StopReason,
    pub iterations: u32,
    pub executed_fragments: usize,
    pub figures_captured: usize,
    pub artifacts: RunArtifacts,
}

/// Run one analysis goal to completion and write its artifacts.
///
/// Whatever execution history exists is persisted even when the loop ends on
/// the iteration cap, so a run never loses completed work.
pub async fn run_analysis(
    config: &Config,
    client: Client,
    options: RunOptions,
    event_tx: mpsc::Sender<SessionEvent>,
    token: CancellationToken,
) -> crate::Result<RunReport> {
    config.ensure_directories()?;

    let mut session = Session::start(config, &options.datasets).await?;
    info!(target: "app", session = session.id(), "starting analysis run");

    let executor = AgentExecutor::new(client);
    let request = AgentRunRequest {
        goal: options.goal.clone(),
        max_iterations: config.max_iterations,
        planning_mode: options.planning_mode,
    };

    let AgentOutcome {
        solution,
        stop_reason,
        transcript,
        iterations,
    } = executor
        .run(&mut session, request, event_tx, token)
        .await?;

    let run_id = artifacts::run_id(session.dataset_name(), Local::now());
    let document = notebook::generate(
        session.history(),
        session.dataset_name(),
        &options.goal,
        solution.as_deref(),
    );
    let written = artifacts::write_run(
        &config.artifacts_dir,
        &run_id,
        session.dataset_name(),
        session.history(),
        &document,
        &transcript,
    )?;

    let report = RunReport {
        run_id,
        solution,
        stop_reason,
        iterations,
        executed_fragments: session.history().len(),
        figures_captured: session.history().figure_count(),
        artifacts: written,
    };

    session.shutdown().await.ok();
    Ok(report)
}

//! End-to-end loop behavior with a scripted provider and a real execution
//! context.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use datapilot_core::agent::{AgentExecutor, AgentRunRequest, StopReason};
use datapilot_core::api::Client;
use datapilot_core::config::Config;
use datapilot_core::conversation::MessageData;
use datapilot_core::error::Error;
use datapilot_core::notebook;
use datapilot_core::session::{RunStage, Session, SessionEvent};
use datapilot_core::test_utils::{
    FailingProvider, ScriptedProvider, text_response, tool_response,
};
use datapilot_tools::result::ToolResult;

fn test_config(dir: &Path) -> Config {
    Config {
        datasets_dir: dir.join("datasets"),
        artifacts_dir: dir.join("artifacts"),
        exec_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

fn write_dataset(config: &Config) {
    std::fs::create_dir_all(&config.datasets_dir).unwrap();
    std::fs::write(
        config.datasets_dir.join("sales.csv"),
        "region,units\nnorth,3\nsouth,5\n",
    )
    .unwrap();
}

async fn start_session(config: &Config) -> Session {
    write_dataset(config);
    Session::start(config, &["sales".to_string()]).await.unwrap()
}

fn request(max_iterations: u32) -> AgentRunRequest {
    AgentRunRequest {
        goal: "summarize units sold".to_string(),
        max_iterations,
        planning_mode: false,
    }
}

/// Runs the executor and returns (outcome, events).
async fn run_with(
    session: &mut Session,
    provider: Arc<dyn datapilot_core::api::Provider>,
    max_iterations: u32,
) -> (Result<datapilot_core::agent::AgentOutcome, Error>, Vec<SessionEvent>) {
    let executor = AgentExecutor::new(Client::new(provider));
    let (event_tx, mut event_rx) = mpsc::channel(256);
    let collector = tokio::spawn(async move {
        let mut events = Vec::new();
        while let Some(event) = event_rx.recv().await {
            events.push(event);
        }
        events
    });

    let outcome = executor
        .run(session, request(max_iterations), event_tx, CancellationToken::new())
        .await;
    let events = collector.await.unwrap();
    (outcome, events)
}

#[tokio::test]
async fn executes_tool_then_finishes_on_solution_marker() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let mut session = start_session(&config).await;

    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_response(
            "call_0",
            "execute_code",
            serde_json::json!({"code": "total = sum(df.col('units'))\nprint(total)"}),
        ),
        text_response("<think>done</think>\n<solution>Total units: 8.</solution>"),
    ]));

    let (outcome, events) = run_with(&mut session, provider, 10).await;
    let outcome = outcome.unwrap();

    assert_eq!(outcome.stop_reason, StopReason::Solution);
    assert_eq!(outcome.solution.as_deref(), Some("Total units: 8."));
    assert_eq!(outcome.iterations, 2);

    // user, assistant(tool call), tool result, assistant(solution)
    assert_eq!(outcome.transcript.len(), 4);
    match &outcome.transcript[2].data {
        MessageData::Tool {
            tool_use_id,
            result,
        } => {
            assert_eq!(tool_use_id, "call_0");
            assert!(matches!(result, ToolResult::Execution(_)));
        }
        _ => panic!("expected a tool result after the tool request"),
    }

    assert_eq!(session.history().len(), 1);
    assert_eq!(session.history().records()[0].stdout, "8\n");

    assert!(events.iter().any(|e| matches!(e, SessionEvent::Code { index: 0, .. })));
    assert!(events.iter().any(
        |e| matches!(e, SessionEvent::Status { stage: RunStage::Completed })
    ));
}

#[tokio::test]
async fn failed_fragment_feeds_back_and_loop_continues() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let mut session = start_session(&config).await;

    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_response(
            "call_0",
            "execute_code",
            serde_json::json!({"code": "1 / 0"}),
        ),
        tool_response(
            "call_1",
            "execute_code",
            serde_json::json!({"code": "print('recovered')"}),
        ),
        text_response("<solution>Recovered from the failure.</solution>"),
    ]));

    let (outcome, _) = run_with(&mut session, provider, 10).await;
    let outcome = outcome.unwrap();

    assert_eq!(outcome.stop_reason, StopReason::Solution);
    assert_eq!(outcome.iterations, 3);

    let records = session.history().records();
    assert_eq!(records.len(), 2);
    assert!(!records[0].success);
    assert!(records[0].error.as_deref().unwrap().contains("ZeroDivisionError"));
    assert!(records[1].success);
    assert_eq!(records[1].stdout, "recovered\n");
}

#[tokio::test]
async fn iteration_cap_is_a_terminal_condition() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let mut session = start_session(&config).await;

    let provider = Arc::new(ScriptedProvider::repeating(
        tool_response(
            "call_n",
            "execute_code",
            serde_json::json!({"code": "x = 1"}),
        ),
        10,
    ));

    let (outcome, events) = run_with(&mut session, provider, 3).await;
    let outcome = outcome.unwrap();

    assert_eq!(outcome.stop_reason, StopReason::IterationLimit);
    assert_eq!(outcome.iterations, 3);
    // Exactly one fragment per generate step before the cap.
    assert_eq!(session.history().len(), 3);
    assert!(outcome.solution.unwrap().contains("Maximum iterations"));
    assert!(events.iter().any(
        |e| matches!(e, SessionEvent::Status { stage: RunStage::Completed })
    ));
}

#[tokio::test]
async fn unknown_tool_becomes_an_error_result() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let mut session = start_session(&config).await;

    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_response("call_0", "nonexistent_tool", serde_json::json!({})),
        text_response("<solution>Moving on.</solution>"),
    ]));

    let (outcome, _) = run_with(&mut session, provider, 10).await;
    let outcome = outcome.unwrap();

    assert_eq!(outcome.stop_reason, StopReason::Solution);
    match &outcome.transcript[2].data {
        MessageData::Tool { result, .. } => {
            assert!(result.is_error());
            assert!(result.llm_format().contains("Unknown tool"));
        }
        _ => panic!("expected an error tool result"),
    }
}

#[tokio::test]
async fn describe_dataset_surfaces_resolver_errors_as_text() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let mut session = start_session(&config).await;

    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_response(
            "call_0",
            "describe_dataset",
            serde_json::json!({"identifier": "sales"}),
        ),
        tool_response(
            "call_1",
            "describe_dataset",
            serde_json::json!({"identifier": "missing"}),
        ),
        text_response("<solution>Described.</solution>"),
    ]));

    let (outcome, _) = run_with(&mut session, provider, 10).await;
    let outcome = outcome.unwrap();

    let tool_texts: Vec<String> = outcome
        .transcript
        .iter()
        .filter_map(|m| match &m.data {
            MessageData::Tool { result, .. } => Some(result.llm_format()),
            _ => None,
        })
        .collect();
    assert_eq!(tool_texts.len(), 2);
    assert!(tool_texts[0].contains("Shape: 2 rows"));
    assert!(tool_texts[1].contains("not found"));
}

#[tokio::test]
async fn provider_failure_aborts_with_partial_history() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let mut session = start_session(&config).await;

    let (outcome, events) = run_with(&mut session, Arc::new(FailingProvider), 10).await;
    assert!(matches!(outcome, Err(Error::Api(_))));
    assert!(events.iter().any(
        |e| matches!(e, SessionEvent::Status { stage: RunStage::Failed })
    ));
    // The session and its history outlive the failed run.
    assert_eq!(session.history().len(), 0);
}

#[tokio::test]
async fn notebook_from_run_history_is_reproducible() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let mut session = start_session(&config).await;

    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_response(
            "call_0",
            "execute_code",
            serde_json::json!({"code": "print(df.head())"}),
        ),
        tool_response(
            "call_1",
            "execute_code",
            serde_json::json!({"code": "plt.bar(['north', 'south'], df.col('units'))\nplt.show()"}),
        ),
        text_response("<solution>Sales summarized.</solution>"),
    ]));

    let (outcome, _) = run_with(&mut session, provider, 10).await;
    let outcome = outcome.unwrap();

    let first = notebook::generate(
        session.history(),
        session.dataset_name(),
        "summarize units sold",
        outcome.solution.as_deref(),
    )
    .to_json_string()
    .unwrap();
    let second = notebook::generate(
        session.history(),
        session.dataset_name(),
        "summarize units sold",
        outcome.solution.as_deref(),
    )
    .to_json_string()
    .unwrap();
    assert_eq!(first, second);
    assert!(first.contains("image/svg+xml"));
}

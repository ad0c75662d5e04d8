//! The generate/execute state machine driving an analysis run.
//!
//! The model's output is pure input data to the transition function: a turn
//! either requests tool calls (which run strictly sequentially, in request
//! order) or terminates the run. Tool failures feed back into the transcript;
//! only provider-transport failures abort.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::Client;
use crate::conversation::{
    AssistantContent, Message, extract_plan, extract_solution, extract_think, has_solution_marker,
};
use crate::error::Error;
use crate::prompts;
use crate::session::{RunStage, Session, SessionEvent};
use crate::tools;
use datapilot_tools::result::ToolResult;
use datapilot_tools::tools::EXECUTE_CODE_TOOL_NAME;

const MAX_COMPLETION_ATTEMPTS: usize = 3;
const ITERATION_LIMIT_SOLUTION: &str =
    "Maximum iterations reached. Please review the work done so far.";

/// Why the loop reached its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The model emitted the solution marker.
    Solution,
    /// The model stopped requesting tools without a marker.
    NoToolCalls,
    /// The generate-step cap was hit; partial results are still returned.
    IterationLimit,
}

#[derive(Debug)]
pub struct AgentOutcome {
    pub solution: Option<String>,
    pub stop_reason: StopReason,
    pub transcript: Vec<Message>,
    pub iterations: u32,
}

#[derive(Debug, Clone)]
pub struct AgentRunRequest {
    pub goal: String,
    pub max_iterations: u32,
    pub planning_mode: bool,
}

#[derive(Clone)]
pub struct AgentExecutor {
    client: Client,
}

impl AgentExecutor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn run(
        &self,
        session: &mut Session,
        request: AgentRunRequest,
        event_tx: mpsc::Sender<SessionEvent>,
        token: CancellationToken,
    ) -> Result<AgentOutcome, Error> {
        let system_prompt = Some(prompts::system_prompt(
            session.bindings(),
            request.planning_mode,
        ));
        let available_tools = Some(tools::schemas());
        let mut messages = vec![Message::user(request.goal.clone())];
        let mut plan_seen = false;

        emit(&event_tx, SessionEvent::Status {
            stage: RunStage::Starting,
        })
        .await;
        emit(&event_tx, SessionEvent::Status {
            stage: RunStage::Running,
        })
        .await;

        for iteration in 1..=request.max_iterations {
            if token.is_cancelled() {
                info!("run cancelled before generate step");
                emit(&event_tx, SessionEvent::Status {
                    stage: RunStage::Failed,
                })
                .await;
                return Err(Error::Cancelled);
            }

            info!(
                target: "agent",
                iteration,
                max = request.max_iterations,
                "generate step"
            );

            let response = match self
                .client
                .complete_with_retry(
                    &messages,
                    &system_prompt,
                    &available_tools,
                    token.clone(),
                    MAX_COMPLETION_ATTEMPTS,
                )
                .await
            {
                Ok(response) => response,
                Err(err) => {
                    // Transport failures are the one fatal path; everything
                    // accumulated so far stays with the session.
                    emit(&event_tx, SessionEvent::Status {
                        stage: RunStage::Failed,
                    })
                    .await;
                    return Err(err.into());
                }
            };

            let parent = messages.last().map(|m| m.id().to_string());
            let assistant = Message::assistant(response.content.clone(), parent);
            messages.push(assistant);

            let text = response.extract_text();
            if !plan_seen {
                if let Some(plan) = extract_plan(&text) {
                    plan_seen = true;
                    emit(&event_tx, SessionEvent::Plan { content: plan }).await;
                }
            }
            if let Some(thinking) = extract_think(&text) {
                emit(&event_tx, SessionEvent::Thinking { content: thinking }).await;
            }

            let tool_calls = response.extract_tool_calls();

            if has_solution_marker(&text) || tool_calls.is_empty() {
                let stop_reason = if has_solution_marker(&text) {
                    StopReason::Solution
                } else {
                    StopReason::NoToolCalls
                };
                let solution =
                    extract_solution(&text).unwrap_or_else(|| text.trim().to_string());
                info!(target: "agent", iterations = iteration, ?stop_reason, "run finished");
                emit(&event_tx, SessionEvent::Solution {
                    content: solution.clone(),
                })
                .await;
                emit(&event_tx, SessionEvent::Status {
                    stage: RunStage::Completed,
                })
                .await;
                return Ok(AgentOutcome {
                    solution: Some(solution),
                    stop_reason,
                    transcript: messages,
                    iterations: iteration,
                });
            }

            debug!(target: "agent", count = tool_calls.len(), "executing tool calls");
            for call in tool_calls {
                emit(&event_tx, SessionEvent::ExecutingTool {
                    tool_call_id: call.id.clone(),
                    name: call.name.clone(),
                })
                .await;

                let result = tools::dispatch(session, &call).await;

                if call.name == EXECUTE_CODE_TOOL_NAME
                    && matches!(result, ToolResult::Execution(_))
                {
                    if let Some(record) = session.history().records().last() {
                        emit(&event_tx, SessionEvent::Code {
                            index: record.index,
                            code: record.code.clone(),
                            stdout: record.stdout.clone(),
                            error: record.error.clone(),
                            success: record.success,
                        })
                        .await;
                        for figure in &record.figures {
                            emit(&event_tx, SessionEvent::Figure {
                                sequence: figure.sequence,
                                record_index: figure.record_index,
                                svg: figure.svg.clone(),
                            })
                            .await;
                        }
                    }
                }

                let parent = messages.last().map(|m| m.id().to_string());
                messages.push(Message::tool(call.id.clone(), result, parent));
            }
        }

        warn!(
            target: "agent",
            max = request.max_iterations,
            "maximum iterations reached, ending run"
        );
        let parent = messages.last().map(|m| m.id().to_string());
        messages.push(Message::assistant(
            vec![AssistantContent::Text {
                text: format!("<solution>{ITERATION_LIMIT_SOLUTION}</solution>"),
            }],
            parent,
        ));
        emit(&event_tx, SessionEvent::Solution {
            content: ITERATION_LIMIT_SOLUTION.to_string(),
        })
        .await;
        emit(&event_tx, SessionEvent::Status {
            stage: RunStage::Completed,
        })
        .await;

        Ok(AgentOutcome {
            solution: Some(ITERATION_LIMIT_SOLUTION.to_string()),
            stop_reason: StopReason::IterationLimit,
            transcript: messages,
            iterations: request.max_iterations,
        })
    }
}

// A disconnected consumer must not kill the run; events are best-effort.
async fn emit(event_tx: &mpsc::Sender<SessionEvent>, event: SessionEvent) {
    if event_tx.send(event).await.is_err() {
        debug!(target: "agent", "event receiver dropped");
    }
}

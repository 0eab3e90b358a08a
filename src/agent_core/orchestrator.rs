//! Orchestrator — the design-to-theme state machine.
//!
//! Graph:
//! ```text
//! AwaitingModel ──tool calls──▶ AwaitingTools ──▶ AwaitingModel
//!       │
//!       ├──text + design source──▶ SynthesizingArtifact ──▶ Publishing ──▶ Done
//!       │                                  │
//!       └──otherwise─────────────▶ Done ◀──┘ (synthesis failed)
//! ```
//!
//! One run is a single flow of control over its own `ConversationState`.
//! Model, tool and publish calls are the only suspension points; each is
//! bounded by a timeout and aborted by the run's `CancellationToken`.
//!
//! Failures below the run boundary never escape: they become assistant or
//! tool-result messages, or a `PublishOutcome`.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::inference::types::{Role, ToolCall};
use crate::inference::InferenceError;
use crate::mcp_client::ToolDescriptor;

use super::conversation::ConversationState;
use super::errors::AgentError;
use super::executor::ToolExecutor;
use super::gateway::ModelGateway;
use super::publisher::{write_bundle, Publisher};
use super::routing::{route_after_model, Route};
use super::synthesizer::ArtifactSynthesizer;
use super::types::{Message, PublishOutcome, RunOutcome, RunState};

// ─── Configuration ──────────────────────────────────────────────────────────

/// Per-orchestrator settings. Shared by every run the orchestrator drives.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Upper bound on `AwaitingTools → AwaitingModel` cycles per run.
    pub max_tool_rounds: usize,
    /// Tool results longer than this are cut before reaching the model.
    pub max_tool_result_chars: usize,
    pub model_call_timeout: Duration,
    pub tool_call_timeout: Duration,
    /// Root the bundle is written under.
    pub artifact_dir: PathBuf,
    /// When false the bundle is written but the publish command is skipped.
    pub publish_enabled: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: 10,
            max_tool_result_chars: 20_000,
            model_call_timeout: Duration::from_secs(180),
            tool_call_timeout: Duration::from_secs(60),
            artifact_dir: PathBuf::from("theme"),
            publish_enabled: true,
        }
    }
}

// ─── Interrupts ─────────────────────────────────────────────────────────────

/// Why a guarded call did not complete.
#[derive(Debug, Clone, Copy)]
enum Interrupt {
    Cancelled,
    TimedOut(Duration),
}

impl Interrupt {
    fn describe(self, what: &str) -> String {
        match self {
            Interrupt::Cancelled => format!("The run was cancelled during the {what}."),
            Interrupt::TimedOut(limit) => {
                format!("The {what} timed out after {}s.", limit.as_secs())
            }
        }
    }
}

/// Await `fut` unless the token fires or the timeout elapses first.
async fn guarded<F: Future>(
    cancel: &CancellationToken,
    timeout: Duration,
    fut: F,
) -> Result<F::Output, Interrupt> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Interrupt::Cancelled),
        result = tokio::time::timeout(timeout, fut) => result.map_err(|_| Interrupt::TimedOut(timeout)),
    }
}

/// Cut `text` to at most `max` bytes on a char boundary, with a notice.
pub fn truncate_tool_result(text: &str, tool_name: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }

    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    tracing::warn!(
        tool = %tool_name,
        original_len = text.len(),
        truncated_to = cut,
        "tool result truncated"
    );
    format!(
        "{}\n\n[... truncated: showing first {cut} of {} chars]",
        &text[..cut],
        text.len()
    )
}

fn model_failure_message(err: &InferenceError) -> String {
    match err {
        InferenceError::EmptyResponse => {
            "The model returned an empty response, so there is nothing to act on.".to_string()
        }
        e if e.is_unavailable() => format!("The model is unavailable right now: {e}"),
        e => format!("The model reply could not be used: {e}"),
    }
}

// ─── Orchestrator ───────────────────────────────────────────────────────────

/// Drives conversations through the graph. Holds no per-run state, so one
/// orchestrator can run any number of conversations concurrently.
pub struct Orchestrator {
    gateway: Arc<dyn ModelGateway>,
    tools: Arc<dyn ToolExecutor>,
    publisher: Arc<dyn Publisher>,
    synthesizer: ArtifactSynthesizer,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        tools: Arc<dyn ToolExecutor>,
        publisher: Arc<dyn Publisher>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            synthesizer: ArtifactSynthesizer::new(Arc::clone(&gateway)),
            gateway,
            tools,
            publisher,
            config,
        }
    }

    /// Start a run from a single user message.
    pub async fn run_prompt(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, AgentError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(AgentError::EmptyPrompt);
        }
        Ok(self.run(ConversationState::new(prompt), cancel).await)
    }

    /// Drive `state` from `AwaitingModel` to `Done`.
    pub async fn run(&self, mut state: ConversationState, cancel: &CancellationToken) -> RunOutcome {
        // Discovered once; read-only for the rest of the run.
        let tools = self.tools.descriptors();
        let mut trace = Vec::new();
        let mut publish = None;
        let mut tool_rounds = 0usize;
        let mut node = RunState::AwaitingModel;

        tracing::info!(
            messages = state.messages().len(),
            tools = tools.len(),
            "=== RUN START ==="
        );

        loop {
            trace.push(node);
            if node == RunState::Done {
                break;
            }

            let next = if cancel.is_cancelled() {
                self.stop_on_cancel(&mut state, node);
                RunState::Done
            } else {
                match node {
                    RunState::AwaitingModel => self.call_model(&mut state, &tools, cancel).await,
                    RunState::AwaitingTools => {
                        if tool_rounds >= self.config.max_tool_rounds {
                            self.stop_on_round_limit(&mut state);
                            RunState::Done
                        } else {
                            tool_rounds += 1;
                            self.execute_tools(&mut state, cancel).await
                        }
                    }
                    RunState::SynthesizingArtifact => {
                        self.generate_artifact(&mut state, cancel).await
                    }
                    RunState::Publishing => {
                        publish = self.publish_artifact(&mut state, cancel).await;
                        RunState::Done
                    }
                    RunState::Done => RunState::Done,
                }
            };

            tracing::info!(from = %node, to = %next, "state transition");
            node = next;
        }

        tracing::info!(
            states = trace.len(),
            tool_rounds,
            files = state.bundle().len(),
            published = ?publish.as_ref().map(|p: &PublishOutcome| p.success),
            "=== RUN DONE ==="
        );

        RunOutcome {
            state,
            trace,
            publish,
        }
    }

    // ─── Nodes ───────────────────────────────────────────────────────────

    async fn call_model(
        &self,
        state: &mut ConversationState,
        tools: &[ToolDescriptor],
        cancel: &CancellationToken,
    ) -> RunState {
        let result = guarded(
            cancel,
            self.config.model_call_timeout,
            self.gateway.invoke(state, tools),
        )
        .await;

        let reply = match result {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "model call failed");
                state.push(Message::assistant(model_failure_message(&e)));
                return RunState::Done;
            }
            Err(interrupt) => {
                tracing::warn!(?interrupt, "model call interrupted");
                state.push(Message::assistant(interrupt.describe("model call")));
                return RunState::Done;
            }
        };

        tracing::info!(
            text_len = reply.content.len(),
            tool_calls = reply.tool_calls.len(),
            "model replied"
        );
        state.push(reply);

        match route_after_model(state) {
            Route::Tools => RunState::AwaitingTools,
            Route::Synthesize => RunState::SynthesizingArtifact,
            Route::Done => RunState::Done,
        }
    }

    /// Run every requested call in order, appending one result per call.
    async fn execute_tools(
        &self,
        state: &mut ConversationState,
        cancel: &CancellationToken,
    ) -> RunState {
        let calls = pending_tool_calls(state);

        for (index, call) in calls.iter().enumerate() {
            let result = guarded(
                cancel,
                self.config.tool_call_timeout,
                self.tools.execute(&call.name, call.arguments.clone()),
            )
            .await;

            let content = match result {
                Ok(Ok(outcome)) if outcome.success => {
                    tracing::info!(
                        tool = %call.name,
                        elapsed_ms = outcome.execution_time_ms,
                        "tool succeeded"
                    );
                    if outcome.output.trim().is_empty() {
                        "Tool returned no output.".to_string()
                    } else {
                        truncate_tool_result(
                            &outcome.output,
                            &call.name,
                            self.config.max_tool_result_chars,
                        )
                    }
                }
                Ok(Ok(outcome)) => {
                    tracing::warn!(tool = %call.name, output = %outcome.output, "tool reported failure");
                    let output = truncate_tool_result(
                        &outcome.output,
                        &call.name,
                        self.config.max_tool_result_chars,
                    );
                    format!("Tool '{}' failed: {output}", call.name)
                }
                Ok(Err(e)) => {
                    tracing::warn!(tool = %call.name, error = %e, "tool call failed");
                    format!("Tool '{}' failed: {e}", call.name)
                }
                Err(Interrupt::TimedOut(limit)) => {
                    tracing::warn!(tool = %call.name, timeout_secs = limit.as_secs(), "tool call timed out");
                    format!("Tool '{}' timed out after {}s.", call.name, limit.as_secs())
                }
                Err(Interrupt::Cancelled) => {
                    answer_unexecuted(state, &calls[index..], "not executed: the run was cancelled");
                    state.push(Message::assistant(Interrupt::Cancelled.describe("tool calls")));
                    return RunState::Done;
                }
            };

            state.push(Message::tool_result(call.id.clone(), content));
        }

        RunState::AwaitingModel
    }

    async fn generate_artifact(
        &self,
        state: &mut ConversationState,
        cancel: &CancellationToken,
    ) -> RunState {
        let source = state
            .latest_assistant()
            .map(|m| m.content.clone())
            .unwrap_or_default();

        let result = guarded(
            cancel,
            self.config.model_call_timeout,
            self.synthesizer.synthesize(&source),
        )
        .await;

        match result {
            Ok(Ok(bundle)) => {
                let count = bundle.len();
                state.set_bundle(bundle);
                state.push(Message::assistant(format!(
                    "Theme files generated successfully ({count} files)."
                )));
                RunState::Publishing
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "theme synthesis failed");
                state.push(Message::assistant(format!(
                    "Failed to generate theme files: {e}"
                )));
                RunState::Done
            }
            Err(interrupt) => {
                tracing::warn!(?interrupt, "theme synthesis interrupted");
                state.push(Message::assistant(interrupt.describe("theme synthesis")));
                RunState::Done
            }
        }
    }

    async fn publish_artifact(
        &self,
        state: &mut ConversationState,
        cancel: &CancellationToken,
    ) -> Option<PublishOutcome> {
        let dir = &self.config.artifact_dir;

        if !self.config.publish_enabled {
            let message = match write_bundle(state.bundle(), dir).await {
                Ok(_) => format!(
                    "Theme files written to {}. Publishing is disabled.",
                    dir.display()
                ),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to write theme files");
                    format!("Failed to write theme files: {e}")
                }
            };
            state.push(Message::assistant(message));
            return None;
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => PublishOutcome::failed("publish cancelled"),
            outcome = self.publisher.publish(state.bundle(), dir) => outcome,
        };

        state.push(Message::assistant(publish_summary(&outcome)));
        Some(outcome)
    }

    // ─── Early Stops ─────────────────────────────────────────────────────

    fn stop_on_cancel(&self, state: &mut ConversationState, node: RunState) {
        tracing::warn!(state = %node, "run cancelled");
        if node == RunState::AwaitingTools {
            let calls = pending_tool_calls(state);
            answer_unexecuted(state, &calls, "not executed: the run was cancelled");
        }
        state.push(Message::assistant("The run was cancelled."));
    }

    fn stop_on_round_limit(&self, state: &mut ConversationState) {
        tracing::warn!(max = self.config.max_tool_rounds, "tool round limit reached");
        let calls = pending_tool_calls(state);
        answer_unexecuted(state, &calls, "not executed: tool round limit reached");
        state.push(Message::assistant(format!(
            "Stopped after {} rounds of tool calls without a final answer.",
            self.config.max_tool_rounds
        )));
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

/// Tool calls of the last message, if it is an assistant turn.
fn pending_tool_calls(state: &ConversationState) -> Vec<ToolCall> {
    state
        .last()
        .filter(|m| m.role == Role::Assistant)
        .map(|m| m.tool_calls.clone())
        .unwrap_or_default()
}

/// Keep the one-result-per-call invariant for calls that will not run.
fn answer_unexecuted(state: &mut ConversationState, calls: &[ToolCall], reason: &str) {
    for call in calls {
        state.push(Message::tool_result(
            call.id.clone(),
            format!("Tool '{}' {reason}.", call.name),
        ));
    }
}

fn publish_summary(outcome: &PublishOutcome) -> String {
    let code = outcome
        .exit_code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "none".to_string());
    let output = outcome.captured_output();

    let mut summary = if outcome.success {
        format!("Theme published successfully (exit code {code}).")
    } else {
        format!("Theme publish failed (exit code {code}).")
    };
    if let Some(diagnostic) = &outcome.diagnostic {
        summary.push_str(&format!("\n{diagnostic}"));
    }
    if !output.is_empty() {
        summary.push_str(&format!("\n{output}"));
    }
    summary
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_result_unchanged() {
        assert_eq!(truncate_tool_result("abc", "t", 10), "abc");
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        // 'é' is two bytes; a cut at byte 3 would split the second one.
        let text = "aéé";
        let out = truncate_tool_result(text, "t", 4);
        assert!(out.starts_with("aé\n\n[... truncated"));
        assert!(out.contains("of 5 chars"));
    }

    #[test]
    fn test_publish_summary_failure_keeps_output() {
        let outcome = PublishOutcome {
            success: false,
            exit_code: Some(3),
            stdout: "out\n".into(),
            stderr: "err\n".into(),
            diagnostic: None,
        };
        let summary = publish_summary(&outcome);
        assert!(summary.starts_with("Theme publish failed (exit code 3)."));
        assert!(summary.ends_with("out\nerr"));
    }

    #[test]
    fn test_publish_summary_launch_failure() {
        let summary = publish_summary(&PublishOutcome::failed("failed to launch 'shopify'"));
        assert!(summary.contains("exit code none"));
        assert!(summary.contains("failed to launch 'shopify'"));
    }

    #[test]
    fn test_model_failure_messages() {
        assert!(model_failure_message(&InferenceError::EmptyResponse).contains("empty response"));
        let unavailable = InferenceError::ConnectionFailed {
            endpoint: "http://x".into(),
            reason: "refused".into(),
        };
        assert!(model_failure_message(&unavailable).contains("unavailable"));
    }

    #[tokio::test]
    async fn test_guarded_cancelled_first() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = guarded(&cancel, Duration::from_secs(5), async { 1 }).await;
        assert!(matches!(result, Err(Interrupt::Cancelled)));
    }

    #[tokio::test]
    async fn test_guarded_times_out() {
        let cancel = CancellationToken::new();
        let result = guarded(
            &cancel,
            Duration::from_millis(10),
            tokio::time::sleep(Duration::from_secs(5)),
        )
        .await;
        assert!(matches!(result, Err(Interrupt::TimedOut(_))));
    }
}

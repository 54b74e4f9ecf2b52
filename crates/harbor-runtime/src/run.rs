//! The run task behind a [`QueryHandle`](crate::QueryHandle).
//!
//! connect -> setup -> `session_started` -> turn loop -> `session_ended`,
//! then teardown on every path. Messages reach the caller through a bounded
//! channel in the order the CLI produced them.

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use harbor_core::{HarborError, Message, MessageId, SessionId, SetupStep};
use harbor_tools::{ToolRegistry, ToolResult};
use harbor_transport::{Credentials, SessionOptions, Transport};
use serde_json::{Map, json};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::extract::{ToolRequest, extract_tool_requests};
use crate::history::{CONTINUATION_PROMPT, History};
use crate::hooks::{ErrorSummary, RunOutcome, SandboxScope};
use crate::options::QueryOptions;
use crate::query::Shared;
use crate::setup::run_setup;
use crate::snapshot::{TeardownAction, teardown_action};
use crate::state::QueryState;

pub(crate) type Outbox = mpsc::Sender<Result<Message, HarborError>>;

enum RunEnd {
    Completed,
    Interrupted,
}

pub(crate) struct Run {
    prompt: String,
    options: QueryOptions,
    registry: ToolRegistry,
    transport: Arc<Transport>,
    shared: Arc<Shared>,
    tx: Outbox,
    delivered: usize,
    turns: u32,
}

impl Run {
    pub(crate) fn new(prompt: String, options: QueryOptions, shared: Arc<Shared>, tx: Outbox) -> Self {
        let registry = options.tools.iter().cloned().collect();
        let transport = Arc::new(Transport::new(Arc::clone(&options.provider)));
        Self {
            prompt,
            options,
            registry,
            transport,
            shared,
            tx,
            delivered: 0,
            turns: 0,
        }
    }

    fn cancelled(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Drive the run to completion, tear down, and report the outcome.
    #[instrument(skip_all, name = "query", fields(max_turns = self.options.max_turns, tools = self.registry.len()))]
    pub(crate) async fn execute(mut self) {
        let started = Instant::now();
        let result = self.drive().await;
        let (state, failure) = match result {
            Ok(RunEnd::Completed) => (QueryState::Completed, None),
            Ok(RunEnd::Interrupted) => (QueryState::Interrupted, None),
            Err(e) if e.is_abort() && self.cancelled() => (QueryState::Interrupted, None),
            Err(e) => (QueryState::Failed, Some(e)),
        };

        let outcome = RunOutcome {
            success: state == QueryState::Completed,
            error: failure.as_ref().map(ErrorSummary::from),
            duration: started.elapsed(),
            message_count: self.delivered,
        };
        self.teardown(&outcome).await;

        let state = self.shared.state.lock().advance(state);
        match &failure {
            Some(e) => error!(error = %e, code = e.code(), turns = self.turns, "query failed"),
            None => info!(
                state = %state,
                turns = self.turns,
                messages = self.delivered,
                duration_ms = u64::try_from(outcome.duration.as_millis()).unwrap_or(u64::MAX),
                "query finished"
            ),
        }
        if let Some(e) = failure {
            let _ = self.tx.send(Err(e)).await;
        }
    }

    async fn drive(&mut self) -> Result<RunEnd, HarborError> {
        let credentials = self.options.credentials.clone().or(Credentials::from_env());
        let session_id = self
            .transport
            .connect(credentials, self.options.connect.clone())
            .await?;
        *self.shared.session_id.lock() = Some(session_id.clone());

        if !self.setup().await? {
            return Ok(RunEnd::Interrupted);
        }

        let mut started = Map::new();
        let _ = started.insert("tools".into(), json!(self.registry.names()));
        let _ = started.insert("maxTurns".into(), json!(self.options.max_turns));
        if let Some(snapshot_id) = self.options.connect.snapshot_id() {
            let _ = started.insert("resumedFrom".into(), json!(snapshot_id));
        }
        if !self
            .emit(Message::system("session_started", session_id.clone(), started))
            .await
        {
            return Ok(RunEnd::Interrupted);
        }

        let mut history = History::new();
        history.push_user(self.prompt.as_str());

        while self.turns < self.options.max_turns {
            if self.cancelled() {
                return Ok(RunEnd::Interrupted);
            }
            self.turns += 1;
            let turn = self.turns;
            let outbound = if turn == 1 {
                self.prompt.clone()
            } else {
                history.to_prompt(CONTINUATION_PROMPT)
            };

            let Some(messages) = self.stream_turn(turn, &outbound, &session_id).await? else {
                return Ok(RunEnd::Interrupted);
            };
            let assistant_text = turn_text(&messages);
            let requests = if self.registry.is_empty() {
                Vec::new()
            } else {
                extract_tool_requests(&assistant_text)
            };
            if requests.is_empty() {
                debug!(turn, "no tool requests, final turn");
                break;
            }
            if turn >= self.options.max_turns {
                warn!(turn, pending = requests.len(), "turn budget exhausted with tool requests pending");
                break;
            }

            let Some(results) = self.until_cancelled(self.dispatch(&requests)).await else {
                debug!(turn, "interrupted while tools were running");
                return Ok(RunEnd::Interrupted);
            };
            history.push_assistant(assistant_text);
            history.push_user(format!("Tool results:\n\n{results}"));
        }

        let mut ended = Map::new();
        let _ = ended.insert("turns".into(), json!(self.turns));
        let _ = ended.insert("messageCount".into(), json!(self.delivered));
        if !self
            .emit(Message::system("session_ended", session_id, ended))
            .await
        {
            return Ok(RunEnd::Interrupted);
        }
        Ok(RunEnd::Completed)
    }

    /// Forward one message. `false` when the caller is gone or interrupted.
    async fn emit(&mut self, message: Message) -> bool {
        let sent = tokio::select! {
            biased;
            () = self.shared.cancel.cancelled() => false,
            sent = self.tx.send(Ok(message)) => sent.is_ok(),
        };
        if sent {
            self.delivered += 1;
        } else if !self.cancelled() {
            debug!("query handle dropped, interrupting run");
            self.shared.cancel.cancel();
        }
        sent
    }

    /// Await `work` unless the run is interrupted first.
    async fn until_cancelled<F: Future>(&self, work: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            () = self.shared.cancel.cancelled() => None,
            output = work => Some(output),
        }
    }

    /// Prepare the sandbox. `false` when interrupted.
    async fn setup(&self) -> Result<bool, HarborError> {
        let sandbox = self
            .transport
            .sandbox()
            .ok_or_else(|| HarborError::sandbox("sandbox released before setup"))?;
        let scope = SandboxScope::new(sandbox, self.options.connect.working_directory.as_str());

        let Some(result) = self.until_cancelled(self.apply_setup(&scope)).await else {
            debug!("interrupted during setup");
            return Ok(false);
        };
        if let Err(e) = &result {
            if let Some(hook) = &self.options.hooks.setup_error {
                let _ = self
                    .until_cancelled(hook.on_setup_error(&scope, &ErrorSummary::from(e)))
                    .await;
            }
        }
        result.map(|()| true)
    }

    async fn apply_setup(&self, scope: &SandboxScope) -> Result<(), HarborError> {
        run_setup(scope, &self.options.setup).await?;
        if let Some(hook) = &self.options.hooks.setup {
            hook.setup(scope).await.map_err(|e| HarborError::Setup {
                step: SetupStep::Hook,
                exit_code: -1,
                stderr: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Stream one CLI invocation to the caller. `None` when interrupted.
    #[instrument(skip_all, fields(turn = turn))]
    async fn stream_turn(
        &mut self,
        turn: u32,
        prompt: &str,
        session_id: &SessionId,
    ) -> Result<Option<Vec<Message>>, HarborError> {
        let options = SessionOptions {
            model: self.options.model.clone(),
            line_error_policy: self.options.line_error_policy,
            cancel: Some(self.shared.cancel.clone()),
            extra_args: self.options.extra_args.clone(),
        };
        let mut stream = self.transport.start_session(prompt, options);
        let mut messages = Vec::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(mut message) => {
                    ensure_identity(&mut message, session_id);
                    messages.push(message.clone());
                    if !self.emit(message).await {
                        return Ok(None);
                    }
                }
                Err(HarborError::Abort) if self.cancelled() => return Ok(None),
                Err(e) => return Err(e),
            }
        }
        debug!(turn, messages = messages.len(), "turn finished");
        Ok(Some(messages))
    }

    /// Run every request and render the results, in request order.
    async fn dispatch(&self, requests: &[ToolRequest]) -> String {
        let registry = &self.registry;
        let calls = requests.iter().map(move |request| async move {
            let result = registry.call(&request.tool, &request.input).await;
            info!(tool_name = %request.tool, is_error = result.is_error, "tool executed");
            (request.tool.as_str(), result)
        });

        let results: Vec<(&str, ToolResult)> = if self.options.parallel_tools {
            futures::future::join_all(calls).await
        } else {
            let mut results = Vec::with_capacity(requests.len());
            for call in calls {
                results.push(call.await);
            }
            results
        };

        results
            .iter()
            .map(|(name, result)| render_result(name, result))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    async fn teardown(&self, outcome: &RunOutcome) {
        if let Some(sandbox) = self.transport.sandbox() {
            if let Some(hook) = &self.options.hooks.teardown {
                let scope = SandboxScope::new(sandbox, self.options.connect.working_directory.as_str());
                if let Err(e) = hook.teardown(&scope, outcome).await {
                    warn!(error = %e, "teardown hook failed");
                }
            }
        }

        if !self.transport.is_connected() {
            if let Err(e) = self.transport.close().await {
                warn!(error = %e, "failed to close transport");
            }
            return;
        }

        match teardown_action(self.options.snapshot.as_ref(), self.options.auto_snapshot, outcome.success) {
            TeardownAction::Snapshot => match self.transport.create_snapshot().await {
                Ok(record) => self.shared.record_snapshot(record),
                Err(e) => {
                    error!(error = %e, "automatic snapshot failed");
                    if let Err(e) = self.transport.close().await {
                        warn!(error = %e, "failed to close transport");
                    }
                }
            },
            TeardownAction::Close => {
                if let Err(e) = self.transport.close().await {
                    warn!(error = %e, "failed to close transport");
                }
            }
            TeardownAction::Keep => {
                info!("keeping sandbox for an on-demand snapshot");
                *self.shared.kept.lock() = Some(Arc::clone(&self.transport));
            }
        }
    }
}

fn ensure_identity(message: &mut Message, session_id: &SessionId) {
    let base = message.base_mut();
    if base.uuid.is_empty() {
        base.uuid = MessageId::new();
    }
    if base.session_id.is_empty() {
        base.session_id = session_id.clone();
    }
}

/// Assistant text of one turn, falling back to the `result` text.
fn turn_text(messages: &[Message]) -> String {
    let text = messages
        .iter()
        .filter_map(Message::assistant_text)
        .filter(|t| !t.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    if !text.is_empty() {
        return text;
    }
    messages
        .iter()
        .rev()
        .find_map(Message::result_text)
        .unwrap_or_default()
        .to_owned()
}

fn render_result(name: &str, result: &ToolResult) -> String {
    let label = if result.is_error { "Error" } else { "Result" };
    let body = match result.text() {
        text if text.is_empty() => serde_json::to_string(&result.content).unwrap_or_default(),
        text => text,
    };
    format!("Tool: {name}\n{label}: {body}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use harbor_core::content::{ApiMessage, ContentBlock, MessageContent};
    use harbor_core::messages::ConversationMessage;
    use harbor_core::MessageBase;
    use harbor_tools::{error_result, text_result};

    fn assistant(text: &str) -> Message {
        let mut body = ApiMessage::empty("assistant");
        body.content = MessageContent::Blocks(vec![ContentBlock::text(text)]);
        Message::Assistant(ConversationMessage {
            base: MessageBase::new(SessionId::from("s")),
            message: body,
            extra: Map::new(),
        })
    }

    fn result(text: &str) -> Message {
        serde_json::from_value(json!({
            "type": "result",
            "subtype": "success",
            "uuid": "u",
            "session_id": "s",
            "result": text,
        }))
        .unwrap()
    }

    #[test]
    fn turn_text_prefers_assistant_messages() {
        let messages = vec![assistant("one"), assistant(" "), assistant("two"), result("final")];
        assert_eq!(turn_text(&messages), "one\ntwo");
    }

    #[test]
    fn turn_text_falls_back_to_result() {
        assert_eq!(turn_text(&[result("final")]), "final");
        assert_eq!(turn_text(&[]), "");
    }

    #[test]
    fn identity_gaps_are_filled() {
        let mut message = result("x");
        message.base_mut().uuid = MessageId::from("");
        message.base_mut().session_id = SessionId::from("");
        ensure_identity(&mut message, &SessionId::from("run"));
        assert_eq!(message.uuid().len(), 36);
        assert_eq!(message.session_id().as_str(), "run");

        let mut intact = result("x");
        ensure_identity(&mut intact, &SessionId::from("run"));
        assert_eq!(intact.session_id().as_str(), "s");
    }

    #[test]
    fn results_render_with_labels() {
        assert_eq!(render_result("add", &text_result("3")), "Tool: add\nResult: 3");
        assert_eq!(
            render_result("nope", &error_result("Unknown tool: nope")),
            "Tool: nope\nError: Unknown tool: nope"
        );
    }
}

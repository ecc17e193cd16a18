use crate::agent::{AgentConfig, AgentProgressEvent, TurnError, TurnOutcome, run_turn};
use crate::catalog::CatalogTools;
use crate::llm::provider::{AssistantMessage, AssistantPart, AssistantRole, LlmProvider};
use crate::llm::retry::RetryPolicy;
use crate::trace::SessionTrace;

/// One transcript entry. The transcript keeps the exact messages exchanged
/// with the model, function calls and responses included.
pub type Turn = AssistantMessage;

/// A conversation with the sales assistant.
///
/// The transcript is append-only. A turn is committed as a whole when the
/// model produces an answer; a failed turn leaves it untouched.
pub struct ChatSession<P, C> {
    provider: P,
    catalog: C,
    transcript: Vec<Turn>,
    agent_config: AgentConfig,
    retry_policy: RetryPolicy,
    trace: Option<SessionTrace>,
}

impl<P: LlmProvider + Sync, C: CatalogTools> ChatSession<P, C> {
    pub fn new(provider: P, catalog: C) -> Self {
        Self {
            provider,
            catalog,
            transcript: Vec::new(),
            agent_config: AgentConfig::default(),
            retry_policy: RetryPolicy::default(),
            trace: None,
        }
    }

    pub fn with_agent_config(mut self, agent_config: AgentConfig) -> Self {
        self.agent_config = agent_config;
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_trace(mut self, trace: SessionTrace) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn transcript(&self) -> &[Turn] {
        &self.transcript
    }

    /// Records a user utterance without asking the model. Useful to seed
    /// context that the next turn should see.
    pub fn append_user_utterance(&mut self, text: &str) {
        if let Some(trace) = &self.trace {
            trace.log_user(text);
        }
        self.transcript.push(AssistantMessage::user_text(text));
    }

    pub async fn send_and_get_response(&mut self, text: &str) -> Result<String, TurnError> {
        self.send_with_events(text, &mut |_| {})
            .await
            .map(|outcome| outcome.answer)
    }

    /// Runs one turn, reporting loop progress to `on_event` as it happens.
    pub async fn send_with_events<F>(
        &mut self,
        text: &str,
        on_event: &mut F,
    ) -> Result<TurnOutcome, TurnError>
    where
        F: FnMut(AgentProgressEvent),
    {
        let trace = self.trace.clone();
        if let Some(trace) = &trace {
            trace.log_user(text);
        }

        let result = run_turn(
            &self.provider,
            &self.catalog,
            &self.transcript,
            text,
            &self.agent_config,
            &self.retry_policy,
            &mut |event| {
                if let Some(trace) = &trace {
                    trace_event(trace, &event);
                }
                on_event(event);
            },
        )
        .await;

        match result {
            Ok(outcome) => {
                if let Some(trace) = &trace {
                    trace.log_model(&outcome.answer);
                }
                self.transcript.extend(outcome.new_turns.iter().cloned());
                Ok(outcome)
            }
            Err(err) => {
                if let Some(trace) = &trace {
                    trace.log_turn_error(&err.to_string());
                }
                Err(err)
            }
        }
    }

    /// Ordered (role, text) pairs for presentation. Function traffic is
    /// summarized on one line per call or response.
    pub fn display_transcript(&self) -> Vec<(&'static str, String)> {
        self.transcript
            .iter()
            .map(|turn| (display_role(turn.role), display_text(turn)))
            .collect()
    }
}

/// Presentation label for a transcript role: `model` is shown as
/// `assistant`, every other role keeps its own name.
pub fn display_role(role: AssistantRole) -> &'static str {
    match role {
        AssistantRole::Model => "assistant",
        other => other.as_str(),
    }
}

fn display_text(turn: &Turn) -> String {
    turn.parts
        .iter()
        .filter_map(|part| match part {
            AssistantPart::Text { text } => {
                let text = text.trim();
                (!text.is_empty()).then(|| text.to_string())
            }
            AssistantPart::FunctionCall {
                name, args_json, ..
            } => Some(format!("-> {name}({args_json})")),
            AssistantPart::FunctionResponse {
                name,
                response_json,
                ..
            } => Some(format!("<- {name}: {}", response_summary(response_json))),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn response_summary(response_json: &serde_json::Value) -> String {
    if response_json["ok"].as_bool() == Some(true) {
        return "ok".to_string();
    }
    let code = response_json["error"]["code"].as_str().unwrap_or("error");
    let message = response_json["error"]["message"].as_str().unwrap_or("");
    format!("{code} {message}").trim_end().to_string()
}

fn trace_event(trace: &SessionTrace, event: &AgentProgressEvent) {
    match event {
        AgentProgressEvent::ToolRequest {
            name, args_json, ..
        } => trace.log_tool_call(name, &args_json.to_string()),
        AgentProgressEvent::ToolResult {
            name,
            response_json,
            ..
        } => trace.log_tool_result(name, &response_json.to_string()),
        AgentProgressEvent::Retrying {
            step,
            attempt,
            delay,
            error,
        } => trace.log_retry(&format!(
            "step={step} attempt={attempt} delay_ms={} error={error}",
            delay.as_millis()
        )),
        AgentProgressEvent::StepStarted { .. } | AgentProgressEvent::ModelResponse { .. } => {}
    }
}

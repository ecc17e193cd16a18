use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::time::timeout;

use crate::agent::dispatch::{FunctionCallSpec, dispatch_calls, tool_declarations};
use crate::agent::prompt::SALES_SYSTEM_INSTRUCTION;
use crate::catalog::CatalogTools;
use crate::llm::provider::{
    AssistantCandidate, AssistantInput, AssistantMessage, AssistantOutput, AssistantPart,
    AssistantRole, LlmError, LlmProvider, LlmResult, ToolCallingMode,
};
use crate::llm::retry::{RetryPolicy, generate_with_retry};

const REPAIR_PROMPT: &str = "Your previous response was empty or invalid. Either call one of the declared functions or reply to the customer with a non-empty plain-text answer.";
const FINALIZE_SUFFIX: &str = "The database lookup budget for this question is used up. Do not call functions. Give the best short answer you can from the information already gathered.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentConfig {
    /// Model calls allowed per turn before the tools are switched off.
    pub max_steps: usize,
    pub request_timeout_ms: u64,
    pub invalid_response_retries: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 10,
            request_timeout_ms: 60_000,
            invalid_response_retries: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AgentProgressEvent {
    StepStarted {
        step: usize,
    },
    ModelResponse {
        step: usize,
        tool_calls: usize,
        has_text: bool,
    },
    ToolRequest {
        step: usize,
        id: Option<String>,
        name: String,
        args_json: Value,
    },
    ToolResult {
        step: usize,
        id: Option<String>,
        name: String,
        response_json: Value,
    },
    Retrying {
        step: usize,
        attempt: u32,
        delay: Duration,
        error: LlmError,
    },
}

/// Everything one successful turn adds to the transcript, in order:
/// the user utterance, any function call / response pairs, the answer.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub answer: String,
    pub new_turns: Vec<AssistantMessage>,
    /// The answer was produced with tools disabled after the step limit.
    pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TurnError {
    #[error("assistant request failed: {0}")]
    Model(#[from] LlmError),
    #[error("assistant returned an invalid response repeatedly")]
    InvalidResponse,
    #[error("assistant reached the limit of {0} steps without an answer")]
    StepLimit(usize),
}

/// Drives one user utterance through the tool-calling loop.
///
/// `history` is only read. Nothing is committed anywhere: on success the
/// caller receives the new turns, on failure it receives only the error.
pub async fn run_turn<P, C, F>(
    provider: &P,
    catalog: &C,
    history: &[AssistantMessage],
    utterance: &str,
    config: &AgentConfig,
    retry: &RetryPolicy,
    on_event: &mut F,
) -> Result<TurnOutcome, TurnError>
where
    P: LlmProvider + Sync,
    C: CatalogTools,
    F: FnMut(AgentProgressEvent),
{
    let provider = TimedProvider {
        inner: provider,
        budget: Duration::from_millis(config.request_timeout_ms),
    };
    let tools = tool_declarations();
    let mut pending = vec![AssistantMessage::user_text(utterance)];
    let mut repair: Option<AssistantMessage> = None;
    let mut invalid_response_attempts = 0usize;

    for step in 1..=config.max_steps {
        on_event(AgentProgressEvent::StepStarted { step });

        let mut messages = [history, pending.as_slice()].concat();
        messages.extend(repair.take());
        let input = AssistantInput {
            system_instruction: Some(SALES_SYSTEM_INSTRUCTION.to_string()),
            messages,
            tools: tools.clone(),
            tool_calling_mode: ToolCallingMode::Auto,
        };
        let output = generate_with_retry(&provider, &input, retry, &mut |notice| {
            on_event(AgentProgressEvent::Retrying {
                step,
                attempt: notice.attempt,
                delay: notice.delay,
                error: notice.error,
            })
        })
        .await?;

        let message = select_candidate(&output.candidates).map(|candidate| &candidate.message);
        let calls = message.map(extract_function_calls).unwrap_or_default();
        let text = message.map(AssistantMessage::text).unwrap_or_default();
        on_event(AgentProgressEvent::ModelResponse {
            step,
            tool_calls: calls.len(),
            has_text: !text.is_empty(),
        });

        let Some(message) = message.filter(|_| !calls.is_empty() || !text.is_empty()) else {
            if invalid_response_attempts >= config.invalid_response_retries {
                return Err(TurnError::InvalidResponse);
            }
            invalid_response_attempts += 1;
            repair = Some(AssistantMessage::user_text(REPAIR_PROMPT));
            continue;
        };

        pending.push(message.clone());
        if calls.is_empty() {
            return Ok(TurnOutcome {
                answer: text,
                new_turns: pending,
                degraded: false,
            });
        }

        for call in &calls {
            on_event(AgentProgressEvent::ToolRequest {
                step,
                id: call.id.clone(),
                name: call.name.clone(),
                args_json: call.args_json.clone(),
            });
        }
        let responses = dispatch_calls(catalog, &calls);
        for response in &responses {
            if let AssistantPart::FunctionResponse {
                id,
                name,
                response_json,
            } = response
            {
                on_event(AgentProgressEvent::ToolResult {
                    step,
                    id: id.clone(),
                    name: name.clone(),
                    response_json: response_json.clone(),
                });
            }
        }
        pending.push(AssistantMessage {
            role: AssistantRole::Function,
            parts: responses,
        });
    }

    let answer = finalize_without_tools(&provider, history, &pending, retry).await?;
    let Some(answer) = answer else {
        return Err(TurnError::StepLimit(config.max_steps));
    };
    pending.push(AssistantMessage::model_text(answer.clone()));
    Ok(TurnOutcome {
        answer,
        new_turns: pending,
        degraded: true,
    })
}

async fn finalize_without_tools<P: LlmProvider>(
    provider: &P,
    history: &[AssistantMessage],
    pending: &[AssistantMessage],
    retry: &RetryPolicy,
) -> LlmResult<Option<String>> {
    let input = AssistantInput {
        system_instruction: Some(format!("{SALES_SYSTEM_INSTRUCTION}\n\n{FINALIZE_SUFFIX}")),
        messages: [history, pending].concat(),
        // The history holds function calls, so the declarations stay and
        // calling is switched off through the mode.
        tools: tool_declarations(),
        tool_calling_mode: ToolCallingMode::None,
    };
    let output = generate_with_retry(provider, &input, retry, &mut |_| {}).await?;

    Ok(select_candidate(&output.candidates)
        .map(|candidate| candidate.message.text())
        .filter(|text| !text.is_empty()))
}

struct TimedProvider<'a, P> {
    inner: &'a P,
    budget: Duration,
}

impl<P: LlmProvider + Sync> LlmProvider for TimedProvider<'_, P> {
    async fn generate(&self, input: AssistantInput) -> LlmResult<AssistantOutput> {
        timeout(self.budget, self.inner.generate(input))
            .await
            .map_err(|_| LlmError::Timeout(self.budget.as_millis() as u64))?
    }
}

fn select_candidate(candidates: &[AssistantCandidate]) -> Option<&AssistantCandidate> {
    let usable = || candidates.iter().filter(|candidate| is_usable_candidate(candidate));

    usable()
        .find(|candidate| {
            !candidate.message.has_function_calls() && !candidate.message.text().is_empty()
        })
        .or_else(|| usable().find(|candidate| candidate.message.has_function_calls()))
        .or_else(|| usable().next())
}

fn is_usable_candidate(candidate: &AssistantCandidate) -> bool {
    !candidate.safety_blocked
        && !candidate.message.parts.is_empty()
        && !matches!(
            candidate.finish_reason.as_deref(),
            Some("SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII")
        )
}

fn extract_function_calls(message: &AssistantMessage) -> Vec<FunctionCallSpec> {
    message
        .parts
        .iter()
        .filter_map(|part| match part {
            AssistantPart::FunctionCall {
                id,
                name,
                args_json,
                ..
            } => Some(FunctionCallSpec {
                id: id.clone(),
                name: name.clone(),
                args_json: args_json.clone(),
            }),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use serde_json::{Value, json};

    use super::{AgentConfig, AgentProgressEvent, TurnError, run_turn, select_candidate};
    use crate::catalog::{CatalogTools, ColumnInfo, QueryRows, StoreError, StoreResult};
    use crate::llm::provider::{
        AssistantCandidate, AssistantInput, AssistantMessage, AssistantOutput, AssistantPart,
        AssistantRole, LlmError, LlmProvider, ToolCallingMode,
    };
    use crate::llm::retry::RetryPolicy;

    struct FakeProvider {
        responses: Mutex<VecDeque<Result<AssistantOutput, LlmError>>>,
        seen_inputs: Mutex<Vec<AssistantInput>>,
    }

    impl FakeProvider {
        fn new(responses: Vec<Result<AssistantOutput, LlmError>>) -> Self {
            Self {
                responses: Mutex::new(VecDeque::from(responses)),
                seen_inputs: Mutex::new(Vec::new()),
            }
        }

        fn seen(&self) -> Vec<AssistantInput> {
            self.seen_inputs.lock().expect("lock").clone()
        }
    }

    impl LlmProvider for FakeProvider {
        async fn generate(&self, input: AssistantInput) -> Result<AssistantOutput, LlmError> {
            self.seen_inputs.lock().expect("lock").push(input);
            self.responses
                .lock()
                .expect("lock")
                .pop_front()
                .expect("queued response")
        }
    }

    struct FixtureCatalog {
        queries: Mutex<Vec<String>>,
    }

    impl FixtureCatalog {
        fn new() -> Self {
            Self {
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    impl CatalogTools for FixtureCatalog {
        fn list_tables(&self) -> StoreResult<Vec<String>> {
            Ok(vec!["paket_ioh".to_string()])
        }

        fn describe_table(&self, _table_name: &str) -> StoreResult<Vec<ColumnInfo>> {
            Ok(vec![ColumnInfo {
                name: "nama_paket".to_string(),
                column_type: "TEXT".to_string(),
            }])
        }

        fn execute_query(&self, sql: &str) -> StoreResult<QueryRows> {
            self.queries.lock().expect("lock").push(sql.to_string());
            if sql.contains("harga") {
                Ok(QueryRows {
                    columns: vec!["nama_paket".to_string(), "harga".to_string()],
                    rows: vec![vec![json!("Freedom Internet 5GB"), json!(25000)]],
                })
            } else {
                Err(StoreError::Query("no such column: price".to_string()))
            }
        }
    }

    fn reply(parts: Vec<AssistantPart>) -> Result<AssistantOutput, LlmError> {
        Ok(AssistantOutput {
            candidates: vec![AssistantCandidate {
                message: AssistantMessage {
                    role: AssistantRole::Model,
                    parts,
                },
                finish_reason: Some("STOP".to_string()),
                safety_blocked: false,
            }],
        })
    }

    fn text(text: &str) -> AssistantPart {
        AssistantPart::Text {
            text: text.to_string(),
        }
    }

    fn call(name: &str, args_json: Value) -> AssistantPart {
        AssistantPart::FunctionCall {
            id: None,
            name: name.to_string(),
            args_json,
            thought_signature: None,
        }
    }

    fn no_wait() -> RetryPolicy {
        RetryPolicy {
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            ..RetryPolicy::default()
        }
    }

    #[tokio::test]
    async fn direct_answer_adds_user_and_model_turns() {
        let provider = FakeProvider::new(vec![reply(vec![text("Halo kak! Mau cari paket apa?")])]);
        let outcome = run_turn(
            &provider,
            &FixtureCatalog::new(),
            &[],
            "halo",
            &AgentConfig::default(),
            &no_wait(),
            &mut |_| {},
        )
        .await
        .expect("answer");

        assert_eq!(outcome.answer, "Halo kak! Mau cari paket apa?");
        assert!(!outcome.degraded);
        assert_eq!(outcome.new_turns.len(), 2);
        assert_eq!(outcome.new_turns[0], AssistantMessage::user_text("halo"));
        assert_eq!(outcome.new_turns[1].role, AssistantRole::Model);
    }

    #[tokio::test]
    async fn cheapest_data_package_scenario_chains_three_tools() {
        let sql = "SELECT nama_paket, harga FROM paket_ioh WHERE data > 0 ORDER BY harga ASC LIMIT 1";
        let provider = FakeProvider::new(vec![
            reply(vec![call("list_tables", json!({}))]),
            reply(vec![call("describe_table", json!({"table_name": "paket_ioh"}))]),
            reply(vec![call("execute_query", json!({"sql": sql}))]),
            reply(vec![text(
                "Paket data termurah itu Freedom Internet 5GB, cuma Rp25.000 kak!",
            )]),
        ]);
        let catalog = FixtureCatalog::new();
        let mut events = Vec::new();

        let outcome = run_turn(
            &provider,
            &catalog,
            &[],
            "paket data termurah apa?",
            &AgentConfig::default(),
            &no_wait(),
            &mut |event| events.push(event),
        )
        .await
        .expect("answer");

        assert!(outcome.answer.contains("Freedom Internet 5GB"));
        assert!(outcome.answer.contains("25.000"));
        // user + 3 x (call, response) + answer
        assert_eq!(outcome.new_turns.len(), 8);
        assert_eq!(outcome.new_turns[2].role, AssistantRole::Function);
        assert_eq!(*catalog.queries.lock().expect("lock"), vec![sql.to_string()]);

        let requested = events
            .iter()
            .filter_map(|event| match event {
                AgentProgressEvent::ToolRequest { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(requested, vec!["list_tables", "describe_table", "execute_query"]);

        let inputs = provider.seen();
        assert_eq!(inputs.len(), 4);
        assert_eq!(inputs[3].messages.len(), 7);
        assert!(
            inputs
                .iter()
                .all(|input| input.tools.len() == 3 && input.system_instruction.is_some())
        );
    }

    #[tokio::test]
    async fn query_error_is_fed_back_so_the_model_can_correct_itself() {
        let provider = FakeProvider::new(vec![
            reply(vec![call("execute_query", json!({"sql": "SELECT price FROM paket_ioh"}))]),
            reply(vec![call(
                "execute_query",
                json!({"sql": "SELECT nama_paket, harga FROM paket_ioh"}),
            )]),
            reply(vec![text("Ada Freedom Internet 5GB kak")]),
        ]);

        let outcome = run_turn(
            &provider,
            &FixtureCatalog::new(),
            &[],
            "harga paket?",
            &AgentConfig::default(),
            &no_wait(),
            &mut |_| {},
        )
        .await
        .expect("answer");

        assert_eq!(outcome.answer, "Ada Freedom Internet 5GB kak");
        let AssistantPart::FunctionResponse { response_json, .. } = &outcome.new_turns[2].parts[0]
        else {
            panic!("expected function response");
        };
        assert_eq!(response_json["error"]["code"], json!("query_error"));
    }

    #[tokio::test]
    async fn history_is_sent_before_the_new_utterance() {
        let history = vec![
            AssistantMessage::user_text("halo"),
            AssistantMessage::model_text("Halo kak!"),
        ];
        let provider = FakeProvider::new(vec![reply(vec![text("Siap kak")])]);

        run_turn(
            &provider,
            &FixtureCatalog::new(),
            &history,
            "budget 50rb",
            &AgentConfig::default(),
            &no_wait(),
            &mut |_| {},
        )
        .await
        .expect("answer");

        let inputs = provider.seen();
        assert_eq!(inputs[0].messages[..2], history[..]);
        assert_eq!(inputs[0].messages[2], AssistantMessage::user_text("budget 50rb"));
    }

    #[tokio::test]
    async fn transient_errors_are_retried_inside_the_turn() {
        let provider = FakeProvider::new(vec![
            Err(LlmError::HttpStatus {
                status: 429,
                body: "quota".to_string(),
            }),
            reply(vec![text("Halo kak")]),
        ]);
        let mut retries = 0;

        let outcome = run_turn(
            &provider,
            &FixtureCatalog::new(),
            &[],
            "halo",
            &AgentConfig::default(),
            &no_wait(),
            &mut |event| {
                if matches!(event, AgentProgressEvent::Retrying { .. }) {
                    retries += 1;
                }
            },
        )
        .await
        .expect("answer after retry");

        assert_eq!(outcome.answer, "Halo kak");
        assert_eq!(retries, 1);
    }

    #[tokio::test]
    async fn fatal_errors_abort_the_turn() {
        let provider = FakeProvider::new(vec![Err(LlmError::HttpStatus {
            status: 403,
            body: "PERMISSION_DENIED".to_string(),
        })]);

        let err = run_turn(
            &provider,
            &FixtureCatalog::new(),
            &[],
            "halo",
            &AgentConfig::default(),
            &no_wait(),
            &mut |_| {},
        )
        .await
        .expect_err("fatal");

        assert!(matches!(
            err,
            TurnError::Model(LlmError::HttpStatus { status: 403, .. })
        ));
    }

    #[tokio::test]
    async fn empty_response_gets_one_repair_prompt() {
        let provider = FakeProvider::new(vec![
            reply(vec![text("  ")]),
            reply(vec![text("Maaf kak, mau paket apa?")]),
        ]);

        let outcome = run_turn(
            &provider,
            &FixtureCatalog::new(),
            &[],
            "halo",
            &AgentConfig::default(),
            &no_wait(),
            &mut |_| {},
        )
        .await
        .expect("recovered");

        assert_eq!(outcome.answer, "Maaf kak, mau paket apa?");
        assert_eq!(outcome.new_turns.len(), 2, "repair prompt stays out of the transcript");
        let inputs = provider.seen();
        assert_eq!(inputs[1].messages.len(), 2);
        assert!(inputs[1].messages[1].text().contains("previous response"));
    }

    #[tokio::test]
    async fn repeated_empty_responses_fail_the_turn() {
        let provider = FakeProvider::new(vec![reply(vec![]), reply(vec![])]);

        let err = run_turn(
            &provider,
            &FixtureCatalog::new(),
            &[],
            "halo",
            &AgentConfig::default(),
            &no_wait(),
            &mut |_| {},
        )
        .await
        .expect_err("invalid");

        assert_eq!(err, TurnError::InvalidResponse);
    }

    #[tokio::test]
    async fn step_limit_falls_back_to_a_tools_disabled_answer() {
        let provider = FakeProvider::new(vec![
            reply(vec![call("list_tables", json!({}))]),
            reply(vec![call("list_tables", json!({}))]),
            reply(vec![text("Paket yang ada ada di tabel paket_ioh kak")]),
        ]);
        let config = AgentConfig {
            max_steps: 2,
            ..AgentConfig::default()
        };

        let outcome = run_turn(
            &provider,
            &FixtureCatalog::new(),
            &[],
            "list semua",
            &config,
            &no_wait(),
            &mut |_| {},
        )
        .await
        .expect("fallback answer");

        assert!(outcome.degraded);
        assert_eq!(outcome.answer, "Paket yang ada ada di tabel paket_ioh kak");
        let last = provider.seen().pop().expect("last input");
        assert_eq!(last.tools.len(), 3);
        assert_eq!(last.tool_calling_mode, ToolCallingMode::None);
    }

    #[tokio::test]
    async fn step_limit_without_fallback_text_is_an_error() {
        let provider = FakeProvider::new(vec![
            reply(vec![call("list_tables", json!({}))]),
            reply(vec![]),
        ]);
        let config = AgentConfig {
            max_steps: 1,
            ..AgentConfig::default()
        };

        let err = run_turn(
            &provider,
            &FixtureCatalog::new(),
            &[],
            "list semua",
            &config,
            &no_wait(),
            &mut |_| {},
        )
        .await
        .expect_err("step limit");

        assert_eq!(err, TurnError::StepLimit(1));
    }

    #[tokio::test]
    async fn slow_provider_times_out_as_transient_error() {
        struct SlowProvider;

        impl LlmProvider for SlowProvider {
            async fn generate(&self, _input: AssistantInput) -> Result<AssistantOutput, LlmError> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Err(LlmError::EmptyResponse)
            }
        }

        let config = AgentConfig {
            request_timeout_ms: 10,
            ..AgentConfig::default()
        };
        let err = run_turn(
            &SlowProvider,
            &FixtureCatalog::new(),
            &[],
            "halo",
            &config,
            &RetryPolicy::no_retry(),
            &mut |_| {},
        )
        .await
        .expect_err("timeout");

        assert_eq!(err, TurnError::Model(LlmError::Timeout(10)));
    }

    #[test]
    fn select_candidate_prefers_final_text_over_tool_call() {
        let candidates = vec![
            AssistantCandidate {
                message: AssistantMessage {
                    role: AssistantRole::Model,
                    parts: vec![call("list_tables", json!({}))],
                },
                finish_reason: Some("STOP".to_string()),
                safety_blocked: false,
            },
            AssistantCandidate {
                message: AssistantMessage::model_text("final answer"),
                finish_reason: Some("STOP".to_string()),
                safety_blocked: false,
            },
        ];

        let selected = select_candidate(&candidates).expect("selected candidate");
        assert_eq!(selected.message.text(), "final answer");
    }

    #[test]
    fn select_candidate_skips_safety_blocked() {
        let candidates = vec![
            AssistantCandidate {
                message: AssistantMessage::model_text("blocked"),
                finish_reason: Some("SAFETY".to_string()),
                safety_blocked: true,
            },
            AssistantCandidate {
                message: AssistantMessage::model_text("usable"),
                finish_reason: Some("STOP".to_string()),
                safety_blocked: false,
            },
        ];

        let selected = select_candidate(&candidates).expect("selected candidate");
        assert_eq!(selected.message.text(), "usable");
    }
}

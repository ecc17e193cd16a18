use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssistantRole {
    User,
    Model,
    /// Carries function responses back to the model.
    Function,
}

impl AssistantRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
            Self::Function => "function",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssistantPart {
    Text {
        text: String,
    },
    FunctionCall {
        id: Option<String>,
        name: String,
        args_json: Value,
        /// Opaque reasoning token some models attach to a call. It has to be
        /// sent back unchanged with the rest of the history.
        thought_signature: Option<String>,
    },
    FunctionResponse {
        id: Option<String>,
        name: String,
        response_json: Value,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssistantMessage {
    pub role: AssistantRole,
    pub parts: Vec<AssistantPart>,
}

impl AssistantMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: AssistantRole::User,
            parts: vec![AssistantPart::Text { text: text.into() }],
        }
    }

    pub fn model_text(text: impl Into<String>) -> Self {
        Self {
            role: AssistantRole::Model,
            parts: vec![AssistantPart::Text { text: text.into() }],
        }
    }

    /// Non-empty text parts, trimmed and joined with newlines.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                AssistantPart::Text { text } => {
                    let trimmed = text.trim();
                    (!trimmed.is_empty()).then_some(trimmed)
                }
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn has_function_calls(&self) -> bool {
        self.parts
            .iter()
            .any(|part| matches!(part, AssistantPart::FunctionCall { .. }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters_json_schema: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCallingMode {
    Auto,
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssistantInput {
    pub system_instruction: Option<String>,
    pub messages: Vec<AssistantMessage>,
    pub tools: Vec<FunctionDeclaration>,
    pub tool_calling_mode: ToolCallingMode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssistantCandidate {
    pub message: AssistantMessage,
    pub finish_reason: Option<String>,
    pub safety_blocked: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssistantOutput {
    pub candidates: Vec<AssistantCandidate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LlmError {
    #[error("missing GOOGLE_API_KEY")]
    MissingApiKey,
    #[error("provider request failed with status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("provider transport error: {0}")]
    Transport(String),
    #[error("provider parse error: {0}")]
    Parse(String),
    #[error("provider returned no candidates")]
    EmptyResponse,
    #[error("provider request timed out after {0} ms")]
    Timeout(u64),
}

impl LlmError {
    /// Quota, rate-limit and transient server failures. Auth and request
    /// errors are final.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::HttpStatus { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            Self::Transport(_) | Self::Timeout(_) => true,
            Self::MissingApiKey | Self::Parse(_) | Self::EmptyResponse => false,
        }
    }
}

pub type LlmResult<T> = std::result::Result<T, LlmError>;

pub trait LlmProvider {
    fn generate(
        &self,
        input: AssistantInput,
    ) -> impl std::future::Future<Output = LlmResult<AssistantOutput>> + Send;
}

#[cfg(test)]
mod tests {
    use super::{AssistantMessage, AssistantPart, AssistantRole, LlmError};
    use serde_json::json;

    #[test]
    fn quota_and_server_errors_are_transient() {
        for status in [429, 500, 502, 503, 504] {
            let err = LlmError::HttpStatus {
                status,
                body: String::new(),
            };
            assert!(err.is_transient(), "status {status} should be transient");
        }
        assert!(LlmError::Transport("reset".to_string()).is_transient());
        assert!(LlmError::Timeout(10).is_transient());
    }

    #[test]
    fn auth_and_request_errors_are_fatal() {
        for status in [400, 401, 403, 404] {
            let err = LlmError::HttpStatus {
                status,
                body: String::new(),
            };
            assert!(!err.is_transient(), "status {status} should be fatal");
        }
        assert!(!LlmError::MissingApiKey.is_transient());
        assert!(!LlmError::Parse("bad".to_string()).is_transient());
    }

    #[test]
    fn message_text_skips_blank_and_call_parts() {
        let message = AssistantMessage {
            role: AssistantRole::Model,
            parts: vec![
                AssistantPart::Text {
                    text: "  ".to_string(),
                },
                AssistantPart::FunctionCall {
                    id: None,
                    name: "list_tables".to_string(),
                    args_json: json!({}),
                    thought_signature: None,
                },
                AssistantPart::Text {
                    text: " Halo kak! ".to_string(),
                },
            ],
        };
        assert_eq!(message.text(), "Halo kak!");
        assert!(message.has_function_calls());
    }
}

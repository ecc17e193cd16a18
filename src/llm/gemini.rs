use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::provider::{
    AssistantCandidate, AssistantInput, AssistantMessage, AssistantOutput, AssistantPart,
    AssistantRole, FunctionDeclaration, LlmError, LlmProvider, LlmResult, ToolCallingMode,
};
use crate::http::client::HttpClient;

const ERROR_BODY_MAX_CHARS: usize = 400;

#[derive(Debug, Clone)]
pub struct GeminiProvider {
    http: HttpClient,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(
        http: HttpClient,
        api_key: Option<String>,
        model: String,
        base_url: String,
    ) -> LlmResult<Self> {
        let api_key = api_key
            .filter(|v| !v.trim().is_empty())
            .ok_or(LlmError::MissingApiKey)?;

        Ok(Self {
            http,
            api_key,
            model: model.trim_start_matches("models/").to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    fn build_request(input: &AssistantInput) -> GeminiRequest {
        let tools = if input.tools.is_empty() {
            None
        } else {
            Some(vec![GeminiTool {
                function_declarations: input.tools.iter().map(to_gemini_declaration).collect(),
            }])
        };
        let tool_config = tools.as_ref().map(|_| GeminiToolConfig {
            function_calling_config: GeminiFunctionCallingConfig {
                mode: match input.tool_calling_mode {
                    ToolCallingMode::Auto => "AUTO",
                    ToolCallingMode::None => "NONE",
                },
            },
        });

        GeminiRequest {
            contents: input.messages.iter().map(to_gemini_content).collect(),
            system_instruction: input
                .system_instruction
                .as_ref()
                .map(|text| GeminiSystemInstruction {
                    parts: vec![GeminiPart::text(text)],
                }),
            tools,
            tool_config,
        }
    }

    fn normalize_response(resp: GeminiResponse) -> AssistantOutput {
        let candidates = resp
            .candidates
            .into_iter()
            .map(|candidate| {
                let safety_blocked = candidate.finish_reason.as_deref() == Some("SAFETY")
                    || candidate.safety_ratings.iter().any(|rating| rating.blocked);
                let parts = candidate
                    .content
                    .map(|content| content.parts)
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(from_gemini_part)
                    .collect();

                AssistantCandidate {
                    message: AssistantMessage {
                        role: AssistantRole::Model,
                        parts,
                    },
                    finish_reason: candidate.finish_reason,
                    safety_blocked,
                }
            })
            .collect();

        AssistantOutput { candidates }
    }
}

impl LlmProvider for GeminiProvider {
    async fn generate(&self, input: AssistantInput) -> LlmResult<AssistantOutput> {
        let payload = Self::build_request(&input);
        let resp = self
            .http
            .post_json(&self.endpoint(), &[("key", self.api_key.as_str())], &payload)
            .await
            .map_err(|err| LlmError::Transport(err.to_string()))?;

        if !(200..300).contains(&resp.status) {
            return Err(LlmError::HttpStatus {
                status: resp.status,
                body: resp.body.chars().take(ERROR_BODY_MAX_CHARS).collect(),
            });
        }

        let parsed = serde_json::from_str::<GeminiResponse>(&resp.body)
            .map_err(|err| LlmError::Parse(err.to_string()))?;
        if parsed.candidates.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(Self::normalize_response(parsed))
    }
}

fn to_gemini_declaration(decl: &FunctionDeclaration) -> GeminiFunctionDeclaration {
    GeminiFunctionDeclaration {
        name: decl.name.clone(),
        description: decl.description.clone(),
        parameters: decl.parameters_json_schema.clone(),
    }
}

fn to_gemini_content(message: &AssistantMessage) -> GeminiContent {
    // generateContent only knows "user" and "model"; function responses ride on "user".
    let role = match message.role {
        AssistantRole::Model => "model",
        AssistantRole::User | AssistantRole::Function => "user",
    };

    GeminiContent {
        role: Some(role.to_string()),
        parts: message.parts.iter().map(to_gemini_part).collect(),
    }
}

fn to_gemini_part(part: &AssistantPart) -> GeminiPart {
    match part {
        AssistantPart::Text { text } => GeminiPart::text(text),
        AssistantPart::FunctionCall {
            id,
            name,
            args_json,
            thought_signature,
        } => GeminiPart {
            function_call: Some(GeminiFunctionCall {
                id: id.clone(),
                name: name.clone(),
                args: args_json.clone(),
            }),
            thought_signature: thought_signature.clone(),
            ..GeminiPart::default()
        },
        AssistantPart::FunctionResponse {
            id,
            name,
            response_json,
        } => GeminiPart {
            function_response: Some(GeminiFunctionResponse {
                id: id.clone(),
                name: name.clone(),
                response: response_json.clone(),
            }),
            ..GeminiPart::default()
        },
    }
}

fn from_gemini_part(part: GeminiPart) -> Option<AssistantPart> {
    if let Some(call) = part.function_call {
        return Some(AssistantPart::FunctionCall {
            id: call.id,
            name: call.name,
            args_json: call.args,
            thought_signature: part.thought_signature,
        });
    }
    if let Some(response) = part.function_response {
        return Some(AssistantPart::FunctionResponse {
            id: response.id,
            name: response.name,
            response_json: response.response,
        });
    }
    // Thought summaries are not part of the answer.
    if part.thought == Some(true) {
        return None;
    }
    part.text.map(|text| AssistantPart::Text { text })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiSystemInstruction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GeminiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_config: Option<GeminiToolConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<GeminiFunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<GeminiFunctionResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought_signature: Option<String>,
}

impl GeminiPart {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    function_declarations: Vec<GeminiFunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct GeminiFunctionDeclaration {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiToolConfig {
    function_calling_config: GeminiFunctionCallingConfig,
}

#[derive(Debug, Serialize)]
struct GeminiFunctionCallingConfig {
    mode: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
    #[serde(default)]
    safety_ratings: Vec<GeminiSafetyRating>,
}

#[derive(Debug, Deserialize)]
struct GeminiSafetyRating {
    #[serde(default)]
    blocked: bool,
}

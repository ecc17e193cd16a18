use anyhow::{Result, anyhow, bail};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::agent::AgentConfig;
use crate::catalog::{DEFAULT_DATABASE_FILE, StatementPolicy};
use crate::llm::provider::LlmError;
use crate::llm::retry::RetryPolicy;

/// The 1.5 family is retired on the public API; set `GEMINI_MODEL` (or
/// `gemini_model`) to a model that is still served.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash-latest";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const CONFIG_DIR_NAME: &str = "ioh-sales-chat";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub config_path: PathBuf,
    pub google_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub database_path: PathBuf,
    pub sql_policy: StatementPolicy,
    pub retry: RetryConfig,
    pub agent: AgentConfig,
    pub theme: ThemeConfig,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 60_000,
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            multiplier: self.multiplier,
            predicate: LlmError::is_transient,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeConfig {
    pub preset: ThemePreset,
    pub styles: HashMap<ThemeToken, StyleOverride>,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            preset: ThemePreset::Default,
            styles: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThemePreset {
    Default,
    Light,
    HighContrast,
}

impl FromStr for ThemePreset {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value {
            "default" => Ok(Self::Default),
            "light" => Ok(Self::Light),
            "high-contrast" => Ok(Self::HighContrast),
            _ => Err(format!("unknown preset '{value}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThemeToken {
    Title,
    UserPrompt,
    UserInput,
    AssistantPrompt,
    AssistantText,
    AssistantWaiting,
    AssistantProgressRequest,
    AssistantProgressResult,
    SystemInfo,
    SystemError,
    Status,
    InputBlock,
}

impl ThemeToken {
    pub fn all() -> &'static [ThemeToken] {
        &[
            Self::Title,
            Self::UserPrompt,
            Self::UserInput,
            Self::AssistantPrompt,
            Self::AssistantText,
            Self::AssistantWaiting,
            Self::AssistantProgressRequest,
            Self::AssistantProgressResult,
            Self::SystemInfo,
            Self::SystemError,
            Self::Status,
            Self::InputBlock,
        ]
    }
}

impl FromStr for ThemeToken {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value {
            "title" => Ok(Self::Title),
            "user_prompt" => Ok(Self::UserPrompt),
            "user_input" => Ok(Self::UserInput),
            "assistant_prompt" => Ok(Self::AssistantPrompt),
            "assistant_text" => Ok(Self::AssistantText),
            "assistant_waiting" => Ok(Self::AssistantWaiting),
            "assistant_progress_request" => Ok(Self::AssistantProgressRequest),
            "assistant_progress_result" => Ok(Self::AssistantProgressResult),
            "system_info" => Ok(Self::SystemInfo),
            "system_error" => Ok(Self::SystemError),
            "status" => Ok(Self::Status),
            "input_block" => Ok(Self::InputBlock),
            _ => Err(format!("unknown token '{value}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleOverride {
    pub fg: Option<HexColor>,
    pub bg: Option<HexColor>,
    pub modifiers: Option<Vec<ThemeModifier>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HexColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl FromStr for HexColor {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        const INVALID: &str = "invalid hex color, expected #RRGGBB";
        let Some(hex) = value.strip_prefix('#') else {
            return Err(INVALID.to_string());
        };
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(INVALID.to_string());
        }

        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|_| INVALID.to_string())
        };
        Ok(Self {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeModifier {
    Bold,
    Dim,
    Italic,
    Underlined,
    Reversed,
    CrossedOut,
}

impl FromStr for ThemeModifier {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value {
            "bold" => Ok(Self::Bold),
            "dim" => Ok(Self::Dim),
            "italic" => Ok(Self::Italic),
            "underlined" => Ok(Self::Underlined),
            "reversed" => Ok(Self::Reversed),
            "crossed_out" => Ok(Self::CrossedOut),
            _ => Err(format!("unknown modifier '{value}'")),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFileConfig {
    google_api_key: Option<String>,
    gemini_model: Option<String>,
    gemini_base_url: Option<String>,
    database_path: Option<PathBuf>,
    sql_policy: Option<String>,
    retry: Option<RawRetryConfig>,
    agent: Option<RawAgentConfig>,
    theme: Option<RawThemeConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRetryConfig {
    max_attempts: Option<u32>,
    initial_backoff_ms: Option<u64>,
    max_backoff_ms: Option<u64>,
    multiplier: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawAgentConfig {
    max_steps: Option<usize>,
    invalid_response_retries: Option<usize>,
    request_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawThemeConfig {
    name: Option<String>,
    styles: Option<HashMap<String, RawStyleOverride>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStyleOverride {
    fg: Option<String>,
    bg: Option<String>,
    modifiers: Option<Vec<String>>,
}

impl AppConfig {
    /// Resolves the configuration. An explicit path must exist; the
    /// discovered default path is optional.
    pub fn load_with_path(explicit_path: Option<&Path>) -> Result<Self> {
        let (config_path, file_config) = match explicit_path {
            Some(path) => {
                if !path.is_file() {
                    bail!("Failed to load config {}: file not found", path.display());
                }
                (path.to_path_buf(), load_file_config(path)?)
            }
            None => {
                let path = discover_config_path()?;
                let file_config = load_file_config(&path)?;
                (path, file_config)
            }
        };
        let file_config = file_config.unwrap_or_default();

        dotenvy::dotenv().ok();

        let sql_policy = match file_config.sql_policy.as_deref() {
            Some(value) => StatementPolicy::from_str(value)
                .map_err(|reason| config_error(&config_path, "sql_policy", &reason))?,
            None => StatementPolicy::default(),
        };
        let retry = validate_retry(file_config.retry.as_ref(), &config_path)?;
        let agent = validate_agent(file_config.agent.as_ref(), &config_path)?;
        let theme = validate_theme(file_config.theme.as_ref(), &config_path)?;

        let file_value = |value: Option<String>| value.as_deref().and_then(non_empty).map(ToOwned::to_owned);

        Ok(Self {
            google_api_key: env_non_empty("GOOGLE_API_KEY")
                .or_else(|| env_non_empty("GEMINI_API_KEY"))
                .or(file_value(file_config.google_api_key)),
            gemini_model: env_non_empty("GEMINI_MODEL")
                .or(file_value(file_config.gemini_model))
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            gemini_base_url: env_non_empty("GEMINI_BASE_URL")
                .or(file_value(file_config.gemini_base_url))
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            database_path: env_non_empty("CATALOG_DB_PATH")
                .map(PathBuf::from)
                .or(file_config.database_path)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_FILE)),
            config_path,
            sql_policy,
            retry,
            agent,
            theme,
        })
    }
}

fn discover_config_path() -> Result<PathBuf> {
    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        let trimmed = xdg.trim();
        if trimmed.is_empty() {
            bail!("Failed to resolve config path: XDG_CONFIG_HOME is set but empty");
        }

        return Ok(PathBuf::from(trimmed)
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME));
    }

    let home = dirs::home_dir()
        .ok_or_else(|| anyhow!("Failed to resolve config path: HOME directory is unavailable"))?;

    Ok(home
        .join(".config")
        .join(CONFIG_DIR_NAME)
        .join(CONFIG_FILE_NAME))
}

fn load_file_config(config_path: &Path) -> Result<Option<RawFileConfig>> {
    if !config_path.is_file() {
        return Ok(None);
    }

    let config_text = fs::read_to_string(config_path).map_err(|err| {
        anyhow!(
            "Failed to load config {}: unable to read file: {err}",
            config_path.display()
        )
    })?;

    toml::from_str(&config_text)
        .map(Some)
        .map_err(|err| anyhow!("Failed to load config {}: {err}", config_path.display()))
}

fn validate_retry(raw: Option<&RawRetryConfig>, config_path: &Path) -> Result<RetryConfig> {
    let mut config = RetryConfig::default();
    let Some(raw) = raw else {
        return Ok(config);
    };

    if let Some(max_attempts) = raw.max_attempts {
        if max_attempts == 0 {
            return Err(config_error(config_path, "retry.max_attempts", "must be >= 1"));
        }
        config.max_attempts = max_attempts;
    }
    if let Some(multiplier) = raw.multiplier {
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(config_error(config_path, "retry.multiplier", "must be >= 1.0"));
        }
        config.multiplier = multiplier;
    }
    config.initial_backoff_ms = raw.initial_backoff_ms.unwrap_or(config.initial_backoff_ms);
    config.max_backoff_ms = raw.max_backoff_ms.unwrap_or(config.max_backoff_ms);
    if config.initial_backoff_ms > config.max_backoff_ms {
        return Err(config_error(
            config_path,
            "retry.initial_backoff_ms",
            "must not exceed retry.max_backoff_ms",
        ));
    }

    Ok(config)
}

fn validate_agent(raw: Option<&RawAgentConfig>, config_path: &Path) -> Result<AgentConfig> {
    let mut config = AgentConfig::default();
    let Some(raw) = raw else {
        return Ok(config);
    };

    if let Some(max_steps) = raw.max_steps {
        if max_steps == 0 {
            return Err(config_error(config_path, "agent.max_steps", "must be >= 1"));
        }
        config.max_steps = max_steps;
    }
    if let Some(timeout_ms) = raw.request_timeout_ms {
        if timeout_ms == 0 {
            return Err(config_error(
                config_path,
                "agent.request_timeout_ms",
                "must be >= 1",
            ));
        }
        config.request_timeout_ms = timeout_ms;
    }
    config.invalid_response_retries = raw
        .invalid_response_retries
        .unwrap_or(config.invalid_response_retries);

    Ok(config)
}

fn validate_theme(raw_theme: Option<&RawThemeConfig>, config_path: &Path) -> Result<ThemeConfig> {
    let Some(theme) = raw_theme else {
        return Ok(ThemeConfig::default());
    };

    let mut config = ThemeConfig::default();

    if let Some(name) = &theme.name {
        config.preset = ThemePreset::from_str(name)
            .map_err(|reason| config_error(config_path, "theme.name", &reason))?;
    }

    if let Some(styles) = &theme.styles {
        for (token_name, raw_style) in styles {
            let token = ThemeToken::from_str(token_name).map_err(|reason| {
                config_error(config_path, &format!("theme.styles.{token_name}"), &reason)
            })?;

            let fg = parse_color(raw_style.fg.as_deref(), config_path, token_name, "fg")?;
            let bg = parse_color(raw_style.bg.as_deref(), config_path, token_name, "bg")?;
            let modifiers =
                parse_modifiers(raw_style.modifiers.as_deref(), config_path, token_name)?;

            config.styles.insert(token, StyleOverride { fg, bg, modifiers });
        }
    }

    Ok(config)
}

fn parse_color(
    value: Option<&str>,
    config_path: &Path,
    token_name: &str,
    field_name: &str,
) -> Result<Option<HexColor>> {
    let Some(value) = value else {
        return Ok(None);
    };

    HexColor::from_str(value).map(Some).map_err(|reason| {
        config_error(
            config_path,
            &format!("theme.styles.{token_name}.{field_name}"),
            &reason,
        )
    })
}

fn parse_modifiers(
    values: Option<&[String]>,
    config_path: &Path,
    token_name: &str,
) -> Result<Option<Vec<ThemeModifier>>> {
    let Some(values) = values else {
        return Ok(None);
    };

    values
        .iter()
        .map(|value| {
            ThemeModifier::from_str(value).map_err(|reason| {
                config_error(
                    config_path,
                    &format!("theme.styles.{token_name}.modifiers"),
                    &reason,
                )
            })
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

fn env_non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .and_then(|value| non_empty(&value).map(ToOwned::to_owned))
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn config_error(config_path: &Path, key_path: &str, reason: &str) -> anyhow::Error {
    anyhow!(
        "Failed to load config {}: {key_path}: {reason}",
        config_path.display()
    )
}

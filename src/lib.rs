pub mod agent;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod http;
pub mod llm;
pub mod session;
pub mod trace;

use anyhow::Result;
use catalog::SqliteCatalog;
use cli::{ChatApp, CliArgs, Theme, run_app};
use config::AppConfig;
use http::client::HttpClient;
use http::debug::HttpDebugConfig;
use llm::gemini::GeminiProvider;
use session::ChatSession;
use std::env;
use std::time::{SystemTime, UNIX_EPOCH};
use trace::SessionTrace;

pub async fn run(args: CliArgs) -> Result<()> {
    let mut config = AppConfig::load_with_path(args.config.as_deref())?;
    apply_cli_overrides(&mut config, &args);

    let session_id = generate_session_id();
    let trace = SessionTrace::create(&session_id)?;
    let http = HttpClient::new(
        reqwest::Client::new(),
        HttpDebugConfig::from_verbose(args.verbose),
    )
    .with_trace(trace.clone());

    let catalog = SqliteCatalog::new(config.database_path.clone(), config.sql_policy);
    let session = build_session(&config, http, catalog.clone(), trace.clone());
    let theme = Theme::from_config(env::var_os("NO_COLOR").is_none(), &config.theme);

    let mut app = ChatApp::new(
        session_id,
        session,
        catalog,
        theme,
        Some(trace.file_path().to_path_buf()),
    );
    run_app(&mut app).await
}

/// CLI flags win over every other configuration source.
pub fn apply_cli_overrides(config: &mut AppConfig, args: &CliArgs) {
    if let Some(db) = &args.db {
        config.database_path = db.clone();
    }
}

/// Returns `None` when no API key is configured, so the UI can still serve
/// catalog commands and explain what is missing.
pub fn build_session(
    config: &AppConfig,
    http: HttpClient,
    catalog: SqliteCatalog,
    trace: SessionTrace,
) -> Option<ChatSession<GeminiProvider, SqliteCatalog>> {
    let provider = GeminiProvider::new(
        http,
        config.google_api_key.clone(),
        config.gemini_model.clone(),
        config.gemini_base_url.clone(),
    )
    .ok()?;

    Some(
        ChatSession::new(provider, catalog)
            .with_agent_config(config.agent)
            .with_retry_policy(config.retry.to_policy())
            .with_trace(trace),
    )
}

fn generate_session_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_millis());
    format!("{millis:x}-{:x}", std::process::id())
}

use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser, Clone, PartialEq, Eq)]
#[command(name = "ioh-sales-chat")]
#[command(
    about = "IOH virtual sales assistant for the mobile package catalog",
    long_about = "IOH virtual sales assistant for the mobile package catalog\n\nConfig file loading:\n  - --config <path> (explicit file, overrides default path discovery)\n  - Default lookup path when --config is not provided:\n    1. $XDG_CONFIG_HOME/ioh-sales-chat/config.toml\n    2. ~/.config/ioh-sales-chat/config.toml\n\nEnvironment: GOOGLE_API_KEY, GEMINI_MODEL, GEMINI_BASE_URL, CATALOG_DB_PATH\n\nThe default model (gemini-1.5-flash-latest) is retired on the Gemini API.\nSet GEMINI_MODEL or gemini_model in config.toml to a current model."
)]
pub struct CliArgs {
    /// Load config from this file path instead of the default discovery path.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// SQLite catalog file; overrides config and CATALOG_DB_PATH.
    #[arg(long, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// Echo redacted HTTP traffic to stderr.
    #[arg(long, short)]
    pub verbose: bool,
}

mod app;
mod args;
mod commands;
pub(crate) mod theme;
mod timeline;

pub use app::{ChatApp, run_app};
pub use args::CliArgs;
pub use theme::Theme;

pub mod dispatch;
mod loop_impl;
pub mod prompt;

pub use loop_impl::{AgentConfig, AgentProgressEvent, TurnError, TurnOutcome, run_turn};

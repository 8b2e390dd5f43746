//! Command-line surface: clap definitions and the per-subcommand handlers
//! that drive [`crate::workflow::Workflow`].

mod args;
mod commands;
mod enums;

pub use args::{Cli, Command, ConfigAction};
pub use commands::{handle_config_action, run};
pub use enums::{AiProvider, Privacy, TtsProvider};

/// CLI argument parsing and command handling - Gateway
mod args;
mod commands;

pub use args::{Cli, Commands, OutputFormat};
pub use commands::{
    handle_command, instruction_or_default, list_models, list_tools, read_instruction, show_version,
};

//! CLI layer for rag-research.
//!
//! Provides the command-line interface using clap, with commands for
//! answering questions, writing research reports and exporting prompts.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
pub use parser::{Cli, Commands, RunArgs};

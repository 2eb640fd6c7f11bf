//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// rag-research: cited, evidence-backed answers and reports.
///
/// Retrieves fragments from a vector store and web search, extracts
/// evidence with a language model and drafts a report tree that cites it.
#[derive(Parser, Debug)]
#[command(name = "rag-research")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output and debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, markdown, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Answer a question directly from retrieved evidence.
    #[command(after_help = r#"Examples:
  rag-research rag "early warning signs of heart disease"
  rag-research rag "statin side effects" --no-web --max-results 5
  rag-research --format json rag "What is angina?" | jq '.report[0].body'
"#)]
    Rag(RunArgs),

    /// Write a multi-section research report.
    #[command(after_help = r#"Examples:
  rag-research research "heart disease risk factors" --output report.md --format markdown
  rag-research research "compare statins and diet" --topic cardiology -v
"#)]
    Research(RunArgs),

    /// Write the default prompt templates for customization.
    ///
    /// Existing files are left untouched.
    InitPrompts {
        /// Target directory. Defaults to `~/.config/rag-research/prompts`.
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

/// Arguments shared by the `rag` and `research` commands.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// The question to answer.
    pub query: String,

    /// Maximum merged chunks to keep.
    #[arg(short = 'k', long)]
    pub max_results: Option<usize>,

    /// Skip web search for this run.
    #[arg(long)]
    pub no_web: bool,

    /// Restrict vector store results to a topic.
    #[arg(long)]
    pub topic: Option<String>,

    /// Directory containing prompt template files.
    #[arg(long, env = "RAG_PROMPT_DIR")]
    pub prompt_dir: Option<PathBuf>,

    /// Write the report to this file instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_research_args() {
        let cli = Cli::try_parse_from([
            "rag-research",
            "--format",
            "markdown",
            "research",
            "heart disease",
            "-k",
            "7",
            "--no-web",
        ])
        .unwrap_or_else(|_| unreachable!());
        assert_eq!(cli.format, "markdown");
        let Commands::Research(args) = cli.command else {
            unreachable!()
        };
        assert_eq!(args.query, "heart disease");
        assert_eq!(args.max_results, Some(7));
        assert!(args.no_web);
    }
}

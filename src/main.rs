//! rag-research command-line entry point.

use std::io::Write;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use rag_research::cli::{Cli, execute};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "rag_research=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with_writer(std::io::stderr)
        .init();

    let result = execute(&cli).and_then(|output| {
        emit(&mut std::io::stdout().lock(), &output).context("failed to write output")
    });
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let _ = writeln!(std::io::stderr().lock(), "Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Writes `output` followed by a newline if it lacks one, then flushes.
fn emit(out: &mut impl Write, output: &str) -> std::io::Result<()> {
    out.write_all(output.as_bytes())?;
    if !output.ends_with('\n') {
        writeln!(out)?;
    }
    out.flush()
}

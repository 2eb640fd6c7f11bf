//! CLI command implementations.
//!
//! Wires configuration, providers and retrieval collaborators into an
//! [`Orchestrator`] and renders the result.

#![allow(clippy::format_push_string)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio_util::sync::CancellationToken;

use crate::agent::client::create_providers;
use crate::agent::config::AgentConfig;
use crate::agent::gateway::ModelGateway;
use crate::agent::orchestrator::Orchestrator;
use crate::agent::prompt::PromptSet;
use crate::cli::output::{OutputFormat, format_file, format_report};
use crate::cli::parser::{Cli, Commands, RunArgs};
use crate::core::{Query, QueryMode};
use crate::retrieval::{RetrievalCoordinator, SearchSource};

/// Default Weaviate endpoint when `WEAVIATE_URL` is unset.
#[cfg(feature = "http-sources")]
const DEFAULT_WEAVIATE_URL: &str = "http://localhost:8080";

/// Executes the CLI command and returns the text to print.
///
/// # Errors
///
/// Returns an error if configuration is incomplete, the query is invalid,
/// or the run ends in the errored stage.
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);
    match &cli.command {
        Commands::Rag(args) => cmd_run(args, QueryMode::Rag, format, cli.verbose),
        Commands::Research(args) => cmd_run(args, QueryMode::Research, format, cli.verbose),
        Commands::InitPrompts { dir } => cmd_init_prompts(dir.as_deref(), format),
    }
}

// ==================== Run Commands ====================

fn cmd_run(args: &RunArgs, mode: QueryMode, format: OutputFormat, verbose: bool) -> Result<String> {
    let mut builder = AgentConfig::builder();
    if let Some(dir) = args
        .prompt_dir
        .clone()
        .or_else(|| PromptSet::default_dir().filter(|d| d.is_dir()))
    {
        builder = builder.prompt_dir(dir);
    }
    let config = builder
        .from_env()
        .build()
        .context("agent configuration error")?;

    let query = Query::new(
        args.query.as_str(),
        mode,
        args.max_results.unwrap_or(config.default_max_results),
    );
    query.validate()?;

    let providers = create_providers(&config).context("provider creation failed")?;
    let gateway = Arc::new(ModelGateway::from_config(providers, &config));
    let (vector, web) = build_sources(args)?;
    if web.is_none() {
        tracing::info!("web search disabled for this run");
    }
    let retrieval = RetrievalCoordinator::new(vector, web, &config);
    let orchestrator = Orchestrator::new(Arc::clone(&gateway), retrieval, &config);

    // Create tokio runtime as sync/async bridge
    let rt = tokio::runtime::Runtime::new().context("failed to create async runtime")?;
    let cancel = CancellationToken::new();
    let result = rt.block_on(async {
        let trigger = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                trigger.cancel();
            }
        });
        orchestrator.run_with_cancel(query, cancel).await
    });

    let report = match result {
        Ok(report) => report,
        Err(failure) => {
            let mut message = failure.to_string();
            let issues = failure.state.errors();
            if issues.len() > 1 {
                message.push_str("\nRecorded issues:");
                for issue in issues {
                    message.push_str(&format!("\n  {issue}"));
                }
            }
            bail!(message);
        }
    };

    let stats = verbose.then(|| gateway.stats());
    let rendered = format_report(&report, format, stats.as_deref());
    match &args.output {
        Some(path) => {
            std::fs::write(path, format_file(&report, &rendered))
                .with_context(|| format!("failed to write report to {}", path.display()))?;
            Ok(format!(
                "Report saved to: {} ({} evidence, quality {}/100{})\n",
                path.display(),
                report.evidence.len(),
                report.quality.score,
                if report.degraded { ", degraded" } else { "" }
            ))
        }
        None => Ok(rendered),
    }
}

/// The vector store and optional web search for a run.
#[cfg(feature = "http-sources")]
fn build_sources(args: &RunArgs) -> Result<(Arc<dyn SearchSource>, Option<Arc<dyn SearchSource>>)> {
    use crate::retrieval::{TavilySearch, WeaviateStore};

    let url = std::env::var("WEAVIATE_URL").unwrap_or_else(|_| DEFAULT_WEAVIATE_URL.to_string());
    let mut store = WeaviateStore::new(url);
    if let Some(topic) = &args.topic {
        store = store.with_topic(topic.as_str());
    }
    let web = if args.no_web {
        None
    } else {
        std::env::var("TAVILY_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .map(|key| Arc::new(TavilySearch::new(key)) as Arc<dyn SearchSource>)
    };
    Ok((Arc::new(store), web))
}

#[cfg(not(feature = "http-sources"))]
fn build_sources(_args: &RunArgs) -> Result<(Arc<dyn SearchSource>, Option<Arc<dyn SearchSource>>)> {
    bail!("no retrieval sources available: rebuild with the `http-sources` feature")
}

// ==================== Init Prompts Command ====================

fn cmd_init_prompts(dir: Option<&Path>, format: OutputFormat) -> Result<String> {
    let target_dir = dir
        .map(PathBuf::from)
        .or_else(PromptSet::default_dir)
        .context("could not determine home directory for default prompt path")?;

    let written = PromptSet::write_defaults(&target_dir).context("failed to write prompt templates")?;

    match format {
        OutputFormat::Text | OutputFormat::Markdown => {
            if written.is_empty() {
                return Ok(format!(
                    "All prompt templates already exist in: {}\n",
                    target_dir.display()
                ));
            }
            let mut output = format!(
                "Wrote {} prompt template(s) to: {}\n",
                written.len(),
                target_dir.display()
            );
            for path in &written {
                output.push_str(&format!(
                    "  {}\n",
                    path.file_name().and_then(|n| n.to_str()).unwrap_or("unknown")
                ));
            }
            output.push_str("\nEdit these files to customize the agent system prompts.\n");
            Ok(output)
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "directory": target_dir.to_string_lossy(),
                "written": written.iter().map(|p| p.to_string_lossy().into_owned()).collect::<Vec<_>>(),
                "count": written.len()
            });
            Ok(format.to_json(&json))
        }
    }
}

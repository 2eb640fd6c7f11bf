//! Report rendering for the CLI.
//!
//! Renders a [`FinalReport`] as plain text, markdown or JSON. Every format
//! carries the degradation flag and recorded issues next to the report.

#![allow(clippy::format_push_string)]

use std::collections::HashMap;
use std::fmt::Write as _;

use serde::Serialize;

use crate::agent::gateway::ProviderStats;
use crate::agent::orchestrator::FinalReport;
use crate::core::{ChunkId, Evidence, EvidenceId};

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Plain text.
    Text,
    /// Markdown document.
    Markdown,
    /// Pretty-printed JSON.
    Json,
}

impl OutputFormat {
    /// Parses a format name, defaulting to text for anything unknown.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            "markdown" | "md" => Self::Markdown,
            _ => Self::Text,
        }
    }

    /// Serializes `value` as pretty JSON.
    #[must_use]
    pub fn to_json<T: Serialize>(self, value: &T) -> String {
        serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }
}

/// Renders a finalized report. `stats` is included when given.
#[must_use]
pub fn format_report(report: &FinalReport, format: OutputFormat, stats: Option<&[ProviderStats]>) -> String {
    match format {
        OutputFormat::Text => format_text(report, stats),
        OutputFormat::Markdown => format_markdown(report, stats),
        OutputFormat::Json => format_json(report, stats),
    }
}

/// Source document ids supporting `evidence`, in chunk-id order.
fn evidence_sources<'a>(evidence: &Evidence, docs: &HashMap<&ChunkId, &'a str>) -> Vec<&'a str> {
    let mut sources: Vec<&str> = evidence
        .supporting_chunk_ids()
        .iter()
        .filter_map(|id| docs.get(id).copied())
        .collect();
    sources.dedup();
    sources
}

fn doc_index(report: &FinalReport) -> HashMap<&ChunkId, &str> {
    report
        .chunks
        .iter()
        .map(|c| (&c.id, c.source_doc_id.as_str()))
        .collect()
}

fn format_text(report: &FinalReport, stats: Option<&[ProviderStats]>) -> String {
    let mut output = String::new();
    if report.degraded {
        output.push_str(&format!(
            "WARNING: degraded run, {} issue(s) recorded\n",
            report.errors.len()
        ));
        for issue in &report.errors {
            output.push_str(&format!("  {issue}\n"));
        }
        output.push('\n');
    }

    for record in &report.records {
        let indent = "  ".repeat(record.depth);
        output.push_str(&format!("{indent}{}\n", record.title));
        let rule = if record.depth == 0 { '=' } else { '-' };
        output.push_str(&format!("{indent}{}\n", rule.to_string().repeat(record.title.chars().count())));
        for line in record.body.lines() {
            output.push_str(&format!("{indent}{line}\n"));
        }
        if !record.cited_evidence.is_empty() {
            let cited: Vec<&str> = record.cited_evidence.iter().map(EvidenceId::as_str).collect();
            output.push_str(&format!("{indent}Cites: {}\n", cited.join(", ")));
        }
        output.push('\n');
    }

    let docs = doc_index(report);
    output.push_str("Evidence\n--------\n");
    for e in &report.evidence {
        output.push_str(&format!(
            "[{}] {} (confidence {:.2}; sources: {})\n",
            e.id(),
            e.claim(),
            e.confidence(),
            evidence_sources(e, &docs).join(", ")
        ));
    }

    output.push_str(&format!(
        "\n---\nQuality: {}/100 ({}) | Evidence: {} | Chunks: {} | Tokens: {} | Time: {:.1}s",
        report.quality.score,
        report.quality.band,
        report.evidence.len(),
        report.chunks.len(),
        report.usage.total_tokens,
        report.elapsed.as_secs_f64()
    ));
    if let Some(stats) = stats {
        for line in &report.quality.feedback {
            output.push_str(&format!("\n  {line}"));
        }
        for line in &report.quality.recommendations {
            output.push_str(&format!("\n  Recommendation: {line}"));
        }
        for s in stats {
            output.push_str(&format!("\nProvider {}: {} served, {} failed", s.provider, s.served, s.failed));
        }
    }
    output.push('\n');
    output
}

fn format_markdown(report: &FinalReport, stats: Option<&[ProviderStats]>) -> String {
    let mut output = String::new();
    for record in &report.records {
        let level = "#".repeat((record.depth + 1).min(6));
        let _ = writeln!(output, "{level} {}\n", record.title);
        if !record.body.is_empty() {
            let _ = writeln!(output, "{}\n", record.body);
        }
    }

    if report.degraded {
        let _ = writeln!(output, "> **Degraded run:** {} issue(s) recorded.", report.errors.len());
        for issue in &report.errors {
            let _ = writeln!(output, "> - {issue}");
        }
        output.push('\n');
    }

    let docs = doc_index(report);
    output.push_str("## Sources\n\n");
    for (i, e) in report.evidence.iter().enumerate() {
        let _ = writeln!(
            output,
            "{}. **[{}]** {} *(confidence {:.2}; {})*",
            i + 1,
            e.id(),
            e.claim(),
            e.confidence(),
            evidence_sources(e, &docs).join(", ")
        );
    }

    let _ = write!(
        output,
        "\n---\n*Quality {}/100 ({}), {} evidence, {} chunks, {:.1}s*\n",
        report.quality.score,
        report.quality.band,
        report.evidence.len(),
        report.chunks.len(),
        report.elapsed.as_secs_f64()
    );
    if let Some(stats) = stats {
        for s in stats {
            let _ = writeln!(output, "\n- provider `{}`: {} served, {} failed", s.provider, s.served, s.failed);
        }
    }
    output
}

fn format_json(report: &FinalReport, stats: Option<&[ProviderStats]>) -> String {
    let docs = doc_index(report);
    let evidence: Vec<serde_json::Value> = report
        .evidence
        .iter()
        .map(|e| {
            serde_json::json!({
                "id": e.id(),
                "claim": e.claim(),
                "confidence": e.confidence(),
                "chunk_ids": e.supporting_chunk_ids(),
                "sources": evidence_sources(e, &docs),
            })
        })
        .collect();
    let json = serde_json::json!({
        "run_id": report.run_id,
        "query": report.query.text(),
        "mode": report.query.mode(),
        "degraded": report.degraded,
        "errors": report.errors,
        "report": report.records,
        "evidence": evidence,
        "chunks": report.chunks,
        "quality": report.quality,
        "usage": report.usage,
        "elapsed_secs": report.elapsed.as_secs_f64(),
        "providers": stats,
    });
    OutputFormat::Json.to_json(&json)
}

/// Wraps rendered report content with a header block for file output.
#[must_use]
pub fn format_file(report: &FinalReport, rendered: &str) -> String {
    let rule = "=".repeat(70);
    let status = if report.degraded { "finalized (degraded)" } else { "finalized" };
    format!(
        "{rule}\nRESEARCH REPORT\n{rule}\nQuery: {}\nGenerated: {}\nStatus: {status}\nReport Length: {} characters\n{rule}\n\n{rendered}\n\n{rule}\nEND OF REPORT\n{rule}\n",
        report.query.text(),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        rendered.chars().count(),
    )
}

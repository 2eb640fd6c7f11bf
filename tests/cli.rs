//! Binary-level tests for the command-line interface.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use assert_cmd::Command;
use predicates::prelude::*;

fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("rag-research").unwrap();
    cmd.env_remove("OPENAI_API_KEY")
        .env_remove("RAG_API_KEY")
        .env_remove("RAG_FALLBACK_API_KEY")
        .env_remove("RAG_PROMPT_DIR")
        .env_remove("TAVILY_API_KEY");
    cmd
}

#[test]
fn test_help_lists_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("rag"))
        .stdout(predicate::str::contains("research"))
        .stdout(predicate::str::contains("init-prompts"));
}

#[test]
fn test_init_prompts_writes_templates() {
    let dir = tempfile::tempdir().unwrap();
    cmd()
        .args(["init-prompts", "--dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 4 prompt template(s)"));
    let count = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(count, 4);

    cmd()
        .args(["--format", "json", "init-prompts", "--dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"count\": 0"));
}

#[test]
fn test_blank_query_is_rejected() {
    cmd()
        .args(["rag", "   "])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid query"));
}

#[test]
fn test_missing_api_key_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    cmd()
        .current_dir(dir.path())
        .args(["research", "heart disease", "--no-web"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("API key"));
}

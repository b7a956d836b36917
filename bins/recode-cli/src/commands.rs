// CLI commands for the remote execution client
use anyhow::{bail, Context, Result};
use recode_common::config::JudgeConfig;
use recode_common::types::{ExecutionRequest, NormalizedExecutionResult};
use recode_judge::JudgeClient;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Config file (or defaults) overlaid with the process environment
pub fn load_config(path: Option<&Path>) -> Result<JudgeConfig> {
    load_config_with(path, |key| std::env::var(key).ok())
}

fn load_config_with<F>(path: Option<&Path>, lookup: F) -> Result<JudgeConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => JudgeConfig::load(path)?,
        None => JudgeConfig::default(),
    };
    config.apply_env_from(lookup)?;
    config.validate().context("Invalid judge configuration")?;
    Ok(config)
}

fn client(config: &JudgeConfig) -> Result<JudgeClient> {
    JudgeClient::new(config).context("Failed to create judge client")
}

/// List the language catalog
pub async fn list_languages(config: &JudgeConfig) -> Result<()> {
    let languages = client(config)?.get_languages().await?;
    let retired = &config.retired_language_ids;

    println!("📋 Languages at {}:\n", config.base_url);
    println!("{:<6} {:<40} {:<8}", "ID", "NAME", "STATE");
    println!("{}", "─".repeat(56));
    for language in &languages {
        let state = if retired.contains(&language.id) {
            "retired"
        } else {
            ""
        };
        println!("{:<6} {:<40} {:<8}", language.id, language.name, state);
    }
    println!("\n✅ Total: {} language(s)", languages.len());
    Ok(())
}

/// List the status catalog
pub async fn list_statuses(config: &JudgeConfig) -> Result<()> {
    let client = client(config)?;
    let statuses = client.get_statuses().await?;
    let table = client.status_table().await;

    println!("📋 Statuses at {}:\n", config.base_url);
    println!("{:<6} {:<32} {:<10}", "ID", "DESCRIPTION", "TERMINAL");
    println!("{}", "─".repeat(50));
    for status in &statuses {
        let terminal = if table.is_non_terminal_id(status.id) {
            "no"
        } else {
            "yes"
        };
        println!("{:<6} {:<32} {:<10}", status.id, status.description, terminal);
    }
    Ok(())
}

pub async fn resolve_language(config: &JudgeConfig, id: i32) -> Result<()> {
    let effective = client(config)?.resolve_language(id).await;
    if effective == id {
        println!("✅ Language {} runs as requested", id);
    } else {
        println!("🔀 Language {} runs as {}", id, effective);
    }
    Ok(())
}

/// Run one source file and print its result
pub async fn run_file(
    config: &JudgeConfig,
    file: &Path,
    language: i32,
    stdin: Option<&str>,
    expected: Option<&str>,
    wait: bool,
    json: bool,
) -> Result<()> {
    let source = fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let mut request = ExecutionRequest::new(source, language);
    if let Some(stdin) = stdin {
        request = request.with_stdin(stdin);
    }
    if let Some(expected) = expected {
        request = request.with_expected_output(expected);
    }

    info!(file = %file.display(), language, wait, "running file");
    let client = client(config)?;
    let result = if wait {
        client.execute_waited(&request).await?
    } else {
        client.execute_one(&request).await?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }

    if expected.is_some() && !result.success {
        bail!("Output did not match the expected output");
    }
    Ok(())
}

fn print_result(result: &NormalizedExecutionResult) {
    let mark = if result.success { "✅" } else { "❌" };
    println!(
        "{} {} (status {}, language {})",
        mark,
        result.status_description,
        result
            .status_id
            .map_or_else(|| "?".to_string(), |id| id.to_string()),
        result.language_id
    );
    println!(
        "   time: {}s  memory: {} KB",
        result.execution_time.as_deref().unwrap_or("-"),
        result
            .memory_used
            .map_or_else(|| "-".to_string(), |m| m.to_string())
    );

    for (label, text) in [
        ("stdout", &result.stdout),
        ("stderr", &result.stderr),
        ("compile output", &result.compile_output),
    ] {
        if let Some(text) = text.as_deref().filter(|t| !t.trim().is_empty()) {
            println!("\n── {} ──\n{}", label, text.trim_end());
        }
    }
}

fn read_batch_file(file: &Path) -> Result<Vec<ExecutionRequest>> {
    let content = fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {} as a list of requests", file.display()))
}

/// Run every request in a JSON file as one batch
pub async fn run_batch(config: &JudgeConfig, file: &Path, deadline_ms: Option<u64>) -> Result<()> {
    let requests = read_batch_file(file)?;
    if requests.is_empty() {
        println!("No requests in {}", file.display());
        return Ok(());
    }

    println!("🚀 Running {} request(s)...\n", requests.len());
    let outcomes = client(config)?
        .execute_many_within(&requests, deadline_ms.map(Duration::from_millis))
        .await?;

    let mut passed = 0usize;
    println!("{:<6} {:<8} {:<28} {:<10}", "#", "RESULT", "STATUS", "TIME");
    println!("{}", "─".repeat(56));
    for (index, outcome) in outcomes.iter().enumerate() {
        match outcome {
            Ok(result) => {
                if result.success {
                    passed += 1;
                }
                println!(
                    "{:<6} {:<8} {:<28} {:<10}",
                    index,
                    if result.success { "pass" } else { "fail" },
                    result.status_description,
                    result.execution_time.as_deref().unwrap_or("-")
                );
            }
            Err(e) => {
                println!("{:<6} {:<8} {}", index, "error", e);
            }
        }
    }

    println!("\n✅ {} / {} passed", passed, outcomes.len());
    Ok(())
}

/// Print the effective config with the API key masked
pub fn show_config(config: &JudgeConfig) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&masked(config))?);
    Ok(())
}

fn masked(config: &JudgeConfig) -> JudgeConfig {
    let mut shown = config.clone();
    if shown.api_key.is_some() {
        shown.api_key = Some("********".to_string());
    }
    shown
}

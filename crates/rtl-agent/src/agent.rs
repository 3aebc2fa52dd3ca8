//! One agent run over a benchmark workspace.

use crate::client::SlmClient;
use crate::config::AgentConfig;
use crate::toolchain::{lint_chain, CocotbRunner, HdlToolchain};
use crate::workspace::CodeWorkspace;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use refinement::{CompileBackend, Generator, Outcome, RefinementLoop, Task, Verdict};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Task and target resolved from the workspace.
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub task: Task,
    pub target: PathBuf,
}

/// Everything written to the verdict file.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub target_file: PathBuf,
    pub success: bool,
    /// Generator calls made, port refinement included.
    pub generator_calls: usize,
    /// One line per attempt, in order.
    pub attempt_summaries: Vec<String>,
    pub verdict: Verdict,
}

impl RunReport {
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize verdict")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write verdict to {}", path.display()))
    }
}

/// Read the task, gather context and pick the target file.
///
/// An unreadable `prompt.json` leaves the requirement empty; the run still
/// proceeds so the harness always gets a verdict.
pub fn prepare(workspace: &CodeWorkspace) -> Result<PreparedRun> {
    let requirement = workspace.read_prompt().unwrap_or_else(|e| {
        error!(error = %format!("{e:#}"), "Could not read task");
        String::new()
    });
    let target = workspace.find_target_file()?;
    let name = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "top".into());
    let task = Task::new(name, requirement).with_context(workspace.gather_context());
    Ok(PreparedRun { task, target })
}

/// Lint chain plus the cocotb harness when one is configured or found.
pub fn build_toolchain(config: &AgentConfig, target: &Path) -> HdlToolchain {
    let tools = &config.toolchain;
    let lint = lint_chain(
        &config.rtl_dir(),
        &tools.verilator,
        &tools.iverilog,
        std::time::Duration::from_secs(tools.lint_timeout_secs),
    );
    let toolchain = HdlToolchain::new(target, lint);

    let harness = tools
        .harness
        .clone()
        .or_else(|| CocotbRunner::discover(&config.code_dir));
    match harness {
        Some(harness) => {
            info!(harness = %harness.display(), "Testbench harness found");
            toolchain.with_tests(CocotbRunner::new(
                tools.pytest.clone(),
                harness,
                config.rundir(),
                std::time::Duration::from_secs(tools.test_timeout_secs),
            ))
        }
        None => toolchain,
    }
}

/// Drive the refinement loop and write the final source to the target.
pub async fn execute<G, C>(
    config: &AgentConfig,
    workspace: &CodeWorkspace,
    prepared: PreparedRun,
    generator: G,
    backend: C,
) -> Result<RunReport>
where
    G: Generator,
    C: CompileBackend,
{
    let started_at = Utc::now();
    let refinement = RefinementLoop::new(generator, backend, config.refinement.clone())
        .context("Invalid refinement options")?;

    info!(
        task = %prepared.task.name,
        target = %prepared.target.display(),
        context_files = prepared.task.context.len(),
        max_iterations = config.refinement.max_iterations,
        "Starting refinement"
    );
    let verdict = refinement.run(&prepared.task).await;

    if verdict.final_source.trim().is_empty() {
        warn!("No source produced, target left untouched");
    } else {
        workspace.write_code(&prepared.target, &verdict.final_source)?;
    }

    let attempt_summaries = verdict.attempt_summaries();
    for line in &attempt_summaries {
        debug!(attempt = %line, "Attempt");
    }
    let generator_calls = verdict.generator_calls();
    match verdict.outcome {
        Outcome::Success => info!(
            iterations = verdict.iterations,
            generator_calls,
            "Run succeeded"
        ),
        Outcome::SuccessWithIncompletePorts => warn!(
            iterations = verdict.iterations,
            generator_calls,
            "Run succeeded with incomplete port usage"
        ),
        Outcome::Timeout => warn!(
            iterations = verdict.iterations,
            generator_calls,
            last_attempt = attempt_summaries.last().map(String::as_str).unwrap_or("none"),
            "Run ended without a passing module"
        ),
    }

    Ok(RunReport {
        started_at,
        finished_at: Utc::now(),
        target_file: prepared.target,
        success: verdict.outcome.is_success(),
        generator_calls,
        attempt_summaries,
        verdict,
    })
}

/// Full run with the HTTP client and the external toolchain.
pub async fn run(config: &AgentConfig) -> Result<RunReport> {
    let workspace = CodeWorkspace::new(&config.code_dir);
    let prepared = prepare(&workspace)?;
    let client = SlmClient::new(config.endpoint.clone(), config.refinement.generation_timeout())
        .context("Failed to build HTTP client")?;
    let toolchain = build_toolchain(config, &prepared.target);
    execute(config, &workspace, prepared, client, toolchain).await
}

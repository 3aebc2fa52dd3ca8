//! HDL lint and test backends
//!
//! ```text
//! HdlToolchain::compile
//!   ├─ write candidate to the target file
//!   ├─ lint chain: Verilator ──unavailable──► Icarus
//!   └─ cocotb pytest harness (only after a lint pass, only if present)
//! ```

use async_trait::async_trait;
use refinement::{BackendChain, BackendVerdict, CompileBackend, CompileResult};
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lint diagnostics are cut to this many lines.
pub const MAX_LINT_LINES: usize = 50;

/// Test failures without a marker keep this many trailing lines.
pub const MAX_TEST_TAIL_LINES: usize = 100;

/// Harness file name searched for by [`CocotbRunner::discover`].
pub const HARNESS_FILE: &str = "test_runner.py";

/// Why an external tool produced no output.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("{program} not found")]
    NotFound { program: String },

    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("failed to execute {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Run `cmd` to completion under `timeout`. The child is killed on timeout.
pub async fn run_with_timeout(
    cmd: &mut tokio::process::Command,
    program: &str,
    timeout: Duration,
) -> Result<Output, ToolError> {
    cmd.kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => Err(ToolError::NotFound {
            program: program.to_string(),
        }),
        Ok(Err(e)) => Err(ToolError::Spawn {
            program: program.to_string(),
            source: e,
        }),
        Err(_) => Err(ToolError::Timeout {
            secs: timeout.as_secs(),
        }),
    }
}

/// Combined stderr then stdout, as the linters interleave them.
fn combined_output(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stderr).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stdout));
    text
}

fn first_lines(text: &str, limit: usize) -> String {
    text.lines().take(limit).collect::<Vec<_>>().join("\n")
}

/// Supported linters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LintTool {
    Verilator,
    Icarus,
}

impl LintTool {
    pub fn name(self) -> &'static str {
        match self {
            Self::Verilator => "Verilator",
            Self::Icarus => "Icarus",
        }
    }

    fn args(self) -> &'static [&'static str] {
        match self {
            Self::Verilator => &["--lint-only"],
            Self::Icarus => &["-tnull"],
        }
    }

    /// Interpret a finished lint run.
    ///
    /// Warning-only output passes: Verilator reports coded warnings as
    /// `%Error-CODE` plus an "Exiting due to N warning(s)" summary, and
    /// Icarus exits non-zero without an `error:` line.
    pub fn interpret(self, success: bool, output: &str) -> BackendVerdict {
        if success {
            return BackendVerdict::passed(output.trim());
        }
        let has_real_errors = match self {
            Self::Verilator => output.lines().any(is_verilator_error),
            Self::Icarus => output.to_lowercase().contains("error:"),
        };
        if has_real_errors {
            BackendVerdict::failed(first_lines(output, MAX_LINT_LINES))
        } else {
            BackendVerdict::passed(output.trim())
        }
    }
}

/// A `%Error:` line that is neither a coded warning nor the warning summary.
fn is_verilator_error(line: &str) -> bool {
    line.contains("%Error:")
        && !line.contains("%Error-")
        && !line.contains("Exiting due to")
        && !line.to_lowercase().contains("warning(s)")
}

/// All `.v` then `.sv` files directly under `dir`, sorted.
pub fn rtl_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut verilog = Vec::new();
    let mut system_verilog = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        match path.extension().and_then(|e| e.to_str()) {
            Some("v") => verilog.push(path),
            Some("sv") => system_verilog.push(path),
            _ => {}
        }
    }
    verilog.sort();
    system_verilog.sort();
    verilog.extend(system_verilog);
    verilog
}

/// One linter run over every RTL file in a directory.
pub struct LintBackend {
    tool: LintTool,
    program: String,
    rtl_dir: PathBuf,
    timeout: Duration,
}

impl LintBackend {
    pub fn new(
        tool: LintTool,
        program: impl Into<String>,
        rtl_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            tool,
            program: program.into(),
            rtl_dir: rtl_dir.into(),
            timeout,
        }
    }

    pub fn verilator(rtl_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self::new(LintTool::Verilator, "verilator", rtl_dir, timeout)
    }

    pub fn icarus(rtl_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self::new(LintTool::Icarus, "iverilog", rtl_dir, timeout)
    }
}

#[async_trait]
impl CompileBackend for LintBackend {
    fn name(&self) -> &str {
        self.tool.name()
    }

    async fn compile(&self, _source: &str, module_name: Option<&str>) -> BackendVerdict {
        let files = rtl_files(&self.rtl_dir);
        if files.is_empty() {
            warn!(dir = %self.rtl_dir.display(), "No RTL files to lint");
            return BackendVerdict::failed("No RTL files found");
        }

        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(self.tool.args()).args(&files);
        info!(
            tool = self.tool.name(),
            files = files.len(),
            module = module_name.unwrap_or("?"),
            "Running lint"
        );

        match run_with_timeout(&mut cmd, &self.program, self.timeout).await {
            Ok(output) => {
                let text = combined_output(&output);
                let verdict = self.tool.interpret(output.status.success(), &text);
                match &verdict {
                    BackendVerdict::Passed { diagnostics } if !diagnostics.is_empty() => {
                        info!(tool = self.tool.name(), "Lint passed with warnings");
                        debug!(warnings = %first_lines(diagnostics, 10), "Lint warnings");
                    }
                    BackendVerdict::Passed { .. } => info!(tool = self.tool.name(), "Lint passed"),
                    _ => warn!(tool = self.tool.name(), "Lint failed"),
                }
                verdict
            }
            Err(ToolError::Timeout { secs }) => {
                warn!(tool = self.tool.name(), secs, "Lint timed out");
                BackendVerdict::failed(format!("Lint timeout after {secs}s"))
            }
            Err(e) => {
                debug!(tool = self.tool.name(), error = %e, "Linter unavailable");
                BackendVerdict::unavailable(e.to_string())
            }
        }
    }
}

/// Verilator first, Icarus as fallback.
pub fn lint_chain(
    rtl_dir: &Path,
    verilator: &str,
    iverilog: &str,
    timeout: Duration,
) -> BackendChain {
    BackendChain::new("lint")
        .with_backend(LintBackend::new(
            LintTool::Verilator,
            verilator,
            rtl_dir,
            timeout,
        ))
        .with_backend(LintBackend::new(LintTool::Icarus, iverilog, rtl_dir, timeout))
}

/// Result of a cocotb run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestOutcome {
    /// No harness or no pytest; the lint verdict stands.
    NotRun,
    Passed,
    Failed(String),
}

/// Keep output from the first failure marker on, else the tail.
pub fn failure_excerpt(output: &str) -> String {
    let lines: Vec<&str> = output.lines().collect();
    let start = lines.iter().position(|line| {
        line.contains("FAILED") || line.contains("ERROR") || line.contains("CalledProcessError")
    });
    let excerpt = match start {
        Some(idx) => &lines[idx..],
        None => &lines[lines.len().saturating_sub(MAX_TEST_TAIL_LINES)..],
    };
    excerpt.join("\n")
}

/// Runs a cocotb `pytest` harness from the run directory.
pub struct CocotbRunner {
    program: String,
    harness: PathBuf,
    rundir: PathBuf,
    timeout: Duration,
}

impl CocotbRunner {
    pub fn new(
        program: impl Into<String>,
        harness: impl Into<PathBuf>,
        rundir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            harness: harness.into(),
            rundir: rundir.into(),
            timeout,
        }
    }

    /// Look for the harness next to and above the code dir, then at `/src`.
    pub fn discover(code_dir: &Path) -> Option<PathBuf> {
        let mut candidates = vec![code_dir.join("src").join(HARNESS_FILE)];
        if let Some(parent) = code_dir.parent() {
            candidates.push(parent.join("src").join(HARNESS_FILE));
        }
        candidates.push(PathBuf::from("/src").join(HARNESS_FILE));
        candidates.into_iter().find(|path| path.is_file())
    }

    pub async fn run(&self) -> TestOutcome {
        if !self.harness.is_file() {
            info!(harness = %self.harness.display(), "Harness not found, skipping tests");
            return TestOutcome::NotRun;
        }
        if let Err(e) = std::fs::create_dir_all(&self.rundir) {
            warn!(dir = %self.rundir.display(), error = %e, "Could not create run directory");
        }

        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(["-v", "-s"])
            .arg(&self.harness)
            .current_dir(&self.rundir);
        info!(harness = %self.harness.display(), "Running cocotb tests");

        match run_with_timeout(&mut cmd, &self.program, self.timeout).await {
            Ok(output) => {
                let text = format!(
                    "{}\n{}",
                    String::from_utf8_lossy(&output.stdout),
                    String::from_utf8_lossy(&output.stderr)
                );
                debug!(output = %text, "Test output");
                if output.status.success() {
                    info!("cocotb tests passed");
                    TestOutcome::Passed
                } else {
                    warn!(code = ?output.status.code(), "cocotb tests failed");
                    TestOutcome::Failed(failure_excerpt(&text))
                }
            }
            Err(ToolError::Timeout { secs }) => {
                warn!(secs, "cocotb tests timed out");
                TestOutcome::Failed(format!("Tests timed out after {secs} seconds"))
            }
            Err(ToolError::NotFound { program }) => {
                info!(%program, "pytest not found, skipping tests");
                TestOutcome::NotRun
            }
            Err(e) => {
                warn!(error = %e, "Error running cocotb tests");
                TestOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Full compile/test backend for a benchmark workspace.
pub struct HdlToolchain {
    target: PathBuf,
    lint: BackendChain,
    tests: Option<CocotbRunner>,
}

impl HdlToolchain {
    pub fn new(target: impl Into<PathBuf>, lint: BackendChain) -> Self {
        Self {
            target: target.into(),
            lint,
            tests: None,
        }
    }

    pub fn with_tests(mut self, runner: CocotbRunner) -> Self {
        self.tests = Some(runner);
        self
    }

    fn write_target(&self, source: &str) -> std::io::Result<()> {
        if let Some(parent) = self.target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.target, source)
    }
}

#[async_trait]
impl CompileBackend for HdlToolchain {
    fn name(&self) -> &str {
        "toolchain"
    }

    async fn compile(&self, source: &str, module_name: Option<&str>) -> BackendVerdict {
        let report = self.compile_report(source, module_name).await;
        if report.passed {
            BackendVerdict::passed(report.diagnostics)
        } else {
            BackendVerdict::failed(report.diagnostics)
        }
    }

    async fn compile_report(&self, source: &str, module_name: Option<&str>) -> CompileResult {
        if let Err(e) = self.write_target(source) {
            warn!(target = %self.target.display(), error = %e, "Could not write target file");
            return CompileResult::failed(
                self.name(),
                format!("Could not write {}: {e}", self.target.display()),
            );
        }
        debug!(target = %self.target.display(), bytes = source.len(), "Wrote candidate");

        let lint = self.lint.compile_report(source, module_name).await;
        if !lint.passed {
            warn!(backend = %lint.backend, "Compilation failed, skipping testbench");
            return lint;
        }

        let Some(runner) = &self.tests else {
            return lint;
        };
        match runner.run().await {
            TestOutcome::NotRun => {
                info!("No testbench ran, compilation success is sufficient");
                lint
            }
            TestOutcome::Passed => CompileResult {
                passed: true,
                diagnostics: lint.diagnostics,
                backend: "cocotb".into(),
            },
            TestOutcome::Failed(output) => CompileResult::failed("cocotb", output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verilator_clean_exit_passes() {
        assert!(matches!(
            LintTool::Verilator.interpret(true, ""),
            BackendVerdict::Passed { .. }
        ));
    }

    #[test]
    fn test_verilator_coded_warnings_pass() {
        let output = "%Warning-WIDTH: top.sv:3:5: Operator ASSIGN expects 8 bits\n\
                      %Error-WIDTH: top.sv:4:1: width mismatch\n\
                      %Error: Exiting due to 2 warning(s)\n";
        assert!(matches!(
            LintTool::Verilator.interpret(false, output),
            BackendVerdict::Passed { .. }
        ));
    }

    #[test]
    fn test_verilator_real_error_fails() {
        let output = "%Error: top.sv:5:1: syntax error, unexpected endmodule\n\
                      %Error: Exiting due to 1 error(s)\n";
        match LintTool::Verilator.interpret(false, output) {
            BackendVerdict::Failed { diagnostics } => {
                assert!(diagnostics.contains("syntax error"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_lint_diagnostics_capped() {
        let output: String = (0..80)
            .map(|i| format!("%Error: top.sv:{i}:1: bad\n"))
            .collect();
        match LintTool::Verilator.interpret(false, &output) {
            BackendVerdict::Failed { diagnostics } => {
                assert_eq!(diagnostics.lines().count(), MAX_LINT_LINES);
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_icarus_warning_only_passes() {
        let output = "top.v:3: warning: Port 1 (a) of m expects 8 bits, got 4.\n";
        assert!(matches!(
            LintTool::Icarus.interpret(false, output),
            BackendVerdict::Passed { .. }
        ));
    }

    #[test]
    fn test_icarus_error_fails() {
        let output = "top.v:7: error: Unable to bind wire/reg/memory `q'\n1 error(s) during elaboration.\n";
        assert!(matches!(
            LintTool::Icarus.interpret(false, output),
            BackendVerdict::Failed { .. }
        ));
    }

    #[test]
    fn test_failure_excerpt_starts_at_marker() {
        let output = "collected 1 item\nrunning\nFAILED test_runner.py::test_counter\nassert 3 == 4\n";
        assert_eq!(
            failure_excerpt(output),
            "FAILED test_runner.py::test_counter\nassert 3 == 4"
        );
    }

    #[test]
    fn test_failure_excerpt_keeps_tail_without_marker() {
        let output: String = (0..150).map(|i| format!("line {i}\n")).collect();
        let excerpt = failure_excerpt(&output);
        assert_eq!(excerpt.lines().count(), MAX_TEST_TAIL_LINES);
        assert!(excerpt.starts_with("line 50"));
    }

    #[test]
    fn test_rtl_files_lists_verilog_then_systemverilog() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.sv"), "").unwrap();
        std::fs::write(dir.path().join("a.v"), "").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();
        let files = rtl_files(dir.path());
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.v", "b.sv"]);
    }

    #[test]
    fn test_rtl_files_missing_dir_is_empty() {
        assert!(rtl_files(Path::new("/nonexistent/rtl")).is_empty());
    }

    #[tokio::test]
    async fn test_missing_linters_report_no_tool() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("top.sv"), "module top; endmodule\n").unwrap();
        let chain = lint_chain(
            dir.path(),
            "definitely-not-verilator-xyz",
            "definitely-not-iverilog-xyz",
            Duration::from_secs(5),
        );
        let report = chain.compile_report("", Some("top")).await;
        assert!(!report.passed);
        assert!(report
            .diagnostics
            .starts_with("No suitable lint tool available (tried Verilator and Icarus)"));
    }

    #[tokio::test]
    async fn test_empty_rtl_dir_fails_without_running_tools() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LintBackend::verilator(dir.path(), Duration::from_secs(5));
        assert_eq!(
            backend.compile("", None).await,
            BackendVerdict::failed("No RTL files found")
        );
    }

    #[tokio::test]
    async fn test_toolchain_writes_target_before_linting() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("rtl").join("top.sv");
        let chain = lint_chain(
            &dir.path().join("rtl"),
            "definitely-not-verilator-xyz",
            "definitely-not-iverilog-xyz",
            Duration::from_secs(5),
        );
        let toolchain = HdlToolchain::new(&target, chain);
        let report = toolchain
            .compile_report("module top; endmodule\n", Some("top"))
            .await;
        assert_eq!(
            std::fs::read_to_string(&target).unwrap(),
            "module top; endmodule\n"
        );
        assert!(!report.passed);
        assert_eq!(report.backend, "lint");
    }

    #[tokio::test]
    async fn test_absent_harness_is_not_run() {
        let dir = tempfile::tempdir().unwrap();
        let runner = CocotbRunner::new(
            "pytest",
            dir.path().join("src").join(HARNESS_FILE),
            dir.path().join("rundir"),
            Duration::from_secs(5),
        );
        assert_eq!(runner.run().await, TestOutcome::NotRun);
    }

    #[test]
    fn test_discover_finds_harness_under_code_dir() {
        let dir = tempfile::tempdir().unwrap();
        let code_dir = dir.path().join("code");
        std::fs::create_dir_all(code_dir.join("src")).unwrap();
        std::fs::write(code_dir.join("src").join(HARNESS_FILE), "").unwrap();
        assert_eq!(
            CocotbRunner::discover(&code_dir),
            Some(code_dir.join("src").join(HARNESS_FILE))
        );
    }
}

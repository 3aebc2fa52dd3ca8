//! Attempt records and the final verdict
//!
//! An [`AttemptDraft`] is the single mutable "current" attempt. Finalizing it
//! produces an immutable [`Attempt`] that is appended to the history.

use crate::feedback::compiler::CompileResult;
use crate::feedback::error_parser::{DiagnosticSummary, ErrorCategory};
use crate::hdl::{ExtractionStrategy, PortUsageResult, StructuralReport};
use crate::prompts::TemplateKind;
use crate::state_machine::TransitionRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Main-loop attempt or the one-shot port refinement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptKind {
    Main,
    PortRefinement,
}

/// Why an attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "stage", content = "category", rename_all = "snake_case")]
pub enum AttemptFailure {
    /// Generator call failed after retries.
    Generation,
    /// Extracted source failed the structural gate.
    Structural,
    /// Backend rejected the source.
    Compile(ErrorCategory),
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generation => write!(f, "generation"),
            Self::Structural => write!(f, "structural"),
            Self::Compile(category) => write!(f, "compile({category})"),
        }
    }
}

/// How far an attempt got, for best-attempt ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptProgress {
    None,
    StructurallyValid,
    Compiled,
    PortComplete,
}

/// One finalized generate-and-validate cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    /// Main iteration this attempt belongs to (1-based).
    pub iteration: u32,
    pub kind: AttemptKind,
    pub template: TemplateKind,
    pub prompt: String,
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator_error: Option<String>,
    pub extraction: ExtractionStrategy,
    pub source: String,
    pub structural: StructuralReport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compile: Option<CompileResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<AttemptFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<DiagnosticSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_usage: Option<PortUsageResult>,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
}

impl Attempt {
    pub fn structurally_valid(&self) -> bool {
        self.structural.passed()
    }

    pub fn compiled(&self) -> bool {
        self.compile.as_ref().is_some_and(|c| c.passed)
    }

    pub fn error_category(&self) -> Option<ErrorCategory> {
        self.diagnostics.as_ref().map(|d| d.category)
    }

    pub fn progress(&self) -> AttemptProgress {
        if self.compiled() {
            match &self.port_usage {
                Some(usage) if usage.complete => AttemptProgress::PortComplete,
                _ => AttemptProgress::Compiled,
            }
        } else if self.structurally_valid() {
            AttemptProgress::StructurallyValid
        } else {
            AttemptProgress::None
        }
    }

    /// One-line summary for logs and the verdict.
    pub fn summary(&self) -> String {
        let status = match (&self.failure, self.compiled()) {
            (Some(failure), _) => format!("failed at {failure}"),
            (None, true) => match &self.port_usage {
                Some(usage) if !usage.complete => "compiled, ports incomplete".to_string(),
                _ => "compiled".to_string(),
            },
            (None, false) => "pending".to_string(),
        };
        let kind = match self.kind {
            AttemptKind::Main => "main",
            AttemptKind::PortRefinement => "port refinement",
        };
        format!(
            "iteration {} ({kind}, {}): {status}",
            self.iteration, self.template
        )
    }
}

/// The current, still-mutable attempt.
pub struct AttemptDraft {
    iteration: u32,
    kind: AttemptKind,
    template: TemplateKind,
    prompt: String,
    response: String,
    generator_error: Option<String>,
    extraction: ExtractionStrategy,
    source: String,
    structural: Option<StructuralReport>,
    compile: Option<CompileResult>,
    failure: Option<AttemptFailure>,
    diagnostics: Option<DiagnosticSummary>,
    port_usage: Option<PortUsageResult>,
    timestamp: DateTime<Utc>,
    started: Instant,
}

impl AttemptDraft {
    pub fn new(iteration: u32, kind: AttemptKind, template: TemplateKind, prompt: String) -> Self {
        Self {
            iteration,
            kind,
            template,
            prompt,
            response: String::new(),
            generator_error: None,
            extraction: ExtractionStrategy::Raw,
            source: String::new(),
            structural: None,
            compile: None,
            failure: None,
            diagnostics: None,
            port_usage: None,
            timestamp: Utc::now(),
            started: Instant::now(),
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn response(&self) -> &str {
        &self.response
    }

    pub fn record_response(&mut self, response: String) {
        self.response = response;
    }

    pub fn record_generator_error(&mut self, error: String) {
        self.generator_error = Some(error);
    }

    pub fn record_extraction(&mut self, strategy: ExtractionStrategy, source: String) {
        self.extraction = strategy;
        self.source = source;
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn record_structural(&mut self, report: StructuralReport) {
        if !report.passed() {
            let failure = if self.generator_error.is_some() && self.source.is_empty() {
                AttemptFailure::Generation
            } else {
                AttemptFailure::Structural
            };
            let mut text = report.format_for_llm();
            if let Some(err) = &self.generator_error {
                text.push_str(&format!("- generator: {err}\n"));
            }
            self.diagnostics = Some(DiagnosticSummary::with_category(
                &text,
                ErrorCategory::Syntax,
            ));
            self.failure = Some(failure);
        }
        self.structural = Some(report);
    }

    pub fn record_compile(&mut self, result: CompileResult) {
        if !result.passed {
            let summary = DiagnosticSummary::from_text(&result.diagnostics);
            self.failure = Some(AttemptFailure::Compile(summary.category));
            self.diagnostics = Some(summary);
        }
        self.compile = Some(result);
    }

    pub fn record_port_usage(&mut self, usage: PortUsageResult) {
        self.port_usage = Some(usage);
    }

    pub fn finalize(self) -> Attempt {
        let structural = self
            .structural
            .unwrap_or_else(|| crate::hdl::validate_structure(&self.source));
        Attempt {
            iteration: self.iteration,
            kind: self.kind,
            template: self.template,
            prompt: self.prompt,
            response: self.response,
            generator_error: self.generator_error,
            extraction: self.extraction,
            source: self.source,
            structural,
            compile: self.compile,
            failure: self.failure,
            diagnostics: self.diagnostics,
            port_usage: self.port_usage,
            timestamp: self.timestamp,
            duration_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}

/// How the run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    /// Compiled, but port refinement did not produce a better candidate.
    SuccessWithIncompletePorts,
    /// Iteration budget or deadline exhausted without a compiling candidate.
    Timeout,
}

impl Outcome {
    pub fn is_success(self) -> bool {
        !matches!(self, Self::Timeout)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::SuccessWithIncompletePorts => write!(f, "success_with_incomplete_ports"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// Final, immutable result of a refinement run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub outcome: Outcome,
    pub final_source: String,
    /// Main iterations consumed (port refinement not counted).
    pub iterations: u32,
    pub attempts: Vec<Attempt>,
    pub transitions: Vec<TransitionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_port_usage: Option<PortUsageResult>,
}

impl Verdict {
    pub fn attempt_summaries(&self) -> Vec<String> {
        self.attempts.iter().map(Attempt::summary).collect()
    }

    pub fn generator_calls(&self) -> usize {
        self.attempts.len()
    }
}

/// Best attempt by progress, latest on ties.
pub fn best_attempt(attempts: &[Attempt]) -> Option<&Attempt> {
    attempts
        .iter()
        .enumerate()
        .max_by_key(|(idx, attempt)| (attempt.progress(), *idx))
        .map(|(_, attempt)| attempt)
}

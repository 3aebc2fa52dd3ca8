//! Iterative refinement loop
//!
//! Drives one task to a verdict:
//! 1. Build a prompt (initial, or error refinement from the latest source)
//! 2. Generate, with bounded retry
//! 3. Extract source and run the structural gate
//! 4. Compile through the backend
//! 5. Check port usage; if incomplete, spend one extra generation on it
//!
//! The loop never fails. Every path ends in a [`Verdict`].

use crate::config::{ConfigError, RefinementOptions};
use crate::feedback::attempt::{best_attempt, Attempt, AttemptDraft, AttemptKind, Outcome, Verdict};
use crate::feedback::compiler::{CompileBackend, CompileResult};
use crate::generator::Generator;
use crate::hdl::{analyze_ports, extract, module_name, validate_structure, PortUsageResult};
use crate::prompts::{BuiltPrompt, PromptBuilder, PromptRequest};
use crate::resilience::generate_with_retry;
use crate::state_machine::{LoopState, StateMachine};
use crate::task::Task;
use std::future::Future;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// How a run ended, before it is packaged into a verdict.
struct Finish {
    outcome: Outcome,
    source: String,
    port_usage: Option<PortUsageResult>,
    reason: String,
}

impl Finish {
    /// Out of budget or time: fall back to the best attempt so far.
    fn timeout(attempts: &[Attempt], reason: &str) -> Self {
        let best = best_attempt(attempts);
        Self {
            outcome: Outcome::Timeout,
            source: best.map(|a| a.source.clone()).unwrap_or_default(),
            port_usage: best.and_then(|a| a.port_usage.clone()),
            reason: reason.to_string(),
        }
    }
}

/// Result of evaluating one prompt.
enum Evaluation {
    Completed(Attempt),
    DeadlineExceeded(Attempt),
}

/// Generate-validate-refine controller for a single task at a time.
pub struct RefinementLoop<G, C> {
    generator: G,
    backend: C,
    options: RefinementOptions,
}

impl<G: Generator, C: CompileBackend> RefinementLoop<G, C> {
    /// Options are validated once here and never re-read from the environment.
    pub fn new(generator: G, backend: C, options: RefinementOptions) -> Result<Self, ConfigError> {
        options.validate()?;
        Ok(Self {
            generator,
            backend,
            options,
        })
    }

    /// Run the loop for `task` until success, budget exhaustion or deadline.
    pub async fn run(&self, task: &Task) -> Verdict {
        let max_iterations = self.options.max_iterations;
        let deadline = self.options.overall_deadline().map(|d| Instant::now() + d);
        let builder = PromptBuilder::new(task, &self.options);
        let mut machine = StateMachine::new();
        let mut attempts: Vec<Attempt> = Vec::new();
        let mut iterations = 0;

        info!(
            task = %task.name,
            max_iterations,
            port_validation = self.options.enable_port_validation,
            context_items = builder.context().items.len(),
            "Starting refinement loop"
        );

        let mut finish = None;
        for iteration in 1..=max_iterations {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                finish = Some(Finish::timeout(&attempts, "overall deadline exceeded"));
                break;
            }
            iterations = iteration;
            machine.set_iteration(iteration);

            let prompt = builder.build(next_request(&attempts));
            info!(
                iteration,
                max_iterations,
                template = %prompt.template,
                prompt_chars = prompt.text.len(),
                "Starting iteration"
            );

            let attempt = match self
                .evaluate(&mut machine, iteration, AttemptKind::Main, prompt, deadline)
                .await
            {
                Evaluation::Completed(attempt) => attempt,
                Evaluation::DeadlineExceeded(attempt) => {
                    attempts.push(attempt);
                    finish = Some(Finish::timeout(&attempts, "overall deadline exceeded"));
                    break;
                }
            };
            info!(iteration, "{}", attempt.summary());

            if !attempt.compiled() {
                let reason = attempt
                    .failure
                    .map(|f| format!("{f} failure"))
                    .unwrap_or_else(|| "validation failure".to_string());
                attempts.push(attempt);
                if iteration < max_iterations {
                    advance(&mut machine, LoopState::Generating, &reason);
                }
                continue;
            }

            let incomplete_usage = attempt.port_usage.clone().filter(|u| !u.complete);
            let source = attempt.source.clone();
            let port_usage = attempt.port_usage.clone();
            attempts.push(attempt);

            finish = Some(match incomplete_usage {
                Some(usage) => {
                    self.refine_ports(
                        &builder,
                        &mut machine,
                        &mut attempts,
                        iteration,
                        source,
                        usage,
                        deadline,
                    )
                    .await
                }
                None => Finish {
                    outcome: Outcome::Success,
                    source,
                    port_usage,
                    reason: "compiled".to_string(),
                },
            });
            break;
        }

        let finish =
            finish.unwrap_or_else(|| Finish::timeout(&attempts, "iteration budget exhausted"));
        advance(&mut machine, LoopState::Done, &finish.reason);

        info!(
            task = %task.name,
            outcome = %finish.outcome,
            iterations,
            attempts = attempts.len(),
            "Refinement loop finished"
        );

        Verdict {
            outcome: finish.outcome,
            final_source: finish.source,
            iterations,
            attempts,
            transitions: machine.into_transitions(),
            final_port_usage: finish.port_usage,
        }
    }

    /// One extra generation aimed at unused inputs and undriven outputs.
    ///
    /// A refined candidate that compiles replaces the original. Anything else
    /// reverts to the original compiled source.
    #[allow(clippy::too_many_arguments)]
    async fn refine_ports(
        &self,
        builder: &PromptBuilder<'_>,
        machine: &mut StateMachine,
        attempts: &mut Vec<Attempt>,
        iteration: u32,
        source: String,
        usage: PortUsageResult,
        deadline: Option<Instant>,
    ) -> Finish {
        info!(
            unused_inputs = ?usage.unused_inputs,
            unassigned_outputs = ?usage.unassigned_outputs,
            "Ports incomplete, attempting port refinement"
        );
        advance(machine, LoopState::PortRefining, "ports incomplete");

        let prompt = builder.build(PromptRequest::PortRefinement {
            current_code: &source,
            usage: &usage,
        });
        let refined = match self
            .evaluate(machine, iteration, AttemptKind::PortRefinement, prompt, deadline)
            .await
        {
            Evaluation::Completed(attempt) => attempt,
            Evaluation::DeadlineExceeded(attempt) => {
                attempts.push(attempt);
                return Finish::timeout(attempts, "overall deadline exceeded");
            }
        };
        info!(iteration, "{}", refined.summary());

        let finish = if refined.compiled() {
            Finish {
                outcome: Outcome::Success,
                source: refined.source.clone(),
                port_usage: refined.port_usage.clone(),
                reason: "port refinement compiled".to_string(),
            }
        } else {
            warn!(
                failure = ?refined.failure,
                "Port refinement did not compile, keeping original source"
            );
            Finish {
                outcome: Outcome::SuccessWithIncompletePorts,
                source,
                port_usage: Some(usage),
                reason: "port refinement reverted".to_string(),
            }
        };
        attempts.push(refined);
        finish
    }

    /// Generate, extract, check structure, compile and analyze ports for one
    /// prompt. State transitions are recorded for main attempts only; the
    /// port-refinement attempt runs entirely inside `PortRefining`.
    async fn evaluate(
        &self,
        machine: &mut StateMachine,
        iteration: u32,
        kind: AttemptKind,
        prompt: BuiltPrompt,
        deadline: Option<Instant>,
    ) -> Evaluation {
        let track = kind == AttemptKind::Main;
        let mut draft = AttemptDraft::new(iteration, kind, prompt.template, prompt.text);

        let generation = generate_with_retry(
            &self.generator,
            draft.prompt(),
            &self.options.generation,
            &self.options.retry,
            self.options.generation_timeout(),
        );
        let Some(generated) = within_deadline(deadline, generation).await else {
            warn!(iteration, "Overall deadline exceeded during generation");
            draft.record_generator_error("overall deadline exceeded".to_string());
            return Evaluation::DeadlineExceeded(draft.finalize());
        };
        match generated {
            Ok(response) => draft.record_response(response),
            Err(e) => {
                warn!(iteration, error = %e, "Generation failed, continuing with empty response");
                draft.record_generator_error(e.to_string());
            }
        }

        if track {
            advance(machine, LoopState::Extracting, "response received");
        }
        let extraction = extract(draft.response());
        debug!(iteration, strategy = %extraction.strategy, "Extraction");
        draft.record_extraction(extraction.strategy, extraction.source);

        if track {
            advance(machine, LoopState::StructuralCheck, "source extracted");
        }
        let report = validate_structure(draft.source());
        if !report.passed() {
            let violations: Vec<String> =
                report.violations().iter().map(|v| v.check.to_string()).collect();
            info!(iteration, ?violations, "Structural check failed");
            draft.record_structural(report);
            return Evaluation::Completed(draft.finalize());
        }
        draft.record_structural(report);

        if track {
            advance(machine, LoopState::Compiling, "structure valid");
        }
        let module = module_name(draft.source());
        let compile_timeout = self.options.compile_timeout();
        let compile = tokio::time::timeout(
            compile_timeout,
            self.backend.compile_report(draft.source(), module.as_deref()),
        );
        let result = match within_deadline(deadline, compile).await {
            None => {
                warn!(iteration, "Overall deadline exceeded during compilation");
                return Evaluation::DeadlineExceeded(draft.finalize());
            }
            Some(Err(_)) => {
                warn!(iteration, timeout_secs = compile_timeout.as_secs(), "Compile timed out");
                CompileResult::failed(
                    self.backend.name(),
                    format!("Compile timeout after {}s", compile_timeout.as_secs()),
                )
            }
            Some(Ok(result)) => result,
        };

        let passed = result.passed;
        if passed {
            info!(iteration, backend = %result.backend, "Compile passed");
        } else {
            info!(iteration, backend = %result.backend, "Compile failed");
        }
        draft.record_compile(result);

        if passed && self.options.enable_port_validation {
            if track {
                advance(machine, LoopState::PortCheck, "compiled");
            }
            let usage = analyze_ports(draft.source());
            draft.record_port_usage(usage);
        }

        Evaluation::Completed(draft.finalize())
    }
}

/// Error refinement from the latest main attempt that produced source, or the
/// initial template when none has.
fn next_request(attempts: &[Attempt]) -> PromptRequest<'_> {
    attempts
        .iter()
        .rev()
        .filter(|a| a.kind == AttemptKind::Main && !a.source.trim().is_empty())
        .find_map(|a| {
            a.diagnostics
                .as_ref()
                .map(|diagnostics| PromptRequest::ErrorRefinement {
                    previous_code: &a.source,
                    diagnostics,
                    iteration: a.iteration,
                })
        })
        .unwrap_or(PromptRequest::Initial)
}

/// Await `fut`, or return `None` once `deadline` passes.
async fn within_deadline<F: Future>(deadline: Option<Instant>, fut: F) -> Option<F::Output> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, fut).await.ok(),
        None => Some(fut.await),
    }
}

fn advance(machine: &mut StateMachine, to: LoopState, reason: &str) {
    if let Err(e) = machine.advance(to, Some(reason)) {
        warn!(error = %e, "Ignoring illegal loop transition");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::compiler::BackendVerdict;
    use crate::feedback::error_parser::{DiagnosticSummary, ErrorCategory};
    use crate::hdl::ExtractionStrategy;
    use crate::prompts::TemplateKind;

    fn attempt(iteration: u32, source: &str, diagnostics: Option<&str>) -> Attempt {
        let mut draft =
            AttemptDraft::new(iteration, AttemptKind::Main, TemplateKind::Initial, String::new());
        draft.record_extraction(ExtractionStrategy::Raw, source.to_string());
        draft.record_structural(validate_structure(source));
        if let Some(text) = diagnostics {
            draft.record_compile(CompileResult::from_verdict(
                "lint",
                BackendVerdict::failed(text),
            ));
        }
        draft.finalize()
    }

    #[test]
    fn test_first_prompt_is_initial() {
        assert_eq!(next_request(&[]).template(), TemplateKind::Initial);
    }

    #[test]
    fn test_refines_latest_source() {
        let attempts = vec![
            attempt(1, "module a; endmodule", Some("syntax error one")),
            attempt(2, "module b; endmodule", Some("syntax error two")),
        ];
        match next_request(&attempts) {
            PromptRequest::ErrorRefinement {
                previous_code,
                iteration,
                diagnostics,
            } => {
                assert_eq!(previous_code, "module b; endmodule");
                assert_eq!(iteration, 2);
                assert_eq!(diagnostics.category, ErrorCategory::Syntax);
            }
            other => panic!("unexpected request {:?}", other.template()),
        }
    }

    #[test]
    fn test_skips_empty_generation() {
        let attempts = vec![
            attempt(1, "module a; endmodule", Some("syntax error")),
            attempt(2, "", None),
        ];
        match next_request(&attempts) {
            PromptRequest::ErrorRefinement { previous_code, .. } => {
                assert_eq!(previous_code, "module a; endmodule")
            }
            other => panic!("unexpected request {:?}", other.template()),
        }
    }

    #[test]
    fn test_diagnostic_summary_attached() {
        let a = attempt(1, "module a(; endmodule", None);
        let summary: &DiagnosticSummary = a.diagnostics.as_ref().unwrap();
        assert!(summary.text.contains("balanced_parens"));
    }

    #[tokio::test]
    async fn test_within_deadline_passes_through() {
        assert_eq!(within_deadline(None, async { 7 }).await, Some(7));
        let past = Instant::now();
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        assert_eq!(
            within_deadline(Some(past), std::future::pending::<u8>()).await,
            None
        );
    }
}

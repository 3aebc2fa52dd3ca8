//! Compile/test backend abstraction with ordered fallback
//!
//! A backend takes extracted HDL source and reports pass, fail, or that it
//! cannot run at all (tool missing). A [`BackendChain`] tries backends in a
//! fixed order until one produces a real verdict.
//!
//! ```text
//! verilator ──unavailable──► iverilog ──unavailable──► failed("no tool")
//!     │                          │
//!  passed/failed              passed/failed
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Raw verdict from one backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BackendVerdict {
    /// Source accepted. Diagnostics may still carry warnings.
    Passed { diagnostics: String },
    /// Source rejected.
    Failed { diagnostics: String },
    /// Backend could not run (executable missing, harness absent).
    Unavailable { reason: String },
}

impl BackendVerdict {
    pub fn passed(diagnostics: impl Into<String>) -> Self {
        Self::Passed {
            diagnostics: diagnostics.into(),
        }
    }

    pub fn failed(diagnostics: impl Into<String>) -> Self {
        Self::Failed {
            diagnostics: diagnostics.into(),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Compile outcome recorded on an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileResult {
    pub passed: bool,
    pub diagnostics: String,
    /// Backend that produced the verdict.
    pub backend: String,
}

impl CompileResult {
    /// Convert a backend verdict. `Unavailable` counts as a failure.
    pub fn from_verdict(backend: &str, verdict: BackendVerdict) -> Self {
        let (passed, diagnostics) = match verdict {
            BackendVerdict::Passed { diagnostics } => (true, diagnostics),
            BackendVerdict::Failed { diagnostics } => (false, diagnostics),
            BackendVerdict::Unavailable { reason } => (false, reason),
        };
        Self {
            passed,
            diagnostics,
            backend: backend.to_string(),
        }
    }

    pub fn failed(backend: &str, diagnostics: impl Into<String>) -> Self {
        Self {
            passed: false,
            diagnostics: diagnostics.into(),
            backend: backend.to_string(),
        }
    }
}

/// An external compile or test tool.
#[async_trait]
pub trait CompileBackend: Send + Sync {
    /// Short identifier used in logs and results.
    fn name(&self) -> &str;

    /// Check `source`. `module_name` is the top module when known.
    async fn compile(&self, source: &str, module_name: Option<&str>) -> BackendVerdict;

    /// Verdict plus the name of the backend that produced it.
    async fn compile_report(&self, source: &str, module_name: Option<&str>) -> CompileResult {
        CompileResult::from_verdict(self.name(), self.compile(source, module_name).await)
    }
}

/// Ordered fallback over interchangeable backends.
pub struct BackendChain {
    label: String,
    backends: Vec<Box<dyn CompileBackend>>,
}

impl BackendChain {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            backends: Vec::new(),
        }
    }

    /// Append a backend at the lowest priority.
    pub fn with_backend(mut self, backend: impl CompileBackend + 'static) -> Self {
        self.backends.push(Box::new(backend));
        self
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Message used when no backend could run.
    fn exhausted_message(&self, reasons: &[String]) -> String {
        let mut msg = format!(
            "No suitable {} tool available (tried {})",
            self.label,
            self.backend_names().join(" and ")
        );
        for reason in reasons {
            msg.push_str("\n- ");
            msg.push_str(reason);
        }
        msg
    }
}

#[async_trait]
impl CompileBackend for BackendChain {
    fn name(&self) -> &str {
        &self.label
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
        let mut reasons = Vec::new();

        for (idx, backend) in self.backends.iter().enumerate() {
            let verdict = backend.compile(source, module_name).await;
            if let BackendVerdict::Unavailable { reason } = &verdict {
                debug!(backend = backend.name(), %reason, "Backend unavailable");
                reasons.push(format!("{}: {}", backend.name(), reason));
                continue;
            }
            if idx > 0 {
                warn!(
                    chain = %self.label,
                    backend = backend.name(),
                    "Primary backend(s) unavailable, using fallback"
                );
            }
            return CompileResult::from_verdict(backend.name(), verdict);
        }

        warn!(chain = %self.label, tried = self.backends.len(), "No backend available");
        CompileResult::failed(&self.label, self.exhausted_message(&reasons))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FixedBackend {
        name: &'static str,
        verdict: BackendVerdict,
        calls: Arc<AtomicUsize>,
    }

    impl FixedBackend {
        fn new(name: &'static str, verdict: BackendVerdict) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    name,
                    verdict,
                    calls: Arc::clone(&calls),
                },
                calls,
            )
        }
    }

    #[async_trait]
    impl CompileBackend for FixedBackend {
        fn name(&self) -> &str {
            self.name
        }

        async fn compile(&self, _source: &str, _module_name: Option<&str>) -> BackendVerdict {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.verdict.clone()
        }
    }

    #[tokio::test]
    async fn test_primary_verdict_stops_chain() {
        let (first, first_calls) = FixedBackend::new("verilator", BackendVerdict::failed("%Error: x"));
        let (second, second_calls) = FixedBackend::new("iverilog", BackendVerdict::passed(""));
        let chain = BackendChain::new("lint").with_backend(first).with_backend(second);

        let result = chain.compile_report("module m; endmodule", Some("m")).await;
        assert!(!result.passed);
        assert_eq!(result.backend, "verilator");
        assert_eq!(result.diagnostics, "%Error: x");
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_falls_back_when_unavailable() {
        let (first, _) = FixedBackend::new("verilator", BackendVerdict::unavailable("not installed"));
        let (second, _) = FixedBackend::new("iverilog", BackendVerdict::passed("warning: unused"));
        let chain = BackendChain::new("lint").with_backend(first).with_backend(second);

        let result = chain.compile_report("module m; endmodule", None).await;
        assert!(result.passed);
        assert_eq!(result.backend, "iverilog");
    }

    #[tokio::test]
    async fn test_all_unavailable_is_failure() {
        let (first, _) = FixedBackend::new("Verilator", BackendVerdict::unavailable("missing"));
        let (second, _) = FixedBackend::new("Icarus", BackendVerdict::unavailable("missing"));
        let chain = BackendChain::new("lint").with_backend(first).with_backend(second);

        let result = chain.compile_report("module m; endmodule", None).await;
        assert!(!result.passed);
        assert_eq!(result.backend, "lint");
        assert!(result
            .diagnostics
            .starts_with("No suitable lint tool available (tried Verilator and Icarus)"));
    }

    #[tokio::test]
    async fn test_single_backend_unavailable_becomes_failure() {
        let (only, _) = FixedBackend::new("sim", BackendVerdict::unavailable("no harness"));
        let result = only.compile_report("", None).await;
        assert!(!result.passed);
        assert_eq!(result.diagnostics, "no harness");
    }

    #[tokio::test]
    async fn test_chain_as_backend_verdict() {
        let (only, _) = FixedBackend::new("verilator", BackendVerdict::passed(""));
        let chain = BackendChain::new("lint").with_backend(only);
        assert_eq!(chain.compile("", None).await, BackendVerdict::passed(""));
        assert_eq!(chain.len(), 1);
        assert!(!chain.is_empty());
    }
}

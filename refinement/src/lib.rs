//! HDL Refinement Library
//!
//! Drives a text generator toward a Verilog/SystemVerilog module that
//! compiles and uses its whole interface:
//!
//! ```text
//! Task ─► PromptBuilder ─► Generator (retry) ─► Extractor ─► Structural gate
//!             ▲                                                   │
//!             │                                                   ▼
//!        ErrorParser ◄──────── failure ──────────────────── CompileBackend
//!                                                                 │ pass
//!                                                                 ▼
//!                                       Verdict ◄── port refinement ◄── Ports
//! ```
//!
//! The core performs no I/O of its own. Generators and compile backends are
//! traits; the `rtl-agent` crate provides HTTP and toolchain implementations.
//!
//! # Usage
//!
//! ```ignore
//! let options = RefinementOptions::default();
//! let refinement = RefinementLoop::new(generator, backend, options)?;
//! let verdict = refinement.run(&Task::new("counter", "8-bit counter")).await;
//! ```

pub mod config;
pub mod context_packer;
pub mod feedback;
pub mod generator;
pub mod hdl;
pub mod prompts;
pub mod resilience;
pub mod state_machine;
pub mod task;

pub use config::{ConfigError, RefinementOptions};
pub use context_packer::{optimize_context, ContextBudget, ContextSelection, SectionPlan};
pub use feedback::{
    Attempt, AttemptFailure, AttemptKind, BackendChain, BackendVerdict, CompileBackend,
    CompileResult, DiagnosticSummary, ErrorCategory, Outcome, RefinementLoop, Verdict,
};
pub use generator::{GenerationParams, Generator, GeneratorError};
pub use hdl::{
    analyze_ports, extract, validate_structure, Extraction, ExtractionStrategy, PortUsage,
    PortUsageResult, StructuralReport,
};
pub use prompts::{PromptBuilder, PromptRequest, TemplateKind};
pub use resilience::{generate_with_retry, RetryPolicy};
pub use state_machine::{IllegalTransition, LoopState, StateMachine, TransitionRecord};
pub use task::{ContextItem, PriorityClass, Task};

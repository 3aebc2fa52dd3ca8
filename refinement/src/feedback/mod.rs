//! Compile Feedback Module
//!
//! Provides the feedback loop for iterative HDL refinement:
//! - Run the extracted source through compile/test backends
//! - Classify and compress diagnostics
//! - Feed them back to the generator until the source compiles
//!
//! # Architecture
//!
//! ```text
//! Prompt → Generator → Extractor → Structural → Backend → Ports → Verdict
//!    ↑                                 │            │
//!    └──────── ErrorParser ◄───────────┴────────────┘
//! ```

pub mod attempt;
pub mod compiler;
pub mod error_parser;
pub mod refinement_loop;

pub use attempt::{
    best_attempt, Attempt, AttemptDraft, AttemptFailure, AttemptKind, AttemptProgress, Outcome,
    Verdict,
};
pub use compiler::{BackendChain, BackendVerdict, CompileBackend, CompileResult};
pub use error_parser::{categorize, compress, DiagnosticSummary, ErrorCategory};
pub use refinement_loop::RefinementLoop;

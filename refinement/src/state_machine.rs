//! Refinement loop state machine: explicit states and legal transition guards.
//!
//! The controller calls `advance()` at every step. Each call validates the
//! edge against the transition table and appends it to the transition log,
//! which is returned in the final verdict for replay and diagnostics.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// States of one refinement run.
///
/// Every run starts at `Generating` and terminates at `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    /// Building the prompt and calling the generator.
    Generating,
    /// Pulling source out of the response.
    Extracting,
    /// Running the structural gate.
    StructuralCheck,
    /// Running the compile backend.
    Compiling,
    /// Analyzing port usage of compiled source.
    PortCheck,
    /// One extra generation to fix port usage.
    PortRefining,
    /// Terminal.
    Done,
}

impl LoopState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done)
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generating => write!(f, "GENERATING"),
            Self::Extracting => write!(f, "EXTRACTING"),
            Self::StructuralCheck => write!(f, "STRUCTURAL_CHECK"),
            Self::Compiling => write!(f, "COMPILING"),
            Self::PortCheck => write!(f, "PORT_CHECK"),
            Self::PortRefining => write!(f, "PORT_REFINING"),
            Self::Done => write!(f, "DONE"),
        }
    }
}

/// Legal transitions between loop states.
///
/// ```text
/// Generating      → Extracting
/// Extracting      → StructuralCheck
/// StructuralCheck → Compiling | Generating (retry)
/// Compiling       → PortCheck | Generating (retry)
/// PortCheck       → PortRefining
/// PortRefining    → Done
/// any non-terminal → Done
/// ```
fn is_legal_transition(from: LoopState, to: LoopState) -> bool {
    use LoopState::*;

    if to == Done && !from.is_terminal() {
        return true;
    }

    matches!(
        (from, to),
        (Generating, Extracting)
            | (Extracting, StructuralCheck)
            | (StructuralCheck, Compiling)
            | (StructuralCheck, Generating)
            | (Compiling, PortCheck)
            | (Compiling, Generating)
            | (PortCheck, PortRefining)
    )
}

/// A single recorded state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: LoopState,
    pub to: LoopState,
    /// Main iteration at the time of transition.
    pub iteration: u32,
    /// Milliseconds since the run started.
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Returned when an edge is not in the transition table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Illegal state transition: {from} → {to}")]
pub struct IllegalTransition {
    pub from: LoopState,
    pub to: LoopState,
}

/// Tracks the current state and the full transition log.
pub struct StateMachine {
    current: LoopState,
    iteration: u32,
    created_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            current: LoopState::Generating,
            iteration: 0,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> LoopState {
        self.current
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn set_iteration(&mut self, iteration: u32) {
        self.iteration = iteration;
    }

    /// Move to `to` if the edge is legal, recording it.
    pub fn advance(&mut self, to: LoopState, reason: Option<&str>) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        tracing::debug!(
            from = %self.current,
            to = %to,
            iteration = self.iteration,
            "State transition"
        );

        self.transitions.push(TransitionRecord {
            from: self.current,
            to,
            iteration: self.iteration,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        });
        self.current = to;
        Ok(())
    }

    /// Terminate from any non-terminal state.
    pub fn finish(&mut self, reason: &str) -> Result<(), IllegalTransition> {
        self.advance(LoopState::Done, Some(reason))
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    pub fn into_transitions(self) -> Vec<TransitionRecord> {
        self.transitions
    }

    /// One-line history, e.g. `GENERATING → DONE (3 transitions)`.
    pub fn summary(&self) -> String {
        let path: Vec<String> = self.transitions.iter().map(|t| t.to.to_string()).collect();
        let mut out = format!(
            "{} → {} ({} transitions)",
            LoopState::Generating,
            self.current,
            self.transitions.len()
        );
        if !path.is_empty() {
            out.push_str(&format!(" [{}]", path.join(" → ")));
        }
        out
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

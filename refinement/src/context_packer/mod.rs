//! Context Packer: budgeted auxiliary context for generation prompts
//!
//! Prioritizes spec documents over existing RTL over verification artifacts
//! and fits the survivors into the context share of the prompt budget.

pub mod packer;

pub use packer::{
    optimize_context, truncate_chars, ContextBudget, ContextSelection, PackedItem, SectionPlan,
    TRUNCATION_MARKER,
};

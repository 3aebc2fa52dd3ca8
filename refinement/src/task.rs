//! Task input: requirement text plus auxiliary context items.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Priority class of a context item. Declaration order is priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityClass {
    /// Specification documents (`docs/`).
    Spec,
    /// Existing RTL (`rtl/`).
    Design,
    /// Testbenches (`verif/`, anything else).
    Verification,
}

impl PriorityClass {
    /// Classify a path tag by its leading directory.
    pub fn from_path(path: &str) -> Self {
        let normalized = path.trim_start_matches("./").replace('\\', "/");
        if normalized.starts_with("docs/") {
            Self::Spec
        } else if normalized.starts_with("rtl/") {
            Self::Design
        } else {
            Self::Verification
        }
    }
}

impl fmt::Display for PriorityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spec => write!(f, "spec"),
            Self::Design => write!(f, "design"),
            Self::Verification => write!(f, "verification"),
        }
    }
}

/// One auxiliary file handed to the generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextItem {
    /// Path tag, e.g. `docs/spec.md`.
    pub path: String,
    pub priority: PriorityClass,
    pub content: String,
}

impl ContextItem {
    pub fn new(path: impl Into<String>, priority: PriorityClass, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            priority,
            content: content.into(),
        }
    }

    /// Build an item whose priority is derived from its path tag.
    pub fn from_path(path: impl Into<String>, content: impl Into<String>) -> Self {
        let path = path.into();
        let priority = PriorityClass::from_path(&path);
        Self {
            path,
            priority,
            content: content.into(),
        }
    }
}

/// Immutable description of one generation job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Identifier used in logs and the verdict.
    pub name: String,
    /// Natural-language requirement text.
    pub requirement: String,
    /// Context items in discovery order.
    pub context: Vec<ContextItem>,
}

impl Task {
    pub fn new(name: impl Into<String>, requirement: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requirement: requirement.into(),
            context: Vec::new(),
        }
    }

    pub fn with_context(mut self, items: Vec<ContextItem>) -> Self {
        self.context = items;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order() {
        assert!(PriorityClass::Spec < PriorityClass::Design);
        assert!(PriorityClass::Design < PriorityClass::Verification);
    }

    #[test]
    fn test_priority_from_path() {
        assert_eq!(PriorityClass::from_path("docs/spec.md"), PriorityClass::Spec);
        assert_eq!(PriorityClass::from_path("./rtl/top.sv"), PriorityClass::Design);
        assert_eq!(
            PriorityClass::from_path("verif/tb_top.sv"),
            PriorityClass::Verification
        );
        assert_eq!(
            PriorityClass::from_path("rundir/agent.log"),
            PriorityClass::Verification
        );
    }

    #[test]
    fn test_task_builder() {
        let task = Task::new("counter", "Build a counter")
            .with_context(vec![ContextItem::from_path("docs/a.md", "text")]);
        assert_eq!(task.context.len(), 1);
        assert_eq!(task.context[0].priority, PriorityClass::Spec);
    }
}

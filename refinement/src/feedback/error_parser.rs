//! HDL diagnostic classification and compression
//!
//! Classifies lint/simulator output into a small fixed taxonomy and trims it
//! to something that fits in a refinement prompt.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Lines above this count are compressed.
pub const MAX_DIAGNOSTIC_LINES: usize = 50;

/// Lines that carry an error or failure marker.
static MARKER_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(error|fail|assert|exception)").unwrap());

/// Output produced by a test harness rather than a compiler.
static TEST_FAILURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(FAILED|AssertionError|\bassert\b|pytest|cocotb)").unwrap());

/// Diagnostic categories, in classification priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Syntax,
    Undeclared,
    Type,
    Width,
    Latch,
    Timing,
    General,
}

impl ErrorCategory {
    /// Priority order; the first category with a keyword hit wins.
    pub const ORDER: [Self; 7] = [
        Self::Syntax,
        Self::Undeclared,
        Self::Type,
        Self::Width,
        Self::Latch,
        Self::Timing,
        Self::General,
    ];

    /// Lowercase substrings that select this category.
    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            Self::Syntax => &["syntax error", "parse error", "unexpected", "expected"],
            Self::Undeclared => &["undeclared", "undefined", "not declared"],
            Self::Type => &["type mismatch", "incompatible types"],
            Self::Width => &["width", "bit width", "size mismatch"],
            Self::Latch => &["latch"],
            Self::Timing => &["timing", "setup", "hold"],
            Self::General => &[],
        }
    }

    /// One-line hint included with the diagnostics in refinement prompts.
    pub fn guidance(self) -> &'static str {
        match self {
            Self::Syntax => "Fix the syntax errors; check statement terminators and begin/end pairing.",
            Self::Undeclared => "Declare every signal before use or correct misspelled identifiers.",
            Self::Type => "Make operand and assignment types compatible.",
            Self::Width => "Match bit widths on both sides of assignments and comparisons.",
            Self::Latch => "Assign every output on all branches of combinational blocks.",
            Self::Timing => "Review clocking and register the affected paths.",
            Self::General => "Address the reported problems.",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Syntax => write!(f, "syntax"),
            Self::Undeclared => write!(f, "undeclared"),
            Self::Type => write!(f, "type"),
            Self::Width => write!(f, "width"),
            Self::Latch => write!(f, "latch"),
            Self::Timing => write!(f, "timing"),
            Self::General => write!(f, "general"),
        }
    }
}

/// Classify diagnostic text.
pub fn categorize(text: &str) -> ErrorCategory {
    let lower = text.to_lowercase();
    ErrorCategory::ORDER
        .into_iter()
        .find(|category| category.keywords().iter().any(|kw| lower.contains(kw)))
        .unwrap_or(ErrorCategory::General)
}

/// Whether the text looks like test harness output.
pub fn is_test_failure(text: &str) -> bool {
    TEST_FAILURE.is_match(text)
}

/// Compress diagnostic text to at most [`MAX_DIAGNOSTIC_LINES`] lines.
///
/// Short text is returned unchanged. Longer text keeps only marker lines
/// (all lines if none carry a marker). Test output keeps its tail, where the
/// failing assertion is; everything else keeps its head, where the first
/// error is.
pub fn compress(text: &str, category: ErrorCategory) -> String {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() <= MAX_DIAGNOSTIC_LINES {
        return text.to_string();
    }

    let marked: Vec<&str> = lines
        .iter()
        .copied()
        .filter(|line| MARKER_LINE.is_match(line))
        .collect();
    let pool = if marked.is_empty() { lines } else { marked };

    if pool.len() <= MAX_DIAGNOSTIC_LINES {
        return pool.join("\n");
    }

    let keep_tail = category != ErrorCategory::Syntax && is_test_failure(text);
    let kept = if keep_tail {
        &pool[pool.len() - MAX_DIAGNOSTIC_LINES..]
    } else {
        &pool[..MAX_DIAGNOSTIC_LINES]
    };
    kept.join("\n")
}

/// Categorized and compressed diagnostics for one failed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticSummary {
    pub category: ErrorCategory,
    pub text: String,
    /// Line count before compression.
    pub original_lines: usize,
}

impl DiagnosticSummary {
    pub fn from_text(text: &str) -> Self {
        let category = categorize(text);
        Self {
            category,
            text: compress(text, category),
            original_lines: text.lines().count(),
        }
    }

    /// Summary with a fixed category (e.g. structural failures).
    pub fn with_category(text: &str, category: ErrorCategory) -> Self {
        Self {
            category,
            text: compress(text, category),
            original_lines: text.lines().count(),
        }
    }

    pub fn was_compressed(&self) -> bool {
        self.text.lines().count() < self.original_lines
    }

    /// Diagnostics block for a refinement prompt.
    pub fn format_for_llm(&self) -> String {
        format!(
            "Error category: {}\n{}\n\n{}",
            self.category,
            self.category.guidance(),
            self.text
        )
    }
}

//! Cheap structural gate run before any external tool.
//!
//! Every check is evaluated and reported even after a failure, so a single
//! refinement prompt can carry all of them.

use crate::hdl::text::find_word;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Individual structural checks, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructuralCheck {
    /// `module` and `endmodule` both present.
    KeywordPair,
    /// Equal number of `(` and `)`.
    BalancedParens,
    /// Equal number of `{` and `}`.
    BalancedBraces,
}

impl StructuralCheck {
    pub const ALL: [Self; 3] = [Self::KeywordPair, Self::BalancedParens, Self::BalancedBraces];

    fn evaluate(self, source: &str) -> CheckOutcome {
        let (passed, detail) = match self {
            Self::KeywordPair => {
                let has_module = find_word(source, "module").is_some();
                let has_end = find_word(source, "endmodule").is_some();
                let detail = match (has_module, has_end) {
                    (true, true) => "module/endmodule present".to_string(),
                    (false, true) => "missing 'module' keyword".to_string(),
                    (true, false) => "missing 'endmodule' keyword".to_string(),
                    (false, false) => "missing 'module' and 'endmodule' keywords".to_string(),
                };
                (has_module && has_end, detail)
            }
            Self::BalancedParens => balance(source, '(', ')'),
            Self::BalancedBraces => balance(source, '{', '}'),
        };
        CheckOutcome {
            check: self,
            passed,
            detail,
        }
    }
}

impl fmt::Display for StructuralCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeywordPair => write!(f, "keyword_pair"),
            Self::BalancedParens => write!(f, "balanced_parens"),
            Self::BalancedBraces => write!(f, "balanced_braces"),
        }
    }
}

fn balance(source: &str, open: char, close: char) -> (bool, String) {
    let opens = source.chars().filter(|&c| c == open).count();
    let closes = source.chars().filter(|&c| c == close).count();
    let detail = if opens == closes {
        format!("{opens} '{open}' / {closes} '{close}'")
    } else {
        format!("unbalanced: {opens} '{open}' vs {closes} '{close}'")
    };
    (opens == closes, detail)
}

/// Result of one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub check: StructuralCheck,
    pub passed: bool,
    pub detail: String,
}

/// All check results for one source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralReport {
    pub checks: Vec<CheckOutcome>,
}

impl StructuralReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    /// Failed checks only.
    pub fn violations(&self) -> Vec<&CheckOutcome> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }

    /// Whether a specific check failed.
    pub fn failed(&self, check: StructuralCheck) -> bool {
        self.checks.iter().any(|c| c.check == check && !c.passed)
    }

    /// Diagnostic text handed to the error-refinement prompt.
    pub fn format_for_llm(&self) -> String {
        let mut out = String::from("Code structure validation failed:\n");
        for outcome in self.violations() {
            out.push_str(&format!("- {}: {}\n", outcome.check, outcome.detail));
        }
        out
    }
}

/// Run every structural check against `source`.
pub fn validate_structure(source: &str) -> StructuralReport {
    StructuralReport {
        checks: StructuralCheck::ALL
            .iter()
            .map(|check| check.evaluate(source))
            .collect(),
    }
}

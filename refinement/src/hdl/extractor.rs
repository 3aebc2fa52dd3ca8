//! Pull a candidate HDL source block out of free-form model output.
//!
//! Strategies run in a fixed order and the first hit wins. The final
//! strategy (`Raw`) always succeeds, so extraction never fails.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Fence info-string aliases that name the HDL language.
pub const LANGUAGE_ALIASES: &[&str] = &["verilog", "systemverilog", "sv", "v"];

/// Opening fence with its info string, interior, closing fence.
static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```([^\n`]*)\r?\n(.*?)```").unwrap());

/// Module span whose start looks like a declaration (`module name (`, `#(`, `;`).
static MODULE_DECL_SPAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\bmodule\s+[A-Za-z_][A-Za-z0-9_$]*\s*[#(;].*?\bendmodule\b").unwrap()
});

static MODULE_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\bmodule\b.*?\bendmodule\b").unwrap());

/// Which extraction strategy produced the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    /// Fenced block tagged with an HDL alias.
    LanguageFence,
    /// Fenced block with no info string.
    PlainFence,
    /// `module ... endmodule` span found in prose.
    ModuleSpan,
    /// Whole response, trimmed.
    Raw,
}

impl ExtractionStrategy {
    /// Priority order.
    pub const ORDER: [Self; 4] = [
        Self::LanguageFence,
        Self::PlainFence,
        Self::ModuleSpan,
        Self::Raw,
    ];

    fn try_extract(self, response: &str) -> Option<String> {
        match self {
            Self::LanguageFence => FENCE
                .captures_iter(response)
                .find(|c| {
                    let tag = c[1].trim().to_ascii_lowercase();
                    LANGUAGE_ALIASES.contains(&tag.as_str())
                })
                .map(|c| c[2].trim().to_string()),
            Self::PlainFence => FENCE
                .captures_iter(response)
                .find(|c| c[1].trim().is_empty())
                .map(|c| c[2].trim().to_string()),
            Self::ModuleSpan => MODULE_DECL_SPAN
                .find(response)
                .or_else(|| MODULE_SPAN.find(response))
                .map(|m| m.as_str().to_string()),
            Self::Raw => Some(response.trim().to_string()),
        }
    }
}

impl fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LanguageFence => write!(f, "language_fence"),
            Self::PlainFence => write!(f, "plain_fence"),
            Self::ModuleSpan => write!(f, "module_span"),
            Self::Raw => write!(f, "raw"),
        }
    }
}

/// Extracted source plus the strategy that found it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extraction {
    pub source: String,
    pub strategy: ExtractionStrategy,
}

impl Extraction {
    /// Whether no structure was recognised and the raw text was used.
    pub fn is_raw(&self) -> bool {
        self.strategy == ExtractionStrategy::Raw
    }
}

/// Extract the best candidate source block from `response`.
pub fn extract(response: &str) -> Extraction {
    for strategy in ExtractionStrategy::ORDER {
        if let Some(source) = strategy.try_extract(response) {
            tracing::debug!(%strategy, bytes = source.len(), "Extracted source");
            return Extraction { source, strategy };
        }
    }
    // Raw always matches; kept for exhaustiveness.
    Extraction {
        source: response.trim().to_string(),
        strategy: ExtractionStrategy::Raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_fence_wins_over_earlier_plain_fence() {
        let response = "Plan:\n```\nstep 1\n```\nCode:\n```Verilog\nmodule m; endmodule\n```\n";
        let ex = extract(response);
        assert_eq!(ex.strategy, ExtractionStrategy::LanguageFence);
        assert_eq!(ex.source, "module m; endmodule");
    }

    #[test]
    fn test_sv_alias() {
        let ex = extract("```sv\nmodule a(input x); endmodule\n```");
        assert_eq!(ex.strategy, ExtractionStrategy::LanguageFence);
    }

    #[test]
    fn test_other_language_fence_is_not_hdl() {
        let response = "```python\nprint(1)\n```\nmodule m(input a); endmodule";
        let ex = extract(response);
        assert_eq!(ex.strategy, ExtractionStrategy::ModuleSpan);
        assert_eq!(ex.source, "module m(input a); endmodule");
    }

    #[test]
    fn test_plain_fence() {
        let ex = extract("Here you go:\n```\nmodule m; endmodule\n```\nDone.");
        assert_eq!(ex.strategy, ExtractionStrategy::PlainFence);
        assert_eq!(ex.source, "module m; endmodule");
    }

    #[test]
    fn test_module_span_skips_reasoning_prose() {
        let response = "The module needs a counter.\nmodule c(input clk, output q);\n  assign q = clk;\nendmodule\nThat is all.";
        let ex = extract(response);
        assert_eq!(ex.strategy, ExtractionStrategy::ModuleSpan);
        assert!(ex.source.starts_with("module c("));
        assert!(ex.source.ends_with("endmodule"));
    }

    #[test]
    fn test_module_span_is_case_sensitive() {
        let ex = extract("MODULE m; ENDMODULE");
        assert!(ex.is_raw());
    }

    #[test]
    fn test_raw_fallback_trims() {
        let ex = extract("   just words  \n");
        assert_eq!(ex.strategy, ExtractionStrategy::Raw);
        assert_eq!(ex.source, "just words");
    }

    #[test]
    fn test_empty_input() {
        let ex = extract("");
        assert!(ex.is_raw());
        assert!(ex.source.is_empty());
    }

    #[test]
    fn test_unterminated_fence_falls_through() {
        let ex = extract("```verilog\nmodule m(input a);\nendmodule");
        assert_eq!(ex.strategy, ExtractionStrategy::ModuleSpan);
        assert_eq!(ex.source, "module m(input a);\nendmodule");
    }
}

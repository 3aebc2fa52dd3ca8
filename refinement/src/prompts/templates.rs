//! Prompt templates as ordered section lists
//!
//! A template is nothing more than the order in which sections appear. All
//! fixed wording lives here so the builder is a single render loop.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One block of a rendered prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Role,
    Task,
    Requirements,
    PreviousCode,
    Diagnostics,
    PortAnalysis,
    Context,
    Exemplars,
    OutputFormat,
    Trigger,
}

impl Section {
    /// Whether the section text is independent of the run.
    pub fn is_fixed(self) -> bool {
        matches!(self, Self::Role | Self::Task | Self::OutputFormat | Self::Trigger)
    }
}

/// Prompt templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    /// First generation from the requirement.
    Initial,
    /// Retry after a structural or compile failure.
    ErrorRefinement,
    /// One-shot fix for unused inputs or undriven outputs.
    PortRefinement,
}

const INITIAL_SECTIONS: &[Section] = &[
    Section::Role,
    Section::Task,
    Section::Requirements,
    Section::Context,
    Section::Exemplars,
    Section::OutputFormat,
    Section::Trigger,
];

const ERROR_REFINEMENT_SECTIONS: &[Section] = &[
    Section::Role,
    Section::Task,
    Section::Requirements,
    Section::PreviousCode,
    Section::Diagnostics,
    Section::OutputFormat,
    Section::Trigger,
];

const PORT_REFINEMENT_SECTIONS: &[Section] = &[
    Section::Role,
    Section::Task,
    Section::Requirements,
    Section::PreviousCode,
    Section::PortAnalysis,
    Section::OutputFormat,
    Section::Trigger,
];

const ROLE: &str = "\
# Role: RTL design engineer

You write synthesizable Verilog/SystemVerilog (IEEE 1800-2017) for ASIC and FPGA flows.

Rules:
- The module must compile without errors
- Every declared input must be used and every declared output must be driven
- Sequential logic has an explicit reset
- No combinational loops
- Descriptive signal names";

const OUTPUT_CONTRACT: &str = "\
## Output Format

- Reply with exactly one complete module, from `module <name>` to `endmodule`
- Wrap it in a ```verilog fenced block
- Non-blocking (`<=`) assignments in sequential blocks, blocking (`=`) in combinational blocks
- No explanation, analysis or commentary outside the code block";

impl TemplateKind {
    pub const ALL: [Self; 3] = [Self::Initial, Self::ErrorRefinement, Self::PortRefinement];

    /// Sections in render order.
    pub fn sections(self) -> &'static [Section] {
        match self {
            Self::Initial => INITIAL_SECTIONS,
            Self::ErrorRefinement => ERROR_REFINEMENT_SECTIONS,
            Self::PortRefinement => PORT_REFINEMENT_SECTIONS,
        }
    }

    pub fn includes(self, section: Section) -> bool {
        self.sections().contains(&section)
    }

    pub(crate) fn role(self) -> &'static str {
        ROLE
    }

    pub(crate) fn task_heading(self) -> &'static str {
        match self {
            Self::Initial => "## Task\n\nGenerate the RTL module described below.",
            Self::ErrorRefinement => {
                "## Task\n\nThe previous attempt failed validation. Fix every reported error \
                 and return the full corrected module, not a diff. Keep the parts that work."
            }
            Self::PortRefinement => {
                "## Task\n\nThe module below compiles, but some ports are not used. Complete the \
                 logic so every input is used and every output is driven. Do not remove or \
                 rename ports and keep existing behaviour."
            }
        }
    }

    pub(crate) fn output_format(self) -> &'static str {
        OUTPUT_CONTRACT
    }

    pub(crate) fn trigger(self) -> &'static str {
        match self {
            Self::Initial => "Write the module now.",
            Self::ErrorRefinement => "Write the corrected module now.",
            Self::PortRefinement => "Write the completed module now.",
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initial => write!(f, "initial"),
            Self::ErrorRefinement => write!(f, "error_refinement"),
            Self::PortRefinement => write!(f, "port_refinement"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_template_frames_with_role_and_trigger() {
        for kind in TemplateKind::ALL {
            let sections = kind.sections();
            assert_eq!(sections.first(), Some(&Section::Role));
            assert_eq!(sections.last(), Some(&Section::Trigger));
            assert!(kind.includes(Section::OutputFormat));
        }
    }

    #[test]
    fn test_exemplars_only_in_initial() {
        assert!(TemplateKind::Initial.includes(Section::Exemplars));
        assert!(!TemplateKind::ErrorRefinement.includes(Section::Exemplars));
        assert!(!TemplateKind::PortRefinement.includes(Section::Exemplars));
    }

    #[test]
    fn test_refinement_sections() {
        assert!(TemplateKind::ErrorRefinement.includes(Section::Diagnostics));
        assert!(TemplateKind::PortRefinement.includes(Section::PortAnalysis));
        assert!(!TemplateKind::PortRefinement.includes(Section::Diagnostics));
        assert!(!TemplateKind::Initial.includes(Section::PreviousCode));
    }

    #[test]
    fn test_display() {
        assert_eq!(TemplateKind::ErrorRefinement.to_string(), "error_refinement");
    }
}

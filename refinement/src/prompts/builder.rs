//! Prompt builder: renders a template's sections for one request
//!
//! Context selection and the section plan are computed once per task; each
//! request then renders the template's section list in a single loop.

use crate::config::RefinementOptions;
use crate::context_packer::{optimize_context, truncate_chars, ContextBudget, ContextSelection};
use crate::feedback::error_parser::DiagnosticSummary;
use crate::hdl::PortUsageResult;
use crate::prompts::exemplars::Exemplar;
use crate::prompts::templates::{Section, TemplateKind};
use crate::task::Task;

/// What the next prompt is for.
#[derive(Debug, Clone, Copy)]
pub enum PromptRequest<'a> {
    Initial,
    ErrorRefinement {
        previous_code: &'a str,
        diagnostics: &'a DiagnosticSummary,
        /// Iteration that produced `previous_code`.
        iteration: u32,
    },
    PortRefinement {
        current_code: &'a str,
        usage: &'a PortUsageResult,
    },
}

impl PromptRequest<'_> {
    pub fn template(&self) -> TemplateKind {
        match self {
            Self::Initial => TemplateKind::Initial,
            Self::ErrorRefinement { .. } => TemplateKind::ErrorRefinement,
            Self::PortRefinement { .. } => TemplateKind::PortRefinement,
        }
    }
}

/// A rendered prompt and the template it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltPrompt {
    pub template: TemplateKind,
    pub text: String,
}

/// Builds prompts for one task.
pub struct PromptBuilder<'a> {
    task: &'a Task,
    use_exemplars: bool,
    context: ContextSelection,
}

impl<'a> PromptBuilder<'a> {
    pub fn new(task: &'a Task, options: &RefinementOptions) -> Self {
        let budget = ContextBudget {
            max_items: options.max_context_files,
            item_char_cap: options.context_item_char_cap,
            prompt_chars: options.prompt_char_budget(),
            template_overhead: fixed_overhead(TemplateKind::Initial),
        };
        let context = optimize_context(&task.context, &budget);
        tracing::debug!(
            items = context.items.len(),
            dropped = context.dropped.len(),
            context_chars = context.plan.context_chars,
            exemplar_chars = context.plan.exemplar_chars,
            "Prepared prompt context"
        );
        Self {
            task,
            use_exemplars: options.use_few_shot_examples,
            context,
        }
    }

    pub fn context(&self) -> &ContextSelection {
        &self.context
    }

    /// Render the prompt for `request`.
    pub fn build(&self, request: PromptRequest<'_>) -> BuiltPrompt {
        let template = request.template();
        let blocks: Vec<String> = template
            .sections()
            .iter()
            .filter_map(|section| self.render_section(*section, template, &request))
            .collect();
        let text = blocks.join("\n\n");
        tracing::debug!(%template, chars = text.len(), "Built prompt");
        BuiltPrompt { template, text }
    }

    fn render_section(
        &self,
        section: Section,
        template: TemplateKind,
        request: &PromptRequest<'_>,
    ) -> Option<String> {
        match section {
            Section::Role => Some(template.role().to_string()),
            Section::Task => Some(template.task_heading().to_string()),
            Section::Requirements => {
                let (text, _) =
                    truncate_chars(self.task.requirement.trim(), self.context.plan.task_chars);
                Some(format!("## Requirements\n\n{text}"))
            }
            Section::PreviousCode => match request {
                PromptRequest::ErrorRefinement {
                    previous_code,
                    iteration,
                    ..
                } => Some(format!(
                    "## Previous Code (iteration {iteration})\n\n```verilog\n{previous_code}\n```"
                )),
                PromptRequest::PortRefinement { current_code, .. } => Some(format!(
                    "## Current Code (compiles, ports incomplete)\n\n```verilog\n{current_code}\n```"
                )),
                PromptRequest::Initial => None,
            },
            Section::Diagnostics => match request {
                PromptRequest::ErrorRefinement { diagnostics, .. } => Some(format!(
                    "## Errors\n\nError category: {}\n{}\n\n```\n{}\n```",
                    diagnostics.category,
                    diagnostics.category.guidance(),
                    diagnostics.text.trim_end()
                )),
                _ => None,
            },
            Section::PortAnalysis => match request {
                PromptRequest::PortRefinement { usage, .. } => Some(render_port_analysis(usage)),
                _ => None,
            },
            Section::Context => Some(self.render_context()),
            Section::Exemplars => self.render_exemplars(),
            Section::OutputFormat => Some(template.output_format().to_string()),
            Section::Trigger => Some(template.trigger().to_string()),
        }
    }

    fn render_context(&self) -> String {
        if self.context.is_empty() {
            return "## Context Files\n\nNo context files available.".to_string();
        }
        let mut out = String::from("## Context Files");
        for item in &self.context.items {
            out.push_str(&format!("\n\n### FILE: {}\n```\n{}\n```", item.path, item.content));
        }
        out
    }

    fn render_exemplars(&self) -> Option<String> {
        if !self.use_exemplars {
            return None;
        }
        let chosen = Exemplar::select(&self.task.requirement, self.context.plan.exemplar_chars);
        if chosen.is_empty() {
            return None;
        }
        let blocks: Vec<String> = chosen.iter().map(|ex| ex.render()).collect();
        Some(format!("## Design Patterns\n\n{}", blocks.join("\n\n")))
    }
}

fn render_port_analysis(usage: &PortUsageResult) -> String {
    let list = |names: &[String]| {
        if names.is_empty() {
            "none".to_string()
        } else {
            names.join(", ")
        }
    };
    format!(
        "## Port Usage Analysis\n\n- Unused inputs: {}\n- Unassigned outputs: {}\n\n{}\n\n\
         Guidance: use idle inputs in conditions, counters or state transitions; drive idle \
         outputs from inputs or internal state.",
        list(&usage.unused_inputs),
        list(&usage.unassigned_outputs),
        usage.feedback
    )
}

/// Characters taken by the fixed sections of `template`, separators included.
fn fixed_overhead(template: TemplateKind) -> usize {
    let sections = template.sections();
    let fixed: usize = sections
        .iter()
        .filter(|s| s.is_fixed())
        .map(|s| match s {
            Section::Role => template.role().len(),
            Section::Task => template.task_heading().len(),
            Section::OutputFormat => template.output_format().len(),
            Section::Trigger => template.trigger().len(),
            _ => 0,
        })
        .sum();
    fixed + sections.len().saturating_sub(1) * 2
}

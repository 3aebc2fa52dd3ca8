//! Context Packer: character-budgeted context selection for prompts
//!
//! Items are stable-sorted by priority class (spec before design before
//! verification), cut to the item limit, then each survivor is truncated to
//! an even share of the context section budget.

use crate::task::{ContextItem, PriorityClass};
use serde::{Deserialize, Serialize};

/// Appended to an item whose content was cut.
pub const TRUNCATION_MARKER: &str = "\n... (truncated)";

/// Section shares of the budget left after template overhead, in percent.
const TASK_SHARE_PCT: usize = 25;
const CONTEXT_SHARE_PCT: usize = 55;
const EXEMPLAR_SHARE_PCT: usize = 20;

/// Character allowance per prompt section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionPlan {
    pub task_chars: usize,
    pub context_chars: usize,
    pub exemplar_chars: usize,
}

impl SectionPlan {
    /// Split `prompt_chars - overhead` into task / context / exemplar shares.
    pub fn for_budget(prompt_chars: usize, overhead: usize) -> Self {
        let available = prompt_chars.saturating_sub(overhead);
        Self {
            task_chars: available * TASK_SHARE_PCT / 100,
            context_chars: available * CONTEXT_SHARE_PCT / 100,
            exemplar_chars: available * EXEMPLAR_SHARE_PCT / 100,
        }
    }

    pub fn total(&self) -> usize {
        self.task_chars + self.context_chars + self.exemplar_chars
    }
}

/// Inputs to [`optimize_context`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextBudget {
    /// Maximum number of items kept.
    pub max_items: usize,
    /// Hard cap on a single item's characters.
    pub item_char_cap: usize,
    /// Character budget for the whole prompt.
    pub prompt_chars: usize,
    /// Fixed characters consumed by the template itself.
    pub template_overhead: usize,
}

/// An item after truncation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackedItem {
    pub path: String,
    pub priority: PriorityClass,
    pub content: String,
    pub truncated: bool,
    /// Characters before truncation.
    pub original_chars: usize,
}

/// Selected context plus the plan it was sized against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSelection {
    pub items: Vec<PackedItem>,
    /// Paths left out by the item limit.
    pub dropped: Vec<String>,
    pub plan: SectionPlan,
    /// Per-item character limit applied.
    pub per_item_limit: usize,
}

impl ContextSelection {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total_chars(&self) -> usize {
        self.items.iter().map(|i| i.content.chars().count()).sum()
    }
}

/// Keep at most `limit` characters, appending the marker when cut.
pub fn truncate_chars(content: &str, limit: usize) -> (String, bool) {
    match content.char_indices().nth(limit) {
        Some((byte_idx, _)) => (format!("{}{TRUNCATION_MARKER}", &content[..byte_idx]), true),
        None => (content.to_string(), false),
    }
}

/// Select, order and truncate context items under `budget`.
///
/// Deterministic for a given input. With `max_items > 0` the highest
/// priority class present always survives the item limit.
pub fn optimize_context(items: &[ContextItem], budget: &ContextBudget) -> ContextSelection {
    let plan = SectionPlan::for_budget(budget.prompt_chars, budget.template_overhead);

    let mut ordered: Vec<&ContextItem> = items.iter().collect();
    ordered.sort_by_key(|item| item.priority);

    let keep = ordered.len().min(budget.max_items);
    let dropped: Vec<String> = ordered[keep..].iter().map(|i| i.path.clone()).collect();
    let selected = &ordered[..keep];

    let per_item_limit = if selected.is_empty() {
        budget.item_char_cap
    } else {
        budget.item_char_cap.min(plan.context_chars / selected.len())
    };

    let items: Vec<PackedItem> = selected
        .iter()
        .map(|item| {
            let (content, truncated) = truncate_chars(&item.content, per_item_limit);
            PackedItem {
                path: item.path.clone(),
                priority: item.priority,
                content,
                truncated,
                original_chars: item.content.chars().count(),
            }
        })
        .collect();

    if !dropped.is_empty() {
        tracing::debug!(
            kept = items.len(),
            dropped = dropped.len(),
            per_item_limit,
            "Context item limit reached"
        );
    }

    ContextSelection {
        items,
        dropped,
        plan,
        per_item_limit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget(max_items: usize, cap: usize) -> ContextBudget {
        ContextBudget {
            max_items,
            item_char_cap: cap,
            prompt_chars: 24_576,
            template_overhead: 1_000,
        }
    }

    fn sample() -> Vec<ContextItem> {
        vec![
            ContextItem::from_path("verif/tb.sv", "tb"),
            ContextItem::from_path("rtl/old.sv", "old"),
            ContextItem::from_path("docs/spec.md", "spec"),
            ContextItem::from_path("docs/notes.md", "notes"),
            ContextItem::from_path("rundir/log.txt", "log"),
        ]
    }

    #[test]
    fn test_plan_shares() {
        let plan = SectionPlan::for_budget(11_000, 1_000);
        assert_eq!(plan.task_chars, 2_500);
        assert_eq!(plan.context_chars, 5_500);
        assert_eq!(plan.exemplar_chars, 2_000);
        assert_eq!(plan.total(), 10_000);
    }

    #[test]
    fn test_plan_overhead_exceeds_budget() {
        let plan = SectionPlan::for_budget(100, 500);
        assert_eq!(plan.total(), 0);
    }

    #[test]
    fn test_priority_order_is_stable() {
        let sel = optimize_context(&sample(), &budget(10, 8_000));
        let paths: Vec<&str> = sel.items.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["docs/spec.md", "docs/notes.md", "rtl/old.sv", "verif/tb.sv", "rundir/log.txt"]
        );
        assert!(sel.dropped.is_empty());
    }

    #[test]
    fn test_item_limit_keeps_spec_items() {
        let sel = optimize_context(&sample(), &budget(1, 8_000));
        assert_eq!(sel.items.len(), 1);
        assert_eq!(sel.items[0].priority, PriorityClass::Spec);
        assert_eq!(sel.dropped.len(), 4);
    }

    #[test]
    fn test_item_limit_keeps_every_late_spec_item() {
        let items = vec![
            ContextItem::from_path("verif/tb.sv", "tb"),
            ContextItem::from_path("rtl/old.sv", "old"),
            ContextItem::from_path("docs/overview.md", "overview"),
            ContextItem::from_path("verif/test_top.py", "cocotb"),
            ContextItem::from_path("docs/interface.md", "interface"),
            ContextItem::from_path("rtl/helper.sv", "helper"),
            ContextItem::from_path("docs/timing.md", "timing"),
        ];
        let sel = optimize_context(&items, &budget(3, 8_000));
        let paths: Vec<&str> = sel.items.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["docs/overview.md", "docs/interface.md", "docs/timing.md"]
        );
        assert!(sel.items.iter().all(|i| i.priority == PriorityClass::Spec));
        assert_eq!(
            sel.dropped,
            vec!["rtl/old.sv", "rtl/helper.sv", "verif/tb.sv", "verif/test_top.py"]
        );
    }

    #[test]
    fn test_zero_items_allowed() {
        let sel = optimize_context(&sample(), &budget(0, 8_000));
        assert!(sel.is_empty());
        assert_eq!(sel.dropped.len(), 5);
    }

    #[test]
    fn test_truncates_to_char_cap() {
        let items = vec![ContextItem::from_path("docs/big.md", "x".repeat(500))];
        let sel = optimize_context(&items, &budget(10, 100));
        let item = &sel.items[0];
        assert!(item.truncated);
        assert_eq!(item.original_chars, 500);
        assert_eq!(item.content, format!("{}{TRUNCATION_MARKER}", "x".repeat(100)));
    }

    #[test]
    fn test_section_share_limits_each_item() {
        let items: Vec<ContextItem> = (0..4)
            .map(|i| ContextItem::from_path(format!("rtl/f{i}.sv"), "y".repeat(5_000)))
            .collect();
        let b = ContextBudget {
            max_items: 10,
            item_char_cap: 8_000,
            prompt_chars: 11_000,
            template_overhead: 1_000,
        };
        let sel = optimize_context(&items, &b);
        // 5_500 context chars over 4 items.
        assert_eq!(sel.per_item_limit, 1_375);
        assert!(sel.items.iter().all(|i| i.truncated));
    }

    #[test]
    fn test_multibyte_truncation_is_char_safe() {
        let (out, cut) = truncate_chars("αβγδ", 2);
        assert!(cut);
        assert!(out.starts_with("αβ"));
        let (out, cut) = truncate_chars("αβ", 2);
        assert!(!cut);
        assert_eq!(out, "αβ");
    }

    #[test]
    fn test_deterministic() {
        let a = optimize_context(&sample(), &budget(3, 50));
        let b = optimize_context(&sample(), &budget(3, 50));
        assert_eq!(a, b);
    }
}

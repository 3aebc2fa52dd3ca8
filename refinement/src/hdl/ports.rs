//! Port usage analysis
//!
//! Determines whether every declared input is referenced and every declared
//! output is driven inside the module body. Works purely on the source text:
//!
//! ```text
//! module m ( <header: port declarations> ) ;  <body ...>  endmodule
//!          └──────── interface ──────────┘   └─ usage ─┘
//! ```
//!
//! * Inputs are *used* when some whole-word occurrence in the body is not the
//!   sole target of an assignment.
//! * Outputs are *assigned* when some whole-word occurrence is the left-hand
//!   side of `<=`, `=` or an `assign` statement (concatenation targets count).
//!
//! The analysis is a pure function of its input.

use crate::hdl::text::{find_word, is_ident_char, strip_comments, word_occurrences};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::LazyLock;

static PORT_LIST_END: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\)\s*;").unwrap());

static DIRECTION_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(input|output|inout)\b").unwrap());

/// Direction declaration statement inside a module body (non-ANSI style).
static BODY_DECLARATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:input|output|inout)\b[^;]*;").unwrap());

static RANGE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[[^\]]*\]").unwrap());

static IDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_$]*").unwrap());

/// Keywords that can precede a port name in a declaration.
const DECLARATION_KEYWORDS: &[&str] = &[
    "input",
    "output",
    "inout",
    "wire",
    "reg",
    "logic",
    "bit",
    "byte",
    "int",
    "integer",
    "shortint",
    "longint",
    "signed",
    "unsigned",
    "var",
    "tri",
    "tri0",
    "tri1",
    "wand",
    "wor",
    "uwire",
    "supply0",
    "supply1",
    "interconnect",
];

/// Keywords after which a new statement begins.
const STATEMENT_LEAD_KEYWORDS: &[&str] = &[
    "begin",
    "end",
    "fork",
    "join",
    "else",
    "assign",
    "always",
    "always_comb",
    "always_latch",
    "initial",
    "final",
];

/// Port direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Input,
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Output => write!(f, "output"),
        }
    }
}

/// A declared interface element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortSignature {
    pub name: String,
    pub direction: Direction,
    /// Bracketed range as written (`[WIDTH-1:0]`), not interpreted.
    pub width: Option<String>,
}

/// Usage state of a single port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortUsage {
    Used,
    Unused,
    Assigned,
    Unassigned,
}

impl PortUsage {
    pub fn is_ok(self) -> bool {
        matches!(self, Self::Used | Self::Assigned)
    }
}

impl fmt::Display for PortUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Used => write!(f, "used"),
            Self::Unused => write!(f, "UNUSED"),
            Self::Assigned => write!(f, "assigned"),
            Self::Unassigned => write!(f, "UNASSIGNED"),
        }
    }
}

/// Summary of port usage for one source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortUsageResult {
    /// Declared ports in declaration order, de-duplicated.
    pub ports: Vec<PortSignature>,
    pub usage: BTreeMap<String, PortUsage>,
    /// Inputs never referenced, in declaration order.
    pub unused_inputs: Vec<String>,
    /// Outputs never driven, in declaration order.
    pub unassigned_outputs: Vec<String>,
    /// True iff both lists above are empty.
    pub complete: bool,
    pub feedback: String,
}

impl PortUsageResult {
    fn from_ports(ports: Vec<PortSignature>, body: &str) -> Self {
        let mut usage = BTreeMap::new();
        let mut unused_inputs = Vec::new();
        let mut unassigned_outputs = Vec::new();

        for port in &ports {
            let state = match port.direction {
                Direction::Input if is_referenced(&port.name, body) => PortUsage::Used,
                Direction::Input => {
                    unused_inputs.push(port.name.clone());
                    PortUsage::Unused
                }
                Direction::Output if is_driven(&port.name, body) => PortUsage::Assigned,
                Direction::Output => {
                    unassigned_outputs.push(port.name.clone());
                    PortUsage::Unassigned
                }
            };
            usage.insert(port.name.clone(), state);
        }

        let complete = unused_inputs.is_empty() && unassigned_outputs.is_empty();
        let feedback = if ports.is_empty() {
            "No ports found in module.".to_string()
        } else {
            format_feedback(&unused_inputs, &unassigned_outputs)
        };

        Self {
            ports,
            usage,
            unused_inputs,
            unassigned_outputs,
            complete,
            feedback,
        }
    }

    pub fn inputs(&self) -> impl Iterator<Item = &PortSignature> {
        self.ports.iter().filter(|p| p.direction == Direction::Input)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &PortSignature> {
        self.ports.iter().filter(|p| p.direction == Direction::Output)
    }
}

fn format_feedback(unused_inputs: &[String], unassigned_outputs: &[String]) -> String {
    if unused_inputs.is_empty() && unassigned_outputs.is_empty() {
        return "All ports are properly used and assigned.".to_string();
    }

    let mut parts = Vec::new();
    if !unused_inputs.is_empty() {
        parts.push(format!(
            "UNUSED INPUT PORTS: {}\n   Declared but never referenced in the module logic.\n   \
             Action: incorporate into logic (conditions, state machines, or computations).",
            unused_inputs.join(", ")
        ));
    }
    if !unassigned_outputs.is_empty() {
        parts.push(format!(
            "UNASSIGNED OUTPUT PORTS: {}\n   Declared but never driven.\n   \
             Action: add a driving assignment (blocking, non-blocking, or continuous).",
            unassigned_outputs.join(", ")
        ));
    }
    parts.join("\n\n")
}

/// Header and body of the first module in a comment-free source.
struct ModuleParts<'a> {
    header: &'a str,
    body: &'a str,
}

fn split_module(code: &str) -> Option<ModuleParts<'_>> {
    let decl = find_word(code, "module")?;
    let after = decl + "module".len();
    let rest = &code[after..];

    let (header_len, body_start) = match PORT_LIST_END.find(rest) {
        Some(m) => (m.start(), after + m.end()),
        None => match rest.find(';') {
            Some(semi) => (semi, after + semi + 1),
            None => (rest.len(), code.len()),
        },
    };

    let body_region = &code[body_start..];
    let body_len = find_word(body_region, "endmodule").unwrap_or(body_region.len());

    Some(ModuleParts {
        header: &rest[..header_len],
        body: &body_region[..body_len],
    })
}

/// Parse comma-separated port declarations.
///
/// A bare identifier after a declared port inherits its direction
/// (`input a, b`). `inout` is recognised so its names are not attributed to
/// the previous direction, but is not analysed.
fn parse_declarations(span: &str) -> Vec<PortSignature> {
    #[derive(Clone, Copy)]
    enum Current {
        Port(Direction),
        Inout,
    }

    let mut ports = Vec::new();
    let mut current: Option<Current> = None;

    for segment in span.split(',') {
        let last_direction = DIRECTION_KEYWORD.find_iter(segment).last();
        let (declaration, continuation) = match last_direction {
            Some(m) => {
                current = Some(match m.as_str() {
                    "input" => Current::Port(Direction::Input),
                    "output" => Current::Port(Direction::Output),
                    _ => Current::Inout,
                });
                (&segment[m.start()..], false)
            }
            None if current.is_some() => (segment, true),
            None => continue,
        };

        let declaration = declaration.split('=').next().unwrap_or_default();
        let width = RANGE.find(declaration).map(|m| m.as_str().to_string());
        let without_ranges = RANGE.replace_all(declaration, " ");
        let idents: Vec<&str> = IDENT
            .find_iter(&without_ranges)
            .map(|m| m.as_str())
            .filter(|ident| !DECLARATION_KEYWORDS.contains(ident))
            .collect();

        if continuation && idents.len() != 1 {
            // Not a plain `, name` continuation: parameter, expression, etc.
            current = None;
            continue;
        }

        let (Some(name), Some(Current::Port(direction))) = (idents.last(), current) else {
            continue;
        };
        ports.push(PortSignature {
            name: (*name).to_string(),
            direction,
            width,
        });
    }

    ports
}

fn dedup_first_wins(ports: Vec<PortSignature>) -> Vec<PortSignature> {
    let mut seen = HashSet::new();
    ports
        .into_iter()
        .filter(|p| seen.insert(p.name.clone()))
        .collect()
}

/// Split `text` into everything before its trailing token and the token.
///
/// A token is a run of identifier characters or `.`, so `#1.5` delays and
/// `begin : label` names both end in one.
fn split_trailing_token(text: &str) -> (&str, &str) {
    let start = text
        .char_indices()
        .rev()
        .take_while(|(_, c)| is_ident_char(*c) || *c == '.')
        .last()
        .map_or(text.len(), |(i, _)| i);
    (&text[..start], &text[start..])
}

/// Whether the text before `idx` ends at a statement boundary.
///
/// Boundaries are `;`, `)`, `:`, a statement keyword, an `@*` or `@name`
/// event control, a `#delay`, and a `begin : label` / `fork : label` block name.
fn at_statement_start(body: &str, idx: usize) -> bool {
    let before = body[..idx].trim_end();
    let Some(last) = before.chars().next_back() else {
        return true;
    };
    match last {
        ';' | ')' | ':' => return true,
        '*' => return before[..before.len() - 1].trim_end().ends_with('@'),
        c if !is_ident_char(c) => return false,
        _ => {}
    }

    let (lead, token) = split_trailing_token(before);
    if STATEMENT_LEAD_KEYWORDS.contains(&token) {
        return true;
    }
    let lead = lead.trim_end();
    if lead.ends_with('#') || lead.ends_with('@') {
        return true;
    }
    lead.strip_suffix(':').is_some_and(|label_lead| {
        let (_, keyword) = split_trailing_token(label_lead.trim_end());
        matches!(keyword, "begin" | "fork")
    })
}

/// Skip whitespace and any `[...]` selects, returning the remaining text.
fn skip_selects(mut rest: &str) -> &str {
    loop {
        rest = rest.trim_start();
        if !rest.starts_with('[') {
            return rest;
        }
        let mut depth = 0usize;
        let mut end = None;
        for (i, c) in rest.char_indices() {
            match c {
                '[' => depth += 1,
                ']' => {
                    depth -= 1;
                    if depth == 0 {
                        end = Some(i + 1);
                        break;
                    }
                }
                _ => {}
            }
        }
        match end {
            Some(end) => rest = &rest[end..],
            None => return rest,
        }
    }
}

/// `<=` or a lone `=` (not `==`).
fn starts_with_assignment(rest: &str) -> bool {
    rest.starts_with("<=") || (rest.starts_with('=') && !rest.starts_with("=="))
}

/// Whether the occurrence at `idx` is the sole left-hand side of an assignment.
fn is_assignment_target(body: &str, idx: usize, len: usize) -> bool {
    starts_with_assignment(skip_selects(&body[idx + len..])) && at_statement_start(body, idx)
}

/// Whether the occurrence at `idx` sits inside a `{...}` concatenation that is
/// itself an assignment target.
fn in_concatenation_target(body: &str, idx: usize) -> bool {
    let bytes = body.as_bytes();
    let mut depth = 0usize;
    let mut pos = idx;
    while pos > 0 {
        pos -= 1;
        match bytes[pos] {
            b'}' => depth += 1,
            b'{' if depth > 0 => depth -= 1,
            b'{' => {
                if let Some(close) = matching_brace(body, pos) {
                    if starts_with_assignment(skip_selects(&body[close + 1..]))
                        && at_statement_start(body, pos)
                    {
                        return true;
                    }
                }
            }
            b';' => return false,
            _ => {}
        }
    }
    false
}

fn matching_brace(body: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, b) in body.as_bytes()[open..].iter().enumerate() {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

fn is_referenced(name: &str, body: &str) -> bool {
    word_occurrences(body, name)
        .into_iter()
        .any(|idx| !is_assignment_target(body, idx, name.len()))
}

fn is_driven(name: &str, body: &str) -> bool {
    word_occurrences(body, name)
        .into_iter()
        .any(|idx| is_assignment_target(body, idx, name.len()) || in_concatenation_target(body, idx))
}

/// Analyze port usage of the first module in `source`.
pub fn analyze_ports(source: &str) -> PortUsageResult {
    let code = strip_comments(source);
    let Some(parts) = split_module(&code) else {
        return PortUsageResult::from_ports(Vec::new(), "");
    };

    let mut ports = parse_declarations(parts.header);
    let mut body = parts.body.to_string();

    if !DIRECTION_KEYWORD.is_match(parts.header) {
        // Non-ANSI header: directions are declared as body statements.
        for statement in BODY_DECLARATION.find_iter(parts.body) {
            let text = statement.as_str();
            ports.extend(parse_declarations(&text[..text.len() - 1]));
        }
        body = BODY_DECLARATION.replace_all(parts.body, ";").into_owned();
    }

    let ports = dedup_first_wins(ports);
    let result = PortUsageResult::from_ports(ports, &body);

    tracing::debug!(
        ports = result.ports.len(),
        unused_inputs = ?result.unused_inputs,
        unassigned_outputs = ?result.unassigned_outputs,
        complete = result.complete,
        "Port usage analysis"
    );
    result
}

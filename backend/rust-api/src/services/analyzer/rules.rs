//! Pattern rules that look at one syntax node at a time.

use tree_sitter::Node;

use crate::models::{Finding, Severity};

use super::catalog::{Rule, RuleMeta};
use super::{named_descendants, RuleContext};

const LITERAL_KINDS: &[&str] = &[
    "integer",
    "float",
    "string",
    "concatenated_string",
    "list",
    "tuple",
    "dictionary",
    "set",
    "list_comprehension",
    "dictionary_comprehension",
    "set_comprehension",
];

const MUTABLE_LITERAL_KINDS: &[&str] = &[
    "list",
    "dictionary",
    "set",
    "list_comprehension",
    "dictionary_comprehension",
    "set_comprehension",
];

const MUTABLE_FACTORIES: &[&str] = &["list", "dict", "set", "bytearray", "defaultdict"];

fn nodes_of_kind<'t>(ctx: &RuleContext<'t>, kinds: &[&str]) -> Vec<Node<'t>> {
    named_descendants(ctx.root)
        .into_iter()
        .filter(|node| kinds.contains(&node.kind()))
        .collect()
}

fn is_zero_literal(node: Node<'_>, text: &str) -> bool {
    if !matches!(node.kind(), "integer" | "float") {
        return false;
    }
    let cleaned = text.replace('_', "").to_ascii_lowercase();
    let digits = cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0o"))
        .or_else(|| cleaned.strip_prefix("0b"))
        .unwrap_or(&cleaned);
    if digits.chars().all(|c| c == '0') && !digits.is_empty() {
        return true;
    }
    cleaned.parse::<f64>().map(|value| value == 0.0).unwrap_or(false)
}

/// Callee name when `node` is a call to a plain identifier.
fn called_name<'t>(ctx: &RuleContext<'t>, node: Node<'_>) -> Option<&'t str> {
    if node.kind() != "call" {
        return None;
    }
    let function = node.child_by_field_name("function")?;
    (function.kind() == "identifier").then(|| ctx.text(function))
}

fn positional_args<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let Some(arguments) = node.child_by_field_name("arguments") else {
        return Vec::new();
    };
    let mut cursor = arguments.walk();
    arguments
        .named_children(&mut cursor)
        .filter(|arg| !matches!(arg.kind(), "keyword_argument" | "comment"))
        .collect()
}

pub struct ZeroDivision;

static ZERO_DIVISION: RuleMeta = RuleMeta {
    id: "zero-division",
    kind: "ZeroDivisionError",
    severity: Severity::Error,
    rank: 20,
    concept: "Arithmetic operators and division by zero",
};

impl Rule for ZeroDivision {
    fn meta(&self) -> &'static RuleMeta {
        &ZERO_DIVISION
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Vec<Finding> {
        let mut findings = Vec::new();
        for node in nodes_of_kind(ctx, &["binary_operator", "augmented_assignment"]) {
            let (Some(operator), Some(right)) = (
                node.child_by_field_name("operator"),
                node.child_by_field_name("right"),
            ) else {
                continue;
            };
            if !matches!(operator.kind(), "/" | "//" | "%" | "/=" | "//=" | "%=") {
                continue;
            }
            // "%s" % 0 is string formatting
            if operator.kind() == "%" {
                let left_is_string = node
                    .child_by_field_name("left")
                    .map(|left| matches!(left.kind(), "string" | "concatenated_string"))
                    .unwrap_or(false);
                if left_is_string {
                    continue;
                }
            }
            if is_zero_literal(right, ctx.text(right)) {
                findings.push(ctx.finding_at(
                    &ZERO_DIVISION,
                    node,
                    "This expression divides by zero, which always raises ZeroDivisionError.",
                ));
            }
        }
        findings
    }
}

pub struct IterateInt;

static ITERATE_INT: RuleMeta = RuleMeta {
    id: "iterate-int",
    kind: "TypeError",
    severity: Severity::Error,
    rank: 25,
    concept: "Iterables and the range() function",
};

impl Rule for IterateInt {
    fn meta(&self) -> &'static RuleMeta {
        &ITERATE_INT
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Vec<Finding> {
        nodes_of_kind(ctx, &["for_statement", "for_in_clause"])
            .into_iter()
            .filter_map(|node| node.child_by_field_name("right"))
            .filter(|iterable| iterable.kind() == "integer")
            .map(|iterable| {
                ctx.finding_at(
                    &ITERATE_INT,
                    iterable,
                    "You are trying to iterate over an int, which is not iterable. Did you mean range(...)?",
                )
            })
            .collect()
    }
}

pub struct OffByOne;

static OFF_BY_ONE: RuleMeta = RuleMeta {
    id: "off-by-one",
    kind: "OffByOne",
    severity: Severity::Warning,
    rank: 30,
    concept: "Zero-based indexing and loop bounds",
};

impl OffByOne {
    /// `len(x) + 1`
    fn is_len_plus_one(ctx: &RuleContext<'_>, node: Node<'_>) -> bool {
        if node.kind() != "binary_operator" {
            return false;
        }
        let operator = node.child_by_field_name("operator").map(|op| op.kind());
        let left = node.child_by_field_name("left");
        let right = node.child_by_field_name("right");
        match (operator, left, right) {
            (Some("+"), Some(left), Some(right)) => {
                called_name(ctx, left) == Some("len")
                    && right.kind() == "integer"
                    && ctx.text(right) == "1"
            }
            _ => false,
        }
    }

    fn range_overshoot(ctx: &RuleContext<'_>, call: Node<'_>) -> bool {
        if called_name(ctx, call) != Some("range") {
            return false;
        }
        let args = positional_args(call);
        let stop = match args.len() {
            1 => args[0],
            2 | 3 => args[1],
            _ => return false,
        };
        Self::is_len_plus_one(ctx, stop)
    }

    /// `items[len(items)]`
    fn index_at_len(ctx: &RuleContext<'_>, subscript: Node<'_>) -> bool {
        let (Some(value), Some(index)) = (
            subscript.child_by_field_name("value"),
            subscript.child_by_field_name("subscript"),
        ) else {
            return false;
        };
        if called_name(ctx, index) != Some("len") {
            return false;
        }
        positional_args(index)
            .first()
            .map(|arg| ctx.text(*arg) == ctx.text(value))
            .unwrap_or(false)
    }
}

impl Rule for OffByOne {
    fn meta(&self) -> &'static RuleMeta {
        &OFF_BY_ONE
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Vec<Finding> {
        let mut findings = Vec::new();
        for node in nodes_of_kind(ctx, &["call", "subscript"]) {
            if node.kind() == "call" && Self::range_overshoot(ctx, node) {
                findings.push(ctx.finding_at(
                    &OFF_BY_ONE,
                    node,
                    "range(len(x) + 1) runs one step past the last valid index; indexes go from 0 to len(x) - 1.",
                ));
            } else if node.kind() == "subscript" && Self::index_at_len(ctx, node) {
                findings.push(ctx.finding_at(
                    &OFF_BY_ONE,
                    node,
                    "x[len(x)] is always out of range; the last element is x[len(x) - 1] or x[-1].",
                ));
            }
        }
        findings
    }
}

pub struct MutableDefault;

static MUTABLE_DEFAULT: RuleMeta = RuleMeta {
    id: "mutable-default",
    kind: "MutableDefaultArgument",
    severity: Severity::Warning,
    rank: 40,
    concept: "Default argument evaluation",
};

impl Rule for MutableDefault {
    fn meta(&self) -> &'static RuleMeta {
        &MUTABLE_DEFAULT
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Vec<Finding> {
        let mut findings = Vec::new();
        for param in nodes_of_kind(ctx, &["default_parameter", "typed_default_parameter"]) {
            let Some(value) = param.child_by_field_name("value") else {
                continue;
            };
            let mutable = MUTABLE_LITERAL_KINDS.contains(&value.kind())
                || called_name(ctx, value)
                    .map(|name| MUTABLE_FACTORIES.contains(&name))
                    .unwrap_or(false);
            if !mutable {
                continue;
            }
            let name = param
                .child_by_field_name("name")
                .map(|n| ctx.text(n))
                .unwrap_or("argument");
            findings.push(ctx.finding_at(
                &MUTABLE_DEFAULT,
                param,
                format!(
                    "The default value of '{}' is created once and shared by every call. Use None and create a new object inside the function.",
                    name
                ),
            ));
        }
        findings
    }
}

pub struct BareExcept;

static BARE_EXCEPT: RuleMeta = RuleMeta {
    id: "bare-except",
    kind: "BareExcept",
    severity: Severity::Warning,
    rank: 50,
    concept: "Exception handling",
};

impl Rule for BareExcept {
    fn meta(&self) -> &'static RuleMeta {
        &BARE_EXCEPT
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Vec<Finding> {
        nodes_of_kind(ctx, &["except_clause"])
            .into_iter()
            .filter(|clause| {
                let mut cursor = clause.walk();
                let typed = clause
                    .named_children(&mut cursor)
                    .any(|child| !matches!(child.kind(), "block" | "comment"));
                !typed
            })
            .map(|clause| {
                ctx.finding_at(
                    &BARE_EXCEPT,
                    clause,
                    "A bare 'except:' catches every exception, including typos and Ctrl+C. Catch the specific error you expect.",
                )
            })
            .collect()
    }
}

/// Operand/operator triples of a comparison, so `a < b is 1` yields
/// `(a, "<", b)` and `(b, "is", 1)`.
fn comparisons<'t>(node: Node<'t>) -> Vec<(Node<'t>, &'static str, Node<'t>)> {
    let mut out = Vec::new();
    let mut cursor = node.walk();
    let children: Vec<Node<'t>> = node.children(&mut cursor).collect();
    let mut left: Option<Node<'t>> = None;
    let mut pending: Option<&'static str> = None;
    for child in children {
        if child.is_named() {
            if child.kind() == "comment" {
                continue;
            }
            if let (Some(lhs), Some(op)) = (left, pending.take()) {
                out.push((lhs, op, child));
            }
            left = Some(child);
        } else {
            pending = Some(child.kind());
        }
    }
    out
}

fn is_literal(node: Node<'_>) -> bool {
    if LITERAL_KINDS.contains(&node.kind()) {
        return true;
    }
    node.kind() == "unary_operator"
        && node
            .child_by_field_name("argument")
            .map(|arg| matches!(arg.kind(), "integer" | "float"))
            .unwrap_or(false)
}

pub struct IdentityLiteral;

static IDENTITY_LITERAL: RuleMeta = RuleMeta {
    id: "identity-literal",
    kind: "IdentityComparison",
    severity: Severity::Warning,
    rank: 60,
    concept: "Identity (is) versus equality (==)",
};

impl Rule for IdentityLiteral {
    fn meta(&self) -> &'static RuleMeta {
        &IDENTITY_LITERAL
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Vec<Finding> {
        let mut findings = Vec::new();
        for node in nodes_of_kind(ctx, &["comparison_operator"]) {
            for (left, op, right) in comparisons(node) {
                if !matches!(op, "is" | "is not") {
                    continue;
                }
                if is_literal(left) || is_literal(right) {
                    let suggestion = if op == "is" { "==" } else { "!=" };
                    findings.push(ctx.finding_at(
                        &IDENTITY_LITERAL,
                        node,
                        format!(
                            "'{}' checks whether two names point to the same object, not whether the values are equal. Use '{}' to compare values.",
                            op, suggestion
                        ),
                    ));
                    break;
                }
            }
        }
        findings
    }
}

pub struct NoneEquality;

static NONE_EQUALITY: RuleMeta = RuleMeta {
    id: "none-equality",
    kind: "BestPractice",
    severity: Severity::Info,
    rank: 90,
    concept: "Comparing with None",
};

impl Rule for NoneEquality {
    fn meta(&self) -> &'static RuleMeta {
        &NONE_EQUALITY
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Vec<Finding> {
        let mut findings = Vec::new();
        for node in nodes_of_kind(ctx, &["comparison_operator"]) {
            let flagged = comparisons(node).into_iter().any(|(left, op, right)| {
                matches!(op, "==" | "!=") && (left.kind() == "none" || right.kind() == "none")
            });
            if flagged {
                findings.push(ctx.finding_at(
                    &NONE_EQUALITY,
                    node,
                    "Use `is None` / `is not None` for None checks.",
                ));
            }
        }
        findings
    }
}

//! Static inspection of learner code.
//!
//! Parsing uses the tree-sitter Python grammar, which is error tolerant: a
//! snippet with a syntax error still yields a tree, and the first `ERROR` or
//! `MISSING` node is reported as a `SyntaxError` finding instead of failing
//! the request. Layout mistakes the grammar accepts (bad indentation,
//! `return` outside a function) are caught by a structural pass in `syntax`.

pub mod catalog;
pub mod complexity;
pub mod names;
pub mod rules;
pub mod syntax;

use tree_sitter::{Node, Parser, Tree};

use crate::models::{Complexity, Finding, Severity};

pub use catalog::{RuleCatalog, RuleMeta};

pub const INPUT_TOO_LARGE: &str = "InputTooLarge";
const SNIPPET_MAX_CHARS: usize = 80;

/// Everything the analyzer learned about one snippet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticReport {
    pub findings: Vec<Finding>,
    /// Only computed for code that parsed cleanly.
    pub complexity: Option<Complexity>,
    pub syntax_ok: bool,
}

impl StaticReport {
    fn syntax_error(finding: Finding) -> Self {
        Self {
            findings: vec![finding],
            complexity: None,
            syntax_ok: false,
        }
    }
}

/// Borrowed view of the source shared by every rule.
pub struct RuleContext<'t> {
    pub root: Node<'t>,
    pub source: &'t str,
    pub names: names::NameTable,
}

impl<'t> RuleContext<'t> {
    pub fn text(&self, node: Node<'_>) -> &'t str {
        node_text(node, self.source)
    }

    /// Finding anchored at `node`, with its first source line as the snippet.
    pub fn finding_at(&self, meta: &RuleMeta, node: Node<'_>, why: impl Into<String>) -> Finding {
        Finding::new(meta.kind, why, meta.severity)
            .at_line(line_of(node))
            .with_snippet(snippet(self.text(node)))
    }
}

pub struct StaticAnalyzer {
    catalog: RuleCatalog,
    max_code_chars: usize,
}

impl StaticAnalyzer {
    pub fn new(catalog: RuleCatalog, max_code_chars: usize) -> Self {
        Self {
            catalog,
            max_code_chars,
        }
    }

    pub fn catalog(&self) -> &RuleCatalog {
        &self.catalog
    }

    pub fn analyze(&self, source: &str) -> StaticReport {
        let length = source.chars().count();
        if length > self.max_code_chars {
            tracing::debug!(
                "Skipping analysis: {} chars exceeds limit of {}",
                length,
                self.max_code_chars
            );
            return StaticReport {
                findings: vec![oversize_finding(length, self.max_code_chars)],
                complexity: None,
                syntax_ok: false,
            };
        }

        if source.trim().is_empty() {
            return StaticReport {
                findings: Vec::new(),
                complexity: None,
                syntax_ok: true,
            };
        }

        let Some(tree) = parse_python(source) else {
            return StaticReport::syntax_error(Finding::new(
                syntax::SYNTAX_ERROR,
                "The code could not be parsed.",
                Severity::Error,
            ));
        };

        let root = tree.root_node();
        if let Some(finding) = syntax::first_syntax_error(root, source) {
            return StaticReport::syntax_error(finding);
        }

        let ctx = RuleContext {
            root,
            source,
            names: names::NameTable::build(root, source),
        };

        let mut findings = Vec::new();
        for rule in self.catalog.rules() {
            let found = rule.check(&ctx);
            if !found.is_empty() {
                tracing::debug!("Rule {} reported {} finding(s)", rule.meta().id, found.len());
            }
            findings.extend(found);
        }

        StaticReport {
            findings,
            complexity: Some(complexity::estimate(root, source)),
            syntax_ok: true,
        }
    }
}

pub fn oversize_finding(length: usize, limit: usize) -> Finding {
    Finding::new(
        INPUT_TOO_LARGE,
        format!(
            "The code is {} characters long; the maximum is {}. Submit a smaller snippet.",
            length, limit
        ),
        Severity::Error,
    )
}

pub(crate) fn parse_python(source: &str) -> Option<Tree> {
    let mut parser = Parser::new();
    if let Err(e) = parser.set_language(&tree_sitter_python::LANGUAGE.into()) {
        tracing::error!("Failed to load Python grammar: {}", e);
        return None;
    }
    parser.parse(source, None)
}

pub(crate) fn node_text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    source.get(node.byte_range()).unwrap_or("")
}

pub(crate) fn line_of(node: Node<'_>) -> usize {
    node.start_position().row + 1
}

/// First line of `text`, trimmed and shortened for display.
pub(crate) fn snippet(text: &str) -> String {
    let first = text.lines().next().unwrap_or("").trim();
    if first.chars().count() <= SNIPPET_MAX_CHARS {
        first.to_string()
    } else {
        let cut: String = first.chars().take(SNIPPET_MAX_CHARS - 3).collect();
        format!("{}...", cut)
    }
}

/// Named nodes under `root` (inclusive) in document order.
pub(crate) fn named_descendants(root: Node<'_>) -> Vec<Node<'_>> {
    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        out.push(node);
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
    out
}

#[cfg(test)]
pub(crate) fn run_rule(rule: &dyn catalog::Rule, source: &str) -> Vec<Finding> {
    let tree = parse_python(source).unwrap();
    let root = tree.root_node();
    let ctx = RuleContext {
        root,
        source,
        names: names::NameTable::build(root, source),
    };
    rule.check(&ctx)
}

use tree_sitter::Node;

use crate::models::{Finding, Severity};

use super::{line_of, node_text, snippet};

pub const SYNTAX_ERROR: &str = "SyntaxError";

const UNEXPECTED_INDENT: &str = "IndentationError: unexpected indent";
const EXPECTED_INDENTED_BLOCK: &str = "IndentationError: expected an indented block";
const UNINDENT_MISMATCH: &str =
    "IndentationError: unindent does not match any outer indentation level";

/// Hard keywords. The grammar lets some of them through as identifiers
/// while recovering from a misplaced clause.
const RESERVED_WORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "break", "class", "continue", "def", "del",
    "elif", "else", "except", "finally", "for", "from", "global", "if", "import", "in", "is",
    "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try", "while", "with",
    "yield",
];

/// First syntax problem in document order, if any.
pub fn first_syntax_error(root: Node<'_>, source: &str) -> Option<Finding> {
    if let Some(node) = find_legacy_statement(root) {
        let why = match node.kind() {
            "exec_statement" => "Missing parentheses in call to 'exec'. Did you mean exec(...)?",
            _ => "Missing parentheses in call to 'print'. Did you mean print(...)?",
        };
        return Some(
            Finding::new(SYNTAX_ERROR, why, Severity::Error)
                .at_line(line_of(node))
                .with_snippet(snippet(node_text(node, source))),
        );
    }

    if !root.has_error() {
        return structural_error(root, source);
    }

    let Some(node) = find_error_node(root) else {
        return structural_error(root, source);
    };
    let why = if node.is_missing() {
        format!("invalid syntax: expected '{}'", node.kind())
    } else {
        describe_error(node, source)
    };
    let line = line_of(node);

    Some(
        Finding::new(SYNTAX_ERROR, why, Severity::Error)
            .at_line(line)
            .with_snippet(source_line(source, line)),
    )
}

/// A problem the grammar accepts but the Python compiler rejects.
struct Problem {
    byte: usize,
    line: usize,
    why: String,
}

impl Problem {
    fn at(node: Node<'_>, why: impl Into<String>) -> Self {
        Self {
            byte: node.start_byte(),
            line: line_of(node),
            why: why.into(),
        }
    }
}

/// Indentation, clause placement and `return`/`yield` placement. The
/// earliest problem in the source wins.
fn structural_error(root: Node<'_>, source: &str) -> Option<Finding> {
    let line_count = source.lines().count().max(1);
    let mut problems = Vec::new();

    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        match node.kind() {
            "module" => check_columns(node, 0, &mut problems),
            "block" => check_block(node, line_count, &mut problems),
            "return_statement" if !inside_function(node, false) => {
                problems.push(Problem::at(node, "'return' outside function"))
            }
            "yield" if node.is_named() && !inside_function(node, true) => {
                problems.push(Problem::at(node, "'yield' outside function"))
            }
            "else" | "elif" | "except" | "finally" if !node.is_named() => {
                if !clause_is_attached(node) {
                    problems.push(Problem::at(node, "invalid syntax"));
                }
            }
            "identifier" if RESERVED_WORDS.contains(&node_text(node, source)) => {
                problems.push(Problem::at(node, "invalid syntax"))
            }
            _ => {}
        }
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }

    let problem = problems.into_iter().min_by_key(|p| p.byte)?;
    Some(
        Finding::new(SYNTAX_ERROR, problem.why, Severity::Error)
            .at_line(problem.line)
            .with_snippet(source_line(source, problem.line)),
    )
}

fn statements<'t>(container: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = container.walk();
    container
        .named_children(&mut cursor)
        .filter(|child| !child.is_extra() && !child.is_error() && child.kind() != "comment")
        .collect()
}

/// Every statement that starts a line must sit at `column`. Statements after
/// a `;` on the same line are skipped.
fn check_columns(container: Node<'_>, column: usize, problems: &mut Vec<Problem>) {
    let mut previous_end_row = None;
    for statement in statements(container) {
        let start = statement.start_position();
        if previous_end_row != Some(start.row) {
            if start.column > column {
                problems.push(Problem::at(statement, UNEXPECTED_INDENT));
            } else if start.column < column {
                problems.push(Problem::at(statement, UNINDENT_MISMATCH));
            }
        }
        previous_end_row = Some(statement.end_position().row);
    }
}

fn check_block(block: Node<'_>, line_count: usize, problems: &mut Vec<Problem>) {
    let Some(header) = block.parent() else {
        return;
    };
    let colon_row = block
        .prev_sibling()
        .filter(|sibling| sibling.kind() == ":")
        .map(|colon| colon.start_position().row)
        .unwrap_or(header.start_position().row);

    let body = statements(block);
    let Some(first) = body.first() else {
        // The body belongs on the line after the colon.
        problems.push(Problem {
            byte: block.start_byte(),
            line: (colon_row + 2).min(line_count),
            why: EXPECTED_INDENTED_BLOCK.to_string(),
        });
        return;
    };

    // `if x: pass` keeps its body on the header line.
    if first.start_position().row == colon_row {
        return;
    }

    let column = first.start_position().column;
    if column <= header.start_position().column {
        problems.push(Problem::at(*first, EXPECTED_INDENTED_BLOCK));
        return;
    }
    check_columns(block, column, problems);
}

/// Whether the nearest enclosing scope is a function. Class bodies do not
/// count; lambdas only count for `yield`.
fn inside_function(node: Node<'_>, lambda_counts: bool) -> bool {
    let mut current = node.parent();
    while let Some(ancestor) = current {
        match ancestor.kind() {
            "function_definition" => return true,
            "lambda" if lambda_counts => return true,
            "class_definition" => return false,
            _ => {}
        }
        current = ancestor.parent();
    }
    false
}

fn clause_is_attached(keyword: Node<'_>) -> bool {
    let Some(parent) = keyword.parent() else {
        return false;
    };
    let allowed: &[&str] = match keyword.kind() {
        "else" => &["else_clause", "conditional_expression"],
        "elif" => &["elif_clause"],
        "except" => &["except_clause", "except_group_clause"],
        _ => &["finally_clause"],
    };
    allowed.contains(&parent.kind())
}

/// Depth-first over all children, descending only into subtrees that
/// contain an error.
fn find_error_node(root: Node<'_>) -> Option<Node<'_>> {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            return Some(node);
        }
        if !node.has_error() {
            continue;
        }
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
    None
}

fn find_legacy_statement(root: Node<'_>) -> Option<Node<'_>> {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if matches!(node.kind(), "print_statement" | "exec_statement") {
            return Some(node);
        }
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
    None
}

fn describe_error(node: Node<'_>, source: &str) -> String {
    let text = node_text(node, source).trim();
    let opened = text.matches(['(', '[', '{']).count();
    let closed = text.matches([')', ']', '}']).count();
    if opened > closed {
        "invalid syntax: a bracket was opened but never closed".to_string()
    } else if closed > opened {
        "invalid syntax: unmatched closing bracket".to_string()
    } else if text.starts_with(['"', '\'']) && !text.ends_with(['"', '\'']) {
        "invalid syntax: unterminated string literal".to_string()
    } else {
        "invalid syntax".to_string()
    }
}

fn source_line(source: &str, line: usize) -> String {
    snippet(source.lines().nth(line.saturating_sub(1)).unwrap_or(""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::analyzer::parse_python;

    fn check(source: &str) -> Option<Finding> {
        let tree = parse_python(source).unwrap();
        first_syntax_error(tree.root_node(), source)
    }

    #[test]
    fn valid_code_has_no_syntax_error() {
        assert!(check("def add(a, b):\n    return a + b\n").is_none());
    }

    #[test]
    fn reports_line_of_broken_statement() {
        let finding = check("x = 1\ny = 2\nif x == y print(x)\n").unwrap();
        assert_eq!(finding.kind, SYNTAX_ERROR);
        assert_eq!(finding.line, Some(3));
        assert_eq!(finding.severity, Severity::Error);
    }

    #[test]
    fn unclosed_call_is_reported() {
        let finding = check("print('hi'\n").unwrap();
        assert_eq!(finding.kind, SYNTAX_ERROR);
        assert!(finding.line.is_some());
    }

    #[test]
    fn python2_print_is_a_syntax_error() {
        let finding = check("name = 'Ana'\nprint name\n").unwrap();
        assert_eq!(finding.kind, SYNTAX_ERROR);
        assert_eq!(finding.line, Some(2));
    }

    #[test]
    fn unindented_function_body_is_reported() {
        let finding = check("def f():\nreturn 1\n").unwrap();
        assert_eq!(finding.kind, SYNTAX_ERROR);
        assert_eq!(finding.why, EXPECTED_INDENTED_BLOCK);
        assert_eq!(finding.line, Some(2));
    }

    #[test]
    fn unindented_loop_body_is_reported() {
        let finding = check("for i in range(3):\nprint(i)\n").unwrap();
        assert_eq!(finding.why, EXPECTED_INDENTED_BLOCK);
        assert_eq!(finding.line, Some(2));
    }

    #[test]
    fn header_at_end_of_file_needs_a_body() {
        let finding = check("if ready:\n").unwrap();
        assert_eq!(finding.kind, SYNTAX_ERROR);
    }

    #[test]
    fn indented_module_statement_is_reported() {
        let finding = check("x = 1\n    y = 2\n").unwrap();
        assert_eq!(finding.why, UNEXPECTED_INDENT);
        assert_eq!(finding.line, Some(2));
    }

    #[test]
    fn over_indented_block_statement_is_reported() {
        let finding = check("def f():\n    a = 1\n        return a\n").unwrap();
        assert_eq!(finding.kind, SYNTAX_ERROR);
        assert_eq!(finding.line, Some(3));
    }

    #[test]
    fn orphan_else_is_a_syntax_error() {
        let finding = check("else:\n    pass\n").unwrap();
        assert_eq!(finding.kind, SYNTAX_ERROR);
    }

    #[test]
    fn orphan_except_is_a_syntax_error() {
        let finding = check("x = 1\nexcept ValueError:\n    pass\n").unwrap();
        assert_eq!(finding.kind, SYNTAX_ERROR);
    }

    #[test]
    fn return_at_module_level_is_reported() {
        let finding = check("x = 1\nreturn x\n").unwrap();
        assert_eq!(finding.why, "'return' outside function");
        assert_eq!(finding.line, Some(2));
    }

    #[test]
    fn return_in_class_body_is_reported() {
        let finding = check("class A:\n    return 1\n").unwrap();
        assert_eq!(finding.why, "'return' outside function");
    }

    #[test]
    fn yield_at_module_level_is_reported() {
        let finding = check("yield 1\n").unwrap();
        assert_eq!(finding.why, "'yield' outside function");
    }

    #[test]
    fn well_formed_layouts_are_accepted() {
        let source = "\
import os  # trailing
   # comment at an odd column
x = 1; y = 2
if x: print(x)
else:
    pass

@staticmethod
def gen(items):
    for item in items:
        if item:
            yield item
        elif item is None:
            continue
    else:
        return None

class Box:
    def get(self):
        value = [n for n in range(3)]
        return value if value else None

try:
    z = 1 / y
except ZeroDivisionError:
    z = 0
finally:
    print(z)
";
        assert!(check(source).is_none(), "{:?}", check(source));
    }
}

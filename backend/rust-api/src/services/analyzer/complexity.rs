use tree_sitter::Node;

use crate::models::Complexity;

use super::{named_descendants, node_text};

/// Rough big-O description from loop nesting and direct recursion.
pub fn estimate(root: Node<'_>, source: &str) -> Complexity {
    let recursive = has_direct_recursion(root, source);
    let depth = max_loop_depth(root);

    let time = if recursive {
        "Depends on recursion depth; often O(2^n) for naive recursion"
    } else {
        match depth {
            0 | 1 => "Roughly O(n)",
            2 => "Approximately O(n^2)",
            _ => "Approximately O(n^k), k > 2",
        }
    };
    let space = if recursive {
        "O(recursion depth)"
    } else {
        "O(1) to O(n) typical for this file"
    };

    Complexity {
        time: time.to_string(),
        space: space.to_string(),
    }
}

fn is_loop(node: Node<'_>) -> bool {
    matches!(node.kind(), "for_statement" | "while_statement")
}

pub(crate) fn max_loop_depth(root: Node<'_>) -> usize {
    let mut deepest = 0;
    let mut stack = vec![(root, 0usize)];
    while let Some((node, depth)) = stack.pop() {
        let depth = if is_loop(node) { depth + 1 } else { depth };
        deepest = deepest.max(depth);
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            stack.push((child, depth));
        }
    }
    deepest
}

/// A function whose body calls its own name.
fn has_direct_recursion(root: Node<'_>, source: &str) -> bool {
    named_descendants(root)
        .into_iter()
        .filter(|node| node.kind() == "function_definition")
        .any(|function| {
            let (Some(name), Some(body)) = (
                function.child_by_field_name("name"),
                function.child_by_field_name("body"),
            ) else {
                return false;
            };
            let name = node_text(name, source);
            named_descendants(body).into_iter().any(|node| {
                node.kind() == "call"
                    && node
                        .child_by_field_name("function")
                        .map(|callee| callee.kind() == "identifier" && node_text(callee, source) == name)
                        .unwrap_or(false)
            })
        })
}

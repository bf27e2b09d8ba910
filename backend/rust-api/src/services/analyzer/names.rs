//! Name binding and use tracking, and the rules built on it.
//!
//! The table is a flat, position-based approximation of Python scoping:
//! every binding and every read is recorded with its byte offset and the
//! innermost function (or lambda) it belongs to. Class bodies and
//! comprehensions are not separate scopes here.

use std::collections::{HashMap, HashSet};

use tree_sitter::Node;

use crate::models::{Finding, Severity};

use super::catalog::{Rule, RuleMeta};
use super::{line_of, named_descendants, node_text, snippet, RuleContext};

pub const BUILTINS: &[&str] = &[
    "__build_class__", "__debug__", "__doc__", "__file__", "__import__", "__loader__",
    "__name__", "__package__", "__spec__", "__builtins__", "abs", "aiter", "all", "anext",
    "any", "ascii", "bin", "bool", "breakpoint", "bytearray", "bytes", "callable", "chr",
    "classmethod", "compile", "complex", "copyright", "credits", "delattr", "dict", "dir",
    "divmod", "enumerate", "eval", "exec", "exit", "filter", "float", "format", "frozenset",
    "getattr", "globals", "hasattr", "hash", "help", "hex", "id", "input", "int",
    "isinstance", "issubclass", "iter", "len", "license", "list", "locals", "map", "max",
    "memoryview", "min", "next", "object", "oct", "open", "ord", "pow", "print", "property",
    "quit", "range", "repr", "reversed", "round", "set", "setattr", "slice", "sorted",
    "staticmethod", "str", "sum", "super", "tuple", "type", "vars", "zip", "Ellipsis",
    "NotImplemented", "ArithmeticError", "AssertionError", "AttributeError", "BaseException",
    "BaseExceptionGroup", "BlockingIOError", "BrokenPipeError", "BufferError", "BytesWarning",
    "ChildProcessError", "ConnectionAbortedError", "ConnectionError", "ConnectionRefusedError",
    "ConnectionResetError", "DeprecationWarning", "EncodingWarning", "EOFError",
    "EnvironmentError", "Exception", "ExceptionGroup", "FileExistsError", "FileNotFoundError",
    "FloatingPointError", "FutureWarning", "GeneratorExit", "ImportError", "ImportWarning",
    "IndentationError", "IndexError", "InterruptedError", "IOError", "IsADirectoryError",
    "KeyError", "KeyboardInterrupt", "LookupError", "MemoryError", "ModuleNotFoundError",
    "NameError", "NotADirectoryError", "NotImplementedError", "OSError", "OverflowError",
    "PendingDeprecationWarning", "PermissionError", "ProcessLookupError", "RecursionError",
    "ReferenceError", "ResourceWarning", "RuntimeError", "RuntimeWarning",
    "StopAsyncIteration", "StopIteration", "SyntaxError", "SyntaxWarning", "SystemError",
    "SystemExit", "TabError", "TimeoutError", "TypeError", "UnboundLocalError",
    "UnicodeDecodeError", "UnicodeEncodeError", "UnicodeError", "UnicodeTranslateError",
    "UnicodeWarning", "UserWarning", "ValueError", "Warning", "ZeroDivisionError",
];

pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingOrigin {
    Assignment,
    /// Element of a tuple/list unpacking target.
    Unpacking,
    Parameter,
    Loop,
    Import,
    /// `def` or `class` name.
    Definition,
    /// `global`/`nonlocal`, `except ... as`, match captures and the like.
    Other,
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub name: String,
    pub origin: BindingOrigin,
    /// Byte offset the binding takes effect at.
    pub position: usize,
    pub line: usize,
    pub function: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct Load {
    pub name: String,
    pub position: usize,
    pub line: usize,
    pub function: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct FunctionScope {
    pub start: usize,
    pub end: usize,
    pub is_lambda: bool,
    /// Names declared `global` or `nonlocal` inside this function.
    pub declared: HashSet<String>,
}

impl FunctionScope {
    fn contains(&self, position: usize) -> bool {
        position >= self.start && position < self.end
    }
}

#[derive(Debug, Clone, Default)]
pub struct NameTable {
    bindings: Vec<Binding>,
    loads: Vec<Load>,
    functions: Vec<FunctionScope>,
    star_import: bool,
}

impl NameTable {
    pub fn build(root: Node<'_>, source: &str) -> Self {
        TableBuilder::new(root, source).finish()
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn loads(&self) -> &[Load] {
        &self.loads
    }

    pub fn functions(&self) -> &[FunctionScope] {
        &self.functions
    }

    pub fn has_star_import(&self) -> bool {
        self.star_import
    }

    pub fn is_bound_anywhere(&self, name: &str) -> bool {
        self.bindings.iter().any(|b| b.name == name)
    }

    /// Earliest module-level binding of `name`, if any.
    fn first_module_binding(&self, name: &str) -> Option<usize> {
        self.bindings
            .iter()
            .filter(|b| b.name == name && b.function.is_none())
            .map(|b| b.position)
            .min()
    }

    fn is_bound_in_some_function(&self, name: &str) -> bool {
        self.bindings
            .iter()
            .any(|b| b.name == name && b.function.is_some())
    }
}

struct TableBuilder<'t> {
    root: Node<'t>,
    source: &'t str,
    table: NameTable,
    scope_ids: HashMap<usize, usize>,
    /// Identifier nodes already classified as a binding or ignored.
    consumed: HashSet<usize>,
}

impl<'t> TableBuilder<'t> {
    fn new(root: Node<'t>, source: &'t str) -> Self {
        Self {
            root,
            source,
            table: NameTable::default(),
            scope_ids: HashMap::new(),
            consumed: HashSet::new(),
        }
    }

    fn finish(mut self) -> NameTable {
        let nodes = named_descendants(self.root);

        for node in &nodes {
            if matches!(node.kind(), "function_definition" | "lambda") {
                self.scope_ids.insert(node.id(), self.table.functions.len());
                self.table.functions.push(FunctionScope {
                    start: node.start_byte(),
                    end: node.end_byte(),
                    is_lambda: node.kind() == "lambda",
                    declared: HashSet::new(),
                });
            }
        }

        for node in &nodes {
            self.visit(*node);
        }

        for node in &nodes {
            if node.kind() == "identifier" && !self.consumed.contains(&node.id()) {
                let function = self.scope_of(*node);
                let name = self.text(*node).to_string();
                self.table.loads.push(Load {
                    name,
                    position: node.start_byte(),
                    line: line_of(*node),
                    function,
                });
            }
        }

        self.table.bindings.sort_by_key(|b| b.position);
        self.table
    }

    fn text(&self, node: Node<'_>) -> &'t str {
        node_text(node, self.source)
    }

    /// Innermost function or lambda strictly enclosing `node`.
    fn scope_of(&self, node: Node<'_>) -> Option<usize> {
        let mut current = node.parent();
        while let Some(parent) = current {
            if let Some(index) = self.scope_ids.get(&parent.id()) {
                return Some(*index);
            }
            current = parent.parent();
        }
        None
    }

    fn bind(&mut self, node: Node<'_>, origin: BindingOrigin, scope_from: Node<'_>, position: usize) {
        self.consumed.insert(node.id());
        let function = self.scope_of(scope_from);
        let name = self.text(node).to_string();
        self.table.bindings.push(Binding {
            name,
            origin,
            position,
            line: line_of(node),
            function,
        });
    }

    fn bind_here(&mut self, node: Node<'_>, origin: BindingOrigin) {
        self.bind(node, origin, node, node.start_byte());
    }

    fn ignore(&mut self, node: Node<'_>) {
        self.consumed.insert(node.id());
    }

    fn ignore_all(&mut self, node: Node<'_>) {
        for inner in named_descendants(node) {
            if inner.kind() == "identifier" {
                self.ignore(inner);
            }
        }
    }

    /// Binds every plain name in an assignment-like target. Attribute and
    /// subscript targets are reads of their object and stay untouched.
    fn bind_targets(&mut self, target: Node<'_>, origin: BindingOrigin, position: Option<usize>) {
        match target.kind() {
            "identifier" => {
                let position = position.unwrap_or(target.start_byte());
                self.bind(target, origin, target, position);
            }
            "pattern_list" | "tuple_pattern" | "list_pattern" | "tuple" | "list"
            | "expression_list" | "parenthesized_expression" | "list_splat_pattern"
            | "list_splat" | "as_pattern_target" => {
                let origin = match (origin, target.kind()) {
                    (BindingOrigin::Assignment, "as_pattern_target" | "parenthesized_expression") => origin,
                    (BindingOrigin::Assignment, _) => BindingOrigin::Unpacking,
                    _ => origin,
                };
                let mut cursor = target.walk();
                let children: Vec<Node<'_>> = target.named_children(&mut cursor).collect();
                for child in children {
                    self.bind_targets(child, origin, position);
                }
            }
            _ => {}
        }
    }

    fn bind_parameters(&mut self, parameters: Node<'_>) {
        let mut cursor = parameters.walk();
        let params: Vec<Node<'_>> = parameters.named_children(&mut cursor).collect();
        for param in params {
            match param.kind() {
                "identifier" => self.bind_here(param, BindingOrigin::Parameter),
                "default_parameter" | "typed_default_parameter" => {
                    if let Some(name) = param.child_by_field_name("name") {
                        self.bind_targets(name, BindingOrigin::Parameter, None);
                    }
                }
                "typed_parameter" | "list_splat_pattern" | "dictionary_splat_pattern" => {
                    let mut inner = param.walk();
                    let first = param.named_children(&mut inner).next();
                    match first {
                        Some(name) if name.kind() == "identifier" => {
                            self.bind_here(name, BindingOrigin::Parameter)
                        }
                        Some(splat) => self.bind_parameters_in_splat(splat),
                        None => {}
                    }
                }
                _ => {}
            }
        }
    }

    /// `*args: int` nests the splat inside the typed parameter.
    fn bind_parameters_in_splat(&mut self, splat: Node<'_>) {
        let mut cursor = splat.walk();
        let name = splat
            .named_children(&mut cursor)
            .find(|child| child.kind() == "identifier");
        if let Some(name) = name {
            self.bind_here(name, BindingOrigin::Parameter);
        }
    }

    fn visit(&mut self, node: Node<'_>) {
        match node.kind() {
            "function_definition" | "class_definition" => {
                if let Some(name) = node.child_by_field_name("name") {
                    self.bind(name, BindingOrigin::Definition, node, name.start_byte());
                }
                if let Some(parameters) = node.child_by_field_name("parameters") {
                    self.bind_parameters(parameters);
                }
            }
            "lambda" => {
                if let Some(parameters) = node.child_by_field_name("parameters") {
                    self.bind_parameters(parameters);
                }
            }
            "assignment" => {
                if let Some(left) = node.child_by_field_name("left") {
                    if node.child_by_field_name("right").is_some() {
                        self.bind_targets(left, BindingOrigin::Assignment, None);
                    } else if left.kind() == "identifier" {
                        // bare annotation, binds nothing
                        self.ignore(left);
                    }
                }
            }
            "for_statement" => {
                if let Some(left) = node.child_by_field_name("left") {
                    self.bind_targets(left, BindingOrigin::Loop, None);
                }
            }
            "for_in_clause" => {
                // comprehension variables are visible from the start of the comprehension
                let position = node.parent().map(|p| p.start_byte());
                if let Some(left) = node.child_by_field_name("left") {
                    self.bind_targets(left, BindingOrigin::Loop, position);
                }
            }
            "named_expression" => {
                if let Some(name) = node.child_by_field_name("name") {
                    self.bind_here(name, BindingOrigin::Assignment);
                }
            }
            "as_pattern_target" => {
                let origin = if node.parent().and_then(|p| p.parent()).map(|g| g.kind())
                    == Some("with_item")
                {
                    BindingOrigin::Assignment
                } else {
                    BindingOrigin::Other
                };
                self.bind_as_target(node, origin);
            }
            "except_clause" => self.visit_except(node),
            "import_statement" => self.visit_import(node),
            "import_from_statement" => self.visit_import_from(node),
            "future_import_statement" => self.ignore_all(node),
            "global_statement" | "nonlocal_statement" => {
                let scope = self.scope_of(node);
                let mut cursor = node.walk();
                let names: Vec<Node<'_>> = node
                    .named_children(&mut cursor)
                    .filter(|child| child.kind() == "identifier")
                    .collect();
                for name in names {
                    if let Some(index) = scope {
                        let text = self.text(name).to_string();
                        self.table.functions[index].declared.insert(text);
                    }
                    self.bind_here(name, BindingOrigin::Other);
                }
            }
            "keyword_argument" => {
                if let Some(name) = node.child_by_field_name("name") {
                    self.ignore(name);
                }
            }
            "attribute" => {
                if let Some(attribute) = node.child_by_field_name("attribute") {
                    self.ignore(attribute);
                }
            }
            "case_pattern" => self.visit_case_pattern(node),
            _ => {}
        }
    }

    fn bind_as_target(&mut self, target: Node<'_>, origin: BindingOrigin) {
        let mut cursor = target.walk();
        let children: Vec<Node<'_>> = target.named_children(&mut cursor).collect();
        if children.is_empty() {
            // the alias replaced the identifier node itself
            self.consumed.insert(target.id());
            let function = self.scope_of(target);
            let name = self.text(target).to_string();
            self.table.bindings.push(Binding {
                name,
                origin,
                position: target.start_byte(),
                line: line_of(target),
                function,
            });
        } else {
            for child in children {
                self.bind_targets(child, origin, None);
            }
        }
    }

    fn visit_except(&mut self, clause: Node<'_>) {
        let mut cursor = clause.walk();
        let children: Vec<Node<'_>> = clause.children(&mut cursor).collect();
        let mut after_as = false;
        for child in children {
            if !child.is_named() {
                after_as = child.kind() == "as";
                continue;
            }
            if after_as && child.kind() == "identifier" {
                self.bind_here(child, BindingOrigin::Other);
            }
            after_as = false;
        }
    }

    fn visit_import(&mut self, statement: Node<'_>) {
        let mut cursor = statement.walk();
        let names: Vec<Node<'_>> = statement.children_by_field_name("name", &mut cursor).collect();
        for name in names {
            self.bind_import_name(name, true);
        }
        self.ignore_all(statement);
    }

    fn visit_import_from(&mut self, statement: Node<'_>) {
        let mut cursor = statement.walk();
        let children: Vec<Node<'_>> = statement.named_children(&mut cursor).collect();
        if children.iter().any(|child| child.kind() == "wildcard_import") {
            self.table.star_import = true;
        }
        let mut cursor = statement.walk();
        let names: Vec<Node<'_>> = statement.children_by_field_name("name", &mut cursor).collect();
        for name in names {
            self.bind_import_name(name, false);
        }
        self.ignore_all(statement);
    }

    /// `import a.b` binds `a`; `from m import a` binds `a`; aliases bind the alias.
    fn bind_import_name(&mut self, name: Node<'_>, first_segment: bool) {
        let target = match name.kind() {
            "aliased_import" => name.child_by_field_name("alias"),
            "dotted_name" => {
                let mut cursor = name.walk();
                let segments: Vec<Node<'_>> = name.named_children(&mut cursor).collect();
                if first_segment {
                    segments.first().copied()
                } else {
                    segments.last().copied()
                }
            }
            "identifier" => Some(name),
            _ => None,
        };
        if let Some(target) = target {
            self.bind_here(target, BindingOrigin::Import);
        }
    }

    /// Capture names in `case` patterns bind; dotted value patterns and
    /// keyword keys do not.
    fn visit_case_pattern(&mut self, pattern: Node<'_>) {
        for node in named_descendants(pattern) {
            if node.kind() != "identifier" || self.consumed.contains(&node.id()) {
                continue;
            }
            let Some(parent) = node.parent() else {
                continue;
            };
            match parent.kind() {
                "dotted_name" => {
                    let in_class_pattern =
                        parent.parent().map(|g| g.kind()) == Some("class_pattern");
                    if parent.named_child_count() == 1 && !in_class_pattern {
                        self.bind_here(node, BindingOrigin::Other);
                    }
                }
                "keyword_pattern" => {
                    let is_key = parent
                        .named_child(0)
                        .map(|key| key.id() == node.id())
                        .unwrap_or(false);
                    if is_key {
                        self.ignore(node);
                    } else {
                        self.bind_here(node, BindingOrigin::Other);
                    }
                }
                _ => self.bind_here(node, BindingOrigin::Other),
            }
        }
    }
}

fn line_finding(ctx: &RuleContext<'_>, meta: &RuleMeta, line: usize, why: String) -> Finding {
    let text = ctx.source.lines().nth(line.saturating_sub(1)).unwrap_or("");
    Finding::new(meta.kind, why, meta.severity)
        .at_line(line)
        .with_snippet(snippet(text))
}

pub struct UndefinedName;

static UNDEFINED_NAME: RuleMeta = RuleMeta {
    id: "undefined-name",
    kind: "Potential issue",
    severity: Severity::Error,
    rank: 10,
    concept: "Variable scope and definition order",
};

impl UndefinedName {
    fn is_undefined(table: &NameTable, load: &Load) -> bool {
        match load.function {
            Some(_) => !table.is_bound_anywhere(&load.name),
            None => match table.first_module_binding(&load.name) {
                Some(position) => {
                    position > load.position && !table.is_bound_in_some_function(&load.name)
                }
                None => !table.is_bound_anywhere(&load.name),
            },
        }
    }
}

impl Rule for UndefinedName {
    fn meta(&self) -> &'static RuleMeta {
        &UNDEFINED_NAME
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Vec<Finding> {
        let table = &ctx.names;
        if table.has_star_import() {
            return Vec::new();
        }
        let mut seen = HashSet::new();
        let mut findings = Vec::new();
        for load in table.loads() {
            if is_builtin(&load.name) || !Self::is_undefined(table, load) {
                continue;
            }
            if !seen.insert((load.name.as_str(), load.line)) {
                continue;
            }
            findings.push(line_finding(
                ctx,
                &UNDEFINED_NAME,
                load.line,
                format!("Variable '{}' might not be defined before it is used.", load.name),
            ));
        }
        findings
    }
}

pub struct ShadowedBuiltin;

static SHADOWED_BUILTIN: RuleMeta = RuleMeta {
    id: "shadowed-builtin",
    kind: "ShadowedBuiltin",
    severity: Severity::Warning,
    rank: 70,
    concept: "Built-in functions and naming",
};

impl Rule for ShadowedBuiltin {
    fn meta(&self) -> &'static RuleMeta {
        &SHADOWED_BUILTIN
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Vec<Finding> {
        let mut reported = HashSet::new();
        let mut findings = Vec::new();
        for binding in ctx.names.bindings() {
            let shadowing = matches!(
                binding.origin,
                BindingOrigin::Assignment
                    | BindingOrigin::Unpacking
                    | BindingOrigin::Parameter
                    | BindingOrigin::Loop
                    | BindingOrigin::Definition
            );
            if !shadowing || binding.name.starts_with("__") || !is_builtin(&binding.name) {
                continue;
            }
            if !reported.insert(binding.name.as_str()) {
                continue;
            }
            findings.push(line_finding(
                ctx,
                &SHADOWED_BUILTIN,
                binding.line,
                format!(
                    "'{}' is the name of a built-in; reusing it hides the built-in {}() for the rest of this scope.",
                    binding.name, binding.name
                ),
            ));
        }
        findings
    }
}

pub struct UnusedVariable;

static UNUSED_VARIABLE: RuleMeta = RuleMeta {
    id: "unused-variable",
    kind: "UnusedVariable",
    severity: Severity::Info,
    rank: 95,
    concept: "Local variables",
};

impl Rule for UnusedVariable {
    fn meta(&self) -> &'static RuleMeta {
        &UNUSED_VARIABLE
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Vec<Finding> {
        let table = &ctx.names;
        let mut findings = Vec::new();
        for (index, scope) in table.functions().iter().enumerate() {
            if scope.is_lambda {
                continue;
            }
            let mut reported = HashSet::new();
            for binding in table.bindings() {
                if binding.function != Some(index)
                    || binding.origin != BindingOrigin::Assignment
                    || binding.name.starts_with('_')
                    || scope.declared.contains(&binding.name)
                {
                    continue;
                }
                let read = table
                    .loads()
                    .iter()
                    .any(|load| load.name == binding.name && scope.contains(load.position));
                if read || !reported.insert(binding.name.as_str()) {
                    continue;
                }
                findings.push(line_finding(
                    ctx,
                    &UNUSED_VARIABLE,
                    binding.line,
                    format!("Local variable '{}' is assigned but never used.", binding.name),
                ));
            }
        }
        findings.sort_by_key(|f| f.line);
        findings
    }
}

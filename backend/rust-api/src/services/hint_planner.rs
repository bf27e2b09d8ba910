//! Hint levels, their disclosure ceilings and the checks that enforce them.
//!
//! The ceiling text goes into the prompt; the checks below run on what comes
//! back. A hint that leaks more than its level allows gets one local repair
//! (offending content stripped) and is replaced by a generic hint if it still
//! fails.

use lazy_static::lazy_static;
use regex::Regex;

use crate::metrics;
use crate::models::{Finding, Hint, HintLevel, ModeCapabilities};
use crate::services::analyzer::RuleCatalog;

/// Fenced code and statement lines a near-solution hint may still show.
pub const NEAR_SOLUTION_MAX_CODE_LINES: usize = 3;

lazy_static! {
    static ref FENCED_BLOCK: Regex = Regex::new(r"(?s)```[^\n]*\n?(.*?)(?:```|$)").unwrap();
    static ref INLINE_CODE: Regex = Regex::new(r"`([^`\n]+)`").unwrap();
    static ref STATEMENT_LINE: Regex = Regex::new(
        r"^\s*(?:(?:def|class)\s+\w+.*:|(?:for|while|if|elif|with)\s.+:|else\s*:|try\s*:|finally\s*:|except\b.*:|return\b|import\s+\w|from\s+\S+\s+import\s|print\s*\(|[A-Za-z_][\w.\[\]]*\s*(?:=|\+=|-=|\*=|/=)\s*\S)"
    )
    .unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disclosure {
    FencedCode,
    StatementLines,
    InlineCode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedLevel {
    pub level: HintLevel,
    pub ceiling: &'static str,
}

impl PlannedLevel {
    fn new(level: HintLevel) -> Self {
        Self {
            level,
            ceiling: ceiling_for(level),
        }
    }
}

pub fn ceiling_for(level: HintLevel) -> &'static str {
    match level {
        HintLevel::Beginner => "identify the concept involved, no fix",
        HintLevel::Intermediate => "point at the specific construct and why it's wrong",
        HintLevel::NearSolution => "describe the corrective approach without pasting full code",
    }
}

/// What generic hints talk about when nothing better is available.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HintFocus {
    pub concept: Option<String>,
    pub line: Option<usize>,
}

impl HintFocus {
    /// Focus on the highest-priority finding.
    pub fn from_findings(findings: &[Finding], catalog: &RuleCatalog) -> Self {
        let Some(top) = findings.first() else {
            return Self::default();
        };
        Self {
            concept: catalog
                .meta_for_kind(&top.kind)
                .map(|meta| meta.concept.to_string()),
            line: top.line,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HintPlan {
    levels: Vec<PlannedLevel>,
}

impl HintPlan {
    /// Levels `1..=depth` in ascending order, or nothing when the mode does
    /// not emit hints.
    pub fn new(capabilities: ModeCapabilities, depth: u8) -> Self {
        if !capabilities.emits_hints {
            return Self::default();
        }
        let levels = (1..=depth)
            .filter_map(HintLevel::from_rank)
            .map(PlannedLevel::new)
            .collect();
        Self { levels }
    }

    pub fn levels(&self) -> &[PlannedLevel] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// One hint per planned level, in order. Candidates for levels outside
    /// the plan are discarded.
    pub fn settle(&self, candidates: &[Hint], focus: &HintFocus) -> Vec<Hint> {
        self.levels
            .iter()
            .map(|planned| {
                let level = planned.level;
                let candidate = candidates
                    .iter()
                    .find(|hint| hint.level == level && !hint.text.trim().is_empty());
                let text = match candidate {
                    Some(hint) => accept_or_repair(level, &hint.text).unwrap_or_else(|| {
                        tracing::warn!("Hint at level {} degraded to generic text", level.as_str());
                        metrics::record_hint_degraded(level.as_str());
                        generic_hint(level, focus)
                    }),
                    None => {
                        tracing::debug!("No hint returned for level {}, using generic text", level.as_str());
                        generic_hint(level, focus)
                    }
                };
                Hint { level, text }
            })
            .collect()
    }
}

/// The hint as-is when it respects its ceiling, otherwise a single stripped
/// retry.
fn accept_or_repair(level: HintLevel, text: &str) -> Option<String> {
    let text = text.trim();
    if violations(level, text).is_empty() {
        return Some(text.to_string());
    }
    let repaired = repair(level, text);
    (!repaired.is_empty() && violations(level, &repaired).is_empty()).then_some(repaired)
}

pub fn violations(level: HintLevel, text: &str) -> Vec<Disclosure> {
    let mut found = Vec::new();
    let fenced_lines = fenced_line_count(text);
    let has_fence = text.contains("```");
    let statements = statement_line_count(text);

    match level {
        HintLevel::Beginner | HintLevel::Intermediate => {
            if has_fence {
                found.push(Disclosure::FencedCode);
            }
            if statements > 0 {
                found.push(Disclosure::StatementLines);
            }
        }
        HintLevel::NearSolution => {
            if fenced_lines > NEAR_SOLUTION_MAX_CODE_LINES {
                found.push(Disclosure::FencedCode);
            }
            if statements > NEAR_SOLUTION_MAX_CODE_LINES {
                found.push(Disclosure::StatementLines);
            }
        }
    }
    if level == HintLevel::Beginner && INLINE_CODE.is_match(&without_fences(text)) {
        found.push(Disclosure::InlineCode);
    }
    found
}

fn fenced_line_count(text: &str) -> usize {
    FENCED_BLOCK
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|body| body.as_str().lines().filter(|l| !l.trim().is_empty()).count())
        .sum()
}

fn without_fences(text: &str) -> String {
    FENCED_BLOCK.replace_all(text, "").into_owned()
}

/// Statement-looking lines outside fenced blocks.
fn statement_line_count(text: &str) -> usize {
    without_fences(text)
        .lines()
        .filter(|line| STATEMENT_LINE.is_match(line))
        .count()
}

fn repair(level: HintLevel, text: &str) -> String {
    let mut out = without_fences(text);
    let keep_statements = level == HintLevel::NearSolution
        && statement_line_count(&out) <= NEAR_SOLUTION_MAX_CODE_LINES;
    if !keep_statements {
        out = out
            .lines()
            .filter(|line| !STATEMENT_LINE.is_match(line))
            .collect::<Vec<_>>()
            .join("\n");
    }
    if level == HintLevel::Beginner {
        out = INLINE_CODE.replace_all(&out, "$1").into_owned();
    }
    out.lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn generic_hint(level: HintLevel, focus: &HintFocus) -> String {
    let place = match focus.line {
        Some(line) => format!("line {}", line),
        None => "the part of the program that behaves unexpectedly".to_string(),
    };
    match (level, &focus.concept) {
        (HintLevel::Beginner, Some(concept)) => format!(
            "The problem is related to this concept: {}. Review how it works in Python before changing anything.",
            concept
        ),
        (HintLevel::Beginner, None) => {
            "Read your program one statement at a time and predict what each one does before running it."
                .to_string()
        }
        (HintLevel::Intermediate, _) => format!(
            "Look closely at {}. Ask yourself what value each name holds there and whether that operation is valid for it.",
            place
        ),
        (HintLevel::NearSolution, _) => format!(
            "Change the construct on {} so it matches what you intend, then run the program again with a small test input.",
            place
        ),
    }
}

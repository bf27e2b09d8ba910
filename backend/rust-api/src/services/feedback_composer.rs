use std::time::Duration;

use crate::metrics;
use crate::models::{AnalysisResult, CodeSubmission, Complexity, Finding};
use crate::services::hint_planner::{HintFocus, HintPlan, NEAR_SOLUTION_MAX_CODE_LINES};
use crate::services::provider::{self, FeedbackProvider, ProviderError};
use crate::services::reply::{parse_reply, ProviderReply};

const REPLY_SCHEMA: &str = r#"{
  "summary": "What went wrong, in plain English.",
  "hints": [
    {"level": "beginner", "text": "..."},
    {"level": "intermediate", "text": "..."},
    {"level": "near_solution", "text": "..."}
  ],
  "full_solution": {"code": "...", "explanation": "..."},
  "key_concepts": ["..."],
  "complexity": {"time": "...", "space": "..."},
  "best_practices": ["..."]
}"#;

/// Everything the composer needs for one submission.
pub struct CompositionInput<'a> {
    pub submission: &'a CodeSubmission,
    pub findings: &'a [Finding],
    pub plan: &'a HintPlan,
    pub focus: &'a HintFocus,
    pub static_complexity: Option<&'a Complexity>,
}

pub struct FeedbackComposer<'a> {
    provider: Option<&'a dyn FeedbackProvider>,
    timeout: Duration,
}

impl<'a> FeedbackComposer<'a> {
    pub fn new(provider: Option<&'a dyn FeedbackProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Provisional result: provider feedback merged over static findings, or
    /// the static-only fallback when the provider is unavailable or fails.
    pub async fn compose(&self, input: &CompositionInput<'_>) -> AnalysisResult {
        match self.request_reply(input).await {
            Ok(reply) => merge(input, reply),
            Err(e) => {
                match &e {
                    ProviderError::NotConfigured => {
                        tracing::debug!("Provider not configured, using static feedback")
                    }
                    _ => tracing::warn!("Feedback provider failed, falling back: {}", e),
                }
                fallback(input.findings)
            }
        }
    }

    async fn request_reply(&self, input: &CompositionInput<'_>) -> Result<ProviderReply, ProviderError> {
        let provider = self.provider.ok_or(ProviderError::NotConfigured)?;
        let prompt = build_prompt(input);

        tracing::debug!(
            "Calling provider {} (prompt {} chars, timeout {}s)",
            provider.name(),
            prompt.chars().count(),
            self.timeout.as_secs()
        );

        let reply = metrics::track_provider_call(async {
            let raw = provider::generate_within(provider, &prompt, self.timeout).await?;
            let reply = parse_reply(&raw)?;
            if reply.is_usable() {
                Ok(reply)
            } else {
                Err(ProviderError::Malformed("reply has no summary".to_string()))
            }
        })
        .await?;

        Ok(reply)
    }
}

fn merge(input: &CompositionInput<'_>, reply: ProviderReply) -> AnalysisResult {
    let capabilities = input.submission.capabilities();

    let hints = if capabilities.emits_hints {
        input.plan.settle(&reply.hints, input.focus)
    } else {
        if !reply.hints.is_empty() {
            tracing::debug!("Discarding {} provider hints in diagnostic mode", reply.hints.len());
        }
        Vec::new()
    };

    let full_solution = if input.submission.wants_solution() {
        reply.full_solution
    } else {
        None
    };

    let complexity = if input.submission.include_complexity {
        reply.complexity.or_else(|| input.static_complexity.cloned())
    } else {
        None
    };

    AnalysisResult {
        summary: reply.summary.unwrap_or_default(),
        error_clusters: input.findings.to_vec(),
        hints,
        full_solution,
        key_concepts: reply.key_concepts,
        complexity,
        best_practices: reply.best_practices,
    }
}

/// Static-only result used whenever the provider cannot help.
pub fn fallback(findings: &[Finding]) -> AnalysisResult {
    AnalysisResult {
        summary: static_summary(findings),
        error_clusters: findings.to_vec(),
        hints: Vec::new(),
        full_solution: None,
        key_concepts: Vec::new(),
        complexity: None,
        best_practices: Vec::new(),
    }
}

pub fn count_summary(count: usize) -> String {
    match count {
        0 => "No static issues detected.".to_string(),
        1 => "1 issue found".to_string(),
        n => format!("{} issues found", n),
    }
}

/// Count plus the distinct finding types, in ranked order.
pub fn static_summary(findings: &[Finding]) -> String {
    if findings.is_empty() {
        return count_summary(0);
    }
    let mut kinds: Vec<&str> = Vec::new();
    for finding in findings {
        if !kinds.contains(&finding.kind.as_str()) {
            kinds.push(&finding.kind);
        }
    }
    format!("{}: {}.", count_summary(findings.len()), kinds.join(", "))
}

pub fn build_prompt(input: &CompositionInput<'_>) -> String {
    let submission = input.submission;
    let capabilities = submission.capabilities();
    let mut rules = vec![
        "Keep every explanation beginner-friendly.".to_string(),
        "Use the static findings as context; do not repeat them word for word.".to_string(),
    ];

    if input.plan.is_empty() {
        rules.push("Return \"hints\": [] (no hints in this mode).".to_string());
    } else {
        rules.push(format!(
            "Return exactly {} hint(s), one per level, in this order:",
            input.plan.len()
        ));
        for planned in input.plan.levels() {
            rules.push(format!("  - {}: {}", planned.level.as_str(), planned.ceiling));
        }
        rules.push(
            "Beginner and intermediate hints must not contain code blocks or Python statements."
                .to_string(),
        );
        rules.push(format!(
            "A near_solution hint may show at most {} lines of code.",
            NEAR_SOLUTION_MAX_CODE_LINES
        ));
    }

    if submission.wants_solution() {
        rules.push("Include full_solution with corrected code and an explanation.".to_string());
    } else {
        rules.push("Omit full_solution.".to_string());
    }

    if !capabilities.emits_study_notes {
        rules.push("Return empty key_concepts and best_practices.".to_string());
    }

    match (submission.include_complexity, input.static_complexity) {
        (true, Some(estimate)) => rules.push(format!(
            "Include complexity. A static estimate is time \"{}\", space \"{}\"; refine it if needed.",
            estimate.time, estimate.space
        )),
        (true, None) => rules.push("Include complexity.".to_string()),
        (false, _) => rules.push("Omit complexity.".to_string()),
    }

    let findings = serde_json::to_string_pretty(input.findings).unwrap_or_else(|_| "[]".to_string());
    let mut numbered_rules = Vec::with_capacity(rules.len());
    let mut number = 0;
    for rule in rules {
        if rule.starts_with("  - ") {
            numbered_rules.push(rule);
        } else {
            number += 1;
            numbered_rules.push(format!("{}) {}", number, rule));
        }
    }

    format!(
        "You are a Python tutor for beginners. Reply with strict JSON only, using this schema:\n{}\n\n\
         Rules:\n{}\n\n\
         Help mode: {}\n\n\
         Static findings:\n{}\n\n\
         Code:\n```python\n{}\n```",
        REPLY_SCHEMA,
        numbered_rules.join("\n"),
        submission.help_mode.as_str(),
        findings,
        submission.code
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HelpMode, HintLevel, Severity};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        reply: Result<String, ()>,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn ok(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                reply: Err(()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl FeedbackProvider for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn generate(&self, _prompt: &str) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone().map_err(|_| ProviderError::Status(500))
        }
    }

    const FULL_REPLY: &str = r#"{
        "summary": "Bare except hides errors.",
        "hints": [
            {"level": "beginner", "text": "Think about which errors you expect."},
            {"level": "intermediate", "text": "The handler on line 3 catches everything."},
            {"level": "near_solution", "text": "Name the exception type in the handler."}
        ],
        "full_solution": {"code": "except ValueError:", "explanation": "Catch only what you expect."},
        "key_concepts": ["Exception handling"],
        "complexity": {"time": "O(1)", "space": "O(1)"},
        "best_practices": ["Catch specific exceptions"]
    }"#;

    fn findings() -> Vec<Finding> {
        vec![Finding::new("BareExcept", "catches everything", Severity::Warning).at_line(3)]
    }

    async fn compose_with(
        provider: Option<&dyn FeedbackProvider>,
        submission: &CodeSubmission,
    ) -> AnalysisResult {
        let findings = findings();
        let plan = HintPlan::new(submission.capabilities(), submission.hint_depth);
        let focus = HintFocus::default();
        let input = CompositionInput {
            submission,
            findings: &findings,
            plan: &plan,
            focus: &focus,
            static_complexity: None,
        };
        FeedbackComposer::new(provider, Duration::from_secs(2))
            .compose(&input)
            .await
    }

    #[tokio::test]
    async fn guided_reply_is_merged_with_planned_hints() {
        let provider = Fixed::ok(FULL_REPLY);
        let submission = CodeSubmission::new("try:\n    x()\nexcept:\n    pass\n", HelpMode::Guided)
            .with_hint_depth(2)
            .with_solution(true);

        let result = compose_with(Some(&provider as &dyn FeedbackProvider), &submission).await;

        assert_eq!(result.summary, "Bare except hides errors.");
        assert_eq!(result.hints.len(), 2);
        assert_eq!(result.hints[1].level, HintLevel::Intermediate);
        assert!(result.full_solution.is_some());
        assert_eq!(result.error_clusters, findings());
        assert!(result.complexity.is_none());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn diagnostic_strips_hints_and_solution() {
        let provider = Fixed::ok(FULL_REPLY);
        let submission = CodeSubmission::new("x = 1", HelpMode::Diagnostic).with_hint_depth(3);

        let result = compose_with(Some(&provider as &dyn FeedbackProvider), &submission).await;

        assert!(result.hints.is_empty());
        assert!(result.full_solution.is_none());
    }

    #[tokio::test]
    async fn provider_failure_falls_back_once() {
        let provider = Fixed::failing();
        let submission = CodeSubmission::new("x = 1", HelpMode::Guided).with_hint_depth(3);

        let result = compose_with(Some(&provider as &dyn FeedbackProvider), &submission).await;

        assert_eq!(result.summary, "1 issue found: BareExcept.");
        assert!(result.hints.is_empty());
        assert!(result.full_solution.is_none());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reply_without_summary_is_a_failure() {
        let provider = Fixed::ok(r#"{"hints": [{"level": "beginner", "text": "hi"}]}"#);
        let submission = CodeSubmission::new("x = 1", HelpMode::Guided);

        let result = compose_with(Some(&provider as &dyn FeedbackProvider), &submission).await;

        assert!(result.hints.is_empty());
        assert_eq!(result.summary, "1 issue found: BareExcept.");
    }

    #[tokio::test]
    async fn no_provider_means_static_feedback() {
        let submission = CodeSubmission::new("x = 1", HelpMode::Guided);
        let result = compose_with(None, &submission).await;
        assert!(result.key_concepts.is_empty());
        assert!(result.complexity.is_none());
    }

    #[test]
    fn prompt_lists_ceilings_and_code() {
        let submission = CodeSubmission::new("print('hi')", HelpMode::Guided)
            .with_hint_depth(3)
            .with_complexity(true);
        let plan = HintPlan::new(submission.capabilities(), 3);
        let focus = HintFocus::default();
        let estimate = Complexity {
            time: "Roughly O(n)".to_string(),
            space: "O(1)".to_string(),
        };
        let prompt = build_prompt(&CompositionInput {
            submission: &submission,
            findings: &[],
            plan: &plan,
            focus: &focus,
            static_complexity: Some(&estimate),
        });

        assert!(prompt.contains("Return exactly 3 hint(s)"));
        assert!(prompt.contains("near_solution: describe the corrective approach"));
        assert!(prompt.contains("Roughly O(n)"));
        assert!(prompt.contains("```python\nprint('hi')\n```"));
    }

    #[test]
    fn static_summary_lists_distinct_types() {
        let findings = vec![
            Finding::new("SyntaxError", "bad", Severity::Error),
            Finding::new("BareExcept", "a", Severity::Warning),
            Finding::new("BareExcept", "b", Severity::Warning),
        ];
        assert_eq!(static_summary(&findings), "3 issues found: SyntaxError, BareExcept.");
        assert_eq!(static_summary(&[]), "No static issues detected.");
    }
}

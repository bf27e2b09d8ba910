use sha2::{Digest, Sha256};

use crate::metrics;
use crate::models::{AnalysisResult, CodeSubmission};
use crate::services::analyzer::oversize_finding;
use crate::services::assembler::assemble;
use crate::services::feedback_composer::{fallback, CompositionInput, FeedbackComposer};
use crate::services::hint_planner::{HintFocus, HintPlan};
use crate::services::ranker::rank_findings;
use crate::services::AppState;

pub const NO_CODE_SUMMARY: &str = "No code provided. Paste Python code first.";

pub struct AnalysisService<'a> {
    state: &'a AppState,
}

impl<'a> AnalysisService<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    pub async fn analyze(&self, submission: &CodeSubmission) -> AnalysisResult {
        let fingerprint = fingerprint(&submission.code);
        metrics::record_analysis(submission.help_mode.as_str());
        tracing::info!(
            "Analyzing submission {}: mode={}, depth={}, chars={}",
            fingerprint,
            submission.help_mode.as_str(),
            submission.hint_depth,
            submission.char_count()
        );

        if submission.code.trim().is_empty() {
            return assemble(no_code_result(), submission, 0);
        }

        let limit = self.state.config.max_code_chars;
        let length = submission.char_count();
        if length > limit {
            tracing::info!("Submission {} rejected as oversize ({} > {})", fingerprint, length, limit);
            let finding = oversize_finding(length, limit);
            metrics::record_finding(&finding.kind);
            return assemble(fallback(&[finding]), submission, 0);
        }

        let analyzer = &self.state.analyzer;
        let report = analyzer.analyze(&submission.code);
        tracing::debug!(
            "Static analysis of {} produced {} finding(s), syntax_ok={}",
            fingerprint,
            report.findings.len(),
            report.syntax_ok
        );

        let findings = rank_findings(
            report.findings,
            &analyzer.catalog().severity_table(),
            self.state.config.max_findings,
        );
        for finding in &findings {
            metrics::record_finding(&finding.kind);
        }

        let plan = HintPlan::new(submission.capabilities(), submission.hint_depth);
        let focus = HintFocus::from_findings(&findings, analyzer.catalog());
        let composer = FeedbackComposer::new(
            self.state.provider.as_deref(),
            self.state.config.provider.timeout,
        );
        let provisional = composer
            .compose(&CompositionInput {
                submission,
                findings: &findings,
                plan: &plan,
                focus: &focus,
                static_complexity: report.complexity.as_ref(),
            })
            .await;

        let result = assemble(provisional, submission, plan.len());
        tracing::info!(
            "Submission {} analyzed: findings={}, hints={}, solution={}",
            fingerprint,
            result.error_clusters.len(),
            result.hints.len(),
            result.full_solution.is_some()
        );
        result
    }
}

fn no_code_result() -> AnalysisResult {
    AnalysisResult {
        summary: NO_CODE_SUMMARY.to_string(),
        error_clusters: Vec::new(),
        hints: Vec::new(),
        full_solution: None,
        key_concepts: vec![
            "Code entry point".to_string(),
            "Begin by writing one valid statement".to_string(),
        ],
        complexity: None,
        best_practices: vec!["Start with small, runnable snippets.".to_string()],
    }
}

/// Short, stable identifier for a submission in logs.
pub fn fingerprint(code: &str) -> String {
    let digest = Sha256::digest(code.as_bytes());
    hex::encode(&digest[..6])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::HelpMode;
    use crate::services::analyzer::INPUT_TOO_LARGE;
    use crate::services::provider::{FeedbackProvider, ProviderError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl FeedbackProvider for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn generate(&self, _prompt: &str) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(r#"{"summary": "Looks fine."}"#.to_string())
        }
    }

    #[test]
    fn fingerprint_is_short_and_stable() {
        assert_eq!(fingerprint("x = 1"), fingerprint("x = 1"));
        assert_ne!(fingerprint("x = 1"), fingerprint("x = 2"));
        assert_eq!(fingerprint("x = 1").len(), 12);
    }

    #[tokio::test]
    async fn blank_code_gets_friendly_message() {
        let state = AppState::new(Config::default());
        let submission = CodeSubmission::new("   \n", HelpMode::Guided);

        let result = AnalysisService::new(&state).analyze(&submission).await;

        assert_eq!(result.summary, NO_CODE_SUMMARY);
        assert!(result.error_clusters.is_empty());
        assert_eq!(result.best_practices.len(), 1);
    }

    #[tokio::test]
    async fn static_only_analysis_without_provider() {
        let state = AppState::new(Config::default());
        let submission = CodeSubmission::new("def f(a=[]):\n    return a / 0\n", HelpMode::Guided)
            .with_hint_depth(3);

        let result = AnalysisService::new(&state).analyze(&submission).await;

        let kinds: Vec<&str> = result.error_clusters.iter().map(|f| f.kind.as_str()).collect();
        assert_eq!(kinds, vec!["ZeroDivisionError", "MutableDefaultArgument"]);
        assert!(result.hints.is_empty());
        assert_eq!(
            result.summary,
            "2 issues found: ZeroDivisionError, MutableDefaultArgument."
        );
    }

    #[tokio::test]
    async fn oversize_code_skips_analysis_and_provider() {
        let provider = Arc::new(Counting::default());
        let config = Config {
            max_code_chars: 10,
            ..Config::default()
        };
        let state = AppState::with_provider(config, Some(provider.clone()));
        let submission = CodeSubmission::new("total = 1 / 0\n", HelpMode::Guided).with_hint_depth(2);

        let result = AnalysisService::new(&state).analyze(&submission).await;

        assert_eq!(result.error_clusters.len(), 1);
        assert_eq!(result.error_clusters[0].kind, INPUT_TOO_LARGE);
        assert!(result.hints.is_empty());
        assert!(result.full_solution.is_none());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn provider_is_called_once_for_normal_code() {
        let provider = Arc::new(Counting::default());
        let state = AppState::with_provider(Config::default(), Some(provider.clone()));
        let submission = CodeSubmission::new("x = 1\nprint(x)\n", HelpMode::Guided);

        let result = AnalysisService::new(&state).analyze(&submission).await;

        assert_eq!(result.summary, "Looks fine.");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }
}

use crate::models::{AnalysisResult, CodeSubmission};
use crate::services::feedback_composer::count_summary;

/// Applies the mode's output rules to a provisional result. Every response
/// leaves through here, whatever path produced it.
pub fn assemble(mut result: AnalysisResult, submission: &CodeSubmission, max_hints: usize) -> AnalysisResult {
    let capabilities = submission.capabilities();

    if capabilities.emits_hints {
        result.hints.sort_by_key(|hint| hint.level);
        result.hints.truncate(max_hints);
    } else {
        result.hints.clear();
    }

    if !submission.wants_solution() {
        result.full_solution = None;
    }

    if !capabilities.emits_study_notes {
        result.key_concepts.clear();
        result.best_practices.clear();
    }

    if !submission.include_complexity {
        result.complexity = None;
    }

    if result.summary.trim().is_empty() {
        result.summary = count_summary(result.error_clusters.len());
    }

    result
}

use serde::{Deserialize, Serialize};
use validator::Validate;

pub const MIN_HINT_DEPTH: u8 = 1;
pub const MAX_HINT_DEPTH: u8 = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HelpMode {
    /// Tutoring flow: leveled hints plus an optional corrected version.
    #[default]
    Guided,
    /// Quick static report only.
    Diagnostic,
}

impl HelpMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            HelpMode::Guided => "guided",
            HelpMode::Diagnostic => "diagnostic",
        }
    }

    pub fn capabilities(&self) -> ModeCapabilities {
        match self {
            HelpMode::Guided => ModeCapabilities {
                emits_hints: true,
                emits_solution: true,
                emits_study_notes: true,
            },
            HelpMode::Diagnostic => ModeCapabilities {
                emits_hints: false,
                emits_solution: false,
                emits_study_notes: false,
            },
        }
    }
}

/// Which response fields a help mode is allowed to carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeCapabilities {
    pub emits_hints: bool,
    pub emits_solution: bool,
    /// `key_concepts` and `best_practices`.
    pub emits_study_notes: bool,
}

/// Wire shape of `POST /api/analyze`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AnalyzeRequest {
    pub code: String,
    #[serde(default)]
    pub help_mode: HelpMode,
    #[validate(range(min = 1, max = 3, message = "hint_depth must be between 1 and 3"))]
    pub hint_depth: Option<u8>,
    /// Older clients still send `hint_level`.
    #[validate(range(min = 1, max = 3, message = "hint_level must be between 1 and 3"))]
    pub hint_level: Option<u8>,
    #[serde(default)]
    pub include_complexity: bool,
    pub include_solution: Option<bool>,
}

impl AnalyzeRequest {
    pub fn effective_hint_depth(&self) -> u8 {
        self.hint_depth.or(self.hint_level).unwrap_or(MIN_HINT_DEPTH)
    }
}

/// One learner submission, fixed for the lifetime of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeSubmission {
    pub code: String,
    pub help_mode: HelpMode,
    pub hint_depth: u8,
    pub include_complexity: bool,
    pub include_solution: bool,
}

impl CodeSubmission {
    pub fn new(code: impl Into<String>, help_mode: HelpMode) -> Self {
        Self {
            code: code.into(),
            help_mode,
            hint_depth: MIN_HINT_DEPTH,
            include_complexity: false,
            include_solution: help_mode.capabilities().emits_solution,
        }
    }

    pub fn with_hint_depth(mut self, depth: u8) -> Self {
        self.hint_depth = depth.clamp(MIN_HINT_DEPTH, MAX_HINT_DEPTH);
        self
    }

    pub fn with_complexity(mut self, include: bool) -> Self {
        self.include_complexity = include;
        self
    }

    pub fn with_solution(mut self, include: bool) -> Self {
        self.include_solution = include && self.capabilities().emits_solution;
        self
    }

    pub fn capabilities(&self) -> ModeCapabilities {
        self.help_mode.capabilities()
    }

    pub fn wants_solution(&self) -> bool {
        self.include_solution && self.capabilities().emits_solution
    }

    pub fn char_count(&self) -> usize {
        self.code.chars().count()
    }
}

impl From<AnalyzeRequest> for CodeSubmission {
    fn from(req: AnalyzeRequest) -> Self {
        let depth = req.effective_hint_depth();
        let default_solution = req.help_mode.capabilities().emits_solution;
        CodeSubmission::new(req.code, req.help_mode)
            .with_hint_depth(depth)
            .with_complexity(req.include_complexity)
            .with_solution(req.include_solution.unwrap_or(default_solution))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> AnalyzeRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn hint_level_is_a_synonym_for_hint_depth() {
        let legacy = parse(json!({ "code": "x = 1", "hint_level": 3 }));
        let current = parse(json!({ "code": "x = 1", "hint_depth": 3 }));

        assert_eq!(
            CodeSubmission::from(legacy),
            CodeSubmission::from(current)
        );
    }

    #[test]
    fn hint_depth_wins_over_hint_level() {
        let req = parse(json!({ "code": "x", "hint_depth": 2, "hint_level": 3 }));
        assert_eq!(req.effective_hint_depth(), 2);
    }

    #[test]
    fn defaults_to_guided_depth_one() {
        let submission = CodeSubmission::from(parse(json!({ "code": "x = 1" })));
        assert_eq!(submission.help_mode, HelpMode::Guided);
        assert_eq!(submission.hint_depth, 1);
        assert!(!submission.include_complexity);
        assert!(submission.wants_solution());
    }

    #[test]
    fn explicit_opt_out_of_solution_is_honoured() {
        let submission = CodeSubmission::from(parse(
            json!({ "code": "x = 1", "include_solution": false }),
        ));
        assert!(!submission.wants_solution());
    }

    #[test]
    fn diagnostic_never_wants_solution() {
        let submission = CodeSubmission::from(parse(json!({
            "code": "x = 1",
            "help_mode": "diagnostic",
            "include_solution": true
        })));
        assert!(!submission.wants_solution());
        assert!(!submission.capabilities().emits_hints);
    }

    #[test]
    fn out_of_range_depth_fails_validation() {
        let req = parse(json!({ "code": "x", "hint_depth": 7 }));
        assert!(req.validate().is_err());

        let legacy = parse(json!({ "code": "x", "hint_level": 0 }));
        assert!(legacy.validate().is_err());
    }

    #[test]
    fn unknown_help_mode_is_rejected() {
        let result =
            serde_json::from_value::<AnalyzeRequest>(json!({ "code": "x", "help_mode": "teach" }));
        assert!(result.is_err());
    }

    #[test]
    fn char_count_uses_unicode_scalars() {
        let submission = CodeSubmission::new("print('héllo')", HelpMode::Diagnostic);
        assert_eq!(submission.char_count(), 14);
    }
}

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// One static-analysis observation about the submitted code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(rename = "type")]
    pub kind: String,
    /// 1-based source line.
    pub line: Option<usize>,
    pub snippet: Option<String>,
    pub why: String,
    pub severity: Severity,
}

impl Finding {
    pub fn new(kind: impl Into<String>, why: impl Into<String>, severity: Severity) -> Self {
        Self {
            kind: kind.into(),
            line: None,
            snippet: None,
            why: why.into(),
            severity,
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        let snippet = snippet.into();
        self.snippet = if snippet.trim().is_empty() {
            None
        } else {
            Some(snippet)
        };
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HintLevel {
    Beginner,
    Intermediate,
    NearSolution,
}

impl HintLevel {
    pub const ALL: [HintLevel; 3] = [
        HintLevel::Beginner,
        HintLevel::Intermediate,
        HintLevel::NearSolution,
    ];

    pub fn rank(&self) -> u8 {
        match self {
            HintLevel::Beginner => 1,
            HintLevel::Intermediate => 2,
            HintLevel::NearSolution => 3,
        }
    }

    pub fn from_rank(rank: u8) -> Option<Self> {
        match rank {
            1 => Some(HintLevel::Beginner),
            2 => Some(HintLevel::Intermediate),
            3 => Some(HintLevel::NearSolution),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HintLevel::Beginner => "beginner",
            HintLevel::Intermediate => "intermediate",
            HintLevel::NearSolution => "near_solution",
        }
    }

    /// Accepts the wire labels plus the numeric and loose spellings models
    /// tend to produce.
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "beginner" | "1" | "level_1" | "concept" => Some(HintLevel::Beginner),
            "intermediate" | "2" | "level_2" | "construct" => Some(HintLevel::Intermediate),
            "near_solution" | "nearsolution" | "advanced" | "3" | "level_3" | "approach" => {
                Some(HintLevel::NearSolution)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hint {
    pub level: HintLevel,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solution {
    /// `None` when the provider explained the fix without rewriting code.
    pub code: Option<String>,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Complexity {
    pub time: String,
    pub space: String,
}

/// Response root of `POST /api/analyze`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub summary: String,
    pub error_clusters: Vec<Finding>,
    pub hints: Vec<Hint>,
    pub full_solution: Option<Solution>,
    pub key_concepts: Vec<String>,
    pub complexity: Option<Complexity>,
    pub best_practices: Vec<String>,
}

pub mod feedback;
pub mod submission;

pub use feedback::{AnalysisResult, Complexity, Finding, Hint, HintLevel, Severity, Solution};
pub use submission::{AnalyzeRequest, CodeSubmission, HelpMode, ModeCapabilities};

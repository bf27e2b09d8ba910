use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::json;
use std::sync::Arc;
use validator::{Validate, ValidationErrors};

use crate::{
    extractors::AppJson,
    middlewares::trace::RequestTraceContext,
    models::{AnalysisResult, AnalyzeRequest, CodeSubmission},
    services::{analysis_service::AnalysisService, AppState},
};

#[derive(Debug)]
pub enum AnalyzeApiError {
    CodeTooLarge { limit: usize },
    Unprocessable(String),
}

impl AnalyzeApiError {
    fn unprocessable(message: impl Into<String>) -> Self {
        AnalyzeApiError::Unprocessable(message.into())
    }
}

impl IntoResponse for AnalyzeApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            AnalyzeApiError::CodeTooLarge { limit } => (
                StatusCode::BAD_REQUEST,
                format!("Code too large. Max allowed characters is {}.", limit),
            ),
            AnalyzeApiError::Unprocessable(message) => (StatusCode::UNPROCESSABLE_ENTITY, message),
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

/// POST /api/analyze
pub async fn analyze_code(
    State(state): State<Arc<AppState>>,
    Extension(trace): Extension<RequestTraceContext>,
    AppJson(req): AppJson<AnalyzeRequest>,
) -> Result<Json<AnalysisResult>, AnalyzeApiError> {
    req.validate()
        .map_err(|e| AnalyzeApiError::unprocessable(validation_detail(&e)))?;

    let limit = state.config.max_code_chars;
    let length = req.code.chars().count();
    if length > limit {
        tracing::info!(
            "Rejecting oversize submission: trace_id={}, chars={}, limit={}",
            trace.trace_id,
            length,
            limit
        );
        return Err(AnalyzeApiError::CodeTooLarge { limit });
    }

    let submission = CodeSubmission::from(req);
    let service = AnalysisService::new(&state);
    let result = service.analyze(&submission).await;

    tracing::debug!(
        "Analysis complete: trace_id={}, findings={}",
        trace.trace_id,
        result.error_clusters.len()
    );

    Ok(Json(result))
}

/// Field messages joined in a stable order.
fn validation_detail(errors: &ValidationErrors) -> String {
    let mut messages: Vec<String> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter()
                .map(|err| {
                    err.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("{} is invalid", field))
                })
                .collect::<Vec<_>>()
        })
        .collect();
    messages.sort();
    messages.join("; ")
}

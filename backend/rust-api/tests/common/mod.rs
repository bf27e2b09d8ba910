#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use python_feedback_api::{
    config::Config,
    create_router,
    services::{
        provider::{FeedbackProvider, ProviderError},
        AppState,
    },
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;
use tower::ServiceExt;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn test_config() -> Config {
    Config {
        allowed_origins: Vec::new(),
        metrics_auth: "scraper:secret".to_string(),
        ..Config::default()
    }
}

pub fn create_test_app(config: Config, provider: Option<Arc<dyn FeedbackProvider>>) -> Router {
    init_tracing();
    let app_state = Arc::new(AppState::with_provider(config, provider));
    create_router(app_state)
}

/// Replies with the same text every time and counts calls.
pub struct ScriptedProvider {
    reply: Result<String, ProviderError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn replying(reply: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(reply.into()),
            delay: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(error: ProviderError) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(error),
            delay: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn sleeping(delay: Duration, reply: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(reply.into()),
            delay: Some(delay),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedbackProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn generate(&self, _prompt: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply.clone()
    }
}

/// A well-formed reply carrying all three hint levels and a solution.
pub fn full_reply() -> String {
    serde_json::json!({
        "summary": "Your code has a problem worth looking at.",
        "hints": [
            {"level": "beginner", "text": "Think about which errors you actually expect here."},
            {"level": "intermediate", "text": "Catching every exception hides real bugs; name the one you expect."},
            {"level": "near_solution", "text": "Replace the bare handler with one for the specific error:\n```python\nexcept ValueError:\n    pass\n```"}
        ],
        "full_solution": {
            "code": "try:\n    x = int(s)\nexcept ValueError:\n    x = 0",
            "explanation": "Only the conversion error is handled."
        },
        "key_concepts": ["Exception handling"],
        "complexity": {"time": "O(1)", "space": "O(1)"},
        "best_practices": ["Catch specific exceptions."]
    })
    .to_string()
}

pub async fn post_analyze(app: &Router, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
    post_raw(app, body.to_string()).await
}

pub async fn post_raw(app: &Router, body: String) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/analyze")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

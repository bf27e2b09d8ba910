use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use url::Url;

use crate::config::ProviderConfig;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("feedback provider is not configured")]
    NotConfigured,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider returned status {0}")]
    Status(u16),
    #[error("provider rate limit reached")]
    RateLimited,
    #[error("provider did not answer within {0}s")]
    Timeout(u64),
    #[error("provider returned no text")]
    EmptyReply,
    #[error("malformed provider reply: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Metric label for this failure.
    pub fn outcome(&self) -> &'static str {
        match self {
            ProviderError::NotConfigured => "not_configured",
            ProviderError::Transport(_) => "transport_error",
            ProviderError::Status(_) => "bad_status",
            ProviderError::RateLimited => "rate_limited",
            ProviderError::Timeout(_) => "timeout",
            ProviderError::EmptyReply => "empty_reply",
            ProviderError::Malformed(_) => "malformed",
        }
    }
}

/// Something that turns a tutoring prompt into raw model text.
#[async_trait]
pub trait FeedbackProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError>;
}

/// Google Generative Language `generateContent` client.
pub struct GeminiProvider {
    client: reqwest::Client,
    endpoint: Url,
    api_key: String,
}

impl GeminiProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or(ProviderError::NotConfigured)?;

        let endpoint = Url::parse(&format!(
            "{}/models/{}:generateContent",
            config.base_url.trim_end_matches('/'),
            config.model
        ))
        .map_err(|e| ProviderError::Transport(format!("invalid provider URL: {}", e)))?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn request_body(prompt: &str) -> Value {
        json!({
            "contents": [
                {
                    "role": "user",
                    "parts": [{ "text": prompt }]
                }
            ],
            "generationConfig": {
                "temperature": 0.2,
                "topP": 0.95,
                "topK": 40
            }
        })
    }
}

#[async_trait]
impl FeedbackProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::request_body(prompt))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(0)
                } else {
                    ProviderError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited);
        }
        if !status.is_success() {
            return Err(ProviderError::Status(status.as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        candidate_text(&body).ok_or(ProviderError::EmptyReply)
    }
}

/// Concatenated text parts of the first candidate.
pub fn candidate_text(body: &Value) -> Option<String> {
    let parts = body
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;

    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();

    (!text.trim().is_empty()).then_some(text)
}

/// The configured provider, or `None` when feedback is static only.
pub fn from_config(config: &ProviderConfig) -> Option<std::sync::Arc<dyn FeedbackProvider>> {
    if !config.is_configured() {
        tracing::info!("No provider key configured; serving static feedback only");
        return None;
    }
    match GeminiProvider::new(config) {
        Ok(provider) => {
            tracing::info!(
                "Feedback provider ready: model={}, timeout={}s",
                config.model,
                config.timeout.as_secs()
            );
            Some(std::sync::Arc::new(provider))
        }
        Err(e) => {
            tracing::error!("Failed to build feedback provider: {}", e);
            None
        }
    }
}

/// Runs `generate` under an overall deadline.
pub async fn generate_within(
    provider: &dyn FeedbackProvider,
    prompt: &str,
    timeout: Duration,
) -> Result<String, ProviderError> {
    match tokio::time::timeout(timeout, provider.generate(prompt)).await {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(ProviderError::Timeout(_))) | Err(_) => Err(ProviderError::Timeout(timeout.as_secs())),
        Ok(Err(e)) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_key(key: Option<&str>) -> ProviderConfig {
        ProviderConfig {
            api_key: key.map(str::to_string),
            ..ProviderConfig::default()
        }
    }

    #[test]
    fn endpoint_uses_model_name() {
        let provider = GeminiProvider::new(&config_with_key(Some("k"))).unwrap();
        assert_eq!(
            provider.endpoint().as_str(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent"
        );
    }

    #[test]
    fn missing_key_is_not_configured() {
        assert!(matches!(
            GeminiProvider::new(&config_with_key(None)),
            Err(ProviderError::NotConfigured)
        ));
        assert!(from_config(&config_with_key(None)).is_none());
    }

    #[test]
    fn request_body_carries_generation_config() {
        let body = GeminiProvider::request_body("hello");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(body["generationConfig"]["topK"], 40);
    }

    #[test]
    fn candidate_text_joins_parts() {
        let body = json!({
            "candidates": [{ "content": { "parts": [{ "text": "{\"a\":" }, { "text": "1}" }] } }]
        });
        assert_eq!(candidate_text(&body).as_deref(), Some("{\"a\":1}"));
        assert_eq!(candidate_text(&json!({ "candidates": [] })), None);
    }

    struct Slow;

    #[async_trait]
    impl FeedbackProvider for Slow {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn generate(&self, _prompt: &str) -> Result<String, ProviderError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".to_string())
        }
    }

    #[tokio::test]
    async fn deadline_turns_into_timeout() {
        let result = generate_within(&Slow, "p", Duration::from_millis(20)).await;
        assert!(matches!(result, Err(ProviderError::Timeout(_))));
    }
}

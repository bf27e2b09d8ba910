use std::sync::Arc;

use crate::config::Config;
use analyzer::{RuleCatalog, StaticAnalyzer};
use provider::FeedbackProvider;

pub struct AppState {
    pub config: Config,
    pub analyzer: StaticAnalyzer,
    pub provider: Option<Arc<dyn FeedbackProvider>>,
}

impl AppState {
    /// State with the provider described by `config`, if any.
    pub fn new(config: Config) -> Self {
        let provider = provider::from_config(&config.provider);
        Self::with_provider(config, provider)
    }

    pub fn with_provider(config: Config, provider: Option<Arc<dyn FeedbackProvider>>) -> Self {
        let catalog = RuleCatalog::standard().without(&config.disabled_rules);
        tracing::info!(
            "Rule catalog {} loaded with {} rule(s)",
            catalog.version(),
            catalog.rules().count()
        );
        let analyzer = StaticAnalyzer::new(catalog, config.max_code_chars);

        Self {
            config,
            analyzer,
            provider,
        }
    }

    pub fn provider_status(&self) -> &'static str {
        if self.provider.is_some() {
            "configured"
        } else {
            "disabled"
        }
    }
}

pub mod analysis_service;
pub mod analyzer;
pub mod assembler;
pub mod feedback_composer;
pub mod hint_planner;
pub mod provider;
pub mod ranker;
pub mod reply;

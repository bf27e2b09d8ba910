use std::{env, fmt, time::Duration};

const DEFAULT_MAX_CODE_CHARS: usize = 20_000;
const DEFAULT_MAX_FINDINGS: usize = 8;
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 20;
const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_PROVIDER_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000";
const API_KEY_PLACEHOLDER: &str = "PASTE_YOUR_GEMINI_API_KEY_HERE";

/// Process-wide settings. Built once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub max_code_chars: usize,
    pub max_findings: usize,
    /// Empty means any origin.
    pub allowed_origins: Vec<String>,
    pub disabled_rules: Vec<String>,
    /// `username:password` for the metrics endpoint.
    pub metrics_auth: String,
    pub provider: ProviderConfig,
}

#[derive(Clone)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ProviderConfig {
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_PROVIDER_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_PROVIDER_TIMEOUT_SECS),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            max_code_chars: DEFAULT_MAX_CODE_CHARS,
            max_findings: DEFAULT_MAX_FINDINGS,
            allowed_origins: split_list(DEFAULT_ALLOWED_ORIGINS),
            disabled_rules: Vec::new(),
            metrics_auth: "admin:changeme".to_string(),
            provider: ProviderConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Root .env first (repository layout), then the local one
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // config/*.toml + APP__ overrides
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        Self::from_settings(&settings)
    }

    /// Resolves every field from layered settings, falling back to the legacy
    /// flat environment variable names and then to defaults.
    pub fn from_settings(settings: &config::Config) -> Result<Self, config::ConfigError> {
        let defaults = Config::default();

        let bind_addr =
            lookup(settings, "server.bind_addr", "BIND_ADDR").unwrap_or(defaults.bind_addr);

        let max_code_chars = parse_number(
            lookup(settings, "analysis.max_code_chars", "MAX_CODE_CHARS"),
            "MAX_CODE_CHARS",
            defaults.max_code_chars,
        )?;
        if max_code_chars == 0 {
            return Err(config::ConfigError::Message(
                "MAX_CODE_CHARS must be greater than zero".to_string(),
            ));
        }

        let max_findings = parse_number(
            lookup(settings, "analysis.max_findings", "MAX_FINDINGS"),
            "MAX_FINDINGS",
            defaults.max_findings,
        )?
        .max(1);

        let allowed_origins = lookup_present(settings, "server.allowed_origins", "ALLOWED_ORIGINS")
            .map(|raw| parse_origins(&raw))
            .unwrap_or(defaults.allowed_origins);

        let disabled_rules = lookup(settings, "analysis.disabled_rules", "DISABLED_RULES")
            .map(|raw| split_list(&raw))
            .unwrap_or_default();

        let metrics_auth =
            lookup(settings, "metrics.auth", "METRICS_AUTH").unwrap_or(defaults.metrics_auth);

        let api_key = lookup(settings, "provider.api_key", "GEMINI_API_KEY")
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty() && key != API_KEY_PLACEHOLDER);
        if api_key.is_none() {
            tracing::warn!("GEMINI_API_KEY not set; feedback will be static-only");
        }

        let model = lookup(settings, "provider.model", "GEMINI_MODEL")
            .unwrap_or(defaults.provider.model);
        let base_url = lookup(settings, "provider.base_url", "GEMINI_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.provider.base_url);
        let timeout_secs = parse_number(
            lookup(settings, "provider.timeout_seconds", "GEMINI_TIMEOUT_SECONDS"),
            "GEMINI_TIMEOUT_SECONDS",
            DEFAULT_PROVIDER_TIMEOUT_SECS,
        )?;

        Ok(Config {
            bind_addr,
            max_code_chars,
            max_findings,
            allowed_origins,
            disabled_rules,
            metrics_auth,
            provider: ProviderConfig {
                api_key,
                model,
                base_url,
                timeout: Duration::from_secs(timeout_secs.max(1)),
            },
        })
    }
}

fn lookup(settings: &config::Config, key: &str, env_key: &str) -> Option<String> {
    lookup_present(settings, key, env_key).filter(|value| !value.trim().is_empty())
}

/// Like `lookup`, but an explicitly empty value is kept.
fn lookup_present(settings: &config::Config, key: &str, env_key: &str) -> Option<String> {
    settings.get_string(key).or_else(|_| env::var(env_key)).ok()
}

/// Empty or `*` means any origin.
fn parse_origins(raw: &str) -> Vec<String> {
    let origins = split_list(raw);
    if origins.iter().any(|origin| origin == "*") {
        Vec::new()
    } else {
        origins
    }
}

fn parse_number<T>(raw: Option<String>, name: &str, default: T) -> Result<T, config::ConfigError>
where
    T: std::str::FromStr,
{
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse::<T>().map_err(|_| {
            config::ConfigError::Message(format!("{} must be a number, got '{}'", name, value))
        }),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(|item| item.to_string())
        .collect()
}

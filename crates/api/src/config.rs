//! Application configuration

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Default persona for the automated responder
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful customer service representative. You should:

1. Be friendly, professional, and helpful
2. Answer questions about products based on the information provided
3. If you don't know something specific, politely say so and offer to connect them with a human agent
4. Keep responses concise but informative
5. Use a conversational tone that feels natural
6. If asked about shipping, returns, or policies, provide general helpful guidance but suggest contacting support for specifics";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,
    pub public_url: String,
    pub cors_allowed_origins: Vec<String>,

    // Database (in-memory store when unset)
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    // Reply generation
    pub reply: ReplyConfig,

    // Typing simulation
    pub typing: TypingConfig,
}

/// Upstream reply generator settings
#[derive(Debug, Clone)]
pub struct ReplyConfig {
    /// Base URL of an OpenAI-compatible API
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
    pub system_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Trailing messages sent as context
    pub history_window: usize,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4".to_string(),
            timeout: Duration::from_secs(30),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_tokens: 300,
            temperature: 0.7,
            history_window: 10,
        }
    }
}

/// Render-delay pacing for automated replies
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TypingConfig {
    pub base_wpm: f64,
    pub wpm_jitter: f64,
    pub base_delay_ms: u64,
    pub min_delay_ms: u64,
}

impl Default for TypingConfig {
    fn default() -> Self {
        Self {
            base_wpm: 120.0,
            wpm_jitter: 10.0,
            base_delay_ms: 500,
            min_delay_ms: 800,
        }
    }
}

impl TypingConfig {
    /// Both rates must be finite, with `base_wpm - wpm_jitter > 0`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.base_wpm.is_finite() || !self.wpm_jitter.is_finite() {
            return Err(ConfigError::Invalid(
                "TYPING_BASE_WPM and TYPING_WPM_JITTER must be finite numbers",
            ));
        }
        if self.base_wpm - self.wpm_jitter <= 0.0 || self.wpm_jitter < 0.0 {
            return Err(ConfigError::Invalid(
                "TYPING_BASE_WPM must exceed TYPING_WPM_JITTER and jitter must be non-negative",
            ));
        }
        Ok(())
    }
}

/// Read an env var, falling back to `default` when unset or unparsable
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let reply_defaults = ReplyConfig::default();
        let typing_defaults = TypingConfig::default();

        let typing = TypingConfig {
            base_wpm: env_or("TYPING_BASE_WPM", typing_defaults.base_wpm),
            wpm_jitter: env_or("TYPING_WPM_JITTER", typing_defaults.wpm_jitter),
            base_delay_ms: env_or("TYPING_BASE_DELAY_MS", typing_defaults.base_delay_ms),
            min_delay_ms: env_or("TYPING_MIN_DELAY_MS", typing_defaults.min_delay_ms),
        };
        typing.validate()?;

        let history_window = env_or("REPLY_HISTORY_WINDOW", reply_defaults.history_window);
        if history_window == 0 {
            return Err(ConfigError::Invalid("REPLY_HISTORY_WINDOW must be at least 1"));
        }

        Ok(Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            public_url: env::var("PUBLIC_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),

            // Database
            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            database_max_connections: env_or("DATABASE_MAX_CONNECTIONS", 5),

            // Reply generation
            reply: ReplyConfig {
                api_url: env::var("REPLY_API_URL")
                    .map(|v| v.trim_end_matches('/').to_string())
                    .unwrap_or(reply_defaults.api_url),
                api_key: env::var("REPLY_API_KEY").ok().filter(|v| !v.is_empty()),
                model: env::var("REPLY_MODEL").unwrap_or(reply_defaults.model),
                timeout: Duration::from_millis(env_or("REPLY_TIMEOUT_MS", 30_000)),
                system_prompt: env::var("REPLY_SYSTEM_PROMPT")
                    .ok()
                    .filter(|v| !v.trim().is_empty())
                    .unwrap_or(reply_defaults.system_prompt),
                max_tokens: env_or("REPLY_MAX_TOKENS", reply_defaults.max_tokens),
                temperature: env_or("REPLY_TEMPERATURE", reply_defaults.temperature),
                history_window,
            },

            typing,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

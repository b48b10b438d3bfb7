// src/config.rs
// Runtime configuration, loaded once from the environment (.env supported).

use std::str::FromStr;

use once_cell::sync::Lazy;

pub static CONFIG: Lazy<FeedpilotConfig> = Lazy::new(FeedpilotConfig::from_env);

#[derive(Debug, Clone)]
pub struct FeedpilotConfig {
    // ── Filter endpoint
    pub filter_base_url: String,
    pub filter_api_key: String,
    pub filter_model: String,

    // ── Timeouts
    /// Per-request HTTP timeout on the filter client.
    pub request_timeout_secs: u64,
    /// Overall bound on one classification; expiry fails open to pass.
    pub filter_timeout_secs: u64,

    // ── Presentation
    pub debug_default: bool,
}

impl FeedpilotConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            filter_base_url: env_or(
                "FEEDPILOT_FILTER_BASE_URL",
                "https://generativelanguage.googleapis.com/v1beta",
            ),
            filter_api_key: env_or("FEEDPILOT_FILTER_API_KEY", ""),
            filter_model: env_or("FEEDPILOT_FILTER_MODEL", "gemini-2.0-flash"),
            request_timeout_secs: env_parse("FEEDPILOT_REQUEST_TIMEOUT_SECS", 30),
            filter_timeout_secs: env_parse("FEEDPILOT_FILTER_TIMEOUT_SECS", 45),
            debug_default: env_parse("FEEDPILOT_DEBUG_DEFAULT", false),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

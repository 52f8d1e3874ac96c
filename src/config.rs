use std::env;

use crate::error::ConfigError;

pub const API_KEY_VAR: &str = "OPENAI_API_KEY";

const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant who keeps your response short and to the point.";
const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MODEL_FILTER: &str = "gpt";
const DEFAULT_AUGMENT_LINKS: bool = true;
const DEFAULT_AUGMENT_MAX_CHARS: usize = 8000;

const DEFAULT_MODE_TOGGLE: &str = "~!";
const DEFAULT_CLEAR_HISTORY: &str = "!CLEAR";
const DEFAULT_QUIT: &str = "quit";
const DEFAULT_END: &str = "end";

/// Reserved input lines that steer the REPL instead of reaching the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentinels {
    /// Compared exactly.
    pub mode_toggle: String,
    pub clear_history: String,
    pub quit: String,
    pub end: String,
}

impl Default for Sentinels {
    fn default() -> Self {
        Self {
            mode_toggle: DEFAULT_MODE_TOGGLE.to_string(),
            clear_history: DEFAULT_CLEAR_HISTORY.to_string(),
            quit: DEFAULT_QUIT.to_string(),
            end: DEFAULT_END.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub api_base_url: String,
    pub model: Option<String>,
    pub system_prompt: String,
    pub model_timeout_secs: u64,
    pub model_filter: String,
    pub augment_links: bool,
    pub augment_max_chars: usize,
    pub sentinels: Sentinels,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with(|key| env::var(key).ok())
    }

    fn from_env_with(
        mut get_var: impl FnMut(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let api_key = get_var(API_KEY_VAR)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or(ConfigError::MissingCredential { var: API_KEY_VAR })?;

        let api_base_url = get_var("OPENAI_BASE_URL")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        let model = get_var("MODEL")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        let model_timeout_secs = parse_positive_u64(
            get_var("MODEL_TIMEOUT_SECS").as_deref(),
            DEFAULT_MODEL_TIMEOUT_SECS,
        );
        let augment_max_chars = parse_positive_u64(
            get_var("AUGMENT_MAX_CHARS").as_deref(),
            DEFAULT_AUGMENT_MAX_CHARS as u64,
        ) as usize;

        Ok(Self {
            api_key,
            api_base_url,
            model,
            system_prompt: get_var("SYSTEM_PROMPT")
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            model_timeout_secs,
            model_filter: get_var("MODEL_FILTER")
                .map(|value| value.trim().to_string())
                .unwrap_or_else(|| DEFAULT_MODEL_FILTER.to_string()),
            augment_links: parse_bool(get_var("AUGMENT_LINKS").as_deref(), DEFAULT_AUGMENT_LINKS),
            augment_max_chars,
            sentinels: Sentinels::default(),
        })
    }
}

fn parse_positive_u64(raw: Option<&str>, default: u64) -> u64 {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn parse_bool(raw: Option<&str>, default: bool) -> bool {
    match raw.map(str::trim).map(str::to_ascii_lowercase).as_deref() {
        Some("1" | "true" | "yes" | "on") => true,
        Some("0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

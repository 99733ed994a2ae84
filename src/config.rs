use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use std::{env, fs};

use crate::chat::DEFAULT_HISTORY_TURNS;

/// Simulated latency of the mock adapter, matching the original widget.
pub const DEFAULT_MOCK_DELAY_MS: u64 = 1200;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_HEALTH_INTERVAL_SECS: u64 = 30;

/// Interface language of the assistant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Language {
    #[default]
    PtBr,
    EnUs,
}

impl Language {
    /// BCP 47 code sent upstream in the request payload.
    pub fn code(self) -> &'static str {
        match self {
            Language::PtBr => "pt-BR",
            Language::EnUs => "en-US",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Language::PtBr => "Português",
            Language::EnUs => "English",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Language::PtBr => Language::EnUs,
            Language::EnUs => Language::PtBr,
        }
    }
}

impl FromStr for Language {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "pt-br" | "pt" | "portugues" | "português" => Ok(Language::PtBr),
            "en-us" | "en" | "english" => Ok(Language::EnUs),
            other => Err(anyhow::anyhow!("unknown language: {other}")),
        }
    }
}

impl TryFrom<String> for Language {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Language> for String {
    fn from(language: Language) -> Self {
        language.code().to_string()
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Application configuration, constructed once at startup and passed by
/// reference into the adapter and health clients.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the upstream inference service.
    pub upstream_base_url: Option<String>,

    /// API key forwarded as `x-api-key`.
    pub upstream_api_key: Option<String>,

    /// Forces the mock adapter even when the upstream is configured.
    pub force_mock: bool,

    /// Interface language at startup.
    pub language: Language,

    /// User turns kept when trimming history for the upstream context.
    pub history_turns: usize,

    /// Simulated latency of the mock adapter.
    pub mock_delay: Duration,

    /// Timeout applied to upstream requests.
    pub request_timeout: Duration,

    /// Interval between upstream health probes.
    pub health_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upstream_base_url: None,
            upstream_api_key: None,
            force_mock: false,
            language: Language::default(),
            history_turns: DEFAULT_HISTORY_TURNS,
            mock_delay: Duration::from_millis(DEFAULT_MOCK_DELAY_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            health_interval: Duration::from_secs(DEFAULT_HEALTH_INTERVAL_SECS),
        }
    }
}

/// On-disk configuration, all fields optional.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ConfigFile {
    upstream_base_url: Option<String>,
    upstream_api_key: Option<String>,
    force_mock: Option<bool>,
    language: Option<Language>,
    history_turns: Option<usize>,
    mock_delay_ms: Option<u64>,
    request_timeout_secs: Option<u64>,
    health_interval_secs: Option<u64>,
}

impl Config {
    /// Load configuration from the default config file, then the environment.
    pub fn load() -> Result<Self> {
        let mut config = match Self::default_config_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("stanley-chat").join("config.toml"))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let file: ConfigFile = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;

        let defaults = Self::default();
        Ok(Self {
            upstream_base_url: file.upstream_base_url,
            upstream_api_key: file.upstream_api_key,
            force_mock: file.force_mock.unwrap_or(false),
            language: file.language.unwrap_or_default(),
            history_turns: file.history_turns.unwrap_or(DEFAULT_HISTORY_TURNS),
            mock_delay: file
                .mock_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.mock_delay),
            request_timeout: file
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            health_interval: file
                .health_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.health_interval),
        })
    }

    /// Environment variables override file values.
    fn apply_env(&mut self) {
        if let Some(url) =
            read_env("STANLEY_SPACE_URL").or_else(|| read_env("HUGGING_FACE_SPACE_URL"))
        {
            self.upstream_base_url = Some(url);
        }
        if let Some(key) = read_env("HUGGING_FACE_API_KEY") {
            self.upstream_api_key = Some(key);
        }
        if let Some(flag) = read_env("ASSISTANT_USE_MOCK") {
            self.force_mock = parse_flag(&flag);
        }
        if let Some(lang) = read_env("STANLEY_LANG") {
            if let Ok(language) = lang.parse() {
                self.language = language;
            }
        }
    }

    /// Whether requests go to the mock path. An unset upstream URL or key
    /// forces mock; the explicit flag forces mock regardless of either.
    pub fn use_mock_adapter(&self) -> bool {
        self.force_mock || self.upstream_base_url.is_none() || self.upstream_api_key.is_none()
    }

    /// Resolved streaming chat endpoint, when an upstream is configured.
    pub fn chat_endpoint(&self) -> Option<String> {
        self.upstream_base_url.as_deref().map(resolve_chat_endpoint)
    }

    /// Resolved health endpoint, when an upstream is configured.
    pub fn health_endpoint(&self) -> Option<String> {
        self.upstream_base_url
            .as_deref()
            .map(resolve_health_endpoint)
    }
}

fn read_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_lowercase().as_str(),
        "false" | "0" | "no" | "off"
    )
}

/// Append `/chat/stream` to the base URL unless it already points there.
pub fn resolve_chat_endpoint(base_url: &str) -> String {
    let trimmed = base_url.trim();
    if trimmed.ends_with("/chat/stream") {
        return trimmed.to_string();
    }
    format!("{}/chat/stream", trimmed.trim_end_matches('/'))
}

/// Derive the health endpoint from the base URL, replacing a trailing
/// `/chat` or `/chat/stream` segment when present.
pub fn resolve_health_endpoint(base_url: &str) -> String {
    let trimmed = base_url.trim();
    if trimmed.ends_with("/health") {
        return trimmed.to_string();
    }
    if let Some(prefix) = trimmed.strip_suffix("/chat/stream") {
        return format!("{prefix}/health");
    }
    if let Some(prefix) = trimmed.strip_suffix("/chat") {
        return format!("{prefix}/health");
    }
    format!("{}/health", trimmed.trim_end_matches('/'))
}

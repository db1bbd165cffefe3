use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AgentError;

// ─── Providers ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Claude,
    Gemini,
    #[serde(rename = "openai")]
    OpenAi,
}

impl ProviderKind {
    pub fn all() -> [ProviderKind; 3] {
        [ProviderKind::Claude, ProviderKind::Gemini, ProviderKind::OpenAi]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Claude => "claude",
            ProviderKind::Gemini => "gemini",
            ProviderKind::OpenAi => "openai",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "claude" | "anthropic" => Ok(ProviderKind::Claude),
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            "openai" | "gpt" => Ok(ProviderKind::OpenAi),
            _ => Err(AgentError::UnknownProvider(s.to_string())),
        }
    }
}

/// Connection settings for one HTTP provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub base_url: Option<String>,
}

impl ProviderSettings {
    /// Read the API key at call time so a missing key only fails the calls that need it.
    pub(crate) fn api_key(&self, provider: ProviderKind) -> Result<String, AgentError> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AgentError::MissingCredentials {
                provider,
                env: self.api_key_env.clone(),
            })
    }

    pub(crate) fn base_url_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.base_url
            .as_deref()
            .unwrap_or(default)
            .trim_end_matches('/')
    }
}

// ─── Requests and replies ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub prompt: String,
    pub system: Option<String>,
    pub max_tokens: u32,
    /// Fraction of `max_tokens` the provider may spend on reasoning.
    pub thinking_budget: Option<f64>,
    /// JSON schema the reply must follow. `None` asks for free text.
    pub schema: Option<Value>,
    /// Label used in retry log lines.
    pub context: String,
}

impl Request {
    pub fn new(prompt: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            max_tokens: 5000,
            thinking_budget: None,
            schema: None,
            context: context.into(),
        }
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn thinking(mut self, budget: f64) -> Self {
        self.thinking_budget = Some(budget);
        self
    }

    pub fn schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Reasoning tokens derived from the budget fraction, clamped below `max_tokens`.
    pub fn thinking_tokens(&self) -> Option<u32> {
        let budget = self.thinking_budget?;
        if !(budget > 0.0 && budget < 1.0) {
            return None;
        }
        let tokens = (self.max_tokens as f64 * budget).floor() as u32;
        (tokens > 0 && tokens < self.max_tokens).then_some(tokens)
    }
}

/// What a provider sent back: the answer text plus any reasoning it exposed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub text: String,
    pub rationale: String,
}

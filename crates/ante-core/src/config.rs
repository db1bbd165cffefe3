use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Provider names accepted in `default_provider` and stored on runs.
pub const KNOWN_PROVIDERS: &[&str] = &["claude", "gemini", "openai"];

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ProviderConfig
// ---------------------------------------------------------------------------

/// Connection settings for one remote decision provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_claude")]
    pub claude: ProviderConfig,
    #[serde(default = "default_gemini")]
    pub gemini: ProviderConfig,
    #[serde(default = "default_openai")]
    pub openai: ProviderConfig,
}

fn default_claude() -> ProviderConfig {
    ProviderConfig {
        model: "claude-sonnet-4-5-20250929".to_string(),
        api_key_env: "ANTHROPIC_API_KEY".to_string(),
        base_url: None,
    }
}

fn default_gemini() -> ProviderConfig {
    ProviderConfig {
        model: "gemini-3-flash-preview".to_string(),
        api_key_env: "GEMINI_API_KEY".to_string(),
        base_url: None,
    }
}

fn default_openai() -> ProviderConfig {
    ProviderConfig {
        model: "gpt-5.2-2025-12-11".to_string(),
        api_key_env: "OPENAI_API_KEY".to_string(),
        base_url: None,
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            claude: default_claude(),
            gemini: default_gemini(),
            openai: default_openai(),
        }
    }
}

// ---------------------------------------------------------------------------
// RetryConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    /// Seconds to wait after the 1st, 2nd, ... failure.
    #[serde(default = "default_backoff")]
    pub backoff_secs: Vec<u64>,
}

fn default_attempts() -> u32 {
    3
}

fn default_backoff() -> Vec<u64> {
    vec![10, 30]
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            backoff_secs: default_backoff(),
        }
    }
}

// ---------------------------------------------------------------------------
// TurnConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnConfig {
    /// Number of prior turns included in the context window.
    #[serde(default = "default_context_turns")]
    pub context_turns: usize,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Share of `max_tokens` reserved for reasoning, in `(0, 1)`.
    #[serde(default = "default_thinking_budget")]
    pub thinking_budget: f64,
}

fn default_context_turns() -> usize {
    3
}

fn default_max_tokens() -> u32 {
    5000
}

fn default_thinking_budget() -> f64 {
    0.95
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            context_turns: default_context_turns(),
            max_tokens: default_max_tokens(),
            thinking_budget: default_thinking_budget(),
        }
    }
}

// ---------------------------------------------------------------------------
// AnalysisConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Analyze newly observed objects before each turn and after each run.
    #[serde(default)]
    pub enabled: bool,
    /// Maximum concurrent analysis calls.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Synthesize a game plan from past reflections when a run starts.
    #[serde(default)]
    pub plan_from_reflections: bool,
}

fn default_workers() -> usize {
    4
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            workers: default_workers(),
            plan_from_reflections: false,
        }
    }
}

// ---------------------------------------------------------------------------
// GameConfig
// ---------------------------------------------------------------------------

/// The external game process launched by `/game/start`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    #[serde(default = "default_game_command")]
    pub command: String,
    #[serde(default = "default_game_args")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    /// Where the game reads its save file; snapshots are restored here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_path: Option<PathBuf>,
    /// Screenshot the game writes after each state; captured per turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<PathBuf>,
    /// Launch the game when a terminal state starts a fresh run.
    #[serde(default)]
    pub autostart: bool,
}

fn default_game_command() -> String {
    "love".to_string()
}

fn default_game_args() -> Vec<String> {
    vec![".".to_string()]
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            command: default_game_command(),
            args: default_game_args(),
            cwd: None,
            save_path: None,
            screenshot_path: None,
            autostart: false,
        }
    }
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    7777
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_provider")]
    pub default_provider: String,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub turn: TurnConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub game: GameConfig,
    #[serde(default)]
    pub server: ServerConfig,
    /// Fixed strategy text placed at the head of every turn prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("ante.redb")
}

fn default_provider() -> String {
    "gemini".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            default_provider: default_provider(),
            providers: ProvidersConfig::default(),
            retry: RetryConfig::default(),
            turn: TurnConfig::default(),
            analysis: AnalysisConfig::default(),
            game: GameConfig::default(),
            server: ServerConfig::default(),
            strategy: None,
        }
    }
}

impl Config {
    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if !KNOWN_PROVIDERS.contains(&self.default_provider.to_lowercase().as_str()) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "unknown default_provider '{}': must be one of {}",
                    self.default_provider,
                    KNOWN_PROVIDERS.join(", ")
                ),
            });
        }

        if self.retry.attempts == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "retry.attempts must be at least 1".to_string(),
            });
        } else if (self.retry.backoff_secs.len() as u32) < self.retry.attempts - 1 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "retry.backoff_secs has {} entries for {} attempts; the last delay is reused",
                    self.retry.backoff_secs.len(),
                    self.retry.attempts
                ),
            });
        }

        if !(self.turn.thinking_budget > 0.0 && self.turn.thinking_budget < 1.0) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "turn.thinking_budget must be between 0 and 1, got {}",
                    self.turn.thinking_budget
                ),
            });
        }

        if self.analysis.workers == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "analysis.workers must be at least 1".to_string(),
            });
        }

        warnings
    }
}

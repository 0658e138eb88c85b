use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{OrbitError, Result};

/// Telegram rejects messages above 4096 characters; 4000 leaves headroom.
pub const DEFAULT_CHUNK_MAX: usize = 4000;
/// Destinations containing this marker were never filled in and are skipped.
pub const PLACEHOLDER_MARKER: &str = "REPLACE";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Top-level config (orbit.toml + ORBIT_* env overrides + TELEGRAM_TOKEN / GEMINI_KEYS).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrbitConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub roll: RollConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Chat IDs (numeric, channels usually start with -100) or `@channel` usernames.
    #[serde(default, deserialize_with = "targets")]
    pub targets: Vec<String>,
    #[serde(default = "default_chunk_max")]
    pub chunk_max: usize,
    /// Pause between consecutive chunks of one message.
    #[serde(default = "default_chunk_gap_ms")]
    pub chunk_gap_ms: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            targets: Vec::new(),
            chunk_max: DEFAULT_CHUNK_MAX,
            chunk_gap_ms: default_chunk_gap_ms(),
        }
    }
}

/// Gemini credentials, model discovery and retry tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Accepts a TOML list or a comma-separated string (the `GEMINI_KEYS` format).
    #[serde(default, deserialize_with = "string_or_list")]
    pub api_keys: Vec<String>,
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
    /// Used when model discovery fails outright.
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_reresolve_pause_ms")]
    pub reresolve_pause_ms: u64,
    #[serde(default = "default_rotate_pause_ms")]
    pub rotate_pause_ms: u64,
    #[serde(default = "default_exhausted_pause_ms")]
    pub exhausted_pause_ms: u64,
    #[serde(default = "default_transient_pause_ms")]
    pub transient_pause_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            base_url: default_gemini_base_url(),
            default_model: default_model(),
            max_attempts: default_max_attempts(),
            reresolve_pause_ms: default_reresolve_pause_ms(),
            rotate_pause_ms: default_rotate_pause_ms(),
            exhausted_pause_ms: default_exhausted_pause_ms(),
            transient_pause_ms: default_transient_pause_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// When the second half of a mystery case is delivered.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RevealMode {
    /// Persist the reveal and deliver it at the start of the next run.
    #[default]
    Deferred,
    /// Deliver the reveal in the same run after a suspense pause.
    Immediate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub reveal: RevealMode,
    #[serde(default = "default_poll_pacing_ms")]
    pub poll_pacing_ms: u64,
    #[serde(default = "default_suspense_ms")]
    pub suspense_ms: u64,
    #[serde(default = "default_max_quiz_questions")]
    pub max_quiz_questions: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reveal: RevealMode::default(),
            poll_pacing_ms: default_poll_pacing_ms(),
            suspense_ms: default_suspense_ms(),
            max_quiz_questions: default_max_quiz_questions(),
        }
    }
}

/// Inclusive upper bounds of the draw ranges; the mystery case takes the rest up to 100.
///
/// Monotonic bounds keep the ranges disjoint and exhaustive over [1, 100].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RollConfig {
    #[serde(default = "default_silence_max")]
    pub silence_max: u8,
    #[serde(default = "default_fact_max")]
    pub fact_max: u8,
    #[serde(default = "default_quiz_max")]
    pub quiz_max: u8,
}

impl Default for RollConfig {
    fn default() -> Self {
        Self {
            silence_max: default_silence_max(),
            fact_max: default_fact_max(),
            quiz_max: default_quiz_max(),
        }
    }
}

impl RollConfig {
    pub fn validate(&self) -> Result<()> {
        if self.silence_max <= self.fact_max
            && self.fact_max <= self.quiz_max
            && self.quiz_max <= 100
        {
            Ok(())
        } else {
            Err(OrbitError::Config(format!(
                "roll bounds must satisfy silence_max <= fact_max <= quiz_max <= 100 (got {}/{}/{})",
                self.silence_max, self.fact_max, self.quiz_max
            )))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// JSON study profile written by the dashboard.
    #[serde(default = "default_profile_path")]
    pub profile: String,
    #[serde(default = "default_state_db")]
    pub state_db: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_path(),
            state_db: default_state_db(),
        }
    }
}

fn default_chunk_max() -> usize {
    DEFAULT_CHUNK_MAX
}
fn default_chunk_gap_ms() -> u64 {
    100
}
fn default_gemini_base_url() -> String {
    DEFAULT_GEMINI_BASE_URL.to_string()
}
fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_max_attempts() -> u32 {
    3
}
fn default_reresolve_pause_ms() -> u64 {
    1_000
}
fn default_rotate_pause_ms() -> u64 {
    2_000
}
fn default_exhausted_pause_ms() -> u64 {
    10_000
}
fn default_transient_pause_ms() -> u64 {
    1_000
}
fn default_request_timeout_secs() -> u64 {
    60
}
fn default_poll_pacing_ms() -> u64 {
    2_000
}
fn default_suspense_ms() -> u64 {
    10_000
}
fn default_max_quiz_questions() -> u32 {
    5
}
fn default_silence_max() -> u8 {
    50
}
fn default_fact_max() -> u8 {
    85
}
fn default_quiz_max() -> u8 {
    98
}
fn default_profile_path() -> String {
    "config.json".to_string()
}
fn default_state_db() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.orbit/orbit.db", home)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrList {
    List(Vec<String>),
    One(String),
}

fn string_or_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match StringOrList::deserialize(deserializer)? {
        StringOrList::List(items) => items,
        StringOrList::One(joined) => joined.split(',').map(str::to_string).collect(),
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TargetId {
    Numeric(i64),
    Text(String),
}

/// Env overrides parse `-100123` as an integer, so accept both shapes.
fn targets<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<TargetId>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|t| match t {
            TargetId::Numeric(n) => n.to_string(),
            TargetId::Text(s) => s,
        })
        .collect())
}

impl OrbitConfig {
    /// Load config from a TOML file with env var overrides.
    ///
    /// Precedence (last wins):
    ///   1. the TOML file (explicit path, else ~/.orbit/orbit.toml; a missing file is fine)
    ///   2. ORBIT_* variables, nested with `__` (e.g. ORBIT_ENGINE__REVEAL=immediate)
    ///   3. TELEGRAM_TOKEN and GEMINI_KEYS, the names the scheduled job exports
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);
        tracing::debug!(path = %path, "loading config");

        Self::from_figment(
            Figment::new()
                .merge(Toml::file(&path))
                .merge(Env::prefixed("ORBIT_").split("__"))
                .merge(
                    Env::raw()
                        .only(&["TELEGRAM_TOKEN", "GEMINI_KEYS"])
                        .map(|key| {
                            if key.as_str().eq_ignore_ascii_case("TELEGRAM_TOKEN") {
                                "telegram.bot_token".into()
                            } else {
                                "gemini.api_keys".into()
                            }
                        }),
                ),
        )
    }

    fn from_figment(figment: Figment) -> Result<Self> {
        let config: OrbitConfig = figment
            .extract()
            .map_err(|e| OrbitError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Structural checks. Secrets are checked separately by [`Self::require_secrets`].
    pub fn validate(&self) -> Result<()> {
        self.roll.validate()?;
        if self.telegram.chunk_max == 0 {
            return Err(OrbitError::Config("telegram.chunk_max must be > 0".into()));
        }
        if self.gemini.max_attempts == 0 {
            return Err(OrbitError::Config("gemini.max_attempts must be >= 1".into()));
        }
        if self.engine.max_quiz_questions == 0 {
            return Err(OrbitError::Config(
                "engine.max_quiz_questions must be >= 1".into(),
            ));
        }
        Ok(())
    }

    /// Fails when the run cannot possibly deliver anything.
    pub fn require_secrets(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            return Err(OrbitError::MissingSecret("TELEGRAM_TOKEN"));
        }
        if self.gemini.api_keys.iter().all(|k| k.trim().is_empty()) {
            return Err(OrbitError::MissingSecret("GEMINI_KEYS"));
        }
        Ok(())
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.orbit/orbit.toml", home)
}

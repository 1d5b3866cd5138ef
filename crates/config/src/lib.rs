//! Configuration loading, validation, and management for CompAgent.
//!
//! Loads configuration from `~/.compagent/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use compagent_core::UserType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.compagent/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Temperature for extraction calls
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Ordered fallback chain, tried after the default provider
    #[serde(default)]
    pub fallback: Vec<String>,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Compensation tables
    #[serde(default)]
    pub data: DataConfig,

    /// Candidate record storage
    #[serde(default)]
    pub store: StoreConfig,

    /// Turn pipeline and policy settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Users allowed to sign in to the gateway
    #[serde(default = "default_users")]
    pub users: Vec<UserConfig>,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_temperature() -> f32 {
    0.0
}
fn default_max_tokens() -> u32 {
    1024
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("fallback", &self.fallback)
            .field("providers", &self.providers)
            .field("data", &self.data)
            .field("store", &self.store)
            .field("agent", &self.agent)
            .field("gateway", &self.gateway)
            .field("users", &self.users)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

impl std::fmt::Debug for UserConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserConfig")
            .field("email", &self.email)
            .field("display_name", &self.display_name)
            .field("password_sha256", &"[REDACTED]")
            .field("user_type", &self.user_type)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Directory holding the two CSV tables
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_comp_ranges_file")]
    pub comp_ranges_file: String,

    #[serde(default = "default_employee_roster_file")]
    pub employee_roster_file: String,
}

fn default_data_dir() -> PathBuf {
    AppConfig::config_dir().join("data")
}
fn default_comp_ranges_file() -> String {
    "CompRanges.csv".into()
}
fn default_employee_roster_file() -> String {
    "EmployeeRoster.csv".into()
}

impl DataConfig {
    pub fn comp_ranges_path(&self) -> PathBuf {
        self.data_dir.join(&self.comp_ranges_file)
    }

    pub fn employee_roster_path(&self) -> PathBuf {
        self.data_dir.join(&self.employee_roster_file)
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            comp_ranges_file: default_comp_ranges_file(),
            employee_roster_file: default_employee_roster_file(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "file" or "memory"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// Where the file backend keeps its JSON files
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,

    /// Days of inactivity before a candidate record expires
    #[serde(default = "default_retention_days")]
    pub context_retention_days: u32,
}

fn default_store_backend() -> String {
    "file".into()
}
fn default_store_dir() -> PathBuf {
    AppConfig::config_dir().join("store")
}
fn default_retention_days() -> u32 {
    compagent_core::DEFAULT_RETENTION_DAYS
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            dir: default_store_dir(),
            context_retention_days: default_retention_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Run the validator stage after the engine
    #[serde(default = "default_true")]
    pub enable_validator: bool,

    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,

    #[serde(default = "default_lookup_timeout_secs")]
    pub lookup_timeout_secs: u64,

    /// Recent exchanges fed to the extractor prompt
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Minimum raise over current salary, in percent
    #[serde(default = "default_meaningful_increase_pct")]
    pub meaningful_increase_pct: f64,

    /// Ceiling on extra equity granted when a counter offer exceeds market max
    #[serde(default = "default_equity_boost_cap")]
    pub equity_boost_cap: f64,
}

fn default_true() -> bool {
    true
}
fn default_llm_timeout_secs() -> u64 {
    60
}
fn default_lookup_timeout_secs() -> u64 {
    10
}
fn default_history_window() -> usize {
    5
}
fn default_meaningful_increase_pct() -> f64 {
    10.0
}
fn default_equity_boost_cap() -> f64 {
    50_000.0
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            enable_validator: true,
            llm_timeout_secs: default_llm_timeout_secs(),
            lookup_timeout_secs: default_lookup_timeout_secs(),
            history_window: default_history_window(),
            meaningful_increase_pct: default_meaningful_increase_pct(),
            equity_boost_cap: default_equity_boost_cap(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Origin allowed by CORS; `None` allows any origin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_origin: Option<String>,

    /// Hours before a login token expires
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: u64,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_token_ttl_hours() -> u64 {
    24
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            allowed_origin: None,
            token_ttl_hours: default_token_ttl_hours(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub email: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Hex-encoded SHA-256 of the password
    pub password_sha256: String,

    pub user_type: UserType,
}

/// Demo accounts: three per team.
fn default_users() -> Vec<UserConfig> {
    const HASHES: [&str; 3] = [
        "103cbe2c1d2347b144b4efd851dd68b4867a99a977ccfc1614058c0e6cf69407",
        "ecb786002f5e99cfa37636707115595bf2f0dd5e1418da8852cf9f3962fd2f32",
        "c75f28325cfa028ea13872f977a29e0e87c99a4f390fe260f24d7e1f05fb8d75",
    ];
    let mut users = Vec::new();
    for (prefix, user_type) in [
        ("riot-comp-user", UserType::CompTeam),
        ("riot-rec-user", UserType::RecruitmentTeam),
    ] {
        for (i, hash) in HASHES.iter().enumerate() {
            users.push(UserConfig {
                email: format!("{prefix}{}@example.com", i + 1),
                display_name: Some(format!("User{}", i + 1)),
                password_sha256: (*hash).to_string(),
                user_type,
            });
        }
    }
    users
}

impl AppConfig {
    /// Load configuration from the default path (~/.compagent/config.toml).
    ///
    /// Also checks environment variables:
    /// - `COMPAGENT_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `COMPAGENT_PROVIDER`, `COMPAGENT_MODEL`
    /// - `COMPAGENT_DATA_DIR`
    pub fn load() -> Result<Self, ConfigError> {
        let config_dir = Self::config_dir();
        let config_path = config_dir.join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("COMPAGENT_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("COMPAGENT_PROVIDER") {
            config.default_provider = provider;
        }

        if let Ok(model) = std::env::var("COMPAGENT_MODEL") {
            config.default_model = model;
        }

        if let Ok(dir) = std::env::var("COMPAGENT_DATA_DIR") {
            config.data.data_dir = PathBuf::from(dir);
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".compagent")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.llm_timeout_secs == 0 || self.agent.lookup_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "agent timeouts must be greater than zero".into(),
            ));
        }

        if self.store.context_retention_days == 0 {
            return Err(ConfigError::ValidationError(
                "store.context_retention_days must be greater than zero".into(),
            ));
        }

        if self.agent.meaningful_increase_pct < 0.0 || self.agent.equity_boost_cap < 0.0 {
            return Err(ConfigError::ValidationError(
                "agent policy values must not be negative".into(),
            ));
        }

        if !matches!(self.store.backend.as_str(), "file" | "memory") {
            return Err(ConfigError::ValidationError(format!(
                "unknown store backend '{}' (expected file or memory)",
                self.store.backend
            )));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
            || self
                .providers
                .get(&self.default_provider)
                .is_some_and(|p| p.api_key.is_some())
    }

    /// Find a configured user by email (case-insensitive).
    pub fn user(&self, email: &str) -> Option<&UserConfig> {
        self.users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email.trim()))
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            fallback: vec!["gemini".into()],
            providers: HashMap::new(),
            data: DataConfig::default(),
            store: StoreConfig::default(),
            agent: AgentConfig::default(),
            gateway: GatewayConfig::default(),
            users: default_users(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

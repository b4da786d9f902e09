//! # Application Configuration
//!
//! This module defines the configuration structure for the `axiant-server` and the
//! `sync` CLI, and the logic for loading it from a `config.yml` file and environment
//! variables.

use axiant::{
    constants::{DEFAULT_DB_FILE, DEFAULT_TIMEOUT_SECS},
    prompts::{
        CLAIM_ANALYSIS_SYSTEM_PROMPT, CLAIM_ANALYSIS_USER_PROMPT, FACT_VERDICT_SYSTEM_PROMPT,
        FACT_VERDICT_USER_PROMPT,
    },
    providers::facts::FactSourcesConfig,
    types::ProviderConfig,
};
use config::{
    Config as ConfigBuilder, Environment, File, FileFormat, Value as ConfigValue,
    ValueKind as ConfigValueKind,
};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::time::Duration;
use tracing::{info, warn};

/// The task that backs the generative fallback of the provider chain.
pub const TASK_FACT_VERDICT: &str = "fact_verdict";
/// The task that classifies claims for `/api/analyze`.
pub const TASK_CLAIM_ANALYSIS: &str = "claim_analysis";

/// A custom error type for configuration issues.
#[derive(Debug)]
pub enum ConfigError {
    /// Indicates an error from the underlying `config` crate.
    General(String),
    /// Indicates a required configuration file was not found.
    NotFound(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::General(msg) => write!(f, "Configuration error: {msg}"),
            ConfigError::NotFound(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::General(err.to_string())
    }
}

/// The root configuration structure, mapping directly to `config.yml`.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// The port for the server to listen on. Loaded from `PORT` env var.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Path of the Embedded Store file, relative to the working directory.
    #[serde(default = "default_embedded_db_path")]
    pub embedded_db_path: String,
    /// The Durable Store. Without a URI the server runs embedded-only.
    #[serde(default)]
    pub durable: Option<DurableConfig>,
    /// HS256 secret for session tokens. Loaded from `JWT_SECRET` env var.
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    /// Bound, in seconds, on every outbound provider call.
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Whether the server reconciles both stores in the background at startup.
    #[serde(default = "default_true")]
    pub sync_on_startup: bool,
    /// API keys and endpoints of the fact/news services.
    #[serde(default)]
    pub fact_sources: FactSourcesConfig,
    /// A map of named, reusable AI provider configurations.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    /// A map of tasks, each specifying a provider and prompts.
    #[serde(default)]
    pub tasks: HashMap<String, TaskConfig>,
}

impl AppConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// The Durable Store settings, if a non-blank URI is configured.
    pub fn durable_store(&self) -> Option<&DurableConfig> {
        self.durable
            .as_ref()
            .filter(|d| d.uri.as_deref().is_some_and(|uri| !uri.trim().is_empty()))
    }
}

/// Connection settings of the Durable Store.
#[derive(Debug, Deserialize, Clone)]
pub struct DurableConfig {
    /// A `mongodb://` or `mongodb+srv://` connection string.
    #[serde(default)]
    pub uri: Option<String>,
    /// Used when the URI names no database.
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl DurableConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_port() -> u16 {
    3001
}

fn default_embedded_db_path() -> String {
    DEFAULT_DB_FILE.to_string()
}

fn default_jwt_secret() -> String {
    "super-secret-key-change-this".to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_true() -> bool {
    true
}

fn default_database() -> String {
    "axiant".to_string()
}

/// Defines the prompts and provider for a specific application task.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct TaskConfig {
    /// The key of the provider to use from the `providers` map.
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub user_prompt: Option<String>,
}

/// Constructs a `config::Value` map of the default, hardcoded tasks from the library.
/// This serves as the base layer of configuration.
fn build_default_tasks() -> HashMap<String, ConfigValue> {
    let tasks = vec![
        (
            TASK_FACT_VERDICT,
            (
                "default",
                FACT_VERDICT_SYSTEM_PROMPT,
                FACT_VERDICT_USER_PROMPT,
            ),
        ),
        (
            TASK_CLAIM_ANALYSIS,
            (
                "default",
                CLAIM_ANALYSIS_SYSTEM_PROMPT,
                CLAIM_ANALYSIS_USER_PROMPT,
            ),
        ),
    ];

    tasks
        .into_iter()
        .map(|(name, (provider, sys, user))| {
            let mut table = HashMap::new();
            table.insert("provider".to_string(), ConfigValue::from(provider));
            table.insert("system_prompt".to_string(), ConfigValue::from(sys));
            table.insert("user_prompt".to_string(), ConfigValue::from(user));
            (
                name.to_string(),
                ConfigValue::new(None, ConfigValueKind::Table(table)),
            )
        })
        .collect()
}

// Helper to read a file, substitute env vars, and return its content.
// Returns Ok(None) if the file does not exist, or an error if it fails to read.
fn read_and_substitute(path: &str) -> Result<Option<String>, ConfigError> {
    if !std::path::Path::new(path).exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path)
        .map_err(|e| ConfigError::General(format!("Failed to read config file '{path}': {e}")))?;

    let re = Regex::new(r"\$\{(?P<var>[A-Z0-9_]+)\}")
        .map_err(|e| ConfigError::General(e.to_string()))?;
    let expanded_content = re.replace_all(&content, |caps: &regex::Captures| {
        let var_name = &caps["var"];
        env::var(var_name).unwrap_or_default()
    });

    Ok(Some(expanded_content.to_string()))
}

/// Loads the application configuration from a file and environment variables.
///
/// - Top-level keys like `port` and `jwt_secret` are overridden by `PORT` and `JWT_SECRET`.
/// - Nested keys are overridden by `AXIANT_...` variables (e.g., `AXIANT_DURABLE__URI`).
pub fn get_config(config_path_override: Option<&str>) -> Result<AppConfig, ConfigError> {
    let base_path = env!("CARGO_MANIFEST_DIR");
    let mut builder = ConfigBuilder::builder()
        // Layer 1: Programmatic defaults from the library.
        .set_default("tasks", build_default_tasks())?;

    // Layer 2: Main Config (with Fallback)
    let main_config_path = if let Some(override_path) = config_path_override {
        override_path.to_string()
    } else {
        let user_config_path = format!("{base_path}/config.yml");
        if std::path::Path::new(&user_config_path).exists() {
            info!("Loading user-defined configuration from '{user_config_path}'.");
            user_config_path
        } else {
            let provider = env::var("AI_PROVIDER").unwrap_or_else(|_| "local".to_string());
            let fallback_path = format!("{base_path}/config.{provider}.yml");
            info!("'{user_config_path}' not found. Falling back to '{fallback_path}' based on AI_PROVIDER='{provider}'.");
            fallback_path
        }
    };

    let main_content = read_and_substitute(&main_config_path)?
        .ok_or_else(|| ConfigError::NotFound(format!("Main config file not found at '{main_config_path}'. Please ensure 'config.yml' exists or your AI_PROVIDER is set to load a valid template ('local' or 'gemini').")))?;
    builder = builder.add_source(File::from_str(&main_content, FileFormat::Yaml));

    let settings = builder
        // Layer 3: Load environment variables for top-level keys like PORT.
        .add_source(Environment::default())
        // Layer 4: Load prefixed environment variables for deeper overrides.
        .add_source(
            Environment::with_prefix("AXIANT")
                .prefix_separator("_")
                .try_parsing(true)
                .separator("__"),
        )
        .build()?;

    let mut config: AppConfig = settings.try_deserialize()?;
    if config.jwt_secret.trim().is_empty() {
        warn!("JWT_SECRET is not set; using the built-in development secret.");
        config.jwt_secret = default_jwt_secret();
    }
    Ok(config)
}

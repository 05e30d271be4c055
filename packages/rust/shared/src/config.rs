//! Application configuration for postforge.
//!
//! User config lives at `~/.postforge/postforge.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{PostforgeError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "postforge.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".postforge";

// ---------------------------------------------------------------------------
// Config structs (matching postforge.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Text-generation provider settings.
    #[serde(default)]
    pub provider: ProviderSection,

    /// Pipeline behaviour.
    #[serde(default)]
    pub pipeline: PipelineSection,

    /// Post parsing and validation.
    #[serde(default)]
    pub posts: PostsSection,

    /// Prompt template source.
    #[serde(default)]
    pub templates: TemplatesSection,

    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerSection,
}

/// `[provider]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSection {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL of the Generative Language API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used for plain generation.
    #[serde(default = "default_model")]
    pub model: String,

    /// Model used for search-grounded generation.
    #[serde(default = "default_search_model")]
    pub search_model: String,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// HTTP timeout for a single provider request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            model: default_model(),
            search_model: default_search_model(),
            temperature: default_temperature(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_api_key_env() -> String {
    "GOOGLE_API_KEY".into()
}
fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".into()
}
fn default_model() -> String {
    "gemini-2.5-flash".into()
}
fn default_search_model() -> String {
    "gemini-2.0-flash".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_request_timeout() -> u64 {
    60
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Research query patterns; each may reference `{field}`.
    #[serde(default = "default_research_queries")]
    pub research_queries: Vec<String>,

    /// Upper bound on any single capability call, in seconds.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            research_queries: default_research_queries(),
            call_timeout_secs: default_call_timeout(),
        }
    }
}

fn default_research_queries() -> Vec<String> {
    vec![
        "{field} industry trends statistics".into(),
        "{field} expert opinions thought leadership".into(),
        "{field} case studies success stories".into(),
    ]
}
fn default_call_timeout() -> u64 {
    90
}

/// `[posts]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostsSection {
    /// Post styles, in the order the generation prompt requests them.
    #[serde(default = "default_styles")]
    pub styles: Vec<String>,

    /// Minimum post length in characters.
    #[serde(default = "default_min_post_length")]
    pub min_post_length: usize,

    /// Maximum number of posts returned from one generation.
    #[serde(default = "default_max_posts")]
    pub max_posts: usize,

    /// Lower bound of the recommended word range.
    #[serde(default = "default_min_word_count")]
    pub min_word_count: usize,

    /// Upper bound of the recommended word range.
    #[serde(default = "default_max_word_count")]
    pub max_word_count: usize,
}

impl Default for PostsSection {
    fn default() -> Self {
        Self {
            styles: default_styles(),
            min_post_length: default_min_post_length(),
            max_posts: default_max_posts(),
            min_word_count: default_min_word_count(),
            max_word_count: default_max_word_count(),
        }
    }
}

fn default_styles() -> Vec<String> {
    vec![
        "Storytelling".into(),
        "Data-Driven".into(),
        "Thought Leadership".into(),
    ]
}
fn default_min_post_length() -> usize {
    50
}
fn default_max_posts() -> usize {
    3
}
fn default_min_word_count() -> usize {
    150
}
fn default_max_word_count() -> usize {
    300
}

/// `[templates]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplatesSection {
    /// Path to a TOML template collection. Built-in templates when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    /// Address/port for the HTTP listener.
    #[serde(default = "default_host")]
    pub host: String,

    /// Allowed CORS origins. Empty means any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            cors_origins: Vec::new(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0:8000".into()
}

impl AppConfig {
    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.posts.styles.is_empty() {
            return Err(PostforgeError::config("[posts] styles must not be empty"));
        }
        if self.posts.max_posts == 0 {
            return Err(PostforgeError::config("[posts] max_posts must be at least 1"));
        }
        if self.pipeline.research_queries.is_empty() {
            return Err(PostforgeError::config(
                "[pipeline] research_queries must not be empty",
            ));
        }
        if self.posts.min_word_count > self.posts.max_word_count {
            return Err(PostforgeError::config(
                "[posts] min_word_count exceeds max_word_count",
            ));
        }
        Url::parse(&self.provider.base_url).map_err(|e| {
            PostforgeError::config(format!(
                "[provider] base_url '{}' is not a valid URL: {e}",
                self.provider.base_url
            ))
        })?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Runtime configs (derived from AppConfig)
// ---------------------------------------------------------------------------

/// Runtime post-parsing configuration.
#[derive(Debug, Clone)]
pub struct PostConfig {
    pub styles: Vec<String>,
    pub min_post_length: usize,
    pub max_posts: usize,
    pub min_word_count: usize,
    pub max_word_count: usize,
}

impl Default for PostConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PostConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            styles: config.posts.styles.clone(),
            min_post_length: config.posts.min_post_length,
            max_posts: config.posts.max_posts,
            min_word_count: config.posts.min_word_count,
            max_word_count: config.posts.max_word_count,
        }
    }
}

/// Runtime pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Research query patterns, submitted concurrently.
    pub research_queries: Vec<String>,
    /// Upper bound on a single capability call.
    pub call_timeout: Duration,
    /// Parser and validation settings.
    pub posts: PostConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            research_queries: config.pipeline.research_queries.clone(),
            call_timeout: Duration::from_secs(config.pipeline.call_timeout_secs),
            posts: PostConfig::from(config),
        }
    }
}

/// Runtime provider configuration, with the API key resolved.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub search_model: String,
    pub temperature: f32,
    pub request_timeout: Duration,
}

impl ProviderConfig {
    /// Build from the app config, reading the API key from its env var.
    pub fn from_env(config: &AppConfig) -> Result<Self> {
        validate_api_key(config)?;
        let api_key = std::env::var(&config.provider.api_key_env).unwrap_or_default();
        Ok(Self::with_api_key(config, api_key))
    }

    /// Build from the app config with an explicit API key.
    pub fn with_api_key(config: &AppConfig, api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: config.provider.base_url.clone(),
            model: config.provider.model.clone(),
            search_model: config.provider.search_model.clone(),
            temperature: config.provider.temperature,
            request_timeout: Duration::from_secs(config.provider.request_timeout_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.postforge/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| PostforgeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.postforge/postforge.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PostforgeError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        PostforgeError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| PostforgeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| PostforgeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PostforgeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the provider API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    let var_name = &config.provider.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(()),
        _ => Err(PostforgeError::config(format!(
            "provider API key not found. Set the {var_name} environment variable."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("research_queries"));
        assert!(toml_str.contains("GOOGLE_API_KEY"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.pipeline.research_queries.len(), 3);
        assert_eq!(parsed.posts.min_post_length, 50);
        assert_eq!(parsed.provider.api_key_env, "GOOGLE_API_KEY");
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let toml_str = r#"
[posts]
styles = ["Story", "Numbers"]
max_posts = 2

[templates]
path = "/etc/postforge/prompts.toml"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.posts.styles, vec!["Story", "Numbers"]);
        assert_eq!(config.posts.min_post_length, 50);
        assert_eq!(config.pipeline.call_timeout_secs, 90);
        assert_eq!(
            config.templates.path.as_deref(),
            Some("/etc/postforge/prompts.toml")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn pipeline_config_from_app_config() {
        let app = AppConfig::default();
        let pipeline = PipelineConfig::from(&app);
        assert_eq!(pipeline.research_queries.len(), 3);
        assert_eq!(pipeline.call_timeout, Duration::from_secs(90));
        assert_eq!(pipeline.posts.max_posts, 3);
        assert_eq!(pipeline.posts.styles[1], "Data-Driven");
    }

    #[test]
    fn validate_rejects_empty_styles() {
        let mut config = AppConfig::default();
        config.posts.styles.clear();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("styles"));
    }

    #[test]
    fn validate_rejects_bad_base_url() {
        let mut config = AppConfig::default();
        config.provider.base_url = "not a url".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.provider.api_key_env = "PF_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }

    #[test]
    fn provider_config_with_explicit_key() {
        let app = AppConfig::default();
        let provider = ProviderConfig::with_api_key(&app, "test-key");
        assert_eq!(provider.api_key, "test-key");
        assert_eq!(provider.search_model, "gemini-2.0-flash");
        assert_eq!(provider.request_timeout, Duration::from_secs(60));
    }
}

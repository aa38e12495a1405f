//! Application configuration for ResearchFlow.
//!
//! User config lives at `~/.researchflow/researchflow.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ResearchFlowError, Result};
use crate::types::{Length, Tone};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "researchflow.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".researchflow";

// ---------------------------------------------------------------------------
// Config structs (matching researchflow.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Pipeline defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// OpenAI-compatible chat and embedding settings.
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Serper web search settings.
    #[serde(default)]
    pub serper: SerperConfig,

    /// Where run artifacts are written.
    #[serde(default)]
    pub output: OutputConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Default writing tone.
    #[serde(default)]
    pub tone: Tone,

    /// Default content length.
    #[serde(default)]
    pub length: Length,

    /// Number of web search results requested by the research stage.
    #[serde(default = "default_search_results")]
    pub search_results: usize,

    /// Number of chunks retrieved by the RAG stage.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            tone: Tone::default(),
            length: Length::default(),
            search_results: default_search_results(),
            top_k: default_top_k(),
        }
    }
}

fn default_search_results() -> usize {
    10
}
fn default_top_k() -> usize {
    5
}

/// `[openai]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,

    /// API base URL (anything speaking the OpenAI wire format).
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Chat model used by the writer and SEO stages.
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Embedding model used by the RAG stage.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Sampling temperature for chat completions.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_openai_key_env(),
            base_url: default_openai_base_url(),
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            temperature: default_temperature(),
        }
    }
}

fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_chat_model() -> String {
    "gpt-4o-mini".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_temperature() -> f32 {
    0.9
}

/// `[serper]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerperConfig {
    /// Name of the env var holding the API key.
    #[serde(default = "default_serper_key_env")]
    pub api_key_env: String,

    /// Serper API base URL.
    #[serde(default = "default_serper_base_url")]
    pub base_url: String,
}

impl Default for SerperConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_serper_key_env(),
            base_url: default_serper_base_url(),
        }
    }
}

fn default_serper_key_env() -> String {
    "SERPER_API_KEY".into()
}
fn default_serper_base_url() -> String {
    "https://google.serper.dev".into()
}

/// `[output]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory receiving the export and SEO artifacts.
    #[serde(default = "default_output_dir")]
    pub dir: String,

    /// File name of the downloadable result.
    #[serde(default = "default_export_file")]
    pub export_file: String,

    /// File name of the SEO stage's Markdown side artifact.
    #[serde(default = "default_seo_file")]
    pub seo_file: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            export_file: default_export_file(),
            seo_file: default_seo_file(),
        }
    }
}

fn default_output_dir() -> String {
    ".".into()
}
fn default_export_file() -> String {
    "researchflow_result.json".into()
}
fn default_seo_file() -> String {
    "Content.md".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.researchflow/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ResearchFlowError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.researchflow/researchflow.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| ResearchFlowError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        ResearchFlowError::config(format!("failed to parse {}: {e}", path.display()))
    })?;

    for (section, base) in [
        ("openai", &config.openai.base_url),
        ("serper", &config.serper.base_url),
    ] {
        url::Url::parse(base).map_err(|e| {
            ResearchFlowError::config(format!("[{section}] base_url '{base}' is invalid: {e}"))
        })?;
    }

    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ResearchFlowError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ResearchFlowError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ResearchFlowError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that every API key env var is set and non-empty.
pub fn validate_api_keys(config: &AppConfig) -> Result<()> {
    let required = [
        ("OpenAI", &config.openai.api_key_env),
        ("Serper", &config.serper.api_key_env),
    ];

    let missing: Vec<String> = required
        .iter()
        .filter(|(_, var)| !matches!(std::env::var(var.as_str()), Ok(v) if !v.is_empty()))
        .map(|(service, var)| format!("{service} ({var})"))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ResearchFlowError::config(format!(
            "API key not found for: {}. Set the environment variable(s) or add them to .env",
            missing.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("researchflow_result.json"));
        assert!(toml_str.contains("OPENAI_API_KEY"));
        assert!(toml_str.contains("SERPER_API_KEY"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.top_k, 5);
        assert_eq!(parsed.defaults.tone, Tone::Professional);
        assert_eq!(parsed.openai.chat_model, "gpt-4o-mini");
        assert_eq!(parsed.output.seo_file, "Content.md");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[defaults]
tone = "casual"
length = "long"

[openai]
chat_model = "gpt-4o"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.tone, Tone::Casual);
        assert_eq!(config.defaults.length, Length::Long);
        assert_eq!(config.defaults.search_results, 10);
        assert_eq!(config.openai.chat_model, "gpt-4o");
        assert_eq!(config.openai.embedding_model, "text-embedding-3-small");
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let path = std::env::temp_dir().join(format!("rf_cfg_{}.toml", uuid::Uuid::now_v7()));
        std::fs::write(&path, "[serper]\nbase_url = \"not a url\"\n").unwrap();
        let err = load_config_from(&path).unwrap_err();
        assert!(err.to_string().contains("[serper] base_url"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use unique env var names to avoid interfering with other tests
        config.openai.api_key_env = "RF_TEST_NONEXISTENT_OPENAI_12345".into();
        config.serper.api_key_env = "RF_TEST_NONEXISTENT_SERPER_12345".into();
        let result = validate_api_keys(&config);
        assert!(result.is_err());
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("API key not found"));
        assert!(msg.contains("RF_TEST_NONEXISTENT_SERPER_12345"));
    }
}

//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.ziwei-analyst.toml` files.

use crate::llm::{LlmSettings, Provider};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".ziwei-analyst.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Knowledge-base settings.
    #[serde(default)]
    pub corpus: CorpusConfig,

    /// Parallel analysis settings.
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
        }
    }
}

fn default_output() -> String {
    "ziwei_report.md".to_string()
}

/// LLM model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Wire protocol of the endpoint.
    #[serde(default)]
    pub provider: Provider,

    /// Model name.
    #[serde(default = "default_model")]
    pub name: String,

    /// Endpoint base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Bearer token, if the endpoint needs one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens in response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: Option<u32>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            name: default_model(),
            api_base: default_api_base(),
            api_key: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_model() -> String {
    "qwen2.5:14b".to_string()
}

fn default_api_base() -> String {
    "http://localhost:11434/v1".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> Option<u32> {
    Some(2048)
}

fn default_timeout() -> u64 {
    600 // palace readings are long; slow local models need the headroom
}

/// Knowledge-base settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// Path to the knowledge-base JSON document.
    #[serde(default = "default_corpus_path")]
    pub path: String,

    /// Excerpts included per palace.
    #[serde(default = "default_max_excerpts")]
    pub max_excerpts: usize,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            path: default_corpus_path(),
            max_excerpts: default_max_excerpts(),
        }
    }
}

fn default_corpus_path() -> String {
    "data/ziwei_index.json".to_string()
}

fn default_max_excerpts() -> usize {
    crate::prompt::DEFAULT_MAX_EXCERPTS
}

/// Parallel analysis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Milliseconds between disconnect checks.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    250
}

impl AnalysisConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load `.ziwei-analyst.toml` from a directory.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(DEFAULT_CONFIG_FILE);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// Only flags that were actually given override the file.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref model) = args.model {
            self.model.name = model.clone();
        }
        if let Some(provider) = args.provider {
            self.model.provider = provider;
        }
        if let Some(ref api_base) = args.api_base {
            self.model.api_base = api_base.clone();
        }
        if let Some(ref api_key) = args.api_key {
            self.model.api_key = Some(api_key.clone());
        }
        if let Some(temperature) = args.temperature {
            self.model.temperature = temperature;
        }
        if let Some(timeout) = args.timeout {
            self.model.timeout_seconds = timeout;
        }

        if let Some(ref corpus) = args.corpus {
            self.corpus.path = corpus.to_string_lossy().to_string();
        }
        if let Some(max_excerpts) = args.max_excerpts {
            self.corpus.max_excerpts = max_excerpts;
        }

        if let Some(ref output) = args.output {
            self.general.output = output.to_string_lossy().to_string();
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Settings for the LLM client.
    pub fn llm_settings(&self) -> LlmSettings {
        LlmSettings {
            provider: self.model.provider,
            api_base: self.model.api_base.clone(),
            api_key: self.model.api_key.clone(),
            model: self.model.name.clone(),
            temperature: self.model.temperature,
            max_tokens: self.model.max_tokens,
            timeout_seconds: self.model.timeout_seconds,
        }
    }

    /// Report destination.
    pub fn output_path(&self) -> PathBuf {
        PathBuf::from(&self.general.output)
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Args;
    use clap::Parser;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.model.provider, Provider::Openai);
        assert_eq!(config.corpus.max_excerpts, 3);
        assert_eq!(config.analysis.poll_interval(), Duration::from_millis(250));
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
output = "reading.md"
verbose = true

[model]
provider = "ollama"
name = "llama3.1:8b"
api_base = "http://gpu-box:11434"
temperature = 0.2

[corpus]
max_excerpts = 5
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.output, "reading.md");
        assert!(config.general.verbose);
        assert_eq!(config.model.provider, Provider::Ollama);
        assert_eq!(config.model.name, "llama3.1:8b");
        assert_eq!(config.model.temperature, 0.2);
        assert_eq!(config.model.timeout_seconds, 600);
        assert_eq!(config.corpus.max_excerpts, 5);
        assert_eq!(config.corpus.path, "data/ziwei_index.json");
    }

    #[test]
    fn test_merge_only_given_flags() {
        let mut config = Config::default();
        config.model.name = "from-file".to_string();
        config.model.temperature = 0.3;

        let args = Args::try_parse_from([
            "ziwei-analyst",
            "--chart",
            "c.json",
            "--temperature",
            "0.9",
            "--max-excerpts",
            "1",
        ])
        .unwrap();
        config.merge_with_args(&args);

        // ZIWEI_MODEL may be set in the environment
        if args.model.is_none() {
            assert_eq!(config.model.name, "from-file");
        }
        assert_eq!(config.model.temperature, 0.9);
        assert_eq!(config.corpus.max_excerpts, 1);
        assert_eq!(config.llm_settings().temperature, 0.9);
    }

    #[test]
    fn test_load_from_dir() {
        let dir = TempDir::new().unwrap();
        assert!(Config::load_from_dir(dir.path()).unwrap().is_none());

        std::fs::write(
            dir.path().join(DEFAULT_CONFIG_FILE),
            "[analysis]\npoll_interval_ms = 100\n",
        )
        .unwrap();
        let config = Config::load_from_dir(dir.path()).unwrap().unwrap();
        assert_eq!(config.analysis.poll_interval_ms, 100);

        std::fs::write(dir.path().join(DEFAULT_CONFIG_FILE), "[analysis\n").unwrap();
        assert!(Config::load_from_dir(dir.path()).is_err());
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[model]"));
        assert!(toml_str.contains("[corpus]"));
        assert!(toml_str.contains("[analysis]"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.model.name, Config::default().model.name);
    }
}

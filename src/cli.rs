//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::llm::Provider;
use clap::Parser;
use std::path::PathBuf;

/// ziwei-analyst - LLM-powered palace reader for Zi Wei Dou Shu charts
///
/// Reads a chart exported by the charting library, analyses all twelve
/// palaces in parallel against an LLM, enriched with the Three Parties and
/// Four Areas, palace-stem transformations and classical-text excerpts.
///
/// Examples:
///   ziwei-analyst --chart chart.json
///   ziwei-analyst --chart chart.json --provider ollama --api-base http://localhost:11434
///   ziwei-analyst --chart chart.json --mode overview --format json
///   ziwei-analyst --chart chart.json --dry-run
///   ziwei-analyst --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Chart JSON file ({"birthInfo": ..., "astrolabe": {"palaces": [...]}})
    #[arg(long, value_name = "FILE", required_unless_present = "init_config")]
    pub chart: Option<PathBuf>,

    /// Model name to request from the provider
    #[arg(short, long, env = "ZIWEI_MODEL")]
    pub model: Option<String>,

    /// Wire protocol of the LLM endpoint
    #[arg(long, value_name = "PROVIDER")]
    pub provider: Option<Provider>,

    /// Base URL of the LLM endpoint
    ///
    /// For OpenAI-compatible servers include the version prefix, e.g.
    /// https://api.openai.com/v1.
    #[arg(long, value_name = "URL", env = "ZIWEI_API_BASE")]
    pub api_base: Option<String>,

    /// API key sent as a bearer token
    #[arg(long, value_name = "KEY", env = "ZIWEI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Output file path for the report
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// What to generate
    #[arg(long, default_value = "palaces", value_name = "MODE")]
    pub mode: Mode,

    /// Knowledge-base JSON file with classical texts
    #[arg(long, value_name = "FILE")]
    pub corpus: Option<PathBuf>,

    /// Knowledge-base excerpts included per palace
    #[arg(long, value_name = "COUNT")]
    pub max_excerpts: Option<usize>,

    /// Sampling temperature (0.0 - 2.0)
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Request timeout in seconds, per LLM call
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .ziwei-analyst.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Dry run: print every palace prompt without calling the LLM
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .ziwei-analyst.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

/// Kind of reading to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Mode {
    /// One detailed analysis per palace, in parallel (default)
    #[default]
    Palaces,
    /// A single short reading of the whole chart
    Overview,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if let Some(ref chart) = self.chart {
            if !chart.is_file() {
                return Err(format!("Chart file does not exist: {}", chart.display()));
            }
        }

        if let Some(ref api_base) = self.api_base {
            if !api_base.starts_with("http://") && !api_base.starts_with("https://") {
                return Err("API base must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err("Temperature must be between 0.0 and 2.0".to_string());
            }
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `verbose_by_default` comes from the config file; `--quiet` wins over it.
    pub fn log_level(&self, verbose_by_default: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || verbose_by_default {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn make_args() -> Args {
        Args {
            chart: None,
            model: None,
            provider: None,
            api_base: None,
            api_key: None,
            output: None,
            format: OutputFormat::Markdown,
            mode: Mode::Palaces,
            corpus: None,
            max_excerpts: None,
            temperature: None,
            timeout: None,
            config: None,
            verbose: false,
            quiet: false,
            dry_run: false,
            init_config: false,
        }
    }

    #[test]
    fn test_parse_flags() {
        let args = Args::try_parse_from([
            "ziwei-analyst",
            "--chart",
            "chart.json",
            "--provider",
            "ollama",
            "--mode",
            "overview",
            "--max-excerpts",
            "5",
        ])
        .unwrap();

        assert_eq!(args.chart, Some(PathBuf::from("chart.json")));
        assert_eq!(args.provider, Some(Provider::Ollama));
        assert_eq!(args.mode, Mode::Overview);
        assert_eq!(args.max_excerpts, Some(5));
        assert_eq!(args.format, OutputFormat::Markdown);
    }

    #[test]
    fn test_chart_required_unless_init_config() {
        assert!(Args::try_parse_from(["ziwei-analyst"]).is_err());
        assert!(Args::try_parse_from(["ziwei-analyst", "--init-config"]).is_ok());
    }

    #[test]
    fn test_validation_missing_chart() {
        let mut args = make_args();
        args.chart = Some(PathBuf::from("/nonexistent/chart.json"));
        assert!(args.validate().is_err());

        let file = NamedTempFile::new().unwrap();
        args.chart = Some(file.path().to_path_buf());
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_invalid_api_base() {
        let mut args = make_args();
        args.api_base = Some("localhost:11434".to_string());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_ranges() {
        let mut args = make_args();
        args.temperature = Some(2.5);
        assert!(args.validate().is_err());

        args.temperature = Some(0.7);
        args.timeout = Some(0);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(false), tracing::Level::INFO);
        assert_eq!(args.log_level(true), tracing::Level::DEBUG);

        args.verbose = true;
        assert_eq!(args.log_level(false), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(true), tracing::Level::ERROR);
    }
}

//! ziwei-analyst - LLM-powered palace reader for Zi Wei Dou Shu charts
//!
//! A CLI tool that analyses every palace of a chart in parallel against an
//! LLM, grounding each prompt in the palace's Three Parties and Four Areas,
//! its stem transformations and excerpts from a classical-text knowledge base.
//!
//! Exit codes:
//!   0   - Success (individual palace failures are reported inline)
//!   1   - Runtime error (unreadable chart, config, client setup, etc.)
//!   130 - Interrupted; the batch was abandoned and no report was written

mod analysis;
mod cli;
mod config;
mod corpus;
mod llm;
mod models;
mod prompt;
mod report;
mod rules;

use analysis::{AnalysisError, AnalysisOrchestrator, InterruptProbe, EMPTY_REPLY};
use anyhow::{Context, Result};
use chrono::Utc;
use cli::{Args, Mode, OutputFormat};
use config::Config;
use corpus::{IndexState, TextIndex};
use indicatif::{ProgressBar, ProgressStyle};
use llm::{ChatClient, ChatMessage, HttpChatClient};
use models::{AnalysisReport, Chart, PalaceReport, ReportMetadata};
use prompt::AnalysisPromptComposer;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Exit code for a batch abandoned on interrupt.
const EXIT_CANCELLED: i32 = 130;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Load configuration first: it can turn on verbose logging
    let (mut config, source) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    // Initialize logging
    init_logging(args.log_level(config.general.verbose));

    info!("ziwei-analyst v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    source.log();

    match run_analysis(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Analysis failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .ziwei-analyst.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(config::DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            config::DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", config::DEFAULT_CONFIG_FILE))?;

    println!(
        "✅ Created {} with default settings.",
        config::DEFAULT_CONFIG_FILE
    );
    println!("   Edit it to customize the model endpoint, knowledge base, and more.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(level: tracing::Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run the complete reading workflow. Returns the process exit code.
async fn run_analysis(args: Args, config: Config) -> Result<i32> {
    let start_time = Instant::now();

    // Step 1: Read the chart
    let chart_path = args.chart.clone().context("No chart file given")?;
    let chart = load_chart(&chart_path)?;
    let subject = chart
        .birth_info
        .name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| "Unknown".to_string());
    println!(
        "📜 Chart loaded: {} ({} palaces)",
        subject,
        chart.palaces().len()
    );

    // Step 2: Load the knowledge base once, before any palace needs it
    let corpus = Arc::new(TextIndex::new(&config.corpus.path));
    match corpus.load() {
        IndexState::Ready => println!(
            "📚 Knowledge base: {} sections from {}",
            corpus.section_count(),
            config.corpus.path
        ),
        state => {
            warn!("Knowledge base is {:?}; prompts will carry no excerpts", state);
            println!("📚 Knowledge base unavailable, continuing without excerpts");
        }
    }

    let composer = AnalysisPromptComposer::new(Arc::clone(&corpus), config.corpus.max_excerpts);
    let context = chart.birth_info.context();

    // Handle --dry-run: print prompts and exit
    if args.dry_run {
        return handle_dry_run(&chart, &composer, &context, args.mode);
    }

    // Step 3: Connect to the model
    let settings = config.llm_settings();
    println!("🤖 Initializing LLM client...");
    println!("   Provider: {}", settings.provider);
    println!("   Model: {}", settings.model);
    println!("   Endpoint: {}", settings.api_base);
    println!("   Timeout: {}s", settings.timeout_seconds);

    let llm: Arc<dyn ChatClient> =
        Arc::new(HttpChatClient::new(settings).context("Failed to create LLM client")?);

    // Step 4: Generate the reading
    let (overview, palaces) = match args.mode {
        Mode::Overview => {
            println!("\n🔮 Generating chart overview...");
            (Some(run_overview(llm.as_ref(), &chart).await), Vec::new())
        }
        Mode::Palaces => {
            println!(
                "\n🔮 Analysing {} palaces in parallel (Ctrl-C to abandon)...\n",
                chart.palaces().len()
            );
            let progress = create_progress_bar(chart.palaces().len(), args.quiet);
            let orchestrator = AnalysisOrchestrator::new(Arc::clone(&llm), composer)
                .with_poll_interval(config.analysis.poll_interval())
                .with_progress(progress.clone());
            let probe = Arc::new(InterruptProbe::install());

            let result = orchestrator.analyze_all(&chart, &context, probe).await;
            progress.finish_and_clear();

            match result {
                Ok(reports) => (None, reports),
                Err(AnalysisError::ClientGone) => {
                    eprintln!("\n⛔ Analysis abandoned; no report was written.");
                    return Ok(EXIT_CANCELLED);
                }
                Err(e) => return Err(e.into()),
            }
        }
    };

    // Step 5: Build the report
    println!("\n📝 Generating report...");

    let duration = start_time.elapsed().as_secs_f64();
    let palaces_failed = palaces.iter().filter(|p| !p.is_successful()).count();

    let report = AnalysisReport {
        metadata: ReportMetadata {
            subject,
            analysis_date: Utc::now(),
            model_used: llm.model_name().to_string(),
            palaces_analyzed: palaces.len(),
            palaces_failed,
            duration_seconds: duration,
        },
        overview,
        palaces,
    };

    // Step 6: Generate and save the report
    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report),
    };

    let output_path = resolve_output_path(&args, &config);
    std::fs::write(&output_path, &output)
        .with_context(|| format!("Failed to write report to {}", output_path.display()))?;

    // Print summary
    print_summary(&report, &output_path);

    Ok(0)
}

/// Send the whole chart for a short reading.
///
/// A failed call still yields a report, carrying the failure as its text.
async fn run_overview(llm: &dyn ChatClient, chart: &Chart) -> String {
    let messages = vec![
        ChatMessage::system(prompt::OVERVIEW_SYSTEM_PROMPT),
        ChatMessage::user(prompt::compose_overview(chart)),
    ];

    match llm.chat(messages).await {
        Ok(text) if text.trim().is_empty() => {
            warn!("Empty LLM reply for the overview");
            EMPTY_REPLY.to_string()
        }
        Ok(text) => text,
        Err(e) => {
            error!("Overview generation failed: {}", e);
            format!("Unable to generate report: {}", e)
        }
    }
}

/// Handle --dry-run: print every prompt that would be sent, exit.
fn handle_dry_run(
    chart: &Chart,
    composer: &AnalysisPromptComposer,
    context: &str,
    mode: Mode,
) -> Result<i32> {
    println!("\n🔍 Dry run: composing prompts (no LLM call)...\n");

    match mode {
        Mode::Overview => {
            println!("===== system =====\n{}\n", prompt::OVERVIEW_SYSTEM_PROMPT);
            println!("===== user =====\n{}", prompt::compose_overview(chart));
        }
        Mode::Palaces => {
            let palaces = chart.palaces();
            if palaces.is_empty() {
                println!("   The chart has no palaces.");
            }
            for (index, palace) in palaces.iter().enumerate() {
                println!(
                    "===== [Palace {}] {} =====",
                    index,
                    palace.display_name(index)
                );
                println!("{}\n", composer.compose(index, palaces, context));
            }
        }
    }

    println!("✅ Dry run complete. No LLM calls were made.");
    Ok(0)
}

fn create_progress_bar(len: usize, hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} palaces",
    ) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

/// Report destination; a JSON report gets a .json default name.
fn resolve_output_path(args: &Args, config: &Config) -> PathBuf {
    let mut path = config.output_path();
    if args.output.is_none() && args.format == OutputFormat::Json {
        path.set_extension("json");
    }
    path
}

fn print_summary(report: &AnalysisReport, output_path: &Path) {
    let meta = &report.metadata;

    println!("\n📊 Reading Summary:");
    println!("   Subject: {}", meta.subject);
    if report.overview.is_some() {
        println!("   Overview: generated");
    }
    if meta.palaces_analyzed > 0 {
        println!(
            "   Palaces: {} | ✅ {} | ❌ {}",
            meta.palaces_analyzed,
            meta.palaces_analyzed - meta.palaces_failed,
            meta.palaces_failed
        );
        for failed in report.palaces.iter().filter(|p| !p.is_successful()) {
            print_failure(failed);
        }
    }
    println!("   Duration: {:.1}s", meta.duration_seconds);
    println!(
        "\n✅ Reading complete! Report saved to: {}",
        output_path.display()
    );
}

fn print_failure(palace: &PalaceReport) {
    println!(
        "     - {}: {}",
        palace.name,
        palace.error.as_deref().unwrap_or("unknown error")
    );
}

/// Read and parse the chart JSON.
fn load_chart(path: &Path) -> Result<Chart> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read chart file: {}", path.display()))?;

    let chart: Chart = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse chart file: {}", path.display()))?;

    if chart.palaces().is_empty() {
        warn!("Chart {} has no palaces", path.display());
    }

    Ok(chart)
}

/// Where the configuration came from; logged once logging is up.
#[derive(Debug)]
enum ConfigSource {
    Explicit(PathBuf),
    DefaultFile,
    Defaults,
    Unreadable(anyhow::Error),
}

impl ConfigSource {
    fn log(&self) {
        match self {
            ConfigSource::Explicit(path) => info!("Loaded config from: {}", path.display()),
            ConfigSource::DefaultFile => {
                info!("Loaded default config from {}", config::DEFAULT_CONFIG_FILE)
            }
            ConfigSource::Defaults => debug!("No config file found, using defaults"),
            ConfigSource::Unreadable(e) => warn!("Failed to load config: {:#}", e),
        }
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<(Config, ConfigSource)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, ConfigSource::Explicit(config_path.clone())));
    }

    // Try default location
    Ok(match Config::load_default() {
        Ok(Some(config)) => (config, ConfigSource::DefaultFile),
        Ok(None) => (Config::default(), ConfigSource::Defaults),
        Err(e) => (Config::default(), ConfigSource::Unreadable(e)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use async_trait::async_trait;

    struct FixedClient(Result<&'static str, u16>);

    #[async_trait]
    impl ChatClient for FixedClient {
        fn model_name(&self) -> &str {
            "fixed"
        }

        async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, LlmError> {
            assert_eq!(messages[0].role, "system");
            assert_eq!(messages[1].role, "user");
            match self.0 {
                Ok(text) => Ok(text.to_string()),
                Err(status) => Err(LlmError::Status {
                    status,
                    body: "overloaded".to_string(),
                }),
            }
        }
    }

    #[tokio::test]
    async fn test_overview_failure_still_yields_text() {
        let chart = Chart::default();

        let text = run_overview(&FixedClient(Err(503)), &chart).await;
        assert!(text.starts_with("Unable to generate report: "));
        assert!(text.contains("overloaded"));

        assert_eq!(run_overview(&FixedClient(Ok("  ")), &chart).await, EMPTY_REPLY);
        assert_eq!(run_overview(&FixedClient(Ok("命主刚毅")), &chart).await, "命主刚毅");
    }

    #[test]
    fn test_explicit_config_drives_verbosity() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[general]\nverbose = true\n").unwrap();

        let args = <Args as clap::Parser>::try_parse_from([
            "ziwei-analyst",
            "--chart",
            "c.json",
            "--config",
            path.to_str().unwrap(),
        ])
        .unwrap();
        let (mut config, source) = load_config(&args).unwrap();
        config.merge_with_args(&args);

        assert!(matches!(source, ConfigSource::Explicit(_)));
        assert_eq!(args.log_level(config.general.verbose), tracing::Level::DEBUG);

        std::fs::write(&path, "[general\n").unwrap();
        assert!(load_config(&args).is_err());
    }
}

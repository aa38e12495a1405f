//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use indicatif::{ProgressBar, ProgressStyle};
use researchflow_core::{
    PipelineRun, ProgressReporter, Services, StageOptions, StageOutcome, present,
    research_pipeline, run_pipeline,
};
use researchflow_normalize::{RawValue, normalize};
use researchflow_providers::{OpenAiChat, OpenAiEmbeddings, SerperSearch};
use researchflow_shared::{
    AppConfig, Length, PipelineContext, Tone, init_config, load_config, validate_api_keys,
};
use tracing::{info, warn};

use crate::render;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// ResearchFlow: agentic research and content.
#[derive(Parser)]
#[command(
    name = "researchflow",
    version,
    about = "Run a research pipeline and get blog, social copy, and SEO-ready outputs.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Research a topic and generate content for it.
    Run(RunArgs),

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args)]
pub(crate) struct RunArgs {
    /// Topic or seed keywords.
    #[arg(long, default_value = "Gen AI vs Humans")]
    pub topic: String,

    /// Writing tone: professional, casual, or friendly (defaults to config).
    #[arg(long)]
    pub tone: Option<Tone>,

    /// Content length: short, medium, or long (defaults to config).
    #[arg(long)]
    pub length: Option<Length>,

    /// Directory for the export and Content.md (defaults to config).
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Print the captured pipeline console output.
    #[arg(long)]
    pub show_console: bool,

    /// Skip the quick view summary.
    #[arg(long)]
    pub no_quick_view: bool,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "researchflow=info",
        1 => "researchflow=debug",
        _ => "researchflow=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // Logs go to stderr so stdout carries only the run output.
    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run(args) => cmd_run(args).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

async fn cmd_run(args: RunArgs) -> Result<()> {
    // Validate API keys before doing anything
    let config = load_config()?;
    validate_api_keys(&config)?;

    let context = PipelineContext::new(
        &args.topic,
        args.tone.unwrap_or(config.defaults.tone),
        args.length.unwrap_or(config.defaults.length),
    )?;

    let out_dir = args
        .out
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.output.dir));
    let mut options = StageOptions::from_config(&config);
    options.seo_output = Some(out_dir.join(&config.output.seo_file));

    let stages = research_pipeline(&build_services(&config)?, &options);

    info!(
        topic = context.topic(),
        tone = %context.tone(),
        length = %context.length(),
        out = %out_dir.display(),
        "starting research run"
    );

    let reporter = CliProgress::new();
    let run = run_pipeline(&context, &stages, &reporter).await;
    let failure = run.failure().cloned();
    let (aggregate, diagnostics) = run.into_parts();

    let normalized = normalize(RawValue::from(aggregate));
    let model = present(&normalized);

    println!("Run completed\n");

    if let Some(failure) = &failure {
        warn!(stage = %failure.stage, error = %failure.message, "run halted");
        println!("{}", render::failure_notice(&failure.stage));
        println!("{}", render::console_section(&diagnostics));
    } else if args.show_console {
        println!("{}", render::console_section(&diagnostics));
    }

    println!("{}", render::raw_section(&normalized));

    if let Some(writing) = &model.writing {
        println!("{}", render::content_section(writing));
    }

    if !args.no_quick_view {
        println!("{}", render::quick_view(&model, normalized.as_mapping().is_some()));
    }

    let export_path = out_dir.join(&config.output.export_file);
    write_export(&export_path, &model.export)?;
    println!("Result saved to {}", export_path.display());

    Ok(())
}

fn build_services(config: &AppConfig) -> Result<Services> {
    Ok(Services {
        search: Arc::new(SerperSearch::from_config(config)?),
        embedder: Arc::new(OpenAiEmbeddings::from_config(config)?),
        generator: Arc::new(OpenAiChat::from_config(config)?),
    })
}

fn write_export(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .wrap_err_with(|| format!("cannot create output directory {}", parent.display()))?;
    }
    std::fs::write(path, contents)
        .wrap_err_with(|| format!("cannot write {}", path.display()))
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        spinner.set_message("Running ResearchFlow agents...");
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn stage_started(&self, name: &str, index: usize, total: usize) {
        self.spinner
            .set_message(format!("Running [{index}/{total}] {name}"));
    }

    fn stage_finished(&self, name: &str, outcome: &StageOutcome) {
        if let StageOutcome::Failed(message) = outcome {
            self.spinner.println(format!("  {name} failed: {message}"));
        }
    }

    fn done(&self, run: &PipelineRun) {
        self.spinner.finish_and_clear();
        info!(
            elapsed_s = format!("{:.1}", run.elapsed.as_secs_f64()),
            "pipeline finished"
        );
    }
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

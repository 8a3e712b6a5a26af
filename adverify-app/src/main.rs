use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use adverify_common::observability::init_logging;
use adverify_config::{AdverifyConfig, AdverifyConfigLoader};
use adverify_web::Extractor;
use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pipeline::{Pipeline, Stage};
use render::{OutputFormat, render};

mod pipeline;
mod render;

const DEFAULT_CONFIG_FILE: &str = "adverify.yaml";
const BRAILLE_FRAMES: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// Check an ad script against the text of the website it advertises.
#[derive(Debug, Parser)]
#[command(name = "adverify", version, about)]
struct Args {
    /// Page the ad is about.
    #[arg(long)]
    url: String,

    /// Ad script text.
    #[arg(long, conflicts_with = "script_file")]
    script: Option<String>,

    /// Read the ad script from a file, or `-` for stdin.
    #[arg(long)]
    script_file: Option<PathBuf>,

    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Skip model discovery and use this model.
    #[arg(long, env = "ADVERIFY_MODEL")]
    model: Option<String>,

    /// YAML config file. Defaults to ./adverify.yaml when present.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Truncate the page text to this many characters before verification.
    #[arg(long)]
    max_source_chars: Option<usize>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // 1) Config (env wins over file, flags win over both)
    let mut cfg = load_config(args.config.as_deref())?;
    apply_overrides(&mut cfg, &args);

    let log_path = init_logging(cfg.log.to_log_config("adverify"))?;
    tracing::debug!(log = %log_path.display(), "adverify.start");

    let script = read_script(&args)?;

    // 2) Pipeline
    let extractor = Extractor::new()?
        .with_user_agent(cfg.scrape.user_agent.clone())
        .with_timeout(cfg.scrape.timeout());
    let pipeline = Pipeline::new(&extractor, cfg.llm.to_llm_config())
        .with_max_source_chars(cfg.verify.max_source_chars)
        .with_generation(cfg.llm.temperature, cfg.llm.max_tokens);

    let spinner = spinner();
    let outcome = pipeline
        .run(&args.url, &script, |stage| {
            spinner.set_message(match stage {
                Stage::Scraping => format!("Scraping {}", args.url.trim()),
                Stage::Scraped { chars } => format!("Scraped {chars} characters, resolving model"),
                Stage::Verifying { model } => format!("Verifying with {model}"),
            })
        })
        .await;
    spinner.finish_and_clear();

    // 3) Render
    let mut stdout = io::stdout().lock();
    render(&outcome, args.format, &mut stdout)?;

    tracing::info!(outcome = outcome.label(), "adverify.done");
    Ok(if outcome.is_verified() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn load_config(path: Option<&Path>) -> Result<AdverifyConfig> {
    let loader = match path {
        Some(path) => AdverifyConfigLoader::new().with_file(path),
        None => AdverifyConfigLoader::new().with_optional_file(DEFAULT_CONFIG_FILE),
    };
    loader.load().context("loading configuration")
}

fn apply_overrides(cfg: &mut AdverifyConfig, args: &Args) {
    if let Some(key) = &args.api_key {
        cfg.llm.api_key = Some(key.clone());
    }
    if let Some(model) = args.model.as_ref().filter(|m| !m.trim().is_empty()) {
        cfg.llm.model = Some(model.clone());
    }
    if let Some(max) = args.max_source_chars {
        cfg.verify.max_source_chars = max;
    }
}

/// Missing script is not an error here; the pipeline rejects it.
fn read_script(args: &Args) -> Result<String> {
    match (&args.script, &args.script_file) {
        (Some(script), _) => Ok(script.clone()),
        (None, Some(path)) if path.as_os_str() == "-" => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("reading ad script from stdin")?;
            Ok(buf)
        }
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("reading ad script from {}", path.display())),
        (None, None) => Ok(String::new()),
    }
}

fn spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_chars(&format!("{BRAILLE_FRAMES} "))
        .template("{spinner:.yellow} {msg}")
    {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

//! `tether` - issue LLM completion calls with retry and model fallback.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing_subscriber::EnvFilter;

use tether_core::{CallOptions, CallOutcome, CallRequest, TracingReporter};
use tether_runtime::{LlmUsage, ProviderRegistry, ResilientCaller, RuntimeConfig, UsageTracker};

#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "Resilient LLM completion calls", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (YAML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log attempts, retries and fallbacks to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one prompt through the resilient caller
    Complete {
        /// User prompt
        prompt: String,

        /// System prompt
        #[arg(short, long)]
        system: Option<String>,

        /// Primary model
        #[arg(short, long)]
        model: Option<String>,

        /// Model to use when the primary model is unavailable
        #[arg(long)]
        fallback_model: Option<String>,

        /// Total attempts for rate limits and timeouts
        #[arg(long)]
        max_retries: Option<u32>,

        /// Provider option as key=value; the value is parsed as JSON when possible
        #[arg(short = 'o', long = "option", value_parser = parse_option)]
        options: Vec<(String, JsonValue)>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// List available provider types
    Providers,
    /// Print the effective configuration
    Config,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Serialize)]
struct Report<'a> {
    outcome: &'a CallOutcome,
    usage: &'a LlmUsage,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Complete {
            prompt,
            system,
            model,
            fallback_model,
            max_retries,
            options,
            format,
        } => {
            let config = apply_overrides(config, model, fallback_model, max_retries)?;
            let request = build_request(&config, prompt, system, options)?;
            cmd_complete(&config, &request, format).await
        }
        Commands::Providers => cmd_providers(),
        Commands::Config => cmd_config(&config),
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<RuntimeConfig> {
    match path {
        Some(path) => RuntimeConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(RuntimeConfig::default()),
    }
}

fn apply_overrides(
    mut config: RuntimeConfig,
    model: Option<String>,
    fallback_model: Option<String>,
    max_retries: Option<u32>,
) -> Result<RuntimeConfig> {
    if let Some(model) = model {
        config.model = model;
    }
    if let Some(fallback_model) = fallback_model {
        config.fallback.model = fallback_model;
    }
    if let Some(max_retries) = max_retries {
        config.retry.max_retries = max_retries;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn build_request(
    config: &RuntimeConfig,
    prompt: String,
    system: Option<String>,
    options: Vec<(String, JsonValue)>,
) -> Result<CallRequest> {
    let mut builder = CallRequest::builder(config.model.clone());
    if let Some(system) = system {
        builder = builder.system(system);
    }

    builder
        .user(prompt)
        .options(options.into_iter().collect::<CallOptions>())
        .build()
        .context("Invalid request")
}

async fn cmd_complete(
    config: &RuntimeConfig,
    request: &CallRequest,
    format: OutputFormat,
) -> Result<()> {
    tracing::debug!(
        provider = %config.provider.provider_type,
        model = %config.model,
        fallback = %config.fallback.model,
        "Starting completion"
    );

    let registry = ProviderRegistry::with_defaults();
    let client = registry
        .create(&config.provider.provider_type, &config.provider.settings)
        .context("Failed to create provider")?;

    let caller = ResilientCaller::builder(client)
        .retry_policy(config.retry_policy()?)
        .fallback_policy(config.fallback_policy()?)
        .reporter(Arc::new(TracingReporter))
        .build();

    let outcome = caller.call(request).await?;
    let tracker = UsageTracker::new();
    tracker.record(&outcome);
    let usage = tracker.usage();

    match format {
        OutputFormat::Json => {
            let report = Report {
                outcome: &outcome,
                usage: &usage,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            println!("{}", outcome.content());
            eprintln!();
            eprintln!(
                "model: {}{}  attempts: {}  tokens: {} in / {} out  cost: ${:.6}",
                outcome.model_used,
                if outcome.fallback_used {
                    " (fallback)"
                } else {
                    ""
                },
                outcome.attempts,
                usage.prompt_tokens,
                usage.completion_tokens,
                usage.estimated_cost
            );
        }
    }

    Ok(())
}

fn cmd_providers() -> Result<()> {
    let registry = ProviderRegistry::with_defaults();
    let mut providers = registry.providers().peekable();
    if providers.peek().is_none() {
        bail!("No providers compiled in");
    }

    for (provider_type, description) in providers {
        println!("{provider_type:<12}  {description}");
    }

    Ok(())
}

fn cmd_config(config: &RuntimeConfig) -> Result<()> {
    print!("{}", config.to_yaml()?);
    Ok(())
}

/// Parse `key=value`, reading the value as JSON and falling back to a string.
fn parse_option(s: &str) -> Result<(String, JsonValue), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{s}'"))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty option name in '{s}'"));
    }

    let value = serde_json::from_str(value).unwrap_or_else(|_| JsonValue::String(value.into()));
    Ok((key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serde_json::json;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_option_values() {
        assert_eq!(
            parse_option("reasoning_effort=minimal").unwrap(),
            ("reasoning_effort".to_string(), json!("minimal"))
        );
        assert_eq!(
            parse_option("temperature=0.2").unwrap(),
            ("temperature".to_string(), json!(0.2))
        );
        assert_eq!(
            parse_option("store=true").unwrap(),
            ("store".to_string(), json!(true))
        );
        assert_eq!(
            parse_option("stop=a=b").unwrap(),
            ("stop".to_string(), json!("a=b"))
        );
        assert!(parse_option("no-equals").is_err());
        assert!(parse_option("=value").is_err());
    }

    #[test]
    fn test_complete_arguments() {
        let cli = Cli::try_parse_from([
            "tether",
            "complete",
            "hello",
            "--model",
            "o3",
            "-o",
            "verbosity=low",
            "--option",
            "max_completion_tokens=100",
            "--format",
            "json",
        ])
        .unwrap();

        match cli.command {
            Commands::Complete {
                prompt,
                model,
                options,
                format,
                ..
            } => {
                assert_eq!(prompt, "hello");
                assert_eq!(model.as_deref(), Some("o3"));
                assert_eq!(options.len(), 2);
                assert_eq!(format, OutputFormat::Json);
            }
            _ => panic!("expected complete"),
        }
    }

    #[test]
    fn test_overrides_are_validated() {
        let config =
            apply_overrides(RuntimeConfig::default(), Some("o3".into()), None, Some(2)).unwrap();
        assert_eq!(config.model, "o3");
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.fallback.model, "gpt-4o");

        assert!(apply_overrides(RuntimeConfig::default(), None, None, Some(0)).is_err());
    }

    #[test]
    fn test_build_request() {
        let config = RuntimeConfig::default();
        let request = build_request(
            &config,
            "hi".to_string(),
            Some("be brief".to_string()),
            vec![("verbosity".to_string(), json!("low"))],
        )
        .unwrap();

        assert_eq!(request.model(), "gpt-5");
        assert_eq!(request.messages().len(), 2);
        assert!(request.options().contains("verbosity"));
    }
}

//! `switchyard` binary entrypoint.

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use switchyard_core::config::{load_layered, user_config_path};
use switchyard_core::{
    default_store_path, ClaudeCli, CostTracker, Credentials, ModelExecutor, ModelInfo,
    ModelRegistry, ModelRouter, ResolveModelParams, UsageStats,
};
use switchyard_gateway::{GatewayConfig, GatewayServer};
use switchyard_providers::{HandlerRegistry, ProviderKind};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{Cli, Commands};

const FLUSH_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // Respect `RUST_LOG` if set; otherwise default to info.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve {
            port,
            config,
            fallback,
        } => run_serve(port, config.as_deref(), fallback).await,
        Commands::Models {
            provider,
            search,
            free,
            registry,
        } => run_models(provider.as_deref(), search.as_deref(), free, registry.as_deref()),
        Commands::Resolve {
            prompt_type,
            name,
            model,
            frontmatter,
        } => run_resolve(prompt_type, name, model, frontmatter),
        Commands::Stats { date, command } => run_stats(date, command.as_deref()),
        Commands::Health { provider } => run_health(provider.as_deref()).await,
    }
}

fn current_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn credentials() -> Result<Credentials> {
    let config = load_layered(&current_dir(), user_config_path().as_deref())
        .context("failed to load switchyard config")?;
    Ok(Credentials::new(config.providers))
}

fn cost_tracker(registry: Arc<ModelRegistry>) -> Result<Arc<CostTracker>> {
    let tracker = match default_store_path() {
        Some(path) => CostTracker::with_store(registry, path),
        None => CostTracker::new(registry),
    };
    tracker.load().context("failed to load usage history")?;
    Ok(Arc::new(tracker))
}

async fn run_serve(port: Option<u16>, config_path: Option<&Path>, fallback: bool) -> Result<()> {
    let mut config = GatewayConfig::load(config_path)?;
    if let Some(port) = port {
        config.port = port;
    }
    if fallback {
        config.fallback_enabled = true;
    }

    let tracker = cost_tracker(Arc::new(ModelRegistry::builtin()))?;
    let executor = ModelExecutor::new(Arc::new(ClaudeCli::new()))
        .with_credentials(credentials()?)
        .with_cost_tracker(tracker.clone())
        .on_fallback(|message| eprintln!("{} {}", "warning:".yellow().bold(), message));

    let server = GatewayServer::new(Arc::new(executor), config);
    let addr = server.start().await?;
    println!(
        "{} {}",
        "Switchyard gateway listening on".green().bold(),
        format!("http://{}", addr).cyan()
    );

    let flusher = {
        let tracker = tracker.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(FLUSH_INTERVAL);
            loop {
                interval.tick().await;
                if let Err(e) = tracker.flush() {
                    tracing::warn!(error = %e, "failed to persist usage records");
                }
            }
        })
    };

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    println!("{}", "Shutting down...".dimmed());

    server.shutdown().await;
    flusher.abort();
    tracker.flush().context("failed to persist usage records")?;
    Ok(())
}

fn run_models(
    provider: Option<&str>,
    search: Option<&str>,
    free: bool,
    registry_path: Option<&Path>,
) -> Result<()> {
    let registry = match registry_path {
        Some(path) => ModelRegistry::from_json_file(path)?,
        None => ModelRegistry::builtin(),
    };

    let mut models: Vec<&ModelInfo> = match search {
        Some(term) => registry.search_models(term),
        None => registry.list_models(provider),
    };
    if let Some(provider) = provider {
        models.retain(|m| m.provider.eq_ignore_ascii_case(provider));
    }
    if free {
        models.retain(|m| m.is_free);
    }

    if models.is_empty() {
        println!("{}", "No models found.".dimmed());
        return Ok(());
    }

    println!(
        "{:<52} {:<11} {:>9} {:>9}",
        "MODEL".bold(),
        "PROVIDER".bold(),
        "IN/1M".bold(),
        "OUT/1M".bold()
    );
    for model in models {
        let id = if model.is_free {
            model.id.green()
        } else {
            model.id.normal()
        };
        println!(
            "{:<52} {:<11} {:>9} {:>9}",
            id,
            model.provider,
            format!("${:.2}", model.pricing.input_per_1m),
            format!("${:.2}", model.pricing.output_per_1m)
        );
    }
    Ok(())
}

fn run_resolve(
    prompt_type: String,
    name: String,
    model: Option<String>,
    frontmatter: Option<String>,
) -> Result<()> {
    let router = ModelRouter::from_current_dir();
    let params = ResolveModelParams {
        prompt_type,
        prompt_name: name,
        cli_override: model,
        frontmatter_model: frontmatter,
    };
    println!("{}", router.resolve_model(&params));
    Ok(())
}

fn run_stats(date: Option<chrono::NaiveDate>, command: Option<&str>) -> Result<()> {
    let tracker = cost_tracker(Arc::new(ModelRegistry::builtin()))?;

    let (label, stats) = match (date, command) {
        (Some(date), _) => (format!("Usage on {}", date), tracker.get_usage_by_date(date)),
        (None, Some(command)) => (
            format!("Usage for '{}'", command),
            tracker.get_usage_by_command(command),
        ),
        (None, None) => ("Total usage".to_string(), tracker.get_stats()),
    };

    println!("{}", label.cyan().bold());
    print_stats(&stats);

    if date.is_none() && command.is_none() {
        let by_model = tracker.get_usage_by_model();
        if !by_model.is_empty() {
            println!();
            println!("{}", "By model".cyan().bold());
            for (model, stats) in by_model {
                println!(
                    "  {:<52} {:>8} req  {:>12} tok  ${:.4}",
                    model, stats.requests, stats.total_tokens, stats.total_cost_usd
                );
            }
        }
    }
    Ok(())
}

fn print_stats(stats: &UsageStats) {
    println!("  {}: {}", "Requests".dimmed(), stats.requests);
    println!("  {}: {}", "Input tokens".dimmed(), stats.input_tokens);
    println!("  {}: {}", "Output tokens".dimmed(), stats.output_tokens);
    println!("  {}: {}", "Total tokens".dimmed(), stats.total_tokens);
    println!(
        "  {}: {}",
        "Cost".dimmed(),
        format!("${:.4}", stats.total_cost_usd).yellow()
    );
}

async fn run_health(provider: Option<&str>) -> Result<()> {
    let providers: Vec<ProviderKind> = match provider {
        Some(name) => vec![name.parse()?],
        None => ProviderKind::ALL.to_vec(),
    };

    let credentials = credentials()?;
    let registry = HandlerRegistry::new();
    for provider in providers {
        let status = match registry.get_or_create(&credentials.handler_config(provider)) {
            Ok(handler) => {
                if handler.check_health().await {
                    "reachable".green()
                } else {
                    format!("unreachable ({})", handler.endpoint()).red()
                }
            }
            Err(e) => format!("not configured ({})", e).yellow(),
        };
        println!("{:<11} {}", provider.as_str().bold(), status);
    }
    Ok(())
}

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use debatebench_core::{
    build_report, group_judgments, render_transcript, ExperimentPlan, Protocol, RankingWeights,
};
use debatebench_runtime::{
    BatchOrchestrator, ExchangeRegistry, ExchangeRequest, JsonFileStore, LlmUsage,
    ProviderRegistry, RuntimeConfig, Storage,
};

#[derive(Parser)]
#[command(
    name = "debatebench",
    version,
    about = "Run LLM debates and measure how stable their judges are"
)]
struct Cli {
    /// Runtime config file (YAML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory, overriding `storage.root`
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the turn order and word budgets
    Protocol,

    /// Run one debate and store it
    Debate {
        /// Resolution to debate
        #[arg(short, long)]
        topic: String,

        /// Model arguing PRO (side A)
        #[arg(long)]
        pro: String,

        /// Model arguing CON (side B)
        #[arg(long)]
        con: String,
    },

    /// Generate every debate listed in a plan
    Generate {
        #[arg(short, long)]
        plan: PathBuf,
    },

    /// Judge stored debates under every configuration in a plan
    Judge {
        #[arg(short, long)]
        plan: PathBuf,
    },

    /// Stability metrics and ranking from stored judgments
    Report {
        /// Restrict to the plan's configurations and use its weights
        #[arg(short, long)]
        plan: Option<PathBuf>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Print the transcript of a stored debate
    Transcript {
        /// Exchange id
        id: String,
    },

    /// Check a plan file without running anything
    Validate {
        #[arg(short, long)]
        plan: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut runtime_config = config::load_config(cli.config.as_deref())?;
    if let Some(dir) = &cli.data_dir {
        runtime_config.storage.root = dir.clone();
    }
    tracing::debug!(source = %config::describe_source(cli.config.as_deref()), "Config resolved");

    match cli.command {
        Commands::Protocol => {
            println!("{}", Protocol::new(runtime_config.debate.budgets).summary());
        }

        Commands::Debate { topic, pro, con } => {
            let batch = orchestrator(&runtime_config)?;
            let registry = ExchangeRegistry::new();
            let request = ExchangeRequest::new(topic, pro, con);

            let exchange = batch
                .runner()
                .run_tracked(&request, &registry)
                .await
                .context("debate failed")?;
            batch
                .storage()
                .put_exchange(&exchange)
                .await
                .context("storing exchange")?;

            println!("Exchange {}\n", exchange.id());
            println!("{}", render_transcript(&exchange));
            print_usage(&batch.invoker().usage().total());
        }

        Commands::Generate { plan } => {
            let plan = load_plan(&plan)?;
            if plan.debates.is_empty() {
                bail!("plan '{}' lists no debates to generate", plan.name);
            }
            let batch = orchestrator(&runtime_config)?;
            let registry = ExchangeRegistry::new();
            let requests: Vec<ExchangeRequest> =
                plan.debates.iter().map(ExchangeRequest::from).collect();

            let report = batch.generate(&requests, &registry).await;

            for id in &report.completed {
                println!("stored  {id}");
            }
            for failure in &report.failures {
                println!("failed  {}: {}", failure.request.topic, failure.error);
            }
            println!(
                "\n{} generated, {} failed",
                report.completed.len(),
                report.failures.len()
            );
            print_usage(&batch.invoker().usage().total());
        }

        Commands::Judge { plan } => {
            let plan = load_plan(&plan)?;
            let batch = orchestrator(&runtime_config)?;
            let exchanges = batch.plan_exchanges(&plan).await?;
            if exchanges.is_empty() {
                bail!("no stored exchanges to judge");
            }
            println!(
                "Judging {} exchanges x {} configs x {} runs = {} units",
                exchanges.len(),
                plan.configs().len(),
                plan.runs_per_exchange,
                plan.unit_count(exchanges.len())
            );

            let report = batch.judge(&plan, &exchanges).await;

            for failure in &report.failures {
                println!(
                    "error   {} {}#{}: {}",
                    failure.config, failure.exchange_id, failure.run_index, failure.error
                );
            }
            println!(
                "\ncompleted {}, skipped {}, errored {}",
                report.completed, report.skipped, report.errored
            );
            print_usage(&batch.invoker().usage().total());
        }

        Commands::Report { plan, json } => {
            let storage = JsonFileStore::new(&runtime_config.storage.root);
            let mut judgments = storage.all_judgments().await?;

            let weights = match &plan {
                Some(path) => {
                    let plan = load_plan(path)?;
                    let configs = plan.configs();
                    judgments.retain(|j| configs.contains(&j.config));
                    plan.weights
                }
                None => RankingWeights::default(),
            };
            if judgments.is_empty() {
                bail!(
                    "no judgments found under {}",
                    runtime_config.storage.root.display()
                );
            }

            let report = build_report(&group_judgments(judgments), &weights);
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report.to_table());
            }
        }

        Commands::Transcript { id } => {
            let storage = JsonFileStore::new(&runtime_config.storage.root);
            match storage.get_exchange(&id).await? {
                Some(exchange) => println!("{}", render_transcript(&exchange)),
                None => bail!("exchange '{}' not found", id),
            }
        }

        Commands::Validate { plan } => {
            let plan = load_plan(&plan)?;
            println!("Plan '{}' is valid", plan.name);
            println!("  evaluator configs:  {}", plan.configs().len());
            println!("  runs per exchange:  {}", plan.runs_per_exchange);
            println!("  debates to generate: {}", plan.debates.len());
            if plan.exchanges.is_empty() {
                println!("  exchanges:          all stored");
            } else {
                println!(
                    "  exchanges:          {} ({} judging units)",
                    plan.exchanges.len(),
                    plan.unit_count(plan.exchanges.len())
                );
            }
        }
    }

    Ok(())
}

fn load_plan(path: &Path) -> Result<ExperimentPlan> {
    ExperimentPlan::from_file(path).with_context(|| format!("loading plan {}", path.display()))
}

fn orchestrator(config: &RuntimeConfig) -> Result<BatchOrchestrator> {
    let provider = ProviderRegistry::with_defaults()
        .from_config(&config.provider)
        .context("configuring model provider")?;
    let storage: Arc<dyn Storage> = Arc::new(JsonFileStore::new(&config.storage.root));
    Ok(BatchOrchestrator::new(provider, storage, config))
}

fn print_usage(usage: &LlmUsage) {
    println!(
        "\n{} model calls, {} tokens, ~${:.4}",
        usage.llm_calls, usage.total_tokens, usage.estimated_cost
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_debate_with_globals() {
        let cli = Cli::try_parse_from([
            "debatebench",
            "-v",
            "--data-dir",
            "/tmp/data",
            "debate",
            "--topic",
            "Resolved: x",
            "--pro",
            "a/model",
            "--con",
            "b/model",
        ])
        .unwrap();

        assert!(cli.verbose);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/data")));
        assert!(matches!(cli.command, Commands::Debate { ref pro, .. } if pro == "a/model"));
    }

    #[test]
    fn test_report_flags() {
        let cli = Cli::try_parse_from(["debatebench", "report", "--json"]).unwrap();
        assert!(matches!(cli.command, Commands::Report { plan: None, json: true }));
    }
}

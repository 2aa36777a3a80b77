use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use uuid::Uuid;

use sli_gate::app::evaluation_use_case::{EvaluationRequest, EvaluationUseCase};
use sli_gate::backend::client::MetricsClient;
use sli_gate::config::Config;
use sli_gate::infra::fs_resource_store::FsResourceStore;
use sli_gate::infra::json_file_emitter::JsonFileEmitter;
use sli_gate::types::{CustomFilter, EvaluationContext};
use sli_gate::{logging, observability};

#[derive(Parser)]
#[command(name = "sli-gate")]
#[command(about = "Quality-gate SLI provider backed by a metrics API")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one quality-gate evaluation
    Evaluate {
        #[arg(long)]
        project: String,
        #[arg(long)]
        stage: String,
        #[arg(long)]
        service: String,
        #[arg(long, default_value = "")]
        deployment: String,
        /// Evaluation window start (RFC3339 or unix seconds)
        #[arg(long)]
        start: String,
        /// Evaluation window end (RFC3339 or unix seconds)
        #[arg(long)]
        end: String,
        /// Indicators to resolve (comma-separated)
        #[arg(
            long,
            default_value = "throughput,error_rate,response_time_p50,response_time_p90,response_time_p95"
        )]
        indicators: String,
        /// Directory holding gate configuration documents and receiving output
        #[arg(long, default_value = ".")]
        config_dir: String,
        /// Context labels as key=value pairs (repeatable)
        #[arg(long)]
        label: Vec<String>,
        /// Custom query filters as key=value pairs (repeatable)
        #[arg(long)]
        filter: Vec<String>,
    },
}

fn parse_pairs(pairs: &[String], what: &str) -> Vec<(String, String)> {
    pairs
        .iter()
        .filter_map(|pair| match pair.split_once('=') {
            Some((key, value)) => Some((key.to_string(), value.to_string())),
            None => {
                warn!(pair = %pair, "ignoring {what} without '='");
                None
            }
        })
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();
    observability::init_exporter();

    let cli = Cli::parse();
    match cli.command {
        Commands::Evaluate {
            project,
            stage,
            service,
            deployment,
            start,
            end,
            indicators,
            config_dir,
            label,
            filter,
        } => {
            let config = Config::from_env().or_else(|_| Config::load("gate.toml"))?;
            let client = MetricsClient::new(&config.backend)?;
            let store = Arc::new(FsResourceStore::new(config_dir.clone()));
            let emitter = Arc::new(JsonFileEmitter::new(config_dir));

            let context = EvaluationContext {
                context: Uuid::new_v4().to_string(),
                event: "evaluate".to_string(),
                source: "sli-gate".to_string(),
                project,
                stage,
                service,
                deployment,
                test_strategy: String::new(),
                labels: parse_pairs(&label, "label").into_iter().collect::<HashMap<_, _>>(),
            };
            let request = EvaluationRequest {
                context,
                start,
                end,
                indicators: indicators
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
                custom_filters: parse_pairs(&filter, "filter")
                    .into_iter()
                    .map(|(key, value)| CustomFilter { key, value })
                    .collect(),
            };

            let use_case = EvaluationUseCase::new(client, store, emitter);

            // ctrl-c aborts the ingest wait instead of killing the process
            let cancelled = use_case.cancellation_flag();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("cancellation requested");
                    cancelled.store(true, Ordering::Relaxed);
                }
            });

            let outcome = use_case.run(&request).await?;
            info!(results = outcome.results.len(), "evaluation finished");

            println!("\n📊 Evaluation results:");
            for result in &outcome.results {
                if result.success {
                    println!("   {}: {:.2}", result.metric, result.value);
                } else {
                    println!("   {}: failed ({})", result.metric, result.message);
                }
            }
            if let Some(link) = outcome.labels.get("Dashboard Link") {
                println!("   Dashboard: {link}");
            }
        }
    }

    Ok(())
}

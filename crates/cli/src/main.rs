use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use kiln_core::apis::{ClusterRunTemplate, Pipeline, TemplateOption};
use serde_json::Value;
use tracing::info;

mod controller;
mod offline;

#[derive(Parser, Debug)]
#[command(name = "kilnctl", version, about = "Kiln pipeline controller and tools")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Yaml)]
    output: Output,

    /// Log filter, e.g. `info,kiln_realizer=debug`
    #[arg(long = "log", env = "KILN_LOG", global = true, default_value = "info")]
    log: String,

    /// Serve Prometheus metrics on host:port
    #[arg(long = "metrics-addr", env = "KILN_METRICS_ADDR", global = true)]
    metrics_addr: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output {
    Yaml,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reconcile pipelines until interrupted
    Controller {
        /// Only watch pipelines in this namespace (default: all)
        #[arg(long = "ns", env = "KILN_NAMESPACE")]
        namespace: Option<String>,
        /// Seconds between reconciles of an unchanged pipeline
        #[arg(long = "requeue-secs", env = "KILN_REQUEUE_SECS", default_value_t = 30)]
        requeue_secs: u64,
    },
    /// Render a run template for a pipeline without touching a cluster
    Stamp {
        /// Pipeline manifest (YAML or JSON)
        #[arg(long = "pipeline")]
        pipeline: PathBuf,
        /// ClusterRunTemplate manifest
        #[arg(long = "template")]
        template: PathBuf,
        /// Object exposed to the template as `selected`
        #[arg(long = "selected")]
        selected: Option<PathBuf>,
    },
    /// Check a list of template options for invalid or duplicate selectors
    ValidateOptions {
        /// File holding a list of options
        file: PathBuf,
        /// Allowed path (repeatable); replaces the workload defaults
        #[arg(long = "path", action = ArgAction::Append)]
        paths: Vec<String>,
        /// Allowed path prefix (repeatable); replaces the workload defaults
        #[arg(long = "prefix", action = ArgAction::Append)]
        prefixes: Vec<String>,
    },
}

fn init_tracing(directives: &str) {
    let filter = tracing_subscriber::EnvFilter::from_str(directives)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

fn init_metrics(addr: Option<&str>) {
    let Some(addr) = addr else { return };
    if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
        match builder.with_http_listener(sock).install() {
            Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
            Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
        }
    } else {
        tracing::warn!(addr = %addr, "invalid KILN_METRICS_ADDR; expected host:port");
    }
}

fn emit(output: Output, v: &Value) -> Result<()> {
    match output {
        Output::Yaml => print!("{}", serde_yaml::to_string(v)?),
        Output::Json => println!("{}", serde_json::to_string_pretty(v)?),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log);
    init_metrics(cli.metrics_addr.as_deref());

    match cli.command {
        Commands::Controller { namespace, requeue_secs } => {
            let client = kiln_kubehub::get_kube_client().await?;
            controller::run(client, namespace, Duration::from_secs(requeue_secs)).await?;
        }
        Commands::Stamp { pipeline, template, selected } => {
            let pipeline: Pipeline = offline::read_document(&pipeline)?;
            let template: ClusterRunTemplate = offline::read_document(&template)?;
            let selected: Option<Value> = selected.as_deref().map(offline::read_document::<Value>).transpose()?;
            info!(pipeline = %pipeline.metadata.name.as_deref().unwrap_or("-"), "stamp invoked");
            let stamped = offline::stamp_preview(&pipeline, &template, selected)?;
            emit(cli.output, &stamped)?;
        }
        Commands::ValidateOptions { file, paths, prefixes } => {
            let options: Vec<TemplateOption> = offline::read_document(&file)?;
            offline::check_options(&options, &paths, &prefixes)
                .with_context(|| format!("validating {}", file.display()))?;
            println!("{} options valid", options.len());
        }
    }
    Ok(())
}

use clap::{ArgGroup, Parser, Subcommand};
use dotenv::dotenv;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use stageflow_rs::adk::model;
use stageflow_rs::stageflow::config::ConfigLoader;
use stageflow_rs::stageflow::pipelines::{self, research, security, PipelineDeps};
use stageflow_rs::stageflow::server;
use stageflow_rs::stageflow::tools::{FsReportSink, SendGridEmail, TavilySearch};
use stageflow_rs::stageflow::workflow::fanout::{FanOutExecutor, Progress};
use stageflow_rs::stageflow::workflow::registry::AgentRegistry;
use stageflow_rs::stageflow::workflow::runner::RunOutcome;
use stageflow_rs::stageflow::workflow::suspension::{FileCheckpointStore, SuspensionManager};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the YAML config file
    #[arg(short, long, global = true, default_value = "stageflow.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Research a topic; suspends for query approval
    Research {
        #[arg(short, long)]
        topic: String,

        /// Instance id (generated when omitted)
        #[arg(short, long)]
        instance: Option<String>,
    },
    /// Run the URL security checks
    CheckUrl {
        #[arg(short, long)]
        url: String,

        /// Email the finished report to this address
        #[arg(short, long)]
        email: Option<String>,

        #[arg(short, long)]
        instance: Option<String>,
    },
    /// Resume a suspended instance with a decision
    #[command(group(ArgGroup::new("decision").required(true).args(["approve", "reject"])))]
    Resume {
        #[arg(short, long)]
        instance: String,

        #[arg(long)]
        approve: bool,

        #[arg(long)]
        reject: bool,
    },
    /// Show the pending checkpoint of an instance
    Pending {
        #[arg(short, long)]
        instance: String,
    },
    /// Abandon a suspended instance
    Discard {
        #[arg(short, long)]
        instance: String,
    },
    /// Print a workflow graph as Mermaid
    Graph {
        #[arg(short, long, default_value = research::WORKFLOW)]
        workflow: String,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(short, long, default_value_t = 3000)]
        port: u16,
    },
}

impl Commands {
    /// Whether the command may run a stage and so needs model access
    fn runs_stages(&self) -> bool {
        !matches!(
            self,
            Commands::Pending { .. } | Commands::Discard { .. } | Commands::Graph { .. }
        )
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let config = ConfigLoader::load_or_default(&args.config)?;

    let agents = AgentRegistry::new();
    if args.command.runs_stages() {
        let model = model::from_settings(&config.model)?;
        pipelines::register_agents(&agents, model).await;
    }

    let fanout = match args.command {
        Commands::Serve { .. } => FanOutExecutor::new(),
        _ => {
            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(print_progress(rx));
            FanOutExecutor::new().with_progress(tx)
        }
    };

    let deps = Arc::new(PipelineDeps {
        agents,
        search: Arc::new(TavilySearch::from_env(&config.research)),
        reports: Arc::new(FsReportSink::new(&config.storage.reports_dir)),
        email: Arc::new(SendGridEmail::from_env(&config.security)),
        research: config.research.clone(),
        security: config.security.clone(),
        fanout,
    });
    let suspension = SuspensionManager::new(Arc::new(FileCheckpointStore::new(
        &config.storage.checkpoint_dir,
    )));
    let runners = pipelines::runners(&config, deps, suspension)?;

    match args.command {
        Commands::Research { topic, instance } => {
            let id = instance.unwrap_or_else(new_instance_id);
            let outcome = runners
                .get(research::WORKFLOW)?
                .start(&id, research::seed(&topic))
                .await?;
            print_outcome(&id, &outcome)?;
        }
        Commands::CheckUrl {
            url,
            email,
            instance,
        } => {
            let id = instance.unwrap_or_else(new_instance_id);
            let outcome = runners
                .get(security::WORKFLOW)?
                .start(&id, security::seed(&url, email.as_deref()))
                .await?;
            print_outcome(&id, &outcome)?;
        }
        Commands::Resume {
            instance, approve, ..
        } => {
            let outcome = runners.resume(&instance, json!(approve)).await?;
            print_outcome(&instance, &outcome)?;
        }
        Commands::Pending { instance } => match runners.pending(&instance).await? {
            Some(checkpoint) => println!("{}", serde_json::to_string_pretty(&checkpoint)?),
            None => println!("No pending checkpoint for {}", instance),
        },
        Commands::Discard { instance } => {
            let checkpoint = runners.discard(&instance).await?;
            println!(
                "Discarded {} (was waiting at {})",
                instance, checkpoint.stage
            );
        }
        Commands::Graph { workflow } => {
            println!("{}", runners.get(&workflow)?.graph().to_mermaid());
        }
        Commands::Serve { port } => {
            server::serve(port, runners).await?;
        }
    }

    Ok(())
}

fn new_instance_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn print_outcome(instance_id: &str, outcome: &RunOutcome) -> anyhow::Result<()> {
    match outcome {
        RunOutcome::Suspended {
            stage,
            prompt,
            data,
            ..
        } => {
            println!("Instance {} is waiting at {}", instance_id, stage);
            println!("{}", prompt);
            println!("{}", serde_json::to_string_pretty(data)?);
            println!(
                "Resume with: stageflow-rs resume --instance {} --approve | --reject",
                instance_id
            );
        }
        RunOutcome::Completed(state) => match state.get_str("report_location") {
            Some(location) => {
                println!("Completed {}. Report: {}", instance_id, location);
                if let Some(html) = state.get_str("html_report_location") {
                    println!("HTML report: {}", html);
                }
                if let Some(status) = state.get_str("delivery_status") {
                    println!("{}", status);
                }
            }
            None => {
                println!("Completed {}", instance_id);
                println!("{}", serde_json::to_string_pretty(&state.to_json())?);
            }
        },
    }
    Ok(())
}

async fn print_progress(mut rx: mpsc::UnboundedReceiver<Progress>) {
    while let Some(progress) = rx.recv().await {
        eprintln!(
            "Checking... {}/{} completed",
            progress.completed, progress.total
        );
    }
}

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use nodeflow_core::config::AppConfig;
use nodeflow_core::graph::{Graph, NodeKind};
use nodeflow_core::types::{NodeId, NodeStatus, RunEvent};
use nodeflow_engine::{RunReport, StatusBoard, WorkflowEngine};

#[derive(Parser)]
#[command(name = "nodeflow", version, about = "Run AI agent workflow graphs")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "nodeflow.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow graph
    Run {
        /// JSON graph file (defaults to the demo graph)
        #[arg(short, long)]
        graph: Option<PathBuf>,
        /// Override the trigger's initial prompt
        #[arg(short, long)]
        prompt: Option<String>,
        /// Skip the per-node pacing delay
        #[arg(long)]
        no_pacing: bool,
    },
    /// Print the demo graph as JSON
    Demo,
    /// Check a graph file for structural errors
    Validate {
        /// JSON graph file
        #[arg(short, long)]
        graph: PathBuf,
    },
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("nodeflow=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "nodeflow", &mut std::io::stdout());
        }
        Commands::Demo => {
            println!("{}", serde_json::to_string_pretty(&Graph::demo())?);
        }
        Commands::Validate { graph } => {
            let graph = load_graph(&graph)?;
            println!(
                "Graph OK: {} nodes, {} edges, {} trigger(s)",
                graph.nodes().len(),
                graph.edges().len(),
                graph.triggers().count()
            );
        }
        Commands::Config => {
            let mut shown = AppConfig::load_or_default(&cli.config)?;
            if shown.provider.api_key.is_some() {
                shown.provider.api_key = Some("<redacted>".to_string());
            }
            println!("{}", toml::to_string_pretty(&shown)?);
        }
        Commands::Run {
            graph,
            prompt,
            no_pacing,
        } => {
            let config = AppConfig::load_or_default(&cli.config)?;
            let mut graph = match graph {
                Some(path) => load_graph(&path)?,
                None => Graph::demo(),
            };
            if let Some(prompt) = prompt {
                set_trigger_prompt(&mut graph, prompt);
            }
            run_workflow(config, &graph, no_pacing).await?;
        }
    }

    Ok(())
}

/// Read a JSON graph file and check its structure.
fn load_graph(path: &Path) -> anyhow::Result<Graph> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
    let graph: Graph = serde_json::from_str(&content)?;
    graph.validate()?;
    info!(path = %path.display(), nodes = graph.nodes().len(), "Loaded graph");
    Ok(graph)
}

fn set_trigger_prompt(graph: &mut Graph, prompt: String) {
    let Some(id) = graph.triggers().next().map(|n| n.id.clone()) else {
        warn!("Graph has no trigger, ignoring --prompt");
        return;
    };
    if let Some(node) = graph.node_mut(&id) {
        if let NodeKind::Trigger(settings) = &mut node.kind {
            settings.initial_prompt = prompt;
        }
    }
}

async fn run_workflow(config: AppConfig, graph: &Graph, no_pacing: bool) -> anyhow::Result<()> {
    let client = nodeflow_llm::create_client(&config.provider)?;
    let mut engine_config = config.engine;
    if no_pacing {
        engine_config.pacing_delay_ms = 0;
    }
    let engine = WorkflowEngine::new(client, engine_config);

    let labels: HashMap<NodeId, String> = graph
        .nodes()
        .iter()
        .map(|n| (n.id.clone(), n.label.clone()))
        .collect();

    // Spawn event printer
    let mut rx = engine.event_bus().subscribe();
    let print_handle = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let label = event
                        .node_id()
                        .map(|id| labels.get(id).cloned().unwrap_or_else(|| id.to_string()));
                    match (event, label) {
                        (RunEvent::NodeStarted { .. }, Some(label)) => {
                            eprintln!("[{}: running]", label);
                        }
                        (RunEvent::NodeSucceeded { output, elapsed_ms, .. }, Some(label)) => {
                            eprintln!("[{}: ok {}ms] {}", label, elapsed_ms, truncate(&output, 200));
                        }
                        (RunEvent::NodeFailed { error, .. }, Some(label)) => {
                            eprintln!("[{}: ERROR] {}", label, error);
                        }
                        (RunEvent::RunCompleted { .. }, _) | (RunEvent::RunFailed { .. }, _) => break,
                        _ => {}
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    warn!(skipped = n, "Event printer lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let result = engine.run(graph).await;
    print_handle.await.ok();

    match result {
        Ok(report) => {
            print_status_table(graph, engine.status_board());
            print_summary(&report);
            Ok(())
        }
        Err(e) => {
            eprintln!("Workflow Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn print_status_table(graph: &Graph, board: &StatusBoard) {
    println!();
    println!("{:<20} {:<8} RESULT", "NODE", "STATUS");
    for node in graph.nodes() {
        let state = board.get(&node.id);
        let detail = match state.status {
            NodeStatus::Error => state.error_message.unwrap_or_default(),
            _ => state.output.unwrap_or_default(),
        };
        println!(
            "{:<20} {:<8} {}",
            truncate(&node.label, 20),
            state.status,
            truncate(&detail, 200).replace('\n', " ")
        );
    }

    let outputs: Vec<_> = graph
        .nodes()
        .iter()
        .filter(|n| matches!(n.kind, NodeKind::Output))
        .filter_map(|n| board.get(&n.id).output.map(|o| (n.label.clone(), o)))
        .collect();
    for (label, output) in outputs {
        println!("\n== {} ==\n{}", label, output);
    }
}

fn print_summary(report: &RunReport) {
    let failed = report.firings.iter().filter(|f| !f.succeeded()).count();
    eprintln!(
        "\nRun {} finished: {} firing(s), {} failed, {}ms",
        report.run_id,
        report.firings.len(),
        failed,
        report.elapsed_ms
    );
    if report.truncated {
        eprintln!("Warning: firing limit reached, some queued work was dropped");
    }
}

/// Cut `s` to at most `max` bytes on a char boundary.
fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

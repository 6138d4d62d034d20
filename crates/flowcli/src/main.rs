// crates/flowcli/src/main.rs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use flowcore::{ControlType, ExecutionEvent, FlowDefinition, NodeEvent, NodeSpec, TriggerSpec};
use flowruntime::{FlowRuntime, HandlerRegistry, RuntimeConfig};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flow")]
#[command(about = "Flow Engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a flow definition file
    Run {
        /// Path to flow definition JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Runtime context as JSON string
        #[arg(short, long)]
        context: Option<String>,

        /// Start at this node instead of the definition's entry
        #[arg(short, long)]
        entry: Option<String>,

        /// Per-node handler deadline in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a flow definition file
    Validate {
        /// Path to flow definition JSON file
        file: PathBuf,
    },

    /// List available handler types
    Handlers,

    /// Create a new example flow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "flow.json")]
        output: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            context,
            entry,
            timeout_ms,
            verbose,
        } => {
            init_logging(verbose);
            run_flow(file, context, entry, timeout_ms).await?;
        }

        Commands::Validate { file } => {
            init_logging(false);
            validate_flow(&file)?;
        }

        Commands::Handlers => {
            list_handlers();
        }

        Commands::Init { output } => {
            create_example_flow(output)?;
        }
    }

    Ok(())
}

fn load_definition(file: &Path) -> Result<FlowDefinition> {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let definition: FlowDefinition = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse {}", file.display()))?;
    Ok(definition)
}

fn builtin_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    flownodes::register_all(&mut registry);
    registry
}

async fn run_flow(
    file: PathBuf,
    context: Option<String>,
    entry: Option<String>,
    timeout_ms: Option<u64>,
) -> Result<()> {
    println!("🚀 Loading flow from: {}", file.display());

    let definition = load_definition(&file)?;

    println!("📋 Entry: {}", entry.as_deref().unwrap_or(definition.flow_entry.as_str()));
    println!("   Nodes: {}", definition.nodes.len());
    println!("   Routes: {}", definition.flow.len());
    println!();

    let context: Value = match context {
        Some(raw) => {
            let value: Value = serde_json::from_str(&raw).context("Context must be valid JSON")?;
            if !value.is_object() {
                return Err(anyhow::anyhow!("Context must be a JSON object"));
            }
            value
        }
        None => Value::Object(Default::default()),
    };

    let mut config = RuntimeConfig::from_env();
    if let Some(ms) = timeout_ms {
        config = config.with_node_timeout(Duration::from_millis(ms));
    }

    let runtime = FlowRuntime::with_registry(Arc::new(builtin_registry()), config);

    // Subscribe to events for real-time output
    let mut events = runtime.subscribe_events();

    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ExecutionEvent::FlowStarted { entry, .. } => {
                    println!("▶️  Flow started at {}", entry);
                }
                ExecutionEvent::NodeStarted { node, group_id, .. } => {
                    println!("  ⚡ Starting node: {} (group {})", node, group_id);
                }
                ExecutionEvent::NodeCompleted { node, duration_ms, .. } => {
                    println!("  ✅ Node {} completed in {}ms", node, duration_ms);
                }
                ExecutionEvent::NodeFailed { node, error, .. } => {
                    println!("  ❌ Node {} failed: {}", node, error);
                }
                ExecutionEvent::RunnerForked { node, branches, .. } => {
                    println!("  🔀 {} forked into {}", node, branches.join(", "));
                }
                ExecutionEvent::JoinSatisfied { node, arrivals, .. } => {
                    println!("  🔗 {} joined {}", node, arrivals.join(", "));
                }
                ExecutionEvent::NodeEvent { node, event, .. } => match event {
                    NodeEvent::Info { message } => {
                        println!("     ℹ️  [{}] {}", node, message);
                    }
                    NodeEvent::Warning { message } => {
                        println!("     ⚠️  [{}] {}", node, message);
                    }
                    NodeEvent::Progress { percent, message } => {
                        if let Some(msg) = message {
                            println!("     📊 [{}] {}% - {}", node, percent, msg);
                        } else {
                            println!("     📊 [{}] {}%", node, percent);
                        }
                    }
                    NodeEvent::Data { .. } => {}
                },
                ExecutionEvent::FlowCompleted {
                    failures,
                    duration_ms,
                    ..
                } => {
                    if failures == 0 {
                        println!("✨ Flow completed successfully in {}ms", duration_ms);
                    } else {
                        println!("💥 Flow finished with {} failure(s) after {}ms", failures, duration_ms);
                    }
                    break;
                }
            }
        }
    });

    let result = runtime.start(&definition, context, entry.as_deref()).await?;
    event_task.await?;

    println!();
    println!("📊 Execution Summary:");
    println!("   Execution ID: {}", result.execution_id);
    println!("   Visited: {}/{} nodes", result.results.len(), definition.nodes.len());

    if !result.results.is_empty() {
        println!();
        println!("📤 Results:");
        let mut names: Vec<&String> = result.results.keys().collect();
        names.sort();
        for name in names {
            if let Some(info) = result.result(name) {
                println!("   {}: {}", name, info);
            }
        }
    }

    if !result.is_success() {
        println!();
        println!("❌ Failures:");
        for failure in &result.failures {
            println!("   {}: {}", failure.node, failure.error);
        }
    }

    Ok(())
}

fn validate_flow(file: &Path) -> Result<()> {
    println!("🔍 Validating flow: {}", file.display());

    let definition = load_definition(file)?;
    definition.validate()?;

    println!("✅ Flow is valid:");
    println!("   Entry: {}", definition.flow_entry);
    println!("   Nodes: {}", definition.nodes.len());
    println!("   Routes: {}", definition.flow.len());

    let unreachable = definition.unreachable_nodes();
    if !unreachable.is_empty() {
        println!("⚠️  Unreachable from entry: {}", unreachable.join(", "));
    }

    let registry = builtin_registry();
    let known = registry.list_handler_types();
    let mut sources: Vec<(&String, &String)> = definition
        .nodes
        .iter()
        .filter_map(|(name, spec)| spec.handler_source.as_ref().map(|source| (name, source)))
        .filter(|(_, source)| !known.contains(*source))
        .collect();
    sources.sort();
    for (name, source) in sources {
        println!("⚠️  Node {} uses handler source '{}' which is not built in", name, source);
    }

    Ok(())
}

fn list_handlers() {
    println!("📦 Available Handler Types:");
    println!();

    let registry = builtin_registry();

    for handler_type in registry.list_handler_types() {
        if let Some(metadata) = registry.get_metadata(&handler_type) {
            println!("  • {} ({})", handler_type, metadata.category);
            println!("    {}", metadata.description);
        } else {
            println!("  • {}", handler_type);
        }
    }
}

fn create_example_flow(output: PathBuf) -> Result<()> {
    let definition = FlowDefinition::new("start")
        .with_node(
            "start",
            NodeSpec::custom()
                .with_handler_source("debug.log")
                .with_variable("message", "context.message"),
        )
        .with_node("fanout", NodeSpec::control(ControlType::Parallel))
        .with_node(
            "fetch",
            NodeSpec::custom()
                .with_handler_source("http.request")
                .with_prop("method", "GET")
                .with_variable("url", "context.url"),
        )
        .with_node(
            "wait",
            NodeSpec::custom()
                .with_handler_source("time.delay")
                .with_prop("delay_ms", 250),
        )
        .with_node(
            "merge",
            NodeSpec::control(ControlType::Join).with_trigger(TriggerSpec::all(["fetch", "wait"])),
        )
        .with_node(
            "report",
            NodeSpec::custom()
                .with_handler_source("debug.log")
                .with_variable("message", "results.fetch.body"),
        )
        .route("start", "fanout")
        .route("fanout", ["fetch", "wait"])
        .route("fetch", "merge")
        .route("wait", "merge")
        .route("merge", "report");

    let json = serde_json::to_string_pretty(&definition)?;
    std::fs::write(&output, json)?;

    println!("✨ Created example flow: {}", output.display());
    println!();
    println!("Run it with:");
    println!(
        "  flow run --file {} --context '{{\"message\": \"hello\", \"url\": \"https://api.github.com/zen\"}}'",
        output.display()
    );

    Ok(())
}

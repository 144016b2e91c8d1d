use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};
use tracing_subscriber::EnvFilter;

use xflow::dsl::compute_mappings;
use xflow::template::mask_sensitive;
use xflow::{load_flow, validate_flow, EngineConfig, RuntimeContext, StepDispatcher, WorkflowError};

#[derive(Parser)]
#[command(name = "xflow", version, about = "Run and inspect step-graph workflows")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a flow, or a single step and whatever it depends on
    Run {
        /// Flow document (.json, .yaml, .yml or .toml)
        flow: PathBuf,
        /// Run only this step (plus dependencies that have not succeeded)
        #[arg(long)]
        step: Option<String>,
        /// Engine config file (.json or .toml)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Redact secrets in the printed report
        #[arg(long)]
        mask: bool,
    },
    /// Check a flow document and print diagnostics
    Validate { flow: PathBuf },
    /// Print the token references of every step
    Mappings { flow: PathBuf },
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("Failed to render output: {}", e),
    }
}

async fn run(
    flow: &Path,
    step: Option<&str>,
    config: Option<&Path>,
    mask: bool,
) -> Result<bool, WorkflowError> {
    let engine_config = match config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    let doc = load_flow(flow)?;
    let mut dispatcher = StepDispatcher::from_document(doc, RuntimeContext::new(engine_config))?;

    let outcome = match step {
        Some(key) => dispatcher.run_step(key).await,
        None => dispatcher.run_flow().await.map(|_| ()),
    };
    if let Err(e) = &outcome {
        tracing::error!(error = %e, "Run failed");
    }

    let state = dispatcher.state();
    let steps: Map<String, Value> = state
        .steps()
        .iter()
        .map(|s| {
            let run = state.run_state(&s.key);
            (
                s.key.clone(),
                json!({
                    "status": run.status,
                    "record": run.record,
                }),
            )
        })
        .collect();
    let report = json!({
        "ok": outcome.is_ok(),
        "error": outcome.as_ref().err().map(|e| e.to_string()),
        "steps": steps,
        "outputs": state.outputs().entries(),
        "timeline": state.timeline(),
    });
    print_json(&if mask { mask_sensitive(&report) } else { report });
    Ok(outcome.is_ok())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run {
            flow,
            step,
            config,
            mask,
        } => run(&flow, step.as_deref(), config.as_deref(), mask).await,
        Commands::Validate { flow } => load_flow(&flow).map(|doc| {
            let report = validate_flow(&doc);
            print_json(&json!(report));
            report.is_valid
        }),
        Commands::Mappings { flow } => load_flow(&flow).map(|doc| {
            print_json(&json!(compute_mappings(&doc.steps)));
            true
        }),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

//! CLI command definitions for codeloop.
//!
//! - `run` drives the full debug loop against a live or replayed model
//! - `exec` runs a single response (or raw code) through one round

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tracing::info;

use crate::code::CodeArtifact;
use crate::conversation::{Conversation, LlmConversation};
use crate::debugger::{DebugController, DebugOutcome, LoopConfig, RoundOutcome};
use crate::fault::ExecutionResult;
use crate::llm::{LiteLlmClient, LlmProvider, Message, ReplayProvider};
use crate::metrics::{export_metrics, init_metrics};
use crate::sandbox::WorkspaceManager;

/// Run model-written code under a sandbox policy and debug it until it works.
#[derive(Parser)]
#[command(name = "codeloop")]
#[command(about = "Execute LLM-written code under a policy and debug it with the model")]
#[command(version)]
#[command(
    long_about = "codeloop extracts code from model responses, runs it in a restricted Python \
sandbox and feeds classified faults back to the model until the code produces its outputs.\n\n\
Example usage:\n  codeloop run --config loop.yaml --prompt request.md\n  \
codeloop exec --config loop.yaml response.md"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the debug loop for a code request.
    Run(RunArgs),

    /// Run one response or code file through a single round.
    Exec(ExecArgs),
}

/// Arguments for `codeloop run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Loop configuration (YAML). Defaults plus environment overrides when omitted.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// File holding the code request sent as the first user message.
    #[arg(short, long)]
    pub prompt: PathBuf,

    /// Optional system message file.
    #[arg(short, long)]
    pub system: Option<PathBuf>,

    /// Serve responses from a JSON array of strings instead of a live model.
    #[arg(long)]
    pub replay: Option<PathBuf>,

    /// Model to request (overrides the configuration).
    #[arg(short, long, env = "CODELOOP_MODEL")]
    pub model: Option<String>,

    /// Write the outcome and final conversation to this JSON file.
    #[arg(short, long)]
    pub transcript: Option<PathBuf>,

    /// Print Prometheus metrics after the run.
    #[arg(long)]
    pub print_metrics: bool,
}

/// Arguments for `codeloop exec`.
#[derive(Parser, Debug)]
pub struct ExecArgs {
    /// Loop configuration (YAML) supplying the policy and requirements.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Response text containing one fenced code block, or code with `--raw`.
    pub file: PathBuf,

    /// Treat the file as code instead of a model response.
    #[arg(long)]
    pub raw: bool,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parse arguments and run the selected command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_loop_command(args).await,
        Commands::Exec(args) => run_exec_command(args).await,
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<LoopConfig> {
    let config = match path {
        Some(path) => LoopConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => LoopConfig::from_env().context("Invalid configuration")?,
    };
    Ok(config)
}

fn read_text(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

// ============================================================================
// run
// ============================================================================

#[derive(Serialize)]
struct LoopSummary<'a> {
    status: &'a str,
    attempt_index: usize,
    iteration_index: usize,
    total_iterations: usize,
    result: &'a ExecutionResult,
    code: Option<&'a str>,
}

#[derive(Serialize)]
struct Transcript<'a> {
    outcome: &'a DebugOutcome,
    conversation: &'a [Message],
}

async fn run_loop_command(args: RunArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    if args.print_metrics {
        init_metrics().context("Failed to initialize metrics")?;
    }

    let provider: Arc<dyn LlmProvider> = match &args.replay {
        Some(path) => {
            info!(path = %path.display(), "Using recorded responses");
            Arc::new(ReplayProvider::from_json_file(path)?)
        }
        None => {
            let client = LiteLlmClient::from_env().map_err(|e| {
                anyhow::anyhow!(
                    "Failed to initialize LLM client: {}. Set LITELLM_API_BASE or use --replay.",
                    e
                )
            })?;
            info!(
                api_base = client.api_base(),
                model = client.default_model(),
                authenticated = client.has_api_key(),
                "Using LiteLLM client from environment"
            );
            Arc::new(client)
        }
    };

    let mut messages = Vec::new();
    if let Some(system) = &args.system {
        messages.push(Message::system(read_text(system)?));
    }
    messages.push(Message::user(read_text(&args.prompt)?));

    let mut converser = LlmConversation::new(provider, Conversation::from_messages(messages));
    if let Some(model) = args.model.clone().or_else(|| config.model.clone()) {
        converser = converser.with_model(model);
    }
    if let Some(temperature) = config.temperature {
        converser = converser.with_temperature(temperature);
    }

    let mut controller = DebugController::new(config);
    let outcome = controller.run(&mut converser).await?;
    let conversation = converser.into_conversation();

    let summary = LoopSummary {
        status: outcome.status.as_str(),
        attempt_index: outcome.attempt_index,
        iteration_index: outcome.iteration_index,
        total_iterations: outcome.total_iterations,
        result: &outcome.result,
        code: outcome.code.as_ref().map(|c| c.source()),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if let Some(path) = &args.transcript {
        let transcript = Transcript {
            outcome: &outcome,
            conversation: conversation.messages(),
        };
        fs::write(path, serde_json::to_string_pretty(&transcript)?)
            .with_context(|| format!("Failed to write transcript to {}", path.display()))?;
        info!(path = %path.display(), "Transcript written");
    }

    if args.print_metrics {
        print!("{}", export_metrics());
    }

    if !outcome.is_success() {
        anyhow::bail!(
            "Gave up after {} iterations: {}",
            outcome.total_iterations,
            outcome
                .result
                .fault()
                .map(|f| f.message())
                .unwrap_or_default()
        );
    }
    Ok(())
}

// ============================================================================
// exec
// ============================================================================

#[derive(Serialize)]
struct ExecSummary<'a> {
    result: &'a ExecutionResult,
    response_id: Option<&'a str>,
    duration_secs: Option<f64>,
    stdout: &'a str,
    stderr: &'a str,
}

async fn run_exec_command(args: ExecArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let text = read_text(&args.file)?;

    let workspaces = WorkspaceManager::new(&config.policy)?;
    let controller = DebugController::new(config);

    let round: RoundOutcome = if args.raw {
        let workspace = workspaces.fresh_round()?;
        controller
            .run_artifact(CodeArtifact::from_source(text), &workspace)
            .await?
    } else {
        controller.run_round(&text, &workspaces).await?
    };

    let summary = ExecSummary {
        result: &round.result,
        response_id: round.artifact.as_ref().map(|a| a.response_id()),
        duration_secs: round.duration.map(|d| d.as_secs_f64()),
        stdout: &round.stdout,
        stderr: &round.stderr,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if let Some(fault) = round.result.fault() {
        anyhow::bail!("{}", fault.describe());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_command() {
        let cli = Cli::try_parse_from([
            "codeloop",
            "run",
            "--config",
            "loop.yaml",
            "--prompt",
            "request.md",
            "--replay",
            "responses.json",
            "--print-metrics",
        ])
        .unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.prompt, PathBuf::from("request.md"));
                assert_eq!(args.replay, Some(PathBuf::from("responses.json")));
                assert!(args.print_metrics);
            }
            Commands::Exec(_) => panic!("expected run"),
        }
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_parse_exec_command() {
        let cli =
            Cli::try_parse_from(["codeloop", "-l", "debug", "exec", "--raw", "code.py"]).unwrap();
        match cli.command {
            Commands::Exec(args) => {
                assert!(args.raw);
                assert_eq!(args.file, PathBuf::from("code.py"));
                assert!(args.config.is_none());
            }
            Commands::Run(_) => panic!("expected exec"),
        }
        assert_eq!(cli.log_level, "debug");
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("loop.yaml");
        fs::write(&path, "max_attempts: 2\npermitted_packages: [pandas]\n").unwrap();

        let config = load_config(Some(path.as_path())).unwrap();
        assert_eq!(config.permitted_packages, vec!["pandas"]);

        let missing = dir.path().join("missing.yaml");
        assert!(load_config(Some(missing.as_path())).is_err());
    }
}

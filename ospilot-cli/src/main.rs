//! Ospilot CLI - natural-language commands for your desktop.
//!
//! One-shot commands, an interactive chat loop, and views over the
//! conversation and tool-call audit trail.

#![allow(clippy::print_stdout)] // CLI program intentionally uses stdout

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ospilot::config;
use ospilot::prelude::*;
use ospilot::store::ConversationRecord;
use ospilot::timer::TimerEvent;
use ospilot::tool::RetryConfig;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Ospilot - drive your OS with plain English through a local Ollama model
#[derive(Parser)]
#[command(name = "ospilot")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file path
    #[arg(short, long, env = "OSPILOT_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Model to use (overrides config and the saved choice)
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Ollama server URL (overrides config)
    #[arg(long, global = true)]
    ollama_url: Option<String>,

    /// State database path (overrides config)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Carry out one command
    Run(RunArgs),

    /// Start an interactive session
    Chat,

    /// List the models the server offers
    Models,

    /// Show conversation and tool-call statistics
    Stats,

    /// Show recent conversations
    History(HistoryArgs),

    /// Export the whole state database as JSON
    Export(ExportArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

/// Arguments for the run command
#[derive(Args)]
struct RunArgs {
    /// The command, e.g. "set volume to 40 after 10 seconds"
    #[arg(required = true, trailing_var_arg = true)]
    command: Vec<String>,

    /// Validate the model reply against this schema
    #[arg(short, long)]
    schema: Option<String>,

    /// Wait for scheduled actions to run before exiting
    #[arg(short, long)]
    wait: bool,

    /// Print the outcome as JSON
    #[arg(long)]
    json: bool,
}

/// Arguments for the history command
#[derive(Args)]
struct HistoryArgs {
    /// Number of conversations to show
    #[arg(short = 'n', long, default_value_t = 10)]
    limit: usize,
}

/// Arguments for the export command
#[derive(Args)]
struct ExportArgs {
    /// Output file
    path: PathBuf,
}

/// Arguments for the config command
#[derive(Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Show configuration file path
    Path,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("failed to create tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize logging with the given verbosity level.
fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "ospilot={level},ospilot_cli={level},{}",
            if verbosity >= 2 { "debug" } else { "warn" }
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbosity >= 2)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli).await?;
    match cli.command {
        Commands::Run(ref args) => cmd_run(&cli, &config, args).await,
        Commands::Chat => cmd_chat(&cli, &config).await,
        Commands::Models => cmd_models(&cli, &config).await,
        Commands::Stats => cmd_stats(&cli, &config).await,
        Commands::History(ref args) => cmd_history(&cli, &config, args.limit).await,
        Commands::Export(ref args) => cmd_export(&cli, &config, &args.path).await,
        Commands::Config(ref args) => cmd_config(&cli, config, &args.command).await,
    }
}

/// File, then environment, then flags.
async fn load_config(cli: &Cli) -> Result<Config> {
    let config = match &cli.config {
        Some(path) if path.exists() => Config::load(path)
            .await
            .with_context(|| format!("failed to load {}", path.display()))?,
        Some(_) => Config::default(),
        None => Config::load_default()
            .await
            .context("failed to load configuration")?,
    };

    let mut config = config.with_env();
    if let Some(model) = &cli.model {
        config.ollama.model.clone_from(model);
    }
    if let Some(url) = &cli.ollama_url {
        config.ollama.base_url = url.trim_end_matches('/').to_owned();
    }
    if let Some(db) = &cli.db {
        config.store.path = Some(db.clone());
    }
    config.validate()?;
    Ok(config)
}

/// The pieces a command needs.
struct Session {
    agent: CommandAgent,
    timers: TimerManager,
}

async fn open_session(cli: &Cli, config: &Config, stream_to_stdout: bool) -> Result<Session> {
    let db_path = config.store.resolved_path();
    let store = StateStore::open(&db_path)
        .await
        .with_context(|| format!("failed to open {}", db_path.display()))?;

    let client = OllamaClient::builder()
        .base_url(&config.ollama.base_url)
        .timeout_secs(config.ollama.request_timeout_secs)
        .stream_timeout_secs(config.ollama.stream_timeout_secs)
        .build();

    let actions = SystemActions::dry_run();
    let timers = actions.timers().clone();
    let caller = ToolCaller::new(actions)
        .with_store(store.clone())
        .with_retry(RetryConfig::from(&config.retry));

    let mut builder = CommandAgent::builder(Arc::new(client))
        .caller(Arc::new(caller))
        .store(store)
        .config(config.agent.clone())
        .model(&config.ollama.model);
    if stream_to_stdout {
        builder = builder.on_chunk(|chunk| {
            print!("{chunk}");
            std::io::stdout().flush().ok();
        });
    }
    let agent = builder.build();

    if cli.model.is_none()
        && let Some(model) = agent.load_saved_model().await?
    {
        tracing::debug!(model = %model, "Using saved model");
    }

    Ok(Session { agent, timers })
}

/// Print timer completions as they happen.
fn watch_timers(timers: &TimerManager) -> tokio::task::JoinHandle<()> {
    let mut events = timers.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                TimerEvent::Finished {
                    timer_id,
                    total_seconds,
                } => println!("\n[timer] {timer_id} finished ({total_seconds}s)"),
            }
        }
    })
}

fn print_outcome(outcome: &CommandOutcome) {
    println!("[{}] {}", outcome.status(), outcome.message());
    match outcome {
        CommandOutcome::Executed(result) => {
            if let Some(error) = &result.error
                && error != &result.message
            {
                println!("  error: {error}");
            }
            if let Some(data) = &result.data {
                println!("  data: {data}");
            }
        }
        CommandOutcome::Scheduled {
            schedule_id,
            function,
            ..
        } => println!("  {function} scheduled as {schedule_id}"),
        CommandOutcome::Error {
            error: Some(error),
            ..
        } => println!("  error: {error}"),
        _ => {}
    }
}

/// Carry out one command.
async fn cmd_run(cli: &Cli, config: &Config, args: &RunArgs) -> Result<()> {
    let Session { agent, timers } = open_session(cli, config, false).await?;
    let input = args.command.join(" ");

    let outcome = match &args.schema {
        Some(schema) => agent.execute_command_with_schema(&input, schema).await,
        None => agent.execute_command(&input).await,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome);
    }

    if args.wait && !agent.pending_scheduled().is_empty() {
        let watcher = watch_timers(&timers);
        println!("Waiting for scheduled actions. Press Ctrl+C to cancel.");
        tokio::select! {
            results = agent.wait_scheduled() => {
                for result in results {
                    println!("[{}] {}: {}", result.status, result.function, result.message);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                for id in agent.pending_scheduled() {
                    agent.cancel_scheduled(id);
                }
                println!("\nCancelled.");
            }
        }
        watcher.abort();
    }

    Ok(())
}

/// Interactive loop. Plain text chats; `/do <command>` runs a command.
async fn cmd_chat(cli: &Cli, config: &Config) -> Result<()> {
    let streaming = config.agent.use_streaming;
    let Session { agent, timers } = open_session(cli, config, streaming).await?;
    let watcher = watch_timers(&timers);

    println!("Ospilot chat | model {} | type 'exit' to quit", agent.model());
    println!("  /do <command>   carry out a command");
    println!("  /model <name>   switch model");
    println!("  /pending        list scheduled actions");
    println!("  Ctrl+C          stop a streamed reply");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        let input = line.trim();

        match input {
            "" => continue,
            "exit" | "quit" => break,
            "/pending" => {
                let pending = agent.pending_scheduled();
                if pending.is_empty() {
                    println!("Nothing scheduled.");
                }
                for id in pending {
                    println!("  {id}");
                }
                continue;
            }
            _ => {}
        }

        if let Some(command) = input.strip_prefix("/do ") {
            print_outcome(&agent.execute_command(command.trim()).await);
        } else if let Some(model) = input.strip_prefix("/model ") {
            if agent.set_model(model.trim()).await? {
                println!("Switched to {}", agent.model());
            } else {
                println!("Model '{}' is not available.", model.trim());
            }
        } else {
            let chat = agent.chat(input);
            tokio::pin!(chat);
            let reply = loop {
                tokio::select! {
                    reply = &mut chat => break reply,
                    _ = tokio::signal::ctrl_c() => agent.stop_stream(),
                }
            };
            if streaming {
                println!();
            } else {
                println!("{reply}");
            }
        }
        println!();
    }

    let pending = agent.pending_scheduled();
    if !pending.is_empty() {
        println!("Cancelling {} scheduled action(s).", pending.len());
        for id in pending {
            agent.cancel_scheduled(id);
        }
    }
    watcher.abort();
    Ok(())
}

/// List models.
async fn cmd_models(cli: &Cli, config: &Config) -> Result<()> {
    let Session { agent, .. } = open_session(cli, config, false).await?;
    let models = agent.available_models().await;
    if models.is_empty() {
        println!("No models found at {}.", config.ollama.base_url);
        return Ok(());
    }

    let current = agent.model();
    for model in models {
        let marker = if model == current { "*" } else { " " };
        println!("{marker} {model}");
    }
    Ok(())
}

/// Show statistics.
async fn cmd_stats(cli: &Cli, config: &Config) -> Result<()> {
    let Session { agent, .. } = open_session(cli, config, false).await?;
    let stats = agent.statistics().await?;
    let tools = agent.tool_statistics().await?;

    println!("Conversations: {}", stats.total_conversations);
    println!("Tool calls:    {}", stats.total_tool_calls);
    println!("Avg response:  {:.1} ms", stats.avg_response_time_ms);
    if !stats.models_used.is_empty() {
        println!();
        println!("Models:");
        for (model, count) in &stats.models_used {
            println!("  {model}: {count}");
        }
    }

    println!();
    println!("Tool calls:");
    println!("  Success rate: {:.0}%", tools.success_rate * 100.0);
    println!("  Avg time:     {:.1} ms", tools.avg_execution_time_ms);
    for (status, count) in &tools.by_status {
        println!("  {status}: {count}");
    }
    if !tools.most_used_functions.is_empty() {
        println!();
        println!("Most used:");
        for usage in &tools.most_used_functions {
            println!("  {}: {}", usage.function, usage.count);
        }
    }
    Ok(())
}

fn print_conversation(record: &ConversationRecord) {
    let status = record.execution_status.as_deref().unwrap_or("-");
    println!("{} [{status}] {}", record.timestamp, record.user_input);
    if let Some(function) = &record.function_called {
        println!("    -> {function}");
    }
    if let Some(error) = &record.error_message {
        println!("    error: {error}");
    }
}

/// Show recent conversations.
async fn cmd_history(cli: &Cli, config: &Config, limit: usize) -> Result<()> {
    let Session { agent, .. } = open_session(cli, config, false).await?;
    let records = agent.conversation_history(limit).await?;
    if records.is_empty() {
        println!("No conversations yet.");
    }
    for record in &records {
        print_conversation(record);
    }
    Ok(())
}

/// Export the store.
async fn cmd_export(cli: &Cli, config: &Config, path: &Path) -> Result<()> {
    let Session { agent, .. } = open_session(cli, config, false).await?;
    let document = agent.export(path).await?;
    println!(
        "Exported {} conversations and {} tool calls to {}",
        document.conversations.len(),
        document.tool_calls.len(),
        path.display()
    );
    Ok(())
}

/// Configuration management.
async fn cmd_config(cli: &Cli, effective: Config, command: &ConfigCommands) -> Result<()> {
    let config_file = cli.config.clone().unwrap_or_else(config::default_path);

    match command {
        ConfigCommands::Path => {
            println!("{}", config_file.display());
        }
        ConfigCommands::Show => {
            println!("{}", serde_json::to_string_pretty(&effective)?);
        }
        ConfigCommands::Init { force } => {
            if config_file.exists() && !force {
                println!("Configuration already exists at: {}", config_file.display());
                println!("Use --force to overwrite.");
                return Ok(());
            }
            Config::default().save(&config_file).await?;
            println!("Configuration created: {}", config_file.display());
        }
    }

    Ok(())
}

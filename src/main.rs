//! ThemeForge CLI.
//!
//! - `chat` (default): interactive loop, one orchestration per query
//! - `run <prompt>`: a single orchestration
//! - `tools`: list the discovered tools

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use themeforge::agent_core::{Orchestrator, RunOutcome};
use themeforge::config::{AppConfig, Overrides};
use themeforge::inference::InferenceClient;
use themeforge::mcp_client::{CatalogCache, ToolCatalog};

/// Tools are discovered once per process and shared by every run.
static CATALOG: CatalogCache = CatalogCache::new();

#[derive(Parser)]
#[command(name = "themeforge", version)]
#[command(about = "Turn a design into a publishable storefront theme")]
struct Args {
    /// Path to themeforge.yaml
    #[arg(long, env = "THEMEFORGE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Model identifier
    #[arg(long, env = "THEMEFORGE_MODEL", global = true)]
    model: Option<String>,

    /// Sampling temperature in [0, 2]
    #[arg(long, global = true)]
    temperature: Option<f32>,

    /// Store the theme is pushed to
    #[arg(long, env = "SHOPIFY_FLAG_STORE", global = true)]
    store: Option<String>,

    /// Directory the theme files are written to
    #[arg(long, global = true)]
    artifact_dir: Option<PathBuf>,

    /// Write the theme files but skip the publish command
    #[arg(long, global = true)]
    no_publish: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive session (default)
    Chat,
    /// Run a single prompt and exit
    Run {
        /// Opening message, e.g. a design URL and an instruction
        prompt: String,
    },
    /// List the tools the configured providers expose
    Tools,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Err(e) = themeforge::init_tracing() {
        eprintln!("warning: file logging disabled: {e}");
    }

    let mut config = AppConfig::load(args.config.as_deref()).context("loading configuration")?;
    config.apply_overrides(Overrides {
        model: args.model,
        temperature: args.temperature,
        store: args.store,
        artifact_dir: args.artifact_dir,
        no_publish: args.no_publish,
    });

    let command = args.command.unwrap_or(Command::Chat);
    if !matches!(command, Command::Tools) {
        config.validate().context("invalid configuration")?;
    }

    let catalog = CATALOG
        .get_or_discover(
            &config.providers,
            config.orchestrator.discovery_policy,
            config.tool_call_timeout(),
        )
        .await
        .context("tool discovery failed")?;

    let result = match command {
        Command::Tools => {
            print_tools(&catalog);
            Ok(())
        }
        Command::Run { prompt } => {
            let orchestrator = build_orchestrator(&config, Arc::clone(&catalog))?;
            let interrupts = Interrupts::default();
            interrupts.listen();
            run_once(&orchestrator, &interrupts, &prompt).await
        }
        Command::Chat => {
            let orchestrator = build_orchestrator(&config, Arc::clone(&catalog))?;
            let interrupts = Interrupts::default();
            interrupts.listen();
            chat_loop(&orchestrator, &interrupts).await
        }
    };

    CATALOG.shutdown().await;
    tracing::info!("=== ThemeForge exiting ===");
    result
}

fn build_orchestrator(config: &AppConfig, catalog: Arc<ToolCatalog>) -> Result<Orchestrator> {
    let gateway = InferenceClient::new(config.model.clone()).context("building model client")?;
    tracing::info!(
        model = %gateway.model_name(),
        base_url = %gateway.base_url(),
        "model gateway ready"
    );
    Ok(Orchestrator::new(
        Arc::new(gateway),
        catalog,
        Arc::new(config.publisher()),
        config.orchestrator_config(),
    ))
}

fn print_tools(catalog: &ToolCatalog) {
    let descriptors = catalog.descriptors();
    if descriptors.is_empty() {
        println!("No tools discovered.");
        return;
    }
    for tool in descriptors {
        println!("{} ({})", tool.name, tool.provider);
        if !tool.description.is_empty() {
            println!("    {}", tool.description);
        }
    }
}

// ─── Interrupts ─────────────────────────────────────────────────────────────

/// Routes Ctrl-C for the whole process: it cancels the run in flight, or
/// ends the session when no run is active.
#[derive(Clone, Default)]
struct Interrupts {
    active: Arc<Mutex<Option<CancellationToken>>>,
    shutdown: CancellationToken,
}

impl Interrupts {
    /// Install the single Ctrl-C listener. It lives until the process exits.
    fn listen(&self) {
        let interrupts = self.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                interrupts.interrupt();
            }
        });
    }

    fn begin_run(&self) -> CancellationToken {
        let cancel = CancellationToken::new();
        *self.active() = Some(cancel.clone());
        cancel
    }

    fn end_run(&self) {
        self.active().take();
    }

    fn interrupt(&self) {
        match self.active().take() {
            Some(run) => {
                tracing::info!("interrupt received, cancelling the current run");
                run.cancel();
            }
            None => {
                tracing::info!("interrupt received while idle, ending the session");
                self.shutdown.cancel();
            }
        }
    }

    fn active(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Run one prompt; Ctrl-C cancels the run rather than the process.
async fn run_prompt(
    orchestrator: &Orchestrator,
    interrupts: &Interrupts,
    prompt: &str,
) -> Result<RunOutcome> {
    let cancel = interrupts.begin_run();
    let outcome = orchestrator.run_prompt(prompt, &cancel).await;
    interrupts.end_run();
    Ok(outcome?)
}

async fn run_once(orchestrator: &Orchestrator, interrupts: &Interrupts, prompt: &str) -> Result<()> {
    let outcome = run_prompt(orchestrator, interrupts, prompt).await?;
    print_outcome(&outcome);
    match &outcome.publish {
        Some(publish) if !publish.success => anyhow::bail!("theme publish failed"),
        _ => Ok(()),
    }
}

/// Reads stdin on a dedicated thread, so leaving the session never waits on a
/// pending read.
fn stdin_lines() -> mpsc::UnboundedReceiver<std::io::Result<String>> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

async fn chat_loop(orchestrator: &Orchestrator, interrupts: &Interrupts) -> Result<()> {
    let mut lines = stdin_lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"Enter your query: ").await?;
        stdout.flush().await?;

        let line = tokio::select! {
            biased;
            _ = interrupts.shutdown.cancelled() => {
                stdout.write_all(b"\n").await?;
                break;
            }
            line = lines.recv() => line.transpose()?,
        };
        let Some(line) = line else {
            break;
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if is_exit_command(query) {
            break;
        }

        match run_prompt(orchestrator, interrupts, query).await {
            Ok(outcome) => print_outcome(&outcome),
            Err(e) => eprintln!("error: {e:#}"),
        }
    }
    Ok(())
}

fn print_outcome(outcome: &RunOutcome) {
    match outcome.final_reply() {
        Some(reply) => println!("{reply}"),
        None => println!("(no reply)"),
    }
}

fn is_exit_command(input: &str) -> bool {
    matches!(input.trim().to_lowercase().as_str(), "quit" | "exit" | "q")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_commands() {
        for input in ["quit", "EXIT", " q ", "Quit"] {
            assert!(is_exit_command(input), "{input:?}");
        }
        for input in ["", "quite", "generate a theme"] {
            assert!(!is_exit_command(input), "{input:?}");
        }
    }

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from([
            "themeforge",
            "--store",
            "shop",
            "--no-publish",
            "run",
            "Generate a theme for a minimal blog",
        ]);
        assert_eq!(args.store.as_deref(), Some("shop"));
        assert!(args.no_publish);
        assert!(matches!(args.command, Some(Command::Run { ref prompt }) if prompt.starts_with("Generate")));

        let args = Args::parse_from(["themeforge"]);
        assert!(args.command.is_none());
    }

    #[test]
    fn test_interrupt_cancels_active_run_only() {
        let interrupts = Interrupts::default();
        let first = interrupts.begin_run();
        interrupts.interrupt();
        assert!(first.is_cancelled());
        assert!(!interrupts.shutdown.is_cancelled());

        // The next run starts with a fresh token.
        let second = interrupts.begin_run();
        assert!(!second.is_cancelled());
        interrupts.end_run();
        assert!(!second.is_cancelled());
    }

    #[test]
    fn test_interrupt_while_idle_ends_session() {
        let interrupts = Interrupts::default();
        let run = interrupts.begin_run();
        interrupts.end_run();

        interrupts.interrupt();
        assert!(interrupts.shutdown.is_cancelled());
        assert!(!run.is_cancelled());
    }

    #[test]
    fn test_second_interrupt_during_run_ends_session() {
        let interrupts = Interrupts::default();
        let run = interrupts.begin_run();
        interrupts.interrupt();
        interrupts.interrupt();
        assert!(run.is_cancelled());
        assert!(interrupts.shutdown.is_cancelled());
    }
}

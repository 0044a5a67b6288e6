//! # rlm CLI
//!
//! Command-line interface for running a recursive language model.
//!
//! Usage:
//!   rlm <task>
//!   rlm --file <path> [question]
//!   rlm                       (interactive, `/bye` to quit)
//!
//! Examples:
//!   rlm "How many words are in this sentence?"
//!   rlm --file report.txt "List every date mentioned in the context"
//!   rlm --provider local --base-url http://localhost:8000/v1 --model qwen2.5-coder

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use rlm_agent::{load_config, Orchestrator, RlmConfig, RunOutcome};
use rlm_runtime::ProviderType;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "rlm")]
#[command(author, version, about = "rlm - solve long-context tasks through a persistent Python REPL")]
struct Cli {
    /// Task to solve; omit to start an interactive session
    #[arg(trailing_var_arg = true)]
    task: Vec<String>,

    /// Read the task context from a file (the TASK words are appended as the question)
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// TOML config file
    #[arg(short, long, default_value = "rlm.toml")]
    config: PathBuf,

    /// API key for the backend
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Model name, e.g. 'openai/gpt-4o'
    #[arg(short, long)]
    model: Option<String>,

    /// Backend kind: openrouter, openai or local
    #[arg(long)]
    provider: Option<ProviderType>,

    /// Override the backend base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Maximum iterations per task
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Maximum nesting depth for sub_rlm calls
    #[arg(long)]
    max_depth: Option<usize>,

    /// Python interpreter used for the REPL
    #[arg(long)]
    python: Option<String>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    /// Flags win over the config file
    fn apply(&self, config: &mut RlmConfig) {
        if let Some(kind) = self.provider {
            config.provider.provider_type = kind;
            config.provider.base_url = kind.default_base_url().map(String::from);
        }
        if let Some(key) = &self.api_key {
            config.provider.api_key = Some(key.clone());
        }
        if let Some(model) = &self.model {
            config.provider.default_model = Some(model.clone());
        }
        if let Some(url) = &self.base_url {
            config.provider.base_url = Some(url.clone());
        }
        if let Some(n) = self.max_iterations {
            config.max_iterations = n;
        }
        if let Some(depth) = self.max_depth {
            config.max_depth = depth;
        }
        if let Some(python) = &self.python {
            config.kernel.python = python.clone();
        }
    }

    fn task(&self) -> Result<Option<String>> {
        let question = self.task.join(" ");
        match &self.file {
            Some(path) => {
                let context = std::fs::read_to_string(path)
                    .with_context(|| format!("read {}", path.display()))?;
                if question.is_empty() {
                    Ok(Some(context))
                } else {
                    Ok(Some(format!("{}\n\n{}", context, question)))
                }
            }
            None if question.is_empty() => Ok(None),
            None => Ok(Some(question)),
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "rlm_agent=info,rlm_runtime=info,warn",
        _ => "rlm_agent=debug,rlm_runtime=debug,rlm::kernel=debug,info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

fn print_outcome(outcome: RunOutcome) -> bool {
    match outcome {
        RunOutcome::Answered(answer) => {
            println!("{}", answer);
            true
        }
        RunOutcome::Exhausted(diagnostic) => {
            eprintln!("No answer: {}", diagnostic);
            false
        }
    }
}

async fn run_once(task: String, config: RlmConfig) -> Result<bool> {
    let mut rlm = Orchestrator::new(task, config).await?;
    let outcome = rlm.run().await;
    rlm.shutdown().await?;
    Ok(print_outcome(outcome?))
}

async fn interactive(config: RlmConfig) -> Result<bool> {
    let mut rlm = Orchestrator::new("", config).await?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let ok = loop {
        print!("> Prompt: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else { break true };
        let prompt = line.trim();
        if prompt == "/bye" {
            eprintln!("Goodbye");
            break true;
        }
        if prompt.is_empty() {
            continue;
        }

        rlm.reset_prompt(prompt).await?;
        let outcome = match rlm.run().await {
            Ok(outcome) => outcome,
            Err(e) => {
                eprintln!("Error: {}", e);
                break false;
            }
        };
        if !print_outcome(outcome) {
            break false;
        }
        rlm.reset_answer().await?;
    };

    rlm.shutdown().await?;
    Ok(ok)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = load_config(&cli.config)?;
    cli.apply(&mut config);
    config.validate()?;
    tracing::debug!(
        provider = config.provider.provider_type.as_str(),
        max_iterations = config.max_iterations,
        max_depth = config.max_depth,
        "configuration loaded"
    );

    let ok = match cli.task()? {
        Some(task) => run_once(task, config).await,
        None => interactive(config).await,
    };

    match ok {
        Ok(true) => Ok(()),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

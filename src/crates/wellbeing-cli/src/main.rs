//! # wellbeing
//!
//! Interactive wellbeing action plan assistant.
//!
//! ```text
//! OPENAI_API_KEY=... TAVILY_API_KEY=... wellbeing --checkpoint-dir .sessions
//! ```
//!
//! With `--checkpoint-dir`, an interrupted session is picked up again by
//! running the same `--thread`.

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use llm::remote::OpenAiClient;
use serde_json::Value;
use stategraph_core::checkpoint::{CheckpointSaver, FileCheckpointSaver, InMemoryCheckpointSaver};
use stategraph_core::{RunContext, RunInput};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use wellbeing_cli::graphs::assistant;
use wellbeing_cli::search::{TavilySearch, WikipediaSearch};
use wellbeing_cli::{console::ConsoleSink, session, AppConfig, Collaborators, ConsoleFeedback, Session};

const DEFAULT_PROBLEM: &str =
    "I'm feeling very stressed at work, because I don't like being surrounded by many people in an open office.";

#[derive(Parser)]
#[command(name = "wellbeing")]
#[command(about = "Personalised wellbeing action plans, drafted with your feedback", long_about = None)]
#[command(version)]
struct Cli {
    /// Session identifier; reuse it to resume an unfinished session
    #[arg(short, long, default_value = "1")]
    thread: String,

    /// Maximum number of steps in the plan
    #[arg(long, default_value_t = 3)]
    max_steps: u32,

    /// Review cycles in planning and exchanges per consultation
    #[arg(long, default_value_t = 2)]
    max_cycles: u32,

    /// Persist checkpoints to this directory instead of memory
    #[arg(long)]
    checkpoint_dir: Option<PathBuf>,

    /// Problem to work on; prompted for when omitted
    #[arg(short, long)]
    problem: Option<String>,

    /// Steps a single graph run may take
    #[arg(long)]
    step_limit: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env().map_err(|e| anyhow::anyhow!("{}", e.to_string().red()))?;

    let deps = Collaborators {
        chat: Arc::new(OpenAiClient::new(config.chat_llm())?),
        fast: Arc::new(OpenAiClient::new(config.fast_llm())?),
        web: Arc::new(TavilySearch::new(&config.tavily_api_key)?),
        wiki: Arc::new(WikipediaSearch::new()?),
    };

    let saver: Arc<dyn CheckpointSaver> = match &cli.checkpoint_dir {
        Some(dir) => Arc::new(
            FileCheckpointSaver::new(dir)
                .await
                .with_context(|| format!("opening checkpoint directory {}", dir.display()))?,
        ),
        None => Arc::new(InMemoryCheckpointSaver::new()),
    };

    let step_limit = cli
        .step_limit
        .unwrap_or_else(|| assistant::step_limit_for(cli.max_cycles));
    let graph = assistant::build(&deps, step_limit)?.with_checkpointer(saver);

    println!("{}", "\n*** Welcome to the Wellbeing Assistant! ***\n".cyan());

    let probe = Session::new(graph.clone(), cli.thread.clone(), RunContext::new());
    let input = if probe.in_progress().await? {
        println!("Resuming session {}.\n", cli.thread.yellow());
        if let Some(warning) = ignored_problem_warning(&cli.thread, cli.problem.as_deref()) {
            eprintln!("{}", warning.yellow());
        }
        RunInput::Continue
    } else {
        let problem = match cli.problem {
            Some(problem) => problem,
            None => ask_for_problem().await?,
        };
        RunInput::Start(assistant::input(&problem, cli.max_steps, cli.max_cycles))
    };

    // The clock starts once the user has described the problem.
    let ctx = RunContext::new().with_sink(Arc::new(ConsoleSink));
    let session = Session::new(graph, cli.thread, ctx);
    let state = session.drive(input, &mut ConsoleFeedback).await?;

    match state.get("final_plan").and_then(Value::as_str) {
        Some(plan) => println!("\n{}", plan),
        None => anyhow::bail!("the session finished without a final plan"),
    }
    Ok(())
}

/// Warning for a `--problem` that a resumed session cannot use.
fn ignored_problem_warning(thread: &str, problem: Option<&str>) -> Option<String> {
    problem.map(|_| {
        format!(
            "Session {} is still in progress, so --problem is ignored. Use another --thread to start over.",
            thread
        )
    })
}

async fn ask_for_problem() -> anyhow::Result<String> {
    println!(
        "Describe your wellbeing challenge or press {} for the {}\nDefault input: {}\n",
        "[enter]".yellow(),
        "default demo input.".yellow(),
        format!("\"{}\"", DEFAULT_PROBLEM).yellow()
    );
    print!("> ");
    std::io::Write::flush(&mut std::io::stdout())?;

    let line = session::read_line().await?;
    if line.trim().is_empty() {
        Ok(DEFAULT_PROBLEM.to_string())
    } else {
        Ok(line.trim().to_string())
    }
}

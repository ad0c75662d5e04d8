#![allow(clippy::print_stdout, clippy::print_stderr)]

use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use datapilot_core::api::Client;
use datapilot_core::app::{self, RunOptions};
use datapilot_core::config::Config;
use datapilot_core::datasets::DatasetResolver;
use datapilot_core::session::SessionEvent;

#[derive(Parser)]
#[command(name = "datapilot", version, about = "Agentic data analysis from the command line")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an analysis goal against one or more datasets
    Run {
        /// Natural-language description of the analysis or modeling goal
        goal: String,

        /// Dataset to bind (catalog name or path); repeat for several
        #[arg(short, long = "dataset", required = true)]
        datasets: Vec<String>,

        /// Model identifier (overrides DATAPILOT_MODEL)
        #[arg(long)]
        model: Option<String>,

        /// Cap on generate steps (overrides DATAPILOT_MAX_ITERATIONS)
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Skip the planning preamble in the system prompt
        #[arg(long)]
        no_planning: bool,
    },

    /// List catalog datasets
    Datasets,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let exit_code = match cli.command {
        Commands::Run {
            goal,
            datasets,
            model,
            max_iterations,
            no_planning,
        } => run(goal, datasets, model, max_iterations, no_planning).await,
        Commands::Datasets => list_datasets(),
    };
    std::process::exit(exit_code);
}

async fn run(
    goal: String,
    datasets: Vec<String>,
    model: Option<String>,
    max_iterations: Option<u32>,
    no_planning: bool,
) -> i32 {
    let mut config = Config::from_env();
    if let Some(model) = model {
        config.model = model;
    }
    if let Some(max_iterations) = max_iterations {
        config.max_iterations = max_iterations;
    }

    let client = match Client::from_config(&config) {
        Ok(client) => client,
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            return 1;
        }
    };

    let (event_tx, mut event_rx) = mpsc::channel::<SessionEvent>(64);
    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            print_event(&event);
        }
    });

    let token = CancellationToken::new();
    let options = RunOptions {
        goal,
        datasets,
        planning_mode: !no_planning,
    };

    let result = app::run_analysis(&config, client, options, event_tx, token).await;
    printer.await.ok();

    match result {
        Ok(report) => {
            println!();
            println!("{}", "Run complete".green().bold());
            println!("  run id:     {}", report.run_id);
            println!("  iterations: {}", report.iterations);
            println!("  fragments:  {}", report.executed_fragments);
            println!("  figures:    {}", report.figures_captured);
            println!("  notebook:   {}", report.artifacts.notebook_path.display());
            println!(
                "  transcript: {}",
                report.artifacts.transcript_path.display()
            );
            0
        }
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            1
        }
    }
}

fn list_datasets() -> i32 {
    let config = Config::from_env();
    let resolver = DatasetResolver::new(&config.datasets_dir);
    let available = resolver.list_available();
    if available.is_empty() {
        println!(
            "no datasets found in {}",
            config.datasets_dir.display()
        );
    } else {
        for name in available {
            println!("{name}");
        }
    }
    0
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::Status { stage } => {
            println!("{} {stage}", "status:".dimmed());
        }
        SessionEvent::Plan { content } => {
            println!("\n{}\n{content}\n", "plan".cyan().bold());
        }
        SessionEvent::Thinking { content } => {
            println!("\n{}\n{content}\n", "thinking".dimmed().bold());
        }
        SessionEvent::ExecutingTool { name, .. } => {
            println!("{} {name}", "tool:".yellow());
        }
        SessionEvent::Code {
            index,
            code,
            stdout,
            error,
            success,
        } => {
            let marker = if *success {
                format!("[{index}]").green()
            } else {
                format!("[{index}]").red()
            };
            println!("\n{marker} {}", "code".bold());
            println!("{code}");
            if !stdout.is_empty() {
                println!("{}\n{stdout}", "output:".dimmed());
            }
            if let Some(error) = error {
                println!("{}\n{error}", "error:".red());
            }
        }
        SessionEvent::Figure { sequence, .. } => {
            println!("{} figure {}", "captured".magenta(), sequence + 1);
        }
        SessionEvent::Solution { content } => {
            println!("\n{}\n{content}", "solution".green().bold());
        }
    }
}

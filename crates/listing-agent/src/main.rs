// Copyright 2026 Listing Agent Contributors
// SPDX-License-Identifier: MIT

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use listing_agent::cli;
use listing_agent::config::AgentConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "listing-agent",
    about = "Submit a product listing to web directories",
    version,
    after_help = "Configuration is read from the environment; flags override it.\nRun 'listing-agent <command> --help' for details on each command."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Simulate submissions instead of driving a browser
    #[arg(long, global = true)]
    demo: bool,

    /// Show the browser window
    #[arg(long, global = true)]
    headed: bool,

    /// SQLite job database
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Maximum jobs in flight at once
    #[arg(long, global = true)]
    max_concurrent: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler until Ctrl-C
    Run,
    /// Run one job immediately
    Submit {
        /// Job id
        id: String,
    },
    /// Load a page and print the detected submission form
    Detect {
        /// Page URL
        url: String,
    },
    /// Manage jobs in the local store
    Jobs {
        #[command(subcommand)]
        action: JobsAction,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum JobsAction {
    /// Create a pending job
    Add {
        /// Product snapshot JSON file
        #[arg(long)]
        product: PathBuf,
        /// Directory descriptor JSON file
        #[arg(long)]
        directory: PathBuf,
        /// Attempt budget
        #[arg(long, default_value = "3")]
        max_attempts: u32,
    },
    /// List jobs, oldest first
    List {
        /// Only jobs in this status (pending, in_progress, submitted, failed, requires_review)
        #[arg(long)]
        status: Option<String>,
    },
    /// Print one job with its attempt history
    Show {
        /// Job id
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "listing-agent", &mut std::io::stdout());
        return Ok(());
    }

    init_tracing(cli.verbose, cli.json_logs);

    let mut config = AgentConfig::from_env();
    if cli.demo {
        config.demo_mode = true;
    }
    if cli.headed {
        config.browser_headless = false;
    }
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    if let Some(n) = cli.max_concurrent {
        config.scheduler.max_concurrent = n.max(1);
    }

    let result = match cli.command {
        Commands::Run => cli::run_cmd::run(&config).await,
        Commands::Submit { id } => cli::submit_cmd::run(&config, &id, cli.json).await,
        Commands::Detect { url } => cli::detect_cmd::run(&config, &url).await,
        Commands::Jobs { action } => match action {
            JobsAction::Add {
                product,
                directory,
                max_attempts,
            } => cli::jobs_cmd::add(&config, &product, &directory, max_attempts, cli.json).await,
            JobsAction::List { status } => {
                cli::jobs_cmd::list(&config, status.as_deref(), cli.json).await
            }
            JobsAction::Show { id } => cli::jobs_cmd::show(&config, &id).await,
        },
        Commands::Completions { .. } => Ok(()),
    };

    if let Err(e) = &result {
        if cli.json {
            println!(
                "{}",
                serde_json::json!({ "error": true, "message": format!("{e:#}") })
            );
        } else {
            eprintln!("  Error: {e:#}");
        }
        std::process::exit(1);
    }
    result
}

fn init_tracing(verbose: bool, json: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::from_default_env()
        .add_directive(
            format!("listing_agent={level}")
                .parse()
                .expect("static directive"),
        )
        .add_directive(
            format!("listing_core={level}")
                .parse()
                .expect("static directive"),
        );
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

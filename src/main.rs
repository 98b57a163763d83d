use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cmd;

#[derive(Parser)]
#[command(name = "questforge")]
#[command(version, about = "Quest orchestrator - drive engineering quests through agent phases")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default questforge.toml into the project
    Init,
    /// Create a new quest
    New {
        title: String,
        /// What the quest should accomplish; defaults to the title
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Run a quest to completion (defaults to the oldest active quest)
    Run {
        folder: Option<String>,
    },
    /// List active quests
    List,
    /// Abandon a quest
    Abandon {
        folder: String,
        #[arg(short, long, default_value = "abandoned by operator")]
        reason: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "questforge=debug"
    } else {
        "questforge=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let config = questforge::config::Config::load(project_dir, cli.verbose)?;

    match &cli.command {
        Commands::Init => cmd::cmd_init(&config)?,
        Commands::New { title, description } => {
            cmd::cmd_new(&config, title, description.as_deref().unwrap_or(title))?;
        }
        Commands::Run { folder } => cmd::cmd_run(&config, folder.clone()).await?,
        Commands::List => cmd::cmd_list(&config)?,
        Commands::Abandon {
            folder,
            reason,
            force,
        } => cmd::cmd_abandon(&config, folder, reason, *force)?,
    }
    Ok(())
}

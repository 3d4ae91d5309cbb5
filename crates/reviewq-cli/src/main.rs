mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use reviewq_core::mutation::MutationKind;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "reviewq",
    about = "Review queue for AI-proposed actions: list, decide, and serve the dashboard API",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file (default: nearest reviewq.yaml, walking up from cwd)
    #[arg(long, global = true, env = "REVIEWQ_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Use the built-in demo queue instead of the remote service
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the local dashboard API (HTTP + SSE)
    Serve {
        /// Port to listen on (0 = OS-assigned)
        #[arg(long, default_value = "7420")]
        port: u16,

        /// Open the browser once listening
        #[arg(long)]
        open: bool,
    },

    /// List one slice of the queue
    Queue {
        /// needs_decision, waiting_on_others, handled, scheduled, or muted
        #[arg(long, default_value = "needs_decision")]
        status: String,

        /// all, high_risk, or low_confidence
        #[arg(long, default_value = "all")]
        filter: String,
    },

    /// Show counts, efficiency, and the global status banner
    Stats,

    /// Show the conversation behind an objective
    Conversation { objective: String },

    /// Approve a card's proposed action
    Approve { id: String },

    /// Reject a card's proposed action
    Override {
        id: String,
        #[arg(long)]
        reason: String,
    },

    /// Replace a card's proposed action text
    Edit {
        id: String,
        #[arg(long)]
        content: String,
    },

    /// Hand a card off for someone else to decide
    Escalate {
        id: String,
        #[arg(long)]
        reason: String,
    },

    /// Inspect or create the config file
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = root::resolve_config(cli.config.as_deref());
    let (json, offline) = (cli.json, cli.offline);

    let result = match cli.command {
        Commands::Serve { port, open } => cmd::serve::run(&config, offline, port, open),
        Commands::Queue { status, filter } => {
            cmd::queue::list(&config, offline, &status, &filter, json)
        }
        Commands::Stats => cmd::queue::stats(&config, offline, json),
        Commands::Conversation { objective } => {
            cmd::queue::conversation(&config, offline, &objective, json)
        }
        Commands::Approve { id } => {
            cmd::card::run(&config, offline, &id, MutationKind::Approve, json)
        }
        Commands::Override { id, reason } => cmd::card::run(
            &config,
            offline,
            &id,
            MutationKind::Override { reason },
            json,
        ),
        Commands::Edit { id, content } => {
            cmd::card::run(&config, offline, &id, MutationKind::Edit { content }, json)
        }
        Commands::Escalate { id, reason } => cmd::card::run(
            &config,
            offline,
            &id,
            MutationKind::Escalate { reason },
            json,
        ),
        Commands::Config { subcommand } => cmd::config::run(&config, subcommand, json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

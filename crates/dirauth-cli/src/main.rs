//! Dirauth - directory authentication from the command line
//!
//! Authenticates users, looks up entries, lists group members and
//! synchronizes users against a pool of replicated directory servers.

mod commands;
mod config;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use commands::CommandContext;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "dirauth")]
#[command(author = "Dirauth Team")]
#[command(version = dirauth_core::VERSION)]
#[command(about = "Directory authentication and group authorization", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (defaults to ~/.dirauth/config.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Directory server URL; repeat to build a server list
    #[arg(short, long = "server", global = true)]
    servers: Vec<String>,

    /// Resolve groups with one combined search
    #[arg(long, global = true)]
    simplified: bool,

    /// Include matched groups in results
    #[arg(long, global = true)]
    include_groups: bool,

    /// Output format
    #[arg(short, long, value_enum, global = true, default_value = "text")]
    output: OutputFormat,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "DIRAUTH_LOG_LEVEL", global = true, default_value = "warn")]
    log_level: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Authenticate a user
    Auth {
        /// User name
        user: String,

        /// Password
        #[arg(short, long, env = "DIRAUTH_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Required group; membership in any one is enough
        #[arg(short, long = "group")]
        groups: Vec<String>,
    },

    /// Show a user's directory entry
    Lookup {
        /// User name
        user: String,

        /// Groups to report membership for
        #[arg(short, long = "group")]
        groups: Vec<String>,
    },

    /// List the members of a group
    Members {
        /// Group name
        group: String,

        /// Only report these users
        #[arg(long)]
        only: Vec<String>,
    },

    /// Fetch several users and their group memberships
    Sync {
        /// User names
        #[arg(required = true)]
        users: Vec<String>,

        /// Groups to report membership for
        #[arg(short, long = "group")]
        groups: Vec<String>,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Commands::Version = cli.command {
        println!("dirauth {}", dirauth_core::VERSION);
        return Ok(());
    }

    let mut config = config::load(cli.config.as_deref())?;
    config::apply_flags(&mut config, &cli.servers, cli.simplified, cli.include_groups);

    let ctx = CommandContext::new(config, cli.output)?;

    match cli.command {
        Commands::Auth {
            user,
            password,
            groups,
        } => commands::auth::execute(&ctx, &user, password, &groups).await,
        Commands::Lookup { user, groups } => commands::lookup::execute(&ctx, &user, &groups).await,
        Commands::Members { group, only } => commands::members::execute(&ctx, &group, &only).await,
        Commands::Sync { users, groups } => commands::sync::execute(&ctx, &users, &groups).await,
        Commands::Version => Ok(()),
    }
}

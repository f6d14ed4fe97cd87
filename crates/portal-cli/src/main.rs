//! Portal CLI
//!
//! Front end for the portal engine. Portals live in a background daemon;
//! every command except `daemon run` is a client of its RPC port.

mod commands;
mod config;
mod daemon;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "portal")]
#[command(author, version, about = "Portal - expose local services through forwarding sessions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a portal
    Create {
        /// Portal name
        name: String,

        /// URL scheme of the service (http, ssh, postgresql, ...)
        #[arg(short, long)]
        scheme: Option<String>,

        /// Service address as host:port (defaults to the configured address)
        #[arg(short, long)]
        address: Option<String>,
    },

    /// List portals
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Stop a portal, keeping its definition
    Stop {
        /// Portal name
        name: String,
    },

    /// Stop and remove a portal
    Destroy {
        /// Portal name
        name: String,
    },

    /// Show known URL schemes
    Schemes {
        /// Only show schemes starting with this prefix
        prefix: Option<String>,
    },

    /// Manage the background daemon
    #[command(name = "daemon")]
    Daemon {
        #[command(subcommand)]
        action: DaemonAction,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum DaemonAction {
    /// Start the daemon
    Start,
    /// Stop the daemon
    Stop,
    /// Restart the daemon
    Restart,
    /// Check daemon status
    Status,
    /// View daemon logs
    Logs {
        /// Follow logs
        #[arg(short, long)]
        follow: bool,
    },
    /// Internal command to run the daemon process
    #[clap(hide = true)]
    Run,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Set the daemon RPC port
    SetRpcPort {
        /// Port number (default: 16810)
        port: u16,
    },
    /// Set the address pre-filled for new portals
    SetDefaultAddress {
        /// Address as host:port
        address: String,
    },
    /// Reset to default configuration
    Reset {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The daemon installs its own file logger
    let is_daemon_run = matches!(
        cli.command,
        Commands::Daemon {
            action: DaemonAction::Run
        }
    );

    if !is_daemon_run {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(if cli.verbose {
                "portal_cli=debug,portal_core=debug"
            } else {
                "portal_cli=info"
            })
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .finish();

        tracing::subscriber::set_global_default(subscriber)?;
        info!("Starting portal CLI");
    }

    let result = match cli.command {
        Commands::Create {
            name,
            scheme,
            address,
        } => commands::portal::create(&name, scheme, address).await,
        Commands::List { json } => commands::portal::list(json).await,
        Commands::Stop { name } => commands::portal::stop(&name).await,
        Commands::Destroy { name } => commands::portal::destroy(&name).await,
        Commands::Schemes { prefix } => commands::portal::schemes(prefix.as_deref()),

        Commands::Daemon { action } => match action {
            DaemonAction::Start => commands::daemon::start().await,
            DaemonAction::Stop => commands::daemon::stop().await,
            DaemonAction::Restart => commands::daemon::restart().await,
            DaemonAction::Status => commands::daemon::status().await,
            DaemonAction::Logs { follow } => commands::daemon::logs(follow).await,
            DaemonAction::Run => commands::daemon::run().await,
        },
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config::show().await,
            ConfigAction::SetRpcPort { port } => commands::config::set_rpc_port(port).await,
            ConfigAction::SetDefaultAddress { address } => {
                commands::config::set_default_address(&address).await
            }
            ConfigAction::Reset { yes } => commands::config::reset(yes).await,
        },
    };

    if let Err(ref e) = result {
        error!("Command failed: {}", e);
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }

    result
}

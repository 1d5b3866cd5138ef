//! CompAgent CLI: the main entry point.
//!
//! Commands:
//! - `onboard`: Initialize config, data and store directories
//! - `chat`: Interactive or single-message recommendation chat
//! - `gateway`: Start the HTTP API server
//! - `lookup`: Print the market and parity rows for a title and location
//! - `audit`: Print a candidate's audit log
//! - `status`: Show configuration status

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "compagent",
    about = "CompAgent — compensation recommendations for recruiting",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration, data and store directories
    Onboard,

    /// Chat with the compensation assistant
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Act as this configured user (email)
        #[arg(short, long, env = "COMPAGENT_USER")]
        user: Option<String>,

        /// Start with this candidate selected
        #[arg(short, long)]
        candidate: Option<String>,
    },

    /// Start the HTTP gateway server
    Gateway {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show the lookup rows for a job title and location
    Lookup {
        /// Job title, e.g. "Software Engineer"
        title: String,

        /// Location code or city, e.g. SEA or Seattle
        location: String,
    },

    /// Show a candidate's audit log
    Audit {
        /// Candidate ID, e.g. CAND-001
        candidate: String,
    },

    /// Show configuration status
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Chat {
            message,
            user,
            candidate,
        } => commands::chat::run(message, user, candidate).await?,
        Commands::Gateway { port } => commands::gateway::run(port).await?,
        Commands::Lookup { title, location } => commands::lookup::run(&title, &location).await?,
        Commands::Audit { candidate } => commands::audit::run(&candidate).await?,
        Commands::Status => commands::status::run().await?,
    }

    Ok(())
}

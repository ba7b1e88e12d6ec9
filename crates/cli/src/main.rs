//! Orchard CLI - Database migrations, seeding and the background worker.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! orchard migrate
//!
//! # Load the sample catalog and users
//! orchard seed --file crates/cli/seed/catalog.yaml
//!
//! # Create a user
//! orchard user create -e admin@example.com -f Ada -l Lovelace -r admin
//!
//! # Run the job runner without the HTTP server
//! orchard worker
//!
//! # Show jobs that ran out of attempts
//! orchard jobs failed --limit 20
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `seed` - Seed the database from a YAML file
//! - `user create` - Create shop users
//! - `worker` - Run background jobs
//! - `jobs failed` - Inspect permanently failed jobs

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "orchard")]
#[command(author, version, about = "Orchard CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Seed the database with a sample catalog and users
    Seed {
        /// Path to the YAML seed file
        #[arg(short, long, default_value = "crates/cli/seed/catalog.yaml")]
        file: String,
    },
    /// Manage shop users
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Run the background job runner
    Worker,
    /// Inspect the job queue
    Jobs {
        #[command(subcommand)]
        action: JobsAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a new user
    Create {
        /// Email address
        #[arg(short, long)]
        email: String,

        /// First name
        #[arg(short, long)]
        first_name: String,

        /// Last name
        #[arg(short, long, default_value = "")]
        last_name: String,

        /// Role (`customer` or `admin`)
        #[arg(short, long, default_value = "customer")]
        role: String,

        /// Initial password; without one the user must reset it
        #[arg(short, long)]
        password: Option<String>,
    },
}

#[derive(Subcommand)]
enum JobsAction {
    /// List jobs that ran out of attempts
    Failed {
        /// Maximum number of jobs to show
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // The worker installs its own subscriber with Sentry attached
    if !matches!(cli.command, Commands::Worker) {
        tracing_subscriber::fmt::init();
    }

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Seed { file } => commands::seed::catalog(&file).await?,
        Commands::User { action } => match action {
            UserAction::Create {
                email,
                first_name,
                last_name,
                role,
                password,
            } => {
                commands::user::create(&email, &first_name, &last_name, &role, password.as_deref())
                    .await?;
            }
        },
        Commands::Worker => commands::worker::run().await?,
        Commands::Jobs { action } => match action {
            JobsAction::Failed { limit } => commands::jobs::failed(limit).await?,
        },
    }
    Ok(())
}

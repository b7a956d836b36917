mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "recode")]
#[command(about = "Recode CLI - Run code on a remote execution backend", long_about = None)]
struct Cli {
    /// JSON config file (environment variables still override it)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the backend's language catalog
    Languages,

    /// List the backend's status catalog
    Statuses,

    /// Show which runtime a language id would actually run on
    Resolve {
        /// Requested language id
        #[arg(short, long)]
        id: i32,
    },

    /// Run one source file
    Run {
        /// Source file to submit
        #[arg(short, long)]
        file: PathBuf,

        /// Language id (retired or invalid ids use the default runtime)
        #[arg(short, long, default_value = "71")]
        language: i32,

        /// Text passed on stdin
        #[arg(short, long)]
        stdin: Option<String>,

        /// Expected output to grade against
        #[arg(short, long)]
        expected: Option<String>,

        /// Let the backend hold the request open instead of polling
        #[arg(long, default_value = "false")]
        wait: bool,

        /// Print the full result as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Run a JSON array of requests as one batch
    Batch {
        /// File with `[{"source_code": ..., "language_id": ..., "stdin": ..., "expected_output": ...}]`
        #[arg(short, long)]
        file: PathBuf,

        /// Whole-batch deadline in milliseconds
        #[arg(long)]
        deadline_ms: Option<u64>,
    },

    /// Print the effective configuration
    Config,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    // Logs go to stderr so command output stays pipeable
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Languages => {
            commands::list_languages(&config).await?;
        }
        Commands::Statuses => {
            commands::list_statuses(&config).await?;
        }
        Commands::Resolve { id } => {
            commands::resolve_language(&config, id).await?;
        }
        Commands::Run {
            file,
            language,
            stdin,
            expected,
            wait,
            json,
        } => {
            commands::run_file(
                &config,
                &file,
                language,
                stdin.as_deref(),
                expected.as_deref(),
                wait,
                json,
            )
            .await?;
        }
        Commands::Batch { file, deadline_ms } => {
            commands::run_batch(&config, &file, deadline_ms).await?;
        }
        Commands::Config => {
            commands::show_config(&config)?;
        }
    }

    Ok(())
}

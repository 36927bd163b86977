//! Harvester CLI - collect repository metadata from the upstream catalogue.

mod commands;
mod config;
mod progress;
mod shutdown;

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use console::Term;
use harvester::Shutdown;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "harvester")]
#[command(version)]
#[command(about = "Bulk collector for public repository metadata")]
#[command(
    long_about = "Harvester pages through the upstream repository search index, fetches the \
detail record of every repository under a shared request rate, and upserts the results \
into a local database. It can run once in the foreground or as a small HTTP service that \
starts runs on demand."
)]
#[command(after_long_help = r#"EXAMPLES
    Run one harvest with progress bars:
        $ harvester run

    Run with a gentler request rate:
        $ harvester run --rate 20 --workers 10

    Start the trigger service and kick off a run:
        $ harvester serve --bind 127.0.0.1:8080
        $ curl -X POST http://127.0.0.1:8080/run

    Export the stored dataset to CSV and Excel:
        $ harvester export -o ./out

CONFIGURATION
    Harvester reads configuration from:
      1. ~/.config/harvester/config.toml (or $XDG_CONFIG_HOME/harvester/config.toml)
      2. ./harvester.toml
      3. Environment variables (HARVESTER_<SECTION>__<KEY>, e.g., HARVESTER_DETAIL__RATE_PER_SECOND)
      4. .env file in current directory

ENVIRONMENT VARIABLES
    HARVESTER_DATABASE__URL   Database connection string (default: ~/.local/state/harvester/harvester.db)
    RUST_LOG                  Log filter (default: harvester=info,harvester_cli=info)
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one full harvest in the foreground
    Run(RunArgs),
    /// Serve the HTTP trigger/status endpoints
    Serve(ServeArgs),
    /// Export stored repositories to CSV and Excel
    Export {
        /// Output directory (default from config or dataset/tables)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show the most-starred stored repositories
    Top {
        /// Number of entries (default from config or 10)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Run database migrations
    #[cfg(feature = "migrate")]
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
    /// Generate man page(s)
    Man {
        /// Output directory for man pages (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Overrides for a foreground run.
#[derive(Debug, Clone, Args)]
struct RunArgs {
    /// Detail fetch workers (default from config or 40)
    #[arg(short = 'w', long)]
    workers: Option<usize>,

    /// Detail requests per second across all workers (default from config or 100)
    #[arg(short = 'r', long)]
    rate: Option<u32>,

    /// Search page workers (default from config or 10)
    #[arg(short = 'p', long)]
    page_workers: Option<usize>,
}

#[derive(Debug, Clone, Args)]
struct ServeArgs {
    /// Listen address (default from config or 0.0.0.0:8080)
    #[arg(short, long)]
    bind: Option<SocketAddr>,
}

#[cfg(feature = "migrate")]
#[derive(Subcommand)]
enum MigrateAction {
    /// Apply all pending migrations
    Up,
    /// Rollback the last migration
    Down,
    /// Show applied and pending migrations
    Status,
    /// Fresh install - drop all tables and reapply migrations
    Fresh,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("harvester=info,harvester_cli=info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Progress bars own the terminal during a foreground run.
    let interactive_run = matches!(cli.command, Commands::Run(_)) && Term::stdout().is_term();
    if !interactive_run {
        init_tracing();
    }

    match &cli.command {
        Commands::Completions { shell } => {
            commands::meta::handle_completions(*shell)?;
            return Ok(());
        }
        Commands::Man { output } => {
            commands::meta::handle_man(output.clone())?;
            return Ok(());
        }
        _ => {}
    }

    let config = match config::Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(2);
        }
    };

    let Some(database_url) = config.database_url() else {
        eprintln!(
            "Could not determine a database location. Set HARVESTER_DATABASE__URL or \
             [database].url in harvester.toml."
        );
        std::process::exit(2);
    };

    // Ensure the database directory exists for SQLite
    if database_url.starts_with("sqlite://") {
        let db_path = database_url.trim_start_matches("sqlite://");
        let db_path = db_path.split('?').next().unwrap_or(db_path);
        let db_path = std::path::Path::new(db_path);

        if db_path.is_relative() && !db_path.as_os_str().is_empty() {
            tracing::warn!(
                "Database path '{}' is relative - behavior depends on current directory.",
                db_path.display()
            );
        }

        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
    }

    let shutdown = Shutdown::new();
    shutdown::setup_shutdown_handler(shutdown.clone());

    match cli.command {
        Commands::Run(args) => {
            commands::run::handle_run(args, &config, &database_url, shutdown).await?;
        }
        Commands::Serve(args) => {
            commands::serve::handle_serve(args, &config, &database_url, shutdown).await?;
        }
        Commands::Export { output } => {
            commands::export::handle_export(output, &config, &database_url).await?;
        }
        Commands::Top { limit } => {
            commands::top::handle_top(limit, &config, &database_url).await?;
        }
        #[cfg(feature = "migrate")]
        Commands::Migrate { action } => {
            commands::migrate::handle_migrate(action, &database_url).await?;
        }
        Commands::Completions { .. } | Commands::Man { .. } => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_overrides_parse() {
        let cli = Cli::try_parse_from(["harvester", "run", "-w", "8", "--rate", "25"]).unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.workers, Some(8));
        assert_eq!(args.rate, Some(25));
        assert_eq!(args.page_workers, None);
    }

    #[test]
    fn serve_rejects_bad_address() {
        assert!(Cli::try_parse_from(["harvester", "serve", "--bind", "nowhere"]).is_err());
        assert!(Cli::try_parse_from(["harvester", "serve", "--bind", "127.0.0.1:9000"]).is_ok());
    }
}

use clap::{Parser, Subcommand};
use dadump::commands;
use dadump::commands::run::RunOptions;
use dadump::config::{Config, DEFAULT_CONFIG_PATH};
use std::env;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "dadump")]
#[command(about = "Daily dumps management for PostgreSQL", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Path to the config file (env: DADUMP_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging (DEBUG instead of INFO)
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the dump directory, an empty catalog, and a sample config
    Init {
        /// Dump directory to create and write into the config
        #[arg(long, default_value = "/var/lib/dadump")]
        directory: PathBuf,
    },

    /// Perform one dump cycle now
    Run {
        /// Dump only this database (repeatable)
        #[arg(long = "database")]
        databases: Vec<String>,

        /// Structurally verify each fresh dump
        #[arg(long)]
        verify: bool,

        /// Skip the retention pass
        #[arg(long)]
        no_rotate: bool,
    },

    /// List cataloged dumps
    List {
        /// Only dumps of this database
        #[arg(long)]
        database: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show config, per-database dump state, and schedule
    Status,

    /// Verify restore-readiness of cataloged dumps
    Verify {
        /// Dump id to verify
        id: Option<String>,

        /// Verify every cataloged dump
        #[arg(long)]
        all: bool,

        /// Also restore into a scratch database and drop it
        #[arg(long)]
        deep: bool,
    },

    /// Apply the retention policy now
    Prune {
        /// Print the plan without deleting anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Restore a cataloged dump into a database
    Restore {
        /// Dump id to restore
        id: String,

        /// Restore into this database instead of the original
        #[arg(long)]
        target_db: Option<String>,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Run the scheduler loop, dumping daily at the configured time
    Daemon,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let config_path = cli
        .config
        .or_else(|| env::var("DADUMP_CONFIG").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    if let Commands::Init { directory } = &cli.command {
        return commands::init::init_command(&config_path, directory);
    }

    let config = Config::load(&config_path)?;
    info!("Loaded config from {}", config_path.display());

    match cli.command {
        Commands::Init { .. } => unreachable!(),
        Commands::Run {
            databases,
            verify,
            no_rotate,
        } => {
            let options = RunOptions {
                databases,
                verify,
                rotate: !no_rotate,
            };
            commands::run::run_command(&config, &options).await
        }
        Commands::List { database, json } => {
            commands::list::list_command(&config, database.as_deref(), json)
        }
        Commands::Status => commands::status::status_command(&config, &config_path).await,
        Commands::Verify { id, all, deep } => {
            commands::verify::verify_command(&config, id.as_deref(), all, deep).await
        }
        Commands::Prune { dry_run } => commands::prune::prune_command(&config, dry_run),
        Commands::Restore { id, target_db, yes } => {
            commands::restore::restore_command(&config, &id, target_db.as_deref(), yes).await
        }
        Commands::Daemon => commands::daemon::daemon_command(&config).await,
    }
}

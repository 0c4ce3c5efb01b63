use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use postbridge_core::MigrationPhase;
use postbridge_service::{
    bootstrap, AppConfig, ContentCheck, LoggingConfig, MigrationController,
};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, EnvFilter, Registry};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "postbridge")]
#[command(about = "MongoDB to Cassandra migration controller", long_about = None)]
#[command(version)]
#[command(after_help = "Migration workflow:
  1. status                      check the current state
  2. migrate                     copy existing data to Cassandra
  3. verify --content full       compare both stores
  4. set-phase dual_write        write to both stores
  5. set-phase read_cassandra    read from Cassandra
  6. set-phase cassandra_only    stop using MongoDB
  7. cleanup                     remove MongoDB data")]
struct Cli {
    /// Configuration file; the phase is persisted here
    #[arg(long, global = true, env = "POSTBRIDGE_CONFIG", default_value = "postbridge.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show phase, connectivity, counts and the last verification
    Status,

    /// Copy MongoDB collections into Cassandra
    Migrate {
        /// Read and transform only
        #[arg(long)]
        dry_run: bool,

        /// Collections to copy (default: all)
        #[arg(long, value_delimiter = ',')]
        collections: Vec<String>,

        /// Rows per Cassandra batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Batches written concurrently
        #[arg(long)]
        max_in_flight: Option<usize>,

        /// Skip the count check after migrating
        #[arg(long)]
        skip_verification: bool,
    },

    /// Compare MongoDB collections with their Cassandra tables
    Verify {
        /// Collections to check (default: all)
        #[arg(long, value_delimiter = ',')]
        collections: Vec<String>,

        /// Content comparison beyond counts
        #[arg(long, value_enum, default_value_t = ContentMode::None)]
        content: ContentMode,

        /// Ids to point-read with `--content sample`
        #[arg(long, default_value = "100")]
        sample_size: usize,
    },

    /// Persist a new migration phase (takes effect on restart)
    SetPhase {
        /// mongo_only, dual_write, read_cassandra or cassandra_only
        phase: String,
    },

    /// Delete MongoDB data (only in cassandra_only)
    Cleanup {
        /// Count what would be deleted
        #[arg(long)]
        dry_run: bool,

        /// Also drop the collections
        #[arg(long)]
        drop_collection: bool,

        /// Do not ask for confirmation
        #[arg(long)]
        yes: bool,

        /// Collections to clear (default: the posts collection)
        #[arg(long, value_delimiter = ',')]
        collections: Vec<String>,
    },

    /// Insert the sample blog posts
    Seed {
        /// Delete existing posts first (mongo_only only)
        #[arg(long)]
        reset: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ContentMode {
    None,
    Sample,
    Full,
}

impl ContentMode {
    fn to_check(self, sample_size: usize) -> ContentCheck {
        match self {
            Self::None => ContentCheck::CountsOnly,
            Self::Sample => ContentCheck::Sample(sample_size),
            Self::Full => ContentCheck::Full,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    init_logging(&config.logging).context("failed to initialize logging")?;
    tracing::debug!(
        config = %cli.config.display(),
        phase = %config.migration_phase,
        "configuration loaded"
    );

    match cli.command {
        // Only touches the config file.
        Command::SetPhase { phase } => {
            let controller =
                MigrationController::from_config(&config, &cli.config, Default::default());
            commands::phase::run(&controller, &phase)
        }
        Command::Status => {
            let controller = connect(&config, &cli.config).await;
            commands::status::run(&controller).await
        }
        Command::Migrate {
            dry_run,
            collections,
            batch_size,
            max_in_flight,
            skip_verification,
        } => {
            let controller = connect(&config, &cli.config).await;
            let mut options = controller.migration_defaults();
            options.dry_run = dry_run;
            if !collections.is_empty() {
                options.collections = collections;
            }
            if let Some(batch_size) = batch_size {
                options.batch_size = batch_size;
            }
            if let Some(max_in_flight) = max_in_flight {
                options.max_in_flight = max_in_flight;
            }
            commands::migrate::run(&controller, &options, skip_verification).await
        }
        Command::Verify {
            collections,
            content,
            sample_size,
        } => {
            let controller = connect(&config, &cli.config).await;
            let options = postbridge_service::VerifyOptions {
                collections,
                content: content.to_check(sample_size),
            };
            commands::verify::run(&controller, &options).await
        }
        Command::Cleanup {
            dry_run,
            drop_collection,
            yes,
            collections,
        } => {
            let controller = connect(&config, &cli.config).await;
            let options = postbridge_service::CleanupOptions {
                collections,
                dry_run,
                drop_collection,
            };
            commands::cleanup::run(&controller, &options, yes).await
        }
        Command::Seed { reset } => {
            let controller = connect(&config, &cli.config).await;
            commands::seed::run(&controller, reset).await
        }
    }
}

async fn connect(config: &AppConfig, config_path: &Path) -> MigrationController {
    let backends = bootstrap::open_backends(config).await;
    MigrationController::from_config(config, config_path, backends)
}

/// Logs go to stderr so command output stays clean on stdout.
fn init_logging(logging: &LoggingConfig) -> Result<(), TryInitError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let registry = Registry::default().with(env_filter);

    if logging.format == "json" {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    }
}

/// Phase names accepted by `set-phase`, for help and error output.
fn phase_names() -> String {
    MigrationPhase::ALL
        .iter()
        .map(MigrationPhase::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

mod config;
use clap::{Parser, Subcommand};
use config::Config;
use evostore_core::DEFAULT_BUFFER_SIZE;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod server;
use server::run_server;

#[derive(Parser)]
#[command(name = "evostore")]
#[command(about = "Lineage-aware storage node for evolving model populations")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a node from a YAML configuration file
    Server {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.yaml")]
        config: String,
    },
    /// Run a node configured entirely from flags
    Start {
        /// Listen connection string, e.g. ofi+tcp://0.0.0.0:1234
        #[arg(short, long)]
        connection: String,

        /// Node (provider) id
        #[arg(short, long, default_value_t = 0)]
        provider: u32,

        /// Worker threads; defaults to one per core
        #[arg(short, long)]
        threads: Option<usize>,

        /// Buffer pool capacity in bytes
        #[arg(short, long = "buffer-size", default_value_t = DEFAULT_BUFFER_SIZE)]
        buffer_size: u64,

        /// Persist records and layers under this directory
        #[arg(long = "data-dir")]
        data_dir: Option<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "evostore=info,evostore_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let cfg = match cli.command {
        Commands::Server { config } => {
            tracing::info!("Starting EvoStore server with config: {}", config);
            Config::from_file(&config)
        }
        Commands::Start {
            connection,
            provider,
            threads,
            buffer_size,
            data_dir,
        } => {
            tracing::info!("Starting EvoStore provider {} on {}", provider, connection);
            Config::for_launcher(connection, provider, threads, buffer_size, data_dir)
        }
    };

    let cfg = match cfg {
        Ok(cfg) => cfg,
        Err(error) => {
            tracing::error!("Failed to load config: {}", error);
            std::process::exit(1);
        }
    };

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(threads) = cfg.runtime.threads {
        builder.worker_threads(threads);
    }

    let runtime = match builder.build() {
        Ok(runtime) => runtime,
        Err(error) => {
            tracing::error!("Failed to build runtime: {}", error);
            std::process::exit(1);
        }
    };

    if let Err(error) = runtime.block_on(run_server(cfg)) {
        tracing::error!("Server error: {}", error);
        std::process::exit(1);
    }
}

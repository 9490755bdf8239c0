use std::path::PathBuf;
use std::sync::Arc;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use viewdb::net::{DbServer, UserStore};
use viewdb::{Config, Database};

#[derive(Parser, Debug)]
#[command(name = "viewdb-server", about = "Document database server with bitmap-indexed views")]
struct Args {
    /// TCP port to listen on
    #[arg(long, default_value_t = 90)]
    port: u16,

    /// Directory holding documents, files and view indexes
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    /// User file; defaults to users.config in the data directory
    #[arg(long)]
    users_file: Option<PathBuf>,

    /// Worker threads for the runtime
    #[arg(long)]
    threads: Option<usize>,

    /// Accept documents whose type has no primary view
    #[arg(long)]
    allow_untyped: bool,
}

fn main() -> viewdb::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = Config::with_storage_path(&args.data_dir);
    config.network.port = args.port;
    config.require_primary_view = !args.allow_untyped;
    if let Some(threads) = args.threads {
        config.network.min_threads = threads.max(1);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.network.min_threads)
        .enable_all()
        .build()?;

    runtime.block_on(run(args, config))
}

async fn run(args: Args, config: Config) -> viewdb::Result<()> {
    info!("Starting viewdb server, data in {}", config.storage_path.display());

    let users_path = args.users_file.unwrap_or_else(|| config.storage_path.join("users.config"));
    std::fs::create_dir_all(&config.storage_path)?;
    let users = Arc::new(UserStore::open(&users_path)?);

    let network = config.network.clone();
    let db = Arc::new(Database::open(config, Vec::new())?);
    let server = Arc::new(DbServer::new(db.clone(), users, network));
    let listener = server.bind().await?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
        }
        info!("Shutting down...");
    };
    server.serve(listener, shutdown).await?;

    db.shutdown()?;
    info!("Shutdown complete");
    Ok(())
}

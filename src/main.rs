use clap::{Parser, Subcommand};
use rakkan::config::Config;
use std::path::PathBuf;

/// Rakkan - Asynchronous image watermarking pipeline
#[derive(Parser, Debug)]
#[command(name = "rakkan")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API server
    Serve,
    /// Run the background processing worker
    Worker,
}

#[tokio::main]
async fn main() {
    // Initialize logging subsystem
    rakkan::logging::init_subscriber().expect("Failed to initialize logging subsystem");

    // Parse command-line arguments
    let args = Args::parse();

    // Load configuration from file
    let config = Config::from_file(&args.config).unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::process::exit(1);
    });
    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    tracing::info!(
        config_file = %args.config.display(),
        server_address = %config.server.address,
        server_port = config.server.port,
        nats_stream = %config.nats.stream,
        worker_concurrency = config.worker.concurrency,
        "Configuration loaded successfully"
    );

    let result = match args.command {
        Command::Serve => rakkan::server::run(config).await,
        Command::Worker => rakkan::worker::run(config).await,
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "fatal error");
        std::process::exit(1);
    }
}

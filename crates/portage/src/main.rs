//! Portage binary.
//!
//! Watches a folder for files matching a glob pattern and ships them to an
//! object store through the upload pipeline daemon.
//!
//! Usage:
//!     portage '/var/spool/exports/*.csv' telemetry-bucket daily/exports --interval 30

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use portage::{DirectoryUploader, UploaderConfig, RESTART_COOLDOWN};
use portage_logging::{init_logging, LogConfig};
use portage_protocol::{RemoteStreamClient, StreamClient};

#[derive(Parser, Debug)]
#[command(
    name = "portage",
    about = "Continuously upload files matching a pattern to an object store"
)]
struct Args {
    /// Glob pattern selecting the files to upload, e.g. /var/spool/exports/*.csv
    pattern: String,

    /// Destination bucket
    bucket: String,

    /// Key prefix inside the bucket
    bucket_path: String,

    /// Seconds between scans
    #[arg(long, default_value_t = 30)]
    interval: u64,

    /// Upload pipeline daemon endpoint
    #[arg(long, env = "PORTAGE_PIPELINE_ENDPOINT", default_value = "127.0.0.1:7355")]
    endpoint: String,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(LogConfig {
        verbose: args.verbose,
    });

    info!(
        pattern = %args.pattern,
        bucket = %args.bucket,
        bucket_path = %args.bucket_path,
        interval = args.interval,
        "portage started"
    );

    // The synchronizer never stops on its own for recoverable conditions.
    // Anything that escapes run() discards the whole instance; a fresh one
    // is built after a cooldown.
    loop {
        if let Err(err) = run_synchronizer(&args).await {
            error!("synchronizer failed: {err:#}");
        }
        info!(
            cooldown_secs = RESTART_COOLDOWN.as_secs(),
            "rebuilding synchronizer after cooldown"
        );
        tokio::time::sleep(RESTART_COOLDOWN).await;
    }
}

async fn run_synchronizer(args: &Args) -> anyhow::Result<()> {
    let client = RemoteStreamClient::connect(args.endpoint.as_str())
        .await
        .with_context(|| format!("connecting to pipeline at {}", args.endpoint))?;
    let client: Arc<dyn StreamClient> = Arc::new(client);

    let config = UploaderConfig::new(
        args.pattern.as_str(),
        args.bucket.as_str(),
        &args.bucket_path,
        Duration::from_secs(args.interval),
    );
    let uploader = DirectoryUploader::new(config, client).await?;
    let result = uploader.run().await;
    if let Err(err) = uploader.close().await {
        warn!("closing pipeline client failed: {err:#}");
    }
    result
}

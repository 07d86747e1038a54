//! Shared logging setup for portage binaries.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "portage=info,portage_protocol=info";
const VERBOSE_LOG_FILTER: &str = "portage=debug,portage_protocol=debug";

/// Logging configuration for portage binaries.
pub struct LogConfig {
    pub verbose: bool,
}

/// Initialize tracing with a stderr writer.
///
/// `RUST_LOG` overrides the built-in filter when set.
pub fn init_logging(config: LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if config.verbose {
            VERBOSE_LOG_FILTER
        } else {
            DEFAULT_LOG_FILTER
        })
    });

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(filter),
        )
        .init();
}

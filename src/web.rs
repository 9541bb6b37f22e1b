#![cfg(not(tarpaulin_include))]

use dashboard::{Config, app};
use log::info;

/// Main entry point for the dashboard server
///
/// Reads configuration from the environment, loads the data file and serves
/// the API until the process is stopped.
///
/// # Environment
/// * `PORT`, `DASHBOARD_HOST` - listening address
/// * `DASHBOARD_DATA_FILE` - CSV file to serve
/// * `DASHBOARD_PRODUCER`, `DASHBOARD_PRODUCER_INTERPRETER`,
///   `DASHBOARD_PRODUCER_TIMEOUT_MS` - the refresh producer
/// * `DASHBOARD_SETTLE_MODE`, `DASHBOARD_SETTLE_MS`, `DASHBOARD_SETTLE_POLL_MS` -
///   how long to wait for the file after the producer finishes
/// * `RUST_LOG` - log filter, `info` by default
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Success or error object
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env()?;
    info!("project dashboard server starting");
    info!("data file: {}", config.data_file.display());
    match &config.producer {
        Some(producer) => info!(
            "producer: {} (timeout {:?})",
            producer.program.display(),
            producer.timeout
        ),
        None => info!("producer: disabled"),
    }

    app::run(config).await
}

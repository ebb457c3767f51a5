//! ADS-B relay - feed to aircraft.json
//!
//! Usage:
//!   cargo run --release --bin adsb_relay
//!
//! Environment variables (all optional):
//!   STREAM_URL - feed endpoint (default: https://adsb.chrisnyc.net/KJFK)
//!   OUT_PATH - snapshot path (default: /opt/globe/html/data/aircraft.json)
//!   WRITE_EVERY_S - minimum seconds between snapshots (default: 1.0)
//!   BUFFER_SEC - seconds of batches kept in the window (default: 15)
//!   RECONNECT_DELAY_S - pause before reconnecting (default: 1.0)
//!   REQUEST_TIMEOUT_S - connect and read timeout (default: 30)
//!   USER_AGENT - request header (default: tar1090-adapter/1.0)
//!   WRITE_CADENCE - line | timer (default: line)

use adsb_relay::relay_core::{run, RelayConfig};
use dotenv::dotenv;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let config = RelayConfig::from_env()?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.rust_log.as_str()))
        .target(env_logger::Target::Stderr)
        .init();

    run(config).await
}

use crate::relay_core::{
    config::RelayConfig,
    reconnect::run_with_reconnect,
    snapshot_writer::ensure_parent_dir,
    stream_reader::{wall_clock_secs, FeedConnector, HttpConnector, RelayState},
};
use std::future::Future;

/// Run the relay against the configured HTTP feed until CTRL+C.
pub async fn run(config: RelayConfig) -> Result<(), Box<dyn std::error::Error>> {
    log::info!("🚀 Starting ADS-B relay");
    log::info!("   Feed: {}", config.stream_url);
    log::info!("   Output: {}", config.out_path.display());
    log::info!("   Write interval: {:.2}s", config.write_every_s);
    log::info!("   Window: {}s", config.buffer_sec);
    log::info!("   Cadence: {:?}", config.write_cadence);

    let connector = HttpConnector::new(&config)?;

    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => log::info!("⚠️  Received CTRL+C, shutting down..."),
            Err(e) => {
                log::error!("❌ Failed to listen for CTRL+C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    run_until(&connector, &config, shutdown).await?;

    log::info!("✅ Relay stopped");
    Ok(())
}

/// Run the reconnect loop against `connector` until `shutdown` resolves, then
/// write one final snapshot of the window.
///
/// Creates the output directory first; that is the only fatal error.
pub async fn run_until<C, S>(
    connector: &C,
    config: &RelayConfig,
    shutdown: S,
) -> Result<RelayState, Box<dyn std::error::Error>>
where
    C: FeedConnector + ?Sized,
    S: Future<Output = ()>,
{
    ensure_parent_dir(&config.out_path)?;

    let mut state = RelayState::from_config(config);

    tokio::select! {
        _ = run_with_reconnect(connector, &mut state, config.write_cadence, config.reconnect_delay) => {}
        _ = shutdown => {}
    }

    log::info!("🔄 Writing final snapshot...");
    state.publish_final(wall_clock_secs());

    Ok(state)
}

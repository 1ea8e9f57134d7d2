//! Polling a live tracking API and printing the fleet list.
//!
//! Run with: FLEET_API_URL=http://localhost:3013 cargo run --example live_fleet
//! Set RUST_LOG=debug to see fetch timings.

use std::time::Duration;

use fleet_tracker::report::fleet_rows;
use fleet_tracker::{
    ClientConfig, PollingConfig, PollingSession, RefreshMode, RefreshOutcome, StatusCounts,
    TrackingClient,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let client_config = ClientConfig::from_env()?;
    let offset = client_config.local_offset()?;
    let client = TrackingClient::new(&client_config)?;

    let config = PollingConfig::default();
    let mut session = PollingSession::new(client, config);

    println!("Live Fleet Example");
    println!("API: {}, refresh every {:?}\n", client_config.base_url, config.interval());

    session.start(config.interval(), move |report| {
        if let Some(ref e) = report.error {
            println!("[{}] refresh failed: {}", report.evaluated_at.format("%H:%M:%S"), e);
            return;
        }
        let counts: StatusCounts = report.statuses.iter().copied().collect();
        println!(
            "[{}] {} vehicles: {} active, {} moving, {} stopped",
            report.evaluated_at.format("%H:%M:%S"),
            counts.total(),
            counts.active,
            counts.moving,
            counts.stopped
        );
        for row in fleet_rows(&report.view, report.evaluated_at, &config.activity, offset) {
            println!(
                "  {:<12} {:<8} {}, {}  {:>10}  {}",
                row.device_id,
                row.status.label(),
                row.latitude,
                row.longitude,
                row.speed,
                row.last_update
            );
        }
    })?;

    tokio::time::sleep(Duration::from_secs(12)).await;

    // A user-triggered reload goes through the same path
    if let RefreshOutcome::Skipped = session.refresh(RefreshMode::Visible).await {
        println!("Refresh skipped: a fetch is already running");
    }

    tokio::time::sleep(Duration::from_secs(10)).await;
    session.stop();

    let view = session.latest();
    let center = view.center();
    println!(
        "\nStopped. Last view has {} vehicles, map center {:.6}, {:.6}",
        view.vehicles.len(),
        center.latitude,
        center.longitude
    );
    Ok(())
}

// main.rs
//! Headless monitor: keeps the hub link up, mirrors device state and logs
//! what an operator's dashboard would show. An optional device id
//! argument focuses that device's countdown.

use signal_sync::SignalSync;
use signal_sync::config::Settings;
use signal_sync::events::{DashboardEvent, EventKind};
use signal_sync::metrics;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("signal_sync=info")),
        )
        .init();

    let settings =
        Settings::new().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    if settings.metrics.enabled {
        metrics::setup_metrics(settings.metrics.port)
            .map_err(|e| anyhow::anyhow!("Failed to setup metrics: {}", e))?;
        info!(port = settings.metrics.port, "Metrics exporter listening");
    }

    let focus = std::env::args()
        .nth(1)
        .map(|arg| arg.parse::<i64>())
        .transpose()
        .map_err(|e| anyhow::anyhow!("Device id must be an integer: {}", e))?;

    let sync = SignalSync::from_settings(&settings)?;
    sync.bus().subscribe_fn(EventKind::DeviceUpdated, |event| {
        if let DashboardEvent::DeviceUpdated(device) = event {
            info!(
                device_id = device.id,
                name = %device.name,
                lamp1 = %device.lamp1_phase,
                lamp2 = %device.lamp2_phase,
                remaining1 = ?device.remaining1,
                remaining2 = ?device.remaining2,
                "Device updated"
            );
        }
    });
    sync.bus().subscribe_fn(EventKind::Countdown, |event| {
        if let DashboardEvent::Countdown(tick) = event {
            info!(
                device_id = tick.device_id,
                t1 = ?tick.ticks1,
                t2 = ?tick.ticks2,
                phase = ?tick.phase,
                "Countdown"
            );
        }
    });

    match sync.refresh_snapshot().await {
        Ok(count) => info!(count, "Devices loaded"),
        Err(e) => warn!("Device snapshot unavailable: {}", e),
    }
    sync.start().await;
    if let Some(device_id) = focus {
        sync.focus(device_id).await;
    }

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for shutdown signal: {}", e))?;
    sync.shutdown().await;
    Ok(())
}

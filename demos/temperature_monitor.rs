//! Real-time temperature monitoring example
//!
//! Run with: cargo run --example temperature_monitor
//!
//! Set `RUST_LOG=ble_temp_monitor=debug` to follow the state machine.

use ble_temp_monitor::{
    celsius_to_fahrenheit, AcquisitionMode, MonitorConfig, MonitorEvent, Result,
    SelectionPolicy, TemperatureMonitor,
};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    println!("Temperature Monitor");
    println!("==================\n");

    let config = MonitorConfig::default()
        .with_selection(SelectionPolicy::FirstMatch)
        .with_acquisition(AcquisitionMode::Poll {
            interval: Duration::from_secs(2),
        })
        .with_history_limit(Some(20));

    println!("Looking for {:?}...\n", config.target_name);

    let monitor = TemperatureMonitor::new(config).await?;
    let mut events = monitor.subscribe();

    let _readings = monitor.on_reading(|reading| {
        println!(
            "[{}] {:6.2}°C ({:6.2}°F)",
            reading.time.format("%H:%M:%S"),
            reading.temperature,
            celsius_to_fahrenheit(reading.temperature)
        );
    });

    println!("Press Ctrl+C to exit.\n");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\n\nExiting...");
                break;
            }
            event = events.recv() => match event {
                Ok(MonitorEvent::StateChanged { to, .. }) => println!("State: {}", to),
                Ok(MonitorEvent::DeviceDiscovered(device)) => println!(
                    "Found: {} ({}) RSSI {:?}",
                    device.name.as_deref().unwrap_or("<unnamed>"),
                    device.id,
                    device.rssi
                ),
                Ok(MonitorEvent::Fault(error)) => println!("Error: {}", error),
                Ok(_) => {}
                Err(_) => break,
            },
        }
    }

    let readings = monitor.readings();
    if !readings.is_empty() {
        let average =
            readings.iter().map(|r| r.temperature).sum::<f32>() / readings.len() as f32;
        println!("{} readings, average {:.2}°C", readings.len(), average);
    }

    monitor.shutdown().await?;

    Ok(())
}

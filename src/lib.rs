// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # ble-temp-monitor
//!
//! A cross-platform Rust library that acts as a Bluetooth Low Energy central,
//! finds a temperature sensor by its advertised name, connects to it and
//! collects temperature readings from its GATT characteristic.
//!
//! The reference peripheral is an ESP32 exposing the Health Thermometer
//! service (`0x1809`) with a Temperature Measurement characteristic
//! (`0x2A1C`) whose value is a little-endian `f32` in degrees Celsius.
//!
//! ## Features
//!
//! - **Scan Windows**: Bounded discovery with name-based target selection
//! - **GATT Walk**: Locate the temperature characteristic on any service
//! - **Acquisition Modes**: Single read, periodic polling or notifications
//! - **Reading History**: Timestamped readings with placeholder filtering
//! - **Observable State**: Status snapshots, change events and callbacks
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ble_temp_monitor::{MonitorConfig, Result, TemperatureMonitor};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Scanning starts as soon as the adapter reports power-on
//!     let monitor = TemperatureMonitor::new(MonitorConfig::default()).await?;
//!
//!     // Wait for the scan window to close and the sensor to answer
//!     tokio::time::sleep(std::time::Duration::from_secs(10)).await;
//!
//!     if let Some(temperature) = monitor.current_temperature() {
//!         println!("Temperature: {:.1}°C", temperature);
//!     }
//!
//!     monitor.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. Add `NSBluetoothAlwaysUsageDescription`
//! to your Info.plist for bundled apps.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for configuration and data types

// Public modules
pub mod ble;
pub mod config;
pub mod coordinator;
pub mod data;
pub mod error;
pub mod monitor;
pub mod protocol;
pub mod utils;

// Re-exports for convenience
pub use config::{AcquisitionMode, MonitorConfig, SelectionPolicy, DEFAULT_SCAN_WINDOW};
pub use coordinator::{BleCentralCoordinator, MonitorEvent, MonitorStatus};
pub use error::{DecodeError, Error, Result};
pub use monitor::{CallbackHandle, TemperatureMonitor};
pub use utils::{celsius_to_fahrenheit, fahrenheit_to_celsius};

// Re-export commonly used types from submodules
pub use ble::{
    event_channel, AdapterState, BleEvent, BleHost, CharacteristicDescriptor, ConnectionHandle,
    CoordinatorState, DeviceId, DiscoveredDevice, EventReceiver, EventSender, ServiceDescriptor,
};
pub use data::{ReadingBuffer, TemperatureReading, DISCONNECTED_SENTINEL};
pub use protocol::{decode_temperature, PayloadFormat};

//! Error types for the ble-temp-monitor crate.

use thiserror::Error;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// The adapter is missing or not powered on.
    #[error("Bluetooth adapter not available or not powered on")]
    AdapterUnavailable,

    /// The platform refused to start or continue a scan.
    #[error("Scan failed: {reason}")]
    ScanFailed {
        /// Description of why the scan failed.
        reason: String,
    },

    /// Failed to establish a connection to the peripheral.
    #[error("Connection failed: {reason}")]
    ConnectFailed {
        /// Description of why the connection failed.
        reason: String,
    },

    /// Service enumeration on the connected peripheral failed.
    #[error("Service discovery failed: {reason}")]
    ServiceDiscoveryFailed {
        /// Description of why discovery failed.
        reason: String,
    },

    /// Characteristic enumeration for a service failed.
    #[error("Characteristic discovery failed: {reason}")]
    CharacteristicDiscoveryFailed {
        /// Description of why discovery failed.
        reason: String,
    },

    /// Reading (or subscribing to) the temperature characteristic failed.
    #[error("Value read failed: {reason}")]
    ValueReadFailed {
        /// Description of why the read failed.
        reason: String,
    },

    /// A characteristic payload could not be decoded.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The connected peripheral went away.
    #[error("Peripheral disconnected")]
    PeripheralDisconnected,

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter {
        /// The name of the parameter.
        name: String,
        /// The invalid value that was provided.
        value: String,
    },

    /// The monitor task is no longer running.
    #[error("Monitor has been shut down")]
    MonitorStopped,
}

/// Failure to turn a characteristic payload into a temperature.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The payload is shorter than the format requires.
    #[error("insufficient data: {len} bytes (need at least {needed})")]
    InsufficientData {
        /// Number of bytes received.
        len: usize,
        /// Number of bytes the format requires.
        needed: usize,
    },

    /// The payload holds one of the reserved IEEE-11073 special values (NaN, NRes, ±INF).
    #[error("reserved value: {raw:#08x}")]
    ReservedValue {
        /// The raw 24-bit mantissa.
        raw: u32,
    },
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

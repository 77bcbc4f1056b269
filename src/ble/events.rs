//! Platform and control events consumed by the coordinator.
//!
//! Every callback from the BLE host, every timer and every public command is
//! funnelled into a single [`BleEvent`] stream so the coordinator can process
//! them one at a time.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

/// Power/authorization state of the local Bluetooth adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AdapterState {
    /// State not reported yet.
    #[default]
    Unknown,
    /// The platform has no BLE support.
    Unsupported,
    /// The process is not allowed to use Bluetooth.
    Unauthorized,
    /// Bluetooth is switched off.
    PoweredOff,
    /// Ready for scanning and connecting.
    PoweredOn,
}

impl AdapterState {
    /// Check if scanning and connecting are allowed.
    pub fn is_powered_on(&self) -> bool {
        matches!(self, Self::PoweredOn)
    }
}

/// Stable platform identifier of a peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceId(String);

impl DeviceId {
    /// Create an identifier from its platform string form.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Opaque reference to a connected peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionHandle {
    device: DeviceId,
}

impl ConnectionHandle {
    /// Create a handle for a peripheral the host has connected.
    pub fn new(device: DeviceId) -> Self {
        Self { device }
    }

    /// The peripheral this handle refers to.
    pub fn device(&self) -> &DeviceId {
        &self.device
    }
}

/// A GATT service found on a connected peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    /// Service UUID.
    pub uuid: Uuid,
    /// Connection the service belongs to.
    pub handle: ConnectionHandle,
}

/// A GATT characteristic found within a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicDescriptor {
    /// Characteristic UUID.
    pub uuid: Uuid,
    /// UUID of the owning service.
    pub service_uuid: Uuid,
    /// Connection the characteristic belongs to.
    pub handle: ConnectionHandle,
}

/// Input to the coordinator.
#[derive(Debug, Clone)]
pub enum BleEvent {
    /// The adapter changed power/authorization state.
    AdapterStateChanged(AdapterState),
    /// A peripheral advertisement was seen.
    Advertisement {
        /// Peripheral identifier.
        id: DeviceId,
        /// Advertised local name.
        name: Option<String>,
        /// Signal strength in dBm.
        rssi: Option<i16>,
        /// When the advertisement was seen.
        seen_at: DateTime<Utc>,
    },
    /// The platform could not start scanning.
    ScanFailed {
        /// Platform error description.
        reason: String,
    },
    /// A connect request succeeded.
    Connected {
        /// Handle of the connected peripheral.
        handle: ConnectionHandle,
    },
    /// A connect request failed.
    ConnectFailed {
        /// Peripheral that could not be connected.
        id: DeviceId,
        /// Platform error description.
        reason: String,
    },
    /// A peripheral disconnected.
    Disconnected {
        /// Peripheral that went away.
        id: DeviceId,
    },
    /// Service enumeration completed.
    ServicesDiscovered {
        /// Connection the services belong to.
        handle: ConnectionHandle,
        /// Services found.
        services: Vec<ServiceDescriptor>,
    },
    /// Service enumeration failed.
    ServiceDiscoveryFailed {
        /// Connection discovery ran on.
        handle: ConnectionHandle,
        /// Platform error description.
        reason: String,
    },
    /// Characteristic enumeration for a service completed.
    CharacteristicsDiscovered {
        /// Service the characteristics belong to.
        service: ServiceDescriptor,
        /// Characteristics found.
        characteristics: Vec<CharacteristicDescriptor>,
    },
    /// Characteristic enumeration for a service failed.
    CharacteristicDiscoveryFailed {
        /// Service discovery ran on.
        service: ServiceDescriptor,
        /// Platform error description.
        reason: String,
    },
    /// A characteristic value arrived (read response or notification).
    ValueUpdated {
        /// Characteristic UUID.
        characteristic: Uuid,
        /// Raw value.
        value: Bytes,
    },
    /// A read or subscribe request failed.
    ValueReadFailed {
        /// Characteristic UUID.
        characteristic: Uuid,
        /// Platform error description.
        reason: String,
    },
    /// The scan window of the given scan session elapsed.
    ScanWindowExpired {
        /// Scan session the timer was armed for.
        session: u64,
    },
    /// Time to re-read the target characteristic.
    PollTick {
        /// Streaming session the poll timer belongs to.
        generation: u64,
    },
    /// Begin scanning.
    Start,
    /// Stop scanning.
    Stop,
    /// Tear everything down and end the event loop.
    Shutdown,
}

//! BLE communication module.
//!
//! This module holds the central-role building blocks: the platform host
//! seam, the events it produces, scan-window discovery and the GATT walk
//! that locates the temperature characteristic.

pub mod btleplug_host;
pub mod connection;
pub mod discovery;
pub mod events;
pub mod gatt;
pub mod host;
pub mod uuids;

pub use btleplug_host::BtleplugHost;
pub use connection::CoordinatorState;
pub use discovery::{DiscoveredDevice, DiscoveryController};
pub use events::{
    AdapterState, BleEvent, CharacteristicDescriptor, ConnectionHandle, DeviceId,
    ServiceDescriptor,
};
pub use gatt::GattSession;
pub use host::{event_channel, BleHost, EventReceiver, EventSender};
pub use uuids::*;

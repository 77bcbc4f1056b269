//! Platform BLE host abstraction.
//!
//! Requests are fire-and-forget: a [`BleHost`] starts the operation and
//! reports the outcome later by posting a [`BleEvent`] into the coordinator's
//! event channel.

use tokio::sync::mpsc;

use crate::ble::events::{
    BleEvent, CharacteristicDescriptor, ConnectionHandle, DeviceId, ServiceDescriptor,
};

/// Sending half of the coordinator's event channel.
pub type EventSender = mpsc::UnboundedSender<BleEvent>;

/// Receiving half of the coordinator's event channel.
pub type EventReceiver = mpsc::UnboundedReceiver<BleEvent>;

/// Create the event channel shared by a host and its coordinator.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Central-role operations provided by the platform BLE stack.
///
/// None of these block. Completion, failure and any data are delivered as
/// [`BleEvent`]s.
#[cfg_attr(test, mockall::automock)]
pub trait BleHost: Send + Sync {
    /// Start passive discovery with no service filter.
    ///
    /// Advertisements arrive as [`BleEvent::Advertisement`]; failure as
    /// [`BleEvent::ScanFailed`].
    fn start_scan(&self);

    /// Stop discovery.
    fn stop_scan(&self);

    /// Connect to a peripheral.
    ///
    /// Answers with [`BleEvent::Connected`] or [`BleEvent::ConnectFailed`].
    fn connect(&self, id: &DeviceId);

    /// Drop a connection.
    fn disconnect(&self, handle: &ConnectionHandle);

    /// Enumerate all services.
    ///
    /// Answers with [`BleEvent::ServicesDiscovered`] or
    /// [`BleEvent::ServiceDiscoveryFailed`].
    fn discover_services(&self, handle: &ConnectionHandle);

    /// Enumerate all characteristics of a service.
    ///
    /// Answers with [`BleEvent::CharacteristicsDiscovered`] or
    /// [`BleEvent::CharacteristicDiscoveryFailed`].
    fn discover_characteristics(&self, service: &ServiceDescriptor);

    /// Read a characteristic once.
    ///
    /// Answers with [`BleEvent::ValueUpdated`] or [`BleEvent::ValueReadFailed`].
    fn read_value(&self, characteristic: &CharacteristicDescriptor);

    /// Subscribe to notifications/indications of a characteristic.
    ///
    /// Every pushed value arrives as [`BleEvent::ValueUpdated`]; a failed
    /// subscription as [`BleEvent::ValueReadFailed`].
    fn subscribe(&self, characteristic: &CharacteristicDescriptor);
}

//! GATT walk for a connected thermometer.
//!
//! Enumerates services, then the characteristics of each service, captures
//! the first characteristic whose UUID matches the configured temperature
//! characteristic and requests its value.

use std::sync::Arc;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::ble::events::{CharacteristicDescriptor, ConnectionHandle, ServiceDescriptor};
use crate::ble::host::BleHost;
use crate::config::AcquisitionMode;
use crate::error::{DecodeError, Error};
use crate::protocol::PayloadFormat;

/// Discovery and acquisition state for one connection.
pub struct GattSession {
    /// Platform host.
    host: Arc<dyn BleHost>,
    /// Connection this session walks.
    handle: ConnectionHandle,
    /// UUID to look for.
    target_uuid: Uuid,
    /// How to acquire values once the target is found.
    acquisition: AcquisitionMode,
    /// Wire format of the target's value.
    payload_format: PayloadFormat,
    /// The captured temperature characteristic.
    target: Option<CharacteristicDescriptor>,
    /// Set after a service discovery failure.
    is_stalled: bool,
}

impl GattSession {
    /// Create a session for an established connection.
    pub fn new(
        host: Arc<dyn BleHost>,
        handle: ConnectionHandle,
        target_uuid: Uuid,
        acquisition: AcquisitionMode,
        payload_format: PayloadFormat,
    ) -> Self {
        Self {
            host,
            handle,
            target_uuid,
            acquisition,
            payload_format,
            target: None,
            is_stalled: false,
        }
    }

    /// Request full service enumeration.
    pub fn discover_services(&self) {
        debug!("Discovering services on {}", self.handle.device());
        self.host.discover_services(&self.handle);
    }

    /// Fan out characteristic discovery to every returned service.
    ///
    /// Ignored once the session has stalled.
    pub fn on_services_discovered(&self, services: &[ServiceDescriptor]) {
        if self.is_stalled {
            debug!("Ignoring {} services after failed discovery", services.len());
            return;
        }

        debug!("Discovered {} services", services.len());

        for service in services {
            if service.handle != self.handle {
                trace!("Ignoring service {} from another connection", service.uuid);
                continue;
            }
            self.discover_characteristics(service);
        }
    }

    /// Record a failed service enumeration. The session does not retry.
    pub fn on_service_discovery_failed(&mut self, reason: String) -> Error {
        self.is_stalled = true;
        Error::ServiceDiscoveryFailed { reason }
    }

    /// Request full characteristic enumeration for a service.
    pub fn discover_characteristics(&self, service: &ServiceDescriptor) {
        trace!("Discovering characteristics in service {}", service.uuid);
        self.host.discover_characteristics(service);
    }

    /// Look for the target among newly discovered characteristics.
    ///
    /// Returns `true` when the target was captured by this call and its
    /// acquisition has been requested.
    pub fn on_characteristics_discovered(
        &mut self,
        characteristics: &[CharacteristicDescriptor],
    ) -> bool {
        if self.target.is_some() {
            return false;
        }

        let Some(found) = characteristics
            .iter()
            .find(|c| c.uuid == self.target_uuid && c.handle == self.handle)
        else {
            return false;
        };

        info!(
            "Found temperature characteristic {} in service {}",
            found.uuid, found.service_uuid
        );

        self.target = Some(found.clone());
        self.request_acquisition(found);
        true
    }

    /// Decode a value update if it belongs to the captured target.
    ///
    /// Returns `None` for updates from any other characteristic.
    pub fn on_value_update(&self, uuid: &Uuid, bytes: &[u8]) -> Option<Result<f32, DecodeError>> {
        let target = self.target.as_ref()?;
        if target.uuid != *uuid {
            trace!("Ignoring value from characteristic {}", uuid);
            return None;
        }

        trace!("Value update: {} bytes, data: {:02X?}", bytes.len(), bytes);
        Some(self.payload_format.decode(bytes))
    }

    /// Re-issue a one-shot read of the target.
    pub fn request_read(&self) {
        match &self.target {
            Some(target) => self.host.read_value(target),
            None => warn!("Read requested before the temperature characteristic was found"),
        }
    }

    /// The captured temperature characteristic.
    pub fn target(&self) -> Option<&CharacteristicDescriptor> {
        self.target.as_ref()
    }

    /// The connection this session belongs to.
    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    /// Check if service discovery failed.
    pub fn is_stalled(&self) -> bool {
        self.is_stalled
    }

    fn request_acquisition(&self, target: &CharacteristicDescriptor) {
        match self.acquisition {
            AcquisitionMode::ReadOnce | AcquisitionMode::Poll { .. } => {
                self.host.read_value(target);
            }
            AcquisitionMode::Notify => {
                self.host.subscribe(target);
                self.host.read_value(target);
            }
        }
    }
}

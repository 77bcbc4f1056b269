//! [`BleHost`] implementation on top of `btleplug`.
//!
//! Each request runs in its own tokio task and posts its outcome into the
//! coordinator's event channel. Adapter events (advertisements, disconnects,
//! power changes) are pumped by a background task for the host's lifetime.

use btleplug::api::{
    Central, CentralEvent, CentralState, Characteristic, Manager as _, Peripheral as _,
    ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use bytes::Bytes;
use chrono::Utc;
use futures::stream::{Stream, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::ble::events::{
    AdapterState, BleEvent, CharacteristicDescriptor, ConnectionHandle, DeviceId,
    ServiceDescriptor,
};
use crate::ble::host::{BleHost, EventSender};
use crate::error::{Error, Result};

/// Peripherals seen by the adapter, by identifier.
type PeripheralMap = Arc<RwLock<HashMap<DeviceId, Peripheral>>>;

/// Production BLE host backed by the first system adapter.
pub struct BtleplugHost {
    /// The BLE adapter in use.
    adapter: Adapter,
    /// Coordinator event channel.
    events: EventSender,
    /// Peripherals by identifier, filled from adapter events.
    peripherals: PeripheralMap,
    /// Adapter event pump.
    event_task: JoinHandle<()>,
    /// Notification forwarder for the subscribed characteristic.
    notification_task: Mutex<Option<JoinHandle<()>>>,
}

impl BtleplugHost {
    /// Open the first Bluetooth adapter and start pumping its events.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AdapterUnavailable`] if no adapter exists.
    pub async fn new(events: EventSender) -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::AdapterUnavailable)?;

        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(Error::AdapterUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        let central_events = adapter.events().await?;
        let peripherals: PeripheralMap = Arc::new(RwLock::new(HashMap::new()));

        let event_task = tokio::spawn(Self::pump_events(
            adapter.clone(),
            central_events,
            peripherals.clone(),
            events.clone(),
        ));

        Ok(Self {
            adapter,
            events,
            peripherals,
            event_task,
            notification_task: Mutex::new(None),
        })
    }

    /// Get the underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    async fn pump_events(
        adapter: Adapter,
        mut central_events: impl Stream<Item = CentralEvent> + Unpin,
        peripherals: PeripheralMap,
        events: EventSender,
    ) {
        // btleplug has no portable power query; an adapter that hands out an
        // event stream is usable until a StateUpdate says otherwise.
        let _ = events.send(BleEvent::AdapterStateChanged(AdapterState::PoweredOn));

        while let Some(event) = central_events.next().await {
            match event {
                CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                    trace!("Device seen: {:?}", id);
                    let peripheral = match adapter.peripheral(&id).await {
                        Ok(p) => p,
                        Err(e) => {
                            trace!("Failed to get peripheral: {}", e);
                            continue;
                        }
                    };
                    Self::process_peripheral(peripheral, &peripherals, &events).await;
                }
                CentralEvent::DeviceDisconnected(id) => {
                    debug!("Device disconnected: {:?}", id);
                    let _ = events.send(BleEvent::Disconnected {
                        id: DeviceId::new(id.to_string()),
                    });
                }
                CentralEvent::StateUpdate(state) => {
                    let _ = events.send(BleEvent::AdapterStateChanged(adapter_state(state)));
                }
                _ => {}
            }
        }

        debug!("Adapter event stream ended");
    }

    async fn process_peripheral(
        peripheral: Peripheral,
        peripherals: &PeripheralMap,
        events: &EventSender,
    ) {
        let properties = match peripheral.properties().await {
            Ok(Some(p)) => p,
            _ => return,
        };

        let id = DeviceId::new(peripheral.id().to_string());
        peripherals.write().insert(id.clone(), peripheral);

        let _ = events.send(BleEvent::Advertisement {
            id,
            name: properties.local_name,
            rssi: properties.rssi,
            seen_at: Utc::now(),
        });
    }

    fn peripheral(&self, id: &DeviceId) -> Option<Peripheral> {
        self.peripherals.read().get(id).cloned()
    }

    /// Resolve a descriptor to the btleplug characteristic, posting a failure if it is gone.
    fn resolve(&self, descriptor: &CharacteristicDescriptor) -> Option<(Peripheral, Characteristic)> {
        let found = self.peripheral(descriptor.handle.device()).and_then(|p| {
            p.characteristics()
                .into_iter()
                .find(|c| c.uuid == descriptor.uuid && c.service_uuid == descriptor.service_uuid)
                .map(|c| (p, c))
        });

        if found.is_none() {
            let _ = self.events.send(BleEvent::ValueReadFailed {
                characteristic: descriptor.uuid,
                reason: "characteristic not found".to_string(),
            });
        }

        found
    }

    fn stop_notifications(&self) {
        if let Some(task) = self.notification_task.lock().take() {
            task.abort();
        }
    }
}

impl BleHost for BtleplugHost {
    fn start_scan(&self) {
        let adapter = self.adapter.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            if let Err(e) = adapter.start_scan(ScanFilter::default()).await {
                error!("Failed to start scan: {}", e);
                let _ = events.send(BleEvent::ScanFailed {
                    reason: e.to_string(),
                });
            }
        });
    }

    fn stop_scan(&self) {
        let adapter = self.adapter.clone();

        tokio::spawn(async move {
            if let Err(e) = adapter.stop_scan().await {
                warn!("Failed to stop scan: {}", e);
            }
        });
    }

    fn connect(&self, id: &DeviceId) {
        let Some(peripheral) = self.peripheral(id) else {
            let _ = self.events.send(BleEvent::ConnectFailed {
                id: id.clone(),
                reason: "unknown peripheral".to_string(),
            });
            return;
        };

        let id = id.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            let event = match peripheral.connect().await {
                Ok(()) => BleEvent::Connected {
                    handle: ConnectionHandle::new(id),
                },
                Err(e) => BleEvent::ConnectFailed {
                    id,
                    reason: e.to_string(),
                },
            };
            let _ = events.send(event);
        });
    }

    fn disconnect(&self, handle: &ConnectionHandle) {
        self.stop_notifications();

        let Some(peripheral) = self.peripheral(handle.device()) else {
            return;
        };

        tokio::spawn(async move {
            if let Err(e) = peripheral.disconnect().await {
                warn!("Failed to disconnect: {}", e);
            }
        });
    }

    fn discover_services(&self, handle: &ConnectionHandle) {
        let Some(peripheral) = self.peripheral(handle.device()) else {
            let _ = self.events.send(BleEvent::ServiceDiscoveryFailed {
                handle: handle.clone(),
                reason: "unknown peripheral".to_string(),
            });
            return;
        };

        let handle = handle.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            let event = match peripheral.discover_services().await {
                Ok(()) => BleEvent::ServicesDiscovered {
                    services: peripheral
                        .services()
                        .iter()
                        .map(|s| ServiceDescriptor {
                            uuid: s.uuid,
                            handle: handle.clone(),
                        })
                        .collect(),
                    handle,
                },
                Err(e) => BleEvent::ServiceDiscoveryFailed {
                    handle,
                    reason: e.to_string(),
                },
            };
            let _ = events.send(event);
        });
    }

    fn discover_characteristics(&self, service: &ServiceDescriptor) {
        // btleplug resolves characteristics during service discovery.
        let found = self
            .peripheral(service.handle.device())
            .and_then(|p| p.services().into_iter().find(|s| s.uuid == service.uuid));

        let event = match found {
            Some(s) => BleEvent::CharacteristicsDiscovered {
                characteristics: s
                    .characteristics
                    .iter()
                    .map(|c| CharacteristicDescriptor {
                        uuid: c.uuid,
                        service_uuid: c.service_uuid,
                        handle: service.handle.clone(),
                    })
                    .collect(),
                service: service.clone(),
            },
            None => BleEvent::CharacteristicDiscoveryFailed {
                service: service.clone(),
                reason: "service not found".to_string(),
            },
        };

        let _ = self.events.send(event);
    }

    fn read_value(&self, characteristic: &CharacteristicDescriptor) {
        let Some((peripheral, target)) = self.resolve(characteristic) else {
            return;
        };

        let events = self.events.clone();

        tokio::spawn(async move {
            let event = match peripheral.read(&target).await {
                Ok(data) => {
                    trace!("Read {} bytes from characteristic {}", data.len(), target.uuid);
                    BleEvent::ValueUpdated {
                        characteristic: target.uuid,
                        value: Bytes::from(data),
                    }
                }
                Err(e) => BleEvent::ValueReadFailed {
                    characteristic: target.uuid,
                    reason: e.to_string(),
                },
            };
            let _ = events.send(event);
        });
    }

    fn subscribe(&self, characteristic: &CharacteristicDescriptor) {
        let Some((peripheral, target)) = self.resolve(characteristic) else {
            return;
        };

        let events = self.events.clone();

        let task = tokio::spawn(async move {
            let subscribed = async {
                peripheral.subscribe(&target).await?;
                peripheral.notifications().await
            };

            let mut notifications = match subscribed.await {
                Ok(n) => n,
                Err(e) => {
                    error!("Failed to subscribe to {}: {}", target.uuid, e);
                    let _ = events.send(BleEvent::ValueReadFailed {
                        characteristic: target.uuid,
                        reason: e.to_string(),
                    });
                    return;
                }
            };

            debug!("Subscribed to notifications from {}", target.uuid);

            while let Some(notification) = notifications.next().await {
                if notification.uuid != target.uuid {
                    continue;
                }
                let event = BleEvent::ValueUpdated {
                    characteristic: notification.uuid,
                    value: Bytes::from(notification.value),
                };
                if events.send(event).is_err() {
                    break;
                }
            }

            debug!("Notification stream ended");
        });

        if let Some(previous) = self.notification_task.lock().replace(task) {
            previous.abort();
        }
    }
}

impl Drop for BtleplugHost {
    fn drop(&mut self) {
        self.event_task.abort();
        self.stop_notifications();
    }
}

fn adapter_state(state: CentralState) -> AdapterState {
    match state {
        CentralState::PoweredOn => AdapterState::PoweredOn,
        CentralState::PoweredOff => AdapterState::PoweredOff,
        _ => AdapterState::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<BtleplugHost>();
    }

    #[test]
    fn test_adapter_state_mapping() {
        assert_eq!(adapter_state(CentralState::PoweredOn), AdapterState::PoweredOn);
        assert_eq!(adapter_state(CentralState::PoweredOff), AdapterState::PoweredOff);
        assert_eq!(adapter_state(CentralState::Unknown), AdapterState::Unknown);
    }
}

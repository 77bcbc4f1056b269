//! Scripted BLE host for end-to-end tests.
//!
//! Answers every request the way a cooperative ESP32 thermometer would and
//! records each call with the (paused) tokio clock.

#![allow(dead_code)]

use ble_temp_monitor::ble::{
    uuid_from_u16, HEALTH_THERMOMETER_SERVICE_UUID, TEMPERATURE_MEASUREMENT_UUID,
};
use ble_temp_monitor::{
    BleEvent, BleHost, CharacteristicDescriptor, ConnectionHandle, DeviceId, EventSender,
    ServiceDescriptor,
};
use bytes::Bytes;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

pub const BATTERY_SERVICE_UUID: uuid::Uuid = uuid_from_u16(0x180F);
pub const BATTERY_LEVEL_UUID: uuid::Uuid = uuid_from_u16(0x2A19);

/// 25.0 as a little-endian f32.
pub const PAYLOAD_25C: [u8; 4] = [0x00, 0x00, 0xC8, 0x41];

#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    StartScan,
    StopScan,
    Connect(DeviceId),
    Disconnect(DeviceId),
    DiscoverServices(DeviceId),
    DiscoverCharacteristics(uuid::Uuid),
    Read(uuid::Uuid),
    Subscribe(uuid::Uuid),
}

struct Advertiser {
    id: DeviceId,
    name: String,
    after: Duration,
}

pub struct ScriptedHost {
    events: EventSender,
    advertisers: Vec<Advertiser>,
    payloads: Mutex<VecDeque<Vec<u8>>>,
    last_payload: Mutex<Vec<u8>>,
    calls: Mutex<Vec<(Instant, HostCall)>>,
}

impl ScriptedHost {
    pub fn new(events: EventSender) -> Self {
        Self {
            events,
            advertisers: Vec::new(),
            payloads: Mutex::new(VecDeque::new()),
            last_payload: Mutex::new(PAYLOAD_25C.to_vec()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Advertise `name` this long after every scan start.
    pub fn advertising(mut self, id: &str, name: &str, after: Duration) -> Self {
        self.advertisers.push(Advertiser {
            id: DeviceId::from(id),
            name: name.to_string(),
            after,
        });
        self
    }

    /// Values returned by successive reads; the last one repeats.
    pub fn with_payloads<I, P>(self, payloads: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<[u8]>,
    {
        self.payloads
            .lock()
            .extend(payloads.into_iter().map(|p| p.as_ref().to_vec()));
        self
    }

    pub fn calls(&self) -> Vec<(Instant, HostCall)> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &HostCall) -> usize {
        self.calls.lock().iter().filter(|(_, c)| c == call).count()
    }

    /// When `call` was first made.
    pub fn first(&self, call: &HostCall) -> Option<Instant> {
        self.calls
            .lock()
            .iter()
            .find(|(_, c)| c == call)
            .map(|(at, _)| *at)
    }

    /// When every occurrence of `call` was made.
    pub fn times(&self, call: &HostCall) -> Vec<Instant> {
        self.calls
            .lock()
            .iter()
            .filter(|(_, c)| c == call)
            .map(|(at, _)| *at)
            .collect()
    }

    fn record(&self, call: HostCall) {
        self.calls.lock().push((Instant::now(), call));
    }

    fn post(&self, event: BleEvent) {
        let _ = self.events.send(event);
    }
}

impl BleHost for ScriptedHost {
    fn start_scan(&self) {
        self.record(HostCall::StartScan);

        for advertiser in &self.advertisers {
            let events = self.events.clone();
            let id = advertiser.id.clone();
            let name = advertiser.name.clone();
            let after = advertiser.after;

            tokio::spawn(async move {
                tokio::time::sleep(after).await;
                let _ = events.send(BleEvent::Advertisement {
                    id,
                    name: Some(name),
                    rssi: Some(-60),
                    seen_at: Utc::now(),
                });
            });
        }
    }

    fn stop_scan(&self) {
        self.record(HostCall::StopScan);
    }

    fn connect(&self, id: &DeviceId) {
        self.record(HostCall::Connect(id.clone()));
        self.post(BleEvent::Connected {
            handle: ConnectionHandle::new(id.clone()),
        });
    }

    fn disconnect(&self, handle: &ConnectionHandle) {
        self.record(HostCall::Disconnect(handle.device().clone()));
    }

    fn discover_services(&self, handle: &ConnectionHandle) {
        self.record(HostCall::DiscoverServices(handle.device().clone()));
        self.post(BleEvent::ServicesDiscovered {
            handle: handle.clone(),
            services: [BATTERY_SERVICE_UUID, HEALTH_THERMOMETER_SERVICE_UUID]
                .into_iter()
                .map(|uuid| ServiceDescriptor {
                    uuid,
                    handle: handle.clone(),
                })
                .collect(),
        });
    }

    fn discover_characteristics(&self, service: &ServiceDescriptor) {
        self.record(HostCall::DiscoverCharacteristics(service.uuid));

        let uuid = if service.uuid == HEALTH_THERMOMETER_SERVICE_UUID {
            TEMPERATURE_MEASUREMENT_UUID
        } else {
            BATTERY_LEVEL_UUID
        };

        self.post(BleEvent::CharacteristicsDiscovered {
            service: service.clone(),
            characteristics: vec![CharacteristicDescriptor {
                uuid,
                service_uuid: service.uuid,
                handle: service.handle.clone(),
            }],
        });
    }

    fn read_value(&self, characteristic: &CharacteristicDescriptor) {
        self.record(HostCall::Read(characteristic.uuid));

        let payload = match self.payloads.lock().pop_front() {
            Some(next) => {
                *self.last_payload.lock() = next.clone();
                next
            }
            None => self.last_payload.lock().clone(),
        };

        self.post(BleEvent::ValueUpdated {
            characteristic: characteristic.uuid,
            value: Bytes::from(payload),
        });
    }

    fn subscribe(&self, characteristic: &CharacteristicDescriptor) {
        self.record(HostCall::Subscribe(characteristic.uuid));
    }
}

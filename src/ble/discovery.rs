//! Scan lifecycle and target selection.
//!
//! A discovery cycle opens one scan window. When the window's timer fires the
//! coordinator asks [`DiscoveryController::on_window_expired`] for the target,
//! which ends the scan and runs selection exactly once.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use crate::ble::events::{AdapterState, BleEvent, DeviceId};
use crate::ble::host::{BleHost, EventSender};
use crate::error::{Error, Result};

/// A peripheral seen while scanning.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiscoveredDevice {
    /// Platform identifier.
    pub id: DeviceId,
    /// Advertised local name, if any.
    pub name: Option<String>,
    /// Last reported signal strength in dBm.
    pub rssi: Option<i16>,
    /// First sighting.
    pub first_seen_at: DateTime<Utc>,
    /// Most recent sighting.
    pub last_seen_at: DateTime<Utc>,
}

/// Owns scanning, the discovery set, and the scan-window timer.
pub struct DiscoveryController {
    /// Platform host.
    host: Arc<dyn BleHost>,
    /// Channel the window timer posts into.
    events: EventSender,
    /// Length of each scan window.
    scan_window: Duration,
    /// Whether a scan is active.
    is_scanning: bool,
    /// Identifies the current scan cycle; stale timers carry older values.
    session: u64,
    /// Discovered devices in first-seen order.
    devices: Vec<DiscoveredDevice>,
    /// Position of each device in `devices`.
    index: HashMap<DeviceId, usize>,
    /// Bumped when a device is added or learns its name.
    revision: u64,
    /// Pending window timer.
    window_timer: Option<JoinHandle<()>>,
}

impl DiscoveryController {
    /// Create a controller that scans through `host`.
    pub fn new(host: Arc<dyn BleHost>, events: EventSender, scan_window: Duration) -> Self {
        Self {
            host,
            events,
            scan_window,
            is_scanning: false,
            session: 0,
            devices: Vec::new(),
            index: HashMap::new(),
            revision: 0,
            window_timer: None,
        }
    }

    /// Open a new scan window.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AdapterUnavailable`] unless the adapter is powered on.
    pub fn start_scan(&mut self, adapter_state: AdapterState) -> Result<()> {
        if !adapter_state.is_powered_on() {
            return Err(Error::AdapterUnavailable);
        }

        if self.is_scanning {
            debug!("Already scanning, ignoring start request");
            return Ok(());
        }

        self.session += 1;
        self.is_scanning = true;

        info!(
            "Starting BLE scan (session {}, window {:?})",
            self.session, self.scan_window
        );

        self.host.start_scan();
        self.arm_window_timer();

        Ok(())
    }

    /// Stop scanning. Does nothing if no scan is active.
    pub fn stop_scan(&mut self) {
        if !self.is_scanning {
            debug!("Not scanning, ignoring stop request");
            return;
        }

        info!("Stopping BLE scan (session {})", self.session);

        self.mark_stopped();
        self.host.stop_scan();
    }

    /// Record that the platform ended the scan on its own.
    pub fn mark_stopped(&mut self) {
        self.is_scanning = false;

        if let Some(timer) = self.window_timer.take() {
            timer.abort();
        }
    }

    /// Record an advertisement, returning `true` for a first sighting.
    pub fn on_advertisement(
        &mut self,
        id: DeviceId,
        name: Option<String>,
        rssi: Option<i16>,
        seen_at: DateTime<Utc>,
    ) -> bool {
        if let Some(&position) = self.index.get(&id) {
            let device = &mut self.devices[position];
            device.last_seen_at = seen_at;
            device.rssi = rssi.or(device.rssi);
            if device.name.is_none() && name.is_some() {
                device.name = name;
                self.revision += 1;
            }
            trace!("Device updated: {}", id);
            return false;
        }

        info!(
            "Discovered: {} ({})",
            name.as_deref().unwrap_or("Unknown"),
            id
        );

        self.revision += 1;
        self.index.insert(id.clone(), self.devices.len());
        self.devices.push(DiscoveredDevice {
            id,
            name,
            rssi,
            first_seen_at: seen_at,
            last_seen_at: seen_at,
        });

        true
    }

    /// First device, in discovery order, advertising exactly `name`.
    pub fn select_target(&self, name: &str) -> Option<DiscoveredDevice> {
        self.devices
            .iter()
            .find(|d| d.name.as_deref() == Some(name))
            .cloned()
    }

    /// Handle a window timer firing.
    ///
    /// Returns `None` for a stale timer, otherwise ends the scan and returns
    /// the selection result.
    pub fn on_window_expired(
        &mut self,
        session: u64,
        name: &str,
    ) -> Option<Option<DiscoveredDevice>> {
        if session != self.session || !self.is_scanning {
            trace!("Ignoring stale scan window (session {})", session);
            return None;
        }

        self.stop_scan();

        Some(self.select_target(name))
    }

    /// Check if currently scanning.
    pub fn is_scanning(&self) -> bool {
        self.is_scanning
    }

    /// The current scan session identifier.
    pub fn session(&self) -> u64 {
        self.session
    }

    /// Changes whenever a device is added or named.
    ///
    /// Repeat sightings that only refresh `rssi` or `last_seen_at` leave it
    /// untouched.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// All discovered devices in discovery order.
    pub fn devices(&self) -> &[DiscoveredDevice] {
        &self.devices
    }

    fn arm_window_timer(&mut self) {
        if let Some(timer) = self.window_timer.take() {
            timer.abort();
        }

        let events = self.events.clone();
        let session = self.session;
        let window = self.scan_window;

        self.window_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let _ = events.send(BleEvent::ScanWindowExpired { session });
        }));
    }
}

impl Drop for DiscoveryController {
    fn drop(&mut self) {
        if let Some(timer) = self.window_timer.take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::host::{event_channel, MockBleHost};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn quiet_host() -> Arc<dyn BleHost> {
        let mut host = MockBleHost::new();
        host.expect_start_scan().return_const(());
        host.expect_stop_scan().return_const(());
        Arc::new(host)
    }

    fn controller() -> DiscoveryController {
        let (tx, _rx) = event_channel();
        DiscoveryController::new(quiet_host(), tx, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_start_scan_requires_power() {
        let mut host = MockBleHost::new();
        host.expect_start_scan().never();
        let (tx, _rx) = event_channel();
        let mut discovery = DiscoveryController::new(Arc::new(host), tx, Duration::from_secs(5));

        assert!(matches!(
            discovery.start_scan(AdapterState::PoweredOff),
            Err(Error::AdapterUnavailable)
        ));
        assert!(!discovery.is_scanning());
    }

    #[tokio::test]
    async fn test_start_scan_is_idempotent() {
        let mut host = MockBleHost::new();
        host.expect_start_scan().times(1).return_const(());
        let (tx, _rx) = event_channel();
        let mut discovery = DiscoveryController::new(Arc::new(host), tx, Duration::from_secs(5));

        discovery.start_scan(AdapterState::PoweredOn).unwrap();
        discovery.start_scan(AdapterState::PoweredOn).unwrap();

        assert!(discovery.is_scanning());
        assert_eq!(discovery.session(), 1);
    }

    #[tokio::test]
    async fn test_stop_scan_when_idle_is_noop() {
        let mut host = MockBleHost::new();
        host.expect_stop_scan().never();
        let (tx, _rx) = event_channel();
        let mut discovery = DiscoveryController::new(Arc::new(host), tx, Duration::from_secs(5));

        discovery.stop_scan();
        assert!(!discovery.is_scanning());
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_timer_fires_once() {
        let (tx, mut rx) = event_channel();
        let mut discovery = DiscoveryController::new(quiet_host(), tx, Duration::from_secs(5));

        let started = tokio::time::Instant::now();
        discovery.start_scan(AdapterState::PoweredOn).unwrap();

        match rx.recv().await {
            Some(BleEvent::ScanWindowExpired { session }) => assert_eq!(session, 1),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_discards_stale_window() {
        let (tx, _rx) = event_channel();
        let mut discovery = DiscoveryController::new(quiet_host(), tx, Duration::from_secs(5));

        discovery.start_scan(AdapterState::PoweredOn).unwrap();
        discovery.stop_scan();
        discovery.start_scan(AdapterState::PoweredOn).unwrap();

        assert_eq!(discovery.on_window_expired(1, "ESP32_BLE_GATT"), None);
        assert!(discovery.is_scanning());
        assert_eq!(discovery.on_window_expired(2, "ESP32_BLE_GATT"), Some(None));
        assert!(!discovery.is_scanning());
    }

    #[tokio::test]
    async fn test_window_expiry_selects_target() {
        let mut discovery = controller();
        let now = Utc::now();

        discovery.start_scan(AdapterState::PoweredOn).unwrap();
        discovery.on_advertisement(DeviceId::from("a"), Some("foo".into()), None, now);
        discovery.on_advertisement(DeviceId::from("b"), Some("ESP32_BLE_GATT".into()), Some(-60), now);

        let selected = discovery
            .on_window_expired(discovery.session(), "ESP32_BLE_GATT")
            .flatten()
            .unwrap();
        assert_eq!(selected.id, DeviceId::from("b"));
    }

    #[test]
    fn test_repeat_sighting_updates_in_place() {
        let (tx, _rx) = event_channel();
        let mut discovery =
            DiscoveryController::new(Arc::new(MockBleHost::new()), tx, Duration::from_secs(5));
        let first = Utc::now();
        let later = first + chrono::Duration::seconds(3);

        assert!(discovery.on_advertisement(DeviceId::from("a"), None, Some(-70), first));
        assert!(!discovery.on_advertisement(DeviceId::from("a"), Some("foo".into()), None, later));

        assert_eq!(discovery.devices().len(), 1);
        let device = &discovery.devices()[0];
        assert_eq!(device.first_seen_at, first);
        assert_eq!(device.last_seen_at, later);
        assert_eq!(device.name.as_deref(), Some("foo"));
        assert_eq!(device.rssi, Some(-70));
    }

    #[test]
    fn test_revision_tracks_membership_and_names() {
        let (tx, _rx) = event_channel();
        let mut discovery =
            DiscoveryController::new(Arc::new(MockBleHost::new()), tx, Duration::from_secs(5));
        let now = Utc::now();
        assert_eq!(discovery.revision(), 0);

        discovery.on_advertisement(DeviceId::from("a"), None, Some(-70), now);
        assert_eq!(discovery.revision(), 1);

        // rssi and timestamp refreshes are not revisions.
        discovery.on_advertisement(DeviceId::from("a"), None, Some(-50), now);
        assert_eq!(discovery.revision(), 1);

        discovery.on_advertisement(DeviceId::from("a"), Some("foo".into()), None, now);
        assert_eq!(discovery.revision(), 2);
        discovery.on_advertisement(DeviceId::from("a"), Some("bar".into()), None, now);
        assert_eq!(discovery.revision(), 2);

        discovery.on_advertisement(DeviceId::from("b"), None, None, now);
        assert_eq!(discovery.revision(), 3);
    }

    #[test]
    fn test_select_target_is_case_sensitive_and_first_wins() {
        let (tx, _rx) = event_channel();
        let mut discovery =
            DiscoveryController::new(Arc::new(MockBleHost::new()), tx, Duration::from_secs(5));
        let now = Utc::now();

        discovery.on_advertisement(DeviceId::from("a"), Some("esp32_ble_gatt".into()), None, now);
        discovery.on_advertisement(DeviceId::from("b"), Some("ESP32_BLE_GATT".into()), None, now);
        discovery.on_advertisement(DeviceId::from("c"), Some("ESP32_BLE_GATT".into()), None, now);

        let selected = discovery.select_target("ESP32_BLE_GATT").unwrap();
        assert_eq!(selected.id, DeviceId::from("b"));
        assert!(discovery.select_target("missing").is_none());
    }

    proptest! {
        #[test]
        fn prop_discovery_set_has_unique_ids(ids in proptest::collection::vec(0u8..8, 0..64)) {
            let (tx, _rx) = event_channel();
            let mut discovery =
                DiscoveryController::new(Arc::new(MockBleHost::new()), tx, Duration::from_secs(5));

            for id in &ids {
                discovery.on_advertisement(DeviceId::new(id.to_string()), None, None, Utc::now());
            }

            let mut seen: Vec<&DeviceId> = discovery.devices().iter().map(|d| &d.id).collect();
            let total = seen.len();
            seen.sort();
            seen.dedup();
            prop_assert_eq!(seen.len(), total);

            let mut distinct = ids.clone();
            distinct.sort();
            distinct.dedup();
            prop_assert_eq!(total, distinct.len());
        }

        #[test]
        fn prop_selection_ignores_arrival_order(position in 0usize..3) {
            let (tx, _rx) = event_channel();
            let mut discovery =
                DiscoveryController::new(Arc::new(MockBleHost::new()), tx, Duration::from_secs(5));

            let mut names = vec!["foo", "bar"];
            names.insert(position, "ESP32_BLE_GATT");
            for (i, name) in names.iter().enumerate() {
                discovery.on_advertisement(
                    DeviceId::new(format!("dev-{}", i)),
                    Some(name.to_string()),
                    None,
                    Utc::now(),
                );
            }

            let selected = discovery.select_target("ESP32_BLE_GATT").unwrap();
            prop_assert_eq!(selected.id, DeviceId::new(format!("dev-{}", position)));
        }
    }
}

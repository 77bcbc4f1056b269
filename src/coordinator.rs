//! Central-role state machine.
//!
//! [`BleCentralCoordinator`] owns the adapter state, the discovery set, the
//! connection handle and the reading history. It is driven entirely by
//! [`BleEvent`]s, one at a time, from a single task.

use chrono::Utc;
use parking_lot::RwLock;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::ble::connection::CoordinatorState;
use crate::ble::discovery::{DiscoveredDevice, DiscoveryController};
use crate::ble::events::{
    AdapterState, BleEvent, CharacteristicDescriptor, ConnectionHandle, DeviceId,
    ServiceDescriptor,
};
use crate::ble::gatt::GattSession;
use crate::ble::host::{BleHost, EventSender};
use crate::config::{AcquisitionMode, MonitorConfig, SelectionPolicy};
use crate::data::{ReadingBuffer, TemperatureReading};
use crate::error::Error;

/// Observable snapshot of the coordinator.
#[derive(Debug, Clone, Default)]
pub struct MonitorStatus {
    /// Last reported adapter state.
    pub adapter_state: AdapterState,
    /// Lifecycle state.
    pub state: CoordinatorState,
    /// Whether a scan is active.
    pub is_scanning: bool,
    /// Discovered devices in discovery order.
    pub devices: Vec<DiscoveredDevice>,
    /// Currently connected peripheral.
    pub connected_device: Option<DeviceId>,
    /// Most recent accepted temperature.
    pub current_temperature: Option<f32>,
    /// Most recent reported error.
    pub last_error: Option<Arc<Error>>,
}

/// Change notification for observers.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// The lifecycle state changed.
    StateChanged {
        /// Previous state.
        from: CoordinatorState,
        /// New state.
        to: CoordinatorState,
    },
    /// Scanning started or stopped.
    ScanningChanged(bool),
    /// A device was seen for the first time.
    DeviceDiscovered(DiscoveredDevice),
    /// A reading was accepted into the history.
    Reading(TemperatureReading),
    /// An error was reported.
    Fault(Arc<Error>),
}

/// The central-role state machine.
pub struct BleCentralCoordinator {
    /// Platform host.
    host: Arc<dyn BleHost>,
    /// Channel timers post into.
    events: EventSender,
    /// Configuration.
    config: MonitorConfig,
    /// Lifecycle state.
    state: CoordinatorState,
    /// Last reported adapter state.
    adapter_state: AdapterState,
    /// Scan lifecycle and discovery set.
    discovery: DiscoveryController,
    /// Device a connect request is outstanding for.
    pending_connect: Option<DeviceId>,
    /// Connected peripheral.
    connection: Option<ConnectionHandle>,
    /// GATT walk of the connected peripheral.
    session: Option<GattSession>,
    /// Accepted readings.
    readings: ReadingBuffer,
    /// Identifies the current streaming session for poll ticks.
    poll_generation: u64,
    /// Pending poll timer.
    poll_timer: Option<JoinHandle<()>>,
    /// Discovery revision last copied into `status`.
    published_revision: Option<u64>,
    /// Snapshot shared with observers.
    status: Arc<RwLock<MonitorStatus>>,
    /// Change notifications.
    monitor_tx: broadcast::Sender<MonitorEvent>,
}

impl BleCentralCoordinator {
    /// Create a coordinator.
    ///
    /// `events` must feed the channel this coordinator's events are read from;
    /// timers use it to post back.
    pub fn new(
        host: Arc<dyn BleHost>,
        events: EventSender,
        config: MonitorConfig,
        readings: ReadingBuffer,
        status: Arc<RwLock<MonitorStatus>>,
        monitor_tx: broadcast::Sender<MonitorEvent>,
    ) -> Self {
        let discovery = DiscoveryController::new(host.clone(), events.clone(), config.scan_window);

        Self {
            host,
            events,
            config,
            state: CoordinatorState::Idle,
            adapter_state: AdapterState::Unknown,
            discovery,
            pending_connect: None,
            connection: None,
            session: None,
            readings,
            poll_generation: 0,
            poll_timer: None,
            published_revision: None,
            status,
            monitor_tx,
        }
    }

    /// Get the current lifecycle state.
    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    /// Get the last reported adapter state.
    pub fn adapter_state(&self) -> AdapterState {
        self.adapter_state
    }

    /// Get the connected peripheral, if any.
    pub fn connection(&self) -> Option<&ConnectionHandle> {
        self.connection.as_ref()
    }

    /// Get the discovery controller.
    pub fn discovery(&self) -> &DiscoveryController {
        &self.discovery
    }

    /// Process one event.
    ///
    /// Returns [`ControlFlow::Break`] once the coordinator has shut down.
    pub fn handle_event(&mut self, event: BleEvent) -> ControlFlow<()> {
        let was_scanning = self.discovery.is_scanning();

        match event {
            BleEvent::AdapterStateChanged(state) => self.on_adapter_state(state),
            BleEvent::Advertisement {
                id,
                name,
                rssi,
                seen_at,
            } => self.on_advertisement(id, name, rssi, seen_at),
            BleEvent::ScanFailed { reason } => self.on_scan_failed(reason),
            BleEvent::ScanWindowExpired { session } => self.on_scan_window_expired(session),
            BleEvent::Connected { handle } => self.on_connected(handle),
            BleEvent::ConnectFailed { id, reason } => self.on_connect_failed(id, reason),
            BleEvent::Disconnected { id } => self.on_disconnected(id),
            BleEvent::ServicesDiscovered { handle, services } => {
                self.on_services_discovered(handle, services)
            }
            BleEvent::ServiceDiscoveryFailed { handle, reason } => {
                self.on_service_discovery_failed(handle, reason)
            }
            BleEvent::CharacteristicsDiscovered {
                service,
                characteristics,
            } => self.on_characteristics_discovered(service, characteristics),
            BleEvent::CharacteristicDiscoveryFailed { service, reason } => {
                self.on_characteristic_discovery_failed(service, reason)
            }
            BleEvent::ValueUpdated {
                characteristic,
                value,
            } => self.on_value_updated(characteristic, &value),
            BleEvent::ValueReadFailed {
                characteristic,
                reason,
            } => self.on_value_read_failed(characteristic, reason),
            BleEvent::PollTick { generation } => self.on_poll_tick(generation),
            BleEvent::Start => self.start(),
            BleEvent::Stop => self.stop(),
            BleEvent::Shutdown => {
                self.shutdown();
                self.publish_status(was_scanning);
                return ControlFlow::Break(());
            }
        }

        self.publish_status(was_scanning);
        ControlFlow::Continue(())
    }

    /// Begin a scan window. Idempotent.
    pub fn start(&mut self) {
        match self.discovery.start_scan(self.adapter_state) {
            Ok(()) => {
                if self.state == CoordinatorState::Idle && self.discovery.is_scanning() {
                    self.transition(CoordinatorState::Scanning);
                }
            }
            Err(e) => self.report(e),
        }
    }

    /// Stop scanning. Never disconnects a held peripheral.
    pub fn stop(&mut self) {
        self.discovery.stop_scan();
        if self.state == CoordinatorState::Scanning {
            self.transition(CoordinatorState::Idle);
        }
    }

    fn on_adapter_state(&mut self, state: AdapterState) {
        if state == self.adapter_state {
            return;
        }

        info!("Adapter state: {:?} -> {:?}", self.adapter_state, state);
        self.adapter_state = state;

        if state.is_powered_on() {
            if self.config.auto_scan && self.state == CoordinatorState::Idle {
                self.start();
            }
            return;
        }

        warn!("Bluetooth is not available ({:?})", state);
        if self.discovery.is_scanning() {
            self.discovery.mark_stopped();
        }
        if self.state == CoordinatorState::Scanning {
            self.transition(CoordinatorState::Idle);
        }
    }

    fn on_advertisement(
        &mut self,
        id: DeviceId,
        name: Option<String>,
        rssi: Option<i16>,
        seen_at: chrono::DateTime<Utc>,
    ) {
        let matches_target = name.as_deref() == Some(self.config.target_name.as_str());

        if self.discovery.on_advertisement(id.clone(), name, rssi, seen_at) {
            if let Some(device) = self.discovery.devices().last().cloned() {
                let _ = self.monitor_tx.send(MonitorEvent::DeviceDiscovered(device));
            }
        }

        if self.config.selection == SelectionPolicy::FirstMatch
            && matches_target
            && self.state == CoordinatorState::Scanning
        {
            info!("Target {} advertised, ending scan early", id);
            self.discovery.stop_scan();
            self.begin_connect(id);
        }
    }

    fn on_scan_failed(&mut self, reason: String) {
        self.discovery.mark_stopped();
        if self.state == CoordinatorState::Scanning {
            self.transition(CoordinatorState::Idle);
        }
        self.report(Error::ScanFailed { reason });
    }

    fn on_scan_window_expired(&mut self, session: u64) {
        let Some(selected) = self
            .discovery
            .on_window_expired(session, &self.config.target_name)
        else {
            return;
        };

        if self.state != CoordinatorState::Scanning {
            debug!("Scan window closed while {}, not selecting", self.state);
            return;
        }

        match selected {
            Some(device) => self.begin_connect(device.id),
            None => {
                info!(
                    "No device named {:?} found, scan can be restarted",
                    self.config.target_name
                );
                self.transition(CoordinatorState::Idle);
            }
        }
    }

    fn begin_connect(&mut self, id: DeviceId) {
        info!("Connecting to {}", id);
        self.pending_connect = Some(id.clone());
        self.transition(CoordinatorState::AwaitingConnect);
        self.host.connect(&id);
    }

    fn on_connected(&mut self, handle: ConnectionHandle) {
        if self.state != CoordinatorState::AwaitingConnect
            || self.pending_connect.as_ref() != Some(handle.device())
        {
            if self.connection.as_ref() != Some(&handle) {
                warn!("Releasing unexpected connection to {}", handle.device());
                self.host.disconnect(&handle);
            }
            return;
        }

        info!("Connected to {}", handle.device());
        self.pending_connect = None;
        self.connection = Some(handle.clone());
        self.transition(CoordinatorState::Connected);

        let session = GattSession::new(
            self.host.clone(),
            handle,
            self.config.characteristic_uuid,
            self.config.acquisition,
            self.config.payload_format,
        );
        session.discover_services();
        self.session = Some(session);
        self.transition(CoordinatorState::Discovering);
    }

    fn on_connect_failed(&mut self, id: DeviceId, reason: String) {
        if self.state != CoordinatorState::AwaitingConnect
            || self.pending_connect.as_ref() != Some(&id)
        {
            debug!("Ignoring connect failure for {}", id);
            return;
        }

        self.pending_connect = None;
        self.settle();
        self.report(Error::ConnectFailed { reason });
    }

    fn on_disconnected(&mut self, id: DeviceId) {
        if self.state == CoordinatorState::AwaitingConnect
            && self.pending_connect.as_ref() == Some(&id)
        {
            self.on_connect_failed(id, "disconnected while connecting".to_string());
            return;
        }

        if self.connection.as_ref().map(ConnectionHandle::device) != Some(&id) {
            debug!("Ignoring disconnect of {}", id);
            return;
        }

        info!("Peripheral {} disconnected", id);
        self.release_connection();
        self.transition(CoordinatorState::Disconnected);
        self.report(Error::PeripheralDisconnected);
        self.settle();
    }

    fn on_services_discovered(&mut self, handle: ConnectionHandle, services: Vec<ServiceDescriptor>) {
        match &self.session {
            Some(session) if *session.handle() == handle => {
                session.on_services_discovered(&services)
            }
            _ => debug!("Ignoring services for {}", handle.device()),
        }
    }

    fn on_service_discovery_failed(&mut self, handle: ConnectionHandle, reason: String) {
        let error = match &mut self.session {
            Some(session) if *session.handle() == handle => {
                session.on_service_discovery_failed(reason)
            }
            _ => return,
        };
        // Stay in Discovering until the peripheral disconnects.
        self.report(error);
    }

    fn on_characteristics_discovered(
        &mut self,
        service: ServiceDescriptor,
        characteristics: Vec<CharacteristicDescriptor>,
    ) {
        let captured = match &mut self.session {
            Some(session) if *session.handle() == service.handle => {
                session.on_characteristics_discovered(&characteristics)
            }
            _ => return,
        };

        if captured && self.state == CoordinatorState::Discovering {
            self.transition(CoordinatorState::Streaming);
            if let AcquisitionMode::Poll { interval } = self.config.acquisition {
                self.arm_poll_timer(interval);
            }
        }
    }

    fn on_characteristic_discovery_failed(&mut self, service: ServiceDescriptor, reason: String) {
        if self.connection.as_ref() != Some(&service.handle) {
            return;
        }
        warn!("Characteristic discovery failed for service {}", service.uuid);
        self.report(Error::CharacteristicDiscoveryFailed { reason });
    }

    fn on_value_updated(&mut self, characteristic: uuid::Uuid, value: &[u8]) {
        let Some(result) = self
            .session
            .as_ref()
            .and_then(|s| s.on_value_update(&characteristic, value))
        else {
            return;
        };

        let temperature = match result {
            Ok(temperature) => temperature,
            Err(e) => {
                warn!("Dropping unreadable sample: {}", e);
                return;
            }
        };

        match self.readings.push(temperature, Utc::now()) {
            Some(reading) => {
                debug!("Temperature: {:.2} C", reading.temperature);
                let _ = self.monitor_tx.send(MonitorEvent::Reading(reading));
            }
            None => debug!("Discarding placeholder temperature {}", temperature),
        }
    }

    fn on_value_read_failed(&mut self, characteristic: uuid::Uuid, reason: String) {
        let is_target = self
            .session
            .as_ref()
            .and_then(GattSession::target)
            .map(|t| t.uuid == characteristic)
            .unwrap_or(false);

        if is_target {
            self.report(Error::ValueReadFailed { reason });
        }
    }

    fn on_poll_tick(&mut self, generation: u64) {
        if generation != self.poll_generation || self.state != CoordinatorState::Streaming {
            return;
        }
        if let Some(session) = &self.session {
            session.request_read();
        }
    }

    fn shutdown(&mut self) {
        info!("Shutting down BLE coordinator");

        self.discovery.stop_scan();
        if let Some(handle) = self.connection.clone() {
            self.host.disconnect(&handle);
        }
        self.release_connection();
        self.pending_connect = None;
        if self.state != CoordinatorState::Idle {
            self.transition(CoordinatorState::Idle);
        }
    }

    fn release_connection(&mut self) {
        self.connection = None;
        self.session = None;
        self.poll_generation += 1;
        if let Some(timer) = self.poll_timer.take() {
            timer.abort();
        }
    }

    fn arm_poll_timer(&mut self, interval: std::time::Duration) {
        if let Some(timer) = self.poll_timer.take() {
            timer.abort();
        }

        self.poll_generation += 1;
        let generation = self.poll_generation;
        let events = self.events.clone();

        self.poll_timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; the initial read is already in flight.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if events.send(BleEvent::PollTick { generation }).is_err() {
                    break;
                }
            }
        }));
    }

    /// Leave a connection lifecycle, resuming a scan started meanwhile.
    fn settle(&mut self) {
        self.transition(CoordinatorState::Idle);
        if self.discovery.is_scanning() {
            self.transition(CoordinatorState::Scanning);
        }
    }

    fn transition(&mut self, to: CoordinatorState) {
        let from = self.state;
        if from == to {
            return;
        }

        debug!("Coordinator state changed: {} -> {}", from, to);
        self.state = to;
        let _ = self.monitor_tx.send(MonitorEvent::StateChanged { from, to });
    }

    fn report(&mut self, error: Error) {
        match &error {
            Error::PeripheralDisconnected => warn!("{}", error),
            _ => error!("{}", error),
        }

        let error = Arc::new(error);
        self.status.write().last_error = Some(error.clone());
        let _ = self.monitor_tx.send(MonitorEvent::Fault(error));
    }

    fn publish_status(&mut self, was_scanning: bool) {
        let is_scanning = self.discovery.is_scanning();
        if is_scanning != was_scanning {
            let _ = self.monitor_tx.send(MonitorEvent::ScanningChanged(is_scanning));
        }

        // Repeat sightings only refresh the device list when a scan ends.
        let revision = self.discovery.revision();
        let refresh_devices =
            self.published_revision != Some(revision) || is_scanning != was_scanning;
        self.published_revision = Some(revision);

        let mut status = self.status.write();
        status.adapter_state = self.adapter_state;
        status.state = self.state;
        status.is_scanning = is_scanning;
        if refresh_devices {
            status.devices = self.discovery.devices().to_vec();
        }
        status.connected_device = self.connection.as_ref().map(|h| h.device().clone());
        status.current_temperature = self.readings.latest().map(|r| r.temperature);
    }
}

impl Drop for BleCentralCoordinator {
    fn drop(&mut self) {
        if let Some(timer) = self.poll_timer.take() {
            timer.abort();
        }
    }
}

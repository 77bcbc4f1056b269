//! High-level handle to the acquisition pipeline.
//!
//! [`TemperatureMonitor`] runs a [`BleCentralCoordinator`] on its own task and
//! exposes a read-only view of its state.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::ble::btleplug_host::BtleplugHost;
use crate::ble::connection::CoordinatorState;
use crate::ble::discovery::DiscoveredDevice;
use crate::ble::events::BleEvent;
use crate::ble::host::{event_channel, BleHost, EventReceiver, EventSender};
use crate::config::MonitorConfig;
use crate::coordinator::{BleCentralCoordinator, MonitorEvent, MonitorStatus};
use crate::data::{ReadingBuffer, TemperatureReading};
use crate::error::{Error, Result};

/// Handle for registered callbacks.
///
/// When dropped, the callback is automatically unregistered.
pub struct CallbackHandle {
    id: u64,
    unregister_fn: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl CallbackHandle {
    pub(crate) fn new(id: u64, unregister_fn: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id,
            unregister_fn: Some(Box::new(unregister_fn)),
        }
    }

    /// Unregister this callback.
    pub fn unregister(mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }

    /// Get the callback ID.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }
}

/// A running temperature monitor.
pub struct TemperatureMonitor {
    /// Command channel into the coordinator task.
    events: EventSender,
    /// Configuration the coordinator was started with.
    config: MonitorConfig,
    /// Accepted readings, shared with the coordinator.
    readings: ReadingBuffer,
    /// Snapshot written by the coordinator.
    status: Arc<RwLock<MonitorStatus>>,
    /// Change notifications.
    monitor_tx: broadcast::Sender<MonitorEvent>,
    /// Callback ID counter.
    callback_counter: AtomicU64,
    /// Coordinator task.
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TemperatureMonitor {
    /// Open the system Bluetooth adapter and start the coordinator.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available or the configuration
    /// is invalid.
    pub async fn new(config: MonitorConfig) -> Result<Self> {
        config.validate()?;

        let (tx, rx) = event_channel();
        let host = BtleplugHost::new(tx.clone()).await?;

        Self::spawn(Arc::new(host), tx, rx, config)
    }

    /// Start a coordinator over an existing host.
    ///
    /// `events` and `receiver` must be the two ends of the channel the host
    /// posts into. Must be called from within a tokio runtime.
    pub fn spawn(
        host: Arc<dyn BleHost>,
        events: EventSender,
        mut receiver: EventReceiver,
        config: MonitorConfig,
    ) -> Result<Self> {
        config.validate()?;

        let readings = ReadingBuffer::new(config.sentinel, config.history_limit);
        let status = Arc::new(RwLock::new(MonitorStatus::default()));
        let (monitor_tx, _) = broadcast::channel(64);

        let mut coordinator = BleCentralCoordinator::new(
            host,
            events.clone(),
            config.clone(),
            readings.clone(),
            status.clone(),
            monitor_tx.clone(),
        );

        info!("Starting monitor for {:?}", config.target_name);

        let task = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                if coordinator.handle_event(event).is_break() {
                    break;
                }
            }
            debug!("Coordinator task finished");
        });

        Ok(Self {
            events,
            config,
            readings,
            status,
            monitor_tx,
            callback_counter: AtomicU64::new(0),
            task: Mutex::new(Some(task)),
        })
    }

    /// Begin a scan window.
    pub fn start(&self) -> Result<()> {
        self.send(BleEvent::Start)
    }

    /// Stop scanning. A connected peripheral stays connected.
    pub fn stop(&self) -> Result<()> {
        self.send(BleEvent::Stop)
    }

    /// Stop scanning, disconnect and wait for the coordinator task to exit.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down monitor");
        self.send(BleEvent::Shutdown)?;

        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Coordinator task ended abnormally: {}", e);
            }
        }

        Ok(())
    }

    /// Get a snapshot of the coordinator's state.
    pub fn status(&self) -> MonitorStatus {
        self.status.read().clone()
    }

    /// Get the lifecycle state.
    pub fn state(&self) -> CoordinatorState {
        self.status.read().state
    }

    /// Check if scanning is active.
    pub fn is_scanning(&self) -> bool {
        self.status.read().is_scanning
    }

    /// Get every device discovered so far.
    pub fn devices(&self) -> Vec<DiscoveredDevice> {
        self.status.read().devices.clone()
    }

    /// Get the most recent accepted temperature in Celsius.
    pub fn current_temperature(&self) -> Option<f32> {
        self.readings.latest().map(|r| r.temperature)
    }

    /// Get the reading history, oldest first.
    pub fn readings(&self) -> Vec<TemperatureReading> {
        self.readings.snapshot()
    }

    /// Get the most recent reported error.
    pub fn last_error(&self) -> Option<Arc<Error>> {
        self.status.read().last_error.clone()
    }

    /// Get the configuration.
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.monitor_tx.subscribe()
    }

    /// Register a callback for accepted readings.
    pub fn on_reading<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(&TemperatureReading) + Send + Sync + 'static,
    {
        let callback_id = self.callback_counter.fetch_add(1, Ordering::SeqCst);
        let mut rx = self.monitor_tx.subscribe();

        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(MonitorEvent::Reading(reading)) => callback(&reading),
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Reading callback lagged, {} events skipped", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        CallbackHandle::new(callback_id, move || {
            handle.abort();
        })
    }

    fn send(&self, event: BleEvent) -> Result<()> {
        self.events.send(event).map_err(|_e| Error::MonitorStopped)
    }
}

impl Drop for TemperatureMonitor {
    fn drop(&mut self) {
        let _ = self.events.send(BleEvent::Shutdown);
    }
}

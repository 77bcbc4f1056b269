//! Monitor configuration.

use std::time::Duration;
use uuid::Uuid;

use crate::ble::uuids::{DEFAULT_TARGET_NAME, TEMPERATURE_MEASUREMENT_UUID};
use crate::data::DISCONNECTED_SENTINEL;
use crate::error::{Error, Result};
use crate::protocol::PayloadFormat;

/// Default length of a discovery scan window.
pub const DEFAULT_SCAN_WINDOW: Duration = Duration::from_secs(5);

/// When the coordinator picks its target out of the discovery set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SelectionPolicy {
    /// Select once, when the scan window expires.
    #[default]
    WindowExpiry,
    /// Select on the first matching advertisement; the window only bounds how
    /// long to look.
    FirstMatch,
}

/// How temperature values are acquired once the characteristic is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AcquisitionMode {
    /// A single read right after discovery.
    #[default]
    ReadOnce,
    /// Re-read on a fixed interval for as long as the peripheral stays connected.
    Poll {
        /// Time between reads.
        interval: Duration,
    },
    /// Subscribe to indications/notifications after an initial read.
    Notify,
}

/// Configuration for a [`TemperatureMonitor`](crate::TemperatureMonitor).
///
/// ```
/// use ble_temp_monitor::{AcquisitionMode, MonitorConfig};
/// use std::time::Duration;
///
/// let config = MonitorConfig::default()
///     .with_target_name("Kitchen")
///     .with_acquisition(AcquisitionMode::Poll { interval: Duration::from_secs(2) })
///     .with_history_limit(Some(20));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MonitorConfig {
    /// Advertised name of the peripheral to connect to (case-sensitive).
    pub target_name: String,
    /// UUID of the temperature characteristic.
    pub characteristic_uuid: Uuid,
    /// Length of each scan window.
    pub scan_window: Duration,
    /// Target selection policy.
    pub selection: SelectionPolicy,
    /// Value acquisition mode.
    pub acquisition: AcquisitionMode,
    /// Wire format of the characteristic value.
    pub payload_format: PayloadFormat,
    /// Readings at or below this value are discarded.
    pub sentinel: f32,
    /// Rolling history size; `None` keeps every reading.
    pub history_limit: Option<usize>,
    /// Start scanning automatically when the adapter powers on.
    pub auto_scan: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            target_name: DEFAULT_TARGET_NAME.to_string(),
            characteristic_uuid: TEMPERATURE_MEASUREMENT_UUID,
            scan_window: DEFAULT_SCAN_WINDOW,
            selection: SelectionPolicy::default(),
            acquisition: AcquisitionMode::default(),
            payload_format: PayloadFormat::default(),
            sentinel: DISCONNECTED_SENTINEL,
            history_limit: None,
            auto_scan: true,
        }
    }
}

impl MonitorConfig {
    /// Set the advertised name to connect to.
    pub fn with_target_name(mut self, name: impl Into<String>) -> Self {
        self.target_name = name.into();
        self
    }

    /// Set the temperature characteristic UUID.
    pub fn with_characteristic_uuid(mut self, uuid: Uuid) -> Self {
        self.characteristic_uuid = uuid;
        self
    }

    /// Set the scan window length.
    pub fn with_scan_window(mut self, window: Duration) -> Self {
        self.scan_window = window;
        self
    }

    /// Set the target selection policy.
    pub fn with_selection(mut self, selection: SelectionPolicy) -> Self {
        self.selection = selection;
        self
    }

    /// Set the acquisition mode.
    pub fn with_acquisition(mut self, acquisition: AcquisitionMode) -> Self {
        self.acquisition = acquisition;
        self
    }

    /// Set the payload wire format.
    pub fn with_payload_format(mut self, format: PayloadFormat) -> Self {
        self.payload_format = format;
        self
    }

    /// Set the rejection threshold.
    pub fn with_sentinel(mut self, sentinel: f32) -> Self {
        self.sentinel = sentinel;
        self
    }

    /// Set the rolling history size.
    pub fn with_history_limit(mut self, limit: Option<usize>) -> Self {
        self.history_limit = limit;
        self
    }

    /// Enable or disable scanning on adapter power-on.
    pub fn with_auto_scan(mut self, auto_scan: bool) -> Self {
        self.auto_scan = auto_scan;
        self
    }

    /// Check the configuration for values the monitor cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.scan_window.is_zero() {
            return Err(invalid("scan_window", format!("{:?}", self.scan_window)));
        }

        if let AcquisitionMode::Poll { interval } = self.acquisition {
            if interval.is_zero() {
                return Err(invalid("acquisition.interval", format!("{:?}", interval)));
            }
        }

        if self.history_limit == Some(0) {
            return Err(invalid("history_limit", "0".to_string()));
        }

        if !self.sentinel.is_finite() {
            return Err(invalid("sentinel", self.sentinel.to_string()));
        }

        Ok(())
    }
}

fn invalid(name: &str, value: String) -> Error {
    Error::InvalidParameter {
        name: name.to_string(),
        value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_defaults() {
        let config = MonitorConfig::default();
        assert_eq!(config.target_name, "ESP32_BLE_GATT");
        assert_eq!(config.characteristic_uuid, TEMPERATURE_MEASUREMENT_UUID);
        assert_eq!(config.scan_window, Duration::from_secs(5));
        assert_eq!(config.selection, SelectionPolicy::WindowExpiry);
        assert_eq!(config.acquisition, AcquisitionMode::ReadOnce);
        assert_eq!(config.history_limit, None);
        assert!(config.auto_scan);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_durations() {
        let config = MonitorConfig::default().with_scan_window(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidParameter { ref name, .. }) if name == "scan_window"
        ));

        let config = MonitorConfig::default().with_acquisition(AcquisitionMode::Poll {
            interval: Duration::ZERO,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_history() {
        let config = MonitorConfig::default().with_history_limit(Some(0));
        assert!(config.validate().is_err());

        let config = MonitorConfig::default().with_sentinel(f32::NAN);
        assert!(config.validate().is_err());
    }
}

//! BLE Service and Characteristic UUIDs.
//!
//! The thermometer firmware exposes the standard Health Thermometer service
//! with a single Temperature Measurement characteristic.

use uuid::Uuid;

/// Expand a 16-bit SIG-assigned number onto the Bluetooth base UUID.
pub const fn uuid_from_u16(short: u16) -> Uuid {
    Uuid::from_u128(((short as u128) << 96) | 0x0000_0000_0000_1000_8000_00805f9b34fb)
}

/// Standard BLE Health Thermometer Service UUID (0x1809).
pub const HEALTH_THERMOMETER_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x0000_1809_0000_1000_8000_00805f9b34fb);

/// Temperature Measurement characteristic UUID (0x2A1C, Read, Indicate).
pub const TEMPERATURE_MEASUREMENT_UUID: Uuid =
    Uuid::from_u128(0x0000_2a1c_0000_1000_8000_00805f9b34fb);

/// Advertised name of the ESP32 thermometer.
pub const DEFAULT_TARGET_NAME: &str = "ESP32_BLE_GATT";

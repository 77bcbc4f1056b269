//! Temperature characteristic payload decoding.
//!
//! The ESP32 firmware copies the raw sensor `float` straight into the
//! Temperature Measurement characteristic, so the value on the wire is a
//! 4-byte little-endian IEEE-754 single, not the IEEE-11073 FLOAT that the
//! Bluetooth SIG assigns to uuid `2A1C`. Both layouts are supported; the raw
//! float is the default.

use crate::error::DecodeError;
use crate::utils::fahrenheit_to_celsius;

/// Size of the raw float payload.
pub const FLOAT32_PAYLOAD_LEN: usize = 4;

/// Size of a SIG Temperature Measurement payload without optional fields (flags + FLOAT).
pub const IEEE11073_PAYLOAD_LEN: usize = 5;

/// Decode a raw 4-byte little-endian IEEE-754 temperature.
///
/// Bytes past the first four are ignored. No range checking is done here;
/// sentinel filtering happens when readings are pushed into the
/// [`ReadingBuffer`](crate::data::ReadingBuffer).
///
/// ```
/// use ble_temp_monitor::protocol::decode_temperature;
///
/// assert_eq!(decode_temperature(&[0x00, 0x00, 0x20, 0x41]), Ok(10.0));
/// ```
pub fn decode_temperature(bytes: &[u8]) -> Result<f32, DecodeError> {
    match bytes.get(..FLOAT32_PAYLOAD_LEN) {
        Some(&[b0, b1, b2, b3]) => Ok(f32::from_le_bytes([b0, b1, b2, b3])),
        _ => Err(DecodeError::InsufficientData {
            len: bytes.len(),
            needed: FLOAT32_PAYLOAD_LEN,
        }),
    }
}

/// Wire format of the temperature characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PayloadFormat {
    /// Little-endian IEEE-754 `f32` in the first four bytes (ESP32 firmware).
    #[default]
    Float32Le,
    /// Bluetooth SIG Temperature Measurement: flags byte followed by an IEEE-11073 FLOAT.
    Ieee11073,
}

impl PayloadFormat {
    /// Decode a payload into degrees Celsius.
    pub fn decode(&self, bytes: &[u8]) -> Result<f32, DecodeError> {
        match self {
            Self::Float32Le => decode_temperature(bytes),
            Self::Ieee11073 => decode_temperature_measurement(bytes),
        }
    }
}

/// Decode a SIG Temperature Measurement value.
///
/// Layout:
/// - Byte 0: flags (bit 0 set = Fahrenheit, bits 1-2 announce optional fields)
/// - Bytes 1-4: FLOAT, 24-bit signed mantissa (LE) then 8-bit signed exponent
///
/// Optional timestamp and temperature type fields are ignored.
pub fn decode_temperature_measurement(bytes: &[u8]) -> Result<f32, DecodeError> {
    if bytes.len() < IEEE11073_PAYLOAD_LEN {
        return Err(DecodeError::InsufficientData {
            len: bytes.len(),
            needed: IEEE11073_PAYLOAD_LEN,
        });
    }

    let flags = bytes[0];
    let raw = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], 0]);
    let exponent = bytes[4] as i8;

    // 0x7FFFFF NaN, 0x800000 NRes, 0x7FFFFE +INF, 0x800002 -INF, 0x800001 reserved
    if matches!(raw, 0x7F_FFFE | 0x7F_FFFF | 0x80_0000..=0x80_0002) {
        return Err(DecodeError::ReservedValue { raw });
    }

    // Sign-extend the 24-bit mantissa.
    let mantissa = ((raw << 8) as i32) >> 8;
    let value = mantissa as f32 * 10f32.powi(exponent as i32);

    if flags & 0x01 != 0 {
        Ok(fahrenheit_to_celsius(value))
    } else {
        Ok(value)
    }
}

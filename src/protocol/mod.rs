//! Protocol module for decoding characteristic payloads.
//!
//! This module contains the temperature payload decoders for:
//! - The raw little-endian `f32` written by the ESP32 firmware
//! - The Bluetooth SIG Temperature Measurement (IEEE-11073 FLOAT) layout

pub mod temperature;

pub use temperature::{decode_temperature, decode_temperature_measurement, PayloadFormat};

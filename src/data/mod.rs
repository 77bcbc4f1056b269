//! Data structures for acquired telemetry.
//!
//! This module contains the timestamped temperature readings and the
//! shared history buffer consumers render from.

pub mod readings;

pub use readings::{ReadingBuffer, TemperatureReading, DISCONNECTED_SENTINEL};

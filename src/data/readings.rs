//! Temperature reading history.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::Arc;
use uuid::Uuid;

use crate::utils::celsius_to_fahrenheit;

/// Placeholder temperature reported before a sensor value exists.
///
/// Values at or below this threshold are never stored.
pub const DISCONNECTED_SENTINEL: f32 = -99.0;

/// A single timestamped temperature sample.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TemperatureReading {
    /// Unique identifier of this sample.
    pub id: Uuid,
    /// When the value update was received.
    pub time: DateTime<Utc>,
    /// Temperature in degrees Celsius.
    pub temperature: f32,
    /// Whether the sample passed ingestion filtering.
    pub valid: bool,
}

impl TemperatureReading {
    /// Get the temperature in Fahrenheit.
    pub fn fahrenheit(&self) -> f32 {
        celsius_to_fahrenheit(self.temperature)
    }
}

/// Ordered, shared history of temperature readings.
///
/// Cloning a `ReadingBuffer` yields another handle to the same storage, so
/// the coordinator can insert while observers take snapshots from other
/// threads.
#[derive(Debug, Clone)]
pub struct ReadingBuffer {
    /// Readings in insertion order.
    readings: Arc<RwLock<VecDeque<TemperatureReading>>>,
    /// Values at or below this are rejected.
    sentinel: f32,
    /// Rolling window size; `None` keeps everything.
    limit: Option<usize>,
}

impl Default for ReadingBuffer {
    fn default() -> Self {
        Self::new(DISCONNECTED_SENTINEL, None)
    }
}

impl ReadingBuffer {
    /// Create a buffer with the given sentinel and optional rolling window.
    pub fn new(sentinel: f32, limit: Option<usize>) -> Self {
        Self {
            readings: Arc::new(RwLock::new(VecDeque::new())),
            sentinel,
            limit,
        }
    }

    /// Append a reading unless it is at or below the sentinel.
    ///
    /// Returns the stored reading, or `None` if the value was rejected.
    pub fn push(&self, temperature: f32, time: DateTime<Utc>) -> Option<TemperatureReading> {
        // NaN compares as None and is rejected along with the sentinel.
        if temperature.partial_cmp(&self.sentinel) != Some(Ordering::Greater) {
            return None;
        }

        let reading = TemperatureReading {
            id: Uuid::new_v4(),
            time,
            temperature,
            valid: true,
        };

        let mut readings = self.readings.write();
        readings.push_back(reading.clone());
        if let Some(limit) = self.limit {
            while readings.len() > limit {
                readings.pop_front();
            }
        }

        Some(reading)
    }

    /// Copy of the current history, oldest first.
    pub fn snapshot(&self) -> Vec<TemperatureReading> {
        self.readings.read().iter().cloned().collect()
    }

    /// The most recent reading.
    pub fn latest(&self) -> Option<TemperatureReading> {
        self.readings.read().back().cloned()
    }

    /// Number of stored readings.
    pub fn len(&self) -> usize {
        self.readings.read().len()
    }

    /// Check if no readings are stored.
    pub fn is_empty(&self) -> bool {
        self.readings.read().is_empty()
    }

    /// The rolling window size, if any.
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// The rejection threshold.
    pub fn sentinel(&self) -> f32 {
        self.sentinel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_sentinel_boundary() {
        let buffer = ReadingBuffer::default();
        let now = Utc::now();

        assert!(buffer.push(-100.0, now).is_none());
        assert_eq!(buffer.len(), 0);

        assert!(buffer.push(-99.0, now).is_none());
        assert_eq!(buffer.len(), 0);

        assert!(buffer.push(-98.9, now).is_some());
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_nan_is_rejected() {
        let buffer = ReadingBuffer::default();
        assert!(buffer.push(f32::NAN, Utc::now()).is_none());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_equal_timestamps_keep_insertion_order() {
        let buffer = ReadingBuffer::default();
        let now = Utc::now();

        buffer.push(20.0, now);
        buffer.push(21.0, now);
        buffer.push(22.0, now);

        let temps: Vec<f32> = buffer.snapshot().iter().map(|r| r.temperature).collect();
        assert_eq!(temps, vec![20.0, 21.0, 22.0]);
    }

    #[test]
    fn test_readings_have_unique_ids() {
        let buffer = ReadingBuffer::default();
        let now = Utc::now();
        let a = buffer.push(20.0, now).unwrap();
        let b = buffer.push(20.0, now).unwrap();
        assert_ne!(a.id, b.id);
        assert!(a.valid && b.valid);
    }

    #[test]
    fn test_rolling_window_evicts_oldest() {
        let buffer = ReadingBuffer::new(DISCONNECTED_SENTINEL, Some(3));
        let start = Utc::now();

        for i in 0..5 {
            buffer.push(i as f32, start + Duration::seconds(i));
        }

        let temps: Vec<f32> = buffer.snapshot().iter().map(|r| r.temperature).collect();
        assert_eq!(temps, vec![2.0, 3.0, 4.0]);
        assert_eq!(buffer.latest().map(|r| r.temperature), Some(4.0));
    }

    #[test]
    fn test_clones_share_storage() {
        let buffer = ReadingBuffer::default();
        let observer = buffer.clone();

        buffer.push(25.0, Utc::now());
        assert_eq!(observer.len(), 1);
    }

    #[test]
    fn test_reading_fahrenheit() {
        let buffer = ReadingBuffer::default();
        let reading = buffer.push(100.0, Utc::now()).unwrap();
        assert!((reading.fahrenheit() - 212.0).abs() < 0.001);
    }

    proptest! {
        #[test]
        fn prop_snapshot_is_ordered_and_filtered(values in proptest::collection::vec(-200.0f32..200.0, 0..64)) {
            let buffer = ReadingBuffer::default();
            let now = Utc::now();

            for value in &values {
                buffer.push(*value, now);
            }

            let expected: Vec<f32> = values.iter().copied().filter(|v| *v > DISCONNECTED_SENTINEL).collect();
            let stored: Vec<f32> = buffer.snapshot().iter().map(|r| r.temperature).collect();

            prop_assert_eq!(stored, expected);
            prop_assert!(buffer.snapshot().iter().all(|r| r.temperature > DISCONNECTED_SENTINEL));
        }

        #[test]
        fn prop_rolling_window_never_exceeds_limit(limit in 1usize..16, count in 0usize..64) {
            let buffer = ReadingBuffer::new(DISCONNECTED_SENTINEL, Some(limit));
            for i in 0..count {
                buffer.push(i as f32, Utc::now());
            }
            prop_assert_eq!(buffer.len(), count.min(limit));
        }
    }
}

//! Temperature unit helpers.

/// Convert Celsius to Fahrenheit.
///
/// # Example
///
/// ```
/// use ble_temp_monitor::celsius_to_fahrenheit;
///
/// assert!((celsius_to_fahrenheit(25.0) - 77.0).abs() < 0.001);
/// ```
#[inline]
pub fn celsius_to_fahrenheit(celsius: f32) -> f32 {
    celsius * 9.0 / 5.0 + 32.0
}

/// Convert Fahrenheit to Celsius.
///
/// Used when a thermometer reports in Fahrenheit (IEEE-11073 flag bit 0).
#[inline]
pub fn fahrenheit_to_celsius(fahrenheit: f32) -> f32 {
    (fahrenheit - 32.0) * 5.0 / 9.0
}

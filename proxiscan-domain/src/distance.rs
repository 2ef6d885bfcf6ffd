use serde::{Deserialize, Serialize};

/// Returned when the radio reported no usable signal.
pub const UNKNOWN_DISTANCE: f64 = -1.0;

/// Log-distance path loss calibration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    /// RSSI in dBm measured one metre from the peripheral.
    pub measured_power_at_1m: i16,
    /// Environment factor, 2.0 in free space and up to ~4.0 indoors.
    pub path_loss_exponent: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            measured_power_at_1m: -59,
            path_loss_exponent: 2.0,
        }
    }
}

impl Calibration {
    #[must_use]
    pub fn estimate(&self, rssi: i16) -> f64 {
        estimate_distance(rssi, self.measured_power_at_1m, self.path_loss_exponent)
    }
}

/// Estimates distance in metres as
/// `10 ^ ((measured_power_at_1m - rssi) / (10 * path_loss_exponent))`.
///
/// An `rssi` of exactly zero, or a path loss exponent that is not a positive
/// finite number, yields [`UNKNOWN_DISTANCE`].
#[must_use]
pub fn estimate_distance(rssi: i16, measured_power_at_1m: i16, path_loss_exponent: f64) -> f64 {
    if rssi == 0 || !path_loss_exponent.is_finite() || path_loss_exponent <= 0.0 {
        return UNKNOWN_DISTANCE;
    }
    let loss = i32::from(measured_power_at_1m) - i32::from(rssi);
    let exponent = f64::from(loss) / (10.0 * path_loss_exponent);
    let distance = 10f64.powf(exponent);
    if distance.is_finite() { distance } else { UNKNOWN_DISTANCE }
}

/// `None` for the sentinel, the distance otherwise.
#[must_use]
pub fn known(distance: f64) -> Option<f64> {
    (distance >= 0.0).then_some(distance)
}

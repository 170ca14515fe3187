//! Signal strength to distance estimation
//!
//! Log-distance path loss: `d = 10 ^ ((tx_power - rssi) / (10 * n))`.
//! Frequency does not enter the formula; it only classifies band and channel.

use serde::{Deserialize, Serialize};

use crate::{
    DEFAULT_PATH_LOSS_EXPONENT, DEFAULT_TX_POWER_DBM, DISTANCE_SENTINEL_M, MIN_DISTANCE_M,
};

/// Parameters of the log-distance path loss model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathLossModel {
    /// Expected signal strength at 1 m (dBm)
    pub tx_power_dbm: f64,
    /// Environment exponent (2.0 free space, higher indoors)
    pub exponent: f64,
}

impl Default for PathLossModel {
    fn default() -> Self {
        Self {
            tx_power_dbm: DEFAULT_TX_POWER_DBM,
            exponent: DEFAULT_PATH_LOSS_EXPONENT,
        }
    }
}

impl PathLossModel {
    pub fn new(tx_power_dbm: f64, exponent: f64) -> Self {
        Self {
            tx_power_dbm,
            exponent,
        }
    }

    /// Estimated distance in meters, rounded to one decimal.
    ///
    /// Signals at or above the reference power clamp to [`MIN_DISTANCE_M`];
    /// a non-finite result yields [`DISTANCE_SENTINEL_M`].
    pub fn estimate(&self, signal_strength: i32, _frequency_mhz: u32) -> f64 {
        let rssi = signal_strength as f64;
        if rssi >= self.tx_power_dbm {
            return MIN_DISTANCE_M;
        }

        let meters = 10f64.powf((self.tx_power_dbm - rssi) / (10.0 * self.exponent));
        if !meters.is_finite() {
            return DISTANCE_SENTINEL_M;
        }

        let rounded = (meters * 10.0).round() / 10.0;
        if !rounded.is_finite() {
            return DISTANCE_SENTINEL_M;
        }
        rounded.max(MIN_DISTANCE_M)
    }
}

/// Estimate distance with the default model (-30 dBm reference, n = 2.5)
pub fn estimate_distance(signal_strength: i32, frequency_mhz: u32) -> f64 {
    PathLossModel::default().estimate(signal_strength, frequency_mhz)
}

/// Radio band a frequency falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Band {
    /// 2412 - 2484 MHz
    Ghz2_4,
    /// 5170 - 5825 MHz
    Ghz5,
    Unknown,
}

impl Band {
    pub fn from_frequency(frequency_mhz: u32) -> Self {
        match frequency_mhz {
            2412..=2484 => Band::Ghz2_4,
            5170..=5825 => Band::Ghz5,
            _ => Band::Unknown,
        }
    }
}

/// WiFi channel number for a frequency, 0 when unclassified
pub fn channel_for_frequency(frequency_mhz: u32) -> u16 {
    match Band::from_frequency(frequency_mhz) {
        Band::Ghz2_4 => ((frequency_mhz - 2412) / 5 + 1) as u16,
        Band::Ghz5 => ((frequency_mhz - 5170) / 5 + 34) as u16,
        Band::Unknown => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_at_reference_power() {
        assert_eq!(estimate_distance(-30, 2412), 0.1);
        assert_eq!(estimate_distance(-20, 2412), 0.1);
        assert_eq!(estimate_distance(0, 5220), 0.1);
    }

    #[test]
    fn test_known_distances() {
        // 10^((-30 + 55) / 25) = 10^1
        assert_eq!(estimate_distance(-55, 5220), 10.0);
        // 10^0.6 ≈ 3.98
        assert_eq!(estimate_distance(-45, 2412), 4.0);
        // 10^0.04 ≈ 1.096
        assert_eq!(estimate_distance(-31, 2412), 1.1);
    }

    #[test]
    fn test_weaker_signal_is_never_closer() {
        let mut previous = estimate_distance(-31, 2412);
        for rssi in (-127..-31).rev() {
            let d = estimate_distance(rssi, 2412);
            assert!(d >= previous, "rssi {} gave {} < {}", rssi, d, previous);
            previous = d;
        }
    }

    #[test]
    fn test_frequency_does_not_change_distance() {
        assert_eq!(estimate_distance(-70, 2412), estimate_distance(-70, 5785));
    }

    #[test]
    fn test_non_finite_falls_back_to_sentinel() {
        let degenerate = PathLossModel::new(-30.0, 0.0);
        assert_eq!(degenerate.estimate(-60, 2412), DISTANCE_SENTINEL_M);

        assert_eq!(estimate_distance(i32::MIN, 2412), DISTANCE_SENTINEL_M);
    }

    #[test]
    fn test_channel_classification() {
        assert_eq!(channel_for_frequency(2412), 1);
        assert_eq!(channel_for_frequency(2437), 6);
        assert_eq!(channel_for_frequency(5180), 36);
        assert_eq!(channel_for_frequency(5220), 44);
        assert_eq!(channel_for_frequency(5825), 165);
        assert_eq!(channel_for_frequency(2402), 0);
        assert_eq!(channel_for_frequency(0), 0);
        assert_eq!(Band::from_frequency(6000), Band::Unknown);
    }
}

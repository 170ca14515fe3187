//! PANDA Core - Device fusion and risk engine
//!
//! This crate provides the pure, I/O-free primitives:
//! - Observation and device record types
//! - Log-distance path loss model (signal strength -> meters)
//! - Additive risk scoring heuristic
//! - Fusion registry with staleness decay
//! - Radar projection onto a character grid

pub mod observation;
pub mod distance;
pub mod risk;
pub mod registry;
pub mod radar;

pub use observation::*;
pub use distance::*;
pub use risk::*;
pub use registry::*;
pub use radar::*;

/// Seconds a device may go unobserved before it is evicted
pub const DEFAULT_DECAY_WINDOW_SECS: i64 = 60;

/// Reference transmit power at 1 m (dBm)
pub const DEFAULT_TX_POWER_DBM: f64 = -30.0;

/// Path loss exponent for a typical indoor environment
pub const DEFAULT_PATH_LOSS_EXPONENT: f64 = 2.5;

/// Smallest distance ever reported (observer co-located with the device)
pub const MIN_DISTANCE_M: f64 = 0.1;

/// Reported when the distance model produces a non-finite value
pub const DISTANCE_SENTINEL_M: f64 = 99.9;

/// Minimum risk score
pub const MIN_RISK: u8 = 0;

/// Maximum risk score
pub const MAX_RISK: u8 = 100;

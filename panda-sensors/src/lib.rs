//! PANDA Sensors
//!
//! Platform sensing behind a single contract:
//! - `ObservationSource` trait with a failure-swallowing, time-bounded capture
//! - Termux:API WiFi and BLE scans
//! - LAN neighbor table with latency-derived signal strength
//! - Mock source for development hosts
//! - Platform detection, source selection and observer geolocation

pub mod source;
pub mod termux;
pub mod lan;
pub mod mock;
pub mod platform;
pub mod geo;

pub use source::*;
pub use termux::*;
pub use lan::*;
pub use mock::*;
pub use platform::*;
pub use geo::*;

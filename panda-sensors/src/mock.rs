//! Simulated source for hosts without any sensing capability

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;

use panda_core::{Observation, ObservationKind};

use crate::{CaptureError, ObservationSource};

/// Emits one fixed 5 GHz access point with a little signal jitter
pub struct MockSource {
    jitter_dbm: i32,
}

impl MockSource {
    pub fn new(jitter_dbm: i32) -> Self {
        Self {
            jitter_dbm: jitter_dbm.abs(),
        }
    }
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new(2)
    }
}

#[async_trait]
impl ObservationSource for MockSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn try_capture(&self) -> Result<Vec<Observation>, CaptureError> {
        let jitter = rand::thread_rng().gen_range(-self.jitter_dbm..=self.jitter_dbm);

        Ok(vec![Observation::builder(ObservationKind::Wifi, "00:11:22:33:44:55")
            .label("Mock-WiFi-5G")
            .signal_strength(-55 + jitter)
            .frequency_mhz(5220)
            .security("WPA2")
            .observed_at(Utc::now())
            .build()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_access_point() {
        let source = MockSource::default();
        let observations = source.try_capture().await.unwrap();

        assert_eq!(observations.len(), 1);
        let ap = &observations[0];
        assert_eq!(ap.hardware_id, "00:11:22:33:44:55");
        assert_eq!(ap.frequency_mhz, 5220);
        assert!((-57..=-53).contains(&ap.signal_strength));
    }

    #[tokio::test]
    async fn test_zero_jitter_is_fixed() {
        let observations = MockSource::new(0).try_capture().await.unwrap();
        assert_eq!(observations[0].signal_strength, -55);
    }
}

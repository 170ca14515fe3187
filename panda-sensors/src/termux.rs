//! Termux:API radio scans (Android)
//!
//! `termux-wifi-scaninfo` and `termux-bluetooth-scan` print JSON arrays.
//! Parsing is kept separate from command execution so it can be tested
//! against captured output.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

use panda_core::{Observation, ObservationKind};

use crate::{run_command, CaptureError, ObservationSource, DEFAULT_COMMAND_TIMEOUT};

/// BLE advertising channel 37
pub const BLE_ADVERTISING_MHZ: u32 = 2402;

#[derive(Debug, Deserialize)]
struct WifiScanEntry {
    bssid: Option<String>,
    ssid: Option<String>,
    rssi: Option<i32>,
    #[serde(alias = "frequency_mhz")]
    frequency: Option<u32>,
    capabilities: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BleScanEntry {
    address: Option<String>,
    name: Option<String>,
    rssi: Option<i32>,
}

/// Parse `termux-wifi-scaninfo` output
pub fn parse_wifi_scan(json: &str, observed_at: DateTime<Utc>) -> Result<Vec<Observation>, CaptureError> {
    let entries: Vec<WifiScanEntry> = serde_json::from_str(json)?;

    Ok(entries
        .into_iter()
        .filter_map(|entry| {
            let bssid = entry.bssid.filter(|b| !b.trim().is_empty())?;
            Some(
                Observation::builder(ObservationKind::Wifi, &bssid)
                    .label(entry.ssid.as_deref().unwrap_or_default())
                    .signal_strength(entry.rssi.unwrap_or(-100))
                    .frequency_mhz(entry.frequency.unwrap_or(2412))
                    .security(entry.capabilities.as_deref().unwrap_or("[OPEN]"))
                    .observed_at(observed_at)
                    .build(),
            )
        })
        .collect())
}

/// Parse `termux-bluetooth-scan` output
pub fn parse_ble_scan(json: &str, observed_at: DateTime<Utc>) -> Result<Vec<Observation>, CaptureError> {
    let entries: Vec<BleScanEntry> = serde_json::from_str(json)?;

    Ok(entries
        .into_iter()
        .filter_map(|entry| {
            let address = entry.address.filter(|a| !a.trim().is_empty())?;
            let name = entry
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| "BLE Device".to_string());
            Some(
                Observation::builder(ObservationKind::Ble, &address)
                    .label(&name)
                    .signal_strength(entry.rssi.unwrap_or(-100))
                    .frequency_mhz(BLE_ADVERTISING_MHZ)
                    .security("BLE")
                    .observed_at(observed_at)
                    .build(),
            )
        })
        .collect())
}

/// WiFi access points via `termux-wifi-scaninfo`
pub struct TermuxWifiSource {
    command_timeout: Duration,
}

impl TermuxWifiSource {
    pub fn new(command_timeout: Duration) -> Self {
        Self { command_timeout }
    }
}

impl Default for TermuxWifiSource {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_TIMEOUT)
    }
}

#[async_trait]
impl ObservationSource for TermuxWifiSource {
    fn name(&self) -> &str {
        "termux-wifi"
    }

    async fn try_capture(&self) -> Result<Vec<Observation>, CaptureError> {
        let output = run_command("termux-wifi-scaninfo", &[], self.command_timeout).await?;
        parse_wifi_scan(&output, Utc::now())
    }
}

/// BLE advertisers via `termux-bluetooth-scan`
pub struct TermuxBleSource {
    scan_secs: u32,
    command_timeout: Duration,
}

impl TermuxBleSource {
    pub fn new(scan_secs: u32, command_timeout: Duration) -> Self {
        Self {
            scan_secs,
            command_timeout,
        }
    }
}

impl Default for TermuxBleSource {
    fn default() -> Self {
        // The scan itself runs for two seconds, leave room to print
        Self::new(2, DEFAULT_COMMAND_TIMEOUT + Duration::from_secs(1))
    }
}

#[async_trait]
impl ObservationSource for TermuxBleSource {
    fn name(&self) -> &str {
        "termux-ble"
    }

    async fn try_capture(&self) -> Result<Vec<Observation>, CaptureError> {
        let secs = self.scan_secs.to_string();
        let output = run_command("termux-bluetooth-scan", &["-t", &secs], self.command_timeout).await?;
        parse_ble_scan(&output, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wifi_scan() {
        let json = r#"[
            {"bssid": "aa:bb:cc:dd:ee:01", "ssid": "CafeNet", "rssi": -48,
             "frequency_mhz": 2437, "capabilities": "[WPA2-PSK-CCMP][ESS]"},
            {"bssid": "aa:bb:cc:dd:ee:02", "ssid": "", "rssi": -70, "frequency": 5180},
            {"ssid": "NoAddress", "rssi": -60}
        ]"#;

        let observations = parse_wifi_scan(json, Utc::now()).unwrap();
        assert_eq!(observations.len(), 2);

        let cafe = &observations[0];
        assert_eq!(cafe.hardware_id, "AA:BB:CC:DD:EE:01");
        assert_eq!(cafe.kind, ObservationKind::Wifi);
        assert_eq!(cafe.frequency_mhz, 2437);
        assert_eq!(cafe.security_descriptor, "[WPA2-PSK-CCMP][ESS]");

        let hidden = &observations[1];
        assert!(hidden.is_hidden());
        assert_eq!(hidden.frequency_mhz, 5180);
        assert_eq!(hidden.security_descriptor, "[OPEN]");
    }

    #[test]
    fn test_parse_wifi_scan_rejects_api_error() {
        let json = r#"{"API_ERROR": "Location needs to be enabled on the device"}"#;
        assert!(matches!(parse_wifi_scan(json, Utc::now()), Err(CaptureError::Parse(_))));
    }

    #[test]
    fn test_parse_ble_scan() {
        let json = r#"[
            {"address": "11:22:33:44:55:66", "name": "Band 7", "rssi": -62},
            {"address": "11:22:33:44:55:67", "name": null, "rssi": -80}
        ]"#;

        let observations = parse_ble_scan(json, Utc::now()).unwrap();
        assert_eq!(observations.len(), 2);
        assert_eq!(observations[0].label, "Band 7");
        assert_eq!(observations[0].kind, ObservationKind::Ble);
        assert_eq!(observations[0].frequency_mhz, BLE_ADVERTISING_MHZ);
        assert_eq!(observations[1].label, "BLE Device");
        assert_eq!(observations[1].security_descriptor, "BLE");
    }
}

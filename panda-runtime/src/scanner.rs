//! Scan loop
//!
//! Drives the fusion registry on a fixed cadence:
//! - Every tick captures all sources concurrently, each within its own budget
//! - The combined batch is merged in one step, including the decay sweep
//! - The resulting snapshot goes to the event log and the cycle callback
//! - A watch channel stops the loop; a cycle cut off before its merge is dropped

use chrono::Utc;
use futures::future::join_all;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use panda_core::{Observation, Registry, Snapshot};
use panda_sensors::{select_sources, ObservationSource, Platform};

use crate::{EventLog, PandaConfig};

/// Scanner timing
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Time between cycle starts
    pub interval: Duration,
    /// Budget for each source capture
    pub source_timeout: Duration,
    /// Stop after this long, `None` runs until shutdown
    pub max_runtime: Option<Duration>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2000),
            source_timeout: Duration::from_millis(2000),
            max_runtime: None,
        }
    }
}

impl From<&PandaConfig> for ScannerConfig {
    fn from(config: &PandaConfig) -> Self {
        Self {
            interval: config.interval(),
            source_timeout: config.source_timeout(),
            max_runtime: config.max_runtime(),
        }
    }
}

/// Outcome of one scan cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// Observations captured across all sources
    pub observed: usize,
    /// Devices in the registry after the merge
    pub devices: usize,
    /// Devices evicted by the decay sweep
    pub evicted: usize,
    /// Registry contents published by this cycle
    pub snapshot: Snapshot,
}

/// Periodic capture and fusion
pub struct Scanner {
    config: ScannerConfig,
    registry: Registry,
    sources: Vec<Box<dyn ObservationSource>>,
    event_log: Option<EventLog>,
}

impl Scanner {
    pub fn new(config: ScannerConfig, registry: Registry, sources: Vec<Box<dyn ObservationSource>>) -> Self {
        Self {
            config,
            registry,
            sources,
            event_log: None,
        }
    }

    /// Build the scanner described by a configuration for `platform`
    pub fn from_config(config: &PandaConfig, platform: Platform) -> Self {
        let registry = Registry::with_policy(config.fusion_policy());
        let sources = select_sources(platform, config.sources.enabled.as_deref(), config.source_timeout());
        let mut scanner = Self::new(ScannerConfig::from(config), registry, sources);

        if let Some(path) = &config.event_log.path {
            scanner = scanner.with_event_log(EventLog::new(path, config.event_log.policy));
        }

        scanner
    }

    pub fn with_event_log(mut self, event_log: EventLog) -> Self {
        self.event_log = Some(event_log);
        self
    }

    /// Shared handle to the registry
    pub fn registry(&self) -> Registry {
        self.registry.clone()
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    async fn capture_all(&self) -> Vec<Observation> {
        let budget = self.config.source_timeout;
        join_all(self.sources.iter().map(|source| source.capture(budget)))
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    async fn ingest(&self, observations: Vec<Observation>) -> CycleReport {
        let now = Utc::now();
        let outcome = self.registry.merge_detailed(&observations, now);

        debug!(
            "Merged {} observations: {} devices, {} evicted",
            observations.len(),
            outcome.snapshot.devices.len(),
            outcome.evicted
        );

        if let Some(log) = &self.event_log {
            if let Err(e) = log.append(&outcome.snapshot.devices, now).await {
                warn!("Event log {} write failed: {}", log.path().display(), e);
            }
        }

        CycleReport {
            observed: observations.len(),
            devices: outcome.snapshot.devices.len(),
            evicted: outcome.evicted,
            snapshot: outcome.snapshot,
        }
    }

    /// Run exactly one cycle
    pub async fn cycle(&self) -> CycleReport {
        let observations = self.capture_all().await;
        self.ingest(observations).await
    }

    /// Cycle until `shutdown` flips to true (or its sender drops) or the
    /// maximum runtime elapses. `on_cycle` sees every completed cycle.
    pub async fn run<F>(&self, mut shutdown: watch::Receiver<bool>, mut on_cycle: F)
    where
        F: FnMut(&CycleReport) + Send,
    {
        let mut ticker = interval(self.config.interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let start = Instant::now();
        let mut cycles: u64 = 0;

        info!(
            "Scanner starting with {} sources: {}",
            self.sources.len(),
            self.source_names().join(", ")
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }

            if let Some(max) = self.config.max_runtime {
                if start.elapsed() >= max {
                    info!("Scanner reached maximum runtime");
                    break;
                }
            }

            let observations = tokio::select! {
                observations = self.capture_all() => observations,
                _ = shutdown.changed() => {
                    debug!("Shutdown during capture, dropping cycle");
                    break;
                }
            };

            let report = self.ingest(observations).await;
            cycles += 1;
            on_cycle(&report);
        }

        info!("Scanner stopped after {} cycles", cycles);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use panda_core::{FusionPolicy, ObservationKind};
    use panda_sensors::CaptureError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakeSource {
        observations: Vec<Observation>,
    }

    impl FakeSource {
        fn wifi(id: &str, rssi: i32, security: &str) -> Self {
            Self {
                observations: vec![Observation::builder(ObservationKind::Wifi, id)
                    .label("Fake")
                    .signal_strength(rssi)
                    .frequency_mhz(2437)
                    .security(security)
                    .build()],
            }
        }
    }

    #[async_trait]
    impl ObservationSource for FakeSource {
        fn name(&self) -> &str {
            "fake"
        }

        async fn try_capture(&self) -> Result<Vec<Observation>, CaptureError> {
            Ok(self.observations.clone())
        }
    }

    struct SlowSource;

    #[async_trait]
    impl ObservationSource for SlowSource {
        fn name(&self) -> &str {
            "slow"
        }

        async fn try_capture(&self) -> Result<Vec<Observation>, CaptureError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(vec![Observation::builder(ObservationKind::Ble, "SL:OW").build()])
        }
    }

    struct BrokenSource;

    #[async_trait]
    impl ObservationSource for BrokenSource {
        fn name(&self) -> &str {
            "broken"
        }

        async fn try_capture(&self) -> Result<Vec<Observation>, CaptureError> {
            Err(CaptureError::Exit("permission denied".into()))
        }
    }

    fn fast_config() -> ScannerConfig {
        ScannerConfig {
            interval: Duration::from_millis(20),
            source_timeout: Duration::from_millis(100),
            max_runtime: None,
        }
    }

    #[tokio::test]
    async fn test_cycle_merges_all_sources() {
        let scanner = Scanner::new(
            fast_config(),
            Registry::new(),
            vec![
                Box::new(FakeSource::wifi("AA:BB", -45, "[ESS][OPEN]")),
                Box::new(FakeSource::wifi("CC:DD", -70, "[WPA2-PSK-CCMP]")),
                Box::new(BrokenSource),
            ],
        );

        let report = scanner.cycle().await;

        assert_eq!(report.observed, 2);
        assert_eq!(report.devices, 2);
        assert_eq!(report.evicted, 0);
        let open = scanner.registry().get("AA:BB").unwrap();
        assert_eq!(open.risk_score, 50);
        assert_eq!(open.channel, 6);
    }

    #[tokio::test]
    async fn test_slow_source_does_not_block_cycle() {
        let scanner = Scanner::new(
            fast_config(),
            Registry::new(),
            vec![Box::new(SlowSource), Box::new(FakeSource::wifi("AA:BB", -60, "WPA2"))],
        );

        let started = Instant::now();
        let report = scanner.cycle().await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(report.observed, 1);
        assert!(scanner.registry().get("SL:OW").is_none());
    }

    #[tokio::test]
    async fn test_cycle_with_no_sources_sweeps() {
        let policy = FusionPolicy {
            decay_window: chrono::Duration::zero(),
            ..FusionPolicy::default()
        };
        let registry = Registry::with_policy(policy);
        let past = Utc::now() - chrono::Duration::seconds(5);
        registry.merge(&[Observation::builder(ObservationKind::Ble, "OLD").build()], past);

        let scanner = Scanner::new(fast_config(), registry, Vec::new());
        let report = scanner.cycle().await;

        assert_eq!(report.observed, 0);
        assert_eq!(report.devices, 0);
        assert_eq!(report.evicted, 1);
    }

    #[tokio::test]
    async fn test_cycle_writes_event_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let scanner = Scanner::new(
            fast_config(),
            Registry::new(),
            vec![Box::new(FakeSource::wifi("AA:BB", -45, "OPEN"))],
        )
        .with_event_log(EventLog::new(&path, crate::LogPolicy::EveryCycle));

        scanner.cycle().await;
        scanner.cycle().await;

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let scanner = Scanner::new(
            fast_config(),
            Registry::new(),
            vec![Box::new(FakeSource::wifi("AA:BB", -50, "WPA2"))],
        );
        let (tx, rx) = watch::channel(false);
        let cycles = Arc::new(AtomicUsize::new(0));
        let counter = cycles.clone();

        let handle = tokio::spawn(async move {
            scanner
                .run(rx, move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .await;
        });

        tokio::time::sleep(Duration::from_millis(150)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(cycles.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_shutdown_during_capture_drops_cycle() {
        let scanner = Scanner::new(
            ScannerConfig {
                source_timeout: Duration::from_secs(30),
                ..fast_config()
            },
            Registry::new(),
            vec![Box::new(SlowSource)],
        );
        let registry = scanner.registry();
        let (tx, rx) = watch::channel(false);
        let cycles = Arc::new(AtomicUsize::new(0));
        let counter = cycles.clone();

        let handle = tokio::spawn(async move {
            scanner
                .run(rx, move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .await;
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cycles.load(Ordering::SeqCst), 0);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_run_respects_max_runtime() {
        let scanner = Scanner::new(
            ScannerConfig {
                max_runtime: Some(Duration::from_millis(100)),
                ..fast_config()
            },
            Registry::new(),
            vec![Box::new(FakeSource::wifi("AA:BB", -50, "WPA2"))],
        );
        let (_tx, rx) = watch::channel(false);

        tokio::time::timeout(Duration::from_secs(2), scanner.run(rx, |_| {}))
            .await
            .unwrap();
    }

    #[test]
    fn test_from_config_selects_sources() {
        let mut config = PandaConfig::default();
        config.sources.enabled = Some(vec![panda_sensors::SourceKind::Mock]);
        config.event_log.path = Some("/tmp/panda-events.jsonl".into());

        let scanner = Scanner::from_config(&config, Platform::Termux);
        assert_eq!(scanner.source_names(), vec!["mock"]);
        assert!(scanner.event_log.is_some());
    }
}

//! End-to-end scan engine tests: dispatch, digest-based skipping, and
//! the atomic commit contract, against a real SQLite store in a temp
//! directory.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use seiscan::config::{CodeFilter, MetricSpec, ScanConfig};
use seiscan::db::{MetricStore, SqliteMetricStore};
use seiscan::digest::Digest;
use seiscan::dispatcher::Dispatcher;
use seiscan::errors::{MetricError, ProviderError, StoreError};
use seiscan::metrics::Metric;
use seiscan::provider::DataProvider;
use seiscan::result::MetricResult;
use seiscan::types::{
    Channel, ChannelData, ChannelMeta, MetricId, ScanDay, Station, StationMetadata,
};

// ---------------------------------------------------------------------
// Test fixtures
// ---------------------------------------------------------------------

struct MemoryProvider {
    metadata: HashMap<Station, StationMetadata>,
    data: HashMap<(Station, Channel), ChannelData>,
}

impl MemoryProvider {
    fn new() -> Self {
        Self {
            metadata: HashMap::new(),
            data: HashMap::new(),
        }
    }

    /// Station with continuous 1 Hz LHZ/LH1 channels and the given
    /// timing-quality series on both.
    fn with_station(mut self, station: &Station, qualities: &[u8]) -> Self {
        self.metadata.insert(
            station.clone(),
            StationMetadata {
                network: station.network.clone(),
                station: station.code.clone(),
                channels: vec![
                    channel_meta("00", "LHZ"),
                    channel_meta("00", "LH1"),
                ],
            },
        );
        for code in ["LHZ", "LH1"] {
            self.data.insert(
                (station.clone(), Channel::new("00", code)),
                channel_data(qualities),
            );
        }
        self
    }

    fn set_data(&mut self, station: &Station, channel: Channel, data: ChannelData) {
        self.data.insert((station.clone(), channel), data);
    }
}

impl DataProvider for MemoryProvider {
    fn station_metadata(
        &self,
        station: &Station,
        _day: ScanDay,
    ) -> Result<Option<StationMetadata>, ProviderError> {
        Ok(self.metadata.get(station).cloned())
    }

    fn has_channel_data(&self, station: &Station, _day: ScanDay, channel: &Channel) -> bool {
        self.data.contains_key(&(station.clone(), channel.clone()))
    }

    fn channel_data(
        &self,
        station: &Station,
        _day: ScanDay,
        channel: &Channel,
    ) -> Result<Option<ChannelData>, ProviderError> {
        Ok(self.data.get(&(station.clone(), channel.clone())).cloned())
    }
}

fn channel_meta(location: &str, code: &str) -> ChannelMeta {
    ChannelMeta {
        location: location.to_string(),
        code: code.to_string(),
        sample_rate_hz: 1.0,
        continuous: true,
        epoch: "2019-120".to_string(),
    }
}

fn channel_data(qualities: &[u8]) -> ChannelData {
    ChannelData {
        sample_rate_hz: 1.0,
        samples: vec![1.5; 64],
        timing_quality: qualities.to_vec(),
        spectrum: None,
    }
}

/// Counts compute invocations so tests can assert zero recomputation.
struct CountingMetric {
    calls: Arc<AtomicUsize>,
}

impl Metric for CountingMetric {
    fn version(&self) -> u32 {
        1
    }
    fn base_name(&self) -> &'static str {
        "counting"
    }
    fn applicable_channels(&self, meta: &StationMetadata) -> Vec<Channel> {
        meta.continuous_channels()
    }
    fn compute(
        &self,
        _channel: &Channel,
        data: &ChannelData,
        _meta: &ChannelMeta,
    ) -> Result<Option<f64>, MetricError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let total: u64 = data.timing_quality.iter().map(|&q| q as u64).sum();
        Ok(Some(total as f64))
    }
}

/// Fails for one channel code, succeeds elsewhere.
struct FaultyMetric;

impl Metric for FaultyMetric {
    fn version(&self) -> u32 {
        1
    }
    fn base_name(&self) -> &'static str {
        "faulty"
    }
    fn applicable_channels(&self, meta: &StationMetadata) -> Vec<Channel> {
        meta.continuous_channels()
    }
    fn compute(
        &self,
        channel: &Channel,
        _data: &ChannelData,
        _meta: &ChannelMeta,
    ) -> Result<Option<f64>, MetricError> {
        if channel.code == "LHZ" {
            Err(MetricError("synthetic vertical-channel failure".to_string()))
        } else {
            Ok(Some(42.0))
        }
    }
}

/// Applies to no channel of a 1 Hz station.
struct BroadbandOnlyMetric;

impl Metric for BroadbandOnlyMetric {
    fn version(&self) -> u32 {
        1
    }
    fn base_name(&self) -> &'static str {
        "broadband-only"
    }
    fn applicable_channels(&self, meta: &StationMetadata) -> Vec<Channel> {
        meta.channels_with_prefix("BH")
    }
    fn compute(
        &self,
        _channel: &Channel,
        _data: &ChannelData,
        _meta: &ChannelMeta,
    ) -> Result<Option<f64>, MetricError> {
        Ok(Some(0.0))
    }
}

/// Store whose write phase always aborts.
struct BrokenStore;

#[async_trait]
impl MetricStore for BrokenStore {
    async fn digest_lookup(
        &self,
        _station: &Station,
        _day: ScanDay,
        _metric: &MetricId,
        _channel: &Channel,
    ) -> Result<Option<Digest>, StoreError> {
        Ok(None)
    }

    async fn station_digest_lookup(
        &self,
        _station: &Station,
        _day: ScanDay,
        _metric: &MetricId,
    ) -> Result<Option<Digest>, StoreError> {
        Ok(None)
    }

    async fn commit_results(&self, _result: &MetricResult) -> Result<usize, StoreError> {
        Err(StoreError::Database("transaction aborted".to_string()))
    }
}

fn scan_config(day: &str) -> ScanConfig {
    ScanConfig {
        day: ScanDay::parse(day).unwrap(),
        archive_dir: PathBuf::from("/unused"),
        db_path: PathBuf::from("/unused"),
        metrics: vec![MetricSpec {
            name: "counting".to_string(),
            powerband: None,
        }],
        network_filter: None,
        station_filter: None,
        force_update: false,
        workers: 4,
        station_timeout_secs: None,
        noise_model: None,
    }
}

fn counting_metric() -> (Arc<AtomicUsize>, Vec<Arc<dyn Metric>>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let metric = CountingMetric {
        calls: calls.clone(),
    };
    (calls, vec![Arc::new(metric)])
}

fn open_store(dir: &tempfile::TempDir) -> Arc<SqliteMetricStore> {
    Arc::new(SqliteMetricStore::open(dir.path().join("metrics.db")).unwrap())
}

// ---------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------

#[tokio::test]
async fn test_first_scan_commits_one_row_per_channel() {
    // IU.ANMO, day 2023-001, channels LHZ and LH1, empty store:
    // the scan computes both channels and commits two rows with
    // distinct digests.
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let station = Station::new("IU", "ANMO");
    let provider = MemoryProvider::new().with_station(&station, &[100, 90]);
    let (calls, metrics) = counting_metric();

    let dispatcher = Dispatcher::new(
        scan_config("2023-001"),
        Arc::new(provider),
        store.clone(),
        metrics,
        CancellationToken::new(),
    );
    let summary = dispatcher.run(vec![station.clone()]).await;

    assert_eq!(summary.completed, 1);
    assert_eq!(summary.rows_written, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let day = ScanDay::parse("2023-001").unwrap();
    let metric = MetricId::new("counting", 1);
    let lhz = store
        .digest_lookup(&station, day, &metric, &Channel::new("00", "LHZ"))
        .await
        .unwrap()
        .expect("LHZ digest stored");
    let lh1 = store
        .digest_lookup(&station, day, &metric, &Channel::new("00", "LH1"))
        .await
        .unwrap()
        .expect("LH1 digest stored");
    // Same data but different channel metadata, so digests differ.
    assert_ne!(lhz, lh1);
}

#[tokio::test]
async fn test_identical_rerun_computes_and_commits_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let station = Station::new("IU", "ANMO");
    let (calls, metrics) = counting_metric();

    // First run populates the store.
    let first = Dispatcher::new(
        scan_config("2023-001"),
        Arc::new(MemoryProvider::new().with_station(&station, &[100, 90])),
        store.clone(),
        metrics.clone(),
        CancellationToken::new(),
    );
    let summary = first.run(vec![station.clone()]).await;
    assert_eq!(summary.rows_written, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // Second run over byte-identical inputs: every digest matches, so
    // zero compute calls and zero rows.
    let second = Dispatcher::new(
        scan_config("2023-001"),
        Arc::new(MemoryProvider::new().with_station(&station, &[100, 90])),
        store.clone(),
        metrics,
        CancellationToken::new(),
    );
    let summary = second.run(vec![station.clone()]).await;

    assert_eq!(summary.completed, 1);
    assert_eq!(summary.rows_written, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_force_update_recomputes_unchanged_channels() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let station = Station::new("IU", "ANMO");
    let (calls, metrics) = counting_metric();

    let first = Dispatcher::new(
        scan_config("2023-001"),
        Arc::new(MemoryProvider::new().with_station(&station, &[100, 90])),
        store.clone(),
        metrics.clone(),
        CancellationToken::new(),
    );
    first.run(vec![station.clone()]).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let mut config = scan_config("2023-001");
    config.force_update = true;
    let forced = Dispatcher::new(
        config,
        Arc::new(MemoryProvider::new().with_station(&station, &[100, 90])),
        store.clone(),
        metrics,
        CancellationToken::new(),
    );
    let summary = forced.run(vec![station.clone()]).await;

    assert_eq!(summary.rows_written, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_only_changed_channels_are_rewritten() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let station = Station::new("IU", "ANMO");
    let (calls, metrics) = counting_metric();

    let first = Dispatcher::new(
        scan_config("2023-001"),
        Arc::new(MemoryProvider::new().with_station(&station, &[100, 90])),
        store.clone(),
        metrics.clone(),
        CancellationToken::new(),
    );
    first.run(vec![station.clone()]).await;

    // LHZ gets new data; LH1 stays identical.
    let mut provider = MemoryProvider::new().with_station(&station, &[100, 90]);
    provider.set_data(&station, Channel::new("00", "LHZ"), channel_data(&[50, 40]));

    let second = Dispatcher::new(
        scan_config("2023-001"),
        Arc::new(provider),
        store.clone(),
        metrics,
        CancellationToken::new(),
    );
    let summary = second.run(vec![station.clone()]).await;

    assert_eq!(summary.rows_written, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_no_applicable_channels_completes_cleanly() {
    // A station whose metadata matches none of the metric's channel
    // predicate: empty result, no error, normal completion.
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let station = Station::new("IU", "ANMO");
    let provider = MemoryProvider::new().with_station(&station, &[100]);

    let dispatcher = Dispatcher::new(
        scan_config("2023-001"),
        Arc::new(provider),
        store,
        vec![Arc::new(BroadbandOnlyMetric)],
        CancellationToken::new(),
    );
    let summary = dispatcher.run(vec![station]).await;

    assert_eq!(summary.completed, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.rows_written, 0);
}

#[tokio::test]
async fn test_compute_fault_is_isolated_to_its_channel() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let anmo = Station::new("IU", "ANMO");
    let cola = Station::new("IU", "COLA");
    let provider = MemoryProvider::new()
        .with_station(&anmo, &[100, 90])
        .with_station(&cola, &[80, 70]);

    let dispatcher = Dispatcher::new(
        scan_config("2023-001"),
        Arc::new(provider),
        store.clone(),
        vec![Arc::new(FaultyMetric)],
        CancellationToken::new(),
    );
    let summary = dispatcher.run(vec![anmo.clone(), cola.clone()]).await;

    // LHZ fails everywhere but LH1 still lands for both stations.
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.rows_written, 2);

    let day = ScanDay::parse("2023-001").unwrap();
    let metric = MetricId::new("faulty", 1);
    for station in [&anmo, &cola] {
        assert!(store
            .digest_lookup(station, day, &metric, &Channel::new("00", "LH1"))
            .await
            .unwrap()
            .is_some());
        assert!(store
            .digest_lookup(station, day, &metric, &Channel::new("00", "LHZ"))
            .await
            .unwrap()
            .is_none());
    }
}

#[tokio::test]
async fn test_commit_failure_fails_station_but_not_scan() {
    let anmo = Station::new("IU", "ANMO");
    let cola = Station::new("IU", "COLA");
    let provider = MemoryProvider::new()
        .with_station(&anmo, &[100, 90])
        .with_station(&cola, &[80, 70]);
    let (calls, metrics) = counting_metric();

    let dispatcher = Dispatcher::new(
        scan_config("2023-001"),
        Arc::new(provider),
        Arc::new(BrokenStore),
        metrics,
        CancellationToken::new(),
    );
    let summary = dispatcher.run(vec![anmo, cola]).await;

    // Both stations computed and then dropped their results; the run
    // itself still terminates normally with per-station outcomes.
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.completed, 0);
    assert_eq!(summary.rows_written, 0);
}

#[tokio::test]
async fn test_filters_select_exact_station_set() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let stations = vec![
        Station::new("IU", "ANMO"),
        Station::new("IU", "COLA"),
        Station::new("CU", "ANMO"),
        Station::new("CU", "GRTK"),
    ];
    let mut provider = MemoryProvider::new();
    for station in &stations {
        provider = provider.with_station(station, &[100]);
    }
    let (_, metrics) = counting_metric();

    let mut config = scan_config("2023-001");
    config.network_filter = Some(CodeFilter::parse("IU").unwrap());
    config.station_filter = Some(CodeFilter::parse("ANMO,GRTK").unwrap());

    let dispatcher = Dispatcher::new(
        config,
        Arc::new(provider),
        store.clone(),
        metrics,
        CancellationToken::new(),
    );
    let summary = dispatcher.run(stations.clone()).await;

    // Only IU.ANMO satisfies network AND station filters.
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.filtered, 3);

    let day = ScanDay::parse("2023-001").unwrap();
    let metric = MetricId::new("counting", 1);
    assert!(store
        .digest_lookup(&Station::new("IU", "ANMO"), day, &metric, &Channel::new("00", "LHZ"))
        .await
        .unwrap()
        .is_some());
    assert!(store
        .digest_lookup(&Station::new("CU", "GRTK"), day, &metric, &Channel::new("00", "LHZ"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_small_pool_drains_many_stations() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let stations: Vec<Station> = (0..8)
        .map(|i| Station::new("IU", &format!("ST{:02}", i)))
        .collect();
    let mut provider = MemoryProvider::new();
    for station in &stations {
        provider = provider.with_station(station, &[90]);
    }
    let (_, metrics) = counting_metric();

    let mut config = scan_config("2023-001");
    config.workers = 2;

    let dispatcher = Dispatcher::new(
        config,
        Arc::new(provider),
        store,
        metrics,
        CancellationToken::new(),
    );
    let summary = dispatcher.run(stations).await;

    assert_eq!(summary.completed, 8);
    assert_eq!(summary.rows_written, 16);
}

#[tokio::test]
async fn test_expired_station_budget_discards_partial_results() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let station = Station::new("IU", "ANMO");
    let provider = MemoryProvider::new().with_station(&station, &[100, 90]);
    let (_, metrics) = counting_metric();

    let mut config = scan_config("2023-001");
    config.station_timeout_secs = Some(0);

    let dispatcher = Dispatcher::new(
        config,
        Arc::new(provider),
        store.clone(),
        metrics,
        CancellationToken::new(),
    );
    let summary = dispatcher.run(vec![station.clone()]).await;

    assert_eq!(summary.timed_out, 1);
    assert_eq!(summary.rows_written, 0);

    let day = ScanDay::parse("2023-001").unwrap();
    let metric = MetricId::new("counting", 1);
    assert!(store
        .digest_lookup(&station, day, &metric, &Channel::new("00", "LHZ"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_digest_survives_version_bump_semantics() {
    // Bumping a metric's version makes the stored digest unreachable
    // under the new identifier, so everything recomputes once.
    struct CountingV2 {
        calls: Arc<AtomicUsize>,
    }
    impl Metric for CountingV2 {
        fn version(&self) -> u32 {
            2
        }
        fn base_name(&self) -> &'static str {
            "counting"
        }
        fn applicable_channels(&self, meta: &StationMetadata) -> Vec<Channel> {
            meta.continuous_channels()
        }
        fn compute(
            &self,
            _channel: &Channel,
            _data: &ChannelData,
            _meta: &ChannelMeta,
        ) -> Result<Option<f64>, MetricError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(7.0))
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let station = Station::new("IU", "ANMO");
    let (calls_v1, metrics_v1) = counting_metric();

    let first = Dispatcher::new(
        scan_config("2023-001"),
        Arc::new(MemoryProvider::new().with_station(&station, &[100, 90])),
        store.clone(),
        metrics_v1,
        CancellationToken::new(),
    );
    first.run(vec![station.clone()]).await;
    assert_eq!(calls_v1.load(Ordering::SeqCst), 2);

    let calls_v2 = Arc::new(AtomicUsize::new(0));
    let second = Dispatcher::new(
        scan_config("2023-001"),
        Arc::new(MemoryProvider::new().with_station(&station, &[100, 90])),
        store.clone(),
        vec![Arc::new(CountingV2 {
            calls: calls_v2.clone(),
        })],
        CancellationToken::new(),
    );
    let summary = second.run(vec![station.clone()]).await;

    assert_eq!(calls_v2.load(Ordering::SeqCst), 2);
    assert_eq!(summary.rows_written, 2);
}

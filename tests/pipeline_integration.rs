//! End-to-end pipeline runs over in-memory sources.

mod common;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use microgrid_sim::Error;
use microgrid_sim::config::PvModel;
use microgrid_sim::pipeline::Pipeline;
use microgrid_sim::sim::Action;
use microgrid_sim::state::{RunState, StatusStore};

use common::{DeratedPv, DownPrices, FakePrices, FakeWeather};

fn cache_contents(dir: &Path) -> BTreeMap<String, Vec<u8>> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| {
            let e = e.unwrap();
            (e.file_name().to_string_lossy().into_owned(), std::fs::read(e.path()).unwrap())
        })
        .collect()
}

#[tokio::test]
async fn run_publishes_one_record_per_hour() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = common::pipeline(
        dir.path(),
        common::sources(Arc::new(FakePrices::default()), FakeWeather::default()),
    );

    let record = pipeline.run(common::horizon(), false).await.unwrap();
    let records = &record.result.records;
    assert_eq!(records.len(), 24);
    assert_eq!(record.run_id, 1);
    assert!(records.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    assert_eq!(records[0].timestamp, common::horizon().start());

    let capacity = record.result.initial_battery.capacity_kwh;
    for r in records {
        assert!(
            (0.0..=capacity).contains(&r.battery_soc_kwh),
            "soc {} out of range at {}",
            r.battery_soc_kwh,
            r.timestamp
        );
        assert!((r.grid_kw - (r.net_load_kw + r.battery_kw)).abs() < 1e-9);
    }
    // Cheap night hours charge at full rate while there is room.
    assert_eq!(records[0].action, Action::Charge);

    let snap = pipeline.store().snapshot().await;
    assert_eq!(snap.state, RunState::Ok);
    assert_eq!(snap.latest.unwrap().run_id, 1);
}

#[tokio::test]
async fn identical_inputs_give_identical_results() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let a = common::pipeline(
        dir_a.path(),
        common::sources(Arc::new(FakePrices::default()), FakeWeather::default()),
    );
    let b = common::pipeline(
        dir_b.path(),
        common::sources(Arc::new(FakePrices::default()), FakeWeather::default()),
    );

    let ra = a.run(common::horizon(), false).await.unwrap();
    let rb = b.run(common::horizon(), false).await.unwrap();
    assert_eq!(ra.result, rb.result);
}

#[tokio::test]
async fn simulating_never_touches_the_cache() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = common::pipeline(
        dir.path(),
        common::sources(Arc::new(FakePrices::default()), FakeWeather::default()),
    );

    let inputs = pipeline.fetch(&common::horizon(), false).await.unwrap();
    let before = cache_contents(dir.path());
    assert_eq!(before.len(), 3, "prices, weather and pv are cached");

    let first = pipeline.execute(&inputs).unwrap();
    let second = pipeline.execute(&inputs).unwrap();
    assert_eq!(first, second);
    assert_eq!(cache_contents(dir.path()), before);
}

#[tokio::test]
async fn cached_series_are_reused_unless_refreshed() {
    let dir = tempfile::tempdir().unwrap();
    let prices = Arc::new(FakePrices::default());
    let pipeline = common::pipeline(
        dir.path(),
        common::sources(prices.clone(), FakeWeather::default()),
    );

    pipeline.run(common::horizon(), false).await.unwrap();
    pipeline.run(common::horizon(), false).await.unwrap();
    assert_eq!(prices.calls(), 1);

    pipeline.run(common::horizon(), true).await.unwrap();
    assert_eq!(prices.calls(), 2);
}

#[tokio::test]
async fn pv_cache_follows_every_system_field() {
    let dir = tempfile::tempdir().unwrap();
    let pv_with_loss = |loss: f64| {
        let mut settings = common::settings(dir.path());
        settings.pv.peak_kwp = 4.0;
        settings.pv.loss_fraction = loss;
        let mut sources = common::sources(Arc::new(FakePrices::default()), FakeWeather::default());
        sources.pv = Arc::new(DeratedPv);
        Pipeline::new(settings, sources, Arc::new(StatusStore::new())).unwrap()
    };

    let low = pv_with_loss(0.1).fetch(&common::horizon(), false).await.unwrap();
    let high = pv_with_loss(0.25).fetch(&common::horizon(), false).await.unwrap();
    assert!(low.pv.values().all(|v| (v - 3.6).abs() < 1e-9));
    assert!(high.pv.values().all(|v| (v - 3.0).abs() < 1e-9));
}

#[tokio::test]
async fn misaligned_inputs_keep_the_published_result() {
    let store = Arc::new(StatusStore::new());
    let good_dir = tempfile::tempdir().unwrap();
    let good = common::pipeline_with_store(
        good_dir.path(),
        common::sources(Arc::new(FakePrices::default()), FakeWeather::default()),
        store.clone(),
    );
    good.run(common::horizon(), false).await.unwrap();

    let bad_dir = tempfile::tempdir().unwrap();
    let short_weather = FakeWeather {
        missing_hours: 1,
        ..FakeWeather::default()
    };
    let bad = common::pipeline_with_store(
        bad_dir.path(),
        common::sources(Arc::new(FakePrices::default()), short_weather),
        store.clone(),
    );
    let err = bad.run(common::horizon(), false).await.unwrap_err();
    assert!(matches!(err, Error::InputMisaligned(_)), "{err}");

    let snap = store.snapshot().await;
    assert_eq!(snap.state, RunState::LastRunFailed);
    assert_eq!(snap.latest.unwrap().run_id, 1);
    assert_eq!(snap.last_failure.unwrap().kind, "input_misaligned");
}

#[tokio::test]
async fn failing_source_aborts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = common::pipeline(
        dir.path(),
        common::sources(Arc::new(DownPrices), FakeWeather::default()),
    );

    let err = pipeline.run(common::horizon(), false).await.unwrap_err();
    assert!(common::is_source_unavailable(&err), "{err}");

    let snap = pipeline.store().snapshot().await;
    assert_eq!(snap.state, RunState::LastRunFailed);
    assert!(snap.latest.is_none());
    // Nothing from the failed price fetch was written.
    assert!(!dir.path().join("prices_DK1_20250101T00_24h.json").exists());
}

#[tokio::test]
async fn concurrent_run_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let gate = Arc::new(Notify::new());
    let pipeline = common::pipeline(
        dir.path(),
        common::sources(Arc::new(FakePrices::gated(gate.clone())), FakeWeather::default()),
    );

    let first = {
        let p: Arc<Pipeline> = pipeline.clone();
        tokio::spawn(async move { p.run(common::horizon(), false).await })
    };
    while !pipeline.store().is_running() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let err = pipeline.run(common::horizon(), false).await.unwrap_err();
    assert!(matches!(err, Error::AlreadyRunning));

    gate.notify_one();
    let record = first.await.unwrap().unwrap();
    assert_eq!(record.run_id, 1);
    assert!(!pipeline.store().is_running());
}

#[tokio::test]
async fn irradiance_model_falls_back_without_irradiance() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = common::settings(dir.path());
    settings.pv.model = PvModel::Irradiance;
    let pipeline = Pipeline::new(
        settings,
        common::sources(Arc::new(FakePrices::default()), FakeWeather::default()),
        Arc::new(StatusStore::new()),
    )
    .unwrap();

    let inputs = pipeline.fetch(&common::horizon(), false).await.unwrap();
    assert!(inputs.pv.values().all(|v| v == 1.5));
}

#[tokio::test]
async fn irradiance_model_uses_measured_irradiance() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = common::settings(dir.path());
    settings.pv.model = PvModel::Irradiance;
    let weather = FakeWeather {
        ghi: Some(0.0),
        ..FakeWeather::default()
    };
    let pipeline = Pipeline::new(
        settings,
        common::sources(Arc::new(FakePrices::default()), weather),
        Arc::new(StatusStore::new()),
    )
    .unwrap();

    let inputs = pipeline.fetch(&common::horizon(), false).await.unwrap();
    assert_eq!(inputs.pv.len(), 24);
    assert!(inputs.pv.values().all(|v| v == 0.0));
}

#[test]
fn invalid_settings_are_rejected_before_any_fetch() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = common::settings(dir.path());
    settings.battery.initial_soc_kwh = 11.0;
    let prices = Arc::new(FakePrices::default());
    let err = Pipeline::new(
        settings,
        common::sources(prices.clone(), FakeWeather::default()),
        Arc::new(StatusStore::new()),
    )
    .err()
    .unwrap();
    assert!(matches!(err, Error::InvalidConfig(_)));
    assert_eq!(prices.calls(), 0);
}

use std::process::ExitCode;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use seiscan::config::ScanConfig;
use seiscan::db::{MetricStore, NullMetricStore, SqliteMetricStore};
use seiscan::dispatcher::Dispatcher;
use seiscan::metrics;
use seiscan::models::NoiseModelCache;
use seiscan::provider::FsArchiveProvider;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    // Anything wrong with the configuration is fatal before any station
    // work is dispatched.
    let config = match ScanConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    log::info!("starting scan for day {}", config.day);
    log::info!("archive: {}", config.archive_dir.display());
    log::info!(
        "metrics: {}",
        config
            .metrics
            .iter()
            .map(|m| m.full_name())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let model_paths: Vec<_> = config.noise_model.iter().cloned().collect();
    let models = match NoiseModelCache::load(&model_paths) {
        Ok(models) => models,
        Err(e) => {
            log::error!("configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let metrics = match metrics::build_metrics(&config.metrics, &models, config.noise_model.as_deref())
    {
        Ok(metrics) => metrics,
        Err(e) => {
            log::error!("configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // An unreachable store degrades the run to a no-persistence scan
    // rather than aborting it.
    let store: Arc<dyn MetricStore> = match SqliteMetricStore::open(&config.db_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            log::warn!(
                "could not open metric store at {}, continuing without persistence: {}",
                config.db_path.display(),
                e
            );
            Arc::new(NullMetricStore)
        }
    };

    let provider = FsArchiveProvider::new(&config.archive_dir);
    let stations = match provider.list_stations() {
        Ok(stations) => stations,
        Err(e) => {
            log::error!("could not enumerate archive stations: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("interrupt received, finishing in-flight stations");
            ctrl_c_cancel.cancel();
        }
    });

    let dispatcher = Dispatcher::new(config, Arc::new(provider), store, metrics, cancel);
    let summary = dispatcher.run(stations).await;

    if summary.failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

pub mod settings;

use std::sync::Arc;

use mailcheck_common::Signal;
use mailcheck_enrich::Registry;
use mailcheck_store::Store;
use mailcheck_verify::{Controller, ControllerConfig, DisposableDomains, HickoryDnsResolver, WorkerDeps};
use tokio::sync::broadcast;

pub use settings::Settings;

/// Build the worker pool's shared collaborators and the dispatch loop that
/// drives them, having already run startup recovery against `store`.
///
/// # Errors
///
/// Returns an error if the embedded store's startup recovery pass or
/// metrics initialization fails.
pub async fn build(settings: &Settings) -> anyhow::Result<Controller> {
    let store = Arc::new(Store::open(settings.app.db_path.clone()).await?);

    if settings.metrics.enabled {
        mailcheck_metrics::init_metrics(&settings.metrics)?;
    }

    let (signal_tx, _signal_rx) = broadcast::channel::<Signal>(1);
    let recovery_report = mailcheck_verify::run_recovery(&store, &signal_tx).await;
    tracing::info!(
        completed = recovery_report.completed,
        requeued = recovery_report.requeued,
        failed = recovery_report.failed,
        waiting = recovery_report.waiting,
        "startup recovery finished"
    );

    let deps = WorkerDeps {
        store,
        dns: Arc::new(HickoryDnsResolver::new(settings.dns.clone())),
        enrich: Arc::new(Registry::new()),
        disposable: Arc::new(DisposableDomains::new()),
        config: Arc::new(settings.app.clone()),
    };

    let controller_config = ControllerConfig::from_app_config(&settings.app);

    Ok(Controller::new(deps, controller_config))
}

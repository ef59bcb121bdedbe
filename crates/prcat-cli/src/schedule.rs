//! Recurring crawls driven by a cron expression.

use std::sync::Arc;

use prcat_core::CrawlConfig;
use prcat_scraper::{RunControl, RunState};
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::crawl::run_crawl;

/// Builds and starts the scheduler with one crawl job on `cron`.
///
/// A tick that fires while a crawl is still active is skipped.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the expression is invalid or the
/// scheduler cannot be started.
pub(crate) async fn build_scheduler(
    config: Arc<CrawlConfig>,
    control: RunControl,
    cron: &str,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    let job = Job::new_async(cron, move |_uuid, _lock| {
        let config = Arc::clone(&config);
        let control = control.clone();

        Box::pin(async move {
            let state = control.state();
            if state != RunState::Idle {
                tracing::warn!(%state, "scheduler: previous crawl still active; skipping tick");
                return;
            }
            tracing::info!("scheduler: starting crawl");
            match run_crawl(&config, &control).await {
                Ok(outcome) => tracing::info!(
                    pages = outcome.pages_processed,
                    products = outcome.products.len(),
                    stop_reason = ?outcome.stop_reason,
                    "scheduler: crawl complete"
                ),
                Err(e) => tracing::error!(error = %e, "scheduler: crawl failed"),
            }
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;
    Ok(scheduler)
}

/// Run scheduled crawls until Ctrl-C or SIGTERM, then stop the active run
/// and shut the scheduler down.
pub(crate) async fn run_schedule(config: CrawlConfig, cron: &str) -> anyhow::Result<()> {
    let control = RunControl::new();
    let mut scheduler = build_scheduler(Arc::new(config), control.clone(), cron).await?;
    tracing::info!(cron, "scheduler started");

    shutdown_signal().await;
    if control.request_stop() {
        tracing::info!("stop requested for the active crawl");
    }
    scheduler.shutdown().await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal");
}

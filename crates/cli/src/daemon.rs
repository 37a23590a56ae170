//! Component wiring for the daemon and the one-shot modes.

use crate::commands::Options;
use crate::format::{format_pending, format_report, OutputMode};
use crate::status::status_router;
use anyhow::Context;
use logship_core::{LogshipConfig, SharedClock, SystemClock};
use logship_durability::{EventSink, LogStore, StateStore, StoreConfig};
use logship_ingest::{router, traced, IngestConfig, IngestService};
use logship_shipper::{unshipped_files, S3ObjectStore, S3Settings, Shipper, ShipperConfig};
use logship_telemetry::{
    MetricsSampler, ProcessSampler, RequestTracer, SamplerConfig, SysinfoSource, TracerConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How often the store checks rotation age and overdue syncs.
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(1);

struct Components {
    clock: SharedClock,
    store: Arc<LogStore>,
    shipper: Shipper,
}

async fn open(config: &LogshipConfig) -> anyhow::Result<Components> {
    let clock = SystemClock::shared();
    let log_dir = config.log_dir();
    let store = LogStore::open_with_clock(&log_dir, StoreConfig::from(config), clock.clone())
        .with_context(|| format!("opening log store at {}", log_dir.display()))?;
    let states = StateStore::open(config.state_dir())
        .with_context(|| format!("opening state store at {}", config.state_dir().display()))?;

    let settings = S3Settings::try_from(&config.remote)?;
    let remote = Arc::new(S3ObjectStore::connect(settings).await);
    let shipper = Shipper::new(
        &log_dir,
        states,
        remote,
        clock.clone(),
        ShipperConfig::from(config),
    )?;

    Ok(Components {
        clock,
        store: Arc::new(store),
        shipper,
    })
}

/// Seal the active file, run one cycle, print the report.
///
/// Returns whether every attempted file was uploaded.
pub async fn run_immediate(config: LogshipConfig, options: &Options) -> anyhow::Result<bool> {
    let components = open(&config).await?;
    if let Some(id) = components.store.rotate()? {
        tracing::info!(target: "logship::store", file = %id, "Sealed active log file");
    }
    components.shipper.recover()?;

    let report = components.shipper.run_cycle().await;
    println!(
        "{}",
        format_report(&report, OutputMode::from_json_flag(options.json))
    );
    Ok(report.is_clean())
}

/// Print closed files that still need uploading. Needs no remote settings.
pub fn run_dry_run(config: LogshipConfig, options: &Options) -> anyhow::Result<()> {
    let states = StateStore::open(config.state_dir())?;
    let pending = unshipped_files(&config.log_dir(), &states)?;
    println!(
        "{}",
        format_pending(&pending, OutputMode::from_json_flag(options.json))
    );
    Ok(())
}

/// Run every component until SIGINT/SIGTERM, then shut down in order:
/// producers stop, the active file is sealed, the shipper runs its final
/// cycle.
pub async fn run_daemon(config: LogshipConfig, options: &Options) -> anyhow::Result<()> {
    let Components {
        clock,
        store,
        shipper,
    } = open(&config).await?;
    let sink: Arc<dyn EventSink> = store.clone();

    let producers = CancellationToken::new();
    let shipper_cancel = CancellationToken::new();
    let mut handles: Vec<JoinHandle<()>> = Vec::new();

    if options.sampler {
        let sampler = Arc::new(MetricsSampler::new(
            Box::new(SysinfoSource::new()),
            sink.clone(),
            clock.clone(),
            SamplerConfig::from(&config),
        ));
        handles.push(sampler.spawn(producers.clone()));
    }

    if options.ingest {
        let service = Arc::new(IngestService::new(
            sink.clone(),
            IngestConfig::from(&config),
            clock.clone(),
        )?);
        let tracer = Arc::new(RequestTracer::new(
            sink.clone(),
            Arc::new(ProcessSampler::new()),
            clock.clone(),
            TracerConfig::from(&config),
        ));
        let app = traced(
            router(service).merge(status_router(shipper.clone(), store.clone())),
            tracer,
        );
        let listener = tokio::net::TcpListener::bind(config.listen_addr)
            .await
            .with_context(|| format!("binding {}", config.listen_addr))?;
        tracing::info!(target: "logship::ingest", addr = %config.listen_addr, "Ingestion endpoint listening");

        let stop = producers.clone();
        handles.push(tokio::spawn(async move {
            let shutdown = async move { stop.cancelled().await };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                tracing::error!(target: "logship::ingest", error = %e, "Ingestion server failed");
            }
        }));
    }

    handles.push(tokio::spawn(maintain_store(
        store.clone(),
        producers.clone(),
    )));

    let shipper_handle = tokio::spawn({
        let shipper = shipper.clone();
        let cancel = shipper_cancel.clone();
        async move { shipper.run(cancel).await }
    });

    shutdown_signal().await;

    producers.cancel();
    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Component task failed");
        }
    }
    match store.rotate() {
        Ok(Some(id)) => {
            tracing::info!(target: "logship::store", file = %id, "Sealed active log file for shutdown")
        }
        Ok(None) => {}
        Err(e) => tracing::error!(target: "logship::store", error = %e, "Failed to seal active log file"),
    }

    shipper_cancel.cancel();
    shipper_handle.await.context("shipper task failed")?;
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Age-based rotation and periodic fsync.
async fn maintain_store(store: Arc<LogStore>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(MAINTENANCE_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = store.rotate_if_due() {
                    tracing::error!(target: "logship::store", error = %e, "Age rotation failed");
                }
                if let Err(e) = store.sync_if_overdue() {
                    tracing::error!(target: "logship::store", error = %e, "Periodic sync failed");
                }
            }
        }
    }
    if let Err(e) = store.flush() {
        tracing::error!(target: "logship::store", error = %e, "Final sync failed");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Ctrl+C received, shutting down"),
        _ = terminate => tracing::info!("SIGTERM received, shutting down"),
    }
}

use std::{future::Future, sync::Arc, time::Duration};

use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    adapters::ScanEngine,
    config::AppConfig,
    models::TargetRequest,
    telemetry::{self, Collector, HostProbe},
};

/// Owns the three background loops: telemetry push, scan-results push and
/// online-status logging. Each loop ticks on its own fixed interval and
/// never shares state with the others.
pub struct JobSupervisor {
    engine: Arc<dyn ScanEngine>,
    collector: Arc<dyn Collector>,
    config: Arc<AppConfig>,
    shutdown_token: CancellationToken,
    acquisition_token: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl JobSupervisor {
    pub fn new(
        engine: Arc<dyn ScanEngine>,
        collector: Arc<dyn Collector>,
        config: Arc<AppConfig>,
    ) -> Self {
        let shutdown_token = CancellationToken::new();
        let acquisition_token = shutdown_token.child_token();
        Self {
            engine,
            collector,
            config,
            shutdown_token,
            acquisition_token,
            handles: Mutex::new(Vec::new()),
        }
    }

    pub async fn start(&self) {
        let mut handles = self.handles.lock().await;

        if self.config.telemetry_enabled {
            let engine = self.engine.clone();
            let collector = self.collector.clone();
            let config = self.config.clone();
            let acquisition = self.acquisition_token.clone();
            let probe = Arc::new(Mutex::new(HostProbe::new()));
            handles.push(spawn_loop(
                "telemetry",
                Duration::from_secs(config.telemetry_interval_secs),
                self.shutdown_token.clone(),
                move || {
                    let engine = engine.clone();
                    let collector = collector.clone();
                    let config = config.clone();
                    let acquisition = acquisition.clone();
                    let probe = probe.clone();
                    async move {
                        let mut probe = probe.lock().await;
                        telemetry_cycle(&*engine, &*collector, &config, &acquisition, &mut probe)
                            .await
                    }
                },
            ));
        } else {
            info!("telemetry loop disabled by configuration");
        }

        let engine = self.engine.clone();
        let collector = self.collector.clone();
        handles.push(spawn_loop(
            "scan_results",
            Duration::from_secs(self.config.scan_results_interval_secs),
            self.shutdown_token.clone(),
            move || {
                let engine = engine.clone();
                let collector = collector.clone();
                async move { scan_results_cycle(&*engine, &*collector).await }
            },
        ));

        let engine = self.engine.clone();
        handles.push(spawn_loop(
            "zap_status",
            Duration::from_secs(self.config.status_interval_secs),
            self.shutdown_token.clone(),
            move || {
                let engine = engine.clone();
                async move { status_cycle(&*engine).await }
            },
        ));

        info!(loops = handles.len(), "background jobs started");
    }

    /// Stops target acquisition; metrics collection keeps running.
    pub fn stop_target_acquisition(&self) {
        self.acquisition_token.cancel();
    }

    pub async fn shutdown(&self) {
        self.shutdown_token.cancel();
        let handles: Vec<_> = self.handles.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "background job ended abnormally");
            }
        }
        info!("background jobs stopped");
    }
}

fn spawn_loop<F, Fut>(
    name: &'static str,
    interval: Duration,
    shutdown: CancellationToken,
    mut cycle: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        info!(job = name, interval_secs = interval.as_secs(), "job loop started");
        loop {
            let run = cycle();
            tokio::select! {
                _ = shutdown.cancelled() => break,
                result = run => {
                    if let Err(e) = result {
                        warn!(job = name, error = %e, "job cycle failed");
                    }
                }
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        info!(job = name, "job loop stopped");
    })
}

async fn telemetry_cycle(
    engine: &dyn ScanEngine,
    collector: &dyn Collector,
    config: &AppConfig,
    acquisition: &CancellationToken,
    probe: &mut HostProbe,
) -> anyhow::Result<()> {
    let stats = telemetry::collect_stats(engine, probe).await;

    if stats.zap_status == "online" && !acquisition.is_cancelled() {
        let request = TargetRequest {
            total_running_scan_count: stats.active_scan_count,
            docker_type: config.docker_type,
        };
        match telemetry::acquire_targets(
            engine,
            collector,
            request,
            &config.default_context,
            acquisition,
        )
        .await
        {
            Ok(started) => info!(started, "target acquisition finished"),
            Err(e) => warn!(error = %e, "failed to get targets"),
        }
    }

    collector.save_telemetry(&stats).await?;
    Ok(())
}

async fn scan_results_cycle(engine: &dyn ScanEngine, collector: &dyn Collector) -> anyhow::Result<()> {
    let status = engine.is_online().await;
    info!(online = status.success, version = ?status.version, "scanning engine status");
    if !status.success {
        return Ok(());
    }
    let sent = telemetry::push_scan_results(engine, collector, &HostProbe::hostname()).await?;
    if sent > 0 {
        info!(sent, "scan results pushed");
    }
    Ok(())
}

async fn status_cycle(engine: &dyn ScanEngine) -> anyhow::Result<()> {
    let status = engine.is_online().await;
    info!(status = %serde_json::to_string(&status)?, "context response");
    Ok(())
}

//! Supervisor. Launches one child OS process per scraper — the crate's
//! own binary re-invoked as `reddit-fleet worker --scraper-id <id>` —
//! and owns restart/shutdown policy: spawn, poll for health, back off
//! and restart on exit, stop gracefully with a kill as the last resort.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};

use crate::db::store::Store;
use crate::models::ScraperStatus;
use crate::{AppError, Result};

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub worker_binary: String,
    pub health_port_base: u16,
    pub health_check_interval_secs: u64,
    pub max_restarts_per_window: u32,
    pub restart_window_secs: i64,
    pub shutdown_grace_secs: u64,
}

impl SupervisorConfig {
    pub fn new(health_port_base: u16) -> Self {
        Self {
            worker_binary: std::env::current_exe()
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_else(|_| "reddit-fleet".to_string()),
            health_port_base,
            health_check_interval_secs: 30,
            max_restarts_per_window: 5,
            restart_window_secs: 600,
            shutdown_grace_secs: 10,
        }
    }
}

struct SupervisedChild {
    process: Child,
    health_port: u16,
    recent_restarts: Vec<Instant>,
}

/// One Supervisor instance per control plane process; holds every
/// currently-running worker child.
pub struct Supervisor {
    config: SupervisorConfig,
    store: Store,
    http: reqwest::Client,
    children: Mutex<HashMap<String, SupervisedChild>>,
    next_port_index: Mutex<u16>,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig, store: Store) -> Self {
        Self {
            config,
            store,
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_default(),
            children: Mutex::new(HashMap::new()),
            next_port_index: Mutex::new(0),
        }
    }

    /// Spawns the worker for `scraper_id`, transitioning the record to
    /// `running` once the child reports healthy.
    pub async fn start(self: &Arc<Self>, scraper_id: &str) -> Result<()> {
        self.store.scrapers.set_status(scraper_id, ScraperStatus::Starting, None).await?;
        let health_port = self.spawn(scraper_id).await?;

        if self.wait_for_health(health_port).await {
            self.store.scrapers.set_status(scraper_id, ScraperStatus::Running, None).await?;
            tracing::info!(scraper_id, "worker started and healthy");
            Ok(())
        } else {
            self.store
                .scrapers
                .set_status(scraper_id, ScraperStatus::Failed, Some("worker failed initial health check".to_string()))
                .await?;
            Err(AppError::InternalError(format!("worker {} never became healthy", scraper_id)))
        }
    }

    async fn spawn(&self, scraper_id: &str) -> Result<u16> {
        let health_port = {
            let mut idx = self.next_port_index.lock().await;
            let port = self.config.health_port_base + *idx;
            *idx += 1;
            port
        };

        tracing::info!(scraper_id, health_port, "spawning worker process");
        let child = Command::new(&self.config.worker_binary)
            .arg("worker")
            .arg("--scraper-id")
            .arg(scraper_id)
            .arg("--health-port")
            .arg(health_port.to_string())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::InternalError(format!("failed to spawn worker: {}", e)))?;

        self.children.lock().await.insert(
            scraper_id.to_string(),
            SupervisedChild { process: child, health_port, recent_restarts: Vec::new() },
        );
        self.store
            .scrapers
            .set_container(scraper_id, Some(format!("pid:{}", std::process::id())), Some(scraper_id.to_string()))
            .await?;

        Ok(health_port)
    }

    async fn wait_for_health(&self, health_port: u16) -> bool {
        let url = format!("http://127.0.0.1:{}/health", health_port);
        for attempt in 1..=10 {
            match self.http.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => return true,
                _ => {
                    tracing::debug!(attempt, %url, "worker not healthy yet");
                    sleep(Duration::from_secs(2)).await;
                }
            }
        }
        false
    }

    /// Liveness poll loop. Intended to be spawned once for the
    /// Supervisor's lifetime.
    pub async fn run_liveness_loop(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.health_check_interval_secs));
        loop {
            tokio::select! {
                _ = ticker.tick() => self.poll_all().await,
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        self.shutdown_all().await;
                        break;
                    }
                }
            }
        }
    }

    async fn poll_all(&self) {
        let scraper_ids: Vec<String> = {
            let guard = self.children.lock().await;
            guard.keys().cloned().collect()
        };

        for scraper_id in scraper_ids {
            let exited = {
                let mut guard = self.children.lock().await;
                match guard.get_mut(&scraper_id) {
                    Some(child) => matches!(child.process.try_wait(), Ok(Some(_))),
                    None => continue,
                }
            };

            if exited {
                tracing::warn!(scraper_id = %scraper_id, "worker process exited");
                if let Err(e) = self
                    .store
                    .scrapers
                    .set_status(&scraper_id, ScraperStatus::Failed, Some("worker process exited".to_string()))
                    .await
                {
                    tracing::error!(error = %e, "failed to record failed status");
                }
                self.maybe_restart(&scraper_id).await;
            }
        }
    }

    /// Restart-rate backoff window: a sliding window of recent restart
    /// timestamps plus an exponential backoff between attempts, capped at
    /// a ceiling per window.
    async fn maybe_restart(&self, scraper_id: &str) {
        let record = match self.store.scrapers.load(scraper_id).await {
            Ok(r) => r,
            Err(_) => return,
        };
        if !record.auto_restart {
            return;
        }

        let now = Instant::now();
        let window = Duration::from_secs(self.config.restart_window_secs.max(0) as u64);
        let restarts_in_window = {
            let mut guard = self.children.lock().await;
            if let Some(child) = guard.get_mut(scraper_id) {
                child.recent_restarts.retain(|t| now.duration_since(*t) < window);
                child.recent_restarts.len() as u32
            } else {
                0
            }
        };

        if restarts_in_window >= self.config.max_restarts_per_window {
            tracing::error!(scraper_id, "restart ceiling reached for this window, not restarting");
            return;
        }

        let restart_count = self.store.scrapers.increment_restart_count(scraper_id).await.unwrap_or(1);
        let delay = Duration::from_secs(2u64.saturating_pow(restart_count.saturating_sub(1).min(10)));
        tracing::info!(scraper_id, restart_count, delay_secs = delay.as_secs(), "backing off before restart");
        sleep(delay).await;

        if let Some(child) = self.children.lock().await.get_mut(scraper_id) {
            child.recent_restarts.push(Instant::now());
        }

        match self.spawn(scraper_id).await {
            Ok(port) => {
                if self.wait_for_health(port).await {
                    let _ = self.store.scrapers.set_status(scraper_id, ScraperStatus::Running, None).await;
                } else {
                    let _ = self
                        .store
                        .scrapers
                        .set_status(scraper_id, ScraperStatus::Failed, Some("restart health check failed".to_string()))
                        .await;
                }
            }
            Err(e) => tracing::error!(scraper_id, error = %e, "restart spawn failed"),
        }
    }

    /// Graceful stop of one worker.
    pub async fn stop(&self, scraper_id: &str) -> Result<()> {
        self.store.scrapers.set_status(scraper_id, ScraperStatus::Stopped, None).await?;
        let mut guard = self.children.lock().await;
        if let Some(mut child) = guard.remove(scraper_id) {
            drop(guard);
            terminate_gracefully(&mut child.process, Duration::from_secs(self.config.shutdown_grace_secs)).await;
        }
        Ok(())
    }

    /// Forwards shutdown to every child before the Supervisor itself
    /// exits, rather than abandoning them as orphans.
    async fn shutdown_all(&self) {
        let scraper_ids: Vec<String> = {
            let guard = self.children.lock().await;
            guard.keys().cloned().collect()
        };
        for scraper_id in scraper_ids {
            tracing::info!(scraper_id = %scraper_id, "stopping worker on supervisor shutdown");
            let _ = self.stop(&scraper_id).await;
        }
    }
}

async fn terminate_gracefully(child: &mut Child, grace: Duration) {
    // Ask nicely with SIGTERM so the worker's own shutdown-watch plumbing
    // gets a chance to drain, then wait with a timeout, then force-kill
    // (SIGKILL via start_kill) if the child is still around.
    send_sigterm(child);

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => tracing::info!(?status, "worker exited gracefully"),
        Ok(Err(e)) => tracing::warn!(error = %e, "error waiting for worker exit"),
        Err(_) => {
            tracing::warn!("worker did not exit within grace period, force killing");
            let _ = child.kill().await;
            let _ = child.wait().await;
        }
    }
}

#[cfg(unix)]
fn send_sigterm(child: &Child) {
    match child.id() {
        Some(pid) => {
            // SAFETY: pid is a live child we own; kill() with SIGTERM is a
            // plain signal send, no memory is touched.
            if unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) } != 0 {
                tracing::warn!(pid, error = %std::io::Error::last_os_error(), "failed to send SIGTERM to worker");
            }
        }
        None => tracing::warn!("worker has no pid, already exited"),
    }
}

#[cfg(not(unix))]
fn send_sigterm(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        tracing::warn!(error = %e, "error sending termination signal to worker");
    }
}

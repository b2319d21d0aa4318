//! Deadline sweeper: background expiry of overdue approvals.

use std::io;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use retailops_core::TenantId;

use crate::approvals::{ApprovalEngine, SweepReport};
use crate::config::SweeperSettings;
use crate::error::ApprovalError;
use crate::hooks::ApprovalNotifier;
use crate::store::ApprovalStore;

/// Sweeper configuration.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Time between sweeps
    pub interval: Duration,
    /// Maximum instances expired per store query
    pub batch_size: usize,
    /// Name for logging and the thread
    pub name: String,
    /// Optional tenant filter
    pub tenant_id: Option<TenantId>,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self::from_settings(&SweeperSettings::default())
    }
}

impl SweeperConfig {
    pub fn from_settings(settings: &SweeperSettings) -> Self {
        Self {
            interval: Duration::from_secs(settings.interval_secs),
            batch_size: settings.batch_size.max(1),
            name: "deadline-sweeper".to_string(),
            tenant_id: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_tenant(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }
}

/// Sweeper runtime statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SweeperStats {
    pub sweeps_run: u64,
    pub instances_expired: u64,
    pub failures: u64,
    pub uptime_secs: u64,
    pub last_sweep_at: Option<DateTime<Utc>>,
}

/// Handle to control a running sweeper.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<SweeperStats>>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for the current pass to finish.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    pub fn stats(&self) -> SweeperStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

/// Recurring task that expires overdue approvals through the engine's
/// compare-and-swap, so it never overrides a foreground decision.
pub struct DeadlineSweeper<S, N> {
    engine: Arc<ApprovalEngine<S, N>>,
}

impl<S, N> DeadlineSweeper<S, N>
where
    S: ApprovalStore + 'static,
    N: ApprovalNotifier + 'static,
{
    pub fn new(engine: Arc<ApprovalEngine<S, N>>) -> Self {
        Self { engine }
    }

    /// Expire everything overdue at `now`, one batch at a time.
    ///
    /// A zero batch size is treated as one.
    pub fn sweep_until_drained(&self, now: DateTime<Utc>, config: &SweeperConfig) -> Result<SweepReport, ApprovalError> {
        let batch_size = config.batch_size.max(1);
        let mut total = SweepReport::default();
        loop {
            let report = self.engine.sweep(now, config.tenant_id, batch_size)?;
            total.scanned += report.scanned;
            total.expired += report.expired;
            total.skipped += report.skipped;
            total.notify_failures += report.notify_failures;
            if report.scanned < batch_size || report.expired == 0 {
                return Ok(total);
            }
        }
    }

    /// Spawn the sweeper on a background thread. The first pass runs immediately.
    pub fn spawn(self, config: SweeperConfig) -> io::Result<SweeperHandle> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(SweeperStats::default()));
        let stats_clone = stats.clone();

        let join = thread::Builder::new()
            .name(config.name.clone())
            .spawn(move || {
                sweeper_loop(self, config, shutdown_rx, stats_clone);
            })?;

        Ok(SweeperHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        })
    }
}

fn sweeper_loop<S, N>(
    sweeper: DeadlineSweeper<S, N>,
    config: SweeperConfig,
    shutdown_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<SweeperStats>>,
) where
    S: ApprovalStore + 'static,
    N: ApprovalNotifier + 'static,
{
    info!(sweeper = %config.name, interval_ms = config.interval.as_millis() as u64, "deadline sweeper started");
    let start_time = Instant::now();

    loop {
        let now = Utc::now();
        let result = sweeper.sweep_until_drained(now, &config);

        if let Ok(mut s) = stats.lock() {
            s.sweeps_run += 1;
            s.uptime_secs = start_time.elapsed().as_secs();
            s.last_sweep_at = Some(now);
            match &result {
                Ok(report) => s.instances_expired += report.expired as u64,
                Err(_) => s.failures += 1,
            }
        }

        match result {
            Ok(report) if report.expired > 0 => {
                info!(sweeper = %config.name, expired = report.expired, "sweep expired approvals");
            }
            Ok(_) => debug!(sweeper = %config.name, "sweep found nothing overdue"),
            Err(e) => error!(sweeper = %config.name, error = %e, "sweep failed"),
        }

        match shutdown_rx.recv_timeout(config.interval) {
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    info!(sweeper = %config.name, "deadline sweeper stopped");
}

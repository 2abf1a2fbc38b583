//! The monitoring coordinator
//!
//! A [`BackupMonitor`] is cheap to clone; clones share the scheduler,
//! alerts and last health report. Scheduled jobs hold only a weak
//! reference, so dropping every clone stops them.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info, instrument, warn};

use super::alerts::{Alert, AlertStore, AlertType};
use super::health::{
    check_backup_integrity, check_disk_headroom, check_file_permissions, DatabaseProbe,
    HealthChecks, HealthReport, HealthStatus,
};
use super::metrics::{compute_metrics, BackupMetrics};
use super::scheduler::{Scheduler, Trigger};
use crate::audit::{Actor, AuditEntry, AuditLogger, Operation};
use crate::config::MonitoringConfig;
use crate::error::BackupResult;
use crate::storage::{BackupRegistry, CleanupResult};
use crate::validation::BackupValidator;

pub const CLEANUP_JOB: &str = "cleanup";
pub const HEALTH_CHECK_JOB: &str = "health-check";
pub const METRICS_JOB: &str = "metrics";

/// Snapshot of the monitor's state
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStatus {
    pub running: bool,
    pub jobs: Vec<String>,
    pub unresolved_alerts: usize,
    pub last_health_check: Option<HealthReport>,
}

struct MonitorInner {
    registry: Arc<BackupRegistry>,
    validator: BackupValidator,
    audit: Arc<AuditLogger>,
    probe: Arc<dyn DatabaseProbe>,
    config: MonitoringConfig,
    actor: Actor,
    scheduler: Scheduler,
    alerts: Mutex<AlertStore>,
    last_health: Mutex<Option<HealthReport>>,
}

/// Schedules cleanup and health checks, collects metrics, keeps alerts
#[derive(Clone)]
pub struct BackupMonitor {
    inner: Arc<MonitorInner>,
}

impl BackupMonitor {
    pub fn new(
        registry: Arc<BackupRegistry>,
        audit: Arc<AuditLogger>,
        probe: Arc<dyn DatabaseProbe>,
        config: MonitoringConfig,
    ) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                registry,
                validator: BackupValidator::new(),
                audit,
                probe,
                alerts: Mutex::new(AlertStore::new(config.max_alerts)),
                config,
                actor: Actor::system(),
                scheduler: Scheduler::new(),
                last_health: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &MonitoringConfig {
        &self.inner.config
    }

    fn alerts(&self) -> std::sync::MutexGuard<'_, AlertStore> {
        self.inner.alerts.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn weak(&self) -> Weak<MonitorInner> {
        Arc::downgrade(&self.inner)
    }

    fn upgrade(weak: &Weak<MonitorInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    /// Start the enabled jobs; names of the jobs this call started
    ///
    /// Jobs already running are left alone.
    pub fn start_monitoring(&self) -> BackupResult<Vec<String>> {
        let config = &self.inner.config;
        let scheduler = &self.inner.scheduler;
        let mut started = Vec::new();

        if config.cleanup_enabled {
            let trigger = Trigger::cron(&config.cleanup_schedule)?;
            let weak = self.weak();
            let fresh = scheduler.start_job(CLEANUP_JOB, trigger, move || {
                let monitor = Self::upgrade(&weak);
                async move {
                    if let Some(monitor) = monitor {
                        let _ = monitor.perform_automatic_cleanup().await;
                    }
                }
            });
            if fresh {
                started.push(CLEANUP_JOB.to_string());
            }
        }

        if config.health_check_enabled {
            let trigger = Trigger::cron(&config.health_check_schedule)?;
            let weak = self.weak();
            let fresh = scheduler.start_job(HEALTH_CHECK_JOB, trigger, move || {
                let monitor = Self::upgrade(&weak);
                async move {
                    if let Some(monitor) = monitor {
                        monitor.perform_health_check().await;
                    }
                }
            });
            if fresh {
                started.push(HEALTH_CHECK_JOB.to_string());
            }
        }

        if config.metrics_interval_minutes > 0 {
            let period = Duration::from_secs(config.metrics_interval_minutes * 60);
            let weak = self.weak();
            let fresh = scheduler.start_job(METRICS_JOB, Trigger::Every(period), move || {
                let monitor = Self::upgrade(&weak);
                async move {
                    if let Some(monitor) = monitor {
                        match monitor.collect_metrics().await {
                            Ok(metrics) => info!(
                                total = metrics.total_backups,
                                size_gb = metrics.total_size_gb,
                                success_rate = metrics.success_rate,
                                failed = metrics.corrupted_backups,
                                "backup metrics"
                            ),
                            Err(e) => warn!(error = %e, "metrics collection failed"),
                        }
                    }
                }
            });
            if fresh {
                started.push(METRICS_JOB.to_string());
            }
        }

        info!(jobs = ?started, "monitoring started");
        Ok(started)
    }

    /// Stop every job; returns how many were stopped
    pub fn stop_monitoring(&self) -> usize {
        let stopped = self.inner.scheduler.stop_all();
        info!(stopped, "monitoring stopped");
        stopped
    }

    pub fn is_running(&self) -> bool {
        !self.inner.scheduler.running_jobs().is_empty()
    }

    /// Age and count cleanup with the registry's current settings
    #[instrument(skip(self))]
    pub async fn perform_automatic_cleanup(&self) -> BackupResult<CleanupResult> {
        let result = self.run_cleanup().await;

        match &result {
            Ok(cleanup) => {
                if cleanup.removed > 0 {
                    self.create_alert(
                        AlertType::Info,
                        format!(
                            "Automatic cleanup removed {} backup(s), freeing {:.2} MB",
                            cleanup.removed,
                            cleanup.freed_bytes as f64 / (1024.0 * 1024.0)
                        ),
                        Some(json!({ "errors": cleanup.errors })),
                    )
                    .await;
                }
                self.inner
                    .audit
                    .log_operation(
                        AuditEntry::new(&self.inner.actor, Operation::Cleanup, true)
                            .metadata("removed", cleanup.removed)
                            .metadata("freedBytes", cleanup.freed_bytes)
                            .metadata("errors", cleanup.errors.len()),
                    )
                    .await;
            }
            Err(e) => {
                error!(error = %e, "automatic cleanup failed");
                self.create_alert(
                    AlertType::Error,
                    format!("Automatic cleanup failed: {}", e.message),
                    None,
                )
                .await;
                self.inner
                    .audit
                    .log_operation(
                        AuditEntry::new(&self.inner.actor, Operation::Cleanup, false)
                            .error(e.to_string()),
                    )
                    .await;
            }
        }

        match self.prune_alerts() {
            Ok(0) => {}
            Ok(pruned) => info!(pruned, "pruned resolved alerts"),
            Err(e) => warn!(error = %e, "alert pruning skipped"),
        }
        result
    }

    async fn run_cleanup(&self) -> BackupResult<CleanupResult> {
        let registry = &self.inner.registry;
        let settings = registry.settings().await?;
        let mut result = registry.cleanup_by_age(settings.retention_days).await?;
        result.merge(registry.cleanup_by_count(settings.max_backups).await?);
        info!(
            removed = result.removed,
            freed_bytes = result.freed_bytes,
            "automatic cleanup finished"
        );
        Ok(result)
    }

    /// Run the four probes and record the outcome
    #[instrument(skip(self))]
    pub async fn perform_health_check(&self) -> HealthReport {
        let started = Instant::now();
        let inner = &self.inner;
        let backup_dir = self.backup_directory().await;

        let (disk_space, backup_integrity, database_connection, file_permissions) = tokio::join!(
            check_disk_headroom(&inner.registry, inner.config.max_storage_gb),
            check_backup_integrity(&inner.registry, &inner.validator),
            inner.probe.check(),
            async {
                match &backup_dir {
                    Some(dir) => check_file_permissions(dir).await,
                    None => false,
                }
            },
        );

        let report = HealthReport::new(
            HealthChecks {
                disk_space,
                backup_integrity,
                database_connection,
                file_permissions,
            },
            started.elapsed().as_millis() as u64,
        );

        if report.status != HealthStatus::Healthy {
            let alert_type = match report.status {
                HealthStatus::Critical => AlertType::Error,
                _ => AlertType::Warning,
            };
            self.create_alert(
                alert_type,
                format!(
                    "Health check {}: failed checks: {}",
                    report.status,
                    report.failed_checks.join(", ")
                ),
                Some(json!({ "checks": report.checks })),
            )
            .await;
        }

        info!(status = %report.status, failed = ?report.failed_checks, "health check finished");
        inner
            .audit
            .log_operation(
                AuditEntry::new(
                    &inner.actor,
                    Operation::HealthCheck,
                    report.status == HealthStatus::Healthy,
                )
                .metadata("status", report.status.to_string())
                .metadata("failedChecks", report.failed_checks.clone()),
            )
            .await;

        *inner.last_health.lock().unwrap_or_else(|e| e.into_inner()) = Some(report.clone());
        report
    }

    async fn backup_directory(&self) -> Option<PathBuf> {
        match self.inner.registry.settings().await {
            Ok(settings) => Some(settings.default_directory),
            Err(e) => {
                warn!(error = %e, "cannot resolve backup directory");
                None
            }
        }
    }

    pub async fn collect_metrics(&self) -> BackupResult<BackupMetrics> {
        let document = self.inner.registry.load().await?;
        Ok(compute_metrics(&document.backups))
    }

    /// Add an alert, dropping the oldest beyond the configured maximum
    pub async fn create_alert(
        &self,
        alert_type: AlertType,
        message: impl Into<String>,
        details: Option<Value>,
    ) -> Alert {
        let alert = self.alerts().create(alert_type, message, details);
        match alert.alert_type {
            AlertType::Error => error!(alert = %alert.message, "alert raised"),
            AlertType::Warning => warn!(alert = %alert.message, "alert raised"),
            AlertType::Info => info!(alert = %alert.message, "alert raised"),
        }

        self.inner
            .audit
            .log_operation(
                AuditEntry::new(&self.inner.actor, Operation::Alert, true)
                    .resource(alert.id.clone())
                    .metadata("type", alert.alert_type.to_string())
                    .metadata("message", alert.message.clone()),
            )
            .await;
        alert
    }

    /// Newest first
    pub fn get_alerts(&self, include_resolved: bool) -> Vec<Alert> {
        self.alerts().list(include_resolved)
    }

    /// Mark an alert resolved; `false` if it is unknown
    pub async fn resolve_alert(&self, id: &str) -> bool {
        let found = self.alerts().resolve(id);
        let mut entry = AuditEntry::new(&self.inner.actor, Operation::Alert, found)
            .resource(id)
            .metadata("action", "resolve");
        if !found {
            entry = entry.error("Alert not found");
        }
        self.inner.audit.log_operation(entry).await;
        found
    }

    /// Drop resolved alerts older than the retention window
    pub fn prune_alerts(&self) -> BackupResult<usize> {
        let retention = self.inner.config.alert_retention_days;
        self.alerts().prune(retention)
    }

    pub fn status(&self) -> MonitorStatus {
        let jobs = self.inner.scheduler.running_jobs();
        MonitorStatus {
            running: !jobs.is_empty(),
            jobs,
            unresolved_alerts: self.alerts().unresolved_count(),
            last_health_check: self
                .inner
                .last_health
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
        }
    }
}

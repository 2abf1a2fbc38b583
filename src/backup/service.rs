//! Backup service: the creation pipeline and operations over registered
//! backups
//!
//! Creation runs as a sequence of steps, each under its own retry policy,
//! and the whole sequence under an outer policy. When a step's fallback
//! hands back a [`ConfigOverride`] the step is re-run once with it, and the
//! override stays in effect for the rest of the attempt.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{SecondsFormat, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

use super::compress::compress_file;
use super::dump::{ConnectionParams, DumpRequest, DumpRunner};
use super::options::{BackupOptions, BackupOutcome, ProgressSink, ProgressStatus, ProgressUpdate};
use crate::audit::{Actor, AuditEntry, AuditLogger, Operation};
use crate::config::BackupSettings;
use crate::error::{BackupError, BackupResult, ErrorContext, ErrorKind};
use crate::models::{BackupRecord, BackupStatus};
use crate::recovery::{
    ConfigOverride, ErrorHandler, ErrorLog, FallbackRegistry, FallbackStrategy, Outcome, Recovery,
    RetryPolicy,
};
use crate::storage::{BackupRegistry, RecordQuery};
use crate::validation::{
    calculate_checksum, detect_file_corruption, generate_validation_report, BackupValidator,
    ValidationResult, ValidationSummary, VALIDATION_BATCH_SIZE,
};

/// Timestamped default file name, e.g. `backup_2024-01-15T10-30-45-123Z.sql`
pub fn default_backup_filename() -> String {
    let stamp = Utc::now()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!("backup_{}.sql", stamp)
}

/// Retry policies used by the creation pipeline
#[derive(Debug, Clone)]
pub struct ServicePolicies {
    /// Wraps the whole pipeline
    pub outer: RetryPolicy,
    pub directory: RetryPolicy,
    pub dump: RetryPolicy,
    pub registry: RetryPolicy,
}

impl Default for ServicePolicies {
    fn default() -> Self {
        Self {
            outer: RetryPolicy::new(3, Duration::from_millis(2000)),
            directory: RetryPolicy::default()
                .with_retryable([ErrorKind::FileSystem, ErrorKind::Permission]),
            dump: RetryPolicy::new(3, Duration::from_millis(5000)).with_retryable([
                ErrorKind::Connection,
                ErrorKind::Timeout,
                ErrorKind::Creation,
            ]),
            registry: RetryPolicy::default().with_retryable([ErrorKind::Registry]),
        }
    }
}

impl ServicePolicies {
    /// Same attempt counts with millisecond delays
    pub fn immediate() -> Self {
        let mut policies = Self::default();
        for policy in [
            &mut policies.outer,
            &mut policies.directory,
            &mut policies.dump,
            &mut policies.registry,
        ] {
            policy.base_delay = Duration::from_millis(1);
            policy.max_delay = Duration::from_millis(5);
        }
        policies
    }
}

/// Result of checking every successful backup
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub success: bool,
    pub message: String,
    pub results: BTreeMap<PathBuf, ValidationResult>,
    pub report: String,
    pub summary: ValidationSummary,
}

/// Mutable state shared by the steps of one creation call
struct PipelineState {
    started: Instant,
    overrides: Mutex<ConfigOverride>,
    targets: Mutex<Vec<PathBuf>>,
}

impl PipelineState {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            overrides: Mutex::new(ConfigOverride::default()),
            targets: Mutex::new(Vec::new()),
        }
    }

    fn overrides(&self) -> ConfigOverride {
        self.overrides
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn apply(&self, recovery: &Recovery) {
        let Recovery::RetryWith(update) = recovery else {
            return;
        };
        let mut overrides = self.overrides.lock().unwrap_or_else(|e| e.into_inner());
        if update.compress.is_some() {
            overrides.compress = update.compress;
        }
        if update.directory.is_some() {
            overrides.directory = update.directory.clone();
        }
        if update.dump_timeout.is_some() {
            overrides.dump_timeout = update.dump_timeout;
        }
    }

    fn add_target(&self, path: PathBuf) {
        let mut targets = self.targets.lock().unwrap_or_else(|e| e.into_inner());
        if !targets.contains(&path) {
            targets.push(path);
        }
    }

    fn targets(&self) -> Vec<PathBuf> {
        self.targets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// Creates, validates and deletes backups
pub struct BackupService {
    registry: Arc<BackupRegistry>,
    validator: BackupValidator,
    handler: ErrorHandler,
    runner: Arc<dyn DumpRunner>,
    settings: BackupSettings,
    database_url: Option<String>,
    policies: ServicePolicies,
    audit: Option<Arc<AuditLogger>>,
    actor: Actor,
    progress: Option<ProgressSink>,
}

impl BackupService {
    /// Build a service with the default fallbacks plus disk-space cleanup
    pub fn new(
        registry: Arc<BackupRegistry>,
        runner: Arc<dyn DumpRunner>,
        settings: BackupSettings,
        database_url: Option<String>,
        error_log: Option<Arc<ErrorLog>>,
    ) -> Self {
        let fallbacks = FallbackRegistry::with_defaults(
            std::env::temp_dir().join("pgvault-backups"),
            settings.dump_timeout() * 2,
        );

        let cleanup_registry = Arc::clone(&registry);
        fallbacks.register(
            ErrorKind::DiskSpace,
            FallbackStrategy::new("Free space by cleaning up old backups", move |_err| {
                let registry = Arc::clone(&cleanup_registry);
                async move {
                    let result = registry.full_cleanup().await?;
                    if result.removed == 0 {
                        return Err(BackupError::disk_space(
                            "Cleanup found no backups to remove",
                        ));
                    }
                    info!(
                        removed = result.removed,
                        freed_bytes = result.freed_bytes,
                        "freed disk space"
                    );
                    Ok(Recovery::Resolved)
                }
            }),
        );

        Self {
            registry,
            validator: BackupValidator::new(),
            handler: ErrorHandler::new(error_log, fallbacks),
            runner,
            settings,
            database_url,
            policies: ServicePolicies::default(),
            audit: None,
            actor: Actor::system(),
            progress: None,
        }
    }

    /// Audit operations as `actor`
    pub fn with_audit(mut self, logger: Arc<AuditLogger>, actor: Actor) -> Self {
        self.audit = Some(logger);
        self.actor = actor;
        self
    }

    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn with_policies(mut self, policies: ServicePolicies) -> Self {
        self.policies = policies;
        self
    }

    pub fn with_validator(mut self, validator: BackupValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn registry(&self) -> &Arc<BackupRegistry> {
        &self.registry
    }

    pub fn handler(&self) -> &ErrorHandler {
        &self.handler
    }

    fn report_progress(&self, percent: u8, message: &str, status: ProgressStatus) {
        debug!(percent, message, "backup progress");
        if let Some(sink) = &self.progress {
            sink(ProgressUpdate {
                percent,
                message: message.to_string(),
                status,
            });
        }
    }

    async fn audit(&self, entry: AuditEntry) {
        if let Some(logger) = &self.audit {
            logger.log_operation(entry).await;
        }
    }

    /// Run one step under `policy`, re-running it once with the override a
    /// fallback hands back
    async fn run_step<T, F, Fut>(
        &self,
        name: &str,
        policy: &RetryPolicy,
        state: &PipelineState,
        context: &ErrorContext,
        mut step: F,
    ) -> BackupResult<T>
    where
        F: FnMut(ConfigOverride) -> Fut,
        Fut: Future<Output = BackupResult<T>>,
    {
        let overrides = state.overrides();
        let outcome = self
            .handler
            .execute_with_retry(|| step(overrides.clone()), name, context, policy)
            .await?;

        match outcome {
            Outcome::Completed(value) => Ok(value),
            Outcome::Recovered(recovery) => {
                info!(step = name, ?recovery, "re-running step after fallback");
                state.apply(&recovery);
                step(state.overrides()).await
            }
        }
    }

    /// Create a backup
    ///
    /// Never fails: every failure is reported through the returned outcome
    /// and, once a target was chosen, a `failed` record.
    #[instrument(skip(self, options))]
    pub async fn create_backup(&self, options: BackupOptions) -> BackupOutcome {
        let state = PipelineState::new();
        let filename = options
            .filename
            .clone()
            .unwrap_or_else(default_backup_filename);
        self.report_progress(0, "Starting backup", ProgressStatus::InProgress);

        let mut context = ErrorContext::new();
        context.insert("filename".into(), filename.clone().into());

        let this = self;
        let options_ref = &options;
        let filename_ref = filename.as_str();
        let state_ref = &state;
        let result = self
            .run_step(
                "create_backup",
                &self.policies.outer,
                &state,
                &context,
                move |_| this.run_pipeline(options_ref, filename_ref, state_ref),
            )
            .await;

        match result {
            Ok(record) => {
                self.report_progress(100, "Backup completed", ProgressStatus::Completed);
                info!(
                    id = %record.id,
                    file = %record.file_path.display(),
                    size = record.size,
                    "backup created"
                );
                self.audit(
                    AuditEntry::new(&self.actor, Operation::Create, true)
                        .resource(record.id.clone())
                        .metadata("filename", record.filename.clone())
                        .metadata("size", record.size)
                        .metadata("duration", record.duration_ms),
                )
                .await;

                BackupOutcome {
                    success: true,
                    backup_id: Some(record.id),
                    filename: Some(record.filename),
                    file_path: Some(record.file_path),
                    size: record.size,
                    checksum: Some(record.checksum),
                    duration_ms: record.duration_ms,
                    error: None,
                }
            }
            Err(error) => {
                self.report_progress(
                    100,
                    &format!("Backup failed: {}", error.message),
                    ProgressStatus::Failed,
                );
                warn!(kind = %error.kind, error = %error.message, "backup failed");
                let failed_id = self.record_failure(&filename, &options, &state).await;
                let mut entry = AuditEntry::new(&self.actor, Operation::Create, false)
                    .error(error.to_string())
                    .metadata("filename", filename.clone());
                if let Some(id) = &failed_id {
                    entry = entry.resource(id.clone());
                }
                self.audit(entry).await;

                BackupOutcome {
                    success: false,
                    backup_id: failed_id,
                    filename: Some(filename),
                    duration_ms: state.elapsed_ms(),
                    error: Some(error.to_string()),
                    ..BackupOutcome::default()
                }
            }
        }
    }

    async fn run_pipeline(
        &self,
        options: &BackupOptions,
        filename: &str,
        state: &PipelineState,
    ) -> BackupResult<BackupRecord> {
        let this = self;

        self.report_progress(5, "Validating options", ProgressStatus::InProgress);
        options.validate()?;
        let mode = options.dump_mode()?;
        let connection = self.connection_params()?;

        let mut context = ErrorContext::new();
        context.insert("filename".into(), filename.into());

        self.report_progress(10, "Preparing target directory", ProgressStatus::InProgress);
        let directory = self
            .run_step(
                "prepare_directory",
                &self.policies.directory,
                state,
                &context,
                move |overrides| this.prepare_directory(options, overrides),
            )
            .await?;
        let output = directory.join(filename);
        state.add_target(output.clone());
        context.insert("path".into(), output.display().to_string().into());

        self.report_progress(20, "Checking disk space", ProgressStatus::InProgress);
        let dir_ref = directory.as_path();
        self.run_step(
            "check_disk_space",
            &RetryPolicy::no_retry(),
            state,
            &context,
            move |_| this.check_disk_space(dir_ref),
        )
        .await?;

        self.report_progress(30, "Running pg_dump", ProgressStatus::InProgress);
        let output_ref = output.as_path();
        self.run_step(
            "run_dump",
            &self.policies.dump,
            state,
            &context,
            move |overrides| {
                let request = DumpRequest {
                    connection: connection.clone(),
                    output: output_ref.to_path_buf(),
                    mode,
                    timeout: overrides
                        .dump_timeout
                        .unwrap_or_else(|| this.settings.dump_timeout()),
                };
                async move { this.runner.run(&request).await }
            },
        )
        .await?;

        self.report_progress(60, "Verifying dump output", ProgressStatus::InProgress);
        let checksum = calculate_checksum(&output).await?;

        self.report_progress(70, "Validating backup", ProgressStatus::InProgress);
        let validation = self
            .validator
            .validate_backup(&output, Some(&checksum))
            .await;
        if !validation.is_valid {
            return Err(BackupError::validation(format!(
                "Backup validation failed: {}",
                validation.errors.join("; ")
            ))
            .with_context("path", output.display().to_string()));
        }

        let compress_default = options.compress.unwrap_or(self.settings.compress);
        let compressed = self
            .run_step(
                "compress",
                &RetryPolicy::no_retry(),
                state,
                &context,
                move |overrides| async move {
                    if !overrides.compress.unwrap_or(compress_default) {
                        return Ok(None);
                    }
                    this.report_progress(80, "Compressing backup", ProgressStatus::InProgress);
                    compress_file(output_ref).await.map(Some)
                },
            )
            .await?;

        let (final_path, checksum) = match compressed {
            Some(path) => {
                state.add_target(path.clone());
                let checksum = calculate_checksum(&path).await?;
                (path, checksum)
            }
            None => (output.clone(), checksum),
        };
        let size = fs::metadata(&final_path)
            .await
            .map_err(|e| BackupError::from(e).with_context("path", final_path.display().to_string()))?
            .len();

        let final_name = final_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| filename.to_string());
        let mut record = BackupRecord::new(final_name, final_path, size, checksum);
        record.created_by = options.created_by.clone();
        record.duration_ms = state.elapsed_ms();
        record.schema_version = self.settings.schema_version.clone();

        self.report_progress(90, "Saving backup record", ProgressStatus::InProgress);
        let record_ref = &record;
        self.run_step(
            "save_record",
            &self.policies.registry,
            state,
            &context,
            move |_| this.registry.add_record(record_ref.clone()),
        )
        .await?;

        Ok(record)
    }

    fn connection_params(&self) -> BackupResult<ConnectionParams> {
        let url = self
            .database_url
            .as_deref()
            .ok_or_else(|| BackupError::validation("No database URL configured"))?;
        ConnectionParams::from_url(url)
    }

    async fn prepare_directory(
        &self,
        options: &BackupOptions,
        overrides: ConfigOverride,
    ) -> BackupResult<PathBuf> {
        let directory = match overrides.directory.or_else(|| options.directory.clone()) {
            Some(directory) => directory,
            None => self.registry.settings().await?.default_directory,
        };
        let directory = if directory.is_absolute() {
            directory
        } else {
            std::env::current_dir()?.join(directory)
        };

        fs::create_dir_all(&directory).await.map_err(|e| {
            BackupError::from(e).with_context("path", directory.display().to_string())
        })?;
        Ok(directory)
    }

    async fn check_disk_space(&self, directory: &Path) -> BackupResult<()> {
        let dir = directory.to_path_buf();
        let available = tokio::task::spawn_blocking(move || fs2::available_space(&dir))
            .await
            .map_err(|e| BackupError::file_system(format!("Disk space check failed: {}", e)))?
            .map_err(|e| {
                BackupError::from(e).with_context("path", directory.display().to_string())
            })?;

        let required = self.settings.min_free_space_bytes();
        if available < required {
            return Err(BackupError::disk_space(format!(
                "Insufficient disk space: {} MiB available, {} MiB required",
                available / (1024 * 1024),
                required / (1024 * 1024)
            ))
            .with_context("available", available)
            .with_context("required", required));
        }
        Ok(())
    }

    /// Remove partial output and persist a `failed` record when a target
    /// was chosen
    async fn record_failure(
        &self,
        filename: &str,
        options: &BackupOptions,
        state: &PipelineState,
    ) -> Option<String> {
        let targets = state.targets();
        for path in &targets {
            remove_if_present(path).await;
        }

        let target = targets.into_iter().next()?;
        let mut record = BackupRecord::new(filename, target, 0, "");
        record.status = BackupStatus::Failed;
        record.created_by = options.created_by.clone();
        record.duration_ms = state.elapsed_ms();
        record.schema_version = self.settings.schema_version.clone();
        let id = record.id.clone();

        match self.registry.add_record(record).await {
            Ok(()) => Some(id),
            Err(e) => {
                warn!(error = %e, "failed to record failed backup");
                None
            }
        }
    }

    /// Registered backups, newest first
    pub async fn list_backups(&self, query: &RecordQuery) -> BackupResult<Vec<BackupRecord>> {
        let records = self.registry.list_records(query).await?;
        self.audit(
            AuditEntry::new(&self.actor, Operation::List, true).metadata("count", records.len()),
        )
        .await;
        Ok(records)
    }

    pub async fn get_backup(&self, id: &str) -> BackupResult<Option<BackupRecord>> {
        self.registry.get_record(id).await
    }

    /// Whether the file passes validation
    pub async fn validate_backup(&self, path: &Path, expected_checksum: Option<&str>) -> bool {
        self.validate_backup_detailed(path, expected_checksum)
            .await
            .is_valid
    }

    pub async fn validate_backup_detailed(
        &self,
        path: &Path,
        expected_checksum: Option<&str>,
    ) -> ValidationResult {
        let result = self.validator.validate_backup(path, expected_checksum).await;
        let mut entry = AuditEntry::new(&self.actor, Operation::Validate, result.is_valid)
            .metadata("path", path.display().to_string())
            .metadata("errors", result.errors.len());
        if !result.is_valid {
            entry = entry.error(result.errors.join("; "));
        }
        self.audit(entry).await;
        result
    }

    /// Validate the registered backups with the given ids
    ///
    /// Unknown ids are skipped; it is an error if none are known.
    pub async fn validate_backups_by_ids(
        &self,
        ids: &[String],
    ) -> BackupResult<BTreeMap<PathBuf, ValidationResult>> {
        let document = self.registry.load().await?;
        let mut paths = Vec::new();
        let mut expected = HashMap::new();

        for id in ids {
            match document.backups.iter().find(|b| &b.id == id) {
                Some(record) => {
                    paths.push(record.file_path.clone());
                    if !record.checksum.is_empty() {
                        expected.insert(record.file_path.clone(), record.checksum.clone());
                    }
                }
                None => warn!(id = %id, "unknown backup id"),
            }
        }

        if paths.is_empty() {
            return Err(
                BackupError::registry("None of the given backup ids are registered")
                    .with_context("ids", ids.to_vec()),
            );
        }

        Ok(self.validator.validate_multiple_backups(&paths, &expected).await)
    }

    /// Validate every successful backup against its recorded checksum
    #[instrument(skip(self))]
    pub async fn integrity_check(&self) -> BackupResult<IntegrityReport> {
        let records = self
            .registry
            .list_records(&RecordQuery {
                status: Some(BackupStatus::Success),
                ..RecordQuery::default()
            })
            .await?;

        let paths: Vec<PathBuf> = records.iter().map(|r| r.file_path.clone()).collect();
        let expected: HashMap<PathBuf, String> = records
            .iter()
            .map(|r| (r.file_path.clone(), r.checksum.clone()))
            .collect();

        let results = self.validator.validate_multiple_backups(&paths, &expected).await;
        let summary = ValidationSummary::from_results(&results);
        let report = generate_validation_report(&results);
        let success = summary.invalid == 0;
        let message = if summary.total == 0 {
            "No backups to check".to_string()
        } else if success {
            format!("All {} backups passed integrity checks", summary.total)
        } else {
            format!(
                "{} of {} backups failed integrity checks",
                summary.invalid, summary.total
            )
        };

        self.audit(
            AuditEntry::new(&self.actor, Operation::Validate, success)
                .metadata("scope", "integrity_check")
                .metadata("total", summary.total)
                .metadata("invalid", summary.invalid),
        )
        .await;

        Ok(IntegrityReport {
            success,
            message,
            results,
            report,
            summary,
        })
    }

    /// Successful backups whose files are unreadable or look corrupted
    pub async fn detect_corrupted_backups(&self) -> BackupResult<Vec<BackupRecord>> {
        let records = self
            .registry
            .list_records(&RecordQuery {
                status: Some(BackupStatus::Success),
                ..RecordQuery::default()
            })
            .await?;

        let mut corrupted = Vec::new();
        for batch in records.chunks(VALIDATION_BATCH_SIZE) {
            let checks = batch.iter().map(|record| async move {
                (record, detect_file_corruption(&record.file_path).await)
            });
            for (record, is_corrupted) in join_all(checks).await {
                if is_corrupted {
                    warn!(id = %record.id, file = %record.file_path.display(), "corrupted backup");
                    corrupted.push(record.clone());
                }
            }
        }
        Ok(corrupted)
    }

    /// Delete a backup's file and record; `false` if the id is unknown
    #[instrument(skip(self))]
    pub async fn delete_backup(&self, id: &str) -> BackupResult<bool> {
        let Some(record) = self.registry.get_record(id).await? else {
            self.audit(
                AuditEntry::new(&self.actor, Operation::Delete, false)
                    .resource(id)
                    .error("Backup not found"),
            )
            .await;
            return Ok(false);
        };

        remove_if_present(&record.file_path).await;
        self.registry.remove_record(id).await?;

        info!(id, file = %record.file_path.display(), "backup deleted");
        self.audit(
            AuditEntry::new(&self.actor, Operation::Delete, true)
                .resource(id)
                .metadata("filename", record.filename)
                .metadata("freedBytes", record.size),
        )
        .await;
        Ok(true)
    }
}

async fn remove_if_present(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => debug!(file = %path.display(), "removed backup file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(file = %path.display(), error = %e, "failed to remove backup file"),
    }
}

//! Named background jobs driven by cron expressions or fixed intervals

use std::collections::HashMap;
use std::future::Future;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{BackupError, BackupResult};

/// Parse a cron expression
///
/// Six- and seven-field expressions (with seconds, optionally year) are
/// used as is; five-field expressions run at second zero.
pub fn parse_schedule(expression: &str) -> BackupResult<Schedule> {
    let trimmed = expression.trim();
    let normalized = match trimmed.split_whitespace().count() {
        5 => format!("0 {}", trimmed),
        _ => trimmed.to_string(),
    };

    Schedule::from_str(&normalized).map_err(|e| {
        BackupError::validation(format!("Invalid schedule '{}': {}", expression, e))
            .with_context("schedule", expression)
    })
}

/// The first fire time after both the previous one and `now`; runs
/// missed while a job was busy are skipped
fn next_fire(
    schedule: &Schedule,
    previous: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    schedule.after(&previous.max(now)).next()
}

/// When a job fires
#[derive(Debug, Clone)]
pub enum Trigger {
    Cron(Schedule),
    Every(Duration),
}

impl Trigger {
    pub fn cron(expression: &str) -> BackupResult<Self> {
        parse_schedule(expression).map(Trigger::Cron)
    }
}

/// Runs named jobs on tokio tasks; each can be stopped independently
#[derive(Default)]
pub struct Scheduler {
    jobs: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `job` under `name`. Returns `false` without doing anything if
    /// a job with that name is already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_job<F, Fut>(&self, name: &str, trigger: Trigger, job: F) -> bool
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        if jobs.get(name).map_or(false, |handle| !handle.is_finished()) {
            debug!(job = name, "job already running");
            return false;
        }

        let job_name = name.to_string();
        let handle = tokio::spawn(async move {
            let mut cursor = Utc::now();
            loop {
                let wait = match &trigger {
                    Trigger::Every(period) => *period,
                    Trigger::Cron(schedule) => {
                        let now = Utc::now();
                        let Some(next) = next_fire(schedule, cursor, now) else {
                            info!(job = %job_name, "schedule has no further runs");
                            break;
                        };
                        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
                        cursor = next;
                        wait
                    }
                };

                tokio::time::sleep(wait).await;
                debug!(job = %job_name, "running scheduled job");
                job().await;
            }
        });

        info!(job = name, "started scheduled job");
        jobs.insert(name.to_string(), handle);
        true
    }

    /// Stop a job; `false` if no job had that name
    pub fn stop_job(&self, name: &str) -> bool {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        match jobs.remove(name) {
            Some(handle) => {
                handle.abort();
                info!(job = name, "stopped scheduled job");
                true
            }
            None => false,
        }
    }

    /// Stop every job, returning how many were stopped
    pub fn stop_all(&self) -> usize {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let count = jobs.len();
        for (name, handle) in jobs.drain() {
            handle.abort();
            debug!(job = %name, "stopped scheduled job");
        }
        count
    }

    pub fn is_running(&self, name: &str) -> bool {
        let jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        jobs.get(name).map_or(false, |handle| !handle.is_finished())
    }

    /// Names of jobs still running, sorted
    pub fn running_jobs(&self) -> Vec<String> {
        let jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = jobs
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let jobs = self.jobs.get_mut().unwrap_or_else(|e| e.into_inner());
        if !jobs.is_empty() {
            warn!(count = jobs.len(), "scheduler dropped with running jobs");
        }
        for (_, handle) in jobs.drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_parse_schedules() {
        assert!(parse_schedule("0 0 2 * * *").is_ok());
        assert!(parse_schedule("0 0 */6 * * *").is_ok());
        assert!(parse_schedule("*/5 * * * *").is_ok());
        assert!(parse_schedule("not a schedule").is_err());
    }

    #[test]
    fn test_five_fields_run_at_second_zero() {
        let schedule = parse_schedule("30 2 * * *").unwrap();
        let next = schedule.upcoming(Utc).next().unwrap();
        assert_eq!(next.format("%H:%M:%S").to_string(), "02:30:00");
    }

    #[test]
    fn test_next_fire_skips_missed_runs() {
        let schedule = parse_schedule("* * * * *").unwrap();
        let now = Utc::now();
        let an_hour_ago = now - chrono::Duration::hours(1);

        let next = next_fire(&schedule, an_hour_ago, now).unwrap();
        assert!(next > now);
        assert!(next - now <= chrono::Duration::minutes(1));

        let following = next_fire(&schedule, next, now).unwrap();
        assert_eq!(following - next, chrono::Duration::minutes(1));
    }

    #[tokio::test]
    async fn test_interval_job_runs_and_stops() {
        let scheduler = Scheduler::new();
        let runs = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&runs);

        assert!(scheduler.start_job("tick", Trigger::Every(Duration::from_millis(10)), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }));
        assert!(!scheduler.start_job("tick", Trigger::Every(Duration::from_millis(10)), || async {}));
        assert_eq!(scheduler.running_jobs(), vec!["tick".to_string()]);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(runs.load(Ordering::SeqCst) >= 2);

        assert!(scheduler.stop_job("tick"));
        assert!(!scheduler.stop_job("tick"));
        assert!(scheduler.running_jobs().is_empty());

        let after_stop = runs.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(runs.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test]
    async fn test_cron_job_fires() {
        let scheduler = Scheduler::new();
        let runs = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&runs);

        scheduler.start_job("every-second", Trigger::cron("* * * * * *").unwrap(), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(2200)).await;
        assert!(runs.load(Ordering::SeqCst) >= 1);
        assert_eq!(scheduler.stop_all(), 1);
    }
}

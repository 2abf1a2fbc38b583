//! Monitoring CLI commands

use clap::Subcommand;
use tracing::info;

use super::AppContext;
use crate::display::{format_alert, format_health_report, format_metrics, format_size};
use crate::error::{BackupError, BackupResult};
use crate::monitoring::HealthStatus;

/// Monitor subcommands
#[derive(Subcommand)]
pub enum MonitorCommands {
    /// Run scheduled cleanup, health checks and metrics until interrupted
    Run {
        /// Run a health check before waiting for the schedule
        #[arg(long)]
        check_now: bool,
    },

    /// Run a health check once
    Health,

    /// Show backup metrics
    Metrics,

    /// Run the automatic retention cleanup once
    Cleanup,
}

/// Handle a monitor command
pub async fn handle_monitor_command(context: &AppContext, cmd: MonitorCommands) -> BackupResult<()> {
    let monitor = context.monitor();

    match cmd {
        MonitorCommands::Run { check_now } => {
            let config = monitor.config();
            let jobs = monitor.start_monitoring()?;
            if jobs.is_empty() {
                println!("Nothing to schedule: cleanup and health checks are disabled.");
                return Ok(());
            }

            println!("Monitoring started: {}", jobs.join(", "));
            if config.cleanup_enabled {
                println!("  Cleanup:      {}", config.cleanup_schedule);
            }
            if config.health_check_enabled {
                println!("  Health check: {}", config.health_check_schedule);
            }
            println!("  Metrics:      every {} min", config.metrics_interval_minutes);
            println!("Press Ctrl-C to stop.");

            if check_now {
                let report = monitor.perform_health_check().await;
                print!("{}", format_health_report(&report));
            }

            tokio::signal::ctrl_c().await.map_err(|e| {
                BackupError::unknown(format!("Failed to wait for interrupt: {}", e))
            })?;

            let stopped = monitor.stop_monitoring();
            info!(stopped, "monitor interrupted");

            let status = monitor.status();
            println!();
            println!("Stopped {} job(s).", stopped);
            if status.unresolved_alerts > 0 {
                println!("Unresolved alerts:");
                for alert in monitor.get_alerts(false) {
                    println!("  {}", format_alert(&alert));
                }
            }
        }

        MonitorCommands::Health => {
            let report = monitor.perform_health_check().await;
            print!("{}", format_health_report(&report));
            if report.status == HealthStatus::Critical {
                return Err(BackupError::validation(format!(
                    "Health check failed: {}",
                    report.failed_checks.join(", ")
                )));
            }
        }

        MonitorCommands::Metrics => {
            let metrics = monitor.collect_metrics().await?;
            print!("{}", format_metrics(&metrics));
        }

        MonitorCommands::Cleanup => {
            let result = monitor.perform_automatic_cleanup().await?;
            println!(
                "Removed {} backup(s), freed {}.",
                result.removed,
                format_size(result.freed_bytes)
            );
            for error in &result.errors {
                println!("  Error: {}", error);
            }
        }
    }

    Ok(())
}

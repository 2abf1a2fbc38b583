use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pgvault::cli::{
    handle_audit_command, handle_backup_command, handle_error_command, handle_monitor_command,
    handle_registry_command, AppContext,
};
use pgvault::config::VaultPaths;

#[derive(Parser)]
#[command(
    name = "pgvault",
    author = "Kaylee Beyene",
    version,
    about = "Database backup lifecycle manager",
    long_about = "pgvault creates PostgreSQL dumps, verifies their integrity, tracks \
                  them in a registry, enforces retention, and monitors the whole \
                  setup on a schedule."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directories, registry and settings file
    Init,

    /// Show current configuration and paths
    Config,

    /// Backup management commands
    #[command(subcommand)]
    Backup(pgvault::cli::BackupCommands),

    /// Registry maintenance commands
    #[command(subcommand)]
    Registry(pgvault::cli::RegistryCommands),

    /// Scheduled monitoring, health checks and metrics
    #[command(subcommand)]
    Monitor(pgvault::cli::MonitorCommands),

    /// Audit log commands
    #[command(subcommand)]
    Audit(pgvault::cli::AuditCommands),

    /// Error log commands
    #[command(subcommand)]
    Errors(pgvault::cli::ErrorCommands),
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pgvault=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    // Initialize paths and settings
    let paths = VaultPaths::new()?;
    let context = AppContext::load(paths.clone()).await?;

    match cli.command {
        Some(Commands::Init) => {
            println!("Initializing pgvault at: {}", paths.base_dir().display());
            paths.ensure_directories().await?;
            context.registry.initialize().await?;
            context.settings.save(&paths).await?;
            println!("Initialization complete!");
            println!();
            println!("Backups:  {}", paths.backup_dir().display());
            println!("Registry: {}", paths.registry_file().display());
            println!("Settings: {}", paths.settings_file().display());
            println!();
            println!("Set DATABASE_URL or database_url in the settings file, then run");
            println!("'pgvault backup create'.");
        }
        Some(Commands::Config) => {
            let settings = &context.settings;
            println!("pgvault Configuration");
            println!("=====================");
            println!("Data directory:   {}", paths.base_dir().display());
            println!("Backup directory: {}", paths.backup_dir().display());
            println!("Registry file:    {}", paths.registry_file().display());
            println!("Audit log:        {}", paths.audit_log().display());
            println!("Error log:        {}", paths.error_log().display());
            println!("Settings file:    {}", paths.settings_file().display());
            println!();
            println!("Settings:");
            println!(
                "  Database URL:     {}",
                if settings.effective_database_url().is_some() {
                    "configured"
                } else {
                    "not set"
                }
            );
            println!("  Dump binary:      {}", settings.backup.dump_binary);
            println!("  Dump timeout:     {}s", settings.backup.dump_timeout_secs);
            println!("  Min free space:   {} MB", settings.backup.min_free_space_mb);
            println!("  Compress:         {}", settings.backup.compress);
            println!(
                "  Cleanup:          {} ({})",
                settings.monitoring.cleanup_schedule,
                if settings.monitoring.cleanup_enabled { "enabled" } else { "disabled" }
            );
            println!(
                "  Health check:     {} ({})",
                settings.monitoring.health_check_schedule,
                if settings.monitoring.health_check_enabled { "enabled" } else { "disabled" }
            );
        }
        Some(Commands::Backup(cmd)) => handle_backup_command(&context, cmd).await?,
        Some(Commands::Registry(cmd)) => handle_registry_command(&context, cmd).await?,
        Some(Commands::Monitor(cmd)) => handle_monitor_command(&context, cmd).await?,
        Some(Commands::Audit(cmd)) => handle_audit_command(&context, cmd).await?,
        Some(Commands::Errors(cmd)) => handle_error_command(&context, cmd).await?,
        None => {
            println!("pgvault - database backup lifecycle manager");
            println!();
            println!("Run 'pgvault --help' for usage information.");
            println!("Run 'pgvault init' to set up the data directory.");
        }
    }

    Ok(())
}

// crates/scan-manager-cli/src/main.rs
// ============================================================================
// Module: Scan Manager CLI Entry Point
// Description: Command dispatcher for store maintenance and the evaluator.
// Purpose: Provide init, migrate, backup, check, and tick commands over
//          the manager core.
// Dependencies: clap, scan-manager-config, scan-manager-entities,
//               scan-manager-escalate, scan-manager-report,
//               scan-manager-schedule, scan-manager-store, tracing
// ============================================================================

//! ## Overview
//! The binary wires the core together for operation outside the control
//! protocol: store bootstrap, explicit migration (never implicit; startup
//! refuses an old store), pre-migration style backups, version checks,
//! and a single schedule-evaluator tick that dispatches the resulting
//! escalations. Diagnostics go through the logging subsystem.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use clap::Parser;
use clap::Subcommand;
use scan_manager_config::ConfigError;
use scan_manager_config::ManagerConfig;
use scan_manager_entities::EntityError;
use scan_manager_entities::Manage;
use scan_manager_escalate::EscalateError;
use scan_manager_escalate::EscalateTools;
use scan_manager_escalate::escalate_event;
use scan_manager_report::ReportPipeline;
use scan_manager_schedule::ScheduleError;
use scan_manager_schedule::tick;
use scan_manager_store::MigrateError;
use scan_manager_store::MigrateOutcome;
use scan_manager_store::Store;
use scan_manager_store::StoreError;
use scan_manager_store::VersionStatus;
use scan_manager_store::backup_store;
use scan_manager_store::initialize;
use scan_manager_store::migrate;
use scan_manager_store::version_status;
use thiserror::Error;
use tracing::error;
use tracing::info;
use tracing_subscriber::EnvFilter;

// ============================================================================
// SECTION: Arguments
// ============================================================================

/// Scan manager maintenance and scheduling commands.
#[derive(Debug, Parser)]
#[command(name = "scan-manager", version, about)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Command to run.
    #[command(subcommand)]
    command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
enum Command {
    /// Create the state directory and bootstrap the store with its
    /// predefined entities.
    Init,
    /// Advance the store schema to the supported version.
    Migrate,
    /// Copy the store and its WAL to `.bak` siblings.
    Backup,
    /// Report the store's schema version status.
    Check,
    /// Run one schedule-evaluator tick and dispatch escalations.
    Tick,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Command failure.
#[derive(Debug, Error)]
enum CliError {
    /// Configuration failure.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Migration failure.
    #[error(transparent)]
    Migrate(#[from] MigrateError),
    /// Repository failure.
    #[error(transparent)]
    Entity(#[from] EntityError),
    /// Evaluator failure.
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    /// Escalation failure.
    #[error(transparent)]
    Escalate(#[from] EscalateError),
    /// The store needs an explicit migration before service.
    #[error("store at version {0} needs `scan-manager migrate`")]
    NeedsMigration(i64),
    /// The store was written by a newer build.
    #[error("store at version {0} is newer than this build")]
    TooNew(i64),
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info")
        }))
        .init();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "command failed");
            ExitCode::FAILURE
        }
    }
}

/// Dispatches the parsed command.
fn run(cli: &Cli) -> Result<(), CliError> {
    let config = ManagerConfig::load(cli.config.as_deref())?;
    match cli.command {
        Command::Init => run_init(&config),
        Command::Migrate => run_migrate(&config),
        Command::Backup => run_backup(&config),
        Command::Check => run_check(&config),
        Command::Tick => run_tick(&config),
    }
}

/// Opens the store at the configured path.
fn open_store(config: &ManagerConfig) -> Result<Store, CliError> {
    Ok(Store::open(&config.database_path())?)
}

/// Opens the store and refuses service unless it is at the supported
/// version. Migration is never implicit.
fn open_current_store(config: &ManagerConfig) -> Result<Store, CliError> {
    let mut store = open_store(config)?;
    match version_status(&mut store)? {
        VersionStatus::Current => Ok(store),
        VersionStatus::Uninitialized => {
            initialize(&mut store)?;
            Ok(store)
        }
        VersionStatus::NeedsMigration(version) => Err(CliError::NeedsMigration(version)),
        VersionStatus::TooNew(version) => Err(CliError::TooNew(version)),
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// `init`: create the state tree and bootstrap the store.
fn run_init(config: &ManagerConfig) -> Result<(), CliError> {
    config.ensure_state_dir()?;
    let mut store = open_store(config)?;
    match version_status(&mut store)? {
        VersionStatus::NeedsMigration(version) => {
            return Err(CliError::NeedsMigration(version));
        }
        VersionStatus::TooNew(version) => return Err(CliError::TooNew(version)),
        VersionStatus::Current | VersionStatus::Uninitialized => {}
    }
    initialize(&mut store)?;
    info!(path = %config.database_path().display(), "store initialized");
    Ok(())
}

/// `migrate`: advance the schema, with backup and post-run maintenance.
fn run_migrate(config: &ManagerConfig) -> Result<(), CliError> {
    let mut store = open_store(config)?;
    match migrate(&mut store)? {
        MigrateOutcome::Migrated {
            from,
            to,
        } => info!(from, to, "store migrated"),
        MigrateOutcome::AlreadyCurrent => info!("store already current"),
    }
    Ok(())
}

/// `backup`: copy the store files to `.bak` siblings.
fn run_backup(config: &ManagerConfig) -> Result<(), CliError> {
    let mut store = open_store(config)?;
    if let Some(path) = backup_store(&mut store)? {
        info!(path = %path.display(), "store backed up");
    }
    Ok(())
}

/// `check`: report the version status; non-current is a failure.
fn run_check(config: &ManagerConfig) -> Result<(), CliError> {
    let mut store = open_store(config)?;
    match version_status(&mut store)? {
        VersionStatus::Current => {
            info!("store is at the supported version");
            Ok(())
        }
        VersionStatus::Uninitialized => {
            info!("store is uninitialized; run `scan-manager init`");
            Ok(())
        }
        VersionStatus::NeedsMigration(version) => Err(CliError::NeedsMigration(version)),
        VersionStatus::TooNew(version) => Err(CliError::TooNew(version)),
    }
}

/// `tick`: one evaluator pass plus escalation dispatch for its events.
fn run_tick(config: &ManagerConfig) -> Result<(), CliError> {
    let store = open_current_store(config)?;
    let mut manage = Manage::new(store);
    manage.reload_nvt_snapshot()?;
    let now = unix_now();
    let outcome = tick(&mut manage, now)?;
    info!(
        started = outcome.started.len(),
        stopped = outcome.stopped.len(),
        "schedule tick complete"
    );
    let tools = EscalateTools {
        sendmail: config.sendmail_path.clone(),
        wget: config.wget_path.clone(),
        timeout: config.tool_timeout,
    };
    let pipeline = ReportPipeline::new(&config.sysconf_dir, config.tool_timeout);
    for event in outcome.stopped.iter().chain(outcome.started.iter()) {
        let dispatched = escalate_event(&mut manage, &tools, Some(&pipeline), event)?;
        if dispatched > 0 {
            info!(task = %event.task_name, dispatched, "escalations dispatched");
        }
    }
    Ok(())
}

/// Current wall-clock time in unix seconds.
fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::Cli;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}

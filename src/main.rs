use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use linkaudit::cli::{Cli, Commands};
use linkaudit::coordinator::{Coordinator, InvocationReport};
use linkaudit::cycle::CycleStatus;
use linkaudit::error::AuditError;
use linkaudit::inventory::InventoryBackend;
use linkaudit::logging::init_logging_in_data_dir;
use linkaudit::notify::Notifier;
use linkaudit::options::AuditOptions;
use linkaudit::probe::HttpFetcher;
use linkaudit::results::ResultLog;
use linkaudit::state::AuditState;
use linkaudit::CheckpointStore;

#[derive(Error, Debug)]
pub enum MainError {
    #[error("Audit error: {0}")]
    Audit(#[from] AuditError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Logging error: {0}")]
    Logging(String),
}

impl From<Box<dyn std::error::Error>> for MainError {
    fn from(err: Box<dyn std::error::Error>) -> Self {
        MainError::Logging(err.to_string())
    }
}

fn load_options(path: Option<&str>) -> Result<AuditOptions, AuditError> {
    match path {
        Some(path) => AuditOptions::load(path),
        None => Ok(AuditOptions::default()),
    }
}

async fn run_audit_command(
    data_dir: String,
    inventory: String,
    options_path: Option<String>,
    budget_secs: u64,
    user_agent: String,
    daily_budget: Option<i64>,
    preview: bool,
) -> Result<(), MainError> {
    let options = load_options(options_path.as_deref())?;
    let backend = Arc::new(InventoryBackend::load(&inventory)?);
    let state = Arc::new(AuditState::new(&data_dir, preview).map_err(AuditError::from)?);
    let log = Arc::new(ResultLog::new(&data_dir).map_err(AuditError::from)?);
    let notifier = Notifier::from_options(&options);
    let fetcher = Arc::new(HttpFetcher::new(&user_agent, daily_budget));

    let coordinator = Coordinator::new(
        state,
        backend.clone(),
        backend,
        fetcher,
        log,
        notifier,
        options,
        Duration::from_secs(budget_secs),
    );

    match coordinator.run_invocation().await? {
        InvocationReport::Waited { remaining_days } => {
            println!(
                "Cycle finished recently; next cycle in {:.1} day(s)",
                remaining_days
            );
        }
        InvocationReport::Scanned(summary) => {
            println!(
                "Scanned {} account(s) ({} completed), checked {} URL(s), {} new error(s)",
                summary.accounts_scanned,
                summary.accounts_completed,
                summary.urls_checked,
                summary.new_errors
            );
            if summary.cycle_complete {
                println!(
                    "Cycle complete: {} error(s) total, results in {}",
                    summary.cycle_error_count, data_dir
                );
            } else {
                println!(
                    "Cycle in progress: {} error(s) so far, run again to continue",
                    summary.cycle_error_count
                );
            }
        }
    }

    Ok(())
}

fn run_status_command(data_dir: String, options_path: Option<String>) -> Result<(), MainError> {
    let options = load_options(options_path.as_deref())?;
    let state = AuditState::new(&data_dir, true).map_err(AuditError::from)?;
    let log = ResultLog::new(&data_dir).map_err(AuditError::from)?;

    match state.load_cycle_status().map_err(AuditError::from)? {
        None => println!("No cycle has run yet"),
        Some(status) => {
            let phase = if status.in_progress() {
                "in progress"
            } else {
                "finished"
            };
            println!("Cycle {phase}");
            if let Some(started) = status.started_at {
                println!("  started:   {started}");
            }
            if let Some(completed) = status.completed_at {
                println!("  completed: {completed}");
            }
            if let Some(notified) = status.notified_at {
                println!("  notified:  {notified}");
            }
            let rows = log.read_all().map_err(AuditError::from)?;
            let errors = log
                .count_errors(&options.valid_codes)
                .map_err(AuditError::from)?;
            println!("  rows:      {} ({} error rows)", rows.len(), errors);
        }
    }

    Ok(())
}

fn run_reset_command(data_dir: String) -> Result<(), MainError> {
    let state = AuditState::new(&data_dir, false).map_err(AuditError::from)?;
    let log = ResultLog::new(&data_dir).map_err(AuditError::from)?;

    state.clear_all_marks().map_err(AuditError::from)?;
    state
        .save_cycle_status(&CycleStatus::default())
        .map_err(AuditError::from)?;
    log.archive_and_clear().map_err(AuditError::from)?;

    println!("Checkpoint marks and cycle metadata cleared, results archived");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), MainError> {
    let cli = Cli::parse_args();

    match cli.command {
        Commands::Run {
            data_dir,
            inventory,
            options,
            budget_secs,
            user_agent,
            daily_budget,
            preview,
        } => {
            init_logging_in_data_dir(&data_dir)?;
            run_audit_command(
                data_dir,
                inventory,
                options,
                budget_secs,
                user_agent,
                daily_budget,
                preview,
            )
            .await?;
        }

        Commands::Status { data_dir, options } => {
            run_status_command(data_dir, options)?;
        }

        Commands::Reset { data_dir } => {
            run_reset_command(data_dir)?;
        }
    }

    Ok(())
}

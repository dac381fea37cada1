//! Invocation settlement: fold the parallel account outcomes into the result
//! log, the checkpoint marks, and the cycle metadata.
//!
//! An account is marked only when its scan completed. The cycle completes
//! when every outcome this invocation completed and no selectable account
//! remains unmarked.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::backend::{AccountDirectory, AccountFilter};
use crate::checkpoint::CheckpointStore;
use crate::cycle::CycleStatus;
use crate::error::AuditError;
use crate::options::AuditOptions;
use crate::results::ResultLog;
use crate::scanner::AccountOutcome;

/// What one invocation amounted to, for logging and notification decisions.
#[derive(Debug, Clone, Copy)]
pub struct InvocationSummary {
    pub accounts_scanned: usize,
    pub accounts_completed: usize,
    pub urls_checked: usize,
    pub rows_written: usize,
    /// Error rows produced by this invocation alone.
    pub new_errors: usize,
    /// Error rows across the whole cycle so far.
    pub cycle_error_count: usize,
    pub cycle_complete: bool,
}

pub async fn settle_invocation(
    outcomes: Vec<AccountOutcome>,
    options: &AuditOptions,
    log: &ResultLog,
    checkpoint: &dyn CheckpointStore,
    directory: &dyn AccountDirectory,
    filter: &AccountFilter,
    status: &mut CycleStatus,
    now: DateTime<Utc>,
) -> Result<InvocationSummary, AuditError> {
    let accounts_scanned = outcomes.len();
    let mut accounts_completed = 0;
    let mut all_completed = true;
    let mut rows = Vec::new();

    for outcome in outcomes {
        if outcome.did_complete {
            checkpoint.mark_account(&outcome.account.id)?;
            accounts_completed += 1;
        } else {
            all_completed = false;
        }
        rows.extend(outcome.url_checks);
    }

    let urls_checked = rows.len();
    let new_errors = rows
        .iter()
        .filter(|row| row.status.is_error(&options.valid_codes))
        .count();
    let rows_written = log.append(&rows, options.save_all_urls, &options.valid_codes)?;

    let cycle_error_count = log.count_errors(&options.valid_codes)?;
    status.error_count = cycle_error_count;

    let cycle_complete = all_completed && unmarked_remaining(directory, filter, checkpoint).await? == 0;
    if cycle_complete {
        status.completed_at = Some(now);
    }

    info!(
        accounts_scanned,
        accounts_completed,
        urls_checked,
        rows_written,
        new_errors,
        cycle_error_count,
        cycle_complete,
        "invocation settled"
    );

    Ok(InvocationSummary {
        accounts_scanned,
        accounts_completed,
        urls_checked,
        rows_written,
        new_errors,
        cycle_error_count,
        cycle_complete,
    })
}

/// Selectable accounts still without a completion mark.
pub async fn unmarked_remaining(
    directory: &dyn AccountDirectory,
    filter: &AccountFilter,
    checkpoint: &dyn CheckpointStore,
) -> Result<usize, AuditError> {
    let mut remaining = 0;
    for account in directory.accounts(filter).await? {
        if !checkpoint.is_account_marked(&account.id)? {
            remaining += 1;
        }
    }
    Ok(remaining)
}

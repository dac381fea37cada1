//! Invocation orchestration: decide what this invocation does with the
//! persisted cycle, dispatch a bounded batch of account scans in parallel,
//! and settle the outcomes.
//!
//! Each selected account gets its own task; the shared deadline and the
//! shared daily budget are the only cross-task couplings.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::aggregate::{settle_invocation, InvocationSummary};
use crate::backend::{AccountDirectory, AccountFilter, AccountRef, EntityBackend};
use crate::checkpoint::{CheckpointError, CheckpointStore};
use crate::config::Config;
use crate::cycle::{self, CycleAction, CycleStatus};
use crate::error::AuditError;
use crate::notify::{Notification, Notifier};
use crate::options::AuditOptions;
use crate::probe::{Fetcher, ProbePolicy, UrlProbe};
use crate::results::ResultLog;
use crate::scanner::{AccountScanner, Deadline};
use crate::source::EntityUrlSource;
use crate::state::AuditState;

/// What one invocation did.
#[derive(Debug)]
pub enum InvocationReport {
    /// The previous cycle finished too recently; nothing was scanned.
    Waited { remaining_days: f64 },
    Scanned(InvocationSummary),
}

pub struct Coordinator {
    state: Arc<AuditState>,
    backend: Arc<dyn EntityBackend>,
    directory: Arc<dyn AccountDirectory>,
    fetcher: Arc<dyn Fetcher>,
    log: Arc<ResultLog>,
    notifier: Option<Notifier>,
    options: AuditOptions,
    /// Wall-clock budget granted to this invocation.
    budget: Duration,
}

impl Coordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state: Arc<AuditState>,
        backend: Arc<dyn EntityBackend>,
        directory: Arc<dyn AccountDirectory>,
        fetcher: Arc<dyn Fetcher>,
        log: Arc<ResultLog>,
        notifier: Option<Notifier>,
        options: AuditOptions,
        budget: Duration,
    ) -> Self {
        Self {
            state,
            backend,
            directory,
            fetcher,
            log,
            notifier,
            options,
            budget,
        }
    }

    pub async fn run_invocation(&self) -> Result<InvocationReport, AuditError> {
        let now = Utc::now();
        let mut status = self.state.load_cycle_status()?.unwrap_or_default();

        let action = cycle::decide(&status, self.options.frequency_days, now);
        if let CycleAction::Wait { remaining_days } = action {
            info!(remaining_days, "cycle recently finished, waiting");
            return Ok(InvocationReport::Waited { remaining_days });
        }

        // The marker must exist before anything may mutate; in preview mode
        // it cannot be created and the invocation aborts before side effects.
        let marker_existed = self.checkpoint().marker_exists()?;
        self.checkpoint().ensure_marker().map_err(unavailable)?;

        match action {
            CycleAction::Wait { .. } => unreachable!(),
            CycleAction::Resume => {
                info!("resuming cycle in progress");
            }
            CycleAction::StartNew => {
                info!("starting first cycle");
                self.log.archive_and_clear()?;
                status = CycleStatus {
                    started_at: Some(now),
                    ..Default::default()
                };
            }
            CycleAction::ResetAndStart => {
                info!("cycle frequency elapsed, starting fresh cycle");
                self.checkpoint().clear_all_marks().map_err(unavailable)?;
                self.log.archive_and_clear()?;
                status = CycleStatus {
                    started_at: Some(now),
                    ..Default::default()
                };
            }
        }

        self.state.save_cycle_status(&status)?;

        // Once the marker exists this is a re-scan population; narrow it to
        // accounts with recent spend.
        let filter = AccountFilter {
            require_recent_cost: marker_existed,
        };
        let batch = self.select_batch(&filter).await?;
        info!(accounts = batch.len(), "dispatching account batch");

        let outcomes = self.dispatch(batch).await?;

        let summary = settle_invocation(
            outcomes,
            &self.options,
            &self.log,
            self.checkpoint(),
            self.directory.as_ref(),
            &filter,
            &mut status,
            Utc::now(),
        )
        .await?;

        if self.should_notify(&status, &summary) {
            if let Some(notifier) = &self.notifier {
                notifier
                    .send(&Notification {
                        error_count: summary.cycle_error_count,
                        accounts_scanned: summary.accounts_scanned,
                        cycle_complete: summary.cycle_complete,
                        results: self.log.results_path().display().to_string(),
                    })
                    .await;
                status.notified_at = Some(Utc::now());
            }
        }
        self.state.save_cycle_status(&status)?;

        Ok(InvocationReport::Scanned(summary))
    }

    fn checkpoint(&self) -> &dyn CheckpointStore {
        self.state.as_ref()
    }

    /// Up to the batch size of filtered accounts not yet marked complete.
    async fn select_batch(&self, filter: &AccountFilter) -> Result<Vec<AccountRef>, AuditError> {
        let mut batch = Vec::new();
        for account in self.directory.accounts(filter).await? {
            if self.checkpoint().is_account_marked(&account.id)? {
                continue;
            }
            batch.push(account);
            if batch.len() == Config::ACCOUNT_BATCH_SIZE {
                break;
            }
        }
        Ok(batch)
    }

    async fn dispatch(
        &self,
        batch: Vec<AccountRef>,
    ) -> Result<Vec<crate::scanner::AccountOutcome>, AuditError> {
        let deadline = Deadline::from_budget(self.budget);
        let policy = ProbePolicy {
            throttle: Duration::from_millis(self.options.throttle_ms),
            ..Default::default()
        };
        let checkpoint: Arc<dyn CheckpointStore> = self.state.clone();

        let mut tasks = JoinSet::new();
        for account in batch {
            let source = EntityUrlSource::new(
                self.backend.clone(),
                checkpoint.clone(),
                account.id.clone(),
                Config::PAGE_SIZE,
            );
            let scanner = AccountScanner::new(
                account,
                source,
                checkpoint.clone(),
                UrlProbe::new(self.fetcher.clone(), policy.clone()),
                self.options.clone(),
                deadline,
            );
            tasks.spawn(async move { scanner.scan().await });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(outcome)) => outcomes.push(outcome),
                Ok(Err(e)) => warn!(error = %e, "account scan failed"),
                Err(e) => error!(error = %e, "account scan task panicked"),
            }
        }
        Ok(outcomes)
    }

    /// Completion notifies once per cycle when errors exist; per-run
    /// notification fires whenever an invocation produced new error rows.
    fn should_notify(&self, status: &CycleStatus, summary: &InvocationSummary) -> bool {
        if self.notifier.is_none() {
            return false;
        }
        if self.options.notify_each_run && summary.new_errors > 0 {
            return true;
        }
        if summary.cycle_complete
            && self.options.notify_on_completion
            && summary.cycle_error_count > 0
        {
            let already_notified = match (status.notified_at, status.started_at) {
                (Some(notified), Some(started)) => notified >= started,
                _ => false,
            };
            return !already_notified;
        }
        false
    }
}

fn unavailable(e: CheckpointError) -> AuditError {
    match e {
        CheckpointError::PreviewMode => AuditError::CheckpointUnavailable(
            "checkpoint marker cannot be created in preview mode".into(),
        ),
        other => AuditError::Checkpoint(other),
    }
}

//! Per-account scan loop: walk unchecked entities category by category,
//! probe each expanded URL once, and checkpoint-mark each entity as its URLs
//! finish.
//!
//! An entity's mark is applied before the deadline is consulted, so work
//! already paid for is never re-done on resume. Whatever stops the scan, the
//! rows gathered so far are returned.

use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backend::{AccountRef, Entity, EntityKind, ParentScope, SitelinkParent, StatusPolicy};
use crate::checkpoint::CheckpointStore;
use crate::config::Config;
use crate::error::AuditError;
use crate::expand::expand_url_modifiers;
use crate::options::AuditOptions;
use crate::probe::{ProbeFailure, UrlProbe};
use crate::results::{UrlCheckResult, UrlCheckStatus};
use crate::source::{entity_urls, EntityUrlSource};

/// Why a scan ended before exhausting the account's backlog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A page query was truncated; unseen entities remain.
    Limit,
    /// The invocation deadline (minus safety buffer) arrived.
    Timeout,
    /// A URL spent its whole rate-limit retry budget.
    QpsExhausted,
    /// The daily request quota is gone for every remaining URL.
    QuotaExhausted,
}

/// Everything one account scan produced, complete or not.
#[derive(Debug)]
pub struct AccountOutcome {
    pub account: AccountRef,
    pub url_checks: Vec<UrlCheckResult>,
    /// True when every enabled category was fully walked and every page was
    /// exhaustive. Only then may the account itself be marked.
    pub did_complete: bool,
    pub stop: Option<StopReason>,
}

/// Wall-clock budget for one invocation, minus the safety buffer that leaves
/// room to persist results before the host cuts execution off.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn from_budget(budget: Duration) -> Self {
        let effective = budget.saturating_sub(Duration::from_secs(Config::TIMEOUT_BUFFER_SECS));
        Self {
            at: Instant::now() + effective,
        }
    }

    pub fn exceeded(&self) -> bool {
        Instant::now() >= self.at
    }
}

enum Pass {
    Finished { exhaustive: bool },
    Stopped(StopReason),
}

pub struct AccountScanner {
    account: AccountRef,
    source: EntityUrlSource,
    checkpoint: Arc<dyn CheckpointStore>,
    probe: UrlProbe,
    options: AuditOptions,
    deadline: Deadline,
}

impl AccountScanner {
    pub fn new(
        account: AccountRef,
        source: EntityUrlSource,
        checkpoint: Arc<dyn CheckpointStore>,
        probe: UrlProbe,
        options: AuditOptions,
        deadline: Deadline,
    ) -> Self {
        Self {
            account,
            source,
            checkpoint,
            probe,
            options,
            deadline,
        }
    }

    /// Walk every enabled category for this account. A truncated page flips
    /// completeness but the walk continues; timeout, retry exhaustion, and
    /// quota exhaustion end the scan where it stands.
    pub async fn scan(self) -> Result<AccountOutcome, AuditError> {
        let mut seen = self.source.already_checked_urls(&self.options).await?;
        debug!(
            account = %self.account.id,
            already_checked = seen.len(),
            "starting account scan"
        );

        let mut checks = Vec::new();
        let mut complete = true;

        let entity_passes = [
            (
                EntityKind::Ad,
                self.options.check_ad_urls,
                self.options.check_paused_ads,
            ),
            (
                EntityKind::Keyword,
                self.options.check_keyword_urls,
                self.options.check_paused_keywords,
            ),
        ];
        for (kind, enabled, include_paused) in entity_passes {
            if !enabled {
                continue;
            }
            let policy = StatusPolicy { include_paused };
            match self
                .entity_pass(kind, policy, &mut seen, &mut checks)
                .await?
            {
                Pass::Finished { exhaustive } => complete &= exhaustive,
                Pass::Stopped(reason) => return Ok(self.stopped(checks, reason)),
            }
        }

        if self.options.check_sitelink_urls {
            let policy = StatusPolicy {
                include_paused: self.options.check_paused_sitelinks,
            };
            for scope in [ParentScope::Campaign, ParentScope::AdGroup] {
                match self
                    .sitelink_pass(scope, policy, &mut seen, &mut checks)
                    .await?
                {
                    Pass::Finished { exhaustive } => complete &= exhaustive,
                    Pass::Stopped(reason) => return Ok(self.stopped(checks, reason)),
                }
            }
        }

        let stop = (!complete).then_some(StopReason::Limit);
        info!(
            account = %self.account.id,
            checked = checks.len(),
            complete,
            "account scan finished"
        );
        Ok(AccountOutcome {
            account: self.account,
            url_checks: checks,
            did_complete: complete,
            stop,
        })
    }

    fn stopped(self, checks: Vec<UrlCheckResult>, reason: StopReason) -> AccountOutcome {
        warn!(
            account = %self.account.id,
            checked = checks.len(),
            ?reason,
            "account scan stopped early"
        );
        AccountOutcome {
            account: self.account,
            url_checks: checks,
            did_complete: false,
            stop: Some(reason),
        }
    }

    async fn entity_pass(
        &self,
        kind: EntityKind,
        policy: StatusPolicy,
        seen: &mut HashSet<String>,
        checks: &mut Vec<UrlCheckResult>,
    ) -> Result<Pass, AuditError> {
        let snapshot = self.source.unchecked_entities(kind, policy).await?;
        for entity in snapshot.items {
            if let Some(reason) = self.probe_entity(&entity, seen, checks).await? {
                return Ok(Pass::Stopped(reason));
            }
            self.checkpoint.mark_entity(&self.account.id, &entity.id)?;
            if self.deadline.exceeded() {
                return Ok(Pass::Stopped(StopReason::Timeout));
            }
        }
        Ok(Pass::Finished {
            exhaustive: snapshot.exhaustive,
        })
    }

    async fn sitelink_pass(
        &self,
        scope: ParentScope,
        policy: StatusPolicy,
        seen: &mut HashSet<String>,
        checks: &mut Vec<UrlCheckResult>,
    ) -> Result<Pass, AuditError> {
        let snapshot = self.source.unchecked_sitelink_parents(scope, policy).await?;
        for parent in snapshot.items {
            if let Some(reason) = self.probe_sitelinks(&parent, seen, checks).await? {
                return Ok(Pass::Stopped(reason));
            }
            self.checkpoint.mark_entity(&self.account.id, &parent.id)?;
            if self.deadline.exceeded() {
                return Ok(Pass::Stopped(StopReason::Timeout));
            }
        }
        Ok(Pass::Finished {
            exhaustive: snapshot.exhaustive,
        })
    }

    async fn probe_entity(
        &self,
        entity: &Entity,
        seen: &mut HashSet<String>,
        checks: &mut Vec<UrlCheckResult>,
    ) -> Result<Option<StopReason>, AuditError> {
        for raw in entity_urls(&entity.final_url, &entity.mobile_final_url) {
            for url in expand_url_modifiers(&raw) {
                if !seen.insert(url.clone()) {
                    continue;
                }
                match self.probe.check(&url).await {
                    Ok(status) => checks.push(self.row_for_entity(entity, url, status)),
                    Err(failure) => return Ok(Some(stop_reason(failure))),
                }
            }
        }
        Ok(None)
    }

    async fn probe_sitelinks(
        &self,
        parent: &SitelinkParent,
        seen: &mut HashSet<String>,
        checks: &mut Vec<UrlCheckResult>,
    ) -> Result<Option<StopReason>, AuditError> {
        for sitelink in &parent.sitelinks {
            for raw in entity_urls(&sitelink.final_url, &sitelink.mobile_final_url) {
                for url in expand_url_modifiers(&raw) {
                    if !seen.insert(url.clone()) {
                        continue;
                    }
                    match self.probe.check(&url).await {
                        Ok(status) => checks.push(UrlCheckResult {
                            account_id: self.account.id.clone(),
                            timestamp: Utc::now(),
                            url,
                            status,
                            entity_type: EntityKind::Sitelink.as_str().to_string(),
                            campaign: parent.campaign.clone(),
                            ad_group: parent.ad_group.clone(),
                            ad: String::new(),
                            keyword: String::new(),
                            sitelink: sitelink.link_text.clone(),
                        }),
                        Err(failure) => return Ok(Some(stop_reason(failure))),
                    }
                }
            }
        }
        Ok(None)
    }

    fn row_for_entity(&self, entity: &Entity, url: String, status: UrlCheckStatus) -> UrlCheckResult {
        let (ad, keyword) = match entity.kind {
            EntityKind::Ad => (entity.text.clone(), String::new()),
            _ => (String::new(), entity.text.clone()),
        };
        UrlCheckResult {
            account_id: self.account.id.clone(),
            timestamp: Utc::now(),
            url,
            status,
            entity_type: entity.kind.as_str().to_string(),
            campaign: entity.campaign.clone(),
            ad_group: entity.ad_group.clone(),
            ad,
            keyword,
            sitelink: String::new(),
        }
    }
}

fn stop_reason(failure: ProbeFailure) -> StopReason {
    match failure {
        ProbeFailure::QpsExhausted => StopReason::QpsExhausted,
        ProbeFailure::QuotaExhausted => StopReason::QuotaExhausted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{EntityStatus, Sitelink};
    use crate::checkpoint::MemoryCheckpointStore;
    use crate::inventory::{
        Inventory, InventoryAccount, InventoryAd, InventoryBackend, InventoryKeyword,
        InventorySitelinkParent,
    };
    use crate::probe::{FetchError, Fetcher, ProbePolicy};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// URL-keyed fetcher: looks up the scripted outcome, default 200.
    struct MapFetcher {
        outcomes: HashMap<String, Result<u16, FetchError>>,
        fetches: AtomicU32,
    }

    impl MapFetcher {
        fn new(outcomes: &[(&str, Result<u16, FetchError>)]) -> Self {
            Self {
                outcomes: outcomes
                    .iter()
                    .map(|(url, out)| (url.to_string(), out.clone()))
                    .collect(),
                fetches: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Fetcher for MapFetcher {
        async fn fetch(&self, url: &str) -> Result<u16, FetchError> {
            self.fetches.fetch_add(1, Ordering::Relaxed);
            self.outcomes.get(url).cloned().unwrap_or(Ok(200))
        }
    }

    fn account_ref() -> AccountRef {
        AccountRef {
            id: "111".into(),
            name: "Acme".into(),
        }
    }

    fn ad(id: &str, url: &str) -> InventoryAd {
        InventoryAd {
            id: id.into(),
            status: EntityStatus::Enabled,
            final_url: Some(url.into()),
            mobile_final_url: None,
            campaign: "Brand".into(),
            ad_group: "Core".into(),
            headline: format!("Headline {id}"),
        }
    }

    fn backend(account: InventoryAccount) -> Arc<InventoryBackend> {
        Arc::new(InventoryBackend::from_inventory(Inventory {
            accounts: vec![account],
        }))
    }

    fn scanner_with(
        backend: Arc<InventoryBackend>,
        checkpoint: Arc<MemoryCheckpointStore>,
        fetcher: Arc<MapFetcher>,
        page_size: usize,
    ) -> AccountScanner {
        let source = EntityUrlSource::new(backend, checkpoint.clone(), "111".into(), page_size);
        AccountScanner::new(
            account_ref(),
            source,
            checkpoint,
            UrlProbe::new(
                fetcher,
                ProbePolicy {
                    throttle: Duration::ZERO,
                    ..Default::default()
                },
            ),
            AuditOptions::default(),
            Deadline::from_budget(Duration::from_secs(3600)),
        )
    }

    #[tokio::test]
    async fn test_full_scan_marks_entities_and_account_completes() {
        let checkpoint = Arc::new(MemoryCheckpointStore::new());
        let fetcher = Arc::new(MapFetcher::new(&[("https://b.test/", Ok(404))]));
        let scanner = scanner_with(
            backend(InventoryAccount {
                id: "111".into(),
                name: "Acme".into(),
                recent_cost: 1.0,
                ads: vec![ad("ad-1", "https://a.test/"), ad("ad-2", "https://b.test/")],
                keywords: vec![InventoryKeyword {
                    id: "kw-1".into(),
                    status: EntityStatus::Enabled,
                    final_url: Some("https://c.test/".into()),
                    mobile_final_url: None,
                    campaign: "Brand".into(),
                    ad_group: "Core".into(),
                    text: "widgets".into(),
                }],
                campaign_sitelinks: vec![],
                ad_group_sitelinks: vec![],
            }),
            checkpoint.clone(),
            fetcher,
            100,
        );

        let outcome = scanner.scan().await.unwrap();
        assert!(outcome.did_complete);
        assert_eq!(outcome.stop, None);
        assert_eq!(outcome.url_checks.len(), 3);

        let broken: Vec<_> = outcome
            .url_checks
            .iter()
            .filter(|r| r.status.is_error(&[200]))
            .collect();
        assert_eq!(broken.len(), 1);
        assert_eq!(broken[0].url, "https://b.test/");
        assert_eq!(broken[0].entity_type, "Ad");
        assert_eq!(broken[0].ad, "Headline ad-2");

        for id in ["ad-1", "ad-2", "kw-1"] {
            assert!(checkpoint.is_entity_marked("111", id).unwrap());
        }
    }

    #[tokio::test]
    async fn test_shared_url_probed_once() {
        let checkpoint = Arc::new(MemoryCheckpointStore::new());
        let fetcher = Arc::new(MapFetcher::new(&[]));
        let scanner = scanner_with(
            backend(InventoryAccount {
                id: "111".into(),
                name: "Acme".into(),
                recent_cost: 1.0,
                ads: vec![ad("ad-1", "https://a.test/"), ad("ad-2", "https://a.test/")],
                keywords: vec![],
                campaign_sitelinks: vec![],
                ad_group_sitelinks: vec![],
            }),
            checkpoint.clone(),
            fetcher.clone(),
            100,
        );

        let outcome = scanner.scan().await.unwrap();
        assert_eq!(fetcher.fetches.load(Ordering::Relaxed), 1);
        assert_eq!(outcome.url_checks.len(), 1);
        // Both owners still get marked.
        assert!(checkpoint.is_entity_marked("111", "ad-1").unwrap());
        assert!(checkpoint.is_entity_marked("111", "ad-2").unwrap());
    }

    #[tokio::test]
    async fn test_quota_stop_keeps_partial_results_and_marks() {
        let checkpoint = Arc::new(MemoryCheckpointStore::new());
        let fetcher = Arc::new(MapFetcher::new(&[(
            "https://b.test/",
            Err(FetchError::QuotaExhausted),
        )]));
        let scanner = scanner_with(
            backend(InventoryAccount {
                id: "111".into(),
                name: "Acme".into(),
                recent_cost: 1.0,
                ads: vec![
                    ad("ad-1", "https://a.test/"),
                    ad("ad-2", "https://b.test/"),
                    ad("ad-3", "https://c.test/"),
                ],
                keywords: vec![],
                campaign_sitelinks: vec![],
                ad_group_sitelinks: vec![],
            }),
            checkpoint.clone(),
            fetcher,
            100,
        );

        let outcome = scanner.scan().await.unwrap();
        assert!(!outcome.did_complete);
        assert_eq!(outcome.stop, Some(StopReason::QuotaExhausted));
        assert_eq!(outcome.url_checks.len(), 1);
        assert!(checkpoint.is_entity_marked("111", "ad-1").unwrap());
        // The entity whose URL hit the quota stays unmarked for resume.
        assert!(!checkpoint.is_entity_marked("111", "ad-2").unwrap());
        assert!(!checkpoint.is_entity_marked("111", "ad-3").unwrap());
    }

    #[tokio::test]
    async fn test_truncated_page_flips_completeness_but_continues() {
        let checkpoint = Arc::new(MemoryCheckpointStore::new());
        let fetcher = Arc::new(MapFetcher::new(&[]));
        let scanner = scanner_with(
            backend(InventoryAccount {
                id: "111".into(),
                name: "Acme".into(),
                recent_cost: 1.0,
                ads: vec![ad("ad-1", "https://a.test/"), ad("ad-2", "https://b.test/")],
                keywords: vec![],
                campaign_sitelinks: vec![InventorySitelinkParent {
                    id: "camp-1".into(),
                    status: EntityStatus::Enabled,
                    campaign: "Brand".into(),
                    ad_group: String::new(),
                    sitelinks: vec![Sitelink {
                        link_text: "Contact".into(),
                        final_url: Some("https://a.test/contact".into()),
                        mobile_final_url: None,
                    }],
                }],
                ad_group_sitelinks: vec![],
            }),
            checkpoint.clone(),
            fetcher,
            1,
        );

        let outcome = scanner.scan().await.unwrap();
        assert!(!outcome.did_complete);
        assert_eq!(outcome.stop, Some(StopReason::Limit));
        // The truncated ads page yields one check, then the sitelink pass
        // still runs.
        assert_eq!(outcome.url_checks.len(), 2);
        assert_eq!(outcome.url_checks[1].entity_type, "Sitelink");
        assert_eq!(outcome.url_checks[1].sitelink, "Contact");
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_deadline_stops_after_first_mark() {
        let checkpoint = Arc::new(MemoryCheckpointStore::new());
        let fetcher = Arc::new(MapFetcher::new(&[]));
        // Budget below the safety buffer expires immediately.
        let source = EntityUrlSource::new(
            backend(InventoryAccount {
                id: "111".into(),
                name: "Acme".into(),
                recent_cost: 1.0,
                ads: vec![ad("ad-1", "https://a.test/"), ad("ad-2", "https://b.test/")],
                keywords: vec![],
                campaign_sitelinks: vec![],
                ad_group_sitelinks: vec![],
            }),
            checkpoint.clone(),
            "111".into(),
            100,
        );
        let scanner = AccountScanner::new(
            account_ref(),
            source,
            checkpoint.clone(),
            UrlProbe::new(
                fetcher,
                ProbePolicy {
                    throttle: Duration::ZERO,
                    ..Default::default()
                },
            ),
            AuditOptions::default(),
            Deadline::from_budget(Duration::from_secs(1)),
        );

        let outcome = scanner.scan().await.unwrap();
        assert!(!outcome.did_complete);
        assert_eq!(outcome.stop, Some(StopReason::Timeout));
        // The first entity was probed and marked before the deadline check.
        assert_eq!(outcome.url_checks.len(), 1);
        assert!(checkpoint.is_entity_marked("111", "ad-1").unwrap());
        assert!(!checkpoint.is_entity_marked("111", "ad-2").unwrap());
    }

    #[tokio::test]
    async fn test_disabled_categories_are_skipped() {
        let checkpoint = Arc::new(MemoryCheckpointStore::new());
        let fetcher = Arc::new(MapFetcher::new(&[]));
        let source = EntityUrlSource::new(
            backend(InventoryAccount {
                id: "111".into(),
                name: "Acme".into(),
                recent_cost: 1.0,
                ads: vec![ad("ad-1", "https://a.test/")],
                keywords: vec![InventoryKeyword {
                    id: "kw-1".into(),
                    status: EntityStatus::Enabled,
                    final_url: Some("https://b.test/".into()),
                    mobile_final_url: None,
                    campaign: "Brand".into(),
                    ad_group: "Core".into(),
                    text: "widgets".into(),
                }],
                campaign_sitelinks: vec![],
                ad_group_sitelinks: vec![],
            }),
            checkpoint.clone(),
            "111".into(),
            100,
        );
        let scanner = AccountScanner::new(
            account_ref(),
            source,
            checkpoint,
            UrlProbe::new(
                fetcher,
                ProbePolicy {
                    throttle: Duration::ZERO,
                    ..Default::default()
                },
            ),
            AuditOptions {
                check_keyword_urls: false,
                check_sitelink_urls: false,
                ..Default::default()
            },
            Deadline::from_budget(Duration::from_secs(3600)),
        );

        let outcome = scanner.scan().await.unwrap();
        assert!(outcome.did_complete);
        assert_eq!(outcome.url_checks.len(), 1);
        assert_eq!(outcome.url_checks[0].entity_type, "Ad");
    }
}

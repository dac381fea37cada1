//! JSON-file link inventory implementing the backend contracts.
//!
//! The inventory file declares the full account hierarchy: accounts with
//! their ads, keywords, and campaign/ad-group site-link extensions. Queries
//! behave like the remote collection they stand in for: filtered, truncated
//! to a page limit, and reporting the total match count.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::backend::{
    AccountDirectory, AccountFilter, AccountRef, BackendError, Entity, EntityBackend, EntityKind,
    EntityPage, EntityStatus, ParentScope, Sitelink, SitelinkParent, StatusPolicy,
};
use crate::error::AuditError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryAd {
    pub id: String,
    pub status: EntityStatus,
    #[serde(default)]
    pub final_url: Option<String>,
    #[serde(default)]
    pub mobile_final_url: Option<String>,
    pub campaign: String,
    pub ad_group: String,
    pub headline: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryKeyword {
    pub id: String,
    pub status: EntityStatus,
    #[serde(default)]
    pub final_url: Option<String>,
    #[serde(default)]
    pub mobile_final_url: Option<String>,
    pub campaign: String,
    pub ad_group: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventorySitelinkParent {
    pub id: String,
    pub status: EntityStatus,
    pub campaign: String,
    #[serde(default)]
    pub ad_group: String,
    pub sitelinks: Vec<Sitelink>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryAccount {
    pub id: String,
    pub name: String,
    /// Spend over the recent cost window, used by the account filter.
    #[serde(default)]
    pub recent_cost: f64,
    #[serde(default)]
    pub ads: Vec<InventoryAd>,
    #[serde(default)]
    pub keywords: Vec<InventoryKeyword>,
    #[serde(default)]
    pub campaign_sitelinks: Vec<InventorySitelinkParent>,
    #[serde(default)]
    pub ad_group_sitelinks: Vec<InventorySitelinkParent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inventory {
    pub accounts: Vec<InventoryAccount>,
}

/// In-memory view over one loaded inventory file.
pub struct InventoryBackend {
    accounts: Vec<AccountRef>,
    recent_cost: HashMap<String, f64>,
    by_account: HashMap<String, InventoryAccount>,
}

impl InventoryBackend {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, AuditError> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            AuditError::ConfigInvalid(format!(
                "cannot read inventory file {}: {e}",
                path.as_ref().display()
            ))
        })?;
        let inventory: Inventory = serde_json::from_str(&raw)
            .map_err(|e| AuditError::ConfigInvalid(format!("malformed inventory file: {e}")))?;
        Ok(Self::from_inventory(inventory))
    }

    pub fn from_inventory(inventory: Inventory) -> Self {
        let accounts = inventory
            .accounts
            .iter()
            .map(|a| AccountRef {
                id: a.id.clone(),
                name: a.name.clone(),
            })
            .collect();
        let recent_cost = inventory
            .accounts
            .iter()
            .map(|a| (a.id.clone(), a.recent_cost))
            .collect();
        let by_account = inventory
            .accounts
            .into_iter()
            .map(|a| (a.id.clone(), a))
            .collect();
        Self {
            accounts,
            recent_cost,
            by_account,
        }
    }

    fn account(&self, account_id: &str) -> Result<&InventoryAccount, BackendError> {
        self.by_account
            .get(account_id)
            .ok_or_else(|| BackendError::UnknownAccount(account_id.to_string()))
    }
}

fn has_url(final_url: &Option<String>, mobile_final_url: &Option<String>) -> bool {
    final_url.as_deref().is_some_and(|u| !u.is_empty())
        || mobile_final_url.as_deref().is_some_and(|u| !u.is_empty())
}

fn paged<T>(matching: Vec<T>, limit: usize) -> EntityPage<T> {
    let total_matching = matching.len();
    let items = matching.into_iter().take(limit).collect();
    EntityPage {
        items,
        total_matching,
    }
}

#[async_trait]
impl EntityBackend for InventoryBackend {
    async fn entity_page(
        &self,
        account_id: &str,
        kind: EntityKind,
        policy: StatusPolicy,
        limit: usize,
    ) -> Result<EntityPage<Entity>, BackendError> {
        let account = self.account(account_id)?;

        let matching: Vec<Entity> = match kind {
            EntityKind::Ad => account
                .ads
                .iter()
                .filter(|ad| policy.admits(ad.status) && has_url(&ad.final_url, &ad.mobile_final_url))
                .map(|ad| Entity {
                    id: ad.id.clone(),
                    kind: EntityKind::Ad,
                    status: ad.status,
                    final_url: ad.final_url.clone(),
                    mobile_final_url: ad.mobile_final_url.clone(),
                    campaign: ad.campaign.clone(),
                    ad_group: ad.ad_group.clone(),
                    text: ad.headline.clone(),
                })
                .collect(),
            EntityKind::Keyword => account
                .keywords
                .iter()
                .filter(|kw| policy.admits(kw.status) && has_url(&kw.final_url, &kw.mobile_final_url))
                .map(|kw| Entity {
                    id: kw.id.clone(),
                    kind: EntityKind::Keyword,
                    status: kw.status,
                    final_url: kw.final_url.clone(),
                    mobile_final_url: kw.mobile_final_url.clone(),
                    campaign: kw.campaign.clone(),
                    ad_group: kw.ad_group.clone(),
                    text: kw.text.clone(),
                })
                .collect(),
            EntityKind::Sitelink => {
                return Err(BackendError::Message(
                    "site-links are queried through sitelink_parent_page".into(),
                ))
            }
        };

        Ok(paged(matching, limit))
    }

    async fn sitelink_parent_page(
        &self,
        account_id: &str,
        scope: ParentScope,
        policy: StatusPolicy,
        limit: usize,
    ) -> Result<EntityPage<SitelinkParent>, BackendError> {
        let account = self.account(account_id)?;
        let parents = match scope {
            ParentScope::Campaign => &account.campaign_sitelinks,
            ParentScope::AdGroup => &account.ad_group_sitelinks,
        };

        let matching: Vec<SitelinkParent> = parents
            .iter()
            .filter(|p| policy.admits(p.status) && !p.sitelinks.is_empty())
            .map(|p| SitelinkParent {
                id: p.id.clone(),
                scope,
                status: p.status,
                campaign: p.campaign.clone(),
                ad_group: p.ad_group.clone(),
                sitelinks: p.sitelinks.clone(),
            })
            .collect();

        Ok(paged(matching, limit))
    }
}

#[async_trait]
impl AccountDirectory for InventoryBackend {
    async fn accounts(&self, filter: &AccountFilter) -> Result<Vec<AccountRef>, BackendError> {
        Ok(self
            .accounts
            .iter()
            .filter(|a| {
                !filter.require_recent_cost
                    || self.recent_cost.get(&a.id).copied().unwrap_or(0.0) > 0.0
            })
            .cloned()
            .collect())
    }
}

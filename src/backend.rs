//! Contracts for the paginated entity backend and the account directory.
//!
//! The remote collection is adapted behind narrow traits taking pure filter
//! value objects; no ambient query state. Every page query reports the total
//! number of matching entities alongside the (possibly truncated) page so
//! callers can detect partial pagination.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("backend error: {0}")]
    Message(String),

    #[error("unknown account: {0}")]
    UnknownAccount(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Ad,
    Keyword,
    Sitelink,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Ad => "Ad",
            EntityKind::Keyword => "Keyword",
            EntityKind::Sitelink => "Sitelink",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityStatus {
    Enabled,
    Paused,
    Removed,
}

/// Inclusion policy for one entity category: enabled-only, or enabled+paused.
#[derive(Debug, Clone, Copy)]
pub struct StatusPolicy {
    pub include_paused: bool,
}

impl StatusPolicy {
    pub fn admits(&self, status: EntityStatus) -> bool {
        match status {
            EntityStatus::Enabled => true,
            EntityStatus::Paused => self.include_paused,
            EntityStatus::Removed => false,
        }
    }
}

/// Parent scope for site-link extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParentScope {
    Campaign,
    AdGroup,
}

/// A flat URL-bearing entity (ad or keyword).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Unique within its account, across kinds.
    pub id: String,
    pub kind: EntityKind,
    pub status: EntityStatus,
    pub final_url: Option<String>,
    pub mobile_final_url: Option<String>,
    pub campaign: String,
    pub ad_group: String,
    /// Display text: ad headline or keyword text.
    pub text: String,
}

/// One nested site-link under a campaign or ad group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sitelink {
    pub link_text: String,
    pub final_url: Option<String>,
    pub mobile_final_url: Option<String>,
}

/// A campaign or ad group carrying site-link extensions. Checkpoint marks
/// attach to the parent; the nested site-links themselves are unmarkable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SitelinkParent {
    pub id: String,
    pub scope: ParentScope,
    pub status: EntityStatus,
    pub campaign: String,
    pub ad_group: String,
    pub sitelinks: Vec<Sitelink>,
}

/// One page of a filtered query plus the total match count, used to detect
/// pagination cut short of the full result set.
#[derive(Debug, Clone)]
pub struct EntityPage<T> {
    pub items: Vec<T>,
    pub total_matching: usize,
}

impl<T> EntityPage<T> {
    /// True when the page holds every matching entity.
    pub fn is_exhaustive(&self) -> bool {
        self.items.len() == self.total_matching
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRef {
    pub id: String,
    pub name: String,
}

/// Restriction on the candidate account population.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccountFilter {
    /// Only accounts with nonzero cost inside the recent window. Applied once
    /// the cycle marker exists, mirroring the narrower re-scan population.
    pub require_recent_cost: bool,
}

#[async_trait]
pub trait EntityBackend: Send + Sync {
    /// Ads or keywords with a non-empty final URL field, filtered by status
    /// policy, truncated to `limit` items.
    async fn entity_page(
        &self,
        account_id: &str,
        kind: EntityKind,
        policy: StatusPolicy,
        limit: usize,
    ) -> Result<EntityPage<Entity>, BackendError>;

    /// Campaign- or ad-group-level site-link parents filtered by status
    /// policy, truncated to `limit` items. Parents without site-links are
    /// not returned.
    async fn sitelink_parent_page(
        &self,
        account_id: &str,
        scope: ParentScope,
        policy: StatusPolicy,
        limit: usize,
    ) -> Result<EntityPage<SitelinkParent>, BackendError>;
}

#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// All child accounts matching the filter, in stable order.
    async fn accounts(&self, filter: &AccountFilter) -> Result<Vec<AccountRef>, BackendError>;
}

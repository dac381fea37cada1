//! Adapts the paginated backend into per-account sequences of URL-bearing
//! work, excluding entities already checkpoint-marked in this cycle.
//!
//! Snapshots are materialized before any checkpoint state is mutated, so the
//! exhaustiveness of a page stays consistent while the scanner marks entities
//! out from under the query.

use std::collections::HashSet;
use std::sync::Arc;

use crate::backend::{
    Entity, EntityBackend, EntityKind, EntityPage, ParentScope, Sitelink, SitelinkParent,
    StatusPolicy,
};
use crate::checkpoint::CheckpointStore;
use crate::error::AuditError;
use crate::expand::expand_url_modifiers;
use crate::options::AuditOptions;

/// Materialized page of not-yet-marked entities plus whether pagination
/// retrieved every matching entity (pre-mark-filter).
#[derive(Debug)]
pub struct Snapshot<T> {
    pub items: Vec<T>,
    pub exhaustive: bool,
}

pub struct EntityUrlSource {
    backend: Arc<dyn EntityBackend>,
    checkpoint: Arc<dyn CheckpointStore>,
    account_id: String,
    page_size: usize,
}

/// Raw URL fields of one entity, in check order.
pub fn entity_urls(final_url: &Option<String>, mobile_final_url: &Option<String>) -> Vec<String> {
    let mut urls = Vec::new();
    if let Some(url) = final_url.as_deref().filter(|u| !u.is_empty()) {
        urls.push(url.to_string());
    }
    if let Some(url) = mobile_final_url.as_deref().filter(|u| !u.is_empty()) {
        urls.push(url.to_string());
    }
    urls
}

impl EntityUrlSource {
    pub fn new(
        backend: Arc<dyn EntityBackend>,
        checkpoint: Arc<dyn CheckpointStore>,
        account_id: String,
        page_size: usize,
    ) -> Self {
        Self {
            backend,
            checkpoint,
            account_id,
            page_size,
        }
    }

    fn unmarked<T>(
        &self,
        page: EntityPage<T>,
        id_of: impl Fn(&T) -> &str,
    ) -> Result<Snapshot<T>, AuditError> {
        let exhaustive = page.is_exhaustive();
        let mut items = Vec::new();
        for item in page.items {
            if !self
                .checkpoint
                .is_entity_marked(&self.account_id, id_of(&item))?
            {
                items.push(item);
            }
        }
        Ok(Snapshot { items, exhaustive })
    }

    /// Unmarked ads or keywords under the inclusion policy.
    pub async fn unchecked_entities(
        &self,
        kind: EntityKind,
        policy: StatusPolicy,
    ) -> Result<Snapshot<Entity>, AuditError> {
        let page = self
            .backend
            .entity_page(&self.account_id, kind, policy, self.page_size)
            .await?;
        self.unmarked(page, |e: &Entity| e.id.as_str())
    }

    /// Unmarked campaign- or ad-group-level site-link parents.
    pub async fn unchecked_sitelink_parents(
        &self,
        scope: ParentScope,
        policy: StatusPolicy,
    ) -> Result<Snapshot<SitelinkParent>, AuditError> {
        let page = self
            .backend
            .sitelink_parent_page(&self.account_id, scope, policy, self.page_size)
            .await?;
        self.unmarked(page, |p: &SitelinkParent| p.id.as_str())
    }

    /// Every expanded URL belonging to an entity already marked in this
    /// cycle. Seeds the exclusion set so URLs shared between marked and
    /// unmarked entities are not re-probed. Status is ignored here; a mark is
    /// a mark.
    pub async fn already_checked_urls(
        &self,
        options: &AuditOptions,
    ) -> Result<HashSet<String>, AuditError> {
        let everything = StatusPolicy {
            include_paused: true,
        };
        let mut seen = HashSet::new();

        let mut absorb = |final_url: &Option<String>, mobile: &Option<String>| {
            for url in entity_urls(final_url, mobile) {
                seen.extend(expand_url_modifiers(&url));
            }
        };

        for kind in [EntityKind::Ad, EntityKind::Keyword] {
            let enabled = match kind {
                EntityKind::Ad => options.check_ad_urls,
                _ => options.check_keyword_urls,
            };
            if !enabled {
                continue;
            }
            let page = self
                .backend
                .entity_page(&self.account_id, kind, everything, self.page_size)
                .await?;
            for entity in &page.items {
                if self
                    .checkpoint
                    .is_entity_marked(&self.account_id, &entity.id)?
                {
                    absorb(&entity.final_url, &entity.mobile_final_url);
                }
            }
        }

        if options.check_sitelink_urls {
            for scope in [ParentScope::Campaign, ParentScope::AdGroup] {
                let page = self
                    .backend
                    .sitelink_parent_page(&self.account_id, scope, everything, self.page_size)
                    .await?;
                for parent in &page.items {
                    if self
                        .checkpoint
                        .is_entity_marked(&self.account_id, &parent.id)?
                    {
                        for Sitelink {
                            final_url,
                            mobile_final_url,
                            ..
                        } in &parent.sitelinks
                        {
                            absorb(final_url, mobile_final_url);
                        }
                    }
                }
            }
        }

        Ok(seen)
    }
}

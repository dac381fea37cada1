//! Durable checkpoint marks: the sole cross-invocation synchronization
//! mechanism.
//!
//! A mark on an entity means "all URLs for this entity were evaluated in the
//! current cycle"; a mark on an account means "this account's backlog was
//! exhausted". Mark application is at-least-once idempotent: applying the
//! same mark twice is a no-op, and a crash between probing and marking simply
//! re-checks the entity on resume.

use dashmap::DashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CheckpointError {
    /// Marker creation or removal attempted in read-only preview mode.
    #[error("checkpoint marker cannot be modified in preview mode")]
    PreviewMode,

    #[error("checkpoint storage error: {0}")]
    Storage(String),
}

pub trait CheckpointStore: Send + Sync {
    /// Idempotently create the marker space. Fails loudly when it does not
    /// exist and cannot be created (read-only preview execution).
    fn ensure_marker(&self) -> Result<(), CheckpointError>;

    fn marker_exists(&self) -> Result<bool, CheckpointError>;

    fn mark_entity(&self, account_id: &str, entity_id: &str) -> Result<(), CheckpointError>;

    fn is_entity_marked(&self, account_id: &str, entity_id: &str)
        -> Result<bool, CheckpointError>;

    /// Remove every entity mark inside one account, clearing it for a new
    /// analysis cycle.
    fn clear_entity_marks(&self, account_id: &str) -> Result<(), CheckpointError>;

    fn mark_account(&self, account_id: &str) -> Result<(), CheckpointError>;

    fn is_account_marked(&self, account_id: &str) -> Result<bool, CheckpointError>;

    fn clear_account_marks(&self) -> Result<(), CheckpointError>;

    /// Wipe every entity and account mark across the hierarchy, readying a
    /// fresh analysis cycle.
    fn clear_all_marks(&self) -> Result<(), CheckpointError>;
}

fn entity_key(account_id: &str, entity_id: &str) -> String {
    format!("{account_id}/{entity_id}")
}

/// Volatile checkpoint store for tests and dry runs. Same contract as the
/// durable store, including preview-mode refusal.
pub struct MemoryCheckpointStore {
    entity_marks: DashSet<String>,
    account_marks: DashSet<String>,
    marker_registered: AtomicBool,
    preview: bool,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::with_preview(false)
    }

    pub fn with_preview(preview: bool) -> Self {
        Self {
            entity_marks: DashSet::new(),
            account_marks: DashSet::new(),
            marker_registered: AtomicBool::new(false),
            preview,
        }
    }
}

impl Default for MemoryCheckpointStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn ensure_marker(&self) -> Result<(), CheckpointError> {
        if self.marker_registered.load(Ordering::SeqCst) {
            return Ok(());
        }
        if self.preview {
            return Err(CheckpointError::PreviewMode);
        }
        self.marker_registered.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn marker_exists(&self) -> Result<bool, CheckpointError> {
        Ok(self.marker_registered.load(Ordering::SeqCst))
    }

    fn mark_entity(&self, account_id: &str, entity_id: &str) -> Result<(), CheckpointError> {
        // Previews never persist marks; applying is a silent no-op.
        if !self.preview {
            self.entity_marks.insert(entity_key(account_id, entity_id));
        }
        Ok(())
    }

    fn is_entity_marked(
        &self,
        account_id: &str,
        entity_id: &str,
    ) -> Result<bool, CheckpointError> {
        Ok(self.entity_marks.contains(&entity_key(account_id, entity_id)))
    }

    fn clear_entity_marks(&self, account_id: &str) -> Result<(), CheckpointError> {
        if self.preview {
            return Err(CheckpointError::PreviewMode);
        }
        let prefix = format!("{account_id}/");
        self.entity_marks.retain(|key| !key.starts_with(&prefix));
        Ok(())
    }

    fn mark_account(&self, account_id: &str) -> Result<(), CheckpointError> {
        if !self.preview {
            self.account_marks.insert(account_id.to_string());
        }
        Ok(())
    }

    fn is_account_marked(&self, account_id: &str) -> Result<bool, CheckpointError> {
        Ok(self.account_marks.contains(account_id))
    }

    fn clear_account_marks(&self) -> Result<(), CheckpointError> {
        if self.preview {
            return Err(CheckpointError::PreviewMode);
        }
        self.account_marks.clear();
        Ok(())
    }

    fn clear_all_marks(&self) -> Result<(), CheckpointError> {
        if self.preview {
            return Err(CheckpointError::PreviewMode);
        }
        self.entity_marks.clear();
        self.account_marks.clear();
        Ok(())
    }
}

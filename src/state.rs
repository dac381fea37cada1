//! Durable on-disk state: checkpoint marks and cycle metadata in one redb
//! store.
//!
//! This store is the only thing that survives between invocations, so every
//! write it makes must be safe to apply more than once. Opening the store in
//! preview mode keeps reads available while refusing any mutation that would
//! outlive the preview.

use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::checkpoint::{CheckpointError, CheckpointStore};
use crate::cycle::CycleStatus;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("database creation error: {0}")]
    RedbCreate(#[from] redb::DatabaseError),

    #[error("transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("storage error: {0}")]
    Storage(#[from] redb::StorageError),
}

impl From<StateError> for CheckpointError {
    fn from(e: StateError) -> Self {
        CheckpointError::Storage(e.to_string())
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Unified audit state over redb so every component shares one durable store.
pub struct AuditState {
    db: Arc<Database>,
    preview: bool,
}

impl AuditState {
    // Table definitions so every transaction targets the same logical buckets.
    const ENTITY_MARKS: TableDefinition<'_, &str, u64> = TableDefinition::new("entity_marks");
    const ACCOUNT_MARKS: TableDefinition<'_, &str, u64> = TableDefinition::new("account_marks");
    const METADATA: TableDefinition<'_, &str, &[u8]> = TableDefinition::new("metadata");

    const CYCLE_KEY: &'static str = "cycle_status";
    const MARKER_KEY: &'static str = "marker_registered";

    pub fn new<P: AsRef<Path>>(data_dir: P, preview: bool) -> Result<Self, StateError> {
        let data_path = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_path)?;

        let db_path = data_path.join("audit_state.redb");
        let db = Database::create(&db_path)?;

        // Open each table so the database creates them before use.
        let write_txn = db.begin_write()?;
        {
            let _entities = write_txn.open_table(Self::ENTITY_MARKS)?;
            let _accounts = write_txn.open_table(Self::ACCOUNT_MARKS)?;
            let _metadata = write_txn.open_table(Self::METADATA)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db: Arc::new(db),
            preview,
        })
    }

    // ========================================================================
    // CYCLE METADATA
    // ========================================================================

    pub fn load_cycle_status(&self) -> Result<Option<CycleStatus>, StateError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(Self::METADATA)?;
        match table.get(Self::CYCLE_KEY)? {
            Some(bytes) => {
                let status = serde_json::from_slice(bytes.value())
                    .map_err(|e| StateError::Serialization(e.to_string()))?;
                Ok(Some(status))
            }
            None => Ok(None),
        }
    }

    pub fn save_cycle_status(&self, status: &CycleStatus) -> Result<(), StateError> {
        let serialized =
            serde_json::to_vec(status).map_err(|e| StateError::Serialization(e.to_string()))?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(Self::METADATA)?;
            table.insert(Self::CYCLE_KEY, serialized.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    // ========================================================================
    // MARK PRIMITIVES
    // ========================================================================

    fn contains_key(
        &self,
        table_def: TableDefinition<'_, &str, u64>,
        key: &str,
    ) -> Result<bool, StateError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table_def)?;
        Ok(table.get(key)?.is_some())
    }

    fn insert_key(
        &self,
        table_def: TableDefinition<'_, &str, u64>,
        key: &str,
    ) -> Result<(), StateError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(table_def)?;
            // Overwriting an existing mark keeps application idempotent.
            table.insert(key, now_secs())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn remove_keys_with_prefix(
        &self,
        table_def: TableDefinition<'_, &str, u64>,
        prefix: &str,
    ) -> Result<(), StateError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(table_def)?;
            let doomed: Vec<String> = {
                let mut keys = Vec::new();
                for entry in table.iter()? {
                    let (key, _value) = entry?;
                    if key.value().starts_with(prefix) {
                        keys.push(key.value().to_string());
                    }
                }
                keys
            };
            for key in doomed {
                table.remove(key.as_str())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }
}

impl CheckpointStore for AuditState {
    fn ensure_marker(&self) -> Result<(), CheckpointError> {
        if self.marker_exists()? {
            return Ok(());
        }
        if self.preview {
            return Err(CheckpointError::PreviewMode);
        }
        let write_txn = self.db.begin_write().map_err(StateError::from)?;
        {
            let mut table = write_txn
                .open_table(Self::METADATA)
                .map_err(StateError::from)?;
            table
                .insert(Self::MARKER_KEY, [1u8].as_slice())
                .map_err(StateError::from)?;
        }
        write_txn.commit().map_err(StateError::from)?;
        Ok(())
    }

    fn marker_exists(&self) -> Result<bool, CheckpointError> {
        let read_txn = self.db.begin_read().map_err(StateError::from)?;
        let table = read_txn
            .open_table(Self::METADATA)
            .map_err(StateError::from)?;
        Ok(table
            .get(Self::MARKER_KEY)
            .map_err(StateError::from)?
            .is_some())
    }

    fn mark_entity(&self, account_id: &str, entity_id: &str) -> Result<(), CheckpointError> {
        if self.preview {
            return Ok(());
        }
        let key = format!("{account_id}/{entity_id}");
        self.insert_key(Self::ENTITY_MARKS, &key)?;
        Ok(())
    }

    fn is_entity_marked(
        &self,
        account_id: &str,
        entity_id: &str,
    ) -> Result<bool, CheckpointError> {
        let key = format!("{account_id}/{entity_id}");
        Ok(self.contains_key(Self::ENTITY_MARKS, &key)?)
    }

    fn clear_entity_marks(&self, account_id: &str) -> Result<(), CheckpointError> {
        if self.preview {
            return Err(CheckpointError::PreviewMode);
        }
        let prefix = format!("{account_id}/");
        self.remove_keys_with_prefix(Self::ENTITY_MARKS, &prefix)?;
        Ok(())
    }

    fn mark_account(&self, account_id: &str) -> Result<(), CheckpointError> {
        if self.preview {
            return Ok(());
        }
        self.insert_key(Self::ACCOUNT_MARKS, account_id)?;
        Ok(())
    }

    fn is_account_marked(&self, account_id: &str) -> Result<bool, CheckpointError> {
        Ok(self.contains_key(Self::ACCOUNT_MARKS, account_id)?)
    }

    fn clear_account_marks(&self) -> Result<(), CheckpointError> {
        if self.preview {
            return Err(CheckpointError::PreviewMode);
        }
        self.remove_keys_with_prefix(Self::ACCOUNT_MARKS, "")?;
        Ok(())
    }

    fn clear_all_marks(&self) -> Result<(), CheckpointError> {
        if self.preview {
            return Err(CheckpointError::PreviewMode);
        }
        self.remove_keys_with_prefix(Self::ENTITY_MARKS, "")?;
        self.remove_keys_with_prefix(Self::ACCOUNT_MARKS, "")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    #[test]
    fn test_state_creation() {
        let dir = TempDir::new().unwrap();
        let _state = AuditState::new(dir.path(), false).unwrap();
    }

    #[test]
    fn test_marks_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let state = AuditState::new(dir.path(), false).unwrap();
            state.mark_entity("111", "ad-1").unwrap();
            state.mark_account("111").unwrap();
        }

        let state = AuditState::new(dir.path(), false).unwrap();
        assert!(state.is_entity_marked("111", "ad-1").unwrap());
        assert!(state.is_account_marked("111").unwrap());
        assert!(!state.is_entity_marked("111", "ad-2").unwrap());
    }

    #[test]
    fn test_clear_entity_marks_is_account_scoped() {
        let dir = TempDir::new().unwrap();
        let state = AuditState::new(dir.path(), false).unwrap();
        state.mark_entity("111", "ad-1").unwrap();
        state.mark_entity("112", "ad-1").unwrap();

        state.clear_entity_marks("111").unwrap();
        assert!(!state.is_entity_marked("111", "ad-1").unwrap());
        assert!(state.is_entity_marked("112", "ad-1").unwrap());
    }

    #[test]
    fn test_cycle_status_round_trip() {
        let dir = TempDir::new().unwrap();
        let state = AuditState::new(dir.path(), false).unwrap();
        assert!(state.load_cycle_status().unwrap().is_none());

        let status = CycleStatus {
            started_at: Some(Utc::now()),
            completed_at: None,
            notified_at: None,
            error_count: 3,
        };
        state.save_cycle_status(&status).unwrap();

        let loaded = state.load_cycle_status().unwrap().unwrap();
        assert_eq!(loaded.error_count, 3);
        assert!(loaded.started_at.is_some());
        assert!(loaded.completed_at.is_none());
    }

    #[test]
    fn test_preview_refuses_durable_mutation() {
        let dir = TempDir::new().unwrap();
        let state = AuditState::new(dir.path(), true).unwrap();
        assert!(matches!(
            state.ensure_marker(),
            Err(CheckpointError::PreviewMode)
        ));

        // Marks silently do not persist in preview.
        state.mark_entity("111", "ad-1").unwrap();
        assert!(!state.is_entity_marked("111", "ad-1").unwrap());
    }

    #[test]
    fn test_marker_registration_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let state = AuditState::new(dir.path(), false).unwrap();
        state.ensure_marker().unwrap();
        state.ensure_marker().unwrap();
        assert!(state.marker_exists().unwrap());
    }
}

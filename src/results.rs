//! URL check results and the append-only JSONL result log.
//!
//! One row per newly checked URL. Rows are immutable once produced. Starting
//! a new cycle archives the previous cycle's rows to a sibling file and
//! truncates the live log.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResultLogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Either the HTTP status code or the transport failure's message text,
/// never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UrlCheckStatus {
    Code(u16),
    Message(String),
}

impl UrlCheckStatus {
    /// A row is an error unless its status is a code inside the valid set.
    /// Message rows are always errors.
    pub fn is_error(&self, valid_codes: &[u16]) -> bool {
        match self {
            UrlCheckStatus::Code(code) => !valid_codes.contains(code),
            UrlCheckStatus::Message(_) => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlCheckResult {
    pub account_id: String,
    pub timestamp: DateTime<Utc>,
    pub url: String,
    pub status: UrlCheckStatus,
    pub entity_type: String,
    pub campaign: String,
    pub ad_group: String,
    pub ad: String,
    pub keyword: String,
    pub sitelink: String,
}

/// Append-only JSONL log pair: `results.jsonl` for the current cycle,
/// `archive.jsonl` holding the previous cycle.
pub struct ResultLog {
    results_path: PathBuf,
    archive_path: PathBuf,
    write_lock: Mutex<()>,
}

impl ResultLog {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Result<Self, ResultLogError> {
        let dir = data_dir.as_ref();
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            results_path: dir.join("results.jsonl"),
            archive_path: dir.join("archive.jsonl"),
            write_lock: Mutex::new(()),
        })
    }

    /// Append rows for one invocation. When `save_all` is false only rows
    /// outside the valid-code set are written. Returns the number persisted.
    pub fn append(
        &self,
        rows: &[UrlCheckResult],
        save_all: bool,
        valid_codes: &[u16],
    ) -> Result<usize, ResultLogError> {
        let _guard = self.write_lock.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.results_path)?;

        let mut written = 0;
        for row in rows {
            if save_all || row.status.is_error(valid_codes) {
                writeln!(file, "{}", serde_json::to_string(row)?)?;
                written += 1;
            }
        }
        Ok(written)
    }

    /// Move the live log to the archive slot and start fresh. The previous
    /// archive is superseded. Idempotent when the live log is absent.
    pub fn archive_and_clear(&self) -> Result<(), ResultLogError> {
        let _guard = self.write_lock.lock();
        if self.archive_path.exists() {
            std::fs::remove_file(&self.archive_path)?;
        }
        if self.results_path.exists() {
            std::fs::rename(&self.results_path, &self.archive_path)?;
        }
        Ok(())
    }

    pub fn results_path(&self) -> &Path {
        &self.results_path
    }

    /// All rows of the current cycle, oldest first.
    pub fn read_all(&self) -> Result<Vec<UrlCheckResult>, ResultLogError> {
        if !self.results_path.exists() {
            return Ok(Vec::new());
        }
        let file = std::fs::File::open(&self.results_path)?;
        let mut rows = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            rows.push(serde_json::from_str(&line)?);
        }
        Ok(rows)
    }

    /// Error rows across the whole current cycle, not just this invocation.
    pub fn count_errors(&self, valid_codes: &[u16]) -> Result<usize, ResultLogError> {
        Ok(self
            .read_all()?
            .iter()
            .filter(|row| row.status.is_error(valid_codes))
            .count())
    }
}

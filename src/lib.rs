pub mod aggregate;
pub mod backend;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod cycle;
pub mod error;
pub mod expand;
pub mod inventory;
pub mod logging;
pub mod notify;
pub mod options;
pub mod probe;
pub mod results;
pub mod scanner;
pub mod source;
pub mod state;

// Re-export main types for library usage
pub use aggregate::InvocationSummary;
pub use backend::{AccountDirectory, AccountRef, Entity, EntityBackend, EntityKind};
pub use checkpoint::{CheckpointStore, MemoryCheckpointStore};
pub use coordinator::{Coordinator, InvocationReport};
pub use cycle::{CycleAction, CycleStatus};
pub use error::AuditError;
pub use expand::expand_url_modifiers;
pub use inventory::InventoryBackend;
pub use options::AuditOptions;
pub use probe::{FetchError, Fetcher, HttpFetcher, UrlProbe};
pub use results::{ResultLog, UrlCheckResult, UrlCheckStatus};
pub use scanner::{AccountOutcome, AccountScanner, Deadline};
pub use state::AuditState;

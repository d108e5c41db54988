//! Live migration for Lodestream
//!
//! Relocates an entity's event log to a new stream while writers keep
//! operating: no event loss, no duplication, source order preserved, and
//! transparent write redirection after cutover. The pieces:
//!
//! - **DistributedLockProvider**: lease-based per-entity mutual exclusion
//!   (contract + in-memory provider), renewed by a heartbeat thread
//! - **CatchUpCopier**: iteratively copies un-replicated business events
//!   from source to target, optionally through a transform hook
//! - **MigrationOrchestrator**: the saga coordinating lock, backup, copy,
//!   verify, atomic optimistic close, routing cutover and book-close
//! - **MigrationRecord**: persisted saga state enabling crash-resume
//!
//! Writers intentionally race the copier on the source stream; correctness
//! rests solely on the atomic expected-version close.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backup;
pub mod copier;
pub mod heartbeat;
pub mod lock;
pub mod orchestrator;
pub mod record;
pub mod transform;

pub use backup::{BackupHandle, BackupProvider};
pub use copier::{CatchUpCopier, ConvergencePolicy, CopyProgress, SourcePauser};
pub use heartbeat::LockHeartbeat;
pub use lock::{DistributedLockProvider, InMemoryLockProvider, LockHandle};
pub use orchestrator::{MigrationConfig, MigrationOrchestrator, MigrationReport};
pub use record::{
    InMemoryRecordStore, MigrationPhase, MigrationRecord, MigrationRecordStore, MigrationStatus,
};
pub use transform::{NoTransform, TransformHook};

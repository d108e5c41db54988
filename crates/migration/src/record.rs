//! Migration records
//!
//! Persisted saga state. A migration that dies mid-flight is resumed by
//! reading its record (plus the authoritative seal state on the source
//! stream) and skipping completed steps. Records live behind the
//! [`MigrationRecordStore`] seam so durable stores can be swapped in.

use chrono::{DateTime, Utc};
use lode_core::error::Result;
use lode_core::types::{ObjectIdentifier, StreamId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Rollout phase of the entity's routing during migration.
///
/// This engine's saga path is `Normal -> Cutover -> BookClosed`; the
/// dual-write/dual-read phases exist for rollout schemes that stage reads
/// and writes separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MigrationPhase {
    /// Routing untouched; copier may be running
    Normal,
    /// Writes mirrored to both streams (not used by this saga)
    DualWrite,
    /// Reads served from both streams (not used by this saga)
    DualRead,
    /// Source sealed, routing flipped to the target
    Cutover,
    /// Archival side effects applied after cutover
    BookClosed,
}

/// Saga status of one migration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MigrationStatus {
    /// Created, not yet started
    Pending,
    /// Copy loop running
    InProgress,
    /// Delegated integrity verification running
    Verifying,
    /// Atomic close / routing update in flight
    CuttingOver,
    /// Terminal: migration finished
    Completed,
    /// Terminal: unrecoverable error; source untouched if pre-close
    Failed,
    /// Cooperatively stopped; copied progress preserved for resumption
    Cancelled,
    /// Restore from backup in flight
    RollingBack,
    /// Terminal: restored from backup
    RolledBack,
}

impl MigrationStatus {
    /// True for states no saga transition leaves
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MigrationStatus::Completed | MigrationStatus::Failed | MigrationStatus::RolledBack
        )
    }
}

/// Persisted state of one entity's migration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    /// Entity being migrated
    pub object: ObjectIdentifier,
    /// Stream being drained
    pub source_stream: StreamId,
    /// Stream being filled
    pub target_stream: StreamId,
    /// Routing rollout phase
    pub phase: MigrationPhase,
    /// Saga status
    pub status: MigrationStatus,
    /// Total catch-up attempts consumed (close-conflict cycles included)
    pub catch_up_attempts: u32,
    /// Source events already consumed by the copier; lets transform-bearing
    /// migrations resume without inferring position from the target count
    pub copied_source_version: u64,
    /// When the record was created
    pub created_at: DateTime<Utc>,
    /// Last transition time
    pub updated_at: DateTime<Utc>,
}

impl MigrationRecord {
    /// Fresh record in `Pending`/`Normal`
    pub fn new(object: ObjectIdentifier, source_stream: StreamId, target_stream: StreamId) -> Self {
        let now = Utc::now();
        Self {
            object,
            source_stream,
            target_stream,
            phase: MigrationPhase::Normal,
            status: MigrationStatus::Pending,
            catch_up_attempts: 0,
            copied_source_version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to a new status, stamping the transition time
    pub fn transition(&mut self, status: MigrationStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Move to a new phase, stamping the transition time
    pub fn enter_phase(&mut self, phase: MigrationPhase) {
        self.phase = phase;
        self.updated_at = Utc::now();
    }
}

/// Persistence seam for [`MigrationRecord`]s
pub trait MigrationRecordStore: Send + Sync {
    /// Load the record for an entity, if one exists
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    fn load(&self, object: &ObjectIdentifier) -> Result<Option<MigrationRecord>>;

    /// Persist a record, replacing any previous one for the entity
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    fn save(&self, record: &MigrationRecord) -> Result<()>;
}

/// In-memory [`MigrationRecordStore`]
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<ObjectIdentifier, MigrationRecord>>,
}

impl InMemoryRecordStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl MigrationRecordStore for InMemoryRecordStore {
    fn load(&self, object: &ObjectIdentifier) -> Result<Option<MigrationRecord>> {
        Ok(self.records.read().get(object).cloned())
    }

    fn save(&self, record: &MigrationRecord) -> Result<()> {
        self.records
            .write()
            .insert(record.object.clone(), record.clone());
        Ok(())
    }
}

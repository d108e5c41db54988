//! Lodestream - event-sourcing storage engine with live stream migration
//!
//! Lodestream stores each entity's history as an append-only event stream
//! with optimistic-concurrency writes, and can relocate a stream to a new
//! one with zero downtime: writers keep operating throughout, no event is
//! lost or duplicated, order is preserved, and writes are transparently
//! redirected after cutover.
//!
//! # Quick Start
//!
//! ```ignore
//! use lodestream::{
//!     Event, InMemoryBackend, InMemoryDocumentStore, ObjectIdentifier,
//!     StreamConfig, StreamRouter,
//! };
//! use std::sync::Arc;
//!
//! let backend = Arc::new(InMemoryBackend::new());
//! let documents = Arc::new(InMemoryDocumentStore::new());
//!
//! // Writers address entities, not streams; routing is resolved for them
//! let router = StreamRouter::new(
//!     backend,
//!     documents,
//!     ObjectIdentifier::new("order", "42"),
//!     StreamConfig::default(),
//! );
//! router.append(vec![Event::new("order-placed", 1, b"{}".to_vec())])?;
//! ```
//!
//! # Architecture
//!
//! - [`EventStream`] / [`Session`]: buffered appends committed with
//!   expected-version compare-and-swap
//! - [`StreamRouter`]: document-backed routing with automatic
//!   closed-stream hop-and-retry
//! - [`MigrationOrchestrator`]: the live-migration saga (lock, catch-up
//!   copy, atomic close, routing cutover)
//!
//! Storage is abstract: the engine depends only on the [`StorageBackend`]
//! and [`DocumentStore`] contracts, with in-memory reference
//! implementations included.

pub use lode_core::{
    CancellationToken, ContinuationToken, DiscoveryPage, DocumentHash, DocumentStore, Error, Event,
    ObjectDocument, ObjectIdentifier, ReadPage, RecordedEvent, Result, StorageBackend, StreamId,
    StreamInfo, TerminatedStream, VersionToken, CLOSURE_EVENT_TYPE,
};
pub use lode_migration::{
    BackupHandle, BackupProvider, CatchUpCopier, ConvergencePolicy, CopyProgress,
    DistributedLockProvider, InMemoryLockProvider, InMemoryRecordStore, LockHandle, LockHeartbeat,
    MigrationConfig, MigrationOrchestrator, MigrationPhase, MigrationRecord, MigrationRecordStore,
    MigrationReport, MigrationStatus, NoTransform, SourcePauser, TransformHook,
};
pub use lode_storage::{InMemoryBackend, InMemoryDocumentStore};
pub use lode_stream::{
    AppendOutcome, Discovery, EventIter, EventStream, OpenConstraint, Session, StreamConfig,
    StreamRouter,
};

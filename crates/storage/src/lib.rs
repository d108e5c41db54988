//! Storage layer for Lodestream
//!
//! This crate implements the in-memory reference backends:
//! - InMemoryBackend: RwLock-guarded per-stream event vectors with
//!   expected-version CAS appends and bounded page reads
//! - InMemoryDocumentStore: BTreeMap-backed routing documents with hash
//!   CAS writes and ordered continuation-token pagination
//!
//! Both serve embedders that do not need durability, and every test suite
//! in the workspace. Cloud-backed implementations of the same traits live
//! outside this repository.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod documents;
pub mod memory;

pub use documents::InMemoryDocumentStore;
pub use memory::InMemoryBackend;

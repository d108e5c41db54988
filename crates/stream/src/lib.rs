//! Event stream engine for Lodestream
//!
//! Provides the write and read paths over a [`StorageBackend`]:
//! - **EventStream**: one entity+stream's append-only sequence with
//!   open-time constraints, buffered sessions and optimistic commits
//! - **Stream closure**: the reserved terminal event sealing a stream with
//!   a continuation pointer
//! - **StreamRouter**: document-backed active-stream resolution and the
//!   automatic hop-and-retry protocol that makes migration invisible to
//!   writers
//! - **Discovery**: lazy, continuation-token-paginated enumeration of
//!   object ids for rebuild tooling
//!
//! ## Design Principle: Stateless Facades
//!
//! `EventStream` and `StreamRouter` hold only `Arc` references to the
//! backend and document store. Multiple instances over the same backend are
//! safe; all coordination happens through expected-version compare-and-swap
//! at commit time.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod discovery;
pub mod iter;
pub mod router;
pub mod session;
pub mod stream;

pub use config::StreamConfig;
pub use discovery::Discovery;
pub use iter::EventIter;
pub use router::{AppendOutcome, StreamRouter};
pub use session::{OpenConstraint, Session};
pub use stream::EventStream;

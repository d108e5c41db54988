//! Distributed locking
//!
//! Per-entity mutual exclusion for migrations. Only the contract is part of
//! the core; the in-memory provider here implements the same lease
//! semantics (un-renewed handles expire) so an abandoned migration's lock
//! self-releases and another process can take over.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use lode_core::error::{Error, Result};
use std::thread;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// A held (or once-held) lease on a lock key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHandle {
    /// Lock key, scoping the mutual exclusion
    pub key: String,
    /// Opaque owner id distinguishing holders of the same key over time
    pub owner: String,
    /// Instant past which the lease lapses unless renewed
    pub expires_at: DateTime<Utc>,
}

/// Lease-based mutual exclusion.
///
/// `acquire` blocks up to `timeout` and returns `None` when the key stays
/// held (callers back off or surface `LockUnavailable`). Handles must be
/// renewed before `expires_at` or the lease lapses. `release` is
/// idempotent: releasing a lapsed or foreign handle is a no-op.
pub trait DistributedLockProvider: Send + Sync {
    /// Try to take the lease on `key`, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error only on provider faults; contention yields
    /// `Ok(None)`.
    fn acquire(&self, key: &str, timeout: Duration) -> Result<Option<LockHandle>>;

    /// Extend the lease, returning the refreshed handle.
    ///
    /// # Errors
    ///
    /// `LockExpired` if the lease lapsed or the key changed hands.
    fn renew(&self, handle: &LockHandle) -> Result<LockHandle>;

    /// Give the lease up. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error only on provider faults.
    fn release(&self, handle: &LockHandle) -> Result<()>;
}

#[derive(Debug, Clone)]
struct Lease {
    owner: String,
    expires_at: DateTime<Utc>,
}

/// In-memory lease table implementing [`DistributedLockProvider`]
#[derive(Debug)]
pub struct InMemoryLockProvider {
    leases: DashMap<String, Lease>,
    lease_ttl: Duration,
    poll_interval: Duration,
}

impl InMemoryLockProvider {
    /// Provider with the given lease time-to-live
    pub fn new(lease_ttl: Duration) -> Self {
        Self {
            leases: DashMap::new(),
            lease_ttl,
            poll_interval: Duration::from_millis(10),
        }
    }

    fn ttl(&self) -> ChronoDuration {
        ChronoDuration::from_std(self.lease_ttl).unwrap_or_else(|_| ChronoDuration::seconds(30))
    }

    fn try_take(&self, key: &str) -> Option<LockHandle> {
        let now = Utc::now();
        // Entry-level locking in the map makes check-and-insert atomic per
        // key
        match self.leases.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let lease = occupied.get_mut();
                if lease.expires_at > now {
                    return None;
                }
                lease.owner = Uuid::new_v4().to_string();
                lease.expires_at = now + self.ttl();
                Some(LockHandle {
                    key: key.to_string(),
                    owner: lease.owner.clone(),
                    expires_at: lease.expires_at,
                })
            }
            Entry::Vacant(vacant) => {
                let lease = Lease {
                    owner: Uuid::new_v4().to_string(),
                    expires_at: now + self.ttl(),
                };
                let handle = LockHandle {
                    key: key.to_string(),
                    owner: lease.owner.clone(),
                    expires_at: lease.expires_at,
                };
                vacant.insert(lease);
                Some(handle)
            }
        }
    }
}

impl Default for InMemoryLockProvider {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl DistributedLockProvider for InMemoryLockProvider {
    fn acquire(&self, key: &str, timeout: Duration) -> Result<Option<LockHandle>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(handle) = self.try_take(key) {
                return Ok(Some(handle));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            thread::sleep(self.poll_interval.min(deadline.saturating_duration_since(Instant::now())));
        }
    }

    fn renew(&self, handle: &LockHandle) -> Result<LockHandle> {
        let now = Utc::now();
        let mut renewed = None;
        if let Some(mut lease) = self.leases.get_mut(&handle.key) {
            if lease.owner == handle.owner && lease.expires_at > now {
                lease.expires_at = now + self.ttl();
                renewed = Some(LockHandle {
                    key: handle.key.clone(),
                    owner: handle.owner.clone(),
                    expires_at: lease.expires_at,
                });
            }
        }
        renewed.ok_or(Error::LockExpired {
            key: handle.key.clone(),
        })
    }

    fn release(&self, handle: &LockHandle) -> Result<()> {
        self.leases
            .remove_if(&handle.key, |_, lease| lease.owner == handle.owner);
        Ok(())
    }
}

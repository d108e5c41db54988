//! Lock heartbeat
//!
//! Renews a migration's lock lease on a fixed interval from a named
//! background thread. A renewal failure marks the heartbeat unhealthy; the
//! orchestrator checks health at loop boundaries and aborts rather than
//! running unlocked. If the process dies instead, the lease simply lapses
//! and another process can take over.

use crate::lock::{DistributedLockProvider, LockHandle};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::warn;

struct HeartbeatShared {
    handle: Mutex<LockHandle>,
    stop: Mutex<bool>,
    stop_signal: Condvar,
    shutdown: AtomicBool,
    unhealthy: AtomicBool,
}

/// Periodic lease renewal for one held lock
pub struct LockHeartbeat {
    shared: Arc<HeartbeatShared>,
    worker: Option<JoinHandle<()>>,
}

impl LockHeartbeat {
    /// Start renewing `handle` every `interval` on a background thread
    pub fn spawn(
        provider: Arc<dyn DistributedLockProvider>,
        handle: LockHandle,
        interval: Duration,
    ) -> Self {
        let shared = Arc::new(HeartbeatShared {
            handle: Mutex::new(handle),
            stop: Mutex::new(false),
            stop_signal: Condvar::new(),
            shutdown: AtomicBool::new(false),
            unhealthy: AtomicBool::new(false),
        });
        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name("lode-lock-heartbeat".to_string())
            .spawn(move || heartbeat_loop(&provider, &worker_shared, interval))
            .expect("failed to spawn heartbeat thread");
        Self {
            shared,
            worker: Some(worker),
        }
    }

    /// False once any renewal has failed
    pub fn is_healthy(&self) -> bool {
        !self.shared.unhealthy.load(Ordering::SeqCst)
    }

    /// Latest renewed handle (for the final release)
    pub fn current_handle(&self) -> LockHandle {
        self.shared.handle.lock().clone()
    }

    /// Stop renewing and return the latest handle
    pub fn stop(mut self) -> LockHandle {
        self.signal_stop();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        self.current_handle()
    }

    fn signal_stop(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        let mut stopped = self.shared.stop.lock();
        *stopped = true;
        self.shared.stop_signal.notify_all();
    }
}

impl Drop for LockHeartbeat {
    fn drop(&mut self) {
        self.signal_stop();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn heartbeat_loop(
    provider: &Arc<dyn DistributedLockProvider>,
    shared: &Arc<HeartbeatShared>,
    interval: Duration,
) {
    loop {
        {
            let mut stopped = shared.stop.lock();
            if !*stopped {
                shared.stop_signal.wait_for(&mut stopped, interval);
            }
            if *stopped || shared.shutdown.load(Ordering::SeqCst) {
                return;
            }
        }
        let current = shared.handle.lock().clone();
        match provider.renew(&current) {
            Ok(renewed) => {
                *shared.handle.lock() = renewed;
            }
            Err(e) => {
                warn!(key = %current.key, error = %e, "lock heartbeat renewal failed");
                shared.unhealthy.store(true, Ordering::SeqCst);
                return;
            }
        }
    }
}

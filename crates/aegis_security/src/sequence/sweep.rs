//! # Periodic Sweep
//!
//! Timeouts are evaluated lazily: an expired sequence stays in the registry
//! until an event touches it or a cleanup runs. The sweeper runs the
//! unforced cleanup on a fixed interval so memory stays bounded for idle
//! entities.
//!
//! ```text
//!   ┌──────────────┐   wait_for(interval)   ┌─────────────────────┐
//!   │ sweep thread │ ─────────────────────► │ manager.clean(false)│
//!   └──────┬───────┘ ◄───────────────────── └─────────────────────┘
//!          │ notify on shutdown
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use super::event::SequenceEvent;
use super::manager::SequenceManager;

struct SweepShared {
    stop: AtomicBool,
    sweeps: AtomicU64,
    removed: AtomicU64,
    lock: Mutex<()>,
    wake: Condvar,
}

/// Background thread cleaning discontinued sequences.
///
/// Stops when shut down or dropped.
pub struct SweepScheduler {
    shared: Arc<SweepShared>,
    handle: Option<JoinHandle<()>>,
}

impl SweepScheduler {
    /// Spawns the sweep thread.
    ///
    /// # Errors
    ///
    /// Returns error if the thread cannot be spawned.
    pub fn spawn<E>(manager: Arc<SequenceManager<E>>, interval: Duration) -> std::io::Result<Self>
    where
        E: SequenceEvent + Send + Sync + 'static,
    {
        let shared = Arc::new(SweepShared {
            stop: AtomicBool::new(false),
            sweeps: AtomicU64::new(0),
            removed: AtomicU64::new(0),
            lock: Mutex::new(()),
            wake: Condvar::new(),
        });

        let thread_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name("aegis-sweep".to_string())
            .spawn(move || sweep_loop(&manager, &thread_shared, interval))?;

        tracing::info!("Sequence sweeper started (interval {:?})", interval);
        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    /// Completed sweep passes.
    #[must_use]
    pub fn sweeps(&self) -> u64 {
        self.shared.sweeps.load(Ordering::Acquire)
    }

    /// Sequences removed across all passes.
    #[must_use]
    pub fn removed(&self) -> u64 {
        self.shared.removed.load(Ordering::Acquire)
    }

    /// Stops the thread and waits for it.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        {
            let _guard = self.shared.lock.lock();
            self.shared.stop.store(true, Ordering::Release);
            self.shared.wake.notify_all();
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Sequence sweeper panicked");
            } else {
                tracing::info!("Sequence sweeper stopped after {} passes", self.sweeps());
            }
        }
    }
}

impl Drop for SweepScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn sweep_loop<E: SequenceEvent + 'static>(
    manager: &SequenceManager<E>,
    shared: &SweepShared,
    interval: Duration,
) {
    loop {
        {
            let mut guard = shared.lock.lock();
            if shared.stop.load(Ordering::Acquire) {
                return;
            }
            shared.wake.wait_for(&mut guard, interval);
            if shared.stop.load(Ordering::Acquire) {
                return;
            }
        }

        let report = manager.clean(false);
        shared.removed.fetch_add(report.removed as u64, Ordering::AcqRel);
        shared.sweeps.fetch_add(1, Ordering::AcqRel);
    }
}

/// Runs the unforced cleanup on a tokio interval until the task is aborted.
#[cfg(feature = "async-sweep")]
pub fn spawn_sweep_task<E>(
    manager: Arc<SequenceManager<E>>,
    interval: Duration,
) -> tokio::task::JoinHandle<()>
where
    E: SequenceEvent + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let report = manager.clean(false);
            if report.removed > 0 {
                tracing::trace!("Async sweep removed {} sequences", report.removed);
            }
        }
    })
}

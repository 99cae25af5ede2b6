//! Background sync runners.
//!
//! [`SyncRunner`] wraps one [`SyncEngine`] in a worker thread that
//! repeats cycles at the configured interval until stopped. [`SyncPool`]
//! drives many engines in rounds with a bounded number of concurrent
//! cycles, so many buckets never swamp local disk or upstream bandwidth.

use crate::engine::SyncEngine;
use crate::transport::SyncTransport;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// How often the worker checks the shutdown flag while sleeping.
const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

/// Runs sync cycles on a background thread.
pub struct SyncRunner<T: SyncTransport + 'static> {
    engine: Arc<SyncEngine<T>>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl<T: SyncTransport + 'static> SyncRunner<T> {
    /// Starts a worker thread running cycles at `interval`.
    pub fn start(engine: Arc<SyncEngine<T>>, interval: Duration) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let worker_engine = Arc::clone(&engine);
        let worker_shutdown = Arc::clone(&shutdown);

        let handle = std::thread::spawn(move || {
            tracing::debug!(bucket = %worker_engine.bucket_id(), "sync runner started");
            while !worker_shutdown.load(Ordering::SeqCst) {
                match worker_engine.sync_with_retry() {
                    Ok(report) => {
                        if !report.committed.is_empty() || !report.rejected.is_empty() {
                            tracing::info!(
                                committed = report.committed.len(),
                                rejected = report.rejected.len(),
                                revision = report.revision,
                                "background sync cycle"
                            );
                        }
                    }
                    Err(err) => {
                        tracing::warn!(%err, "background sync cycle failed");
                    }
                }
                sleep_interruptible(interval, &worker_shutdown);
            }
            tracing::debug!("sync runner stopped");
        });

        Self {
            engine,
            shutdown,
            handle: Some(handle),
        }
    }

    /// The engine driven by this runner.
    pub fn engine(&self) -> &Arc<SyncEngine<T>> {
        &self.engine
    }

    /// Signals the worker to stop and waits for it to exit.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.engine.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl<T: SyncTransport + 'static> Drop for SyncRunner<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Drives many engines with at most `workers` cycles in flight.
///
/// Each round syncs every engine once, then the pool sleeps for the
/// interval. One engine never runs two cycles concurrently because a
/// round visits it exactly once.
pub struct SyncPool<T: SyncTransport + 'static> {
    engines: Arc<Vec<Arc<SyncEngine<T>>>>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl<T: SyncTransport + 'static> SyncPool<T> {
    /// Starts the pool over `engines`, running at most `workers`
    /// concurrent cycles per round.
    pub fn start(
        engines: Vec<Arc<SyncEngine<T>>>,
        workers: usize,
        interval: Duration,
    ) -> Self {
        let engines = Arc::new(engines);
        let shutdown = Arc::new(AtomicBool::new(false));
        let pool_engines = Arc::clone(&engines);
        let pool_shutdown = Arc::clone(&shutdown);
        let workers = workers.max(1);

        let handle = std::thread::spawn(move || {
            tracing::debug!(engines = pool_engines.len(), workers, "sync pool started");
            while !pool_shutdown.load(Ordering::SeqCst) {
                run_round(&pool_engines, workers, &pool_shutdown);
                sleep_interruptible(interval, &pool_shutdown);
            }
            tracing::debug!("sync pool stopped");
        });

        Self {
            engines,
            shutdown,
            handle: Some(handle),
        }
    }

    /// The engines driven by this pool.
    pub fn engines(&self) -> &[Arc<SyncEngine<T>>] {
        &self.engines
    }

    /// Signals the pool to stop and waits for the round in flight.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        for engine in self.engines.iter() {
            engine.cancel();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl<T: SyncTransport + 'static> Drop for SyncPool<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Syncs every engine once, at most `workers` at a time.
fn run_round<T: SyncTransport + 'static>(
    engines: &[Arc<SyncEngine<T>>],
    workers: usize,
    shutdown: &AtomicBool,
) {
    let next = std::sync::atomic::AtomicUsize::new(0);
    std::thread::scope(|scope| {
        for _ in 0..workers.min(engines.len()) {
            scope.spawn(|| loop {
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
                let index = next.fetch_add(1, Ordering::SeqCst);
                let Some(engine) = engines.get(index) else {
                    break;
                };
                if let Err(err) = engine.sync_with_retry() {
                    tracing::warn!(bucket = %engine.bucket_id(), %err, "pool sync cycle failed");
                }
            });
        }
    });
}

fn sleep_interruptible(total: Duration, shutdown: &AtomicBool) {
    let mut remaining = total;
    while remaining > Duration::ZERO && !shutdown.load(Ordering::SeqCst) {
        let step = remaining.min(SHUTDOWN_POLL);
        std::thread::sleep(step);
        remaining = remaining.saturating_sub(step);
    }
}

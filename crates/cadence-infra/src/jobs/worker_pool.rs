// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A fixed-size worker pool fed by a crossbeam channel.
//!
//! Jobs whose dependencies are already satisfied at submission are staged and
//! handed to the workers on [`flush_batch`](JobSystem::flush_batch). Jobs with
//! outstanding dependencies are parked on their dependencies' fences and go
//! straight to the channel once the last one is signalled.

use cadence_core::jobs::{Fence, Job, JobHandle, JobSystem, JobSystemStats};
use cadence_core::{SchedulerConfig, SchedulerError, SchedulerResult};
use crossbeam_channel::{Receiver, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;

struct ReadyJob {
    job: Job,
    fence: Arc<Fence>,
}

/// A job waiting on dependencies that had not finished when it was submitted.
struct ParkedJob {
    remaining: AtomicUsize,
    dependency_failed: AtomicBool,
    ready: Mutex<Option<ReadyJob>>,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    flushes: AtomicU64,
    waits: AtomicU64,
}

struct Shared {
    sender: Mutex<Option<Sender<ReadyJob>>>,
    staged: Mutex<Vec<ReadyJob>>,
    counters: Counters,
    pending: Mutex<usize>,
    idle: Condvar,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn is_closed(&self) -> bool {
        lock(&self.sender).is_none()
    }

    /// Sends one job to the workers, or fails it if the pool is shutting down.
    fn dispatch(&self, ready: ReadyJob) {
        let rejected = match lock(&self.sender).as_ref() {
            Some(sender) => sender.send(ready).err().map(|e| e.into_inner()),
            None => Some(ready),
        };
        if let Some(ready) = rejected {
            log::error!("WorkerPool: dropping job dispatched after shutdown");
            self.finish(&ready.fence, true);
        }
    }

    fn dispatch_staged(&self) -> usize {
        let batch = std::mem::take(&mut *lock(&self.staged));
        let count = batch.len();
        for ready in batch {
            self.dispatch(ready);
        }
        count
    }

    fn run(&self, ready: ReadyJob) {
        let ReadyJob { job, fence } = ready;
        let failed = panic::catch_unwind(AssertUnwindSafe(job)).is_err();
        if failed {
            log::error!("WorkerPool: job panicked; its fence is marked failed");
        }
        self.finish(&fence, failed);
    }

    fn finish(&self, fence: &Fence, failed: bool) {
        self.counters.completed.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
        }
        fence.signal(failed);

        let mut pending = lock(&self.pending);
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.idle.notify_all();
        }
    }

    fn release(&self, parked: &ParkedJob) {
        let Some(ready) = lock(&parked.ready).take() else {
            return;
        };
        if parked.dependency_failed.load(Ordering::Acquire) {
            log::warn!("WorkerPool: skipping job whose dependency failed");
            self.finish(&ready.fence, true);
        } else {
            self.dispatch(ready);
        }
    }
}

/// A fixed pool of worker threads implementing [`JobSystem`].
///
/// Dropping the pool drains all submitted work, then joins every worker.
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `threads` workers (at least one).
    pub fn new(threads: usize) -> SchedulerResult<Self> {
        let threads = threads.max(1);
        let (sender, receiver) = crossbeam_channel::unbounded();
        let shared = Arc::new(Shared {
            sender: Mutex::new(Some(sender)),
            staged: Mutex::new(Vec::new()),
            counters: Counters::default(),
            pending: Mutex::new(0),
            idle: Condvar::new(),
        });

        let mut workers = Vec::with_capacity(threads);
        for index in 0..threads {
            let receiver: Receiver<ReadyJob> = receiver.clone();
            let shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("cadence-worker-{index}"))
                .spawn(move || {
                    log::trace!("Worker {index} started.");
                    while let Ok(ready) = receiver.recv() {
                        shared.run(ready);
                    }
                    log::trace!("Worker {index} stopped.");
                })
                .map_err(|e| SchedulerError::Submission(format!("failed to spawn worker: {e}")))?;
            workers.push(handle);
        }

        log::info!("WorkerPool: started {threads} worker thread(s)");
        Ok(Self { shared, workers })
    }

    /// Spawns the number of workers the configuration asks for.
    pub fn from_config(config: &SchedulerConfig) -> SchedulerResult<Self> {
        Self::new(config.resolved_worker_threads())
    }

    /// Number of worker threads.
    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }

    /// Blocks until every submitted job has finished.
    pub fn wait_idle(&self) {
        self.shared.dispatch_staged();
        let mut pending = lock(&self.shared.pending);
        while *pending > 0 {
            pending = self
                .shared
                .idle
                .wait(pending)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Drains outstanding work, closes the queue and joins the workers.
    ///
    /// Further submissions fail with [`SchedulerError::Submission`].
    pub fn shutdown(&mut self) {
        if self.shared.is_closed() {
            return;
        }
        self.wait_idle();
        lock(&self.shared.sender).take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("WorkerPool: a worker thread panicked outside a job");
            }
        }
        log::info!("WorkerPool: shut down");
    }
}

impl JobSystem for WorkerPool {
    fn submit(&self, job: Job, dependencies: &JobHandle) -> SchedulerResult<JobHandle> {
        if self.shared.is_closed() {
            return Err(SchedulerError::Submission(
                "worker pool is shut down".to_string(),
            ));
        }

        let fence = Fence::new();
        let ready = ReadyJob {
            job,
            fence: Arc::clone(&fence),
        };
        self.shared
            .counters
            .submitted
            .fetch_add(1, Ordering::Relaxed);
        *lock(&self.shared.pending) += 1;

        let outstanding: Vec<_> = dependencies
            .fences()
            .iter()
            .filter(|f| !f.is_signalled() || f.failed())
            .cloned()
            .collect();

        if outstanding.is_empty() {
            lock(&self.shared.staged).push(ready);
        } else {
            let parked = Arc::new(ParkedJob {
                remaining: AtomicUsize::new(outstanding.len()),
                dependency_failed: AtomicBool::new(false),
                ready: Mutex::new(Some(ready)),
            });
            for dependency in outstanding {
                let parked = Arc::clone(&parked);
                let shared: Weak<Shared> = Arc::downgrade(&self.shared);
                let watched = Arc::clone(&dependency);
                dependency.on_signal(move || {
                    if watched.failed() {
                        parked.dependency_failed.store(true, Ordering::Release);
                    }
                    if parked.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                        match shared.upgrade() {
                            Some(shared) => shared.release(&parked),
                            None => {
                                if let Some(ready) = lock(&parked.ready).take() {
                                    ready.fence.signal(true);
                                }
                            }
                        }
                    }
                });
            }
        }

        Ok(JobHandle::from_fence(fence))
    }

    fn flush_batch(&self) {
        self.shared.counters.flushes.fetch_add(1, Ordering::Relaxed);
        let count = self.shared.dispatch_staged();
        log::trace!("WorkerPool: flushed {count} staged job(s)");
    }

    fn wait(&self, handle: &JobHandle) -> SchedulerResult<()> {
        self.shared.counters.waits.fetch_add(1, Ordering::Relaxed);
        if !handle.is_complete() {
            self.shared.dispatch_staged();
        }
        handle.block()
    }

    fn stats(&self) -> JobSystemStats {
        let c = &self.shared.counters;
        JobSystemStats {
            submitted: c.submitted.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            flushes: c.flushes.load(Ordering::Relaxed),
            waits: c.waits.load(Ordering::Relaxed),
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::{Duration, Instant};

    #[test]
    fn test_staged_jobs_run_after_flush() {
        let pool = WorkerPool::new(2).unwrap();
        let hits = Arc::new(AtomicU32::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let hits = hits.clone();
                pool.submit(
                    Box::new(move || {
                        hits.fetch_add(1, Ordering::SeqCst);
                    }),
                    &JobHandle::completed(),
                )
                .unwrap()
            })
            .collect();
        pool.flush_batch();
        pool.wait(&pool.combine(&handles)).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 8);

        let stats = pool.stats();
        assert_eq!(stats.submitted, 8);
        assert_eq!(stats.completed, 8);
        assert_eq!(stats.flushes, 1);
        assert_eq!(stats.waits, 1);
    }

    #[test]
    fn test_wait_without_flush_does_not_deadlock() {
        let pool = WorkerPool::new(1).unwrap();
        let handle = pool
            .submit(Box::new(|| {}), &JobHandle::completed())
            .unwrap();
        assert!(pool.wait(&handle).is_ok());
        assert!(handle.is_complete());
    }

    #[test]
    fn test_dependent_job_runs_after_dependency() {
        let pool = WorkerPool::new(4).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        let first_order = order.clone();
        let first = pool
            .submit(
                Box::new(move || {
                    thread::sleep(Duration::from_millis(10));
                    first_order.lock().unwrap().push("first");
                }),
                &JobHandle::completed(),
            )
            .unwrap();
        let second_order = order.clone();
        let second = pool
            .submit(
                Box::new(move || second_order.lock().unwrap().push("second")),
                &first,
            )
            .unwrap();
        pool.flush_batch();
        pool.wait(&second).unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_wait_is_idempotent() {
        let pool = WorkerPool::new(1).unwrap();
        let handle = pool
            .submit(Box::new(|| {}), &JobHandle::completed())
            .unwrap();
        pool.wait(&handle).unwrap();
        let start = Instant::now();
        pool.wait(&handle).unwrap();
        assert!(start.elapsed() < Duration::from_millis(50));
        assert_eq!(pool.stats().waits, 2);
    }

    #[test]
    fn test_panicking_job_fails_its_handle_and_dependents() {
        let pool = WorkerPool::new(2).unwrap();
        let bad = pool
            .submit(Box::new(|| panic!("boom")), &JobHandle::completed())
            .unwrap();
        let ran = Arc::new(AtomicBool::new(false));
        let ran_flag = ran.clone();
        let dependent = pool
            .submit(
                Box::new(move || ran_flag.store(true, Ordering::SeqCst)),
                &bad,
            )
            .unwrap();
        pool.flush_batch();

        assert!(matches!(
            pool.wait(&bad),
            Err(SchedulerError::JobFailed { count: 1 })
        ));
        assert!(pool.wait(&dependent).is_err());
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(pool.stats().failed, 2);

        // The pool keeps serving work after a panic.
        let ok = pool
            .submit(Box::new(|| {}), &JobHandle::completed())
            .unwrap();
        assert!(pool.wait(&ok).is_ok());
    }

    #[test]
    fn test_submit_after_shutdown_is_rejected() {
        let mut pool = WorkerPool::new(1).unwrap();
        pool.shutdown();
        let err = pool
            .submit(Box::new(|| {}), &JobHandle::completed())
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Submission(_)));
    }

    #[test]
    fn test_shutdown_drains_pending_work() {
        let hits = Arc::new(AtomicU32::new(0));
        {
            let pool = WorkerPool::new(2).unwrap();
            for _ in 0..4 {
                let hits = hits.clone();
                pool.submit(
                    Box::new(move || {
                        thread::sleep(Duration::from_millis(2));
                        hits.fetch_add(1, Ordering::SeqCst);
                    }),
                    &JobHandle::completed(),
                )
                .unwrap();
            }
        }
        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }
}

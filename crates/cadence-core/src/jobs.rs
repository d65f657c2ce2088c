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

//! Completion handles and the worker-pool contract.
//!
//! A [`JobHandle`] is the opaque dependency token passed between scheduling
//! stages. It is a flat set of [`Fence`]s: combining handles concatenates
//! their outstanding fences, so combination is associative and order
//! independent, and a combined handle is satisfied only when every fence it
//! covers has been signalled.
//!
//! The [`JobSystem`] trait is the only view the scheduler has of the worker
//! pool: submit a job behind some dependencies, flush the staged batch, and
//! block on a handle.

use crate::error::{SchedulerError, SchedulerResult};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// A unit of work handed to a [`JobSystem`].
pub type Job = Box<dyn FnOnce() + Send + 'static>;

type Continuation = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct FenceState {
    signalled: bool,
    failed: bool,
    continuations: Vec<Continuation>,
}

/// A one-shot completion latch for a single submitted job.
///
/// The job system signals the fence exactly once, after the job body has
/// returned or panicked. Signalling twice is a no-op.
#[derive(Default)]
pub struct Fence {
    state: Mutex<FenceState>,
    condvar: Condvar,
}

impl Fence {
    /// Creates an unsignalled fence.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    // No user code ever runs under this lock, so a poisoned guard is still consistent.
    fn lock(&self) -> MutexGuard<'_, FenceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Marks the fence as done and runs every registered continuation.
    ///
    /// Continuations run on the calling thread, outside the fence lock.
    pub fn signal(&self, failed: bool) {
        let continuations = {
            let mut state = self.lock();
            if state.signalled {
                return;
            }
            state.signalled = true;
            state.failed = failed;
            std::mem::take(&mut state.continuations)
        };
        self.condvar.notify_all();
        for continuation in continuations {
            continuation();
        }
    }

    /// Returns `true` once the fence has been signalled.
    pub fn is_signalled(&self) -> bool {
        self.lock().signalled
    }

    /// Returns `true` if the fence was signalled by a job that panicked.
    pub fn failed(&self) -> bool {
        self.lock().failed
    }

    /// Runs `f` once the fence is signalled, immediately if it already is.
    pub fn on_signal(&self, f: impl FnOnce() + Send + 'static) {
        let mut state = self.lock();
        if state.signalled {
            drop(state);
            f();
        } else {
            state.continuations.push(Box::new(f));
        }
    }

    /// Blocks until signalled. Returns `true` if the job failed.
    pub fn block(&self) -> bool {
        let mut state = self.lock();
        while !state.signalled {
            state = self
                .condvar
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.failed
    }
}

impl fmt::Debug for Fence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Fence")
            .field("signalled", &state.signalled)
            .field("failed", &state.failed)
            .finish()
    }
}

/// Opaque token for "this work, and everything it depended on, may not have finished".
///
/// The default handle is already satisfied.
#[derive(Clone, Default)]
pub struct JobHandle {
    fences: Vec<Arc<Fence>>,
}

impl JobHandle {
    /// A handle that is satisfied from the start.
    pub fn completed() -> Self {
        Self::default()
    }

    /// Wraps a single fence.
    pub fn from_fence(fence: Arc<Fence>) -> Self {
        Self {
            fences: vec![fence],
        }
    }

    /// Combines any number of handles into one that is satisfied only when all are.
    ///
    /// Fences that already completed successfully are dropped; failed fences are
    /// kept so the failure still surfaces on wait. Duplicates collapse.
    pub fn combine<'a>(handles: impl IntoIterator<Item = &'a JobHandle>) -> Self {
        let mut seen = HashSet::new();
        let mut fences = Vec::new();
        for handle in handles {
            for fence in &handle.fences {
                if fence.is_signalled() && !fence.failed() {
                    continue;
                }
                if seen.insert(Arc::as_ptr(fence)) {
                    fences.push(Arc::clone(fence));
                }
            }
        }
        Self { fences }
    }

    /// Non-blocking probe: `true` when every covered fence is signalled.
    pub fn is_complete(&self) -> bool {
        self.fences.iter().all(|f| f.is_signalled())
    }

    /// Number of fences this handle still tracks.
    pub fn fence_count(&self) -> usize {
        self.fences.len()
    }

    /// The fences covered by this handle.
    pub fn fences(&self) -> &[Arc<Fence>] {
        &self.fences
    }

    /// Blocks on every fence and maps failures to [`SchedulerError::JobFailed`].
    ///
    /// Job systems call this from [`JobSystem::wait`] after flushing; it does not
    /// flush by itself.
    pub fn block(&self) -> SchedulerResult<()> {
        let failed = self.fences.iter().filter(|f| f.block()).count();
        if failed == 0 {
            Ok(())
        } else {
            Err(SchedulerError::JobFailed { count: failed })
        }
    }
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("fences", &self.fences.len())
            .field("complete", &self.is_complete())
            .finish()
    }
}

/// Counters exposed by a job system so synchronization calls can be observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobSystemStats {
    /// Jobs accepted by `submit`.
    pub submitted: u64,
    /// Jobs whose body has finished running (successfully or not).
    pub completed: u64,
    /// Jobs whose body panicked.
    pub failed: u64,
    /// Calls to `flush_batch`.
    pub flushes: u64,
    /// Calls to `wait`.
    pub waits: u64,
}

/// The worker-pool interface the scheduler depends on.
///
/// Implementations must be usable from any thread; the scheduler itself only
/// drives one pass at a time from a single thread.
pub trait JobSystem: Send + Sync {
    /// Queues `job` to run once `dependencies` is satisfied.
    ///
    /// Returns immediately with a handle for the job's completion. The job may
    /// be staged until the next [`flush_batch`](Self::flush_batch).
    fn submit(&self, job: Job, dependencies: &JobHandle) -> SchedulerResult<JobHandle>;

    /// Combines handles. Associative; the default is [`JobHandle::combine`].
    fn combine(&self, handles: &[JobHandle]) -> JobHandle {
        JobHandle::combine(handles)
    }

    /// Hands every staged job to the workers in one go.
    fn flush_batch(&self);

    /// Blocks until `handle` is satisfied.
    ///
    /// Flushes staged work first. Waiting on a satisfied handle returns at once,
    /// so waiting twice is legal.
    fn wait(&self, handle: &JobHandle) -> SchedulerResult<()>;

    /// Snapshot of the synchronization counters.
    fn stats(&self) -> JobSystemStats;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_completed_handle_is_complete() {
        let handle = JobHandle::completed();
        assert!(handle.is_complete());
        assert_eq!(handle.fence_count(), 0);
        assert!(handle.block().is_ok());
    }

    #[test]
    fn test_combine_requires_every_fence() {
        let a = Fence::new();
        let b = Fence::new();
        let combined = JobHandle::combine(&[
            JobHandle::from_fence(a.clone()),
            JobHandle::from_fence(b.clone()),
        ]);
        assert!(!combined.is_complete());
        a.signal(false);
        assert!(!combined.is_complete());
        b.signal(false);
        assert!(combined.is_complete());
    }

    #[test]
    fn test_combine_is_associative_and_deduplicates() {
        let fences: Vec<_> = (0..3).map(|_| Fence::new()).collect();
        let h: Vec<_> = fences
            .iter()
            .map(|f| JobHandle::from_fence(f.clone()))
            .collect();

        let left = JobHandle::combine(&[JobHandle::combine(&[h[0].clone(), h[1].clone()]), h[2].clone()]);
        let right = JobHandle::combine(&[h[0].clone(), JobHandle::combine(&[h[1].clone(), h[2].clone()])]);
        assert_eq!(left.fence_count(), 3);
        assert_eq!(right.fence_count(), 3);

        let doubled = JobHandle::combine(&[left.clone(), right]);
        assert_eq!(doubled.fence_count(), 3);
    }

    #[test]
    fn test_combine_drops_finished_fences_but_keeps_failures() {
        let ok = Fence::new();
        let bad = Fence::new();
        ok.signal(false);
        bad.signal(true);
        let combined =
            JobHandle::combine(&[JobHandle::from_fence(ok), JobHandle::from_fence(bad)]);
        assert_eq!(combined.fence_count(), 1);
        assert!(matches!(
            combined.block(),
            Err(SchedulerError::JobFailed { count: 1 })
        ));
    }

    #[test]
    fn test_signal_is_idempotent() {
        let fence = Fence::new();
        fence.signal(false);
        fence.signal(true);
        assert!(!fence.failed());
    }

    #[test]
    fn test_continuation_runs_once_on_signal_or_immediately() {
        let hits = Arc::new(AtomicUsize::new(0));
        let fence = Fence::new();

        let before = hits.clone();
        fence.on_signal(move || {
            before.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        fence.signal(false);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let after = hits.clone();
        fence.on_signal(move || {
            after.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_block_waits_for_other_thread() {
        let fence = Fence::new();
        let remote = fence.clone();
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(5));
            remote.signal(false);
        });
        let handle = JobHandle::from_fence(fence);
        assert!(handle.block().is_ok());
        assert!(handle.is_complete());
        // A second block returns immediately.
        assert!(handle.block().is_ok());
        t.join().unwrap();
    }
}

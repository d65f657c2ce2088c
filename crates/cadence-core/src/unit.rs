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

//! The work-unit contract: one independently schedulable render archetype.
//!
//! ## Lifecycle
//!
//! ```text
//! initialize(init)
//!   → [ begin_calculation → complete_calculation_and_begin_sync → consume ]*   (two-phase)
//!   → [ schedule_update → consume ]*                                           (combined)
//!   → teardown()
//! ```
//!
//! Stage methods must return promptly: they schedule work through the
//! [`UnitScope`] and hand back a [`JobHandle`], they never block on it.

use crate::access::{AccessLedger, Phase, ReadAccess, WriteAccess};
use crate::config::SchedulerConfig;
use crate::error::{SchedulerError, SchedulerResult};
use crate::frame::FrameSnapshot;
use crate::jobs::{JobHandle, JobSystem};
use crate::store::UnitQuery;
use std::any::type_name;

/// A unit quad, lazily built once for editor environments.
#[derive(Debug, Clone, PartialEq)]
pub struct SharedGeometry {
    /// Corner positions, counter-clockwise from bottom-left.
    pub positions: [[f32; 3]; 4],
    /// Texture coordinates matching `positions`.
    pub uvs: [[f32; 2]; 4],
    /// Two triangles.
    pub indices: [u16; 6],
}

impl SharedGeometry {
    /// A 1x1 quad centred on the origin in the XY plane.
    pub fn unit_quad() -> Self {
        Self {
            positions: [
                [-0.5, -0.5, 0.0],
                [0.5, -0.5, 0.0],
                [0.5, 0.5, 0.0],
                [-0.5, 0.5, 0.0],
            ],
            uvs: [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
            indices: [0, 1, 2, 0, 2, 3],
        }
    }
}

/// One-time setup data handed to [`WorkUnit::initialize`].
#[derive(Debug, Clone, Copy)]
pub struct UnitInit<'a> {
    /// The query built when the subsystem was created.
    pub query: &'a UnitQuery,
    /// The subsystem configuration.
    pub config: &'a SchedulerConfig,
    /// Present only outside normal playback.
    pub editor_geometry: Option<&'a SharedGeometry>,
}

/// Everything a unit sees during one stage call.
pub struct UnitScope<'a> {
    snapshot: &'a FrameSnapshot,
    jobs: &'a dyn JobSystem,
    ledger: &'a AccessLedger,
    index: usize,
    phase: Phase,
}

impl<'a> UnitScope<'a> {
    /// Builds a scope for unit `index` in `phase`.
    pub fn new(
        snapshot: &'a FrameSnapshot,
        jobs: &'a dyn JobSystem,
        ledger: &'a AccessLedger,
        index: usize,
        phase: Phase,
    ) -> Self {
        Self {
            snapshot,
            jobs,
            ledger,
            index,
            phase,
        }
    }

    /// The frame snapshot.
    pub fn snapshot(&self) -> &'a FrameSnapshot {
        self.snapshot
    }

    /// The job system to schedule through.
    pub fn jobs(&self) -> &'a dyn JobSystem {
        self.jobs
    }

    /// Registration index of the unit being called.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The stage being scheduled.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Shared read access to `T`.
    pub fn read<T: Send + Sync + 'static>(&self) -> SchedulerResult<ReadAccess<T>> {
        self.snapshot
            .access()
            .read::<T>()
            .ok_or(SchedulerError::MissingAccess {
                type_name: type_name::<T>(),
                mode: "read",
            })
    }

    /// Exclusive write access to `T` for this phase.
    ///
    /// Fails with [`SchedulerError::AccessConflict`] if another unit already
    /// claimed `T` in the same phase.
    pub fn write<T: Send + Sync + 'static>(&self) -> SchedulerResult<WriteAccess<T>> {
        let access = self
            .snapshot
            .access()
            .write::<T>()
            .ok_or(SchedulerError::MissingAccess {
                type_name: type_name::<T>(),
                mode: "write",
            })?;
        self.ledger.claim_write::<T>(self.phase, self.index)?;
        Ok(access)
    }

    /// Submits `job` behind `dependencies`.
    pub fn submit(
        &self,
        job: impl FnOnce() + Send + 'static,
        dependencies: &JobHandle,
    ) -> SchedulerResult<JobHandle> {
        self.jobs.submit(Box::new(job), dependencies)
    }
}

/// One independently schedulable rendering partition.
///
/// A unit owns whatever in-flight state it keeps between stages; the scheduler
/// only relies on each stage returning a handle.
pub trait WorkUnit: Send {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// One-time setup. Default is a no-op.
    fn initialize(&mut self, _init: &UnitInit<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Phase 1: schedules per-partition metadata calculation behind `dependency`.
    ///
    /// Must not touch state another unit reads. A unit with nothing to do
    /// returns [`JobHandle::completed`].
    fn begin_calculation(
        &mut self,
        scope: &UnitScope<'_>,
        dependency: &JobHandle,
    ) -> SchedulerResult<JobHandle>;

    /// Phase 2: makes allocation decisions from the calculation results and
    /// schedules the data sync.
    ///
    /// In the two-phase pipeline `calculation` is already satisfied, as is
    /// every other unit's Phase 1. In the combined pipeline it may still be
    /// running, so sync jobs must depend on it.
    fn complete_calculation_and_begin_sync(
        &mut self,
        scope: &UnitScope<'_>,
        calculation: &JobHandle,
    ) -> SchedulerResult<JobHandle>;

    /// Combined shape: calculation, decision and sync scheduled as one step.
    ///
    /// The default chains the two phases without blocking: the calculation
    /// handle is passed straight to the sync step as its dependency. Units
    /// whose decision reads calculation results on the calling thread must
    /// override this.
    fn schedule_update(
        &mut self,
        scope: &UnitScope<'_>,
        dependency: &JobHandle,
    ) -> SchedulerResult<JobHandle> {
        let calculation = self.begin_calculation(scope, dependency)?;
        self.complete_calculation_and_begin_sync(scope, &calculation)
    }

    /// Terminal, single-threaded action (e.g. draw submission).
    ///
    /// Only called after the batched join covering this unit's sync work.
    fn consume(&mut self) -> anyhow::Result<()>;

    /// Releases held resources. Default is a no-op.
    ///
    /// Called exactly once, and only if [`initialize`](Self::initialize)
    /// succeeded.
    fn teardown(&mut self) {}
}

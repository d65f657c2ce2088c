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

//! The render subsystem: owns the units, the snapshot source and the
//! scheduler, and exposes the two entry points a frame loop calls.

use crate::metrics::SchedulerStats;
use crate::registry::UnitRegistry;
use crate::scheduler::{PassOutcome, TwoPhaseScheduler};
use crate::snapshot::SnapshotSource;
use cadence_core::access::AccessMap;
use cadence_core::config::SchedulerConfig;
use cadence_core::jobs::{JobHandle, JobSystem};
use cadence_core::store::EntityStore;
use cadence_core::unit::WorkUnit;
use cadence_core::SchedulerResult;
use std::sync::Arc;

/// Schedules every registered unit once per frame on a shared job system.
///
/// A frame is either run in one call ([`run_frame`](Self::run_frame) with
/// `defer_join` off) or split across [`update_pass`](Self::update_pass) and
/// [`draw_pass`](Self::draw_pass), leaving room for unrelated work between
/// fan-out and consumption.
pub struct RenderSubsystem {
    config: SchedulerConfig,
    jobs: Arc<dyn JobSystem>,
    registry: UnitRegistry,
    snapshots: SnapshotSource,
    scheduler: TwoPhaseScheduler,
}

impl RenderSubsystem {
    /// Validates `config`, builds the unit query against `store` and wires up
    /// the scheduler.
    pub fn create(
        config: SchedulerConfig,
        store: &dyn EntityStore,
        jobs: Arc<dyn JobSystem>,
    ) -> SchedulerResult<Self> {
        config.validate()?;
        let registry = UnitRegistry::create(&config, store)?;
        let snapshots = SnapshotSource::new(config.update_modes);
        let scheduler = TwoPhaseScheduler::new(&config);
        log::info!(
            "RenderSubsystem: created ({:?}, defer_join={}, playback={:?})",
            config.pipeline,
            config.defer_join,
            config.playback
        );
        Ok(Self {
            config,
            jobs,
            registry,
            snapshots,
            scheduler,
        })
    }

    /// Adds a unit; it is consumed after every unit registered before it.
    pub fn register(&mut self, unit: Box<dyn WorkUnit>) -> SchedulerResult<usize> {
        self.registry.register(unit)
    }

    /// Removes a unit by name. Not allowed while a split frame is outstanding.
    pub fn remove(&mut self, name: &str) -> SchedulerResult<bool> {
        self.registry.remove(name)
    }

    /// Initializes every registered unit. Optional; the first pass does it lazily.
    pub fn initialize(&mut self) -> SchedulerResult<()> {
        self.registry.initialize()
    }

    /// Handles that persist across frames (static and reactive properties).
    pub fn persistent_access_mut(&mut self) -> &mut AccessMap {
        self.snapshots.persistent_mut()
    }

    /// Fans out one frame and returns the handle covering all of its work.
    ///
    /// Does not consume. If the previous frame was never drawn it is joined
    /// and consumed first so frames never overlap. A rejected frame does not
    /// advance the snapshot version.
    pub fn update_pass(
        &mut self,
        per_frame: &AccessMap,
        incoming: JobHandle,
    ) -> SchedulerResult<JobHandle> {
        if self.scheduler.has_outstanding() {
            log::warn!("RenderSubsystem: update_pass with an undrawn frame; consuming it first");
            self.draw_pass()?;
        }
        self.scheduler.check_ready(&self.registry)?;
        let snapshot = self.snapshots.assemble(per_frame, incoming);
        self.scheduler
            .fan_out(&mut self.registry, &snapshot, self.jobs.as_ref())
    }

    /// Joins the outstanding frame and consumes every unit in registration order.
    ///
    /// Returns the number of units consumed, `0` when no frame was outstanding.
    pub fn draw_pass(&mut self) -> SchedulerResult<usize> {
        self.scheduler
            .join_and_consume(&mut self.registry, self.jobs.as_ref())
    }

    /// Runs one frame in the configured shape.
    pub fn run_frame(
        &mut self,
        per_frame: &AccessMap,
        incoming: JobHandle,
    ) -> SchedulerResult<PassOutcome> {
        if self.scheduler.has_outstanding() {
            log::warn!("RenderSubsystem: run_frame with an undrawn frame; consuming it first");
            self.draw_pass()?;
        }
        self.scheduler.check_ready(&self.registry)?;
        let snapshot = self.snapshots.assemble(per_frame, incoming);
        self.scheduler
            .run_pass(&mut self.registry, &snapshot, self.jobs.as_ref())
    }

    /// Scheduler statistics.
    pub fn stats(&self) -> &SchedulerStats {
        self.scheduler.stats()
    }

    /// The unit registry.
    pub fn registry(&self) -> &UnitRegistry {
        &self.registry
    }

    /// The configuration this subsystem was created with.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// The shared job system.
    pub fn jobs(&self) -> &Arc<dyn JobSystem> {
        &self.jobs
    }

    /// Number of snapshots assembled so far.
    pub fn frames_assembled(&self) -> u64 {
        self.snapshots.frames_assembled()
    }

    /// Waits for any outstanding frame, then releases every unit in reverse
    /// registration order.
    ///
    /// Outstanding work is joined but not consumed.
    pub fn teardown(mut self) -> SchedulerResult<()> {
        let joined = self.release();
        log::info!("RenderSubsystem: torn down");
        joined
    }

    fn release(&mut self) -> SchedulerResult<()> {
        if self.registry.is_released() {
            return Ok(());
        }
        let joined = self
            .scheduler
            .join_outstanding(&mut self.registry, self.jobs.as_ref());
        self.registry.shutdown();
        joined
    }
}

impl Drop for RenderSubsystem {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::error!("RenderSubsystem: outstanding work failed during drop: {e}");
        }
    }
}
